use thiserror::Error;

/// Domain failures surfaced to callers of the core (gameplay and seeding).
///
/// Infrastructure code returns `anyhow::Result`; it is wrapped into
/// [`Error::Internal`] at the boundary where a typed signal is needed.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("company not found: {ticker}")]
    CompanyNotFound { ticker: String },

    #[error("no price history found for {ticker}")]
    NoPriceHistory { ticker: String },

    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream request failed: {0}")]
    TransientUpstream(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn invalid_choice(choice: &str) -> Self {
        Error::Validation(format!("choice must be 'value' or 'trap' (got '{choice}')"))
    }

    /// True for failures a caller may reasonably retry later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientUpstream(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
