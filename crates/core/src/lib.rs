pub mod domain;
pub mod error;
pub mod game;
pub mod ingest;
pub mod pit;
pub mod snapshots;
pub mod storage;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub market_data_base_url: Option<String>,
        pub market_data_api_key: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                market_data_base_url: std::env::var("MARKET_DATA_BASE_URL").ok(),
                market_data_api_key: std::env::var("MARKET_DATA_API_KEY").ok(),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_market_data_base_url(&self) -> anyhow::Result<&str> {
            self.market_data_base_url
                .as_deref()
                .context("MARKET_DATA_BASE_URL is required")
        }
    }

    /// Reads a numeric tunable from the environment, falling back to `default`
    /// when unset or unparsable.
    pub fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
        std::env::var(key)
            .ok()
            .and_then(|s| s.trim().parse::<T>().ok())
            .unwrap_or(default)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn env_or_falls_back_on_garbage() {
            std::env::set_var("TRAPVALUE_TEST_ENV_OR", "not-a-number");
            assert_eq!(env_or("TRAPVALUE_TEST_ENV_OR", 7usize), 7);
            std::env::set_var("TRAPVALUE_TEST_ENV_OR", " 12 ");
            assert_eq!(env_or("TRAPVALUE_TEST_ENV_OR", 7usize), 12);
            std::env::remove_var("TRAPVALUE_TEST_ENV_OR");
            assert_eq!(env_or("TRAPVALUE_TEST_ENV_OR", 7usize), 7);
        }
    }
}
