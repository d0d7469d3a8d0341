//! Snapshot windows and forward outcomes.

pub mod outcome;
pub mod window;

pub use outcome::{classify_difficulty, classify_outcome, compute_outcome, PriceSeries};
pub use window::{candidate_dates, generate_snapshots, WindowConfig};
