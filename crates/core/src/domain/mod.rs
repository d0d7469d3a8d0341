pub mod financials;
pub mod game;
pub mod market;
pub mod snapshot;
