pub mod names;
pub mod progress;
pub mod provider;
pub mod rate_limit;
pub mod seeder;
pub mod types;
