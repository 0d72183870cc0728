pub mod config;
pub mod engine;
pub mod integrations;

pub use config::Config;
pub use config::LogLevel;
