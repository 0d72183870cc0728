//! Configuration file parsing and structures.
//!
//! companiond reads a single TOML document. After parsing, `${VAR}` and
//! `${VAR:default}` references in string values are replaced from the environment
//! (optionally seeded from a `.env` file), then the document is deserialized into
//! [`Config`].

#[allow(clippy::module_inception)]
mod config;
mod env;

pub use config::*;
pub use env::interpolate;
pub use env::load_dotenv;
