//! Configuration for the strata section scheduler.
//!
//! Settings persist to disk as a RON file, can be overridden from the command
//! line via clap, and tolerate missing or unknown fields so old and new
//! config files keep loading.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, DebugConfig, MeshingConfig, WorldConfig};
pub use error::ConfigError;
