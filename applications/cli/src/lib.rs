//! Cadence CLI
//!
//! Headless host for the playback session: configuration, logging, storage
//! selection, a JSON manifest library and simulated platform collaborators.

pub mod config;
pub mod error;
pub mod host;
pub mod manifest;
pub mod simulated;

pub use config::CadenceConfig;
pub use error::{CliError, Result};
pub use manifest::ManifestLibrary;
