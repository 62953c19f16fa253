//! # csync Common Library
//!
//! Shared code for the csync ingestion tools:
//! - Record model (untyped field mappings read from the source backend)
//! - Configuration loading (TOML file, environment, command line)
//! - Common error type

pub mod config;
pub mod error;
pub mod record;

pub use error::{Error, Result};
pub use record::Record;
