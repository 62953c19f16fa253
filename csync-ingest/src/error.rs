//! Error types for csync-ingest
//!
//! Only [`SetupError`] is fatal. Everything else is caught at the record or
//! collection boundary, counted, and reported in the run summary.

use crate::catalog::EntityKind;
use thiserror::Error;

/// Reading a collection from the source failed
///
/// The pipeline treats this as "no data available" for the collection.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network, TLS or timeout failure
    #[error("Request for '{collection}' failed: {message}")]
    Transport { collection: String, message: String },

    /// Source answered with a non-success status
    #[error("Source returned {status} for '{collection}': {body}")]
    Status {
        collection: String,
        status: u16,
        body: String,
    },

    /// Body was not a JSON array of objects
    #[error("Invalid response body for '{collection}': {message}")]
    Decode { collection: String, message: String },
}

/// A record's missing reference cannot be filled; the record is skipped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepairImpossible {
    /// Fallback policy, but no parent records were fetched before this collection
    #[error("'{field}' is missing and no {parent} records are available as fallback")]
    NoFallback { field: String, parent: EntityKind },

    /// Reference declared required and the value is blank
    #[error("required reference '{field}' is missing")]
    RequiredMissing { field: String },
}

/// A single procedure call failed; the record is not persisted
#[derive(Debug, Error)]
pub enum WriteError {
    /// Target connection lost or unusable
    #[error("Connection error calling {procedure}: {message}")]
    Connection { procedure: String, message: String },

    /// Procedure raised an error (constraint violation, bad input, ...)
    #[error("Procedure {procedure} failed: {message}")]
    Procedure {
        procedure: String,
        code: Option<String>,
        message: String,
    },

    /// Procedure name not present in the prepared call table
    #[error("Unknown procedure: {0}")]
    UnknownProcedure(String),

    /// Parameter count does not match the prepared call
    #[error("{procedure} expects {expected} parameters, got {actual}")]
    Arity {
        procedure: String,
        expected: usize,
        actual: usize,
    },
}

/// Fatal condition detected before any record is processed
#[derive(Debug, Error)]
pub enum SetupError {
    /// Configuration could not be resolved
    #[error(transparent)]
    Config(#[from] csync_common::Error),

    /// Static catalog failed validation
    #[error("Invalid catalog: {0}")]
    Catalog(String),

    /// Source base URL could not be reached at all
    #[error("Source unreachable at {url}: {message}")]
    SourceUnreachable { url: String, message: String },

    /// Target database connection could not be established
    #[error("Target unreachable at {url}: {message}")]
    TargetUnreachable { url: String, message: String },

    /// A catalog procedure does not exist in the target with the declared arity
    #[error("Procedure {procedure}/{arity} not found in target database")]
    MissingProcedure { procedure: String, arity: usize },
}
