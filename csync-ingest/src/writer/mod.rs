//! Idempotent writer
//!
//! Applies one record at a time by calling the entity's upsert procedure
//! with positional parameters taken from the catalog. Each call is its own
//! commit/rollback unit. A failed call is logged and returned to the caller
//! as a [`WriteError`]; the writer stays usable for the next record.
//!
//! Writes are never retried. The procedures upsert by identity, so running
//! the whole pipeline again is the retry.

pub mod postgres;

use crate::catalog::EntitySpec;
use crate::error::WriteError;
use async_trait::async_trait;
use csync_common::Record;
use tracing::{error, info};

pub use postgres::PgProcedureStore;

/// Target store exposing named, idempotent procedures
///
/// Parameters are passed as text in declaration order; `None` is SQL NULL.
#[async_trait]
pub trait ProcedureStore: Send {
    /// Invoke `procedure` once, committing on success and rolling back on failure
    async fn call(&mut self, procedure: &str, params: &[Option<String>]) -> Result<(), WriteError>;

    /// Release the connection at the end of a run
    async fn close(self);
}

/// Ordered parameter values of `record` for `spec`'s procedure
pub fn extract_params(spec: &EntitySpec, record: &Record) -> Vec<Option<String>> {
    spec.params.iter().map(|p| record.text(p.field)).collect()
}

/// Writes records through a [`ProcedureStore`]
pub struct IdempotentWriter<S> {
    store: S,
}

impl<S: ProcedureStore> IdempotentWriter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Upsert one record of `spec`'s kind
    pub async fn write(&mut self, spec: &EntitySpec, record: &Record) -> Result<(), WriteError> {
        let label = record
            .text(spec.label)
            .or_else(|| record.text(spec.identity))
            .unwrap_or_else(|| "<unnamed>".to_string());
        info!("  -> Upserting {}: {}", spec.kind, label);

        let params = extract_params(spec, record);
        self.store.call(spec.procedure, &params).await.map_err(|e| {
            error!(
                kind = %spec.kind,
                id = record.text(spec.identity).as_deref().unwrap_or("<no id>"),
                "Error executing function {}: {}",
                spec.procedure,
                e
            );
            e
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}
