//! csync-ingest library interface
//!
//! Moves records from the hosted backend's REST interface into the Citus
//! target through idempotent upsert procedures:
//!
//! - [`source`]: read whole collections over HTTP
//! - [`repair`]: fill blank parent references from a fallback pool
//! - [`catalog`]: static entity / procedure table
//! - [`writer`]: one record, one procedure call, one transaction
//! - [`pipeline`]: sequence the above and build a [`summary::RunSummary`]

pub mod catalog;
pub mod error;
pub mod pipeline;
pub mod repair;
pub mod source;
pub mod summary;
pub mod writer;

pub use crate::catalog::{Catalog, EntityKind};
pub use crate::error::{FetchError, RepairImpossible, SetupError, WriteError};
pub use crate::pipeline::{Pipeline, PipelinePhase};
pub use crate::summary::RunSummary;
