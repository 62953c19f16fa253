//! Reference repair
//!
//! Fills blank foreign-key fields from a fallback pool of parent identities.
//! Pure functions of (record, pool); nothing here touches the network or the
//! target store.
//!
//! The fallback value is always the FIRST identity of the pool, in the order
//! the parent collection was returned by the source. Every orphaned child in
//! a run is therefore attached to the same parent, and repeated runs over the
//! same source data pick the same parent.

use crate::catalog::{EntityKind, EntitySpec, MissingReference, ReferencePolicy};
use crate::error::RepairImpossible;
use csync_common::Record;
use std::collections::HashMap;
use tracing::info;

/// Identities of one parent collection, in source order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallbackPool {
    identities: Vec<String>,
}

impl FallbackPool {
    /// Collect non-blank identities from `records`, keeping their order
    pub fn from_records(records: &[Record], identity_field: &str) -> Self {
        Self {
            identities: records
                .iter()
                .filter_map(|r| r.text(identity_field))
                .collect(),
        }
    }

    pub fn from_identities<I, S>(identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identities: identities.into_iter().map(Into::into).collect(),
        }
    }

    /// Fallback value: first identity of the pool
    pub fn first(&self) -> Option<&str> {
        self.identities.first().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

/// Pools registered so far in a run, keyed by parent kind
///
/// A pool is registered when its collection has been fetched and is never
/// replaced afterwards.
#[derive(Debug, Default)]
pub struct FallbackRegistry {
    pools: HashMap<EntityKind, FallbackPool>,
}

impl FallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the pool for `kind`; a second registration is ignored
    pub fn register(&mut self, kind: EntityKind, pool: FallbackPool) {
        self.pools.entry(kind).or_insert(pool);
    }

    /// Pool for `kind`, empty when that collection has not been fetched yet
    pub fn pool(&self, kind: EntityKind) -> FallbackPool {
        self.pools.get(&kind).cloned().unwrap_or_default()
    }

    /// Pools for every parent referenced by `spec`, as of now
    pub fn snapshot(&self, spec: &EntitySpec) -> PoolSnapshot {
        PoolSnapshot {
            pools: spec
                .references
                .iter()
                .map(|r| (r.parent, self.pool(r.parent)))
                .collect(),
        }
    }
}

/// Parent pools frozen at the moment a child collection was fetched
#[derive(Debug, Clone, Default)]
pub struct PoolSnapshot {
    pools: HashMap<EntityKind, FallbackPool>,
}

impl PoolSnapshot {
    pub fn pool(&self, kind: EntityKind) -> Option<&FallbackPool> {
        self.pools.get(&kind)
    }
}

/// Result of repairing one record
#[derive(Debug, Clone, PartialEq)]
pub enum RepairOutcome {
    /// All references present (or allowed to be null)
    Ok(Record),
    /// At least one reference was filled from a fallback pool
    Repaired(Record),
    /// Record must not be written
    Skip(RepairImpossible),
}

impl RepairOutcome {
    pub fn is_skip(&self) -> bool {
        matches!(self, RepairOutcome::Skip(_))
    }
}

/// Repair a single reference field of `record`
///
/// `identity_field` names the record in the log note.
pub fn repair(
    mut record: Record,
    identity_field: &str,
    policy: &ReferencePolicy,
    pool: &FallbackPool,
) -> RepairOutcome {
    if !record.is_blank(policy.field) {
        return RepairOutcome::Ok(record);
    }

    match policy.on_missing {
        MissingReference::Nullable => RepairOutcome::Ok(record),
        MissingReference::Required => RepairOutcome::Skip(RepairImpossible::RequiredMissing {
            field: policy.field.to_string(),
        }),
        MissingReference::Fallback => match pool.first() {
            Some(fallback) => {
                info!(
                    "Record {} is missing a {}. Assigning {}: {}",
                    record.text(identity_field).unwrap_or_else(|| "<no id>".to_string()),
                    policy.field,
                    policy.field,
                    fallback
                );
                record.set(policy.field, fallback);
                RepairOutcome::Repaired(record)
            }
            None => RepairOutcome::Skip(RepairImpossible::NoFallback {
                field: policy.field.to_string(),
                parent: policy.parent,
            }),
        },
    }
}

/// Repair every reference of `spec` in declared order
///
/// Stops at the first reference that cannot be repaired.
pub fn repair_record(record: Record, spec: &EntitySpec, pools: &PoolSnapshot) -> RepairOutcome {
    let empty = FallbackPool::default();
    let mut repaired = false;
    let mut current = record;

    for policy in spec.references {
        let pool = pools.pool(policy.parent).unwrap_or(&empty);
        match repair(current, spec.identity, policy, pool) {
            RepairOutcome::Ok(r) => current = r,
            RepairOutcome::Repaired(r) => {
                repaired = true;
                current = r;
            }
            skip @ RepairOutcome::Skip(_) => return skip,
        }
    }

    if repaired {
        RepairOutcome::Repaired(current)
    } else {
        RepairOutcome::Ok(current)
    }
}
