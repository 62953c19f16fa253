//! Pipeline orchestrator
//!
//! Single pass, strictly sequential:
//!
//! ```text
//! Idle -> Extracting -> Repairing -> Writing -> Done
//! ```
//!
//! - **Extracting**: fetch every collection in catalog order. The fallback
//!   pools a child can use are frozen when the child is fetched, so a parent
//!   fetched later never feeds it.
//! - **Repairing**: fill or reject blank references, record by record.
//! - **Writing**: upsert survivors one at a time; a failure is counted and
//!   the run moves on.
//!
//! Per-record problems never stop the run. Fatal conditions are all checked
//! before a [`Pipeline`] exists (see [`crate::error::SetupError`]).

use crate::catalog::{Catalog, EntitySpec};
use crate::repair::{repair_record, FallbackPool, FallbackRegistry, PoolSnapshot, RepairOutcome};
use crate::source::CollectionSource;
use crate::summary::{IssueStage, RunSummary};
use crate::writer::{IdempotentWriter, ProcedureStore};
use csync_common::Record;
use std::fmt;
use tracing::{error, info, warn};

/// Orchestrator state; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelinePhase {
    Idle,
    Extracting,
    Repairing,
    Writing,
    Done,
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelinePhase::Idle => "idle",
            PipelinePhase::Extracting => "extracting",
            PipelinePhase::Repairing => "repairing",
            PipelinePhase::Writing => "writing",
            PipelinePhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Records of one collection moving through the phases
struct Batch {
    spec_index: usize,
    records: Vec<Record>,
    pools: PoolSnapshot,
}

/// Extract → repair → write, once
pub struct Pipeline<C, S> {
    catalog: Catalog,
    source: C,
    writer: IdempotentWriter<S>,
    phase: PipelinePhase,
    summary: RunSummary,
}

impl<C, S> Pipeline<C, S>
where
    C: CollectionSource,
    S: ProcedureStore,
{
    pub fn new(catalog: Catalog, source: C, store: S) -> Self {
        let mut summary = RunSummary::new();
        for spec in catalog.entities() {
            summary.add_kind(spec.kind, spec.collection);
        }
        Self {
            catalog,
            source,
            writer: IdempotentWriter::new(store),
            phase: PipelinePhase::Idle,
            summary,
        }
    }

    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    /// Run every phase and hand back the summary and the store
    ///
    /// Consumes the pipeline; a new run starts from a new `Pipeline`.
    pub async fn run(mut self) -> (RunSummary, S) {
        self.advance(PipelinePhase::Extracting);
        let batches = self.extract().await;

        self.advance(PipelinePhase::Repairing);
        let batches = self.repair(batches);

        self.advance(PipelinePhase::Writing);
        self.write(batches).await;

        self.advance(PipelinePhase::Done);
        (self.summary, self.writer.into_store())
    }

    fn advance(&mut self, next: PipelinePhase) {
        debug_assert!(next > self.phase, "pipeline cannot move from {} to {}", self.phase, next);
        info!("Pipeline phase: {} -> {}", self.phase, next);
        self.phase = next;
    }

    async fn extract(&mut self) -> Vec<Batch> {
        info!("Starting data extraction from source...");
        let mut registry = FallbackRegistry::new();
        let mut batches = Vec::with_capacity(self.catalog.entities().len());

        for (spec_index, spec) in self.catalog.entities().iter().enumerate() {
            let records = match self.source.fetch_collection(spec.collection).await {
                Ok(records) => records,
                Err(e) => {
                    error!("Error extracting from '{}': {}", spec.collection, e);
                    self.summary
                        .record_issue(spec.kind, IssueStage::Fetch, None, e.to_string());
                    Vec::new()
                }
            };
            self.summary.stats_mut(spec.kind).fetched = records.len();

            // Parents fetched so far; frozen for this collection
            let pools = registry.snapshot(spec);
            registry.register(spec.kind, FallbackPool::from_records(&records, spec.identity));

            batches.push(Batch {
                spec_index,
                records,
                pools,
            });
        }

        batches
    }

    fn repair(&mut self, batches: Vec<Batch>) -> Vec<Batch> {
        batches
            .into_iter()
            .map(|batch| {
                let spec = &self.catalog.entities()[batch.spec_index];
                let mut kept = Vec::with_capacity(batch.records.len());

                for record in batch.records {
                    let record_id = record.text(spec.identity);
                    match repair_record(record, spec, &batch.pools) {
                        RepairOutcome::Ok(r) => kept.push(r),
                        RepairOutcome::Repaired(r) => {
                            self.summary.stats_mut(spec.kind).repaired += 1;
                            kept.push(r);
                        }
                        RepairOutcome::Skip(reason) => {
                            warn!(
                                "{} {} {}. Skipping.",
                                capitalize(spec.kind.as_str()),
                                record_id.as_deref().unwrap_or("<no id>"),
                                reason
                            );
                            self.summary.stats_mut(spec.kind).skipped += 1;
                            self.summary.record_issue(
                                spec.kind,
                                IssueStage::Repair,
                                record_id,
                                reason.to_string(),
                            );
                        }
                    }
                }

                Batch {
                    spec_index: batch.spec_index,
                    records: kept,
                    pools: batch.pools,
                }
            })
            .collect()
    }

    async fn write(&mut self, batches: Vec<Batch>) {
        info!("Starting data ingestion into target database...");
        for batch in batches {
            let spec: &EntitySpec = &self.catalog.entities()[batch.spec_index];
            for record in batch.records {
                match self.writer.write(spec, &record).await {
                    Ok(()) => self.summary.stats_mut(spec.kind).written += 1,
                    Err(e) => {
                        self.summary.stats_mut(spec.kind).failed += 1;
                        self.summary.record_issue(
                            spec.kind,
                            IssueStage::Write,
                            record.text(spec.identity),
                            e.to_string(),
                        );
                    }
                }
            }
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
