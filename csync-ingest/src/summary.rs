//! Run summary
//!
//! Per-kind counters plus the list of non-fatal issues seen during a run.
//! Rendered as a text table for the log and serializable to JSON for
//! machine consumers.

use crate::catalog::EntityKind;
use serde::Serialize;
use std::fmt;

/// Counters for one entity kind
///
/// `repaired` counts records whose reference was filled; those records are
/// also counted in `written` or `failed` depending on the write outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindStats {
    pub fetched: usize,
    pub written: usize,
    pub repaired: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct KindSummary {
    pub kind: EntityKind,
    pub collection: String,
    #[serde(flatten)]
    pub stats: KindStats,
}

/// Stage at which a non-fatal issue occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStage {
    Fetch,
    Repair,
    Write,
}

/// One non-fatal problem, tied to a record when there is one
#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub kind: EntityKind,
    pub stage: IssueStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    pub message: String,
}

/// Outcome of a full pipeline run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub kinds: Vec<KindSummary>,
    pub issues: Vec<Issue>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row for `kind`; rows keep insertion order
    pub fn add_kind(&mut self, kind: EntityKind, collection: &str) {
        self.kinds.push(KindSummary {
            kind,
            collection: collection.to_string(),
            stats: KindStats::default(),
        });
    }

    pub fn stats(&self, kind: EntityKind) -> Option<&KindStats> {
        self.kinds.iter().find(|k| k.kind == kind).map(|k| &k.stats)
    }

    /// Counters for `kind`, adding a row if missing
    pub fn stats_mut(&mut self, kind: EntityKind) -> &mut KindStats {
        let index = match self.kinds.iter().position(|k| k.kind == kind) {
            Some(i) => i,
            None => {
                self.add_kind(kind, "");
                self.kinds.len() - 1
            }
        };
        &mut self.kinds[index].stats
    }

    pub fn record_issue(
        &mut self,
        kind: EntityKind,
        stage: IssueStage,
        record_id: Option<String>,
        message: impl Into<String>,
    ) {
        self.issues.push(Issue {
            kind,
            stage,
            record_id,
            message: message.into(),
        });
    }

    /// Sum of all per-kind counters
    pub fn totals(&self) -> KindStats {
        self.kinds.iter().fold(KindStats::default(), |acc, k| KindStats {
            fetched: acc.fetched + k.stats.fetched,
            written: acc.written + k.stats.written,
            repaired: acc.repaired + k.stats.repaired,
            skipped: acc.skipped + k.stats.skipped,
            failed: acc.failed + k.stats.failed,
        })
    }

    /// True when any record was skipped, failed, or a fetch failed
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<12} {:>8} {:>8} {:>8} {:>8} {:>8}",
            "kind", "fetched", "written", "repaired", "skipped", "failed"
        )?;
        for k in &self.kinds {
            writeln!(
                f,
                "{:<12} {:>8} {:>8} {:>8} {:>8} {:>8}",
                k.kind.as_str(),
                k.stats.fetched,
                k.stats.written,
                k.stats.repaired,
                k.stats.skipped,
                k.stats.failed
            )?;
        }
        if !self.issues.is_empty() {
            writeln!(f, "{} issue(s):", self.issues.len())?;
            for issue in &self.issues {
                match &issue.record_id {
                    Some(id) => writeln!(
                        f,
                        "  [{:?}] {} {}: {}",
                        issue.stage, issue.kind, id, issue.message
                    )?,
                    None => writeln!(f, "  [{:?}] {}: {}", issue.stage, issue.kind, issue.message)?,
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_and_display() {
        let mut summary = RunSummary::new();
        summary.add_kind(EntityKind::Profile, "profiles");
        summary.add_kind(EntityKind::Workspace, "workspaces");
        summary.stats_mut(EntityKind::Profile).written = 2;
        summary.stats_mut(EntityKind::Workspace).skipped = 1;
        summary.record_issue(
            EntityKind::Workspace,
            IssueStage::Repair,
            Some("W1".to_string()),
            "no fallback",
        );

        let totals = summary.totals();
        assert_eq!(totals.written, 2);
        assert_eq!(totals.skipped, 1);
        assert!(summary.has_issues());

        let text = summary.to_string();
        assert!(text.contains("profile"));
        assert!(text.contains("[Repair] workspace W1: no fallback"));
    }

    #[test]
    fn test_json_shape() {
        let mut summary = RunSummary::new();
        summary.add_kind(EntityKind::Page, "pages");
        summary.stats_mut(EntityKind::Page).failed = 1;
        summary.record_issue(EntityKind::Page, IssueStage::Fetch, None, "HTTP 500");

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["kinds"][0]["kind"], "page");
        assert_eq!(value["kinds"][0]["collection"], "pages");
        assert_eq!(value["kinds"][0]["failed"], 1);
        assert_eq!(value["issues"][0]["stage"], "fetch");
        assert!(value["issues"][0].get("record_id").is_none());
    }
}
