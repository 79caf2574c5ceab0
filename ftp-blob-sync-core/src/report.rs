//! Run aggregation: per-item outcomes, progress signal and the final summary.

use std::fmt;

use serde::Serialize;

use crate::contract::RemoteItem;

/// Step of the per-item pipeline that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Fetch,
    Lookup,
    Write,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureStage::Fetch => "fetch",
            FailureStage::Lookup => "lookup",
            FailureStage::Write => "write",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipReason {
    /// Stored fingerprint matches the fetched content.
    Unchanged,
}

/// Terminal state of one file item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ItemOutcome {
    Skipped { reason: SkipReason },
    Created,
    Replaced,
    Failed { stage: FailureStage, cause: String },
}

impl ItemOutcome {
    pub fn failed(stage: FailureStage, cause: impl fmt::Display) -> Self {
        ItemOutcome::Failed {
            stage,
            cause: cause.to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ItemOutcome::Failed { .. })
    }

    /// Whether the sink was written for this item.
    pub fn uploaded(&self) -> bool {
        matches!(self, ItemOutcome::Created | ItemOutcome::Replaced)
    }
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemOutcome::Skipped { .. } => f.write_str("unchanged"),
            ItemOutcome::Created => f.write_str("created"),
            ItemOutcome::Replaced => f.write_str("replaced"),
            ItemOutcome::Failed { stage, cause } => write!(f, "{stage} failed: {cause}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub name: String,
    pub outcome: ItemOutcome,
}

/// Progress signal emitted after each file item completes.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    /// 1-based position of the item within the full listing.
    pub index: usize,
    /// Number of entries in the listing, directories included.
    pub total: usize,
    pub item: &'a RemoteItem,
    pub outcome: &'a ItemOutcome,
}

/// Receives progress while a run is underway.
pub trait SyncObserver: Send {
    fn listing_received(&mut self, _total: usize) {}

    fn directory_skipped(&mut self, _index: usize, _item: &RemoteItem) {}

    fn item_finished(&mut self, _progress: &Progress<'_>) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SyncObserver for NoopObserver {}

/// Summary of a completed (or cancelled) run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Listing entries visited, directories included.
    pub entries_seen: usize,
    pub directories_skipped: usize,
    pub created: usize,
    pub replaced: usize,
    pub skipped: usize,
    pub failed: usize,
    /// One entry per file item, in processing order.
    pub items: Vec<ItemReport>,
    /// Set when a cancellation request stopped the run before the listing was exhausted.
    pub cancelled: bool,
}

impl SyncReport {
    pub fn record_directory(&mut self) {
        self.entries_seen += 1;
        self.directories_skipped += 1;
    }

    pub fn record(&mut self, name: impl Into<String>, outcome: ItemOutcome) {
        self.entries_seen += 1;
        match &outcome {
            ItemOutcome::Skipped { .. } => self.skipped += 1,
            ItemOutcome::Created => self.created += 1,
            ItemOutcome::Replaced => self.replaced += 1,
            ItemOutcome::Failed { .. } => self.failed += 1,
        }
        self.items.push(ItemReport {
            name: name.into(),
            outcome,
        });
    }

    /// File items that reached a terminal state.
    pub fn files_processed(&self) -> usize {
        self.items.len()
    }

    pub fn uploads(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.outcome.uploaded())
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|item| item.outcome.is_failure())
    }

    /// Outcome of the last item processed under `name`.
    pub fn outcome_of(&self, name: &str) -> Option<&ItemOutcome> {
        self.items
            .iter()
            .rev()
            .find(|item| item.name == name)
            .map(|item| &item.outcome)
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files processed: {} created, {} replaced, {} unchanged, {} failed ({} directories skipped)",
            self.files_processed(),
            self.created,
            self.replaced,
            self.skipped,
            self.failed,
            self.directories_skipped
        )?;
        if self.cancelled {
            f.write_str(" [cancelled]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_follow_recorded_outcomes() {
        let mut report = SyncReport::default();
        report.record("a", ItemOutcome::Created);
        report.record_directory();
        report.record(
            "b",
            ItemOutcome::Skipped {
                reason: SkipReason::Unchanged,
            },
        );
        report.record("c", ItemOutcome::failed(FailureStage::Write, "503"));
        report.record("d", ItemOutcome::Replaced);

        assert_eq!(report.entries_seen, 5);
        assert_eq!(report.files_processed(), 4);
        assert_eq!(report.directories_skipped, 1);
        assert_eq!(report.uploads(), 2);
        assert!(report.has_failures());

        let failures: Vec<&str> = report.failures().map(|f| f.name.as_str()).collect();
        assert_eq!(failures, vec!["c"]);
        assert_eq!(report.outcome_of("d"), Some(&ItemOutcome::Replaced));
        assert_eq!(report.outcome_of("missing"), None);
    }

    #[test]
    fn summary_line_mentions_every_counter() {
        let mut report = SyncReport::default();
        report.record("a", ItemOutcome::Created);
        report.cancelled = true;
        assert_eq!(
            report.to_string(),
            "1 files processed: 1 created, 0 replaced, 0 unchanged, 0 failed (0 directories skipped) [cancelled]"
        );
    }

    #[test]
    fn failed_outcome_serialises_stage_and_cause() {
        let outcome = ItemOutcome::failed(FailureStage::Fetch, "550 not found");
        assert!(!outcome.uploaded());
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["stage"], "fetch");
        assert_eq!(json["cause"], "550 not found");
    }
}
