use crate::ids::WorkItemId;
use crate::record::ResultSet;

/// Lifecycle of one batch work item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ItemStatus {
    #[default]
    Pending,
    Searching,
    Success,
    Failed,
}

impl ItemStatus {
    /// Whether the item has been through a search attempt.
    pub fn is_settled(&self) -> bool {
        matches!(self, ItemStatus::Success | ItemStatus::Failed)
    }
}

/// Unit of work for the batch pipeline, usually one file from a list.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorkItem {
    pub id: WorkItemId,
    /// Display label, typically the source file name.
    pub label: String,
    /// Search query; `None` marks the item as unprocessable.
    pub query: Option<String>,
    pub status: ItemStatus,
    pub result: Option<ResultSet>,
    pub error: Option<String>,
}

impl WorkItem {
    pub fn new(label: impl Into<String>, query: Option<String>) -> Self {
        Self {
            id: WorkItemId::new(),
            label: label.into(),
            query: query.filter(|q| !q.trim().is_empty()),
            status: ItemStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn is_processable(&self) -> bool {
        self.query.is_some()
    }

    /// Whether the last attempt produced at least one record.
    pub fn has_result(&self) -> bool {
        self.result.as_ref().is_some_and(|r| !r.is_empty())
    }

    pub fn reset(&mut self) {
        self.status = ItemStatus::Pending;
        self.result = None;
        self.error = None;
    }
}

/// Batch job lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BatchState {
    #[default]
    Idle,
    Running,
    Paused,
}

/// Progress tally for a batch job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatchCounters {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchCounters {
    pub fn record(&mut self, succeeded: bool) {
        self.processed += 1;
        if succeeded {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Remove a settled item's previous contribution to the tally.
    pub fn withdraw(&mut self, status: ItemStatus) {
        match status {
            ItemStatus::Success => {
                self.processed = self.processed.saturating_sub(1);
                self.succeeded = self.succeeded.saturating_sub(1);
            }
            ItemStatus::Failed => {
                self.processed = self.processed.saturating_sub(1);
                self.failed = self.failed.saturating_sub(1);
            }
            ItemStatus::Pending | ItemStatus::Searching => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_queries_make_items_unprocessable() {
        assert!(!WorkItem::new("movie.mp4", Some("  ".into())).is_processable());
        assert!(!WorkItem::new("movie.mp4", None).is_processable());
        assert!(WorkItem::new("abc-123.mp4", Some("ABC-123".into())).is_processable());
    }

    #[test]
    fn withdraw_reverses_record() {
        let mut counters = BatchCounters {
            total: 2,
            ..BatchCounters::default()
        };
        counters.record(true);
        counters.record(false);
        counters.withdraw(ItemStatus::Failed);

        assert_eq!(counters.processed, 1);
        assert_eq!(counters.succeeded, 1);
        assert_eq!(counters.failed, 0);

        counters.withdraw(ItemStatus::Pending);
        assert_eq!(counters.processed, 1);
    }
}
