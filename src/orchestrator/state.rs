use crate::extract::Record;
use crate::persist::RunSnapshot;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Cancelled | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Idle => "IDLE",
            RunStatus::Running => "RUNNING",
            RunStatus::Paused => "PAUSED",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Cancelled => "CANCELLED",
            RunStatus::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Everything a run has produced so far. Only the orchestrator mutates it.
///
/// Records are append-only; the outside world sees copies through
/// [`ExtractionState::snapshot`].
#[derive(Debug, Clone)]
pub struct ExtractionState {
    status: RunStatus,
    page: usize,
    records: Vec<Record>,
    error_count: usize,
    last_ordinal: usize,
    inter_item_delay_ms: u64,
}

impl ExtractionState {
    pub fn new(inter_item_delay_ms: u64) -> Self {
        Self {
            status: RunStatus::Idle,
            page: 0,
            records: Vec::new(),
            error_count: 0,
            last_ordinal: 0,
            inter_item_delay_ms,
        }
    }

    /// Continues from a saved snapshot: records and error count are kept and
    /// ordinals resume after the highest one already captured.
    pub fn rehydrate(snapshot: RunSnapshot, inter_item_delay_ms: u64) -> Self {
        let last_ordinal = snapshot
            .records
            .iter()
            .filter_map(Record::ordinal)
            .max()
            .unwrap_or(snapshot.records.len());

        Self {
            status: RunStatus::Idle,
            page: 0,
            records: snapshot.records,
            error_count: snapshot.error_count,
            last_ordinal,
            inter_item_delay_ms,
        }
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn set_status(&mut self, status: RunStatus) {
        self.status = status;
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn advance_page(&mut self) -> usize {
        self.page += 1;
        self.page
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn inter_item_delay_ms(&self) -> u64 {
        self.inter_item_delay_ms
    }

    pub fn set_inter_item_delay_ms(&mut self, delay_ms: u64) {
        self.inter_item_delay_ms = delay_ms;
    }

    /// Claims the ordinal of the next visited item, whether it succeeds or not.
    pub fn next_ordinal(&mut self) -> usize {
        self.last_ordinal += 1;
        self.last_ordinal
    }

    pub fn push_record(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    pub fn snapshot(&self, running: bool) -> RunSnapshot {
        RunSnapshot {
            records: self.records.clone(),
            error_count: self.error_count,
            running,
            updated_at: None,
        }
    }
}
