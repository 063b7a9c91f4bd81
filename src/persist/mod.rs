pub mod export;
pub mod snapshot;

pub use export::{CsvQuoting, ExportFormat, Exporter};
pub use snapshot::{JsonSnapshotStore, MemorySnapshotStore, RunSnapshot, SnapshotStore};
