pub mod events;
pub mod run;
pub mod state;

pub use events::{EventSink, LogLevel, NullSink, RecordingSink, RunEvent};
pub use run::{Orchestrator, RunSummary};
pub use state::{ExtractionState, RunStatus};
