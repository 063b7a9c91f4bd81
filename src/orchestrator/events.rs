use crate::orchestrator::state::RunStatus;
use serde::Serialize;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Success,
}

/// Progress reported while a run is going.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// An item is about to be processed. `index` is the run-wide ordinal.
    Item {
        index: usize,
        total: Option<usize>,
        name: String,
    },
    ItemError {
        name: String,
        message: String,
    },
    Finished {
        total_records: usize,
        status: RunStatus,
        error_count: usize,
    },
    Log {
        level: LogLevel,
        message: String,
    },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: RunEvent);

    fn log(&self, level: LogLevel, message: String) {
        self.emit(RunEvent::Log { level, message });
    }

    fn info(&self, message: String) {
        self.log(LogLevel::Info, message);
    }

    fn warn(&self, message: String) {
        self.log(LogLevel::Warn, message);
    }

    fn error(&self, message: String) {
        self.log(LogLevel::Error, message);
    }

    fn success(&self, message: String) {
        self.log(LogLevel::Success, message);
    }
}

/// Drops everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: RunEvent) {}
}

/// Keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                RunEvent::Log { level: l, message } if l == level => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: RunEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_filters_by_level() {
        let sink = RecordingSink::new();
        sink.info("Iniciando".to_string());
        sink.warn("Sem botão".to_string());
        sink.emit(RunEvent::ItemError {
            name: "ANA".to_string(),
            message: "boom".to_string(),
        });

        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.messages(LogLevel::Warn), vec!["Sem botão".to_string()]);
        assert!(sink.messages(LogLevel::Error).is_empty());
    }

    #[test]
    fn test_events_serialize_with_tag() {
        let event = RunEvent::Item {
            index: 3,
            total: Some(40),
            name: "ANA".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"item\""));
        assert!(json.contains("\"index\":3"));
    }
}
