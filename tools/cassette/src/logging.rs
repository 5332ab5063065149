use crate::errors::CassetteError;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

#[derive(Debug)]
pub struct JsonlLogger {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
    write_lock: Mutex<()>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub level: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

impl JsonlLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_payload_bytes: 4096,
            write_lock: Mutex::new(()),
        }
    }

    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), CassetteError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| CassetteError::Io(e.to_string()))?;
        }
        let truncated = truncate_json(event.payload.clone(), self.max_payload_bytes);
        let line = serde_json::to_string(&LogEvent {
            level: event.level,
            event_type: event.event_type,
            payload: truncated,
        })
        .map_err(|e| CassetteError::Io(e.to_string()))?;

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| CassetteError::Io(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| CassetteError::Io(e.to_string()))
    }
}

fn truncate_json(value: Value, max_bytes: usize) -> Value {
    let rendered = serde_json::to_string(&value).unwrap_or_default();
    if rendered.len() <= max_bytes {
        return value;
    }
    let mut cut = max_bytes.saturating_sub(3);
    while !rendered.is_char_boundary(cut) {
        cut -= 1;
    }
    Value::String(format!("{}...", &rendered[..cut]))
}

// ── Process-wide event log ────────────────────────────────────────────────────

static EVENT_LOG: OnceLock<Mutex<Option<Arc<JsonlLogger>>>> = OnceLock::new();

fn event_log_slot() -> &'static Mutex<Option<Arc<JsonlLogger>>> {
    EVENT_LOG.get_or_init(|| Mutex::new(None))
}

/// Route proxy events to `path` until [`clear_event_log`] is called.
pub fn init_event_log(path: impl AsRef<Path>) -> Result<(), CassetteError> {
    let logger = JsonlLogger::new(path);
    if let Some(parent) = logger.path.parent() {
        fs::create_dir_all(parent).map_err(|e| CassetteError::Io(e.to_string()))?;
    }
    *event_log_slot()
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(logger));
    Ok(())
}

pub fn clear_event_log() {
    *event_log_slot()
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = None;
}

/// Append an event if an event log is active; a no-op otherwise.
///
/// Write failures are swallowed so diagnostics never change call outcomes.
pub fn log_event(level: &str, event_type: &str, payload: Value) {
    let logger = {
        let guard = event_log_slot()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(logger) => Arc::clone(logger),
            None => return,
        }
    };
    let _ = logger.append(&LogEvent {
        level,
        event_type,
        payload,
    });
}
