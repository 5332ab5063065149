//! Single-file JSONL store.
//!
//! Each line is one `CassetteEntry`. The file is read once when the store is
//! opened and only ever appended to afterwards; when a key appears on more
//! than one line the last line wins, which is how `all` mode overwrites.

use crate::config::RecorderConfig;
use crate::errors::{CassetteError, RecordError};
use crate::logging::log_event;
use crate::recorder::{replay_or_record, RecordMode, Recorder};
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CassetteEntry {
    pub key: String,
    pub recorded_at_unix_ns: u64,
    pub result: Value,
}

pub struct CassetteRecorder {
    path: PathBuf,
    mode: RecordMode,
    fs: Arc<dyn FileSystem>,
    tape: Mutex<HashMap<String, CassetteEntry>>,
}

impl CassetteRecorder {
    /// Open `path`, loading whatever it already holds. A missing file is an
    /// empty cassette.
    pub fn open(
        path: impl AsRef<Path>,
        mode: RecordMode,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self, CassetteError> {
        let path = path.as_ref().to_path_buf();
        let tape = if fs.exists(&path) {
            parse_cassette(&fs.read_to_string(&path)?)?
        } else {
            HashMap::new()
        };
        log_event(
            "debug",
            "cassette_opened",
            json!({
                "path": path.display().to_string(),
                "mode": mode.as_str(),
                "entries": tape.len(),
            }),
        );
        Ok(Self {
            path,
            mode,
            fs,
            tape: Mutex::new(tape),
        })
    }

    pub fn from_config(
        cfg: &RecorderConfig,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self, CassetteError> {
        let path = cfg.cassette.as_ref().ok_or_else(|| {
            CassetteError::InvalidConfig("recorder.cassette must be set".to_string())
        })?;
        Self::open(path, cfg.mode, fs)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> RecordMode {
        self.mode
    }

    pub fn entry(&self, key: &str) -> Option<CassetteEntry> {
        lock(&self.tape).get(key).cloned()
    }

    /// Keys currently on the cassette, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.tape).keys().cloned().collect();
        keys.sort();
        keys
    }

    fn persist(&self, key: &str, value: &Value) -> Result<(), CassetteError> {
        let entry = CassetteEntry {
            key: key.to_string(),
            recorded_at_unix_ns: timestamp_ns(),
            result: value.clone(),
        };
        let line =
            serde_json::to_string(&entry).map_err(|e| CassetteError::Io(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                self.fs.create_dir_all(parent)?;
            }
        }
        self.fs.append_line(&self.path, &line)?;
        lock(&self.tape).insert(entry.key.clone(), entry);
        Ok(())
    }
}

impl Recorder for CassetteRecorder {
    fn record<E, F>(&self, key: &str, call_now: F) -> Result<Value, RecordError<E>>
    where
        F: FnOnce() -> Result<Value, E>,
    {
        let existing = self.entry(key).map(|entry| entry.result);
        replay_or_record(self.mode, key, existing, call_now, |value| {
            self.persist(key, value).map_err(|e| e.to_string())
        })
    }
}

fn parse_cassette(raw: &str) -> Result<HashMap<String, CassetteEntry>, CassetteError> {
    let mut tape = HashMap::new();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry: CassetteEntry = serde_json::from_str(line)
            .map_err(|e| CassetteError::CassetteParse(format!("line {}: {e}", idx + 1)))?;
        tape.insert(entry.key.clone(), entry);
    }
    Ok(tape)
}

fn timestamp_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::{CassetteEntry, CassetteRecorder};
    use crate::config::RecorderConfig;
    use crate::errors::{CassetteError, RecordError};
    use crate::recorder::{RecordMode, Recorder};
    use crate::runtime::FakeFileSystem;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;

    fn line(key: &str, result: serde_json::Value) -> String {
        serde_json::to_string(&CassetteEntry {
            key: key.to_string(),
            recorded_at_unix_ns: 0,
            result,
        })
        .expect("serialize entry")
    }

    #[test]
    fn later_lines_override_earlier_ones() {
        let raw = format!("{}\n\n{}\n", line("k", json!(1)), line("k", json!(2)));
        let fs = FakeFileSystem::with_file("/tape.jsonl", raw);
        let recorder =
            CassetteRecorder::open("/tape.jsonl", RecordMode::None, Arc::new(fs)).expect("open");
        let value = recorder
            .record("k", || Ok::<_, String>(json!(0)))
            .expect("replay");
        assert_eq!(value, json!(2));
    }

    #[test]
    fn malformed_line_names_its_line_number() {
        let raw = format!("{}\nnot json\n", line("k", json!(1)));
        let fs = FakeFileSystem::with_file("/tape.jsonl", raw);
        let err = CassetteRecorder::open("/tape.jsonl", RecordMode::None, Arc::new(fs))
            .err()
            .expect("parse failure");
        assert!(matches!(err, CassetteError::CassetteParse(ref msg) if msg.starts_with("line 2:")));
    }

    #[test]
    fn new_recordings_are_appended_as_jsonl() {
        let fs = FakeFileSystem::default();
        let recorder = CassetteRecorder::open(
            "/fixtures/tape.jsonl",
            RecordMode::NewEpisodes,
            Arc::new(fs.clone()),
        )
        .expect("open");
        recorder
            .record("Clock-now-abc", || Ok::<_, String>(json!({"ts": 1000})))
            .expect("record");

        let contents = fs
            .contents(Path::new("/fixtures/tape.jsonl"))
            .expect("cassette written");
        let entry: CassetteEntry = serde_json::from_str(contents.trim()).expect("parse line");
        assert_eq!(entry.key, "Clock-now-abc");
        assert_eq!(entry.result, json!({"ts": 1000}));
        assert_eq!(fs.created_dirs(), vec![Path::new("/fixtures").to_path_buf()]);
        assert_eq!(recorder.keys(), vec!["Clock-now-abc".to_string()]);
    }

    #[test]
    fn write_failure_surfaces_as_recording_error() {
        let fs = FakeFileSystem::default();
        let recorder =
            CassetteRecorder::open("tape.jsonl", RecordMode::NewEpisodes, Arc::new(fs.clone()))
                .expect("open");
        fs.set_fail_next(CassetteError::Io("read-only file system".to_string()));
        let err = recorder
            .record("k", || Ok::<_, String>(json!(1)))
            .expect_err("write failure");
        match err {
            RecordError::Recording { key, reason } => {
                assert_eq!(key, "k");
                assert!(reason.contains("read-only file system"));
            }
            other => panic!("expected recording error, got {other:?}"),
        }
        assert!(recorder.entry("k").is_none());
    }

    #[test]
    fn from_config_requires_a_cassette_path() {
        let err = CassetteRecorder::from_config(
            &RecorderConfig::default(),
            Arc::new(FakeFileSystem::default()),
        )
        .err()
        .expect("missing path");
        assert!(matches!(err, CassetteError::InvalidConfig(_)));
    }
}
