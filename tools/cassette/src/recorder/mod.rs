//! Stores that hold recorded call results by key.
//!
//! The proxy only ever talks to the [`Recorder`] trait. Two stores ship with
//! the crate:
//! 1. **MemoryRecorder** – a map held in memory, mostly for tests
//! 2. **CassetteRecorder** – one JSONL file with one `CassetteEntry` per line
//!
//! Both follow the same [`RecordMode`] rules through [`replay_or_record`].

pub mod cassette;
pub mod memory;

pub use cassette::{CassetteEntry, CassetteRecorder};
pub use memory::MemoryRecorder;

use crate::errors::RecordError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub trait Recorder {
    /// Return the result stored under `key`, or run `call_now`, store what it
    /// returns and hand that back. Errors from `call_now` come back as
    /// [`RecordError::Call`] and nothing is stored for them.
    fn record<E, F>(&self, key: &str, call_now: F) -> Result<Value, RecordError<E>>
    where
        F: FnOnce() -> Result<Value, E>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordMode {
    /// Replay only; a missing key is a playback error.
    None,
    /// Replay what exists, record what does not.
    #[default]
    NewEpisodes,
    /// Always run the real call and overwrite.
    All,
}

impl RecordMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::NewEpisodes => "new_episodes",
            Self::All => "all",
        }
    }
}

impl fmt::Display for RecordMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "new_episodes" => Ok(Self::NewEpisodes),
            "all" => Ok(Self::All),
            other => Err(format!(
                "unknown record mode `{other}` (expected none, new_episodes or all)"
            )),
        }
    }
}

/// Mode rules shared by every store.
///
/// `existing` is what the store holds for `key`; `persist` saves a fresh
/// result and reports why it could not.
pub fn replay_or_record<E, F, P>(
    mode: RecordMode,
    key: &str,
    existing: Option<Value>,
    call_now: F,
    persist: P,
) -> Result<Value, RecordError<E>>
where
    F: FnOnce() -> Result<Value, E>,
    P: FnOnce(&Value) -> Result<(), String>,
{
    match (mode, existing) {
        (RecordMode::None | RecordMode::NewEpisodes, Some(value)) => Ok(value),
        (RecordMode::None, None) => Err(RecordError::Playback {
            key: key.to_string(),
        }),
        (RecordMode::NewEpisodes, None) | (RecordMode::All, _) => {
            let value = call_now().map_err(RecordError::Call)?;
            persist(&value).map_err(|reason| RecordError::Recording {
                key: key.to_string(),
                reason,
            })?;
            Ok(value)
        }
    }
}
