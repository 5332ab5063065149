use crate::errors::RecordError;
use crate::recorder::{replay_or_record, RecordMode, Recorder};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// In-memory store. Remembers every key it was asked for, in order.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    mode: RecordMode,
    tape: Mutex<HashMap<String, Value>>,
    requested: Mutex<Vec<String>>,
    fail_next_write: Mutex<Option<String>>,
}

impl MemoryRecorder {
    pub fn new(mode: RecordMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_recording(self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    pub fn mode(&self) -> RecordMode {
        self.mode
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        lock(&self.tape).insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        lock(&self.tape).get(key).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.tape).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recorded keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.tape).keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Every key passed to [`Recorder::record`], hits and misses alike.
    pub fn requested_keys(&self) -> Vec<String> {
        lock(&self.requested).clone()
    }

    /// Make the next attempt to store a fresh result fail with `reason`.
    pub fn set_fail_next_write(&self, reason: impl Into<String>) {
        *lock(&self.fail_next_write) = Some(reason.into());
    }
}

impl Recorder for MemoryRecorder {
    fn record<E, F>(&self, key: &str, call_now: F) -> Result<Value, RecordError<E>>
    where
        F: FnOnce() -> Result<Value, E>,
    {
        lock(&self.requested).push(key.to_string());
        let existing = self.get(key);
        replay_or_record(self.mode, key, existing, call_now, |value| {
            if let Some(reason) = lock(&self.fail_next_write).take() {
                return Err(reason);
            }
            self.insert(key, value.clone());
            Ok(())
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
