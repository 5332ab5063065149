use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// A value could not be turned into the pinned canonical byte form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("serialization error: {0}")]
pub struct SerializationError(pub String);

#[derive(Debug, Error)]
pub enum CassetteError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Serialization(#[from] SerializationError),
    #[error("cassette parse error: {0}")]
    CassetteParse(String),
}

/// Failure reported by a [`Recorder`](crate::recorder::Recorder) for a single key.
///
/// `E` is the collaborator's own error type; `Call` hands it back untouched.
#[derive(Debug, Error)]
pub enum RecordError<E> {
    #[error("no recording for key {key}")]
    Playback { key: String },
    #[error("could not persist recording for key {key}: {reason}")]
    Recording { key: String, reason: String },
    #[error(transparent)]
    Call(E),
}

/// Everything needed to tell which call was expected to be on tape.
#[derive(Debug, Clone, PartialEq)]
pub struct CallContext {
    pub collaborator: &'static str,
    pub method: String,
    pub args: Vec<Value>,
    /// Side-effect digest the key was computed under.
    pub side_effects: Option<String>,
}

impl fmt::Display for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = serde_json::to_string(&self.args).unwrap_or_else(|_| "<unprintable>".into());
        write!(
            f,
            "{}#{} args={} side_effects={}",
            self.collaborator,
            self.method,
            args,
            self.side_effects.as_deref().unwrap_or("none")
        )
    }
}

#[derive(Debug, Error)]
pub enum ProxyError<E> {
    #[error(transparent)]
    Serialization(#[from] SerializationError),
    #[error("no recording for {0}")]
    Playback(CallContext),
    #[error("failed to record {context}: {reason}")]
    Recording { context: CallContext, reason: String },
    #[error(transparent)]
    Collaborator(E),
}

impl<E> ProxyError<E> {
    pub fn context(&self) -> Option<&CallContext> {
        match self {
            Self::Playback(context) | Self::Recording { context, .. } => Some(context),
            Self::Serialization(_) | Self::Collaborator(_) => None,
        }
    }
}
