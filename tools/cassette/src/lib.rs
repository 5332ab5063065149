//! Record and replay calls made to a test collaborator.
//!
//! Wrap a [`Collaborator`] in a [`Proxy`] and every call is either answered
//! from a [`Recorder`] or run for real and stored there, keyed by a stable
//! digest of the call. See [`proxy`] for the keying rules.

pub mod canonical;
pub mod config;
pub mod errors;
pub mod key;
pub mod logging;
pub mod proxy;
pub mod recorder;
pub mod runtime;
pub mod side_effects;

pub use errors::{CallContext, CassetteError, ProxyError, RecordError, SerializationError};
pub use key::{build_key, ArgsDigest};
pub use proxy::{Collaborator, Proxy};
pub use recorder::{CassetteRecorder, MemoryRecorder, RecordMode, Recorder};
pub use side_effects::{SideEffectTable, SideEffectTracker};
