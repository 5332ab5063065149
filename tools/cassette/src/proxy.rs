//! The stand-in that routes collaborator calls through a recorder.
//!
//! Every call is keyed as `<type>-<method>-<digest>` where the digest covers
//! the call's arguments plus the proxy's side-effect state. Methods declared
//! as side-effecting advance that state before they are recorded: their own
//! key uses the state from before the advance, every later call sees the new
//! one. The real collaborator is only built when a call actually has to run.

use crate::canonical::to_args;
use crate::errors::{CallContext, ProxyError, RecordError, SerializationError};
use crate::key::{build_key, check_key_part, ArgsDigest};
use crate::logging::log_event;
use crate::recorder::Recorder;
use crate::side_effects::{SideEffectTable, SideEffectTracker};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// An object whose calls can be recorded and replayed.
pub trait Collaborator: Sized {
    /// Namespace used in every key this type produces.
    const TYPE_NAME: &'static str;
    /// Every method `invoke` understands.
    const METHODS: &'static [&'static str];

    type Error;

    fn construct(args: &[Value]) -> Result<Self, Self::Error>;

    fn invoke(&mut self, method: &str, args: &[Value]) -> Result<Value, Self::Error>;
}

struct ProxyState<C> {
    instance: Option<C>,
    side_effects: SideEffectTracker,
}

pub struct Proxy<C: Collaborator, R: Recorder> {
    recorder: Arc<R>,
    side_effect_methods: BTreeSet<String>,
    construction_args: Vec<Value>,
    state: Mutex<ProxyState<C>>,
}

impl<C: Collaborator, R: Recorder> Proxy<C, R> {
    pub fn new(
        recorder: Arc<R>,
        side_effects: &SideEffectTable,
        construction_args: Vec<Value>,
    ) -> Result<Self, SerializationError> {
        check_key_part("collaborator type", C::TYPE_NAME)?;
        let tracker = SideEffectTracker::seed(&construction_args)?;
        log_event(
            "debug",
            "side_effects_seeded",
            json!({
                "collaborator": C::TYPE_NAME,
                "args": construction_args,
                "state": tracker.current().as_str(),
            }),
        );
        Ok(Self {
            recorder,
            side_effect_methods: side_effects.methods_for(C::TYPE_NAME),
            construction_args,
            state: Mutex::new(ProxyState {
                instance: None,
                side_effects: tracker,
            }),
        })
    }

    /// Like [`Proxy::new`], taking construction arguments as a typed tuple.
    pub fn with_args<A: Serialize + ?Sized>(
        recorder: Arc<R>,
        side_effects: &SideEffectTable,
        construction_args: &A,
    ) -> Result<Self, SerializationError> {
        Self::new(recorder, side_effects, to_args(construction_args)?)
    }

    pub fn collaborator_type(&self) -> &'static str {
        C::TYPE_NAME
    }

    pub fn recorder(&self) -> &Arc<R> {
        &self.recorder
    }

    /// Whether the collaborator type handles `method`. Never builds the
    /// collaborator and never counts as a call.
    pub fn responds_to(&self, method: &str) -> bool {
        C::METHODS.contains(&method)
    }

    pub fn is_constructed(&self) -> bool {
        self.lock_state().instance.is_some()
    }

    pub fn side_effect_state(&self) -> ArgsDigest {
        self.lock_state().side_effects.current().clone()
    }

    /// The key `method(args)` would be recorded under if called now.
    pub fn key_for(&self, method: &str, args: &[Value]) -> Result<String, SerializationError> {
        let state = self.lock_state();
        build_key(C::TYPE_NAME, method, args, Some(state.side_effects.current()))
    }

    pub fn call_with<A: Serialize + ?Sized>(
        &self,
        method: &str,
        args: &A,
    ) -> Result<Value, ProxyError<C::Error>> {
        self.call(method, to_args(args)?)
    }

    pub fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, ProxyError<C::Error>> {
        // Held for the whole call so state, key and construction stay in step.
        let mut state = self.lock_state();
        // A name that cannot be keyed must not advance the state either.
        check_key_part("method", method)?;

        let key_state = if self.side_effect_methods.contains(method) {
            let previous = state.side_effects.advance(&args)?;
            log_event(
                "debug",
                "side_effects_advanced",
                json!({
                    "collaborator": C::TYPE_NAME,
                    "method": method,
                    "args": args,
                    "state": state.side_effects.current().as_str(),
                }),
            );
            previous
        } else {
            state.side_effects.current().clone()
        };

        let key = build_key(C::TYPE_NAME, method, &args, Some(&key_state))?;
        log_event("debug", "proxy_call", json!({ "key": key }));

        let instance = &mut state.instance;
        let construction_args = &self.construction_args;
        let outcome = self.recorder.record(&key, || -> Result<Value, C::Error> {
            let real = match instance {
                Some(real) => real,
                None => {
                    let built = C::construct(construction_args)?;
                    log_event(
                        "debug",
                        "collaborator_constructed",
                        json!({ "collaborator": C::TYPE_NAME }),
                    );
                    instance.insert(built)
                }
            };
            real.invoke(method, &args)
        });

        match outcome {
            Ok(value) => Ok(value),
            Err(RecordError::Call(error)) => Err(ProxyError::Collaborator(error)),
            Err(RecordError::Playback { .. }) => {
                log_event("error", "proxy_playback_miss", json!({ "key": key }));
                Err(ProxyError::Playback(self.context(method, args, key_state)))
            }
            Err(RecordError::Recording { reason, .. }) => {
                log_event(
                    "error",
                    "proxy_recording_failed",
                    json!({ "key": key, "reason": reason }),
                );
                Err(ProxyError::Recording {
                    context: self.context(method, args, key_state),
                    reason,
                })
            }
        }
    }

    fn context(&self, method: &str, args: Vec<Value>, state: ArgsDigest) -> CallContext {
        CallContext {
            collaborator: C::TYPE_NAME,
            method: method.to_string(),
            args,
            side_effects: Some(state.as_str().to_string()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ProxyState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
