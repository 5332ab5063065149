//! Which methods change later behavior, and the running digest they advance.
//!
//! The state starts as the digest of the construction arguments. Each
//! side-effecting call folds its own arguments into it.

use crate::config::CassetteConfig;
use crate::errors::SerializationError;
use crate::key::{digest_args, ArgsDigest};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Collaborator type name -> methods whose calls change later behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideEffectTable {
    methods: BTreeMap<String, BTreeSet<String>>,
}

impl SideEffectTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare<I, S>(mut self, collaborator: &str, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods
            .entry(collaborator.to_string())
            .or_default()
            .extend(methods.into_iter().map(Into::into));
        self
    }

    pub fn from_config(cfg: &CassetteConfig) -> Self {
        cfg.collaborators
            .iter()
            .fold(Self::new(), |table, (name, collaborator)| {
                table.declare(name, collaborator.side_effects.iter().cloned())
            })
    }

    pub fn methods_for(&self, collaborator: &str) -> BTreeSet<String> {
        self.methods.get(collaborator).cloned().unwrap_or_default()
    }

    pub fn is_side_effecting(&self, collaborator: &str, method: &str) -> bool {
        self.methods
            .get(collaborator)
            .is_some_and(|methods| methods.contains(method))
    }
}

/// Running fold of every side-effecting call made through one proxy.
///
/// The state only ever moves forward; there is no way to rewind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideEffectTracker {
    state: ArgsDigest,
}

impl SideEffectTracker {
    /// Seed from the construction arguments alone.
    pub fn seed(construction_args: &[Value]) -> Result<Self, SerializationError> {
        Ok(Self {
            state: digest_args(construction_args, None)?,
        })
    }

    /// Fold `method_args` into the state and return the state it replaced.
    pub fn advance(&mut self, method_args: &[Value]) -> Result<ArgsDigest, SerializationError> {
        let next = digest_args(method_args, Some(&self.state))?;
        Ok(std::mem::replace(&mut self.state, next))
    }

    pub fn current(&self) -> &ArgsDigest {
        &self.state
    }
}
