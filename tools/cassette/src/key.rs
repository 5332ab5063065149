//! Cache keys: `<type>-<method>-<digest>`.
//!
//! `-` separates the parts, so neither name may contain it. The digest is hex
//! and never does.

use crate::canonical::encode_args;
use crate::errors::SerializationError;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex SHA-256 of a canonical argument list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArgsDigest(String);

impl ArgsDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArgsDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Digest `args`, folding in `side_effects` as a trailing element when present.
pub fn digest_args(
    args: &[Value],
    side_effects: Option<&ArgsDigest>,
) -> Result<ArgsDigest, SerializationError> {
    let bytes = match side_effects {
        Some(state) => {
            let mut folded = Vec::with_capacity(args.len() + 1);
            folded.extend_from_slice(args);
            folded.push(Value::String(state.0.clone()));
            encode_args(&folded)?
        }
        None => encode_args(args)?,
    };
    Ok(ArgsDigest(hex_digest(&bytes)))
}

/// Compose the cache key for one call: `<type>-<method>-<digest>`.
pub fn build_key(
    collaborator: &str,
    method: &str,
    args: &[Value],
    side_effects: Option<&ArgsDigest>,
) -> Result<String, SerializationError> {
    check_key_part("collaborator type", collaborator)?;
    check_key_part("method", method)?;
    let digest = digest_args(args, side_effects)?;
    Ok(format!("{collaborator}-{method}-{digest}"))
}

/// Reject names that would make two different calls share a key.
pub fn check_key_part(field: &str, name: &str) -> Result<(), SerializationError> {
    if name.is_empty() {
        return Err(SerializationError(format!("{field} name must not be empty")));
    }
    if name.contains('-') {
        return Err(SerializationError(format!(
            "{field} name `{name}` must not contain `-`"
        )));
    }
    Ok(())
}

pub fn hex_digest(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    let mut out = String::with_capacity(hash.len() * 2);
    for byte in hash {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
