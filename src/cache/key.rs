//! Cache key derivation
//!
//! A key is a truncated SHA-256 digest over an operation name and the
//! canonical JSON form of its parameters. Object keys are sorted at every
//! nesting level, so two parameter maps holding the same pairs always produce
//! the same key no matter how they were built.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hex characters kept from the digest (128 bits)
const KEY_HEX_LEN: usize = 32;

/// Number of hex characters kept by [`fingerprint`]
const FINGERPRINT_HEX_LEN: usize = 16;

/// Deterministic identifier for one cached operation call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for `operation` called with `params`
    pub fn derive(operation: &str, params: &Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(key_material(operation, params).as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(digest[..KEY_HEX_LEN].to_string())
    }

    /// Returns the key as a hex string, suitable as a file stem
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds the string that gets hashed.
///
/// The operation name is length-prefixed so that no choice of name and
/// parameters can be mistaken for a different split of the same bytes.
fn key_material(operation: &str, params: &Value) -> String {
    let mut out = format!("{}:{}\n", operation.len(), operation);
    write_canonical(params, &mut out);
    out
}

/// Serializes `value` into `out` with object keys sorted lexicographically
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // A String always serializes
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Reduces an arbitrary byte payload to a short stable hex fingerprint.
///
/// Use this for parameters that are too large to key on directly, such as
/// prompts or crawl dumps.
pub fn fingerprint(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hex::encode(hasher.finalize());
    digest[..FINGERPRINT_HEX_LEN].to_string()
}
