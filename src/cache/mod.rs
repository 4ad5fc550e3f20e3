//! Cache module for storing API responses to disk
//!
//! This module provides a response cache that persists JSON payloads under a
//! key derived from an operation name and its parameters, with a uniform TTL.
//! The cache is best-effort: storage failures turn into misses and dropped
//! writes, never into errors for the caller.

mod key;
mod manager;

pub use key::{canonical_json, fingerprint, CacheKey};
pub use manager::{CacheSwitch, Cached, ResponseCache, DEFAULT_TTL};
