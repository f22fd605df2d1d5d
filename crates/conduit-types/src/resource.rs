//! Resource-name and permalink parsing.
//!
//! Resource names look like `connectors/my-dest` (or deeper paths such as
//! `users/alice/connectors/my-dest`); permalinks look like `connectors/<uid>`.
//! Everything here is a pure function over strings.

use std::collections::BTreeMap;

use crate::error::{ResourceError, Result};

/// Header carrying the authenticated owner's UID (set by the gateway from the JWT subject).
pub const HEADER_OWNER_UID: &str = "jwt-sub";

/// Header carrying the owner's human-readable ID.
pub const HEADER_OWNER_ID: &str = "owner-id";

/// Return the enclosing collection identifier of a resource name.
///
/// The collection is the second-to-last path element: `connectors/a` yields
/// `connectors`, `users/u/connectors/a` yields `connectors`.
pub fn split_collection_and_id(name: &str) -> Result<&str> {
    let Some(idx) = name.rfind('/') else {
        return Err(ResourceError::MalformedName(name.to_string()));
    };
    let prefix = &name[..idx];
    if prefix.is_empty() {
        return Err(ResourceError::MalformedName(name.to_string()));
    }
    let collection = match prefix.rfind('/') {
        Some(i) => &prefix[i + 1..],
        None => prefix,
    };
    if collection.is_empty() {
        return Err(ResourceError::MalformedName(name.to_string()));
    }
    Ok(collection)
}

/// Return the final path segment of a resource name.
pub fn extract_resource_id(name: &str) -> Result<&str> {
    let id = last_segment(name);
    if id.is_empty() {
        return Err(ResourceError::MalformedName(name.to_string()));
    }
    Ok(id)
}

/// Return the UID segment of a permalink.
pub fn extract_uid_from_permalink(permalink: &str) -> Result<&str> {
    let uid = last_segment(permalink);
    if uid.is_empty() {
        return Err(ResourceError::MalformedPermalink(permalink.to_string()));
    }
    Ok(uid)
}

fn last_segment(s: &str) -> &str {
    match s.rfind('/') {
        Some(i) => &s[i + 1..],
        None => s,
    }
}

/// Inbound request metadata (header name → values).
///
/// Keys are case-insensitive; they are stored lowercased. A header may carry
/// several values, mirroring gRPC metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    entries: BTreeMap<String, Vec<String>>,
}

impl RequestMetadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value to a header.
    pub fn append(&mut self, key: &str, value: impl Into<String>) {
        self.entries
            .entry(key.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// Builder form of [`append`](Self::append).
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.append(key, value);
        self
    }

    /// All values recorded for a header.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The value of a single-value header.
    ///
    /// Returns `None` when the header is absent, repeated, or empty.
    pub fn single(&self, key: &str) -> Option<&str> {
        match self.get_all(key) {
            [value] if !value.is_empty() => Some(value.as_str()),
            _ => None,
        }
    }

    /// Whether the header is present at all.
    pub fn contains(&self, key: &str) -> bool {
        !self.get_all(key).is_empty()
    }
}
