//! Cache keys
//!
//! A key is the identity of a request: two requests with equal keys share
//! one cache entry and one in-flight fetch.

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::error::PreconditionError;

/// Identity of a cacheable request.
pub trait ResourceKey: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Reject keys that can never name a resource. Called once when an
    /// accessor is bound.
    fn validate(&self) -> Result<(), PreconditionError> {
        Ok(())
    }
}

fn numeric_id(raw: &str) -> Result<(), PreconditionError> {
    if raw.is_empty() {
        return Err(PreconditionError::InvalidKey {
            key: raw.to_string(),
            reason: "empty id",
        });
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PreconditionError::InvalidKey {
            key: raw.to_string(),
            reason: "id must be decimal digits",
        });
    }
    Ok(())
}

/// Artwork id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IllustId(String);

impl IllustId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IllustId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl ResourceKey for IllustId {
    fn validate(&self) -> Result<(), PreconditionError> {
        numeric_id(&self.0)
    }
}

/// Account id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl ResourceKey for UserId {
    fn validate(&self) -> Result<(), PreconditionError> {
        numeric_id(&self.0)
    }
}

/// Static image location (page thumbnail or full size)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageUrl(String);

impl ImageUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment, used to locate the file in a directory source
    pub fn file_name(&self) -> &str {
        let path = self.0.split(['?', '#']).next().unwrap_or_default();
        path.rsplit('/').next().unwrap_or(path)
    }
}

impl fmt::Display for ImageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl ResourceKey for ImageUrl {
    fn validate(&self) -> Result<(), PreconditionError> {
        if self.file_name().is_empty() {
            return Err(PreconditionError::InvalidKey {
                key: self.0.clone(),
                reason: "url has no file name",
            });
        }
        Ok(())
    }
}

/// The signed-in account's own bookmark tags: a single resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SelfTags;

impl fmt::Display for SelfTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("self")
    }
}

impl ResourceKey for SelfTags {}

impl ResourceKey for String {}
impl ResourceKey for &'static str {}
impl ResourceKey for u32 {}
impl ResourceKey for u64 {}
