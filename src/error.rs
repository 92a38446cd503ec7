//! Error taxonomy for resource loading and playback
//!
//! - `FetchError`: anything that goes wrong while producing a value for a key.
//!   Cloneable because one failure is handed to every attached waiter.
//! - `PreconditionError`: caller bugs (empty frame sequence, malformed key).
//!   Surfaced immediately, never cached, never retried.

use thiserror::Error;

/// Failure of a single fetch attempt.
///
/// Caught at the coordinator boundary and stored as a Failed entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Request rejected, source unreachable, or non-success response
    #[error("network error: {0}")]
    Network(String),
    /// Payload arrived but could not be parsed or decoded
    #[error("decode error: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn network(msg: impl Into<String>) -> Self {
        FetchError::Network(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        FetchError::Decode(msg.into())
    }

    /// Short tag for log lines and stats
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::Decode(_) => "decode",
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Decode(e.to_string())
    }
}

impl From<image::ImageError> for FetchError {
    fn from(e: image::ImageError) -> Self {
        FetchError::Decode(e.to_string())
    }
}

impl From<zip::result::ZipError> for FetchError {
    fn from(e: zip::result::ZipError) -> Self {
        FetchError::Decode(format!("archive: {}", e))
    }
}

/// Programmer error: the call can never succeed as written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("frame sequence is empty")]
    EmptyFrames,
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display_keeps_reason() {
        let e = FetchError::network("HTTP 404 for /ajax/illust/1");
        assert_eq!(e.to_string(), "network error: HTTP 404 for /ajax/illust/1");
        assert_eq!(e.kind(), "network");
        assert_eq!(FetchError::decode("bad").kind(), "decode");
    }

    #[test]
    fn test_json_error_maps_to_decode() {
        let err = serde_json::from_str::<u32>("not json").unwrap_err();
        assert!(matches!(FetchError::from(err), FetchError::Decode(_)));
    }
}
