//! Content sources: where fetch functions get their bytes
//!
//! A `Request` says *what* is wanted, not how to get it. `ContentSource`
//! implementations turn requests into raw bytes; the registry's fetch
//! functions parse those bytes into records.
//!
//! JSON endpoints wrap their payload in an envelope:
//!
//! ```text
//! { "error": false, "message": "", "body": { ... } }
//! ```
//!
//! `error: true` is a rejected request (`FetchError::Network`, message kept).
//! Anything that doesn't parse is `FetchError::Decode`.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::trace;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::entities::keys::{IllustId, ImageUrl, UserId};
use crate::error::FetchError;

/// One thing to fetch
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Request {
    /// Page list of an artwork (enveloped)
    IllustPages(IllustId),
    /// Artwork details (enveloped)
    Illust(IllustId),
    /// Author profile (enveloped)
    User(UserId),
    /// Animation descriptor (enveloped)
    UgoiraMeta(IllustId),
    /// Frame archive named by an animation descriptor (raw bytes)
    Archive(ImageUrl),
    /// Static image (raw bytes)
    Image(ImageUrl),
    /// Current bookmark settings of an artwork (plain JSON)
    BookmarkForm(IllustId),
    /// The account's own bookmark tags (plain JSON map)
    SelfTags,
}

impl Request {
    /// Remote path this request stands for
    pub fn path(&self) -> String {
        match self {
            Request::IllustPages(id) => format!("/ajax/illust/{}/pages", id),
            Request::Illust(id) => format!("/ajax/illust/{}", id),
            Request::User(id) => format!("/ajax/user/{}", id),
            Request::UgoiraMeta(id) => format!("/ajax/illust/{}/ugoira_meta", id),
            Request::Archive(url) | Request::Image(url) => url.to_string(),
            Request::BookmarkForm(id) => format!("/bookmark_add.php?type=illust&illust_id={}", id),
            Request::SelfTags => "/rpc/illust_bookmark_tags.php?attributes=lev,total".to_string(),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Byte provider behind every fetch function.
///
/// Called on fetch worker threads; implementations may block.
pub trait ContentSource: Send + Sync {
    fn get(&self, request: &Request) -> Result<Vec<u8>, FetchError>;
}

impl<T: ContentSource + ?Sized> ContentSource for Arc<T> {
    fn get(&self, request: &Request) -> Result<Vec<u8>, FetchError> {
        (**self).get(request)
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    message: String,
    body: Option<T>,
}

/// Unwrap an `{ error, message, body }` envelope.
pub fn parse_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, FetchError> {
    let envelope: Envelope<serde_json::Value> = serde_json::from_slice(bytes)?;
    if envelope.error {
        let message = if envelope.message.is_empty() {
            "request rejected".to_string()
        } else {
            envelope.message
        };
        return Err(FetchError::Network(message));
    }
    let body = envelope.body.ok_or_else(|| FetchError::decode("envelope has no body"))?;
    Ok(serde_json::from_value(body)?)
}

/// Parse a plain (non-enveloped) JSON payload.
pub fn parse_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, FetchError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Serves requests from files under a root directory.
///
/// Layout:
/// ```text
/// root/
///   illust/{id}.json               Illust
///   illust/{id}/pages.json         IllustPages
///   illust/{id}/ugoira_meta.json   UgoiraMeta
///   user/{id}.json                 User
///   bookmark_form/{id}.json        BookmarkForm
///   user_tags.json                 SelfTags
///   archive/{file name of url}     Archive
///   img/{file name of url}         Image
/// ```
///
/// A missing file is a `Network` failure, the way a 404 would be.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File a request maps to
    pub fn file_for(&self, request: &Request) -> PathBuf {
        let rel = match request {
            Request::IllustPages(id) => PathBuf::from("illust").join(id.as_str()).join("pages.json"),
            Request::Illust(id) => PathBuf::from("illust").join(format!("{}.json", id)),
            Request::User(id) => PathBuf::from("user").join(format!("{}.json", id)),
            Request::UgoiraMeta(id) => PathBuf::from("illust").join(id.as_str()).join("ugoira_meta.json"),
            Request::Archive(url) => PathBuf::from("archive").join(url.file_name()),
            Request::Image(url) => PathBuf::from("img").join(url.file_name()),
            Request::BookmarkForm(id) => PathBuf::from("bookmark_form").join(format!("{}.json", id)),
            Request::SelfTags => PathBuf::from("user_tags.json"),
        };
        self.root.join(rel)
    }
}

impl ContentSource for DirSource {
    fn get(&self, request: &Request) -> Result<Vec<u8>, FetchError> {
        let path = self.file_for(request);
        trace!("DirSource: {} -> {}", request, path.display());
        std::fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FetchError::Network(format!("not found: {}", request)),
            _ => FetchError::Network(format!("{}: {}", path.display(), e)),
        })
    }
}
