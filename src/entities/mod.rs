//! Entities - keys, records, frames and collaborator traits
//!
//! Plain data plus the seams the engine talks through. Nothing here owns
//! threads or locks.

pub mod decode;
pub mod frame;
pub mod keys;
pub mod records;
pub mod traits;

pub use frame::{Frame, FrameSequence};
pub use keys::{IllustId, ImageUrl, ResourceKey, SelfTags, UserId};
pub use records::{AccountTag, BookmarkForm, Illust, Pages, UgoiraMeta, User};
pub use traits::{Bounds, FailureReporter, LogReporter, RenderSink, Visibility, WorkerPool};
