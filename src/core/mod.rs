//! Core engine - cache, request coordination, playback, workers
//!
//! Independent of any UI: hosts talk to it through the collaborator
//! traits in `entities::traits`.

pub mod accessor;
pub mod cache_store;
pub mod coordinator;
pub mod lazy;
pub mod player;
pub mod registry;
pub mod stats;
pub mod workers;

// Re-exports for convenience
pub use accessor::{Read, ResourceAccessor};
pub use cache_store::CacheStore;
pub use coordinator::{EntryState, Outcome, PendingRequest, RequestCoordinator, Snapshot};
pub use lazy::LazyResource;
pub use player::{FramePlayer, PlayState, Playback};
pub use registry::ResourceRegistry;
pub use stats::{CacheStats, StatsSnapshot};
pub use workers::Workers;
