//! PICKER - artwork resource cache and animation player library
//!
//! Re-exports all modules for use by binary targets.

// Core engine (cache, coordination, player, workers)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod entities;
pub mod error;
pub mod source;

// Re-export commonly used types from core
pub use core::accessor::{Read, ResourceAccessor};
pub use core::player::{FramePlayer, PlayState};
pub use core::registry::ResourceRegistry;

// Re-export entities
pub use entities::{Frame, FrameSequence, IllustId};
pub use error::{FetchError, PreconditionError};
