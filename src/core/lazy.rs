//! Visibility-gated accessor
//!
//! Off-screen consumers (thumbnails below the fold, collapsed panels) must
//! not trigger fetches. `LazyResource` holds its accessor back until the
//! consumer has been in view once; from then on it behaves like the plain
//! accessor, even if the consumer scrolls away again.

use std::sync::atomic::{AtomicBool, Ordering};

use log::trace;

use super::accessor::{Read, ResourceAccessor};
use crate::entities::keys::ResourceKey;
use crate::entities::traits::Visibility;

pub struct LazyResource<K: ResourceKey, V, S: Visibility> {
    accessor: ResourceAccessor<K, V>,
    visibility: S,
    seen: AtomicBool,
}

impl<K: ResourceKey, V: Send + Sync + 'static, S: Visibility> LazyResource<K, V, S> {
    pub fn new(accessor: ResourceAccessor<K, V>, visibility: S) -> Self {
        Self {
            accessor,
            visibility,
            seen: AtomicBool::new(false),
        }
    }

    /// `None` until first seen (nothing fetched), then `accessor.read()`.
    pub fn poll(&self) -> Option<Read<V>> {
        if !self.seen.load(Ordering::Acquire) {
            if !self.visibility.in_view() {
                return None;
            }
            self.seen.store(true, Ordering::Release);
            trace!("Lazy {:?} came into view", self.accessor.key());
        }
        Some(self.accessor.read())
    }

    /// Has been in view at least once
    pub fn is_seen(&self) -> bool {
        self.seen.load(Ordering::Acquire)
    }

    /// Retry only makes sense once something was fetched
    pub fn retry(&self) {
        if self.is_seen() {
            self.accessor.retry();
        }
    }

    pub fn accessor(&self) -> &ResourceAccessor<K, V> {
        &self.accessor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coordinator::testing::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_not_fetched_before_visible() {
        let gate = Gate::new();
        let (coord, _) = coordinator(&gate, 4, false);
        let visible = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&visible);
        let lazy = LazyResource::new(
            ResourceAccessor::new(coord.clone(), "thumb").unwrap(),
            move || flag.load(Ordering::SeqCst),
        );

        for _ in 0..5 {
            assert!(lazy.poll().is_none());
        }
        lazy.retry();
        assert_eq!(coord.stats().fetches(), 0);
        assert_eq!(coord.state(&"thumb"), None);

        visible.store(true, Ordering::SeqCst);
        assert!(lazy.poll().unwrap().is_pending());
        assert!(lazy.is_seen());
        gate.wait_calls(1);

        // Sticky: scrolling away keeps the resource live
        visible.store(false, Ordering::SeqCst);
        gate.release(Ok("v"));
        let read = futures::executor::block_on(lazy.accessor().resolve());
        assert!(read.is_ready());
        assert!(lazy.poll().unwrap().is_ready());
        assert_eq!(gate.calls(), 1);
    }
}
