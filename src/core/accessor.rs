//! Per-key read handle for the rendering layer
//!
//! `read()` is the poll side: it never blocks and never panics, it answers
//! Pending / Ready / Failed. `resolve()` is the suspend side: an async wait
//! that yields to the host executor until the fetch the accessor is
//! attached to settles.
//!
//! An accessor is bound to one key for its whole life. A different key
//! needs a different accessor.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use super::coordinator::{Outcome, PendingRequest, RequestCoordinator, Snapshot};
use crate::entities::keys::ResourceKey;
use crate::error::{FetchError, PreconditionError};

/// Answer of `ResourceAccessor::read`
#[derive(Debug)]
pub enum Read<V> {
    /// Fetch in flight, render a placeholder
    Pending,
    Ready(Arc<V>),
    /// Fetch failed, render a retry affordance
    Failed(FetchError),
}

impl<V> Read<V> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Read::Pending)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Read::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Read::Failed(_))
    }

    /// Value if ready
    pub fn ready(self) -> Option<Arc<V>> {
        match self {
            Read::Ready(v) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            Read::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl<V> From<Outcome<V>> for Read<V> {
    fn from(outcome: Outcome<V>) -> Self {
        match outcome {
            Ok(v) => Read::Ready(v),
            Err(e) => Read::Failed(e),
        }
    }
}

/// Read/retry handle bound to one key of one resource kind.
pub struct ResourceAccessor<K: ResourceKey, V> {
    coordinator: RequestCoordinator<K, V>,
    key: K,
    /// Fetch this accessor last started or joined
    attached: Mutex<Option<PendingRequest<V>>>,
}

impl<K: ResourceKey, V: Send + Sync + 'static> ResourceAccessor<K, V> {
    /// Bind to `key`. Fails on keys that can never resolve.
    pub fn new(coordinator: RequestCoordinator<K, V>, key: K) -> Result<Self, PreconditionError> {
        key.validate()?;
        Ok(Self {
            coordinator,
            key,
            attached: Mutex::new(None),
        })
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Poll the bound key.
    ///
    /// Ready and Failed come straight from the cache. Pending means a fetch
    /// is running; calling `read` again while it runs never starts another.
    ///
    /// Kinds with `always_refetch` start a fresh fetch on this accessor's
    /// first read even if a Ready entry exists, then keep answering with
    /// that attempt's outcome until `retry`.
    pub fn read(&self) -> Read<V> {
        let mut attached = self.lock();

        if self.coordinator.always_refetch() {
            if let Some(pending) = attached.as_ref() {
                return match pending.try_outcome() {
                    Some(outcome) => Read::from(outcome),
                    None => Read::Pending,
                };
            }
        }

        match self.coordinator.request(&self.key) {
            Snapshot::Pending(pending) => {
                *attached = Some(pending);
                Read::Pending
            }
            Snapshot::Ready(v) => Read::Ready(v),
            Snapshot::Failed(e) => Read::Failed(e),
        }
    }

    /// Suspend until the bound key settles, then return Ready or Failed.
    ///
    /// Holds no lock across the await; only the awaiting task waits.
    pub async fn resolve(&self) -> Read<V> {
        match self.read() {
            Read::Pending => {}
            settled => return settled,
        }
        let pending = self.lock().clone();
        match pending {
            Some(pending) => Read::from(pending.wait().await),
            None => self.read(),
        }
    }

    /// Drop whatever is cached for the key and fetch again. Following reads
    /// are Pending until the new attempt settles.
    pub fn retry(&self) {
        let snapshot = self.coordinator.retry(&self.key);
        *self.lock() = match snapshot {
            Snapshot::Pending(pending) => Some(pending),
            _ => None,
        };
    }

    fn lock(&self) -> MutexGuard<'_, Option<PendingRequest<V>>> {
        self.attached.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<K: ResourceKey, V> fmt::Debug for ResourceAccessor<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceAccessor")
            .field("kind", &self.coordinator.name())
            .field("key", &self.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coordinator::testing::*;
    use futures::executor::block_on;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_many_accessors_one_fetch() {
        let gate = Gate::new();
        let (coord, _) = coordinator(&gate, 4, false);

        let accessors: Vec<_> = (0..10)
            .map(|_| ResourceAccessor::new(coord.clone(), "A").unwrap())
            .collect();
        for a in &accessors {
            assert!(a.read().is_pending());
        }
        gate.wait_calls(1);
        // Polling again while pending starts nothing new
        for a in &accessors {
            assert!(a.read().is_pending());
        }

        gate.release(Ok("v"));
        for a in &accessors {
            assert_eq!(*block_on(a.resolve()).ready().unwrap(), "A:v");
        }
        for a in &accessors {
            assert!(a.read().is_ready());
        }
        assert_eq!(gate.calls(), 1);
    }

    #[test]
    fn test_failed_read_returns_immediately_then_retry() {
        let gate = Gate::new();
        let (coord, recorder) = coordinator(&gate, 4, false);
        let acc = ResourceAccessor::new(coord, "A").unwrap();

        gate.release(Err(FetchError::network("HTTP 503")));
        let read = block_on(acc.resolve());
        assert_eq!(read.error(), Some(&FetchError::network("HTTP 503")));

        // Failed reads don't suspend and don't refetch
        assert!(acc.read().is_failed());
        assert!(acc.read().is_failed());
        assert_eq!(gate.calls(), 1);
        assert_eq!(recorder.0.lock().unwrap().len(), 1);

        acc.retry();
        assert!(acc.read().is_pending());
        gate.release(Ok("back"));
        assert_eq!(*block_on(acc.resolve()).ready().unwrap(), "A:back");
        assert_eq!(gate.calls(), 2);
    }

    #[test]
    fn test_resolve_on_ready_does_not_wait() {
        let gate = Gate::new();
        let (coord, _) = coordinator(&gate, 4, false);
        let acc = ResourceAccessor::new(coord, "A").unwrap();
        gate.release(Ok("v"));
        block_on(acc.resolve());
        assert!(block_on(acc.resolve()).is_ready());
        assert_eq!(gate.calls(), 1);
    }

    #[test]
    fn test_resolve_interleaves_on_one_thread() {
        let gate = Gate::new();
        let (coord, _) = coordinator(&gate, 4, false);
        let a = ResourceAccessor::new(coord.clone(), "A").unwrap();
        let b = ResourceAccessor::new(coord, "B").unwrap();

        let tx = gate.sender();
        let calls = gate.calls.clone();
        let releaser = thread::spawn(move || {
            while calls.load(std::sync::atomic::Ordering::SeqCst) < 2 {
                thread::sleep(Duration::from_millis(1));
            }
            tx.send(Ok("a".to_string())).unwrap();
            tx.send(Ok("b".to_string())).unwrap();
        });

        // Both waits are polled by one executor on one thread
        let (ra, rb) = block_on(futures::future::join(a.resolve(), b.resolve()));
        releaser.join().unwrap();
        assert!(ra.is_ready() && rb.is_ready());
        assert_eq!(gate.calls(), 2);
    }

    #[test]
    fn test_always_refetch_accessor() {
        let gate = Gate::new();
        let (coord, _) = coordinator(&gate, 1, true);

        let first = ResourceAccessor::new(coord.clone(), "form").unwrap();
        gate.release(Ok("v1"));
        assert_eq!(*block_on(first.resolve()).ready().unwrap(), "form:v1");
        // Same accessor keeps serving its own attempt
        assert!(first.read().is_ready());
        assert_eq!(gate.calls(), 1);

        // A newly bound accessor refetches despite the Ready entry
        let second = ResourceAccessor::new(coord, "form").unwrap();
        assert!(second.read().is_pending());
        gate.release(Ok("v2"));
        assert_eq!(*block_on(second.resolve()).ready().unwrap(), "form:v2");
        assert_eq!(gate.calls(), 2);

        second.retry();
        gate.release(Ok("v3"));
        assert_eq!(*block_on(second.resolve()).ready().unwrap(), "form:v3");
        assert_eq!(gate.calls(), 3);
    }

    // No bounds on V: Debug must not need what fetching needs
    fn describe<K: ResourceKey, V>(accessor: &ResourceAccessor<K, V>) -> String {
        format!("{:?}", accessor)
    }

    #[test]
    fn test_debug_names_kind_and_key() {
        let gate = Gate::new();
        let (coord, _) = coordinator(&gate, 4, false);
        let accessor = ResourceAccessor::new(coord.clone(), "A").unwrap();

        let text = describe(&accessor);
        assert!(text.contains("test"), "{}", text);
        assert!(text.contains("\"A\""), "{}", text);
        assert_eq!(coord.name(), "test");
        assert_eq!(gate.calls(), 0);
    }

    #[test]
    fn test_invalid_key_rejected() {
        let gate = Gate::new();
        let recorder = std::sync::Arc::new(Recorder::default());
        let coord: RequestCoordinator<crate::entities::keys::IllustId, String> = RequestCoordinator::new(
            "illust",
            crate::config::KindConfig::default(),
            std::sync::Arc::new(crate::core::workers::Workers::new(1)),
            recorder,
            |_id: &crate::entities::keys::IllustId| Ok(String::new()),
        );
        let err = ResourceAccessor::new(coord, crate::entities::keys::IllustId::new("abc")).unwrap_err();
        assert!(matches!(err, PreconditionError::InvalidKey { .. }));
        assert_eq!(gate.calls(), 0);
    }
}
