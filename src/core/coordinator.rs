//! Single-flight request coordinator
//!
//! One instance per resource kind. Owns:
//! - `CacheStore` of settled entries (Ready / Failed), LRU bounded
//! - In-flight table: key -> shared `PendingRequest`
//!
//! Both live under one mutex, so a Pending -> Ready/Failed transition and
//! its store write are observed together or not at all. Waiters are woken
//! after the lock is released.
//!
//! # Lifecycle of a key
//!
//! ```text
//! request ──> [in flight] ──fetch ok──> Ready  (stored, may evict LRU)
//!                  │     └──fetch err─> Failed (stored, reported)
//!                  └── retry while in flight: next attempt queued,
//!                      issued when the current one settles
//! ```
//!
//! Pending state lives only in the in-flight table, never in the store, so
//! LRU pressure can't drop an entry somebody is still waiting on.
//!
//! There is no cancellation: a started fetch always completes and its
//! result is cached even if nobody is waiting anymore.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, trace, warn};
use once_cell::sync::OnceCell;

use super::cache_store::CacheStore;
use super::stats::CacheStats;
use crate::config::KindConfig;
use crate::entities::keys::ResourceKey;
use crate::entities::traits::{FailureReporter, WorkerPool};
use crate::error::FetchError;

/// Result of one fetch attempt as seen by waiters
pub type Outcome<V> = Result<Arc<V>, FetchError>;

type FetchFn<K, V> = dyn Fn(&K) -> Result<V, FetchError> + Send + Sync;

/// Public view of an entry's state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Pending,
    Ready,
    Failed,
}

/// Settled cache entry
#[derive(Debug)]
pub struct CacheEntry<V> {
    outcome: Outcome<V>,
    generation: u64,
    last_accessed: Instant,
}

impl<V> CacheEntry<V> {
    pub fn state(&self) -> EntryState {
        match self.outcome {
            Ok(_) => EntryState::Ready,
            Err(_) => EntryState::Failed,
        }
    }

    /// Fetch attempt that produced this entry
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_accessed(&self) -> Instant {
        self.last_accessed
    }
}

/// Shared handle on one in-flight fetch. Every caller that asks for the
/// key while it is in flight gets a clone of the same handle.
pub struct PendingRequest<V> {
    generation: u64,
    done: Arc<OnceCell<Outcome<V>>>,
    settled: Shared<BoxFuture<'static, Outcome<V>>>,
}

impl<V> Clone for PendingRequest<V> {
    fn clone(&self) -> Self {
        Self {
            generation: self.generation,
            done: Arc::clone(&self.done),
            settled: self.settled.clone(),
        }
    }
}

impl<V> fmt::Debug for PendingRequest<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("generation", &self.generation)
            .field("settled", &self.done.get().is_some())
            .finish()
    }
}

impl<V: Send + Sync + 'static> PendingRequest<V> {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Outcome if the fetch has settled. Never blocks.
    pub fn try_outcome(&self) -> Option<Outcome<V>> {
        self.done.get().cloned()
    }

    /// Suspend until the fetch settles.
    pub async fn wait(self) -> Outcome<V> {
        self.settled.await
    }
}

/// Write side of a `PendingRequest`, owned by the fetch job
struct Settler<V> {
    done: Arc<OnceCell<Outcome<V>>>,
    tx: oneshot::Sender<Outcome<V>>,
}

impl<V> Settler<V> {
    fn settle(self, outcome: Outcome<V>) {
        // Cell first: a poller that sees the store change must also see this
        let _ = self.done.set(outcome.clone());
        let _ = self.tx.send(outcome);
    }
}

fn attempt<V: Send + Sync + 'static>(generation: u64) -> (PendingRequest<V>, Settler<V>) {
    let (tx, rx) = oneshot::channel::<Outcome<V>>();
    let settled = rx
        .map(|r| r.unwrap_or_else(|_| Err(FetchError::network("fetch abandoned before settling"))))
        .boxed()
        .shared();
    let done = Arc::new(OnceCell::new());
    let pending = PendingRequest {
        generation,
        done: Arc::clone(&done),
        settled,
    };
    (pending, Settler { done, tx })
}

/// Point-in-time answer to `request`
#[derive(Debug)]
pub enum Snapshot<V> {
    Pending(PendingRequest<V>),
    Ready(Arc<V>),
    Failed(FetchError),
}

impl<V> Snapshot<V> {
    pub fn state(&self) -> EntryState {
        match self {
            Snapshot::Pending(_) => EntryState::Pending,
            Snapshot::Ready(_) => EntryState::Ready,
            Snapshot::Failed(_) => EntryState::Failed,
        }
    }
}

impl<V> From<&Outcome<V>> for Snapshot<V> {
    fn from(outcome: &Outcome<V>) -> Self {
        match outcome {
            Ok(v) => Snapshot::Ready(Arc::clone(v)),
            Err(e) => Snapshot::Failed(e.clone()),
        }
    }
}

struct InFlight<V> {
    current: PendingRequest<V>,
    /// Attempt requested by retry/invalidate while `current` was running
    queued: Option<(PendingRequest<V>, Settler<V>)>,
}

struct State<K: ResourceKey, V> {
    store: CacheStore<K, CacheEntry<V>>,
    in_flight: HashMap<K, InFlight<V>>,
    next_generation: u64,
}

impl<K: ResourceKey, V: Send + Sync + 'static> State<K, V> {
    fn begin(&mut self) -> (PendingRequest<V>, Settler<V>) {
        self.next_generation += 1;
        attempt(self.next_generation)
    }
}

struct Inner<K: ResourceKey, V> {
    name: &'static str,
    always_refetch: bool,
    fetch: Box<FetchFn<K, V>>,
    pool: Arc<dyn WorkerPool>,
    reporter: Arc<dyn FailureReporter>,
    state: Mutex<State<K, V>>,
    stats: Arc<CacheStats>,
}

/// Deduplicating fetch front for one resource kind.
///
/// Cheap to clone; clones share cache and in-flight table.
pub struct RequestCoordinator<K: ResourceKey, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K: ResourceKey, V> Clone for RequestCoordinator<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: ResourceKey, V> RequestCoordinator<K, V> {
    /// Kind name used in logs and failure reports
    pub fn name(&self) -> &'static str {
        self.inner.name
    }
}

impl<K: ResourceKey, V: Send + Sync + 'static> RequestCoordinator<K, V> {
    /// Create coordinator for one resource kind.
    ///
    /// # Arguments
    /// * `name` - Kind name used in logs and failure reports
    /// * `config` - Capacity and refetch policy (capacity 0 is raised to 1)
    /// * `pool` - Where fetches run
    /// * `reporter` - Receives every failed attempt
    /// * `fetch` - Produces the value for a key; runs on `pool`
    pub fn new<F>(
        name: &'static str,
        config: KindConfig,
        pool: Arc<dyn WorkerPool>,
        reporter: Arc<dyn FailureReporter>,
        fetch: F,
    ) -> Self
    where
        F: Fn(&K) -> Result<V, FetchError> + Send + Sync + 'static,
    {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or_else(|| {
            warn!("{}: capacity 0 is not allowed, using 1", name);
            NonZeroUsize::MIN
        });

        debug!(
            "RequestCoordinator '{}' created: capacity={}, always_refetch={}",
            name, capacity, config.always_refetch
        );

        Self {
            inner: Arc::new(Inner {
                name,
                always_refetch: config.always_refetch,
                fetch: Box::new(fetch),
                pool,
                reporter,
                state: Mutex::new(State {
                    store: CacheStore::new(capacity),
                    in_flight: HashMap::new(),
                    next_generation: 0,
                }),
                stats: Arc::new(CacheStats::new()),
            }),
        }
    }

    pub fn always_refetch(&self) -> bool {
        self.inner.always_refetch
    }

    pub fn capacity(&self) -> usize {
        self.lock().store.capacity()
    }

    /// Settled entries currently cached
    pub fn len(&self) -> usize {
        self.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys with a fetch in flight
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.inner.stats)
    }

    /// Get the entry for `key`, starting a fetch if needed.
    ///
    /// - In flight: attach to the existing fetch
    /// - Settled and `always_refetch` off: return it (counts as a touch)
    /// - Otherwise: start a new fetch
    pub fn request(&self, key: &K) -> Snapshot<V> {
        let started = {
            let mut state = self.lock();

            if let Some(flight) = state.in_flight.get(key) {
                self.inner.stats.record_coalesced();
                trace!("{}: attach to in-flight {}", self.inner.name, key);
                let pending = match &flight.queued {
                    Some((next, _)) => next.clone(),
                    None => flight.current.clone(),
                };
                return Snapshot::Pending(pending);
            }

            if !self.inner.always_refetch {
                if let Some(entry) = state.store.get_mut(key) {
                    entry.last_accessed = Instant::now();
                    self.inner.stats.record_hit();
                    trace!("{}: hit {}", self.inner.name, key);
                    return Snapshot::from(&entry.outcome);
                }
            }

            self.inner.stats.record_miss();
            let (pending, settler) = state.begin();
            state.in_flight.insert(
                key.clone(),
                InFlight {
                    current: pending.clone(),
                    queued: None,
                },
            );
            (pending, settler)
        };

        let (pending, settler) = started;
        self.dispatch(key.clone(), pending.generation, settler);
        Snapshot::Pending(pending)
    }

    /// Current entry without fetching or touching
    pub fn peek(&self, key: &K) -> Option<Snapshot<V>> {
        let state = self.lock();
        if let Some(flight) = state.in_flight.get(key) {
            let pending = match &flight.queued {
                Some((next, _)) => next.clone(),
                None => flight.current.clone(),
            };
            return Some(Snapshot::Pending(pending));
        }
        state.store.peek(key).map(|e| Snapshot::from(&e.outcome))
    }

    pub fn state(&self, key: &K) -> Option<EntryState> {
        let state = self.lock();
        if state.in_flight.contains_key(key) {
            return Some(EntryState::Pending);
        }
        state.store.peek(key).map(CacheEntry::state)
    }

    /// Drop any cached entry for `key` and request it again.
    ///
    /// With a fetch in flight, the new fetch is queued behind it (never two
    /// concurrent fetches for one key); the returned handle resolves with
    /// the new attempt. Repeated calls while in flight share one queued
    /// attempt.
    pub fn invalidate(&self, key: &K) -> Snapshot<V> {
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            if state.store.delete(key).is_some() {
                trace!("{}: dropped cached {}", self.inner.name, key);
            }

            if let Some(flight) = state.in_flight.get_mut(key) {
                if flight.queued.is_none() {
                    state.next_generation += 1;
                    flight.queued = Some(attempt(state.next_generation));
                    debug!("{}: refetch of {} queued behind in-flight fetch", self.inner.name, key);
                }
                if let Some((next, _)) = &flight.queued {
                    return Snapshot::Pending(next.clone());
                }
            }
        }

        self.request(key)
    }

    /// Same as `invalidate`: the user asked to try again.
    pub fn retry(&self, key: &K) -> Snapshot<V> {
        debug!("{}: retry {}", self.inner.name, key);
        self.inner.stats.record_retry();
        self.invalidate(key)
    }

    /// Drop all settled entries. In-flight fetches keep running.
    pub fn clear(&self) {
        let mut state = self.lock();
        let n = state.store.len();
        state.store.clear();
        debug!("{}: cleared {} entries", self.inner.name, n);
    }

    fn lock(&self) -> MutexGuard<'_, State<K, V>> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn dispatch(&self, key: K, generation: u64, settler: Settler<V>) {
        self.inner.stats.record_fetch();
        debug!("{}: fetch {} (attempt {})", self.inner.name, key, generation);
        let this = self.clone();
        self.inner.pool.execute(Box::new(move || {
            let result = catch_unwind(AssertUnwindSafe(|| (this.inner.fetch)(&key)))
                .unwrap_or_else(|_| Err(FetchError::network("fetch panicked")));
            this.settle(key, generation, settler, result);
        }));
    }

    /// Apply a finished attempt: store write + in-flight removal under one
    /// lock, then wake waiters.
    fn settle(&self, key: K, generation: u64, settler: Settler<V>, result: Result<V, FetchError>) {
        let outcome: Outcome<V> = result.map(Arc::new);

        let requeued = {
            let mut state = self.lock();
            let flight = state.in_flight.remove(&key);
            debug_assert!(flight.as_ref().map(|f| f.current.generation) == Some(generation));

            match flight.and_then(|f| f.queued) {
                Some((next, next_settler)) => {
                    // Superseded by retry: waiters of this attempt get its
                    // outcome, the cache waits for the queued one.
                    state.in_flight.insert(
                        key.clone(),
                        InFlight {
                            current: next.clone(),
                            queued: None,
                        },
                    );
                    Some((next.generation, next_settler))
                }
                None => {
                    let entry = CacheEntry {
                        outcome: outcome.clone(),
                        generation,
                        last_accessed: Instant::now(),
                    };
                    if let Some((evicted, _)) = state.store.set(key.clone(), entry) {
                        self.inner.stats.record_eviction();
                        debug!("{}: evicted {} for {}", self.inner.name, evicted, key);
                    }
                    None
                }
            }
        };

        match &outcome {
            Ok(_) => debug!("{}: ready {} (attempt {})", self.inner.name, key, generation),
            Err(e) => {
                self.inner.stats.record_failure();
                let operation = format!("{}({})", self.inner.name, key);
                self.inner.reporter.report(&operation, e);
            }
        }

        settler.settle(outcome);

        if let Some((next_generation, next_settler)) = requeued {
            self.dispatch(key, next_generation, next_settler);
        }
    }
}

impl<K: ResourceKey, V> fmt::Debug for RequestCoordinator<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCoordinator")
            .field("name", &self.inner.name)
            .field("always_refetch", &self.inner.always_refetch)
            .finish()
    }
}
