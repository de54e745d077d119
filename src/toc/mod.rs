//! Table-of-contents loading with request coalescing
//!
//! # Architecture
//!
//! ```text
//! acquire(book) ──┬──→ LRU cache hit ──────────────→ ready handle
//!                 ├──→ in flight: consumers += 1 ──→ shared watch receiver
//!                 └──→ absent: spawn fetch + build ─→ new in-flight entry
//!                                   │
//!                                   └──→ success: cache, then drop entry
//!                                        failure/cancel: drop entry
//! ```
//!
//! The cache and the in-flight map sit behind one mutex, so a consumer can
//! never join an entry that is concurrently being torn down. Each entry
//! carries a generation number, and so does every handle joined to it; a
//! completion or a release only touches the entry it belongs to.
//!
//! # Module Organization
//!
//! - `tree` - Flat records to a heading tree
//! - `source` - Where flat records come from

mod source;
mod tree;

pub use source::{SqliteTocSource, TocSource};
pub use tree::{build_tree, TocFlatRecord, TocNode};

use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::engine::BookId;

/// A built heading forest, shared between the cache and every consumer
pub type TocTree = Arc<Vec<TocNode>>;

/// Why a TOC could not be produced; every consumer gets a clone
#[derive(Debug, Clone, thiserror::Error)]
pub enum TocLoadError {
    #[error("TOC load for book {0} was cancelled")]
    Cancelled(BookId),

    #[error("TOC load for book {book} failed: {reason:#}")]
    Failed {
        book: BookId,
        reason: Arc<anyhow::Error>,
    },
}

type Outcome = Option<Result<TocTree, TocLoadError>>;

struct InFlight {
    tx: watch::Sender<Outcome>,
    consumers: usize,
    cancel: CancellationToken,
    generation: u64,
}

struct LoaderState {
    cache: LruCache<BookId, TocTree>,
    in_flight: HashMap<BookId, InFlight>,
    next_generation: u64,
}

/// Cache plus in-flight merger for TOC trees
pub struct TocLoader {
    state: Arc<Mutex<LoaderState>>,
    source: Arc<dyn TocSource>,
}

impl TocLoader {
    pub fn new(source: Arc<dyn TocSource>, cache_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Arc::new(Mutex::new(LoaderState {
                cache: LruCache::new(capacity),
                in_flight: HashMap::new(),
                next_generation: 0,
            })),
            source,
        }
    }

    fn state(&self) -> MutexGuard<'_, LoaderState> {
        lock(&self.state)
    }

    /// Get a handle on `book`'s tree, starting a load only if none runs
    ///
    /// Each handle obtained here counts as one consumer until `release`.
    /// Must be called from within a tokio runtime.
    pub fn acquire(&self, book: BookId) -> TocHandle {
        let mut state = self.state();

        if let Some(tree) = state.cache.get(&book) {
            tracing::debug!("TOC cache hit for book {}", book);
            return TocHandle {
                book,
                generation: None,
                inner: HandleInner::Ready(tree.clone()),
            };
        }

        if let Some(entry) = state.in_flight.get_mut(&book) {
            entry.consumers += 1;
            tracing::debug!(
                "TOC load for book {} already in flight, {} consumers",
                book,
                entry.consumers
            );
            return TocHandle {
                book,
                generation: Some(entry.generation),
                inner: HandleInner::Pending(entry.tx.subscribe()),
            };
        }

        state.next_generation += 1;
        let generation = state.next_generation;
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        state.in_flight.insert(
            book,
            InFlight {
                tx,
                consumers: 1,
                cancel: cancel.clone(),
                generation,
            },
        );
        drop(state);

        tracing::debug!("TOC load started for book {} (generation {})", book, generation);
        tokio::spawn(load(
            self.state.clone(),
            self.source.clone(),
            book,
            generation,
            cancel,
        ));

        TocHandle {
            book,
            generation: Some(generation),
            inner: HandleInner::Pending(rx),
        }
    }

    /// Give up this handle's interest; the last one cancels the load
    ///
    /// Releasing a cache-hit handle, a handle whose load already finished,
    /// or the same handle twice does nothing.
    pub fn release(&self, handle: &mut TocHandle) {
        if let Some(generation) = handle.generation.take() {
            self.release_consumer(handle.book, generation);
        }
    }

    fn release_consumer(&self, book: BookId, generation: u64) {
        let mut state = self.state();
        let Some(entry) = state.in_flight.get_mut(&book) else {
            return;
        };
        if entry.generation != generation {
            return;
        }

        entry.consumers = entry.consumers.saturating_sub(1);
        if entry.consumers > 0 {
            return;
        }

        if let Some(entry) = state.in_flight.remove(&book) {
            entry.cancel.cancel();
            entry.tx.send_replace(Some(Err(TocLoadError::Cancelled(book))));
            tracing::debug!("TOC load for book {} cancelled, no consumers left", book);
        }
    }

    /// Acquire, wait, and release even if the caller's future is dropped
    pub async fn load(&self, book: BookId) -> Result<TocTree, TocLoadError> {
        let handle = self.acquire(book);
        let _release = ReleaseOnDrop {
            loader: self,
            book,
            generation: handle.generation,
        };
        handle.wait().await
    }

    pub fn evict(&self, book: BookId) -> bool {
        self.state().cache.pop(&book).is_some()
    }

    pub fn clear_cache(&self) {
        self.state().cache.clear();
    }

    /// Cached tree without touching recency
    pub fn cached(&self, book: BookId) -> Option<TocTree> {
        self.state().cache.peek(&book).cloned()
    }

    pub fn in_flight_consumers(&self, book: BookId) -> usize {
        self.state()
            .in_flight
            .get(&book)
            .map_or(0, |entry| entry.consumers)
    }
}

fn lock(state: &Mutex<LoaderState>) -> MutexGuard<'_, LoaderState> {
    state.lock().unwrap_or_else(|p| p.into_inner())
}

/// Fetch and build off the runtime, then publish
async fn load(
    state: Arc<Mutex<LoaderState>>,
    source: Arc<dyn TocSource>,
    book: BookId,
    generation: u64,
    cancel: CancellationToken,
) {
    let work = tokio::task::spawn_blocking(move || {
        let records = source.fetch_records(book)?;
        Ok::<_, anyhow::Error>(build_tree(&records))
    });

    let outcome = tokio::select! {
        _ = cancel.cancelled() => Err(TocLoadError::Cancelled(book)),
        joined = work => match joined {
            Ok(Ok(tree)) => Ok(Arc::new(tree)),
            Ok(Err(e)) => Err(TocLoadError::Failed { book, reason: Arc::new(e) }),
            Err(e) => Err(TocLoadError::Failed { book, reason: Arc::new(e.into()) }),
        },
    };

    let mut state = lock(&state);
    let current = state
        .in_flight
        .get(&book)
        .is_some_and(|entry| entry.generation == generation);
    if !current {
        // Released to zero or superseded; nothing left to publish to
        return;
    }

    if let Some(entry) = state.in_flight.remove(&book) {
        match &outcome {
            Ok(tree) => {
                tracing::debug!("TOC for book {} built: {} roots", book, tree.len());
                state.cache.put(book, tree.clone());
            }
            Err(e) => tracing::warn!("{}", e),
        }
        entry.tx.send_replace(Some(outcome));
    }
}

/// One consumer's view of a load
pub struct TocHandle {
    book: BookId,
    /// In-flight entry this handle counts against; `None` once released
    /// or when served from the cache
    generation: Option<u64>,
    inner: HandleInner,
}

enum HandleInner {
    Ready(TocTree),
    Pending(watch::Receiver<Outcome>),
}

impl TocHandle {
    pub fn book(&self) -> BookId {
        self.book
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.inner, HandleInner::Ready(_))
    }

    pub async fn wait(&self) -> Result<TocTree, TocLoadError> {
        match &self.inner {
            HandleInner::Ready(tree) => Ok(tree.clone()),
            HandleInner::Pending(rx) => match rx.clone().wait_for(Option::is_some).await {
                Ok(outcome) => outcome
                    .clone()
                    .unwrap_or(Err(TocLoadError::Cancelled(self.book))),
                Err(_) => Err(TocLoadError::Cancelled(self.book)),
            },
        }
    }
}

struct ReleaseOnDrop<'a> {
    loader: &'a TocLoader,
    book: BookId,
    generation: Option<u64>,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        if let Some(generation) = self.generation {
            self.loader.release_consumer(self.book, generation);
        }
    }
}
