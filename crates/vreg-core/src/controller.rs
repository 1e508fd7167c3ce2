//! Query orchestration.
//!
//! The `SearchController` turns keystrokes into committed result sets:
//!
//! 1. `set_query` stores the text and schedules a search on the debounce
//!    worker, tagged with a fresh generation number
//! 2. The worker waits until input has been quiet for the debounce delay,
//!    then runs only the latest scheduled search
//! 3. A search consults the result cache, then the index, then the
//!    subsequence scan, ranks the candidates and truncates them
//! 4. Results are committed only if their generation is still current, so a
//!    superseded search never overwrites a newer one
//!
//! The controller also subscribes to the [`SyncManager`]: each mirror change
//! rebuilds the index, clears the cache and reruns the active query.

use crate::cache::{CacheStats, ResultCache};
use crate::config::{CacheConfig, SearchConfig};
use crate::error::Result;
use crate::fields::normalize;
use crate::fuzzy::{scan_mirror, SubsequencePattern};
use crate::index::SearchIndex;
use crate::score::{score_normalized, rank, SearchHit};
use crate::sync::{Subscription, SyncManager};
use crate::types::RecordId;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// State changes published to [`SearchController::events`] listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    /// A search finished and its results are now visible
    ResultsCommitted {
        query: String,
        count: usize,
        duration: Duration,
        from_cache: bool,
    },

    /// The query was emptied and the results cleared
    ResultsCleared,

    /// A search failed; the previous results stay visible
    SearchFailed { query: String, reason: String },

    /// The index was rebuilt after a mirror change
    IndexRebuilt { records: usize },

    /// A mirror refresh failed; the mirror and results are unchanged
    SyncFailed { reason: String },
}

/// Everything a UI needs to render the search view.
#[derive(Debug, Clone)]
pub struct SearchSnapshot {
    /// Query text as typed
    pub query: String,

    /// Ranked results, resolved against the live mirror
    pub results: Vec<SearchHit>,

    /// A search is scheduled or running
    pub loading: bool,

    /// Failure of the latest search
    pub error: Option<String>,

    /// Failure of the latest mirror refresh
    pub sync_error: Option<String>,

    /// Duration of the last committed search
    pub last_duration: Option<Duration>,

    /// Records in the mirror
    pub record_count: usize,

    /// True once the mirror has been fetched at least once
    pub data_loaded: bool,
}

#[derive(Default)]
struct ViewState {
    query: String,
    /// Query the committed results belong to
    committed_query: String,
    result_ids: Vec<RecordId>,
    loading: bool,
    error: Option<String>,
    last_duration: Option<Duration>,
}

struct ControllerInner {
    sync: Arc<SyncManager>,
    config: SearchConfig,
    index: RwLock<Arc<SearchIndex>>,
    /// Bumped on every index rebuild
    index_epoch: AtomicU64,
    cache: ResultCache,
    view: Mutex<ViewState>,
    generation: AtomicU64,
    searches_executed: AtomicU64,
    listeners: Mutex<Vec<Sender<SearchEvent>>>,
}

impl ControllerInner {
    /// Store the query text and claim a new generation for it.
    fn begin_query(&self, text: &str) -> u64 {
        let mut view = self.view.lock();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        view.query = text.to_string();
        view.loading = !normalize(text).is_empty();
        generation
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    /// Run one search and commit it if `generation` is still current.
    ///
    /// Returns whether the results were committed.
    fn run_search(&self, raw: &str, generation: u64) -> Result<bool> {
        let query = normalize(raw);
        if query.is_empty() {
            return Ok(self.clear_view(generation));
        }

        self.searches_executed.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        match self.compute(&query) {
            Ok((ids, from_cache)) => Ok(self.commit(raw, ids, generation, start.elapsed(), from_cache)),
            Err(e) => {
                warn!(query = %raw, error = %e, "Search failed");
                if self.is_current(generation) {
                    let mut view = self.view.lock();
                    view.loading = false;
                    view.error = Some(e.to_string());
                    drop(view);
                    self.emit(SearchEvent::SearchFailed {
                        query: raw.to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(e)
            }
        }
    }

    /// Ranked identifiers for a normalized query, and whether they came from
    /// the cache.
    #[instrument(skip(self))]
    fn compute(&self, query: &str) -> Result<(Vec<RecordId>, bool)> {
        if let Some(ids) = self.cache.get(query) {
            debug!(results = ids.len(), "Cache hit");
            return Ok((ids.to_vec(), true));
        }

        let epoch = self.index_epoch.load(Ordering::Acquire);
        let index = Arc::clone(&*self.index.read());
        let mirror = self.sync.mirror();

        let indexed = index.lookup(query);
        let fuzzy = if indexed.is_empty() || self.config.fuzzy_enrichment {
            let pattern = SubsequencePattern::with_size_limit(query, self.config.max_pattern_bytes)?;
            scan_mirror(&mirror, &pattern, self.config.parallel_threshold)
        } else {
            Vec::new()
        };
        debug!(indexed = indexed.len(), fuzzy = fuzzy.len(), "Collected candidates");

        let wanted: HashSet<&RecordId> = indexed.iter().chain(fuzzy.iter()).collect();
        // Walk the mirror so candidates arrive in mirror order and ids the
        // mirror no longer holds are dropped
        let candidates = mirror.records().iter().filter(|r| wanted.contains(&r.id));

        let ids: Vec<RecordId> = rank(candidates, query)
            .into_iter()
            .take(self.config.max_results)
            .map(|(record, _)| record.id.clone())
            .collect();

        self.cache.set(query, ids.clone());
        // A rebuild that raced this search may have cleared the cache before
        // the set above; the entry belongs to the old mirror
        if self.index_epoch.load(Ordering::Acquire) != epoch {
            self.cache.remove(query);
        }

        Ok((ids, false))
    }

    fn commit(
        &self,
        raw: &str,
        ids: Vec<RecordId>,
        generation: u64,
        duration: Duration,
        from_cache: bool,
    ) -> bool {
        let mut view = self.view.lock();
        if !self.is_current(generation) {
            debug!(query = %raw, "Discarding superseded results");
            return false;
        }

        let count = ids.len();
        view.committed_query = raw.to_string();
        view.result_ids = ids;
        view.loading = false;
        view.error = None;
        view.last_duration = Some(duration);
        drop(view);

        debug!(query = %raw, count, elapsed_ms = duration.as_secs_f64() * 1000.0, "Results committed");
        self.emit(SearchEvent::ResultsCommitted {
            query: raw.to_string(),
            count,
            duration,
            from_cache,
        });
        true
    }

    fn clear_view(&self, generation: u64) -> bool {
        let mut view = self.view.lock();
        if !self.is_current(generation) {
            return false;
        }
        view.committed_query.clear();
        view.result_ids.clear();
        view.loading = false;
        view.error = None;
        drop(view);

        self.emit(SearchEvent::ResultsCleared);
        true
    }

    /// Swap in an index for the current mirror and drop cached results.
    fn rebuild_index(&self) {
        let mirror = self.sync.mirror();
        let index = SearchIndex::build(&mirror);
        let records = index.len();

        *self.index.write() = Arc::new(index);
        self.index_epoch.fetch_add(1, Ordering::AcqRel);
        self.cache.clear();

        self.emit(SearchEvent::IndexRebuilt { records });
    }

    /// Rerun the active query under the current generation.
    fn rerun_active(&self) {
        let (query, generation) = {
            let view = self.view.lock();
            (view.query.clone(), self.generation.load(Ordering::Acquire))
        };
        if normalize(&query).is_empty() {
            return;
        }
        if let Err(e) = self.run_search(&query, generation) {
            debug!(error = %e, "Rerun after mirror change failed");
        }
    }

    fn on_mirror_changed(&self) {
        info!(records = self.sync.record_count(), "Mirror changed, rebuilding index");
        self.rebuild_index();
        self.rerun_active();
    }

    fn on_sync_failed(&self, reason: &str) {
        debug!(reason, "Mirror refresh failed, keeping current results");
        self.emit(SearchEvent::SyncFailed {
            reason: reason.to_string(),
        });
    }

    fn emit(&self, event: SearchEvent) {
        let mut listeners = self.listeners.lock();
        listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

enum DebounceMsg {
    Schedule { text: String, generation: u64 },
    Shutdown,
}

/// Debounce worker: runs the newest scheduled search once input has been
/// quiet for the debounce delay.
struct Debouncer {
    tx: Sender<DebounceMsg>,
    thread: Option<JoinHandle<()>>,
}

impl Debouncer {
    fn spawn(inner: Weak<ControllerInner>, delay: Duration) -> Result<Self> {
        let (tx, rx) = unbounded::<DebounceMsg>();

        let thread = thread::Builder::new()
            .name("vreg-debounce".to_string())
            .spawn(move || {
                let mut pending: Option<(String, u64)> = None;
                loop {
                    let received = if pending.is_some() {
                        rx.recv_timeout(delay)
                    } else {
                        rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
                    };

                    match received {
                        Ok(DebounceMsg::Schedule { text, generation }) => {
                            pending = Some((text, generation));
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            let Some((text, generation)) = pending.take() else {
                                continue;
                            };
                            let Some(inner) = inner.upgrade() else {
                                break;
                            };
                            // Failures are recorded on the view state
                            let _ = inner.run_search(&text, generation);
                        }
                        Ok(DebounceMsg::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;

        Ok(Debouncer {
            tx,
            thread: Some(thread),
        })
    }

    fn schedule(&self, text: String, generation: u64) {
        if self.tx.send(DebounceMsg::Schedule { text, generation }).is_err() {
            warn!("Debounce worker is gone, search not scheduled");
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        let _ = self.tx.send(DebounceMsg::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Debounced, generation-checked search over the synced mirror.
///
/// ## Example
///
/// ```rust
/// use std::sync::Arc;
/// use vreg_core::{CacheConfig, MemorySource, SearchConfig, SearchController, SyncConfig, SyncManager};
///
/// let sync = Arc::new(SyncManager::new(Arc::new(MemorySource::new()), SyncConfig::default()));
/// let controller = SearchController::new(sync, SearchConfig::default(), &CacheConfig::default()).unwrap();
/// controller.initialize().unwrap();
/// assert!(controller.search_now("abc").unwrap().is_empty());
/// ```
pub struct SearchController {
    inner: Arc<ControllerInner>,
    debouncer: Debouncer,
    _subscription: Subscription,
    _failures: Subscription,
}

impl SearchController {
    /// Create a controller over `sync` and subscribe it to mirror changes
    /// and refresh failures.
    ///
    /// The index is built from whatever mirror `sync` currently holds.
    pub fn new(sync: Arc<SyncManager>, config: SearchConfig, cache: &CacheConfig) -> Result<Self> {
        let inner = Arc::new(ControllerInner {
            sync: Arc::clone(&sync),
            index: RwLock::new(Arc::new(SearchIndex::empty())),
            index_epoch: AtomicU64::new(0),
            cache: ResultCache::new(cache.capacity, cache.max_age()),
            view: Mutex::new(ViewState::default()),
            generation: AtomicU64::new(0),
            searches_executed: AtomicU64::new(0),
            listeners: Mutex::new(Vec::new()),
            config,
        });

        let weak = Arc::downgrade(&inner);
        let subscription = sync.subscribe(move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_mirror_changed();
            }
        });
        let weak = Arc::downgrade(&inner);
        let failures = sync.on_failure(move |reason| {
            if let Some(inner) = weak.upgrade() {
                inner.on_sync_failed(reason);
            }
        });
        // After subscribing, so a change in between is not lost
        inner.rebuild_index();

        let debouncer = Debouncer::spawn(Arc::downgrade(&inner), inner.config.debounce())?;

        Ok(SearchController {
            inner,
            debouncer,
            _subscription: subscription,
            _failures: failures,
        })
    }

    /// First load: a non-forced refresh of the mirror.
    pub fn initialize(&self) -> Result<()> {
        self.inner.sync.refresh(false)?;
        Ok(())
    }

    /// Store `text` and schedule a search after the debounce delay.
    ///
    /// Each call supersedes every earlier one. An empty query clears the
    /// results immediately.
    pub fn set_query(&self, text: &str) {
        let generation = self.inner.begin_query(text);
        if normalize(text).is_empty() {
            self.inner.clear_view(generation);
            return;
        }
        self.debouncer.schedule(text.to_string(), generation);
    }

    /// Alias for [`set_query`](Self::set_query)
    pub fn search(&self, text: &str) {
        self.set_query(text);
    }

    /// Search immediately, bypassing the debounce, and return the results.
    pub fn search_now(&self, text: &str) -> Result<Vec<SearchHit>> {
        let generation = self.inner.begin_query(text);
        self.inner.run_search(text, generation)?;
        Ok(self.results())
    }

    /// Clear the query and results; pending searches are discarded.
    pub fn clear_results(&self) {
        let generation = self.inner.begin_query("");
        self.inner.clear_view(generation);
    }

    /// Force a mirror refresh, then rerun the active query.
    ///
    /// A fetch failure leaves the mirror and results as they were and is
    /// returned; it is also visible as `sync_error` in the snapshot.
    pub fn refresh_data(&self) -> Result<()> {
        let outcome = self.inner.sync.refresh(true)?;
        // A change already reran the query from the subscription
        if !outcome.changed {
            self.inner.rerun_active();
        }
        Ok(())
    }

    /// Committed results resolved against the live mirror.
    ///
    /// Records deleted since the commit are skipped.
    pub fn results(&self) -> Vec<SearchHit> {
        let (query, ids) = {
            let view = self.inner.view.lock();
            (normalize(&view.committed_query), view.result_ids.clone())
        };
        let mirror = self.inner.sync.mirror();

        ids.iter()
            .filter_map(|id| mirror.get(id))
            .map(|record| SearchHit::new(record.clone(), score_normalized(record, &query)))
            .collect()
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        let results = self.results();
        let view = self.inner.view.lock();
        SearchSnapshot {
            query: view.query.clone(),
            results,
            loading: view.loading,
            error: view.error.clone(),
            sync_error: self.inner.sync.last_error(),
            last_duration: view.last_duration,
            record_count: self.inner.sync.record_count(),
            data_loaded: self.inner.sync.is_loaded(),
        }
    }

    /// Subscribe to state changes.
    ///
    /// Each call returns a new receiver; dropped receivers are pruned.
    pub fn events(&self) -> Receiver<SearchEvent> {
        let (tx, rx) = unbounded();
        self.inner.listeners.lock().push(tx);
        rx
    }

    pub fn query(&self) -> String {
        self.inner.view.lock().query.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.view.lock().loading
    }

    pub fn error(&self) -> Option<String> {
        self.inner.view.lock().error.clone()
    }

    pub fn last_duration(&self) -> Option<Duration> {
        self.inner.view.lock().last_duration
    }

    /// Current generation; bumped by every query change
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Number of non-empty searches actually run
    pub fn searches_executed(&self) -> u64 {
        self.inner.searches_executed.load(Ordering::Relaxed)
    }

    /// The index queries currently run against
    pub fn index(&self) -> Arc<SearchIndex> {
        Arc::clone(&*self.inner.index.read())
    }

    pub fn cache_stats(&self) -> &CacheStats {
        self.inner.cache.stats()
    }

    pub fn cached_queries(&self) -> usize {
        self.inner.cache.len()
    }

    pub fn sync(&self) -> &Arc<SyncManager> {
        &self.inner.sync
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::source::MemorySource;
    use crate::types::fixtures::record;

    fn setup(debounce_ms: u64) -> (Arc<MemorySource>, SearchController) {
        let config = SearchConfig {
            debounce_ms,
            ..SearchConfig::default()
        };
        setup_with(config)
    }

    fn setup_with(config: SearchConfig) -> (Arc<MemorySource>, SearchController) {
        let source = Arc::new(MemorySource::with_records(vec![
            record("r1", "ABC-4567", "Alice"),
            record("r2", "XYZ-0001", "Bob Abc"),
        ]));
        let sync = Arc::new(SyncManager::new(source.clone(), SyncConfig::default()));
        let controller = SearchController::new(sync, config, &CacheConfig::default()).unwrap();
        controller.initialize().unwrap();
        (source, controller)
    }

    fn ids(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.record.id.as_str()).collect()
    }

    #[test]
    fn test_search_now_ranks() {
        let (_source, controller) = setup(300);
        let hits = controller.search_now("abc").unwrap();
        assert_eq!(ids(&hits), vec!["r1", "r2"]);
        assert!(hits[0].score > hits[1].score);
        assert!(!controller.is_loading());
        assert!(controller.last_duration().is_some());
    }

    #[test]
    fn test_second_search_hits_cache() {
        let (_source, controller) = setup(300);
        let events = controller.events();

        controller.search_now("abc").unwrap();
        controller.search_now("ABC").unwrap();

        let committed: Vec<bool> = events
            .try_iter()
            .filter_map(|e| match e {
                SearchEvent::ResultsCommitted { from_cache, .. } => Some(from_cache),
                _ => None,
            })
            .collect();
        assert_eq!(committed, vec![false, true]);
    }

    #[test]
    fn test_empty_query_does_no_work() {
        let (_source, controller) = setup(300);
        controller.search_now("abc").unwrap();
        let misses = controller.cache_stats().misses.load(Ordering::Relaxed);

        assert!(controller.search_now("  ").unwrap().is_empty());
        assert_eq!(controller.searches_executed(), 1);
        assert_eq!(controller.cache_stats().misses.load(Ordering::Relaxed), misses);
    }

    #[test]
    fn test_stale_generation_is_discarded() {
        let (_source, controller) = setup(300);
        let stale = controller.inner.begin_query("bob");
        let current = controller.inner.begin_query("alice");

        assert!(controller.inner.run_search("alice", current).unwrap());
        assert!(!controller.inner.run_search("bob", stale).unwrap());

        assert_eq!(ids(&controller.results()), vec!["r1"]);
    }

    #[test]
    fn test_mirror_change_reruns_active_query() {
        let (source, controller) = setup(300);
        controller.search_now("lin").unwrap();
        assert!(controller.results().is_empty());

        source.replace_all(vec![record("r3", "QQQ-1", "Lin")]);
        controller.refresh_data().unwrap();

        assert_eq!(ids(&controller.results()), vec!["r3"]);
        assert_eq!(controller.cached_queries(), 1);
    }

    #[test]
    fn test_failed_search_keeps_previous_results() {
        let (_source, controller) = setup_with(SearchConfig {
            max_pattern_bytes: 1,
            ..SearchConfig::default()
        });
        let events = controller.events();

        // Index hit, so no pattern is compiled
        assert_eq!(ids(&controller.search_now("alice").unwrap()), vec!["r1"]);

        // Index miss; the subsequence pattern cannot fit in one byte
        let err = controller.search_now("a4").unwrap_err();
        assert!(matches!(err, crate::error::VregError::InvalidPattern { .. }));

        let snapshot = controller.snapshot();
        assert!(snapshot.error.is_some());
        assert!(!snapshot.loading);
        assert_eq!(snapshot.query, "a4");
        assert_eq!(ids(&snapshot.results), vec!["r1"]);

        let failed = events.try_iter().find_map(|e| match e {
            SearchEvent::SearchFailed { query, .. } => Some(query),
            _ => None,
        });
        assert_eq!(failed.as_deref(), Some("a4"));

        // The next good search clears the error
        controller.search_now("bob").unwrap();
        assert!(controller.error().is_none());
    }

    #[test]
    fn test_refresh_failure_is_published() {
        let (source, controller) = setup(300);
        controller.search_now("abc").unwrap();
        let events = controller.events();

        source.set_fail_fetch(true);
        assert!(controller.refresh_data().is_err());

        let reason = events.try_iter().find_map(|e| match e {
            SearchEvent::SyncFailed { reason } => Some(reason),
            _ => None,
        });
        assert!(reason.unwrap().contains("unavailable"));
        assert_eq!(ids(&controller.results()), vec!["r1", "r2"]);
        assert!(controller.error().is_none());
    }

    #[test]
    fn test_clear_results() {
        let (_source, controller) = setup(300);
        controller.search_now("abc").unwrap();
        controller.clear_results();

        let snapshot = controller.snapshot();
        assert!(snapshot.query.is_empty());
        assert!(snapshot.results.is_empty());
        assert!(!snapshot.loading);
    }

    #[test]
    fn test_results_skip_deleted_records() {
        let (source, controller) = setup(300);
        controller.search_now("abc").unwrap();

        source.replace_all(vec![record("r2", "XYZ-0001", "Bob Abc")]);
        controller.sync().refresh(true).unwrap();

        assert_eq!(ids(&controller.results()), vec!["r2"]);
    }
}
