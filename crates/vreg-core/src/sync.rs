//! Local record mirror and its synchronization with the record source.
//!
//! The `SyncManager` owns the one authoritative [`Mirror`]. It:
//!
//! - Refreshes the mirror on demand and from a background timer
//! - Skips non-forced refreshes while the mirror is still fresh
//! - Shares a single in-flight fetch between concurrent callers
//! - Swaps the mirror whole and notifies subscribers only when it changed
//! - Keeps the last good mirror when a fetch fails and records the error
//! - Routes writes to the source and then pulls a fresh mirror
//!
//! ## Lifecycle
//!
//! Construction has no side effects. `start()` spawns the refresh timer and
//! `stop()` (or dropping the manager) shuts it down and joins its thread.

use crate::config::SyncConfig;
use crate::error::{Result, VregError};
use crate::source::RecordSource;
use crate::types::{Mirror, NewVehicleRecord, RecordId, RecordPatch, VehicleRecord};
use chrono::{DateTime, Utc};
use crossbeam_channel::{RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Change callback; invoked with no arguments after the mirror changed
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Failure callback; invoked with the reason after a fetch failed
pub type FailureCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// What a call to [`SyncManager::refresh`] produced.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    /// The mirror after the refresh
    pub mirror: Arc<Mirror>,

    /// True if the fetched records differ from the previous mirror
    pub changed: bool,

    /// False when the mirror was fresh enough and no fetch happened
    pub fetched: bool,
}

struct MirrorState {
    mirror: Arc<Mirror>,
    last_refresh: Option<Instant>,
    refreshed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    loaded: bool,
}

/// Outcome of a fetch, shareable between every caller waiting on it.
/// The error side is the source's failure reason.
type SharedOutcome = std::result::Result<RefreshOutcome, String>;

/// A fetch currently running; other callers wait on it instead of fetching.
struct InFlight {
    result: Mutex<Option<SharedOutcome>>,
    done: Condvar,
}

impl InFlight {
    fn new() -> Self {
        InFlight {
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn wait(&self) -> SharedOutcome {
        let mut result = self.result.lock();
        while result.is_none() {
            self.done.wait(&mut result);
        }
        result.clone().unwrap_or_else(|| Err("refresh finished without a result".to_string()))
    }

    fn finish(&self, outcome: SharedOutcome) {
        *self.result.lock() = Some(outcome);
        self.done.notify_all();
    }
}

struct SyncInner {
    source: Arc<dyn RecordSource>,
    config: SyncConfig,
    state: RwLock<MirrorState>,
    in_flight: Mutex<Option<Arc<InFlight>>>,
    subscribers: Mutex<Vec<(u64, ChangeCallback)>>,
    failure_subscribers: Mutex<Vec<(u64, FailureCallback)>>,
    next_subscriber: AtomicU64,
    /// Bumped every time a refresh swaps in a different mirror
    version: AtomicU64,
}

impl SyncInner {
    /// Refresh entry point.
    ///
    /// With `after_write`, an in-flight fetch that may have started before the
    /// write is waited out and a new fetch is issued, so the write is visible
    /// in the mirror this call returns.
    fn refresh(&self, force: bool, after_write: bool) -> Result<RefreshOutcome> {
        loop {
            let mut slot = self.in_flight.lock();
            let running = slot.as_ref().map(Arc::clone);

            if let Some(flight) = running {
                drop(slot);
                debug!("Joining in-flight refresh");
                let shared = flight.wait();
                if after_write {
                    continue;
                }
                return shared.map_err(|reason| self.fetch_error(reason));
            }

            if !force {
                if let Some(outcome) = self.fresh_snapshot() {
                    return Ok(outcome);
                }
            }

            let flight = Arc::new(InFlight::new());
            *slot = Some(Arc::clone(&flight));
            drop(slot);

            let outcome = self.fetch_and_swap();

            // Clear the slot before notifying so a subscriber that refreshes
            // doesn't wait on itself
            *self.in_flight.lock() = None;
            match outcome {
                Ok(ref o) if o.changed => self.notify_subscribers(),
                Err(ref reason) => self.notify_failure(reason),
                Ok(_) => {}
            }
            flight.finish(outcome.clone());

            return outcome.map_err(|reason| self.fetch_error(reason));
        }
    }

    fn fetch_error(&self, reason: String) -> VregError {
        VregError::FetchFailed {
            source_name: self.source.name().to_string(),
            reason,
        }
    }

    /// The current mirror, if it is younger than the freshness window.
    fn fresh_snapshot(&self) -> Option<RefreshOutcome> {
        let state = self.state.read();
        let last = state.last_refresh?;
        if last.elapsed() < self.config.freshness_window() {
            debug!(age_ms = last.elapsed().as_millis() as u64, "Mirror still fresh, skipping fetch");
            Some(RefreshOutcome {
                mirror: Arc::clone(&state.mirror),
                changed: false,
                fetched: false,
            })
        } else {
            None
        }
    }

    #[instrument(skip(self), fields(source = self.source.name()))]
    fn fetch_and_swap(&self) -> SharedOutcome {
        let start = Instant::now();

        // A panicking source must not leave the in-flight slot occupied
        let fetched = catch_unwind(AssertUnwindSafe(|| self.source.fetch_all())).unwrap_or_else(|_| {
            Err(anyhow::anyhow!("{} source panicked during fetch", self.source.name()))
        });

        match fetched {
            Ok(records) => {
                let fresh = Mirror::new(records);
                let mut state = self.state.write();

                let changed = *state.mirror != fresh;
                if changed {
                    state.mirror = Arc::new(fresh);
                    self.version.fetch_add(1, Ordering::Release);
                }
                state.last_refresh = Some(Instant::now());
                state.refreshed_at = Some(Utc::now());
                state.last_error = None;
                state.loaded = true;

                info!(
                    records = state.mirror.len(),
                    changed,
                    elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Mirror refreshed"
                );

                Ok(RefreshOutcome {
                    mirror: Arc::clone(&state.mirror),
                    changed,
                    fetched: true,
                })
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                warn!(error = %reason, "Fetch failed, keeping last good mirror");
                self.state.write().last_error = Some(reason.clone());
                Err(reason)
            }
        }
    }

    fn notify_failure(&self, reason: &str) {
        let subscribers: Vec<(u64, FailureCallback)> = self.failure_subscribers.lock().clone();

        for (id, callback) in subscribers {
            if catch_unwind(AssertUnwindSafe(|| callback(reason))).is_err() {
                error!(subscriber = id, "Failure subscriber panicked");
            }
        }
    }

    fn notify_subscribers(&self) {
        let subscribers: Vec<(u64, ChangeCallback)> = self.subscribers.lock().clone();
        debug!(subscribers = subscribers.len(), "Notifying mirror change");

        for (id, callback) in subscribers {
            if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                error!(subscriber = id, "Change subscriber panicked");
            }
        }
    }
}

/// Handle for a change subscription.
///
/// Dropping the handle removes the subscription.
#[must_use = "dropping a Subscription unsubscribes it"]
pub struct Subscription {
    id: u64,
    inner: Weak<SyncInner>,
}

impl Subscription {
    /// Remove the subscription now
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.subscribers.lock().retain(|(id, _)| *id != self.id);
            inner.failure_subscribers.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

/// Handle for the background refresh thread.
///
/// When dropped, the thread is stopped and joined.
pub struct RefreshTimer {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl RefreshTimer {
    fn spawn(inner: Arc<SyncInner>, interval: Duration) -> Result<Self> {
        let (shutdown, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let thread = thread::Builder::new()
            .name("vreg-refresh".to_string())
            .spawn(move || loop {
                match shutdown_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Err(e) = inner.refresh(false, false) {
                            debug!(error = %e, "Periodic refresh failed");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(RefreshTimer {
            shutdown: Some(shutdown),
            thread: Some(thread),
        })
    }

    /// Signal the timer to stop and wait for its thread
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            // The last owner can be dropped from a subscriber running on the
            // timer thread itself; that thread exits on its own
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Owner of the local record mirror.
///
/// Shared by reference (`Arc<SyncManager>`) with every consumer.
///
/// ## Example
///
/// ```rust
/// use std::sync::Arc;
/// use vreg_core::{MemorySource, SyncConfig, SyncManager};
///
/// let sync = SyncManager::new(Arc::new(MemorySource::new()), SyncConfig::default());
/// let outcome = sync.refresh(true).unwrap();
/// assert!(outcome.mirror.is_empty());
/// ```
pub struct SyncManager {
    inner: Arc<SyncInner>,
    timer: Mutex<Option<RefreshTimer>>,
}

impl SyncManager {
    /// Create a manager with an empty mirror. Nothing is fetched until the
    /// first refresh.
    pub fn new(source: Arc<dyn RecordSource>, config: SyncConfig) -> Self {
        SyncManager {
            inner: Arc::new(SyncInner {
                source,
                config,
                state: RwLock::new(MirrorState {
                    mirror: Arc::new(Mirror::default()),
                    last_refresh: None,
                    refreshed_at: None,
                    last_error: None,
                    loaded: false,
                }),
                in_flight: Mutex::new(None),
                subscribers: Mutex::new(Vec::new()),
                failure_subscribers: Mutex::new(Vec::new()),
                next_subscriber: AtomicU64::new(1),
                version: AtomicU64::new(0),
            }),
            timer: Mutex::new(None),
        }
    }

    /// Bring the mirror up to date.
    ///
    /// - If a refresh is already running, waits for it and returns its result
    /// - If not forced and the mirror is within the freshness window, returns
    ///   it without fetching
    /// - Otherwise fetches, swaps the mirror, and notifies subscribers if it
    ///   changed
    ///
    /// On a fetch failure the last good mirror stays in place, the error is
    /// recorded (see [`last_error`](Self::last_error)) and returned.
    pub fn refresh(&self, force: bool) -> Result<RefreshOutcome> {
        self.inner.refresh(force, false)
    }

    /// Create a record, then pull a fresh mirror that includes it.
    pub fn add(&self, record: NewVehicleRecord) -> Result<VehicleRecord> {
        let created = self
            .inner
            .source
            .create(record)
            .map_err(|e| VregError::write("create", &e))?;
        info!(id = %created.id, plate = %created.plate, "Record created");

        self.inner.refresh(true, true)?;
        Ok(created)
    }

    /// Update a record, then pull a fresh mirror that includes the change.
    pub fn update(&self, id: &RecordId, patch: RecordPatch) -> Result<VehicleRecord> {
        let updated = self
            .inner
            .source
            .update(id, patch)
            .map_err(|e| VregError::write("update", &e))?;
        info!(id = %updated.id, "Record updated");

        self.inner.refresh(true, true)?;
        Ok(updated)
    }

    /// Delete a record, then pull a fresh mirror without it.
    pub fn delete(&self, id: &RecordId) -> Result<()> {
        self.inner
            .source
            .delete(id)
            .map_err(|e| VregError::write("delete", &e))?;
        info!(id = %id, "Record deleted");

        self.inner.refresh(true, true)?;
        Ok(())
    }

    /// Register a callback run after every refresh that changed the mirror.
    ///
    /// Callbacks run on the refreshing thread. A panicking callback is logged
    /// and does not stop the others.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().push((id, Arc::new(callback)));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Register a callback run with the reason whenever a fetch fails.
    ///
    /// The mirror is left as it was; this only reports the failure. Callers
    /// that joined the failed fetch do not trigger a second notification.
    pub fn on_failure<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.inner.failure_subscribers.lock().push((id, Arc::new(callback)));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Start the periodic refresh timer.
    ///
    /// Does nothing if `auto_refresh` is off or the timer already runs.
    pub fn start(&self) -> Result<()> {
        if !self.inner.config.auto_refresh {
            info!("Auto refresh disabled, not starting timer");
            return Ok(());
        }

        let mut timer = self.timer.lock();
        if timer.is_none() {
            let interval = self.inner.config.refresh_interval();
            *timer = Some(RefreshTimer::spawn(Arc::clone(&self.inner), interval)?);
            info!(interval_secs = interval.as_secs(), "Refresh timer started");
        }
        Ok(())
    }

    /// Stop the periodic refresh timer. The mirror is kept.
    pub fn stop(&self) {
        if let Some(mut timer) = self.timer.lock().take() {
            timer.stop();
            info!("Refresh timer stopped");
        }
    }

    /// True while the refresh timer runs
    pub fn is_running(&self) -> bool {
        self.timer.lock().is_some()
    }

    /// The current mirror snapshot
    pub fn mirror(&self) -> Arc<Mirror> {
        Arc::clone(&self.inner.state.read().mirror)
    }

    /// Number of records in the current mirror
    pub fn record_count(&self) -> usize {
        self.inner.state.read().mirror.len()
    }

    /// True once any fetch has succeeded
    pub fn is_loaded(&self) -> bool {
        self.inner.state.read().loaded
    }

    /// Failure reason of the latest fetch; cleared by the next success
    pub fn last_error(&self) -> Option<String> {
        self.inner.state.read().last_error.clone()
    }

    /// Wall-clock time of the last successful fetch
    pub fn last_refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.inner.state.read().refreshed_at
    }

    /// Counter bumped each time a different mirror is swapped in
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Name of the underlying record source
    pub fn source_name(&self) -> &'static str {
        self.inner.source.name()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncManager")
            .field("source", &self.source_name())
            .field("records", &self.record_count())
            .field("version", &self.version())
            .finish()
    }
}
