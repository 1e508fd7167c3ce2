//! Record source trait and implementations.
//!
//! A `RecordSource` is the remote record store as seen by the sync layer: it
//! returns the full record set and performs writes. Field mapping, transport
//! and retries all live behind this trait. The core only ever asks for a full
//! snapshot and treats the store as the source of truth.
//!
//! ## Implementations
//!
//! - [`MemorySource`]: in-process store with failure injection, used for
//!   embedding and tests
//! - [`JsonFileSource`]: a JSON array on disk, used by the CLI
//! - [`TimeoutSource`]: wraps another source and bounds `fetch_all` by a timeout

use crate::types::{NewVehicleRecord, RecordId, RecordPatch, VehicleRecord};
use anyhow::{anyhow, bail, Context};
use chrono::Utc;
use crossbeam_channel::RecvTimeoutError;
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Abstract interface to the remote record store.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; the sync layer calls them from the
/// refresh timer thread as well as from callers' threads.
///
/// ## Error Handling
///
/// Calls return `anyhow::Result`. The sync layer never retries; a source that
/// wants retries implements them itself.
pub trait RecordSource: Send + Sync {
    /// Read every record, in store order.
    fn fetch_all(&self) -> anyhow::Result<Vec<VehicleRecord>>;

    /// Create a record and return it as stored (with id and timestamps).
    fn create(&self, record: NewVehicleRecord) -> anyhow::Result<VehicleRecord>;

    /// Apply a partial update and return the updated record.
    fn update(&self, id: &RecordId, patch: RecordPatch) -> anyhow::Result<VehicleRecord>;

    /// Delete a record.
    fn delete(&self, id: &RecordId) -> anyhow::Result<()>;

    /// Short name used in logs and errors (e.g., "memory", "json")
    fn name(&self) -> &'static str;
}

/// Next free `rec-<n>` identifier given the existing records.
fn next_record_id(records: &[VehicleRecord]) -> u64 {
    records
        .iter()
        .filter_map(|r| r.id.as_str().strip_prefix("rec-")?.parse::<u64>().ok())
        .max()
        .map_or(1, |n| n + 1)
}

fn apply_update(
    records: &mut [VehicleRecord],
    id: &RecordId,
    patch: &RecordPatch,
) -> anyhow::Result<VehicleRecord> {
    let record = records
        .iter_mut()
        .find(|r| &r.id == id)
        .ok_or_else(|| anyhow!("record {} not found", id))?;
    patch.apply_to(record, Utc::now());
    Ok(record.clone())
}

fn apply_delete(records: &mut Vec<VehicleRecord>, id: &RecordId) -> anyhow::Result<()> {
    let before = records.len();
    records.retain(|r| &r.id != id);
    if records.len() == before {
        bail!("record {} not found", id);
    }
    Ok(())
}

// === In-memory source ===

/// In-process record store.
///
/// Besides serving as a real store for embedded use, it can be told to fail
/// fetches or writes and to delay fetches, and it counts how many fetches it
/// served.
#[derive(Default)]
pub struct MemorySource {
    records: RwLock<Vec<VehicleRecord>>,
    next_id: AtomicU64,
    fail_fetch: AtomicBool,
    fail_writes: AtomicBool,
    fetch_delay: Mutex<Duration>,
    fetch_count: AtomicU64,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    /// Create a store pre-populated with `records`
    pub fn with_records(records: Vec<VehicleRecord>) -> Self {
        let next = next_record_id(&records);
        MemorySource {
            records: RwLock::new(records),
            next_id: AtomicU64::new(next),
            ..Default::default()
        }
    }

    /// Make subsequent fetches fail (or succeed again)
    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent writes fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Sleep this long inside every fetch
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock() = delay;
    }

    /// Number of fetches served so far, failed ones included
    pub fn fetch_count(&self) -> u64 {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Replace the stored records directly, bypassing the write API.
    ///
    /// Simulates another client changing the remote store.
    pub fn replace_all(&self, records: Vec<VehicleRecord>) {
        let mut stored = self.records.write();
        self.next_id.fetch_max(next_record_id(&records), Ordering::SeqCst);
        *stored = records;
    }

    fn check_writable(&self, operation: &str) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("{} rejected by store", operation);
        }
        Ok(())
    }
}

impl RecordSource for MemorySource {
    fn fetch_all(&self) -> anyhow::Result<Vec<VehicleRecord>> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.fetch_delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        if self.fail_fetch.load(Ordering::SeqCst) {
            bail!("record store unavailable");
        }
        Ok(self.records.read().clone())
    }

    fn create(&self, record: NewVehicleRecord) -> anyhow::Result<VehicleRecord> {
        self.check_writable("create")?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let stored = record.into_record(RecordId::new(format!("rec-{}", n)), Utc::now());
        self.records.write().push(stored.clone());
        Ok(stored)
    }

    fn update(&self, id: &RecordId, patch: RecordPatch) -> anyhow::Result<VehicleRecord> {
        self.check_writable("update")?;
        apply_update(&mut self.records.write(), id, &patch)
    }

    fn delete(&self, id: &RecordId) -> anyhow::Result<()> {
        self.check_writable("delete")?;
        apply_delete(&mut self.records.write(), id)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// === JSON file source ===

/// Record store kept as a JSON array in a single file.
///
/// A missing file is an empty store. Writes are atomic: the new contents go to
/// a temporary file which is then renamed over the original.
pub struct JsonFileSource {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileSource {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    fn load(&self) -> anyhow::Result<Vec<VehicleRecord>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Record file not found, treating as empty");
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&contents).with_context(|| format!("parsing {}", self.path.display()))
    }

    fn store(&self, records: &[VehicleRecord]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.temp_path();
        let contents = serde_json::to_string_pretty(records)?;
        fs::write(&temp_path, contents)
            .with_context(|| format!("writing {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;

        info!(path = %self.path.display(), records = records.len(), "Saved record file");
        Ok(())
    }
}

impl RecordSource for JsonFileSource {
    fn fetch_all(&self) -> anyhow::Result<Vec<VehicleRecord>> {
        self.load()
    }

    fn create(&self, record: NewVehicleRecord) -> anyhow::Result<VehicleRecord> {
        let _guard = self.write_lock.lock();
        let mut records = self.load()?;
        let id = RecordId::new(format!("rec-{}", next_record_id(&records)));
        let stored = record.into_record(id, Utc::now());
        records.push(stored.clone());
        self.store(&records)?;
        Ok(stored)
    }

    fn update(&self, id: &RecordId, patch: RecordPatch) -> anyhow::Result<VehicleRecord> {
        let _guard = self.write_lock.lock();
        let mut records = self.load()?;
        let updated = apply_update(&mut records, id, &patch)?;
        self.store(&records)?;
        Ok(updated)
    }

    fn delete(&self, id: &RecordId) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock();
        let mut records = self.load()?;
        apply_delete(&mut records, id)?;
        self.store(&records)
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

// === Timeout wrapper ===

/// Bounds `fetch_all` of another source by a timeout.
///
/// The fetch runs on a helper thread. When the timeout fires the caller gets
/// an error right away and the helper's eventual result is discarded. Writes
/// are passed through untouched.
pub struct TimeoutSource {
    inner: Arc<dyn RecordSource>,
    timeout: Duration,
}

impl TimeoutSource {
    pub fn new(inner: Arc<dyn RecordSource>, timeout: Duration) -> Self {
        TimeoutSource { inner, timeout }
    }
}

impl RecordSource for TimeoutSource {
    fn fetch_all(&self) -> anyhow::Result<Vec<VehicleRecord>> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let inner = Arc::clone(&self.inner);

        thread::Builder::new()
            .name("vreg-fetch".to_string())
            .spawn(move || {
                let _ = tx.send(inner.fetch_all());
            })
            .context("spawning fetch thread")?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(anyhow!(
                "fetch from {} timed out after {:?}",
                self.inner.name(),
                self.timeout
            )),
            Err(RecvTimeoutError::Disconnected) => {
                Err(anyhow!("fetch thread exited without a result"))
            }
        }
    }

    fn create(&self, record: NewVehicleRecord) -> anyhow::Result<VehicleRecord> {
        self.inner.create(record)
    }

    fn update(&self, id: &RecordId, patch: RecordPatch) -> anyhow::Result<VehicleRecord> {
        self.inner.update(id, patch)
    }

    fn delete(&self, id: &RecordId) -> anyhow::Result<()> {
        self.inner.delete(id)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::record;
    use crate::types::ApprovalStatus;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn new_record(plate: &str) -> NewVehicleRecord {
        NewVehicleRecord::new(
            plate,
            "Erin Hsu",
            "car",
            "staff",
            "0911000111",
            NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
        )
    }

    #[test]
    fn test_memory_create_assigns_ids() {
        let source = MemorySource::with_records(vec![record("rec-7", "ABC-4567", "Alice")]);
        let created = source.create(new_record("NEW-0001")).unwrap();

        assert_eq!(created.id.as_str(), "rec-8");
        assert_eq!(created.approval_status, ApprovalStatus::Pending);
        assert_eq!(source.fetch_all().unwrap().len(), 2);
        assert_eq!(source.fetch_count(), 1);
    }

    #[test]
    fn test_replace_all_keeps_new_ids_unique() {
        let source = MemorySource::new();
        source.replace_all(vec![record("rec-5", "ABC-4567", "Alice")]);

        let created = source.create(new_record("NEW-0001")).unwrap();
        assert_eq!(created.id.as_str(), "rec-6");

        // Shrinking the store never hands out an id twice
        source.replace_all(Vec::new());
        assert_eq!(source.create(new_record("NEW-0002")).unwrap().id.as_str(), "rec-7");
    }

    #[test]
    fn test_memory_update_and_delete() {
        let source = MemorySource::with_records(vec![record("r1", "ABC-4567", "Alice")]);

        let patch = RecordPatch {
            approval_status: Some(ApprovalStatus::Approved),
            ..Default::default()
        };
        let updated = source.update(&RecordId::new("r1"), patch).unwrap();
        assert_eq!(updated.approval_status, ApprovalStatus::Approved);

        source.delete(&RecordId::new("r1")).unwrap();
        assert!(source.fetch_all().unwrap().is_empty());
        assert!(source.delete(&RecordId::new("r1")).is_err());
    }

    #[test]
    fn test_memory_failure_injection() {
        let source = MemorySource::new();
        source.set_fail_fetch(true);
        assert!(source.fetch_all().is_err());
        source.set_fail_fetch(false);
        assert!(source.fetch_all().is_ok());

        source.set_fail_writes(true);
        assert!(source.create(new_record("X-1")).is_err());
        assert!(source.fetch_all().unwrap().is_empty());
    }

    #[test]
    fn test_json_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let source = JsonFileSource::new(temp_dir.path().join("records.json"));
        assert!(source.fetch_all().unwrap().is_empty());
    }

    #[test]
    fn test_json_write_cycle() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data").join("records.json");
        let source = JsonFileSource::new(&path);

        let first = source.create(new_record("ABC-4567")).unwrap();
        let second = source.create(new_record("XYZ-0001")).unwrap();
        assert_eq!(first.id.as_str(), "rec-1");
        assert_eq!(second.id.as_str(), "rec-2");

        let patch = RecordPatch {
            brand: Some("Toyota".to_string()),
            ..Default::default()
        };
        source.update(&first.id, patch).unwrap();
        source.delete(&second.id).unwrap();

        // A fresh handle sees what the first one wrote
        let reopened = JsonFileSource::new(&path);
        let records = reopened.fetch_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].brand.as_deref(), Some("Toyota"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_json_corrupt_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("records.json");
        fs::write(&path, "{not json").unwrap();

        let err = JsonFileSource::new(&path).fetch_all().unwrap_err();
        assert!(format!("{:#}", err).contains("parsing"));
    }

    #[test]
    fn test_timeout_source_times_out() {
        let slow = Arc::new(MemorySource::new());
        slow.set_fetch_delay(Duration::from_millis(500));
        let source = TimeoutSource::new(slow, Duration::from_millis(20));

        let err = source.fetch_all().unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_timeout_source_passes_result() {
        let inner = Arc::new(MemorySource::with_records(vec![record("r1", "ABC-4567", "Alice")]));
        let source = TimeoutSource::new(inner, Duration::from_secs(5));
        assert_eq!(source.fetch_all().unwrap().len(), 1);
        assert_eq!(source.name(), "memory");
    }
}
