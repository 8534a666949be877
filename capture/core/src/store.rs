//! Capture Store
//!
//! Bounded, thread-safe, newest-first container of [`CaptureRecord`]s.
//!
//! # Design
//!
//! The backing sequence is the only shared mutable state. Every operation
//! takes the single mutex for exactly the sequence operation and releases it
//! before logging or returning, so the store is safe to call from transport
//! callback tasks and UI threads alike. Reads hand out copies; nothing outside
//! the store ever holds a reference into it.
//!
//! Completion of an id that is no longer present (evicted or cleared) is a
//! silent no-op. An observability feature must never fail the host request.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::record::{
    CaptureRecord, HeaderFields, RecordId, RecordedError, RequestSnapshot, ResponseSnapshot,
};

/// Default number of records retained
pub const DEFAULT_MAX_RECORDS: usize = 100;

// ============================================================================
// Statistics
// ============================================================================

/// Counters describing store activity since construction
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Records created by `initiate`
    pub initiated: u64,
    /// Completions that found their record
    pub completed: u64,
    /// Records dropped from the tail to respect capacity
    pub evicted: u64,
    /// Completions whose record was already gone
    pub dropped_completions: u64,
    /// Number of `clear` calls
    pub cleared: u64,
}

/// Atomic statistics for lock-free updates
#[derive(Default)]
struct StoreStatsAtomic {
    initiated: AtomicU64,
    completed: AtomicU64,
    evicted: AtomicU64,
    dropped_completions: AtomicU64,
    cleared: AtomicU64,
}

impl StoreStatsAtomic {
    fn snapshot(&self) -> StoreStats {
        StoreStats {
            initiated: self.initiated.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            dropped_completions: self.dropped_completions.load(Ordering::Relaxed),
            cleared: self.cleared.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Store
// ============================================================================

/// Bounded ring of captured records, newest first
pub struct CaptureStore {
    capacity: usize,
    records: Mutex<VecDeque<CaptureRecord>>,
    stats: StoreStatsAtomic,
    /// Signalled after every completion and clear
    settled: Notify,
}

impl CaptureStore {
    /// Create a store retaining at most `max_records` records
    ///
    /// A capacity of zero is clamped to one.
    #[must_use]
    pub fn new(max_records: usize) -> Self {
        if max_records == 0 {
            tracing::warn!("Capture store capacity of 0 requested, using 1");
        }
        let capacity = max_records.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            stats: StoreStatsAtomic::default(),
            settled: Notify::new(),
        }
    }

    /// Maximum number of records retained
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register a pending record and return its id
    ///
    /// The record is inserted at the head. Records beyond capacity are
    /// evicted from the tail.
    pub fn initiate(&self, request: RequestSnapshot) -> RecordId {
        let id = RecordId::new();
        let record = CaptureRecord::pending(id, request);

        let evicted = {
            let mut records = self.records.lock();
            records.push_front(record);
            let mut evicted = 0u64;
            while records.len() > self.capacity {
                records.pop_back();
                evicted += 1;
            }
            evicted
        };

        self.stats.initiated.fetch_add(1, Ordering::Relaxed);
        if evicted > 0 {
            self.stats.evicted.fetch_add(evicted, Ordering::Relaxed);
            tracing::trace!(evicted, capacity = self.capacity, "Evicted oldest capture records");
        }

        id
    }

    /// Record a response for `id`
    ///
    /// Returns whether a record was updated. An unknown id is ignored.
    pub fn complete_with_response(
        &self,
        id: RecordId,
        status: u16,
        headers: HeaderFields,
        body: Option<Bytes>,
        duration: Duration,
    ) -> bool {
        let response = ResponseSnapshot {
            status,
            headers,
            body,
            body_truncated: false,
        };
        self.complete_with_snapshot(id, response, duration)
    }

    /// Record a prepared response snapshot for `id`
    ///
    /// Returns whether a record was updated. An unknown id is ignored.
    pub fn complete_with_snapshot(
        &self,
        id: RecordId,
        response: ResponseSnapshot,
        duration: Duration,
    ) -> bool {
        self.replace(id, |record| record.with_response(response, duration))
    }

    /// Record a failure for `id`
    ///
    /// Returns whether a record was updated. An unknown id is ignored. A
    /// record that already holds a response keeps it, so a late failure
    /// leaves both fields set.
    pub fn complete_with_error(&self, id: RecordId, error: RecordedError, duration: Duration) -> bool {
        self.replace(id, |record| record.with_error(error, duration))
    }

    fn replace(&self, id: RecordId, update: impl FnOnce(&CaptureRecord) -> CaptureRecord) -> bool {
        let found = {
            let mut records = self.records.lock();
            match records.iter().position(|r| r.id() == id) {
                Some(index) => {
                    let updated = update(&records[index]);
                    records[index] = updated;
                    true
                }
                None => false,
            }
        };

        self.settled.notify_waiters();
        if found {
            self.stats.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.dropped_completions.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(record_id = %id, "Completion for evicted record ignored");
        }
        found
    }

    /// Copy of all records, newest first
    #[must_use]
    pub fn records(&self) -> Vec<CaptureRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Copy of a single record
    #[must_use]
    pub fn get(&self, id: RecordId) -> Option<CaptureRecord> {
        self.records.lock().iter().find(|r| r.id() == id).cloned()
    }

    /// Records that have not completed yet
    #[must_use]
    pub fn pending(&self) -> Vec<CaptureRecord> {
        self.filtered(CaptureRecord::is_pending)
    }

    /// Records that failed at the transport level
    #[must_use]
    pub fn failures(&self) -> Vec<CaptureRecord> {
        self.filtered(CaptureRecord::is_error)
    }

    /// Records whose URL contains `pattern`
    #[must_use]
    pub fn find_by_url(&self, pattern: &str) -> Vec<CaptureRecord> {
        self.filtered(|r| r.request().url.contains(pattern))
    }

    fn filtered(&self, pred: impl Fn(&CaptureRecord) -> bool) -> Vec<CaptureRecord> {
        self.records.lock().iter().filter(|&r| pred(r)).cloned().collect()
    }

    /// Number of records currently retained
    #[must_use]
    pub fn count(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the store holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Drop all records
    pub fn clear(&self) {
        self.records.lock().clear();
        self.stats.cleared.fetch_add(1, Ordering::Relaxed);
        self.settled.notify_waiters();
    }

    /// Wait until no retained record is pending
    ///
    /// Resolves immediately when nothing is in flight. Requests that never
    /// terminate keep this pending, so callers usually bound it with a
    /// timeout.
    pub async fn wait_until_settled(&self) {
        loop {
            // Register before checking so a completion in between is not missed
            let notified = self.settled.notified();
            if !self.records.lock().iter().any(CaptureRecord::is_pending) {
                return;
            }
            notified.await;
        }
    }

    /// Activity counters
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.stats.snapshot()
    }
}

impl Default for CaptureStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORDS)
    }
}

impl std::fmt::Debug for CaptureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureStore")
            .field("capacity", &self.capacity)
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FailureKind;
    use pretty_assertions::assert_eq;

    fn request(path: &str) -> RequestSnapshot {
        RequestSnapshot::new("GET", format!("https://example.com/{path}"))
    }

    fn ids(store: &CaptureStore) -> Vec<RecordId> {
        store.records().iter().map(CaptureRecord::id).collect()
    }

    #[test]
    fn test_newest_first_with_eviction() {
        let store = CaptureStore::new(3);
        let r: Vec<RecordId> = (1..=5).map(|i| store.initiate(request(&format!("r{i}")))).collect();

        assert_eq!(store.count(), 3);
        assert_eq!(ids(&store), vec![r[4], r[3], r[2]]);

        let stats = store.stats();
        assert_eq!(stats.initiated, 5);
        assert_eq!(stats.evicted, 2);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let store = CaptureStore::new(0);
        assert_eq!(store.capacity(), 1);
        store.initiate(request("a"));
        store.initiate(request("b"));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_completion_of_evicted_id_is_noop() {
        let store = CaptureStore::new(2);
        let first = store.initiate(request("first"));
        store.initiate(request("second"));
        store.initiate(request("third"));

        let before = store.records();
        let applied = store.complete_with_response(
            first,
            200,
            HeaderFields::new(),
            None,
            Duration::from_millis(5),
        );
        let applied_err = store.complete_with_error(
            first,
            RecordedError::new(FailureKind::Timeout, "timeout"),
            Duration::from_millis(5),
        );

        assert!(!applied);
        assert!(!applied_err);
        assert_eq!(store.records(), before);
        assert_eq!(store.stats().dropped_completions, 2);
    }

    #[test]
    fn test_completion_replaces_slot_in_place() {
        let store = CaptureStore::new(10);
        let a = store.initiate(request("a"));
        let b = store.initiate(request("b"));

        assert!(store.complete_with_response(a, 404, HeaderFields::new(), None, Duration::ZERO));

        assert_eq!(ids(&store), vec![b, a]);
        let record = store.get(a).unwrap();
        assert_eq!(record.display_status(), "404");
        assert!(store.get(b).unwrap().is_pending());
    }

    #[test]
    fn test_second_completion_overwrites_first() {
        let store = CaptureStore::new(4);
        let id = store.initiate(request("twice"));

        store.complete_with_response(id, 200, HeaderFields::new(), None, Duration::from_millis(1));
        store.complete_with_response(id, 500, HeaderFields::new(), None, Duration::from_millis(2));

        let record = store.get(id).unwrap();
        assert_eq!(record.response().map(|r| r.status), Some(500));
        assert_eq!(record.duration(), Some(Duration::from_millis(2)));
    }

    #[test]
    fn test_error_after_response_keeps_both() {
        // Late failures are not guarded against; both terminal fields survive.
        let store = CaptureStore::new(4);
        let id = store.initiate(request("late-cancel"));

        store.complete_with_response(id, 200, HeaderFields::new(), None, Duration::from_millis(1));
        store.complete_with_error(
            id,
            RecordedError::new(FailureKind::Cancelled, "cancelled"),
            Duration::from_millis(3),
        );

        let record = store.get(id).unwrap();
        assert!(record.response().is_some());
        assert!(record.is_error());
        assert_eq!(record.display_status(), "Error");
    }

    #[test]
    fn test_snapshot_is_isolated() {
        let store = CaptureStore::new(5);
        let id = store.initiate(request("a"));
        let snapshot = store.records();

        store.complete_with_response(id, 200, HeaderFields::new(), None, Duration::ZERO);
        store.initiate(request("b"));
        store.clear();

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].is_pending());
        assert!(store.is_empty());
    }

    #[test]
    fn test_query_helpers() {
        let store = CaptureStore::new(10);
        let ok = store.initiate(request("users/1"));
        let failed = store.initiate(request("orders/7"));
        let open = store.initiate(request("users/2"));

        store.complete_with_response(ok, 200, HeaderFields::new(), None, Duration::ZERO);
        store.complete_with_error(
            failed,
            RecordedError::new(FailureKind::Connect, "connection refused"),
            Duration::ZERO,
        );

        assert_eq!(store.pending().iter().map(CaptureRecord::id).collect::<Vec<_>>(), vec![open]);
        assert_eq!(store.failures().iter().map(CaptureRecord::id).collect::<Vec<_>>(), vec![failed]);
        assert_eq!(
            store.find_by_url("users").iter().map(CaptureRecord::id).collect::<Vec<_>>(),
            vec![open, ok]
        );
    }

    #[test]
    fn test_clear_keeps_store_usable() {
        let store = CaptureStore::new(2);
        let stale = store.initiate(request("a"));
        store.clear();

        assert_eq!(store.count(), 0);
        assert!(!store.complete_with_response(stale, 200, HeaderFields::new(), None, Duration::ZERO));

        store.initiate(request("b"));
        assert_eq!(store.count(), 1);
        assert_eq!(store.stats().cleared, 1);
    }

    #[test]
    fn test_wait_until_settled_wakes_on_completion() {
        use tokio_test::{assert_pending, assert_ready, task};

        let store = CaptureStore::new(4);
        // Nothing pending resolves at once
        assert_ready!(task::spawn(store.wait_until_settled()).poll());

        let id = store.initiate(request("slow"));
        let mut settle = task::spawn(store.wait_until_settled());
        assert_pending!(settle.poll());

        store.complete_with_response(id, 200, HeaderFields::new(), None, Duration::ZERO);
        assert!(settle.is_woken());
        assert_ready!(settle.poll());
    }
}
