use parking_lot::Mutex;
use std::collections::VecDeque;
use tally_core::{accuracy_of, FeedbackRecord, FieldAccuracy, FieldKind};
use tokio::sync::{mpsc, oneshot};

use crate::persistence::FeedbackPersistence;

pub const DEFAULT_FEEDBACK_CAPACITY: usize = 1000;

enum FlushMessage {
    Snapshot(Vec<FeedbackRecord>),
    Barrier(oneshot::Sender<()>),
}

/// Bounded, append-only log of user corrections.
///
/// Holds the most recent `capacity` records; appending past capacity drops
/// the oldest. With persistence attached, every mutation queues a snapshot
/// for a background flusher and returns immediately.
pub struct FeedbackStore {
    records: Mutex<VecDeque<FeedbackRecord>>,
    capacity: usize,
    flush_tx: Option<mpsc::UnboundedSender<FlushMessage>>,
}

impl Default for FeedbackStore {
    fn default() -> Self {
        Self::new(DEFAULT_FEEDBACK_CAPACITY)
    }
}

impl FeedbackStore {
    /// In-memory store with no durable backing.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            flush_tx: None,
        }
    }

    /// Loads history from `persistence` and spawns the background flusher.
    ///
    /// A failed load is logged and the store starts empty. Must be called
    /// from within a tokio runtime.
    pub async fn with_persistence<P: FeedbackPersistence>(capacity: usize, persistence: P) -> Self {
        let mut store = Self::new(capacity);

        match persistence.load().await {
            Ok(history) => {
                tracing::info!(records = history.len(), "Loaded feedback history");
                let mut records = store.records.lock();
                records.extend(history);
                truncate_front(&mut records, store.capacity);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Feedback history unavailable, starting empty");
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_flusher(persistence, rx));
        store.flush_tx = Some(tx);
        store
    }

    /// Appends a correction stamped with the current time.
    pub fn record(
        &self,
        field_kind: FieldKind,
        original_value: impl Into<String>,
        corrected_value: Option<String>,
        was_correct: bool,
        original_confidence: f32,
    ) -> FeedbackRecord {
        let record = FeedbackRecord::new(
            field_kind,
            original_value,
            corrected_value,
            was_correct,
            original_confidence,
        );
        self.push(record.clone());
        record
    }

    pub fn push(&self, record: FeedbackRecord) {
        let mut records = self.records.lock();
        records.push_back(record);
        truncate_front(&mut records, self.capacity);
        // Queued under the lock so snapshots reach the flusher in mutation order.
        self.queue_snapshot(&records);
    }

    pub fn clear(&self) {
        let mut records = self.records.lock();
        records.clear();
        self.queue_snapshot(&records);
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// All records, oldest first.
    pub fn records(&self) -> Vec<FeedbackRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// `correct / total` for `kind`, or `None` without history.
    pub fn accuracy(&self, kind: FieldKind) -> Option<f32> {
        accuracy_of(self.records.lock().iter(), kind)
    }

    /// `correct / total` for `kind`, or 0.0 without history.
    pub fn accuracy_rate(&self, kind: FieldKind) -> f32 {
        self.accuracy(kind).unwrap_or(0.0)
    }

    /// Per-kind totals, in field order.
    pub fn summary(&self) -> Vec<FieldAccuracy> {
        let records = self.records.lock();
        FieldKind::ALL
            .into_iter()
            .map(|kind| {
                let (total, correct) = records
                    .iter()
                    .filter(|r| r.field_kind == kind)
                    .fold((0, 0), |(t, c), r| (t + 1, c + usize::from(r.was_correct)));
                FieldAccuracy { field_kind: kind, total, correct }
            })
            .collect()
    }

    /// Waits until every mutation made so far has been handed to persistence.
    /// Returns at once for in-memory stores.
    pub async fn flush(&self) {
        let Some(tx) = &self.flush_tx else {
            return;
        };
        let (done_tx, done_rx) = oneshot::channel();
        if tx.send(FlushMessage::Barrier(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    fn queue_snapshot(&self, records: &VecDeque<FeedbackRecord>) {
        if let Some(tx) = &self.flush_tx {
            let snapshot = records.iter().cloned().collect();
            if tx.send(FlushMessage::Snapshot(snapshot)).is_err() {
                tracing::warn!("Feedback flusher has stopped; change not persisted");
            }
        }
    }
}

fn truncate_front(records: &mut VecDeque<FeedbackRecord>, capacity: usize) {
    let excess = records.len().saturating_sub(capacity);
    records.drain(..excess);
}

async fn run_flusher<P: FeedbackPersistence>(
    persistence: P,
    mut rx: mpsc::UnboundedReceiver<FlushMessage>,
) {
    while let Some(first) = rx.recv().await {
        // Coalesce whatever queued up meanwhile; only the newest snapshot matters.
        let mut latest = None;
        let mut waiters = Vec::new();
        let mut next = Some(first);
        while let Some(msg) = next {
            match msg {
                FlushMessage::Snapshot(s) => latest = Some(s),
                FlushMessage::Barrier(w) => waiters.push(w),
            }
            next = rx.try_recv().ok();
        }

        if let Some(snapshot) = latest {
            let count = snapshot.len();
            match persistence.save(snapshot).await {
                Ok(()) => tracing::debug!(records = count, "Feedback history saved"),
                Err(e) => tracing::warn!(error = %e, "Failed to save feedback history"),
            }
        }
        for w in waiters {
            let _ = w.send(());
        }
    }
    tracing::debug!("Feedback flusher stopped");
}
