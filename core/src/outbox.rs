//! The per-ordinal outbox plus its snapshot bucket (`4.1 Inbox / Outbox`).
//!
//! Every data ordinal has its own bounded bucket; for cooperative operators every
//! bucket has capacity 1, for non-cooperative operators capacity is effectively
//! unbounded (`3 Data Model`). The snapshot bucket shares the same capacity as a data
//! bucket on the same operator.

use crate::item::{Edge, Watermark};
use std::collections::{HashSet, VecDeque};
use weir_error::ProcessorError;

/// Capacity-1 buckets are what a cooperative operator is driven with; non-cooperative
/// operators get buckets that never refuse an offer.
pub const COOPERATIVE_BUCKET_CAPACITY: usize = 1;

struct Bucket<T> {
    queue: VecDeque<T>,
    capacity: usize,
}

impl<T> Bucket<T> {
    fn new(capacity: usize) -> Self {
        Bucket {
            queue: VecDeque::new(),
            capacity,
        }
    }

    fn try_push(&mut self, item: T) -> bool {
        if self.queue.len() >= self.capacity {
            return false;
        }
        self.queue.push_back(item);
        true
    }

    fn drain(&mut self) -> Vec<T> {
        self.queue.drain(..).collect()
    }
}

/// The conduit an operator emits data items, watermarks and snapshot `(key, value)`
/// pairs into. Owned for the operator's lifetime; the engine (or, in tests, the
/// harness) drains buckets to move items to the next stage.
pub struct Outbox<T> {
    buckets: Vec<Bucket<Edge<T>>>,
    snapshot: Bucket<(Vec<u8>, Vec<u8>)>,
    snapshot_keys_this_capture: HashSet<Vec<u8>>,
    last_watermark: Vec<Option<Watermark>>,
    pending_broadcast: Option<(T, HashSet<usize>)>,
}

impl<T: Clone> Outbox<T> {
    fn new(ordinal_count: usize, capacity: usize) -> Self {
        Outbox {
            buckets: (0..ordinal_count).map(|_| Bucket::new(capacity)).collect(),
            snapshot: Bucket::new(capacity),
            snapshot_keys_this_capture: HashSet::new(),
            last_watermark: vec![None; ordinal_count],
            pending_broadcast: None,
        }
    }

    /// Buckets of capacity 1, matching a cooperative operator's soft-budget contract
    /// (`5 Concurrency & Resource Model`).
    pub fn cooperative(ordinal_count: usize) -> Self {
        Self::new(ordinal_count, COOPERATIVE_BUCKET_CAPACITY)
    }

    /// Buckets that never refuse an offer, matching a non-cooperative operator's
    /// dedicated blocking-thread transport.
    pub fn non_cooperative(ordinal_count: usize) -> Self {
        Self::new(ordinal_count, usize::MAX)
    }

    pub fn ordinal_count(&self) -> usize {
        self.buckets.len()
    }

    /// Offers a data item on one output ordinal. `Ok(true)` on acceptance, `Ok(false)`
    /// if the bucket is full — the operator must suspend and retry on the next
    /// callback, never spin. `Err` signals a contract violation such as a
    /// non-monotonic watermark.
    pub fn offer(&mut self, ordinal: usize, item: Edge<T>) -> Result<bool, ProcessorError> {
        if let Edge::Watermark(wm) = &item {
            self.check_watermark_monotonic(ordinal, *wm)?;
        }
        let accepted = self.buckets[ordinal].try_push(item.clone());
        if accepted {
            if let Edge::Watermark(wm) = item {
                self.last_watermark[ordinal] = Some(wm);
            }
        }
        Ok(accepted)
    }

    fn check_watermark_monotonic(
        &self,
        ordinal: usize,
        wm: Watermark,
    ) -> Result<(), ProcessorError> {
        if let Some(last) = self.last_watermark[ordinal] {
            if wm < last {
                return Err(ProcessorError::contract_violation(format!(
                    "watermark regressed on ordinal {ordinal}: {} then {}",
                    last.timestamp(),
                    wm.timestamp()
                )));
            }
        }
        Ok(())
    }

    /// Offers `item` to every data ordinal. Ordinals that already accepted the item on
    /// a previous (failed) call are not offered it again, so a retry after partial
    /// success completes the broadcast without duplicating output.
    pub fn offer_broadcast(&mut self, item: T) -> Result<bool, ProcessorError>
    where
        T: PartialEq,
    {
        let pending = self.pending_broadcast.take();
        let targets: HashSet<usize> = match pending {
            Some((pending_item, targets)) => {
                debug_assert!(
                    pending_item == item,
                    "offer_broadcast retried with a different item than the pending one"
                );
                targets
            }
            None => (0..self.buckets.len()).collect(),
        };

        let mut still_pending = HashSet::new();
        for ordinal in targets {
            if !self.buckets[ordinal].try_push(Edge::Data(item.clone())) {
                still_pending.insert(ordinal);
            }
        }

        if still_pending.is_empty() {
            Ok(true)
        } else {
            self.pending_broadcast = Some((item, still_pending));
            Ok(false)
        }
    }

    /// Offers one `(key, value)` snapshot record. Keys must be unique within a single
    /// `saveSnapshot` capture (`4.5 Snapshot / Restore`) — call `reset_snapshot_keys`
    /// when a new capture begins. A key is only recorded as seen once its record is
    /// actually accepted into the bucket, so retrying the same `(key, value)` after a
    /// backpressure refusal is not itself a duplicate.
    pub fn offer_to_snapshot(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<bool, ProcessorError> {
        if self.snapshot_keys_this_capture.contains(&key) {
            return Err(ProcessorError::contract_violation(format!(
                "duplicate snapshot key {key:?} emitted within one saveSnapshot capture"
            )));
        }
        let accepted = self.snapshot.try_push((key.clone(), value));
        if accepted {
            self.snapshot_keys_this_capture.insert(key);
        }
        Ok(accepted)
    }

    /// Call once before a fresh `saveSnapshot` sequence begins, so keys from a previous
    /// capture don't falsely collide with this one.
    pub fn reset_snapshot_keys(&mut self) {
        self.snapshot_keys_this_capture.clear();
    }

    /// Drains everything queued on one data ordinal, in emission order. Used by the
    /// transport (or, in tests, the harness) to hand items to the downstream stage and
    /// free bucket capacity.
    pub fn drain_ordinal(&mut self, ordinal: usize) -> Vec<Edge<T>> {
        self.buckets[ordinal].drain()
    }

    pub fn drain_snapshot(&mut self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.snapshot.drain()
    }

    /// How many items are currently queued on one data ordinal, without draining it.
    /// Used by the harness to check the progress rule (`8`, invariant 1) around a
    /// callback it doesn't otherwise inspect the internals of.
    pub fn ordinal_len(&self, ordinal: usize) -> usize {
        self.buckets[ordinal].queue.len()
    }

    pub fn snapshot_len(&self) -> usize {
        self.snapshot.queue.len()
    }
}
