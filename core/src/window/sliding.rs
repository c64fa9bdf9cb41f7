//! Frame-aligned sliding window aggregation (`4.4.1`).

use super::definition::WindowDefinition;
use crate::aggregate::AggregateOperation;
use crate::context::Context;
use crate::inbox::Inbox;
use crate::item::{Edge, TimestampedEntry, Watermark};
use crate::outbox::Outbox;
use crate::processor::Processor;
use crate::snapshot;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ops::Bound::{Excluded, Included};
use std::sync::Arc;
use weir_error::ProcessorError;

/// Snapshot key schema for this operator (`4.5`, "Windowing: key = (partitionKey,
/// frameEndTs)"), with one extra variant to persist `next_we` alongside the frames.
#[derive(Serialize, Deserialize)]
enum SlidingKey<K> {
    Frame(K, i64),
    NextWe(K),
}

struct KeyState<A> {
    frames: BTreeMap<i64, A>,
    /// Smallest window-end not yet emitted for this key; `None` until its first frame.
    next_we: Option<i64>,
}

impl<A> Default for KeyState<A> {
    fn default() -> Self {
        KeyState {
            frames: BTreeMap::new(),
            next_we: None,
        }
    }
}

/// How an incoming item's frame-end timestamp is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTs {
    /// `fe = window.higher_frame_ts(ts(item))` — a raw event, placed into the next
    /// frame boundary after it.
    Event,
    /// `fe = ts(item)` directly — `item` is already a partial, per-frame accumulator
    /// (stage-2 of a split aggregation consuming stage-1's output).
    AlreadyFramed,
}

/// Sliding (or, when `window_size == frame_size`, tumbling) window aggregation over a
/// single keyed input. One input ordinal (0), one output ordinal (0) carrying
/// `TimestampedEntry<K, R>` plus forwarded watermarks.
pub struct SlidingWindow<K, I, A, R> {
    window: WindowDefinition,
    key_fn: Arc<dyn Fn(&I) -> K + Send + Sync>,
    ts_fn: Arc<dyn Fn(&I) -> i64 + Send + Sync>,
    frame_ts: FrameTs,
    op: AggregateOperation<A, I, R>,
    keys: BTreeMap<K, KeyState<A>>,
    pending: VecDeque<TimestampedEntry<K, R>>,
    pending_watermark: Option<Watermark>,
    snapshot_cursor: Option<VecDeque<(Vec<u8>, Vec<u8>)>>,
}

impl<K, I, A, R> SlidingWindow<K, I, A, R>
where
    K: Ord + Clone + Send + 'static,
    I: Send + 'static,
    A: Send + 'static,
    R: Send + 'static,
{
    pub fn new(
        window: WindowDefinition,
        frame_ts: FrameTs,
        key_fn: impl Fn(&I) -> K + Send + Sync + 'static,
        ts_fn: impl Fn(&I) -> i64 + Send + Sync + 'static,
        op: AggregateOperation<A, I, R>,
    ) -> Self {
        SlidingWindow {
            window,
            key_fn: Arc::new(key_fn),
            ts_fn: Arc::new(ts_fn),
            frame_ts,
            op,
            keys: BTreeMap::new(),
            pending: VecDeque::new(),
            pending_watermark: None,
            snapshot_cursor: None,
        }
    }

    fn accumulate(&mut self, item: I) {
        let key = (self.key_fn)(&item);
        let ts = (self.ts_fn)(&item);
        let fe = match self.frame_ts {
            FrameTs::Event => self.window.higher_frame_ts(ts),
            FrameTs::AlreadyFramed => ts,
        };
        let state = self.keys.entry(key).or_default();
        if state.next_we.is_none() {
            state.next_we = Some(fe);
        }
        let acc = state.frames.entry(fe).or_insert_with(|| self.op.create());
        self.op.accumulate(acc, &item);
    }

    fn fold_window(frames: &BTreeMap<i64, A>, we: i64, window_size: i64, op: &AggregateOperation<A, I, R>) -> A {
        let mut acc = op.create();
        for (_fe, frame_acc) in frames.range((Excluded(we - window_size), Included(we))) {
            acc = op.combine(&acc, frame_acc);
        }
        acc
    }

    /// Window-ends in `[lo, hi]` that some retained frame actually covers, i.e. `we`
    /// with `fe` in `(we - window_size, we]` for some `fe` in `frames`. Bounded by
    /// `frames.len() * (window_size / frame_size)`, never by `hi - lo`, so a sparse
    /// `frames` and a huge `hi` (an end-of-input flush, say) never walks empty grid
    /// points one at a time.
    fn covered_window_ends(frames: &BTreeMap<i64, A>, frame_size: i64, window_size: i64, lo: i64, hi: i64) -> BTreeSet<i64> {
        let mut candidates = BTreeSet::new();
        for &fe in frames.keys() {
            let mut we = fe;
            while we < fe + window_size {
                if we >= lo && we <= hi {
                    candidates.insert(we);
                }
                we += frame_size;
            }
        }
        candidates
    }

    /// Enumerates every due window across every key as of `wm`, in the order the
    /// spec mandates (ascending `we`, stable key order within a `we`), and queues
    /// them for emission. A window-end is only emitted when it actually covers a
    /// retained frame; empty grid points in between are skipped rather than walked.
    /// Frames fully outside retention after `wm` are dropped.
    fn schedule_through(&mut self, wm: i64) {
        let window_size = self.window.window_size;
        let frame_size = self.window.frame_size;
        let mut due: Vec<TimestampedEntry<K, R>> = Vec::new();

        for (key, state) in self.keys.iter_mut() {
            let Some(next_we) = state.next_we else { continue };
            if wm >= next_we {
                if !state.frames.is_empty() {
                    for we in Self::covered_window_ends(&state.frames, frame_size, window_size, next_we, wm) {
                        let acc = Self::fold_window(&state.frames, we, window_size, &self.op);
                        due.push(TimestampedEntry::new(we, key.clone(), self.op.finish(&acc)));
                    }
                }
                state.next_we = Some(self.window.higher_frame_ts(wm));
            }
            let retain_after = wm - window_size;
            state.frames.retain(|fe, _| *fe > retain_after);
        }

        due.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        self.pending.extend(due);
    }

    /// The largest window-end that can still cover a retained frame, across every
    /// key; `None` if no key retains any frame. Used by `complete_edge`'s
    /// end-of-input flush so it targets the data actually on hand instead of a huge
    /// sentinel timestamp.
    fn last_coverable_we(&self) -> Option<i64> {
        self.keys
            .values()
            .filter_map(|state| state.frames.keys().next_back())
            .max()
            .map(|&last_fe| last_fe + self.window.window_size - self.window.frame_size)
    }

    /// Drains `self.pending`, then (if set) forwards `self.pending_watermark`.
    /// Returns `true` once both are fully flushed.
    fn drain_pending(&mut self, outbox: &mut Outbox<TimestampedEntry<K, R>>) -> Result<bool, ProcessorError>
    where
        TimestampedEntry<K, R>: Clone,
    {
        while let Some(entry) = self.pending.front() {
            if outbox.offer(0, Edge::Data(entry.clone()))? {
                self.pending.pop_front();
            } else {
                return Ok(false);
            }
        }
        if let Some(wm) = self.pending_watermark {
            if !outbox.offer(0, Edge::Watermark(wm))? {
                return Ok(false);
            }
            self.pending_watermark = None;
        }
        Ok(true)
    }
}

impl<K, I, A, R> Processor for SlidingWindow<K, I, A, R>
where
    K: Ord + Clone + Send + Serialize + DeserializeOwned + 'static,
    I: Send + 'static,
    A: Send + Serialize + DeserializeOwned + 'static,
    R: Send + Clone + 'static,
{
    type In = I;
    type Out = TimestampedEntry<K, R>;

    fn is_cooperative(&self) -> bool {
        true
    }

    fn init(&mut self, _outbox: &mut Outbox<Self::Out>, _context: Context) -> Result<(), ProcessorError> {
        Ok(())
    }

    fn process(
        &mut self,
        _ordinal: usize,
        inbox: &mut Inbox<Self::In>,
        outbox: &mut Outbox<Self::Out>,
    ) -> Result<(), ProcessorError> {
        if !self.drain_pending(outbox)? {
            return Ok(());
        }
        while let Some(item) = inbox.peek() {
            match item {
                Edge::Watermark(wm) => {
                    let wm = *wm;
                    self.schedule_through(wm.timestamp());
                    self.pending_watermark = Some(wm);
                    inbox.poll();
                    if !self.drain_pending(outbox)? {
                        return Ok(());
                    }
                }
                Edge::Data(_) => {
                    let Edge::Data(data) = inbox.poll().unwrap() else {
                        unreachable!()
                    };
                    self.accumulate(data);
                }
            }
        }
        Ok(())
    }

    fn complete_edge(
        &mut self,
        _ordinal: usize,
        outbox: &mut Outbox<Self::Out>,
    ) -> Result<bool, ProcessorError> {
        if self.pending.is_empty() && self.pending_watermark.is_none() {
            // Flush every retained frame as if a final watermark arrived right after the
            // last one that still covers data, so a finite (batch) input doesn't lose
            // its last, still-open windows. Bounded by the data itself, not a sentinel
            // timestamp, so this never walks an astronomical grid.
            if let Some(flush_to) = self.last_coverable_we() {
                self.schedule_through(flush_to);
            }
        }
        self.drain_pending(outbox)
    }

    fn save_snapshot(&mut self, outbox: &mut Outbox<Self::Out>) -> Result<bool, ProcessorError> {
        if self.snapshot_cursor.is_none() {
            let mut queue = VecDeque::new();
            for (key, state) in &self.keys {
                if let Some(next_we) = state.next_we {
                    queue.push_back((
                        snapshot::encode(&SlidingKey::NextWe(key.clone()))?,
                        snapshot::encode(&next_we)?,
                    ));
                }
                for (fe, acc) in &state.frames {
                    queue.push_back((
                        snapshot::encode(&SlidingKey::Frame(key.clone(), *fe))?,
                        snapshot::encode(acc)?,
                    ));
                }
            }
            self.snapshot_cursor = Some(queue);
        }
        let queue = self.snapshot_cursor.as_mut().unwrap();
        while let Some((key, value)) = queue.front() {
            if outbox.offer_to_snapshot(key.clone(), value.clone())? {
                queue.pop_front();
            } else {
                return Ok(false);
            }
        }
        self.snapshot_cursor = None;
        Ok(true)
    }

    fn restore_snapshot(&mut self, entries: &mut Inbox<(Vec<u8>, Vec<u8>)>) -> Result<(), ProcessorError> {
        while let Some(edge) = entries.poll() {
            let Edge::Data((key_bytes, value_bytes)) = edge else {
                continue;
            };
            match snapshot::decode::<SlidingKey<K>>(&key_bytes)? {
                SlidingKey::NextWe(key) => {
                    let next_we: i64 = snapshot::decode(&value_bytes)?;
                    self.keys.entry(key).or_default().next_we = Some(next_we);
                }
                SlidingKey::Frame(key, fe) => {
                    let acc: A = snapshot::decode(&value_bytes)?;
                    self.keys.entry(key).or_default().frames.insert(fe, acc);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::summing_i64;
    use crate::context::JobFuture;

    fn test_context() -> Context {
        Context::new("w", 0, 1, false, JobFuture::new())
    }

    fn run(
        op: &mut SlidingWindow<i32, (i64, i64), i64, i64>,
        items: Vec<Edge<(i64, i64)>>,
    ) -> Vec<Edge<TimestampedEntry<i32, i64>>> {
        let mut outbox = Outbox::cooperative(1);
        op.init(&mut outbox, test_context()).unwrap();
        let mut inbox = Inbox::new();
        for item in items {
            inbox.push(item);
        }
        let mut out = Vec::new();
        loop {
            op.process(0, &mut inbox, &mut outbox).unwrap();
            let drained = outbox.drain_ordinal(0);
            if drained.is_empty() && inbox.is_empty() {
                break;
            }
            out.extend(drained);
            if inbox.is_empty() {
                break;
            }
        }
        out
    }

    fn const_key(_: &(i64, i64)) -> i32 {
        0
    }
    fn ts_of(item: &(i64, i64)) -> i64 {
        item.0
    }

    #[test]
    fn scenario_s3_tumbling_sum() {
        let window = WindowDefinition::tumbling(10);
        let op = summing_i64::<(i64, i64)>(|item| item.1);
        let mut proc = SlidingWindow::new(window, FrameTs::Event, const_key, ts_of, op);
        let out = run(
            &mut proc,
            vec![
                Edge::Data((5, 1)),
                Edge::Data((7, 2)),
                Edge::Data((12, 3)),
                Edge::Data((18, 4)),
                Edge::Watermark(Watermark(100)),
            ],
        );
        assert_eq!(
            out,
            vec![
                Edge::Data(TimestampedEntry::new(10, 0, 3)),
                Edge::Data(TimestampedEntry::new(20, 0, 7)),
                Edge::Watermark(Watermark(100)),
            ]
        );
    }

    #[test]
    fn scenario_s4_sliding_sum() {
        let window = WindowDefinition::new(5, 10);
        let op = summing_i64::<(i64, i64)>(|item| item.1);
        let mut proc = SlidingWindow::new(window, FrameTs::Event, const_key, ts_of, op);
        let out = run(
            &mut proc,
            vec![
                Edge::Data((3, 1)),
                Edge::Data((7, 1)),
                Edge::Data((12, 1)),
                Edge::Watermark(Watermark(20)),
            ],
        );
        assert_eq!(
            out,
            vec![
                Edge::Data(TimestampedEntry::new(5, 0, 1)),
                Edge::Data(TimestampedEntry::new(10, 0, 2)),
                Edge::Data(TimestampedEntry::new(15, 0, 2)),
                Edge::Data(TimestampedEntry::new(20, 0, 1)),
                Edge::Watermark(Watermark(20)),
            ]
        );
    }

    #[test]
    fn scenario_s6_snapshot_round_trip_matches_s4() {
        let window = WindowDefinition::new(5, 10);
        let op = summing_i64::<(i64, i64)>(|item| item.1);
        let mut original = SlidingWindow::new(window, FrameTs::Event, const_key, ts_of, op.clone());
        let mut outbox = Outbox::cooperative(1);
        original.init(&mut outbox, test_context()).unwrap();
        let mut inbox = Inbox::new();
        inbox.push(Edge::Data((3, 1)));
        inbox.push(Edge::Data((7, 1)));
        inbox.push(Edge::Data((12, 1)));
        original.process(0, &mut inbox, &mut outbox).unwrap();
        assert!(inbox.is_empty());

        assert_eq!(original.save_snapshot(&mut outbox).unwrap(), true);
        let records = outbox.drain_snapshot();

        let mut restored = SlidingWindow::new(window, FrameTs::Event, const_key, ts_of, op);
        let mut restore_inbox = Inbox::new();
        for (k, v) in records {
            restore_inbox.push(Edge::Data((k, v)));
        }
        restored.restore_snapshot(&mut restore_inbox).unwrap();
        assert_eq!(restored.finish_snapshot_restore().unwrap(), true);

        let mut resumed_outbox = Outbox::cooperative(1);
        restored.init(&mut resumed_outbox, test_context()).unwrap();
        let mut resumed_inbox = Inbox::new();
        resumed_inbox.push(Edge::Watermark(Watermark(20)));

        let mut out = Vec::new();
        loop {
            restored.process(0, &mut resumed_inbox, &mut resumed_outbox).unwrap();
            let drained = resumed_outbox.drain_ordinal(0);
            if drained.is_empty() {
                break;
            }
            out.extend(drained);
        }
        assert_eq!(
            out,
            vec![
                Edge::Data(TimestampedEntry::new(5, 0, 1)),
                Edge::Data(TimestampedEntry::new(10, 0, 2)),
                Edge::Data(TimestampedEntry::new(15, 0, 2)),
                Edge::Data(TimestampedEntry::new(20, 0, 1)),
                Edge::Watermark(Watermark(20)),
            ]
        );
    }

    /// Testable property 7 (`8 Testable Properties`): for an associative-commutative
    /// `AggregateOperation`, a single-stage `aggregate(op)` must equal a stage-1
    /// accumulate (`with_finish_fn` identity, emitting raw partials per frame) piped
    /// into a stage-2 combine (`with_combining_accumulate_fn`, `FrameTs::AlreadyFramed`)
    /// on the same partitioning, for the sliding-window case scenario S4 exercises.
    #[test]
    fn two_stage_split_matches_single_stage_scenario_s4() {
        // Stage 1 emits one raw partial per frame: a tumbling window at the frame
        // granularity, not the full sliding window that the single-stage operator uses.
        let stage1_window = WindowDefinition::tumbling(5);
        // Stage 2 re-folds those partials over the actual sliding window from S4.
        let stage2_window = WindowDefinition::new(5, 10);
        let base_op = summing_i64::<(i64, i64)>(|item| item.1);

        let stage1_op = base_op.clone().with_finish_fn(|acc: &i64| *acc);
        let mut stage1 = SlidingWindow::new(stage1_window, FrameTs::Event, const_key, ts_of, stage1_op);
        let stage1_out = run(
            &mut stage1,
            vec![
                Edge::Data((3, 1)),
                Edge::Data((7, 1)),
                Edge::Data((12, 1)),
                Edge::Watermark(Watermark(20)),
            ],
        );

        let stage2_op = base_op.with_combining_accumulate_fn::<i32>();
        let mut stage2: SlidingWindow<i32, TimestampedEntry<i32, i64>, i64, i64> = SlidingWindow::new(
            stage2_window,
            FrameTs::AlreadyFramed,
            |te: &TimestampedEntry<i32, i64>| te.key,
            |te: &TimestampedEntry<i32, i64>| te.timestamp,
            stage2_op,
        );
        let mut outbox = Outbox::cooperative(1);
        stage2.init(&mut outbox, test_context()).unwrap();
        let mut inbox = Inbox::new();
        for item in stage1_out {
            inbox.push(item);
        }
        let mut stage2_out = Vec::new();
        loop {
            stage2.process(0, &mut inbox, &mut outbox).unwrap();
            let drained = outbox.drain_ordinal(0);
            if drained.is_empty() && inbox.is_empty() {
                break;
            }
            stage2_out.extend(drained);
            if inbox.is_empty() {
                break;
            }
        }

        assert_eq!(
            stage2_out,
            vec![
                Edge::Data(TimestampedEntry::new(5, 0, 1)),
                Edge::Data(TimestampedEntry::new(10, 0, 2)),
                Edge::Data(TimestampedEntry::new(15, 0, 2)),
                Edge::Data(TimestampedEntry::new(20, 0, 1)),
                Edge::Watermark(Watermark(20)),
            ],
            "two-stage split must agree with scenario_s4_sliding_sum's single-stage result"
        );
    }

    /// Testable property 3 (`8 Testable Properties`): after forwarding watermark `wm`,
    /// no retained frame has `frameEndTs <= wm - windowSize`.
    #[test]
    fn retained_frames_respect_the_retention_bound_after_a_watermark() {
        let window = WindowDefinition::new(5, 10);
        let op = summing_i64::<(i64, i64)>(|item| item.1);
        let mut proc = SlidingWindow::new(window, FrameTs::Event, const_key, ts_of, op);
        run(
            &mut proc,
            vec![
                Edge::Data((3, 1)),
                Edge::Data((7, 1)),
                Edge::Data((12, 1)),
                Edge::Data((17, 1)),
                Edge::Watermark(Watermark(20)),
            ],
        );
        let retain_after = 20 - window.window_size;
        for state in proc.keys.values() {
            for fe in state.frames.keys() {
                assert!(*fe > retain_after, "frame {fe} should have been dropped by wm=20");
            }
        }
    }

    #[test]
    fn backpressure_pauses_and_resumes_mid_emission_batch() {
        let window = WindowDefinition::tumbling(10);
        let op = summing_i64::<(i64, i64)>(|item| item.1);
        let mut proc = SlidingWindow::new(window, FrameTs::Event, const_key, ts_of, op);
        let mut outbox = Outbox::cooperative(1);
        proc.init(&mut outbox, test_context()).unwrap();
        let mut inbox = Inbox::new();
        inbox.push(Edge::Data((5, 1)));
        inbox.push(Edge::Data((15, 1)));
        inbox.push(Edge::Watermark(Watermark(100)));

        proc.process(0, &mut inbox, &mut outbox).unwrap();
        assert_eq!(outbox.drain_ordinal(0), vec![Edge::Data(TimestampedEntry::new(10, 0, 1))]);
        // the watermark is polled and folded into pending_watermark eagerly, before
        // drain_pending is even attempted, so the inbox is already empty here even
        // though the watermark itself hasn't reached the outbox yet.
        assert!(inbox.is_empty());

        proc.process(0, &mut inbox, &mut outbox).unwrap();
        assert_eq!(outbox.drain_ordinal(0), vec![Edge::Data(TimestampedEntry::new(20, 0, 1))]);

        proc.process(0, &mut inbox, &mut outbox).unwrap();
        assert_eq!(outbox.drain_ordinal(0), vec![Edge::Watermark(Watermark(100))]);
        assert!(inbox.is_empty());
    }
}
