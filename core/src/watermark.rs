//! Watermark insertion (`4.4.3`).

use crate::context::Context;
use crate::inbox::Inbox;
use crate::item::{Edge, Watermark};
use crate::outbox::Outbox;
use crate::processor::Processor;
use std::sync::Arc;
use weir_error::ProcessorError;

/// Tracks event time for one input channel and derives a monotonic watermark from it.
/// `on_event` is called per item, `on_timeout` on a wall-clock tick with no input
/// available (`tryProcess`); both must return a value no smaller than the last one
/// they returned.
pub trait WatermarkPolicy: Send {
    fn on_event(&mut self, event_ts: i64) -> i64;
    fn on_timeout(&mut self, now: i64) -> i64;
}

/// `lastEmittedWm → nextToEmit?`: decides whether a freshly computed watermark
/// candidate is worth forwarding, throttling how often the downstream actually sees
/// one.
pub trait WatermarkEmissionPolicy: Send {
    fn next_watermark(&mut self, candidate: i64, last_emitted: i64) -> Option<i64>;
}

/// No lateness tolerance: the watermark tracks the highest timestamp observed so far.
pub struct NoLagPolicy {
    current: i64,
}

impl NoLagPolicy {
    pub fn new() -> Self {
        NoLagPolicy { current: i64::MIN }
    }
}

impl Default for NoLagPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl WatermarkPolicy for NoLagPolicy {
    fn on_event(&mut self, event_ts: i64) -> i64 {
        self.current = self.current.max(event_ts);
        self.current
    }

    fn on_timeout(&mut self, _now: i64) -> i64 {
        self.current
    }
}

/// Tolerates up to `max_lag` of out-of-orderness: the watermark trails the highest
/// observed timestamp by a fixed amount.
pub struct BoundedLagPolicy {
    max_lag: i64,
    current: i64,
}

impl BoundedLagPolicy {
    pub fn new(max_lag: i64) -> Self {
        BoundedLagPolicy {
            max_lag,
            current: i64::MIN,
        }
    }

    fn watermark(&self) -> i64 {
        self.current.saturating_sub(self.max_lag)
    }
}

impl WatermarkPolicy for BoundedLagPolicy {
    fn on_event(&mut self, event_ts: i64) -> i64 {
        self.current = self.current.max(event_ts);
        self.watermark()
    }

    fn on_timeout(&mut self, _now: i64) -> i64 {
        self.watermark()
    }
}

/// Emits every strictly-increasing candidate immediately.
pub struct EmitImmediately;

impl WatermarkEmissionPolicy for EmitImmediately {
    fn next_watermark(&mut self, candidate: i64, last_emitted: i64) -> Option<i64> {
        (candidate != i64::MIN && candidate > last_emitted).then_some(candidate)
    }
}

/// Throttles emission to at most once per `step` of advance in the candidate.
pub struct EmitByMinStep {
    step: i64,
}

impl EmitByMinStep {
    pub fn new(step: i64) -> Self {
        assert!(step > 0, "step must be positive");
        EmitByMinStep { step }
    }
}

impl WatermarkEmissionPolicy for EmitByMinStep {
    fn next_watermark(&mut self, candidate: i64, last_emitted: i64) -> Option<i64> {
        if candidate == i64::MIN {
            return None;
        }
        if last_emitted == i64::MIN || candidate - last_emitted >= self.step {
            Some(candidate)
        } else {
            None
        }
    }
}

const WATERMARK_SNAPSHOT_KEY: &[u8] = b"wm";

/// Stamps a raw item stream with watermarks, one item type flowing straight through.
/// The watermark, if any is due, is always emitted *before* the item that triggered
/// it (`4.4.3`).
pub struct WatermarkInsertion<I, Pol, Em> {
    ts_fn: Arc<dyn Fn(&I) -> i64 + Send + Sync>,
    now_fn: Arc<dyn Fn() -> i64 + Send + Sync>,
    policy: Pol,
    emission: Em,
    last_emitted: i64,
    /// `(watermark still owed, the item it preceded)`, retained across a stalled
    /// `process` call so neither half of the emission is recomputed or lost.
    pending: Option<(Option<i64>, I)>,
}

impl<I, Pol, Em> WatermarkInsertion<I, Pol, Em>
where
    I: Send + 'static,
    Pol: WatermarkPolicy,
    Em: WatermarkEmissionPolicy,
{
    pub fn new(
        ts_fn: impl Fn(&I) -> i64 + Send + Sync + 'static,
        now_fn: impl Fn() -> i64 + Send + Sync + 'static,
        policy: Pol,
        emission: Em,
    ) -> Self {
        WatermarkInsertion {
            ts_fn: Arc::new(ts_fn),
            now_fn: Arc::new(now_fn),
            policy,
            emission,
            last_emitted: i64::MIN,
            pending: None,
        }
    }

    fn drain_pending(&mut self, outbox: &mut Outbox<I>) -> Result<bool, ProcessorError>
    where
        I: Clone,
    {
        loop {
            let Some((watermark, _)) = &self.pending else {
                return Ok(true);
            };
            if let Some(wm) = *watermark {
                if !outbox.offer(0, Edge::Watermark(Watermark(wm)))? {
                    return Ok(false);
                }
                self.pending.as_mut().unwrap().0 = None;
                continue;
            }
            let (_, item) = self.pending.as_ref().unwrap();
            if outbox.offer(0, Edge::Data(item.clone()))? {
                self.pending = None;
                return Ok(true);
            }
            return Ok(false);
        }
    }
}

impl<I, Pol, Em> Processor for WatermarkInsertion<I, Pol, Em>
where
    I: Send + Clone + 'static,
    Pol: WatermarkPolicy + 'static,
    Em: WatermarkEmissionPolicy + 'static,
{
    type In = I;
    type Out = I;

    fn is_cooperative(&self) -> bool {
        true
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
                    if !outbox.offer(0, Edge::Watermark(wm))? {
                        return Ok(());
                    }
                    inbox.poll();
                }
                Edge::Data(_) => {
                    let Edge::Data(data) = inbox.poll().unwrap() else {
                        unreachable!()
                    };
                    let ts = (self.ts_fn)(&data);
                    let candidate = self.policy.on_event(ts);
                    let to_emit = self.emission.next_watermark(candidate, self.last_emitted);
                    if let Some(wm) = to_emit {
                        self.last_emitted = wm;
                    }
                    self.pending = Some((to_emit, data));
                    if !self.drain_pending(outbox)? {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    fn try_process(&mut self, outbox: &mut Outbox<Self::Out>) -> Result<bool, ProcessorError> {
        if !self.drain_pending(outbox)? {
            return Ok(false);
        }
        let now = (self.now_fn)();
        let candidate = self.policy.on_timeout(now);
        if let Some(wm) = self.emission.next_watermark(candidate, self.last_emitted) {
            if !outbox.offer(0, Edge::Watermark(Watermark(wm)))? {
                return Ok(false);
            }
            self.last_emitted = wm;
        }
        Ok(true)
    }

    fn complete_edge(
        &mut self,
        _ordinal: usize,
        outbox: &mut Outbox<Self::Out>,
    ) -> Result<bool, ProcessorError> {
        self.drain_pending(outbox)
    }

    fn save_snapshot(&mut self, outbox: &mut Outbox<Self::Out>) -> Result<bool, ProcessorError> {
        if self.last_emitted == i64::MIN {
            return Ok(true);
        }
        outbox.offer_to_snapshot(WATERMARK_SNAPSHOT_KEY.to_vec(), self.last_emitted.to_be_bytes().to_vec())
    }

    fn restore_snapshot(&mut self, entries: &mut Inbox<(Vec<u8>, Vec<u8>)>) -> Result<(), ProcessorError> {
        while let Some(edge) = entries.poll() {
            if let Edge::Data((key, value)) = edge {
                if key == WATERMARK_SNAPSHOT_KEY {
                    let bytes: [u8; 8] = value
                        .try_into()
                        .map_err(|_| ProcessorError::contract_violation("malformed watermark snapshot value"))?;
                    self.last_emitted = i64::from_be_bytes(bytes);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, JobFuture};

    fn test_context() -> Context {
        Context::new("wm", 0, 1, false, JobFuture::new())
    }

    #[test]
    fn emits_watermark_before_the_item_that_crossed_the_threshold() {
        let mut proc = WatermarkInsertion::new(|x: &i64| *x, || 0, BoundedLagPolicy::new(2), EmitImmediately);
        let mut outbox = Outbox::cooperative(1);
        proc.init(&mut outbox, test_context()).unwrap();
        let mut inbox = Inbox::new();
        inbox.push(Edge::Data(5));
        inbox.push(Edge::Data(10));

        let mut out = Vec::new();
        loop {
            proc.process(0, &mut inbox, &mut outbox).unwrap();
            let drained = outbox.drain_ordinal(0);
            if drained.is_empty() {
                break;
            }
            out.extend(drained);
        }
        assert_eq!(
            out,
            vec![
                Edge::Watermark(Watermark(3)),
                Edge::Data(5),
                Edge::Watermark(Watermark(8)),
                Edge::Data(10),
            ]
        );
    }

    #[test]
    fn watermark_strictly_increases_and_never_regresses() {
        let mut proc = WatermarkInsertion::new(|x: &i64| *x, || 0, NoLagPolicy::new(), EmitImmediately);
        let mut outbox = Outbox::cooperative(1);
        proc.init(&mut outbox, test_context()).unwrap();
        let mut inbox = Inbox::new();
        inbox.push(Edge::Data(5));
        inbox.push(Edge::Data(3)); // out of order, must not regress the watermark
        inbox.push(Edge::Data(9));

        let mut out = Vec::new();
        loop {
            proc.process(0, &mut inbox, &mut outbox).unwrap();
            let drained = outbox.drain_ordinal(0);
            if drained.is_empty() {
                break;
            }
            out.extend(drained);
        }
        let watermarks: Vec<i64> = out
            .iter()
            .filter_map(|e| match e {
                Edge::Watermark(w) => Some(w.timestamp()),
                Edge::Data(_) => None,
            })
            .collect();
        assert_eq!(watermarks, vec![5, 9]);
    }

    #[test]
    fn snapshot_round_trips_last_emitted_watermark() {
        let mut proc = WatermarkInsertion::new(|x: &i64| *x, || 0, NoLagPolicy::new(), EmitImmediately);
        let mut outbox = Outbox::cooperative(1);
        proc.init(&mut outbox, test_context()).unwrap();
        let mut inbox = Inbox::new();
        inbox.push(Edge::Data(7));
        proc.process(0, &mut inbox, &mut outbox).unwrap();
        outbox.drain_ordinal(0);

        assert_eq!(proc.save_snapshot(&mut outbox).unwrap(), true);
        let records = outbox.drain_snapshot();

        let mut restored = WatermarkInsertion::new(|x: &i64| *x, || 0, NoLagPolicy::new(), EmitImmediately);
        let mut restore_inbox = Inbox::new();
        for (k, v) in records {
            restore_inbox.push(Edge::Data((k, v)));
        }
        restored.restore_snapshot(&mut restore_inbox).unwrap();
        assert_eq!(restored.finish_snapshot_restore().unwrap(), true);
        assert_eq!(restored.last_emitted, 7);
    }
}
