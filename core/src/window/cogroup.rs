//! Co-group: multi-ordinal keyed aggregation, batch emission on EOF (`4.4.5`).
//!
//! Each ordinal gets its own key extractor and accumulate function, but the
//! processor owns one `In` type shared by every ordinal ("`9 Design Notes`,
//! Polymorphic processors": an enum of per-ordinal item shapes stands in for the
//! ordinal-typed associated types a base-class hierarchy would otherwise need). The
//! two operand closures are written by the caller against whatever variant the
//! wiring guarantees arrives on that ordinal.

use crate::context::Context;
use crate::inbox::Inbox;
use crate::item::Edge;
use crate::outbox::Outbox;
use crate::processor::Processor;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use weir_error::ProcessorError;

/// A stand-in `In` enum for the common two-input co-group, so callers don't have to
/// hand-roll one. Larger arities define their own enum the same way.
#[derive(Debug, Clone)]
pub enum Either2<A, B> {
    First(A),
    Second(B),
}

struct Operand<In, K, A> {
    key_fn: Arc<dyn Fn(&In) -> K + Send + Sync>,
    accumulate_fn: Arc<dyn Fn(&mut A, &In) + Send + Sync>,
}

/// One accumulator per observed key, fed from `operands.len()` input ordinals.
/// Emission happens once, in `complete`, after every input has reached EOF — this
/// operator has no windowing notion of its own and is inherently batch-mode.
pub struct CoGroup<In, K, A, R> {
    operands: Vec<Operand<In, K, A>>,
    create: Arc<dyn Fn() -> A + Send + Sync>,
    finish: Arc<dyn Fn(&A) -> R + Send + Sync>,
    state: BTreeMap<K, A>,
    pending: VecDeque<(K, R)>,
    scheduled: bool,
}

impl<In, K, A, R> CoGroup<In, K, A, R>
where
    In: Send + 'static,
    K: Ord + Clone + Send + 'static,
    A: Send + 'static,
    R: Send + 'static,
{
    pub fn new(
        create: impl Fn() -> A + Send + Sync + 'static,
        finish: impl Fn(&A) -> R + Send + Sync + 'static,
    ) -> Self {
        CoGroup {
            operands: Vec::new(),
            create: Arc::new(create),
            finish: Arc::new(finish),
            state: BTreeMap::new(),
            pending: VecDeque::new(),
            scheduled: false,
        }
    }

    /// Registers ordinal `operands.len()` (ordinals are assigned in call order,
    /// starting at 0) with its key extractor and accumulate function.
    pub fn with_operand(
        mut self,
        key_fn: impl Fn(&In) -> K + Send + Sync + 'static,
        accumulate_fn: impl Fn(&mut A, &In) + Send + Sync + 'static,
    ) -> Self {
        self.operands.push(Operand {
            key_fn: Arc::new(key_fn),
            accumulate_fn: Arc::new(accumulate_fn),
        });
        self
    }

    fn accumulate(&mut self, ordinal: usize, item: In) {
        let operand = &self.operands[ordinal];
        let key = (operand.key_fn)(&item);
        let acc = self.state.entry(key).or_insert_with(|| (self.create)());
        (operand.accumulate_fn)(acc, &item);
    }

    fn drain_pending(&mut self, outbox: &mut Outbox<(K, R)>) -> Result<bool, ProcessorError>
    where
        K: Clone,
        R: Clone,
    {
        while let Some(entry) = self.pending.front() {
            if outbox.offer(0, Edge::Data(entry.clone()))? {
                self.pending.pop_front();
            } else {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl<In, K, A, R> Processor for CoGroup<In, K, A, R>
where
    In: Send + 'static,
    K: Ord + Clone + Send + 'static,
    A: Send + 'static,
    R: Send + Clone + 'static,
{
    type In = In;
    type Out = (K, R);

    fn is_cooperative(&self) -> bool {
        true
    }

    fn process(
        &mut self,
        ordinal: usize,
        inbox: &mut Inbox<Self::In>,
        _outbox: &mut Outbox<Self::Out>,
    ) -> Result<(), ProcessorError> {
        // Watermarks carry no meaning for a batch-mode co-group; drop them.
        while let Some(item) = inbox.poll() {
            if let Edge::Data(data) = item {
                self.accumulate(ordinal, data);
            }
        }
        Ok(())
    }

    fn complete(&mut self, outbox: &mut Outbox<Self::Out>) -> Result<bool, ProcessorError> {
        if !self.scheduled {
            let finish = &self.finish;
            self.pending
                .extend(std::mem::take(&mut self.state).into_iter().map(|(k, a)| (k, finish(&a))));
            self.scheduled = true;
        }
        self.drain_pending(outbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, JobFuture};

    fn test_context() -> Context {
        Context::new("cg", 0, 1, false, JobFuture::new())
    }

    #[test]
    fn joins_two_ordinals_on_a_shared_key() {
        let mut cg: CoGroup<Either2<(String, i64), (String, i64)>, String, (i64, i64), (i64, i64)> =
            CoGroup::new(|| (0i64, 0i64), |acc: &(i64, i64)| *acc)
                .with_operand(
                    |item| match item {
                        Either2::First((k, _)) => k.clone(),
                        Either2::Second(_) => unreachable!(),
                    },
                    |acc, item| {
                        if let Either2::First((_, v)) = item {
                            acc.0 += v;
                        }
                    },
                )
                .with_operand(
                    |item| match item {
                        Either2::Second((k, _)) => k.clone(),
                        Either2::First(_) => unreachable!(),
                    },
                    |acc, item| {
                        if let Either2::Second((_, v)) = item {
                            acc.1 += v;
                        }
                    },
                );
        let mut outbox = Outbox::cooperative(1);
        cg.init(&mut outbox, test_context()).unwrap();

        let mut left = Inbox::new();
        left.push(Edge::Data(Either2::First(("a".to_string(), 3))));
        left.push(Edge::Data(Either2::First(("b".to_string(), 1))));
        cg.process(0, &mut left, &mut outbox).unwrap();

        let mut right = Inbox::new();
        right.push(Edge::Data(Either2::Second(("a".to_string(), 5))));
        cg.process(1, &mut right, &mut outbox).unwrap();

        assert_eq!(cg.complete_edge(0, &mut outbox).unwrap(), true);
        assert_eq!(cg.complete_edge(1, &mut outbox).unwrap(), true);
        assert_eq!(cg.complete(&mut outbox).unwrap(), true);

        let mut out = outbox.drain_ordinal(0);
        out.sort_by(|a, b| {
            let (Edge::Data(a), Edge::Data(b)) = (a, b) else { unreachable!() };
            a.0.cmp(&b.0)
        });
        assert_eq!(
            out,
            vec![
                Edge::Data(("a".to_string(), (3, 5))),
                Edge::Data(("b".to_string(), (1, 0))),
            ]
        );
    }
}
