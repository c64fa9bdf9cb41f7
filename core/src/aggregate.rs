//! `AggregateOperation` (`3 Data Model`, `6 External Interfaces`).
//!
//! `combine` must be associative and commutative: windowing operators fold whichever
//! subset of retained frames a window spans using it, in whatever order they happen
//! to be stored. `deduct`, when supplied, is `combine`'s inverse and lets a sliding
//! window maintain one running accumulator incrementally instead of re-folding every
//! window from scratch (`4.4.1`).

use crate::item::TimestampedEntry;
use std::sync::Arc;

type CreateFn<A> = Arc<dyn Fn() -> A + Send + Sync>;
type AccumulateFn<A, I> = Arc<dyn Fn(&mut A, &I) + Send + Sync>;
type CombineFn<A> = Arc<dyn Fn(&A, &A) -> A + Send + Sync>;
type FinishFn<A, R> = Arc<dyn Fn(&A) -> R + Send + Sync>;

/// A complete aggregate operation over accumulator `A`, input `I`, and finished result
/// `R`. Cloning is cheap: every function is behind an `Arc`, so the same operation can
/// be shared between stage-1 and stage-2 processors of a split aggregation.
pub struct AggregateOperation<A, I, R> {
    create: CreateFn<A>,
    accumulate: AccumulateFn<A, I>,
    combine: CombineFn<A>,
    deduct: Option<CombineFn<A>>,
    finish: FinishFn<A, R>,
}

impl<A, I, R> Clone for AggregateOperation<A, I, R> {
    fn clone(&self) -> Self {
        AggregateOperation {
            create: self.create.clone(),
            accumulate: self.accumulate.clone(),
            combine: self.combine.clone(),
            deduct: self.deduct.clone(),
            finish: self.finish.clone(),
        }
    }
}

impl<A, I, R> AggregateOperation<A, I, R>
where
    A: 'static,
    I: 'static,
    R: 'static,
{
    pub fn new(
        create: impl Fn() -> A + Send + Sync + 'static,
        accumulate: impl Fn(&mut A, &I) + Send + Sync + 'static,
        combine: impl Fn(&A, &A) -> A + Send + Sync + 'static,
        finish: impl Fn(&A) -> R + Send + Sync + 'static,
    ) -> Self {
        AggregateOperation {
            create: Arc::new(create),
            accumulate: Arc::new(accumulate),
            combine: Arc::new(combine),
            deduct: None,
            finish: Arc::new(finish),
        }
    }

    /// Supplies `combine`'s inverse, enabling incremental (deduct-based) sliding
    /// window maintenance instead of re-folding retained frames per emission.
    pub fn with_deduct(mut self, deduct: impl Fn(&A, &A) -> A + Send + Sync + 'static) -> Self {
        self.deduct = Some(Arc::new(deduct));
        self
    }

    pub fn create(&self) -> A {
        (self.create)()
    }

    pub fn accumulate(&self, acc: &mut A, item: &I) {
        (self.accumulate)(acc, item)
    }

    pub fn combine(&self, a: &A, b: &A) -> A {
        (self.combine)(a, b)
    }

    pub fn deduct(&self, a: &A, b: &A) -> Option<A> {
        self.deduct.as_ref().map(|d| d(a, b))
    }

    pub fn has_deduct(&self) -> bool {
        self.deduct.is_some()
    }

    pub fn finish(&self, acc: &A) -> R {
        (self.finish)(acc)
    }

    /// Replaces `finish`, keeping `create`/`accumulate`/`combine`/`deduct`. Used to
    /// build the stage-1 half of a split aggregation, whose `finish` is the identity
    /// (`4.4.4`, "stage-1 accumulate").
    pub fn with_finish_fn<R2: 'static>(
        self,
        finish: impl Fn(&A) -> R2 + Send + Sync + 'static,
    ) -> AggregateOperation<A, I, R2> {
        AggregateOperation {
            create: self.create,
            accumulate: self.accumulate,
            combine: self.combine,
            deduct: self.deduct,
            finish: Arc::new(finish),
        }
    }

    /// Replaces `accumulate` with `combine`, and the input type with
    /// `TimestampedEntry<K, A>`: the operation this produces ingests *partial
    /// accumulators* wrapped the way stage-1's output carries them — `(frameEndTs, K,
    /// A_partial)` — instead of raw items (`4.4.4`, "stage-2 combine"). `K` is not a
    /// field of `AggregateOperation` itself, so it is named at the call site (usually
    /// inferred from the stage-2 `SlidingWindow`'s own type).
    pub fn with_combining_accumulate_fn<K: 'static>(self) -> AggregateOperation<A, TimestampedEntry<K, A>, R> {
        let combine = self.combine.clone();
        AggregateOperation {
            create: self.create,
            accumulate: Arc::new(move |acc: &mut A, partial: &TimestampedEntry<K, A>| {
                *acc = combine(acc, &partial.value);
            }),
            combine: self.combine,
            deduct: self.deduct,
            finish: self.finish,
        }
    }
}

/// Sums `i64` values — the aggregate operation scenarios S3/S4/S6 are specified with.
pub fn summing_i64<I>(extract: impl Fn(&I) -> i64 + Send + Sync + 'static) -> AggregateOperation<i64, I, i64>
where
    I: 'static,
{
    AggregateOperation::new(
        || 0i64,
        move |acc, item| *acc += extract(item),
        |a, b| a + b,
        |acc| *acc,
    )
    .with_deduct(|a, b| a - b)
}

/// Counts items, ignoring their value.
pub fn counting<I: 'static>() -> AggregateOperation<i64, I, i64> {
    AggregateOperation::new(|| 0i64, |acc, _item| *acc += 1, |a, b| a + b, |acc| *acc).with_deduct(|a, b| a - b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summing_accumulates_and_combines() {
        let op = summing_i64::<i64>(|x| *x);
        let mut acc = op.create();
        op.accumulate(&mut acc, &3);
        op.accumulate(&mut acc, &4);
        assert_eq!(op.finish(&acc), 7);

        let mut other = op.create();
        op.accumulate(&mut other, &10);
        let combined = op.combine(&acc, &other);
        assert_eq!(op.finish(&combined), 17);
        assert_eq!(op.deduct(&combined, &other), Some(7));
    }

    #[test]
    fn with_finish_fn_keeps_accumulate_and_combine() {
        let op = summing_i64::<i64>(|x| *x).with_finish_fn(|acc| *acc * 2);
        let mut acc = op.create();
        op.accumulate(&mut acc, &5);
        assert_eq!(op.finish(&acc), 10);
    }

    #[test]
    fn with_combining_accumulate_fn_ingests_partials() {
        let op = summing_i64::<i64>(|x| *x).with_combining_accumulate_fn::<i32>();
        let mut acc = op.create();
        // partial accumulators, wrapped the way stage-1's output carries them, not raw items
        op.accumulate(&mut acc, &TimestampedEntry::new(5, 0, 3));
        op.accumulate(&mut acc, &TimestampedEntry::new(10, 0, 4));
        assert_eq!(op.finish(&acc), 7);
    }
}
