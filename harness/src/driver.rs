//! The reference executor: drives one processor through `init → process* →
//! completeEdge* → complete*`, the way `4.2 Processor Contract` lays the states out.
//! Doubles as the behavioural specification for the processor runtime — every
//! testable property in `8` is something this driver either enforces directly or
//! makes trivial for a caller to assert on its output.

use std::time::{Duration, Instant};
use weir_core::context::Context;
use weir_core::inbox::Inbox;
use weir_core::item::Edge;
use weir_core::outbox::Outbox;
use weir_core::processor::Processor;
use weir_error::ProcessorError;

const WARN_THRESHOLD: Duration = Duration::from_millis(5);
const STRICT_FAIL_THRESHOLD: Duration = Duration::from_secs(1);

/// Times one callback, logging a warning past the soft budget and, in strict mode,
/// failing the callback past the hard 1s ceiling (`5 Concurrency & Resource Model`,
/// `8` invariant 6). Non-cooperative operators are exempt — they own a dedicated
/// thread and may block indefinitely.
fn timed<T>(
    cooperative: bool,
    strict: bool,
    label: &str,
    f: impl FnOnce() -> Result<T, ProcessorError>,
) -> Result<T, ProcessorError> {
    let start = Instant::now();
    let result = f();
    if !cooperative {
        return result;
    }
    let elapsed = start.elapsed();
    if elapsed > WARN_THRESHOLD {
        log::warn!("{label} callback took {elapsed:?}, over the cooperative soft budget");
    }
    if strict && elapsed > STRICT_FAIL_THRESHOLD {
        return Err(ProcessorError::contract_violation(format!(
            "{label} callback took {elapsed:?}, over the strict-mode 1s limit"
        )));
    }
    result
}

/// Drives `processor.process(ordinal, ...)`, asserting the progress rule (`8`,
/// invariant 1): the call must shrink the inbox it was given or grow some outbox
/// bucket or the snapshot bucket. Anything else is a defect in the processor, not a
/// meaningful zero-length pipeline state.
fn checked_process<P: Processor>(
    processor: &mut P,
    ordinal: usize,
    inbox: &mut Inbox<P::In>,
    outbox: &mut Outbox<P::Out>,
    strict: bool,
) -> Result<(), ProcessorError> {
    let inbox_before = inbox.size();
    let outbox_before: usize =
        (0..outbox.ordinal_count()).map(|o| outbox.ordinal_len(o)).sum::<usize>() + outbox.snapshot_len();
    timed(processor.is_cooperative(), strict, "process", || {
        processor.process(ordinal, inbox, outbox)
    })?;
    let inbox_after = inbox.size();
    let outbox_after: usize =
        (0..outbox.ordinal_count()).map(|o| outbox.ordinal_len(o)).sum::<usize>() + outbox.snapshot_len();
    if inbox_after >= inbox_before && outbox_after <= outbox_before {
        return Err(ProcessorError::contract_violation(
            "process() returned without consuming from the inbox or emitting to the outbox",
        ));
    }
    Ok(())
}

/// Runs a processor with `inputs[ordinal]` queued on each input ordinal, through
/// `init`, a `process` loop until every inbox is drained, `completeEdge` per ordinal,
/// then `complete` — and returns everything it emitted on output ordinal 0, in order.
/// Matches the reference driver's documented choice (`9 Design Notes`, Open
/// Questions) to never call `tryProcess` between `completeEdge` and `complete`.
pub fn run_to_completion<P>(
    mut processor: P,
    context: Context,
    inputs: Vec<Vec<Edge<P::In>>>,
    strict: bool,
) -> Result<Vec<Edge<P::Out>>, ProcessorError>
where
    P: Processor,
    P::Out: Clone,
{
    let ordinal_count = inputs.len().max(1);
    let mut outbox = if processor.is_cooperative() {
        Outbox::cooperative(1)
    } else {
        Outbox::non_cooperative(1)
    };
    timed(processor.is_cooperative(), strict, "init", || processor.init(&mut outbox, context.clone()))?;

    let mut inboxes: Vec<Inbox<P::In>> = (0..ordinal_count).map(|_| Inbox::new()).collect();
    for (ordinal, items) in inputs.into_iter().enumerate() {
        for item in items {
            inboxes[ordinal].push(item);
        }
    }

    let mut output = Vec::new();
    loop {
        let mut made_progress = false;
        for ordinal in 0..ordinal_count {
            while !inboxes[ordinal].is_empty() {
                let before = inboxes[ordinal].size();
                checked_process(&mut processor, ordinal, &mut inboxes[ordinal], &mut outbox, strict)?;
                output.extend(outbox.drain_ordinal(0));
                made_progress = true;
                // a cooperative operator may stall (backpressure) without consuming
                // anything further this round; break to let the outbox drain above
                // take effect before retrying.
                if inboxes[ordinal].size() == before {
                    break;
                }
            }
        }
        if !made_progress {
            break;
        }
    }

    for ordinal in 0..ordinal_count {
        loop {
            let done = timed(processor.is_cooperative(), strict, "complete_edge", || {
                processor.complete_edge(ordinal, &mut outbox)
            })?;
            output.extend(outbox.drain_ordinal(0));
            if done {
                break;
            }
        }
    }

    loop {
        let done = timed(processor.is_cooperative(), strict, "complete", || processor.complete(&mut outbox))?;
        output.extend(outbox.drain_ordinal(0));
        if done {
            break;
        }
    }

    Ok(output)
}

/// Drains `processor.save_snapshot` to completion, returning every `(key, value)`
/// record it emitted, in order. Resets the outbox's per-capture key set first so
/// repeated captures in one test don't falsely collide.
pub fn save_snapshot<P: Processor>(
    processor: &mut P,
    outbox: &mut Outbox<P::Out>,
    strict: bool,
) -> Result<Vec<(Vec<u8>, Vec<u8>)>, ProcessorError> {
    outbox.reset_snapshot_keys();
    let mut records = Vec::new();
    loop {
        let done = timed(processor.is_cooperative(), strict, "save_snapshot", || {
            processor.save_snapshot(outbox)
        })?;
        records.extend(outbox.drain_snapshot());
        if done {
            break;
        }
    }
    Ok(records)
}

/// Feeds `records` through `restore_snapshot` then drains `finish_snapshot_restore`.
pub fn restore_snapshot<P: Processor>(
    processor: &mut P,
    records: Vec<(Vec<u8>, Vec<u8>)>,
) -> Result<(), ProcessorError> {
    let mut inbox = Inbox::new();
    for (key, value) in records {
        inbox.push(Edge::Data((key, value)));
    }
    processor.restore_snapshot(&mut inbox)?;
    while !processor.finish_snapshot_restore()? {}
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use weir_core::context::JobFuture;

    /// A processor that violates the progress rule (`8` invariant 1): `process` peeks
    /// at its input but never polls it, and never emits. `run_to_completion` must
    /// surface this as a `ContractViolation` rather than looping forever.
    struct DoesNothing;

    impl Processor for DoesNothing {
        type In = i32;
        type Out = i32;

        fn is_cooperative(&self) -> bool {
            true
        }

        fn process(
            &mut self,
            _ordinal: usize,
            _inbox: &mut Inbox<Self::In>,
            _outbox: &mut Outbox<Self::Out>,
        ) -> Result<(), ProcessorError> {
            Ok(())
        }
    }

    fn ctx() -> Context {
        Context::new("broken", 0, 1, false, JobFuture::new())
    }

    #[test]
    fn a_process_call_that_makes_no_progress_is_a_contract_violation() {
        let err = run_to_completion(DoesNothing, ctx(), vec![vec![Edge::Data(1)]], false).unwrap_err();
        assert_eq!(err.kind(), weir_error::ProcessorErrorKind::ContractViolation);
    }

    /// A processor that *does* make progress (it polls every item, even though it
    /// never emits anything) must not be flagged: consuming input is progress enough.
    struct DrainsSilently;

    impl Processor for DrainsSilently {
        type In = i32;
        type Out = i32;

        fn is_cooperative(&self) -> bool {
            true
        }

        fn process(
            &mut self,
            _ordinal: usize,
            inbox: &mut Inbox<Self::In>,
            _outbox: &mut Outbox<Self::Out>,
        ) -> Result<(), ProcessorError> {
            inbox.drain_to(|_| {});
            Ok(())
        }
    }

    #[test]
    fn consuming_the_inbox_without_emitting_is_valid_progress() {
        let out = run_to_completion(DrainsSilently, ctx(), vec![vec![Edge::Data(1), Edge::Data(2)]], false).unwrap();
        assert!(out.is_empty());
    }

    /// A processor whose `process` blocks past the strict-mode 1s ceiling.
    struct Sluggish;

    impl Processor for Sluggish {
        type In = i32;
        type Out = i32;

        fn is_cooperative(&self) -> bool {
            true
        }

        fn process(
            &mut self,
            _ordinal: usize,
            inbox: &mut Inbox<Self::In>,
            _outbox: &mut Outbox<Self::Out>,
        ) -> Result<(), ProcessorError> {
            std::thread::sleep(STRICT_FAIL_THRESHOLD + Duration::from_millis(50));
            inbox.drain_to(|_| {});
            Ok(())
        }
    }

    /// Testable property 6 (`8`): a cooperative operator exceeding the hard 1s ceiling
    /// under strict mode fails the callback rather than silently stalling its peers.
    #[test]
    fn exceeding_the_strict_time_budget_is_a_contract_violation() {
        let err = run_to_completion(Sluggish, ctx(), vec![vec![Edge::Data(1)]], true).unwrap_err();
        assert_eq!(err.kind(), weir_error::ProcessorErrorKind::ContractViolation);
    }
}
