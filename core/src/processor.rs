//! The processor contract (`4.2 Processor Contract`).
//!
//! States: `Uninit -> Active -> Completing -> SnapshotSaving? -> Terminated`. The
//! engine drives every transition by calling these methods; a processor never
//! schedules itself (`2 System Overview`). Replacing the usual base-class hierarchy,
//! this is a capability set (a trait) per `9 Design Notes`: shared helpers like
//! traverser draining live in free functions, not in a shared superclass.

use crate::context::Context;
use crate::inbox::Inbox;
use crate::outbox::Outbox;
use weir_error::ProcessorError;

/// One vertex's worth of behavior in the DAG.
///
/// `In`/`Out` are the item types flowing on this processor's input and output edges.
/// A processor with several input ordinals whose edges carry different item types
/// (e.g. co-group) owns an enum of all of them as `In` instead of adding ordinal-typed
/// associated types — see `window::cogroup` for that case.
pub trait Processor: Send {
    type In;
    type Out;

    /// Called exactly once before any other method. Operators cache what they need
    /// from `context` (snapshotting flag, logger, job future) and may pre-offer
    /// nothing: `outbox` starts empty.
    fn init(&mut self, _outbox: &mut Outbox<Self::Out>, _context: Context) -> Result<(), ProcessorError> {
        Ok(())
    }

    /// Fixed for the lifetime of the instance (`4.2` step 7).
    fn is_cooperative(&self) -> bool;

    /// Called only when `inbox` is non-empty. Must remove what it processes; per the
    /// progress rule (`4.2`, testable property 1) it must consume from `inbox`, emit
    /// to `outbox`, or there would be nothing for it to legally do — `process` has no
    /// boolean return because returning *is* the "made progress or yielded" signal,
    /// enforced by the inbox shrinking.
    fn process(
        &mut self,
        ordinal: usize,
        inbox: &mut Inbox<Self::In>,
        outbox: &mut Outbox<Self::Out>,
    ) -> Result<(), ProcessorError>;

    /// Periodic tick when no input is available, letting the operator emit on time or
    /// advance timers. Non-cooperative operators must return `Ok(true)` immediately
    /// (the default).
    fn try_process(&mut self, _outbox: &mut Outbox<Self::Out>) -> Result<bool, ProcessorError> {
        Ok(true)
    }

    /// Called once per input ordinal when that input is exhausted, then re-invoked
    /// until it returns `true`. May produce output (e.g. flushing partial windows).
    fn complete_edge(
        &mut self,
        _ordinal: usize,
        _outbox: &mut Outbox<Self::Out>,
    ) -> Result<bool, ProcessorError> {
        Ok(true)
    }

    /// Called after every input ordinal is exhausted, until it returns `true`.
    /// Returning `true` without emitting anything is valid termination (`9 Design
    /// Notes`, open question).
    fn complete(&mut self, _outbox: &mut Outbox<Self::Out>) -> Result<bool, ProcessorError> {
        Ok(true)
    }

    /// Streams retained state into `outbox`'s snapshot bucket until exhausted, then
    /// returns `true`. May be paused by a full bucket; resumes on the next call.
    /// Stateless operators (transforms) use the default no-op.
    fn save_snapshot(&mut self, _outbox: &mut Outbox<Self::Out>) -> Result<bool, ProcessorError> {
        Ok(true)
    }

    /// Consumes one batch of `(key, value)` snapshot records and rebuilds state.
    /// Called repeatedly until the snapshot data is exhausted.
    fn restore_snapshot(
        &mut self,
        _entries: &mut Inbox<(Vec<u8>, Vec<u8>)>,
    ) -> Result<(), ProcessorError> {
        Ok(())
    }

    /// Resolves derived invariants after restore (rebuilding ordered maps, re-seeding
    /// incremental accumulators). Returns `true` when done.
    fn finish_snapshot_restore(&mut self) -> Result<bool, ProcessorError> {
        Ok(true)
    }
}
