//! Processor factories (`6 External Interfaces`).
//!
//! `ProcessorMetaSupplier` is resolved once on the job coordinator and fans out into
//! one `ProcessorSupplier` per cluster member; each member then asks its supplier for
//! `localParallelism` processor instances. Member resolution itself — discovering the
//! cluster, routing a `ProcessorSupplier` to the right address — is a host concern
//! (`1 Purpose & Scope`, Non-goals); what's in scope here is the shape of the
//! factories a vertex plugs into that process, so a single-process caller (the CLI,
//! the test harness) can drive a pipeline without any of that machinery.

use crate::processor::Processor;

/// Builds one processor instance. The simplest supplier: no per-member setup, no
/// fan-out, just a closure invoked `count` times.
pub trait Supplier<P: Processor>: Send {
    fn get(&mut self) -> P;
}

impl<P: Processor, F: FnMut() -> P + Send> Supplier<P> for F {
    fn get(&mut self) -> P {
        self()
    }
}

/// Creates the `localParallelism` processor instances that will run on one member.
pub trait ProcessorSupplier<P: Processor>: Send {
    /// Called once per member before `get`, e.g. to open a connection pool shared by
    /// every local instance.
    fn init(&mut self) {}

    fn get(&mut self, count: usize) -> Vec<P>;
}

/// A `ProcessorSupplier` built from a plain closure, for the common case of
/// stateless, per-instance construction with no member-level setup.
pub struct FnProcessorSupplier<F> {
    make: F,
}

impl<F> FnProcessorSupplier<F> {
    pub fn new(make: F) -> Self {
        FnProcessorSupplier { make }
    }
}

impl<P, F> ProcessorSupplier<P> for FnProcessorSupplier<F>
where
    P: Processor,
    F: FnMut() -> P + Send,
{
    fn get(&mut self, count: usize) -> Vec<P> {
        (0..count).map(|_| (self.make)()).collect()
    }
}

/// Resolved once on the job coordinator, then handed out member by member. Real
/// cluster resolution — `members -> ProcessorSupplier` routed to each address over
/// the network — belongs to the host; `resolve_local` below is the single-process
/// stand-in this repository's CLI and tests actually use.
pub trait ProcessorMetaSupplier<P: Processor> {
    type Supplier: ProcessorSupplier<P>;

    fn init(&mut self) {}

    /// Returns the supplier to use for one member, addressed by an opaque string
    /// (an IP, a test fixture's name, whatever the host's membership layer hands in).
    fn get(&mut self, address: &str) -> Self::Supplier;

    /// Convenience for single-process use: resolves the supplier for one synthetic
    /// local member and asks it for `local_parallelism` processors directly.
    fn resolve_local(&mut self, local_parallelism: usize) -> Vec<P> {
        self.init();
        let mut supplier = self.get("local");
        supplier.init();
        supplier.get(local_parallelism)
    }
}
