//! `Processor.Context` (`6 External Interfaces`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A handle the host gives every processor instance to observe job cancellation.
/// `context.jobFuture.isDone()` is consulted during long-running or blocking callbacks
/// so the operator can return promptly once the job is finished or cancelled
/// (`5 Concurrency & Resource Model`).
#[derive(Clone, Default)]
pub struct JobFuture {
    done: Arc<AtomicBool>,
}

impl JobFuture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Marks the job finished (successfully, cancelled, or failed). Idempotent.
    pub fn complete(&self) {
        self.done.store(true, Ordering::Release);
    }
}

/// A logging handle scoped to one vertex, so every record an operator emits can be
/// traced back to it without the operator threading its own name through every log
/// call. Backed by the plain `log` facade; see `weir-logger` for how a binary wires
/// the backend that actually receives these records.
#[derive(Clone)]
pub struct Logger {
    target: String,
}

impl Logger {
    fn new(vertex_name: &str, global_processor_index: usize) -> Self {
        Logger {
            target: format!("weir::{vertex_name}#{global_processor_index}"),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn trace(&self, args: std::fmt::Arguments<'_>) {
        log::trace!(target: &self.target, "{args}");
    }

    pub fn debug(&self, args: std::fmt::Arguments<'_>) {
        log::debug!(target: &self.target, "{args}");
    }

    pub fn info(&self, args: std::fmt::Arguments<'_>) {
        log::info!(target: &self.target, "{args}");
    }

    pub fn warn(&self, args: std::fmt::Arguments<'_>) {
        log::warn!(target: &self.target, "{args}");
    }

    pub fn error(&self, args: std::fmt::Arguments<'_>) {
        log::error!(target: &self.target, "{args}");
    }
}

/// Everything the engine hands a processor in `init`, exactly once, per `4.2 Processor
/// Contract` step 1.
#[derive(Clone)]
pub struct Context {
    pub global_processor_index: usize,
    pub vertex_name: String,
    pub local_parallelism: usize,
    pub snapshotting_enabled: bool,
    pub logger: Logger,
    pub job_future: JobFuture,
}

impl Context {
    pub fn new(
        vertex_name: impl Into<String>,
        global_processor_index: usize,
        local_parallelism: usize,
        snapshotting_enabled: bool,
        job_future: JobFuture,
    ) -> Self {
        let vertex_name = vertex_name.into();
        let logger = Logger::new(&vertex_name, global_processor_index);
        Context {
            global_processor_index,
            vertex_name,
            local_parallelism,
            snapshotting_enabled,
            logger,
            job_future,
        }
    }
}
