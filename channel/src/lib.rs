//! Reexports `crossbeam_channel` so every weir crate pulls the same version.
//!
//! Used for the host-thread edges around a non-cooperative operator (each such operator
//! owns a dedicated blocking thread per `5 Concurrency & Resource Model`) and by the
//! driver to deliver stop signals to worker threads. The in-process, single-threaded
//! inbox/outbox buckets a cooperative operator sees (`weir_core::inbox`,
//! `weir_core::outbox`) are a distinct, lighter-weight abstraction and do not use this
//! crate at all.

pub use crossbeam_channel::*;
