//! Reference executor for the processor contract: a single-threaded driver that
//! exercises `init → process* → completeEdge* → complete*` and snapshot round-trips
//! exactly the way the processor runtime specifies, plus a dedicated-thread host for
//! non-cooperative operators. Used by this crate's own tests as the behavioural
//! specification for the windowing and transform operators it drives.

pub mod driver;
pub mod thread_host;

pub use driver::{restore_snapshot, run_to_completion, save_snapshot};
