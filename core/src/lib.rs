//! The per-vertex processor runtime: the cooperative scheduling contract between an
//! engine and a processor, the stateful windowing operators built on top of it, and
//! the snapshot/restore protocol that makes a pipeline resumable.

pub mod aggregate;
pub mod context;
pub mod inbox;
pub mod item;
pub mod outbox;
pub mod processor;
pub mod snapshot;
pub mod supplier;
pub mod transforms;
pub mod traverser;
pub mod watermark;
pub mod window;

pub use aggregate::AggregateOperation;
pub use context::Context;
pub use inbox::Inbox;
pub use item::{Edge, TimestampedEntry, Watermark, WindowResult};
pub use outbox::Outbox;
pub use processor::Processor;
pub use traverser::Traverser;
