//! Windowed aggregation operators (`4.4 Windowing Module`).

pub mod cogroup;
pub mod definition;
pub mod session;
pub mod sliding;

pub use definition::WindowDefinition;
pub use sliding::{FrameTs, SlidingWindow};
