//! `WindowDefinition` (`3 Data Model`).

/// `(frameSize, frameOffset, windowSize)` with `windowSize` a positive multiple of
/// `frameSize`. A tumbling window is the degenerate case `windowSize == frameSize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowDefinition {
    pub frame_size: i64,
    pub frame_offset: i64,
    pub window_size: i64,
}

impl WindowDefinition {
    pub fn new(frame_size: i64, window_size: i64) -> Self {
        Self::with_offset(frame_size, 0, window_size)
    }

    pub fn with_offset(frame_size: i64, frame_offset: i64, window_size: i64) -> Self {
        assert!(frame_size > 0, "frame_size must be positive");
        assert!(
            window_size > 0 && window_size % frame_size == 0,
            "window_size must be a positive multiple of frame_size"
        );
        WindowDefinition {
            frame_size,
            frame_offset,
            window_size,
        }
    }

    pub fn tumbling(frame_size: i64) -> Self {
        Self::new(frame_size, frame_size)
    }

    pub fn frame_count(&self) -> i64 {
        self.window_size / self.frame_size
    }

    /// The smallest `f > t` with `f ≡ frame_offset (mod frame_size)`.
    pub fn higher_frame_ts(&self, t: i64) -> i64 {
        let k = (t - self.frame_offset).div_euclid(self.frame_size);
        self.frame_offset + (k + 1) * self.frame_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_frame_ts_matches_scenario_s4() {
        let w = WindowDefinition::new(5, 10);
        assert_eq!(w.higher_frame_ts(3), 5);
        assert_eq!(w.higher_frame_ts(7), 10);
        assert_eq!(w.higher_frame_ts(12), 15);
    }

    #[test]
    fn higher_frame_ts_is_strictly_greater_on_exact_boundary() {
        let w = WindowDefinition::new(10, 10);
        assert_eq!(w.higher_frame_ts(10), 20);
        assert_eq!(w.higher_frame_ts(0), 10);
    }

    #[test]
    fn higher_frame_ts_respects_offset_and_negative_timestamps() {
        let w = WindowDefinition::with_offset(10, 3, 10);
        assert_eq!(w.higher_frame_ts(-8), -7);
        assert_eq!(w.higher_frame_ts(3), 13);
    }

    #[test]
    #[should_panic(expected = "positive multiple")]
    fn window_size_must_be_a_multiple_of_frame_size() {
        WindowDefinition::new(7, 10);
    }
}
