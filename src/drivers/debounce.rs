//! Shared edge debouncing for the digital sensors.
//!
//! The window has to be long enough to ride out contact bounce and
//! short enough that rapid repeated actuations still register. The edge
//! itself is reported immediately; the window only suppresses the
//! bounce that follows it.

use crate::hal::{DigitalInput, Level};

/// Outcome of one filter poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelStep {
    /// No change.
    Idle,
    /// A fresh edge to this level; the bounce window has started.
    Edge(Level),
    /// The bounce window expired with the line at this level.
    Settled(Level),
}

/// Debounced level tracker over a [`DigitalInput`].
pub struct DebouncedLevel {
    window_ms: u32,
    last_level: Level,
    window_start: u32,
    in_window: bool,
}

impl DebouncedLevel {
    /// `rest` is the line's untouched level (high for the active-low
    /// sensors on this board).
    pub fn new(window_ms: u32, rest: Level) -> Self {
        Self {
            window_ms,
            last_level: rest,
            window_start: 0,
            in_window: false,
        }
    }

    /// One poll at kernel time `now`. The input is not read while the
    /// bounce window is open.
    pub fn step(&mut self, now: u32, input: &mut dyn DigitalInput) -> LevelStep {
        if self.in_window {
            if now.wrapping_sub(self.window_start) > self.window_ms {
                self.in_window = false;
                return LevelStep::Settled(self.last_level);
            }
            return LevelStep::Idle;
        }
        let level = input.read();
        if level == self.last_level {
            return LevelStep::Idle;
        }
        self.last_level = level;
        self.in_window = true;
        self.window_start = now;
        LevelStep::Edge(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Line(Level);

    impl DigitalInput for Line {
        fn read(&mut self) -> Level {
            self.0
        }
    }

    #[test]
    fn edge_fires_immediately_then_window_masks() {
        let mut f = DebouncedLevel::new(200, Level::High);
        let mut line = Line(Level::Low);
        assert_eq!(f.step(0, &mut line), LevelStep::Edge(Level::Low));
        // Bounce back up inside the window is invisible.
        line.0 = Level::High;
        assert_eq!(f.step(50, &mut line), LevelStep::Idle);
        assert_eq!(f.step(199, &mut line), LevelStep::Idle);
        line.0 = Level::Low;
        assert_eq!(f.step(201, &mut line), LevelStep::Settled(Level::Low));
    }

    #[test]
    fn steady_line_is_idle() {
        let mut f = DebouncedLevel::new(200, Level::High);
        let mut line = Line(Level::High);
        for t in (0..1000).step_by(10) {
            assert_eq!(f.step(t, &mut line), LevelStep::Idle);
        }
    }

    #[test]
    fn release_after_settle_fires_second_edge() {
        let mut f = DebouncedLevel::new(200, Level::High);
        let mut line = Line(Level::Low);
        assert_eq!(f.step(0, &mut line), LevelStep::Edge(Level::Low));
        assert_eq!(f.step(201, &mut line), LevelStep::Settled(Level::Low));
        line.0 = Level::High;
        assert_eq!(f.step(210, &mut line), LevelStep::Edge(Level::High));
    }
}
