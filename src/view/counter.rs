//! Animated category counters.
//!
//! Presentation only: the displayed value walks one unit per tick toward the
//! count derived from the analysis, independently per category. Nothing reads
//! these values back into the workflow.

use std::time::Duration;

use crate::models::{CategoryCounts, RiskCategory};

/// One counter: `(displayed, target)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterTween {
    pub displayed: u32,
    pub target: u32,
}

impl CounterTween {
    /// Move one unit toward the target. False once there.
    pub fn step(&mut self) -> bool {
        match self.displayed.cmp(&self.target) {
            std::cmp::Ordering::Less => self.displayed += 1,
            std::cmp::Ordering::Greater => self.displayed -= 1,
            std::cmp::Ordering::Equal => return false,
        }
        true
    }

    pub fn is_settled(&self) -> bool {
        self.displayed == self.target
    }
}

/// RED, YELLOW and GREEN counters stepping at a fixed interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterBoard {
    tick: Duration,
    red: CounterTween,
    yellow: CounterTween,
    green: CounterTween,
}

impl CounterBoard {
    /// All counters at zero.
    pub fn new(tick: Duration) -> Self {
        Self {
            tick,
            red: CounterTween::default(),
            yellow: CounterTween::default(),
            green: CounterTween::default(),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick
    }

    pub fn tween(&self, category: RiskCategory) -> CounterTween {
        match category {
            RiskCategory::Red => self.red,
            RiskCategory::Yellow => self.yellow,
            RiskCategory::Green => self.green,
        }
    }

    pub fn displayed(&self) -> CategoryCounts {
        CategoryCounts {
            red: self.red.displayed,
            yellow: self.yellow.displayed,
            green: self.green.displayed,
        }
    }

    /// Point every counter at new targets, keeping displayed values.
    pub fn retarget(&mut self, targets: CategoryCounts) {
        self.red.target = targets.red;
        self.yellow.target = targets.yellow;
        self.green.target = targets.green;
    }

    /// Snap back to zero with zero targets.
    pub fn clear(&mut self) {
        *self = Self::new(self.tick);
    }

    /// Advance every unsettled counter by one. False when none moved.
    pub fn step(&mut self) -> bool {
        let red = self.red.step();
        let yellow = self.yellow.step();
        let green = self.green.step();
        red || yellow || green
    }

    pub fn is_settled(&self) -> bool {
        self.red.is_settled() && self.yellow.is_settled() && self.green.is_settled()
    }

    /// Step on a timer until all counters reach their targets, handing each
    /// frame to `on_frame`.
    pub async fn run(&mut self, mut on_frame: impl FnMut(&CounterBoard)) {
        if self.is_settled() {
            return;
        }
        let start = tokio::time::Instant::now() + self.tick;
        let mut interval = tokio::time::interval_at(start, self.tick);
        while !self.is_settled() {
            interval.tick().await;
            self.step();
            on_frame(&*self);
        }
    }
}
