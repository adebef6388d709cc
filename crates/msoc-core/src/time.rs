//! Scaled in-game clock

use serde::{Deserialize, Serialize};

pub const DEFAULT_TIME_SCALE: f32 = 60.0;
pub const SECONDS_IN_A_DAY: f32 = 86_400.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeManager {
    elapsed: f32,
    day: u32,
    iteration: u32,
    time_scale: f32,
}

impl Default for TimeManager {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_SCALE)
    }
}

impl TimeManager {
    pub fn new(time_scale: f32) -> Self {
        Self {
            elapsed: 0.0,
            day: 1,
            iteration: 1,
            time_scale,
        }
    }

    /// Advance by `dt` real seconds
    pub fn update(&mut self, dt: f32) {
        self.elapsed += dt * self.time_scale;
        while self.elapsed >= SECONDS_IN_A_DAY {
            self.elapsed -= SECONDS_IN_A_DAY;
            self.day += 1;
            self.iteration += 1;
        }
    }

    /// Scaled seconds since the start of the current day
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn increment_iteration(&mut self) {
        self.iteration += 1;
    }

    pub fn formatted_time(&self) -> String {
        let total = self.elapsed as u32;
        format!(
            "{:02}:{:02}:{:02}",
            (total / 3600) % 24,
            (total / 60) % 60,
            total % 60
        )
    }

    pub fn reset(&mut self) {
        self.elapsed = 0.0;
        self.day = 1;
        self.iteration = 1;
    }
}
