//! Empirical display statistics, measured purely from the event stream a
//! [`ScanTarget`](crate::scan_target::ScanTarget) sees. Hosts use these to
//! pace their output; nothing here feeds back into the simulation.

use crate::scan_target::TargetEvent;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub struct DisplayMetrics {
    field_count: u64,
    frame_starts: VecDeque<Instant>,
    observation_window: Duration,

    incomplete_draws: u64,
    total_draws: u64,
}

impl DisplayMetrics {
    #[must_use]
    pub fn new() -> Self {
        DisplayMetrics {
            field_count: 0,
            frame_starts: VecDeque::new(),
            observation_window: Duration::from_secs(1),
            incomplete_draws: 0,
            total_draws: 0,
        }
    }

    pub fn announce_event(&mut self, event: TargetEvent) {
        if event == TargetEvent::VerticalRetrace {
            self.field_count += 1;
            let now = Instant::now();
            self.frame_starts.push_back(now);
            while let Some(front) = self.frame_starts.front() {
                if now.duration_since(*front) > self.observation_window {
                    self.frame_starts.pop_front();
                } else {
                    break;
                }
            }
        }
    }

    /// Forget rate history, e.g. because the window was resized and frame
    /// timings will have been disturbed.
    pub fn announce_did_resize(&mut self) {
        self.frame_starts.clear();
    }

    /// Records the outcome of one host-side draw.
    pub fn announce_draw_status(&mut self, _duration: Duration, complete: bool) {
        self.total_draws += 1;
        if !complete {
            self.incomplete_draws += 1;
        }
    }

    /// Fields seen since construction.
    #[must_use]
    pub fn field_count(&self) -> u64 {
        self.field_count
    }

    /// Observed fields per second over the last second of wall time, if
    /// enough fields have arrived to judge.
    #[must_use]
    pub fn fields_per_second(&self) -> Option<f64> {
        if self.frame_starts.len() < 2 {
            return None;
        }
        let elapsed = self
            .frame_starts
            .back()?
            .duration_since(*self.frame_starts.front()?)
            .as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }
        Some((self.frame_starts.len() - 1) as f64 / elapsed)
    }

    /// The proportion of draws reported incomplete; a host whose renderer
    /// can't keep up may choose to drop work.
    #[must_use]
    pub fn incomplete_draw_ratio(&self) -> f64 {
        if self.total_draws == 0 {
            return 0.0;
        }
        self.incomplete_draws as f64 / self.total_draws as f64
    }
}

impl Default for DisplayMetrics {
    fn default() -> Self {
        DisplayMetrics::new()
    }
}
