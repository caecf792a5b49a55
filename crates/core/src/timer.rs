//! Pausable frame timer.
//!
//! Tracks per-frame delta time, total running time (paused spans excluded)
//! and a frames-per-second counter refreshed once per second.

use std::time::{Duration, Instant};

const FPS_WINDOW: Duration = Duration::from_secs(1);

/// High-resolution timer for the render loop.
#[derive(Debug)]
pub struct Timer {
    base: Instant,
    prev: Instant,
    delta: Duration,
    paused: bool,
    pause_start: Instant,
    paused_total: Duration,
    fps_window_start: Instant,
    frame_count: u32,
    fps: u32,
}

impl Timer {
    /// Create a new running timer, starting from now.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(now: Instant) -> Self {
        Self {
            base: now,
            prev: now,
            delta: Duration::ZERO,
            paused: false,
            pause_start: now,
            paused_total: Duration::ZERO,
            fps_window_start: now,
            frame_count: 0,
            fps: 0,
        }
    }

    /// Reset to a running state at the current time.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Advance one frame. Does nothing while paused.
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    fn tick_at(&mut self, now: Instant) {
        if self.paused {
            return;
        }

        self.delta = now.saturating_duration_since(self.prev);

        if now.saturating_duration_since(self.fps_window_start) >= FPS_WINDOW {
            self.fps = self.frame_count;
            self.frame_count = 0;
            self.fps_window_start = now;
        } else {
            self.frame_count += 1;
        }

        self.prev = now;
    }

    /// Pause the timer. Delta time reads zero until resumed.
    pub fn pause(&mut self) {
        self.pause_at(Instant::now());
    }

    fn pause_at(&mut self, now: Instant) {
        if self.paused {
            return;
        }
        self.paused = true;
        self.pause_start = now;
        self.delta = Duration::ZERO;
    }

    /// Resume a paused timer. The first frame after resuming has zero delta.
    pub fn resume(&mut self) {
        self.resume_at(Instant::now());
    }

    fn resume_at(&mut self, now: Instant) {
        if !self.paused {
            return;
        }
        self.paused = false;
        self.paused_total += now.saturating_duration_since(self.pause_start);
        self.prev = now;
        self.fps_window_start = now;
        self.frame_count = 0;
        self.delta = Duration::ZERO;
    }

    /// Flip between paused and running.
    pub fn toggle(&mut self) {
        if self.paused {
            self.resume();
        } else {
            self.pause();
        }
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Seconds between the last two ticks; zero while paused.
    #[inline]
    pub fn delta_secs(&self) -> f32 {
        if self.paused {
            0.0
        } else {
            self.delta.as_secs_f32()
        }
    }

    /// Frames counted during the last complete one-second window.
    #[inline]
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Running time since creation, excluding time spent paused.
    pub fn total_secs(&self) -> f32 {
        self.total_at(Instant::now()).as_secs_f32()
    }

    fn total_at(&self, now: Instant) -> Duration {
        let mut paused = self.paused_total;
        if self.paused {
            paused += now.saturating_duration_since(self.pause_start);
        }
        now.saturating_duration_since(self.base)
            .saturating_sub(paused)
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_delta_tracks_ticks() {
        let t0 = Instant::now();
        let mut timer = Timer::starting_at(t0);
        timer.tick_at(t0 + ms(16));
        assert_eq!(timer.delta, ms(16));
        timer.tick_at(t0 + ms(40));
        assert_eq!(timer.delta, ms(24));
    }

    #[test]
    fn test_paused_timer_reports_zero_delta() {
        let t0 = Instant::now();
        let mut timer = Timer::starting_at(t0);
        timer.tick_at(t0 + ms(16));
        timer.pause_at(t0 + ms(20));
        timer.tick_at(t0 + ms(500));
        assert!(timer.is_paused());
        assert_eq!(timer.delta_secs(), 0.0);
    }

    #[test]
    fn test_resume_restarts_delta_from_zero() {
        let t0 = Instant::now();
        let mut timer = Timer::starting_at(t0);
        timer.pause_at(t0 + ms(10));
        timer.resume_at(t0 + ms(1000));
        assert_eq!(timer.delta_secs(), 0.0);
        timer.tick_at(t0 + ms(1016));
        assert_eq!(timer.delta, ms(16));
    }

    #[test]
    fn test_total_excludes_paused_time() {
        let t0 = Instant::now();
        let mut timer = Timer::starting_at(t0);
        timer.pause_at(t0 + ms(100));
        timer.resume_at(t0 + ms(600));
        assert_eq!(timer.total_at(t0 + ms(700)), ms(200));

        timer.pause_at(t0 + ms(800));
        assert_eq!(timer.total_at(t0 + ms(900)), ms(300));
    }

    #[test]
    fn test_fps_counts_frames_per_second() {
        let t0 = Instant::now();
        let mut timer = Timer::starting_at(t0);
        for i in 1..=10 {
            timer.tick_at(t0 + ms(i * 90));
        }
        assert_eq!(timer.fps(), 0);
        timer.tick_at(t0 + ms(1000));
        assert_eq!(timer.fps(), 10);
    }

    #[test]
    fn test_toggle_flips_state() {
        let mut timer = Timer::new();
        timer.toggle();
        assert!(timer.is_paused());
        timer.toggle();
        assert!(!timer.is_paused());
    }
}
