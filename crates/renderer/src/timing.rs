use std::time::{Duration, Instant};

/// Clock values computed for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TickTiming {
    pub time: f32,
    pub delta: f32,
    pub fps: f32,
}

/// Program clock with pause, speed and seek, plus a windowed FPS counter.
///
/// Program time is `base + (now - anchor) * speed` while playing and `base`
/// while paused. Every control operation rebases so time stays continuous.
#[derive(Debug)]
pub(crate) struct TimingState {
    playing: bool,
    speed: f32,
    base: f64,
    anchor: Option<Instant>,
    frame_count: u64,
    last_tick: Option<Instant>,
    fps_window: Duration,
    fps: f32,
    frames_since_fps_update: u32,
    last_fps_update: Option<Instant>,
}

impl TimingState {
    pub fn new(speed: f32, fps_window: Duration) -> Self {
        Self {
            playing: true,
            speed,
            base: 0.0,
            anchor: None,
            frame_count: 0,
            last_tick: None,
            fps_window,
            fps: 0.0,
            frames_since_fps_update: 0,
            last_fps_update: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Program time at `now` without advancing anything.
    pub fn time_at(&self, now: Instant) -> f64 {
        match (self.playing, self.anchor) {
            (true, Some(anchor)) => {
                self.base + now.saturating_duration_since(anchor).as_secs_f64() * self.speed as f64
            }
            _ => self.base,
        }
    }

    fn rebase(&mut self, now: Instant) {
        self.base = self.time_at(now);
        self.anchor = Some(now);
    }

    pub fn play(&mut self, now: Instant) {
        if !self.playing {
            self.playing = true;
            self.anchor = Some(now);
        }
    }

    pub fn pause(&mut self, now: Instant) {
        if self.playing {
            self.rebase(now);
            self.playing = false;
        }
    }

    /// Back to time zero and frame zero; play state is kept.
    pub fn reset(&mut self, now: Instant) {
        self.base = 0.0;
        self.anchor = Some(now);
        self.frame_count = 0;
    }

    pub fn seek(&mut self, seconds: f64, now: Instant) {
        self.base = seconds.max(0.0);
        self.anchor = Some(now);
    }

    pub fn set_speed(&mut self, speed: f32, now: Instant) {
        self.rebase(now);
        self.speed = speed;
    }

    /// Computes time, wall-clock delta and the FPS estimate for a tick at
    /// `now`. The first tick anchors the clock, so it reports time zero.
    pub fn advance(&mut self, now: Instant) -> TickTiming {
        if self.anchor.is_none() {
            self.anchor = Some(now);
        }
        let delta = self
            .last_tick
            .map(|last| now.saturating_duration_since(last).as_secs_f32())
            .unwrap_or(0.0);
        self.last_tick = Some(now);

        self.frames_since_fps_update += 1;
        let window_start = *self.last_fps_update.get_or_insert(now);
        let elapsed = now.saturating_duration_since(window_start);
        if elapsed >= self.fps_window && !elapsed.is_zero() {
            self.fps = self.frames_since_fps_update as f32 / elapsed.as_secs_f32();
            self.frames_since_fps_update = 0;
            self.last_fps_update = Some(now);
            tracing::debug!(
                fps = self.fps.round(),
                frame_count = self.frame_count,
                "render stats"
            );
        }

        TickTiming {
            time: self.time_at(now) as f32,
            delta,
            fps: self.fps,
        }
    }

    /// Counts a finished frame; paused frames do not advance `iFrame`.
    pub fn complete_frame(&mut self) {
        if self.playing {
            self.frame_count += 1;
        }
    }
}
