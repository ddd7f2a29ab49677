use serde::{Deserialize, Serialize};

/// Native timeline rate: one tick per microsecond.
pub const TIMELINE_RATE: f64 = 1_000_000.0;

/// Frame rate bounds accepted by a document timebase.
pub const MIN_FPS: f64 = 1.0;
pub const MAX_FPS: f64 = 240.0;

/// Frame rate used when a document carries an invalid timebase.
pub const DEFAULT_FPS: f64 = 30.0;

/// Snap tolerance, in frames, absorbing microsecond rounding drift.
const FRAME_SNAP_EPSILON: f64 = 1e-3;

/// Rounding policy for microsecond-to-frame conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundMode {
    Round,
    Floor,
    Ceil,
}

/// Half-open timeline range in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_us: i64,
    pub duration_us: i64,
}

impl TimeRange {
    pub fn new(start_us: i64, duration_us: i64) -> Self {
        Self {
            start_us,
            duration_us,
        }
    }

    /// Exclusive end boundary.
    pub fn end_us(&self) -> i64 {
        self.start_us + self.duration_us
    }

    pub fn contains(&self, time_us: i64) -> bool {
        self.start_us <= time_us && time_us < self.end_us()
    }

    /// Length of the temporal intersection with `other`, zero when disjoint.
    pub fn overlap_with(&self, other: &TimeRange) -> i64 {
        let start = self.start_us.max(other.start_us);
        let end = self.end_us().min(other.end_us());
        (end - start).max(0)
    }
}

/// Clamps `fps` into the supported range, falling back to the default
/// rate when the input is not a usable number.
pub fn sanitize_fps(fps: f64) -> f64 {
    if !fps.is_finite() || fps <= 0.0 {
        return DEFAULT_FPS;
    }
    fps.clamp(MIN_FPS, MAX_FPS)
}

/// Converts a microsecond timestamp to a frame index, clamped to zero.
///
/// Values within a small tolerance of an exact frame boundary are
/// snapped to it before `floor`/`ceil` apply, so a timestamp produced
/// by [`frame_to_us`] always maps back to the same frame.
///
/// # Example
/// ```
/// use engine::time::{RoundMode, us_to_frame};
///
/// assert_eq!(us_to_frame(33_333, 30.0, RoundMode::Round), 1);
/// assert_eq!(us_to_frame(33_333, 30.0, RoundMode::Floor), 1);
/// assert_eq!(us_to_frame(16_000, 30.0, RoundMode::Floor), 0);
/// ```
pub fn us_to_frame(time_us: i64, fps: f64, mode: RoundMode) -> i64 {
    let fps = sanitize_fps(fps);
    let mut frames = time_us as f64 * fps / TIMELINE_RATE;

    let nearest = frames.round();
    if (frames - nearest).abs() < FRAME_SNAP_EPSILON {
        frames = nearest;
    }

    let frame = match mode {
        RoundMode::Round => frames.round(),
        RoundMode::Floor => frames.floor(),
        RoundMode::Ceil => frames.ceil(),
    };
    (frame as i64).max(0)
}

/// Converts a frame index back to microseconds, clamped to zero.
pub fn frame_to_us(frame: i64, fps: f64) -> i64 {
    let fps = sanitize_fps(fps);
    let us = frame as f64 * TIMELINE_RATE / fps;
    (us.round() as i64).max(0)
}

/// Snaps a timestamp to the nearest representable frame boundary.
pub fn quantize_time_us(time_us: i64, fps: f64, mode: RoundMode) -> i64 {
    frame_to_us(us_to_frame(time_us, fps, mode), fps)
}

/// Snaps a signed delta to whole frames, preserving its sign.
pub fn quantize_delta_us(delta_us: i64, fps: f64, mode: RoundMode) -> i64 {
    let fps = sanitize_fps(fps);
    let mut frames = delta_us as f64 * fps / TIMELINE_RATE;

    let nearest = frames.round();
    if (frames - nearest).abs() < FRAME_SNAP_EPSILON {
        frames = nearest;
    }

    let frame = match mode {
        RoundMode::Round => frames.round(),
        RoundMode::Floor => frames.floor(),
        RoundMode::Ceil => frames.ceil(),
    };
    (frame * TIMELINE_RATE / fps).round() as i64
}

/// Quantizes a range by snapping its start and its *end* boundary
/// independently, then deriving the duration.
///
/// Two ranges that shared a boundary before quantization still share it
/// afterwards, so rounding drift can never open a one-frame gap between
/// adjacent clips.
pub fn quantize_range(range: TimeRange, fps: f64) -> TimeRange {
    let start_us = quantize_time_us(range.start_us, fps, RoundMode::Round);
    let end_us = quantize_time_us(range.end_us(), fps, RoundMode::Round);
    TimeRange {
        start_us,
        duration_us: (end_us - start_us).max(0),
    }
}

/// Duration of a single frame in microseconds.
pub fn frame_duration_us(fps: f64) -> i64 {
    frame_to_us(1, fps).max(1)
}
