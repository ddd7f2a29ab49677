use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{EngineError, Result};
use crate::time::{DEFAULT_FPS, TimeRange, sanitize_fps};

/// Frame-rate container for a document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timebase {
    pub fps: f64,
}

impl Timebase {
    pub fn new(fps: f64) -> Self {
        Self {
            fps: sanitize_fps(fps),
        }
    }
}

impl Default for Timebase {
    fn default() -> Self {
        Self { fps: DEFAULT_FPS }
    }
}

/// The full edit-decision document: tracks, clips, gaps, markers.
///
/// A document is a value. Command handlers never mutate one in place;
/// they return a replacement and the previous value stays valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineDocument {
    pub id: String,
    pub name: String,
    pub timebase: Timebase,
    pub tracks: Vec<TimelineTrack>,
    pub markers: Vec<Marker>,
}

impl TimelineDocument {
    pub fn new(name: &str, fps: f64) -> Self {
        Self {
            id: stable_id(&format!("timeline:{name}")),
            name: name.to_string(),
            timebase: Timebase::new(fps),
            tracks: Vec::new(),
            markers: Vec::new(),
        }
    }

    /// Fresh document used for new projects and as the parse fallback:
    /// two video tracks (top-first) above two audio tracks.
    pub fn default_document() -> Self {
        let mut doc = Self::new("Untitled", DEFAULT_FPS);
        for name in ["V2", "V1"] {
            doc.tracks.push(TimelineTrack::new(
                stable_id(&format!("track:{}:{name}", doc.id)),
                TrackKind::Video,
                name,
            ));
        }
        for name in ["A1", "A2"] {
            doc.tracks.push(TimelineTrack::new(
                stable_id(&format!("track:{}:{name}", doc.id)),
                TrackKind::Audio,
                name,
            ));
        }
        doc
    }

    pub fn fps(&self) -> f64 {
        sanitize_fps(self.timebase.fps)
    }

    pub fn track(&self, track_id: &str) -> Result<&TimelineTrack> {
        self.tracks
            .iter()
            .find(|track| track.id == track_id)
            .ok_or_else(|| EngineError::TrackNotFound {
                track_id: track_id.to_string(),
            })
    }

    pub fn track_index(&self, track_id: &str) -> Result<usize> {
        self.tracks
            .iter()
            .position(|track| track.id == track_id)
            .ok_or_else(|| EngineError::TrackNotFound {
                track_id: track_id.to_string(),
            })
    }

    /// Locates a clip anywhere in the document.
    pub fn find_clip(&self, item_id: &str) -> Option<(&TimelineTrack, &Clip)> {
        self.tracks.iter().find_map(|track| {
            track
                .clips()
                .find(|clip| clip.id == item_id)
                .map(|clip| (track, clip))
        })
    }

    /// All locked audio clips mirroring the given video clip.
    pub fn linked_audio_clips(&self, video_clip_id: &str) -> Vec<&Clip> {
        self.tracks
            .iter()
            .flat_map(|track| track.clips())
            .filter(|clip| {
                matches!(
                    &clip.kind,
                    ClipKind::Media {
                        linked_video_clip_id: Some(linked),
                        lock_to_linked_video: true,
                        ..
                    } if linked == video_clip_id
                )
            })
            .collect()
    }

    /// Every item id currently present, used for id disambiguation.
    pub fn used_item_ids(&self) -> HashSet<String> {
        self.tracks
            .iter()
            .flat_map(|track| track.items.iter())
            .map(|item| item.id().to_string())
            .collect()
    }
}

/// Track kind; video tracks always precede audio tracks in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Video,
    Audio,
}

/// Kind-specific track flags; a video track cannot carry audio flags.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackControls {
    Video { hidden: bool },
    Audio { muted: bool, solo: bool, gain: f64, balance: f64 },
}

impl TrackControls {
    pub fn default_for(kind: TrackKind) -> Self {
        match kind {
            TrackKind::Video => Self::Video { hidden: false },
            TrackKind::Audio => Self::Audio {
                muted: false,
                solo: false,
                gain: 1.0,
                balance: 0.0,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineTrack {
    pub id: String,
    pub kind: TrackKind,
    pub name: String,
    pub controls: TrackControls,
    pub items: Vec<TrackItem>,
    pub effects: Vec<Effect>,
}

impl TimelineTrack {
    pub fn new(id: String, kind: TrackKind, name: &str) -> Self {
        Self {
            id,
            kind,
            name: name.to_string(),
            controls: TrackControls::default_for(kind),
            items: Vec::new(),
            effects: Vec::new(),
        }
    }

    pub fn clips(&self) -> impl Iterator<Item = &Clip> {
        self.items.iter().filter_map(|item| match item {
            TrackItem::Clip(clip) => Some(clip),
            TrackItem::Gap(_) => None,
        })
    }

    pub fn clip(&self, item_id: &str) -> Result<&Clip> {
        self.clips()
            .find(|clip| clip.id == item_id)
            .ok_or_else(|| EngineError::ItemNotFound {
                item_id: item_id.to_string(),
            })
    }

    /// A track with only synthesized gaps counts as empty.
    pub fn has_clips(&self) -> bool {
        self.clips().next().is_some()
    }
}

/// One placed item: a clip, or a synthesized gap filling uncovered time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum TrackItem {
    Clip(Clip),
    Gap(Gap),
}

impl TrackItem {
    pub fn id(&self) -> &str {
        match self {
            Self::Clip(clip) => &clip.id,
            Self::Gap(gap) => &gap.id,
        }
    }

    pub fn timeline_range(&self) -> TimeRange {
        match self {
            Self::Clip(clip) => clip.timeline_range,
            Self::Gap(gap) => gap.timeline_range,
        }
    }
}

/// Synthesized placeholder; never authored by callers, always
/// regenerated by gap normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub id: String,
    pub track_id: String,
    pub timeline_range: TimeRange,
}

/// A placed, time-bounded edit unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: String,
    pub track_id: String,
    pub name: String,
    pub timeline_range: TimeRange,
    pub source_range: TimeRange,
    pub kind: ClipKind,
    pub speed: f64,
    pub opacity: f64,
    pub effects: Vec<Effect>,
    pub transform: Option<Transform>,
    pub transition_in: Option<Transition>,
    pub transition_out: Option<Transition>,
    pub locked: bool,
    pub disabled: bool,
}

impl Clip {
    pub fn new(
        id: String,
        track_id: String,
        name: &str,
        kind: ClipKind,
        timeline_range: TimeRange,
        source_range: TimeRange,
    ) -> Self {
        Self {
            id,
            track_id,
            name: name.to_string(),
            timeline_range,
            source_range,
            kind,
            speed: 1.0,
            opacity: 1.0,
            effects: Vec::new(),
            transform: None,
            transition_in: None,
            transition_out: None,
            locked: false,
            disabled: false,
        }
    }

    /// Total source material length, for clip kinds bounded by media.
    pub fn source_duration_us(&self) -> Option<i64> {
        match &self.kind {
            ClipKind::Media { source, .. } | ClipKind::Timeline { source } => {
                Some(source.duration_us)
            }
            ClipKind::Adjustment | ClipKind::Background { .. } | ClipKind::Text { .. } => None,
        }
    }

    /// True when this clip is an extracted audio clip locked to a video clip.
    pub fn locked_link(&self) -> Option<&str> {
        match &self.kind {
            ClipKind::Media {
                linked_video_clip_id: Some(linked),
                lock_to_linked_video: true,
                ..
            } => Some(linked),
            _ => None,
        }
    }

    /// Unused source material after the visible out-point, in timeline
    /// microseconds (speed-corrected). `None` means unbounded.
    pub fn post_handle_us(&self) -> Option<i64> {
        let total = self.source_duration_us()?;
        let remaining = (total - self.source_range.end_us()).max(0);
        Some((remaining as f64 / self.speed.max(MIN_SPEED)) as i64)
    }
}

/// Minimum and maximum accepted playback speed factors.
pub const MIN_SPEED: f64 = 0.01;
pub const MAX_SPEED: f64 = 100.0;

/// Legal audio gain range (unity is 1.0).
pub const MIN_AUDIO_GAIN: f64 = 0.0;
pub const MAX_AUDIO_GAIN: f64 = 2.0;

/// Legal audio balance range (centered at 0.0).
pub const MIN_AUDIO_BALANCE: f64 = -1.0;
pub const MAX_AUDIO_BALANCE: f64 = 1.0;

/// Media file referenced by a clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSource {
    pub path: String,
    pub duration_us: i64,
}

/// Clip payload; one variant per clip type so a background clip cannot
/// carry a media path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "clip_type", rename_all = "snake_case")]
pub enum ClipKind {
    Media {
        source: MediaSource,
        #[serde(default)]
        audio: AudioEnvelope,
        #[serde(default)]
        linked_video_clip_id: Option<String>,
        #[serde(default)]
        lock_to_linked_video: bool,
        #[serde(default)]
        audio_from_video_disabled: bool,
    },
    Timeline {
        source: MediaSource,
    },
    Adjustment,
    Background {
        color: String,
    },
    Text {
        text: String,
        style: TextStyle,
    },
}

/// Per-clip audio envelope consumed by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioEnvelope {
    pub gain: f64,
    pub balance: f64,
    pub fade_in_us: i64,
    pub fade_out_us: i64,
}

impl Default for AudioEnvelope {
    fn default() -> Self {
        Self {
            gain: 1.0,
            balance: 0.0,
            fade_in_us: 0,
            fade_out_us: 0,
        }
    }
}

/// How a consuming renderer should mix a crossfade. The engine stores
/// the value and computes timing only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionMode {
    Blend,
    Composite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub kind: String,
    pub duration_us: i64,
    pub mode: TransitionMode,
    pub curve: String,
}

impl Transition {
    pub fn crossfade(duration_us: i64) -> Self {
        Self {
            kind: "crossfade".to_string(),
            duration_us,
            mode: TransitionMode::Blend,
            curve: "linear".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position_x: f64,
    pub position_y: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub rotation_deg: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position_x: 0.0,
            position_y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation_deg: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub font_family: String,
    pub font_size_px: f64,
    pub color: String,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_family: "sans-serif".to_string(),
            font_size_px: 48.0,
            color: "#ffffff".to_string(),
        }
    }
}

/// Opaque effect reference stored on clips and tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    pub id: String,
    pub name: String,
    pub enabled: bool,
}

/// Timeline marker stored in document metadata, sorted by time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: String,
    pub time_us: i64,
    pub name: String,
    pub color: String,
}

/// Short stable id derived from a content fingerprint.
pub fn stable_id(fingerprint: &str) -> String {
    let digest = Sha256::digest(fingerprint.as_bytes());
    let mut id = String::with_capacity(12);
    for byte in digest.iter().take(6) {
        id.push_str(&format!("{byte:02x}"));
    }
    id
}

/// Stable id guaranteed not to collide with ids already in use;
/// collisions get a numeric suffix.
pub fn unique_item_id(fingerprint: &str, used: &HashSet<String>) -> String {
    let base = stable_id(fingerprint);
    if !used.contains(&base) {
        return base;
    }
    for suffix in 2.. {
        let candidate = format!("{base}-{suffix}");
        if !used.contains(&candidate) {
            return candidate;
        }
    }
    unreachable!("suffix space exhausted");
}

/// Deterministic id for the gap at `index` on a track.
pub fn gap_id(track_id: &str, index: usize) -> String {
    format!("{track_id}-gap-{index}")
}
