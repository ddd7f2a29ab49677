//! Pure, synchronous non-destructive timeline edit engine.
//!
//! A [`model::TimelineDocument`] is a value: every command produces a
//! replacement document via [`apply`] and never mutates its input. The
//! [`interchange`] module round-trips documents through an OTIO-like
//! JSON format.

pub mod command;
pub mod error;
pub mod interchange;
pub mod items;
pub mod links;
pub mod markers;
pub mod model;
mod normalize;
pub mod time;
pub mod tracks;

pub use command::{
    ClipPatch, Command, Edge, MarkerPatch, TrackPatch, TransitionEdge, TransitionSpec,
    VirtualClipSpec, apply,
};
pub use error::{EngineError, Result};
pub use model::{
    Clip, ClipKind, Gap, Marker, TimelineDocument, TimelineTrack, TrackItem, TrackKind,
};
pub use time::{RoundMode, TIMELINE_RATE, TimeRange};
