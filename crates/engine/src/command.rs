use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::model::{
    Effect, Marker, TextStyle, TimelineDocument, TrackKind, Transform, TransitionMode,
};
use crate::{items, links, markers, tracks};

/// Clip edge addressed by trim commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    Start,
    End,
}

/// Transition slot addressed by transition commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionEdge {
    In,
    Out,
}

/// Requested transition parameters; timing is computed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionSpec {
    #[serde(default = "default_transition_kind")]
    pub kind: String,
    pub duration_us: i64,
    #[serde(default = "default_transition_mode")]
    pub mode: TransitionMode,
    #[serde(default = "default_transition_curve")]
    pub curve: String,
}

fn default_transition_kind() -> String {
    "crossfade".to_string()
}

fn default_transition_mode() -> TransitionMode {
    TransitionMode::Blend
}

fn default_transition_curve() -> String {
    "linear".to_string()
}

/// Payload for `add_virtual_clip_to_track`; generated clips only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "clip_type", rename_all = "snake_case")]
pub enum VirtualClipSpec {
    Adjustment,
    Background {
        #[serde(default)]
        color: Option<String>,
    },
    Text {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        style: Option<TextStyle>,
    },
}

/// Field patch for `update_clip_properties`. Absent fields are left as
/// they are; present fields are clamped to their legal ranges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub opacity: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub locked: Option<bool>,
    #[serde(default)]
    pub disabled: Option<bool>,
    #[serde(default)]
    pub transform: Option<Transform>,
    #[serde(default)]
    pub effects: Option<Vec<Effect>>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub text_style: Option<TextStyle>,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub audio_gain: Option<f64>,
    #[serde(default)]
    pub audio_balance: Option<f64>,
    #[serde(default)]
    pub audio_fade_in_us: Option<i64>,
    #[serde(default)]
    pub audio_fade_out_us: Option<i64>,
}

/// Field patch for `update_track_properties`. Flags that do not apply
/// to the track's kind are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackPatch {
    #[serde(default)]
    pub video_hidden: Option<bool>,
    #[serde(default)]
    pub audio_muted: Option<bool>,
    #[serde(default)]
    pub audio_solo: Option<bool>,
    #[serde(default)]
    pub audio_gain: Option<f64>,
    #[serde(default)]
    pub audio_balance: Option<f64>,
    #[serde(default)]
    pub effects: Option<Vec<Effect>>,
}

/// Field patch for `update_marker`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerPatch {
    #[serde(default)]
    pub time_us: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// Commands accepted by the engine, one tagged record per operation.
///
/// Commands deserialize from JSON with a `type` discriminator, so a
/// host layer can record and replay batches:
///
/// ```
/// use engine::Command;
///
/// let command: Command = serde_json::from_str(
///     r#"{"type":"move_item","track_id":"t1","item_id":"c1","start_us":2000000}"#,
/// )
/// .expect("valid command");
/// assert!(matches!(command, Command::MoveItem { .. }));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    AddClipToTrack {
        track_id: String,
        name: String,
        source_path: String,
        source_duration_us: i64,
        #[serde(default)]
        start_us: Option<i64>,
        #[serde(default)]
        nested_timeline: bool,
        #[serde(default)]
        id: Option<String>,
    },
    AddVirtualClipToTrack {
        track_id: String,
        name: String,
        clip: VirtualClipSpec,
        duration_us: i64,
        #[serde(default)]
        start_us: Option<i64>,
        #[serde(default)]
        id: Option<String>,
    },
    MoveItem {
        track_id: String,
        item_id: String,
        start_us: i64,
    },
    MoveItemToTrack {
        item_id: String,
        from_track_id: String,
        to_track_id: String,
        start_us: i64,
    },
    TrimItem {
        track_id: String,
        item_id: String,
        edge: Edge,
        delta_us: i64,
    },
    SplitItem {
        track_id: String,
        item_id: String,
        at_us: i64,
    },
    DeleteItems {
        item_ids: Vec<String>,
    },
    RemoveItem {
        track_id: String,
        item_id: String,
    },
    UpdateClipProperties {
        track_id: String,
        item_id: String,
        patch: ClipPatch,
    },
    UpdateClipTransition {
        track_id: String,
        item_id: String,
        edge: TransitionEdge,
        #[serde(default)]
        transition: Option<TransitionSpec>,
    },
    OverlayPlaceItem {
        track_id: String,
        item_id: String,
        start_us: i64,
        #[serde(default)]
        to_track_id: Option<String>,
    },
    OverlayTrimItem {
        track_id: String,
        item_id: String,
        edge: Edge,
        delta_us: i64,
    },
    AddTrack {
        kind: TrackKind,
        name: String,
        #[serde(default)]
        id: Option<String>,
    },
    RenameTrack {
        track_id: String,
        name: String,
    },
    DeleteTrack {
        track_id: String,
        #[serde(default)]
        force: bool,
    },
    ReorderTracks {
        track_ids: Vec<String>,
    },
    UpdateTrackProperties {
        track_id: String,
        patch: TrackPatch,
    },
    ExtractAudioToTrack {
        video_clip_id: String,
        audio_track_id: String,
    },
    ReturnAudioToVideo {
        video_clip_id: String,
    },
    AddMarker {
        marker: Marker,
    },
    UpdateMarker {
        marker_id: String,
        patch: MarkerPatch,
    },
    RemoveMarker {
        marker_id: String,
    },
}

/// Applies one command to a document and returns the replacement
/// document.
///
/// The input document is never modified; on error it is guaranteed
/// that no partial edit escaped. Defined idempotent no-ops return an
/// unchanged copy.
pub fn apply(doc: &TimelineDocument, command: &Command) -> Result<TimelineDocument> {
    debug!(?command, "apply");
    match command {
        Command::AddClipToTrack {
            track_id,
            name,
            source_path,
            source_duration_us,
            start_us,
            nested_timeline,
            id,
        } => items::add_clip_to_track(
            doc,
            track_id,
            name,
            source_path,
            *source_duration_us,
            *start_us,
            *nested_timeline,
            id.as_deref(),
        ),
        Command::AddVirtualClipToTrack {
            track_id,
            name,
            clip,
            duration_us,
            start_us,
            id,
        } => items::add_virtual_clip_to_track(
            doc,
            track_id,
            name,
            clip,
            *duration_us,
            *start_us,
            id.as_deref(),
        ),
        Command::MoveItem {
            track_id,
            item_id,
            start_us,
        } => items::move_item(doc, track_id, item_id, *start_us),
        Command::MoveItemToTrack {
            item_id,
            from_track_id,
            to_track_id,
            start_us,
        } => items::move_item_to_track(doc, item_id, from_track_id, to_track_id, *start_us),
        Command::TrimItem {
            track_id,
            item_id,
            edge,
            delta_us,
        } => items::trim_item(doc, track_id, item_id, *edge, *delta_us),
        Command::SplitItem {
            track_id,
            item_id,
            at_us,
        } => items::split_item(doc, track_id, item_id, *at_us),
        Command::DeleteItems { item_ids } => items::delete_items(doc, item_ids),
        Command::RemoveItem { track_id, item_id } => items::remove_item(doc, track_id, item_id),
        Command::UpdateClipProperties {
            track_id,
            item_id,
            patch,
        } => items::update_clip_properties(doc, track_id, item_id, patch),
        Command::UpdateClipTransition {
            track_id,
            item_id,
            edge,
            transition,
        } => items::update_clip_transition(doc, track_id, item_id, *edge, transition.as_ref()),
        Command::OverlayPlaceItem {
            track_id,
            item_id,
            start_us,
            to_track_id,
        } => items::overlay_place_item(doc, track_id, item_id, *start_us, to_track_id.as_deref()),
        Command::OverlayTrimItem {
            track_id,
            item_id,
            edge,
            delta_us,
        } => items::overlay_trim_item(doc, track_id, item_id, *edge, *delta_us),
        Command::AddTrack { kind, name, id } => tracks::add_track(doc, *kind, name, id.as_deref()),
        Command::RenameTrack { track_id, name } => tracks::rename_track(doc, track_id, name),
        Command::DeleteTrack { track_id, force } => tracks::delete_track(doc, track_id, *force),
        Command::ReorderTracks { track_ids } => tracks::reorder_tracks(doc, track_ids),
        Command::UpdateTrackProperties { track_id, patch } => {
            tracks::update_track_properties(doc, track_id, patch)
        }
        Command::ExtractAudioToTrack {
            video_clip_id,
            audio_track_id,
        } => links::extract_audio_to_track(doc, video_clip_id, audio_track_id),
        Command::ReturnAudioToVideo { video_clip_id } => {
            links::return_audio_to_video(doc, video_clip_id)
        }
        Command::AddMarker { marker } => markers::add_marker(doc, marker),
        Command::UpdateMarker { marker_id, patch } => markers::update_marker(doc, marker_id, patch),
        Command::RemoveMarker { marker_id } => markers::remove_marker(doc, marker_id),
    }
}

#[cfg(test)]
mod tests {
    use super::Command;

    #[test]
    fn commands_deserialize_from_snake_case_tagged_records() {
        let json = r#"{
            "type": "add_virtual_clip_to_track",
            "track_id": "t1",
            "name": "title",
            "clip": { "clip_type": "text" },
            "duration_us": 2000000
        }"#;

        let command: Command = serde_json::from_str(json).expect("command should parse");
        let Command::AddVirtualClipToTrack { duration_us, .. } = command else {
            panic!("expected add_virtual_clip_to_track");
        };
        assert_eq!(duration_us, 2_000_000);
    }

    #[test]
    fn unknown_command_type_is_rejected_at_the_serde_boundary() {
        let json = r#"{ "type": "frobnicate_timeline" }"#;
        assert!(serde_json::from_str::<Command>(json).is_err());
    }
}
