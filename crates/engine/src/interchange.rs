use std::collections::HashSet;

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::model::{
    Clip, ClipKind, Marker, MediaSource, TimelineDocument, TimelineTrack, TrackControls,
    TrackItem, TrackKind, stable_id, unique_item_id,
};
use crate::normalize::normalize_gaps;
use crate::time::{DEFAULT_FPS, TIMELINE_RATE, TimeRange, sanitize_fps};

/// Metadata namespace holding engine-specific fields on every node, so
/// generic consumers of the interchange tree can ignore them.
const VENDOR_KEY: &str = "cutforge";

fn rational_time(value_us: i64) -> Value {
    json!({
        "OTIO_SCHEMA": "RationalTime.1",
        "value": value_us,
        "rate": TIMELINE_RATE,
    })
}

fn time_range(range: TimeRange) -> Value {
    json!({
        "OTIO_SCHEMA": "TimeRange.1",
        "start_time": rational_time(range.start_us),
        "duration": rational_time(range.duration_us),
    })
}

/// Serializes a document to an OTIO-like JSON tree.
///
/// Items are encoded sequentially: each child's duration advances the
/// playhead, so absolute starts are implied. A crossfade overlap is
/// subtracted from the left clip's serialized duration (the two clips
/// would otherwise double-count the shared span) and restored on parse
/// from the vendor metadata.
pub fn serialize_document(doc: &TimelineDocument) -> Value {
    json!({
        "OTIO_SCHEMA": "Timeline.1",
        "name": doc.name,
        "metadata": {
            VENDOR_KEY: {
                "id": doc.id,
                "fps": doc.fps(),
                "markers": doc.markers,
            },
        },
        "tracks": {
            "OTIO_SCHEMA": "Stack.1",
            "name": "tracks",
            "children": doc.tracks.iter().map(serialize_track).collect::<Vec<Value>>(),
        },
    })
}

/// Serializes a document to a pretty-printed interchange string.
pub fn to_json(doc: &TimelineDocument) -> String {
    match serde_json::to_string_pretty(&serialize_document(doc)) {
        Ok(text) => text,
        Err(error) => {
            warn!(%error, "interchange serialization failed");
            String::new()
        }
    }
}

fn serialize_track(track: &TimelineTrack) -> Value {
    let kind = match track.kind {
        TrackKind::Video => "Video",
        TrackKind::Audio => "Audio",
    };
    let mut children = Vec::with_capacity(track.items.len());
    for (index, item) in track.items.iter().enumerate() {
        match item {
            TrackItem::Gap(gap) => children.push(json!({
                "OTIO_SCHEMA": "Gap.1",
                "name": "gap",
                "source_range": time_range(TimeRange::new(0, gap.timeline_range.duration_us)),
                "metadata": { VENDOR_KEY: { "id": gap.id } },
            })),
            TrackItem::Clip(clip) => {
                let next_start = track
                    .items
                    .get(index + 1)
                    .map(|next| next.timeline_range().start_us);
                let overlap = next_start
                    .map(|start| (clip.timeline_range.end_us() - start).max(0))
                    .unwrap_or(0);
                children.push(serialize_clip(clip, overlap));
            }
        }
    }

    json!({
        "OTIO_SCHEMA": "Track.1",
        "name": track.name,
        "kind": kind,
        "metadata": {
            VENDOR_KEY: {
                "id": track.id,
                "controls": track.controls,
                "effects": track.effects,
            },
        },
        "children": children,
    })
}

fn serialize_clip(clip: &Clip, overlap_us: i64) -> Value {
    let sequential_duration = (clip.timeline_range.duration_us - overlap_us).max(0);
    let mut node = json!({
        "OTIO_SCHEMA": "Clip.1",
        "name": clip.name,
        "source_range": time_range(TimeRange::new(
            clip.source_range.start_us,
            sequential_duration,
        )),
        "metadata": { VENDOR_KEY: { "clip": clip } },
    });
    if let ClipKind::Media { source, .. } | ClipKind::Timeline { source } = &clip.kind {
        node["media_reference"] = json!({
            "OTIO_SCHEMA": "ExternalReference.1",
            "target_url": source.path,
            "available_range": time_range(TimeRange::new(0, source.duration_us)),
        });
    }
    node
}

/// Parses interchange text. An unrecognized or malformed payload
/// yields a fresh default document instead of failing.
pub fn parse_document(text: &str) -> TimelineDocument {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => document_from_value(&value),
        Err(error) => {
            warn!(%error, "interchange text is not JSON, using default document");
            TimelineDocument::default_document()
        }
    }
}

/// Parses an interchange JSON tree, tolerating missing vendor
/// metadata: absolute starts are re-derived by accumulating sibling
/// durations and missing ids are re-derived from content fingerprints.
pub fn document_from_value(value: &Value) -> TimelineDocument {
    let schema = value.get("OTIO_SCHEMA").and_then(Value::as_str);
    let children = value
        .get("tracks")
        .and_then(|tracks| tracks.get("children"))
        .and_then(Value::as_array);
    let (Some(schema), Some(children)) = (schema, children) else {
        warn!("interchange tree is not a timeline, using default document");
        return TimelineDocument::default_document();
    };
    if !schema.starts_with("Timeline.") {
        warn!(schema, "unrecognized root schema, using default document");
        return TimelineDocument::default_document();
    }

    let name = value
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("Untitled");
    let vendor = value.get("metadata").and_then(|meta| meta.get(VENDOR_KEY));
    let fps = vendor
        .and_then(|vendor| vendor.get("fps"))
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_FPS);

    let mut doc = TimelineDocument::new(name, sanitize_fps(fps));
    if let Some(id) = vendor
        .and_then(|vendor| vendor.get("id"))
        .and_then(Value::as_str)
    {
        doc.id = id.to_string();
    }
    if let Some(markers) = vendor.and_then(|vendor| vendor.get("markers")) {
        let mut markers: Vec<Marker> =
            serde_json::from_value(markers.clone()).unwrap_or_default();
        markers.sort_by(|a, b| a.time_us.cmp(&b.time_us).then_with(|| a.id.cmp(&b.id)));
        doc.markers = markers;
    }

    let mut used = HashSet::new();
    let mut tracks = Vec::with_capacity(children.len());
    for (index, node) in children.iter().enumerate() {
        match track_from_value(node, &doc.id, index, &mut used) {
            Some(track) => tracks.push(track),
            None => debug!(index, "skipped non-track child"),
        }
    }

    // Re-partition so video tracks precede audio tracks, order kept.
    doc.tracks.extend(
        tracks
            .iter()
            .filter(|track| track.kind == TrackKind::Video)
            .cloned(),
    );
    doc.tracks
        .extend(tracks.into_iter().filter(|track| track.kind == TrackKind::Audio));
    doc
}

fn track_from_value(
    node: &Value,
    doc_id: &str,
    index: usize,
    used: &mut HashSet<String>,
) -> Option<TimelineTrack> {
    let schema = node.get("OTIO_SCHEMA").and_then(Value::as_str)?;
    if !schema.starts_with("Track.") {
        return None;
    }
    let fallback_name = format!("Track {}", index + 1);
    let name = node
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(&fallback_name);
    let kind = match node.get("kind").and_then(Value::as_str) {
        Some("Audio") => TrackKind::Audio,
        _ => TrackKind::Video,
    };
    let vendor = node.get("metadata").and_then(|meta| meta.get(VENDOR_KEY));
    let id = vendor
        .and_then(|vendor| vendor.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| stable_id(&format!("track:{doc_id}:{name}:{index}")));

    let mut track = TimelineTrack::new(id, kind, name);
    if let Some(controls) = vendor.and_then(|vendor| vendor.get("controls")) {
        if let Ok(controls) = serde_json::from_value::<TrackControls>(controls.clone()) {
            let matches_kind = matches!(
                (kind, &controls),
                (TrackKind::Video, TrackControls::Video { .. })
                    | (TrackKind::Audio, TrackControls::Audio { .. })
            );
            if matches_kind {
                track.controls = controls;
            }
        }
    }
    if let Some(effects) = vendor.and_then(|vendor| vendor.get("effects")) {
        track.effects = serde_json::from_value(effects.clone()).unwrap_or_default();
    }

    let mut clips = Vec::new();
    let mut cursor = 0i64;
    if let Some(children) = node.get("children").and_then(Value::as_array) {
        for child in children {
            let Some(schema) = child.get("OTIO_SCHEMA").and_then(Value::as_str) else {
                continue;
            };
            let (start_us, duration_us) = source_range_parts(child);
            if schema.starts_with("Gap.") {
                cursor += duration_us.max(0);
                continue;
            }
            if schema.starts_with("Clip.") {
                if let Some(clip) =
                    clip_from_value(child, &track.id, cursor, start_us, duration_us, used)
                {
                    clips.push(clip);
                }
                cursor += duration_us.max(0);
            }
        }
    }
    track.items = normalize_gaps(&track.id, clips);
    Some(track)
}

/// Reads `(source start, duration)` microseconds from a node's
/// `source_range`, converting foreign rates to the native one.
fn source_range_parts(node: &Value) -> (i64, i64) {
    let Some(range) = node.get("source_range") else {
        return (0, 0);
    };
    let start = range
        .get("start_time")
        .and_then(rational_to_us)
        .unwrap_or(0);
    let duration = range.get("duration").and_then(rational_to_us).unwrap_or(0);
    (start, duration)
}

fn rational_to_us(value: &Value) -> Option<i64> {
    let ticks = value.get("value").and_then(Value::as_f64)?;
    let rate = value
        .get("rate")
        .and_then(Value::as_f64)
        .unwrap_or(TIMELINE_RATE);
    if !rate.is_finite() || rate <= 0.0 {
        return None;
    }
    Some((ticks * TIMELINE_RATE / rate).round() as i64)
}

fn clip_from_value(
    node: &Value,
    track_id: &str,
    timeline_start_us: i64,
    source_start_us: i64,
    sequential_duration_us: i64,
    used: &mut HashSet<String>,
) -> Option<Clip> {
    let name = node.get("name").and_then(Value::as_str).unwrap_or("Clip");
    let vendor_clip = node
        .get("metadata")
        .and_then(|meta| meta.get(VENDOR_KEY))
        .and_then(|vendor| vendor.get("clip"));

    if let Some(vendor_clip) = vendor_clip {
        if let Ok(mut clip) = serde_json::from_value::<Clip>(vendor_clip.clone()) {
            // Restore the crossfade overlap that the sequential
            // encoding subtracted from this clip's duration.
            let mut duration = sequential_duration_us.max(0);
            if let Some(out) = &clip.transition_out {
                if clip.timeline_range.duration_us == duration + out.duration_us {
                    duration += out.duration_us.max(0);
                }
            }
            if used.contains(&clip.id) {
                let fingerprint = format!("{track_id}:{timeline_start_us}:{name}");
                warn!(clip_id = %clip.id, "duplicate clip id in interchange, re-deriving");
                clip.id = unique_item_id(&fingerprint, used);
            }
            used.insert(clip.id.clone());
            clip.track_id = track_id.to_string();
            clip.timeline_range = TimeRange::new(timeline_start_us.max(0), duration);
            return Some(clip);
        }
        warn!("vendor clip block is malformed, falling back to plain clip fields");
    }

    // Plain interchange clip authored by another tool: media path and
    // sequential timing only.
    let duration = sequential_duration_us.max(0);
    let path = node
        .get("media_reference")
        .and_then(|media| media.get("target_url"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let available_us = node
        .get("media_reference")
        .and_then(|media| media.get("available_range"))
        .and_then(|range| range.get("duration"))
        .and_then(rational_to_us)
        .unwrap_or(source_start_us + duration);

    let id = unique_item_id(&format!("{path}:{source_start_us}:{name}"), used);
    used.insert(id.clone());
    Some(Clip::new(
        id,
        track_id.to_string(),
        name,
        ClipKind::Media {
            source: MediaSource {
                path,
                duration_us: available_us,
            },
            audio: Default::default(),
            linked_video_clip_id: None,
            lock_to_linked_video: false,
            audio_from_video_disabled: false,
        },
        TimeRange::new(timeline_start_us.max(0), duration),
        TimeRange::new(source_start_us.max(0), duration),
    ))
}
