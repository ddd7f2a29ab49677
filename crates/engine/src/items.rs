use std::collections::HashSet;

use tracing::{debug, info};

use crate::command::{ClipPatch, Edge, TransitionEdge, TransitionSpec, VirtualClipSpec};
use crate::error::{EngineError, Result};
use crate::links::mirror_locked_audio;
use crate::model::{
    Clip, ClipKind, MAX_AUDIO_BALANCE, MAX_AUDIO_GAIN, MAX_SPEED, MIN_AUDIO_BALANCE,
    MIN_AUDIO_GAIN, MIN_SPEED, MediaSource, TimelineDocument, TimelineTrack, Transition,
    unique_item_id,
};
use crate::normalize::{assert_no_overlap, clips_of, with_normalized_items};
use crate::time::{
    RoundMode, TimeRange, frame_duration_us, quantize_delta_us, quantize_range, quantize_time_us,
};

fn track_end_us(track: &TimelineTrack) -> i64 {
    track
        .clips()
        .map(|clip| clip.timeline_range.end_us())
        .max()
        .unwrap_or(0)
}

fn to_source(tl_us: i64, speed: f64) -> i64 {
    (tl_us as f64 * speed.max(MIN_SPEED)).round() as i64
}

fn to_timeline(src_us: i64, speed: f64) -> i64 {
    (src_us as f64 / speed.max(MIN_SPEED)).round() as i64
}

/// A clip only counts as link-locked while the linked video clip still
/// exists. A dangling link stops mirroring and stops locking.
fn has_live_link(doc: &TimelineDocument, clip: &Clip) -> bool {
    clip.locked_link()
        .is_some_and(|video_id| doc.find_clip(video_id).is_some())
}

/// Places a new media (or nested-timeline) clip on a track, at an
/// explicit start or at the track's current end.
#[allow(clippy::too_many_arguments)]
pub fn add_clip_to_track(
    doc: &TimelineDocument,
    track_id: &str,
    name: &str,
    source_path: &str,
    source_duration_us: i64,
    start_us: Option<i64>,
    nested_timeline: bool,
    id: Option<&str>,
) -> Result<TimelineDocument> {
    let fps = doc.fps();
    let track_index = doc.track_index(track_id)?;
    let track = &doc.tracks[track_index];

    let source_duration_us = source_duration_us.max(0);
    let start = start_us.unwrap_or_else(|| track_end_us(track)).max(0);
    let range = quantize_range(TimeRange::new(start, source_duration_us), fps);

    let used = doc.used_item_ids();
    let id = id.map(str::to_string).unwrap_or_else(|| {
        unique_item_id(&format!("{source_path}:{}:{name}", range.start_us), &used)
    });
    let source = MediaSource {
        path: source_path.to_string(),
        duration_us: source_duration_us,
    };
    let kind = if nested_timeline {
        ClipKind::Timeline { source }
    } else {
        ClipKind::Media {
            source,
            audio: Default::default(),
            linked_video_clip_id: None,
            lock_to_linked_video: false,
            audio_from_video_disabled: false,
        }
    };
    let clip = Clip::new(
        id,
        track.id.clone(),
        name,
        kind,
        range,
        TimeRange::new(0, range.duration_us.min(source_duration_us)),
    );

    let mut clips = clips_of(track);
    assert_no_overlap(&clips, &clip)?;

    info!(track_id, clip_id = %clip.id, start_us = range.start_us, "clip added");
    let mut next = doc.clone();
    clips.push(clip);
    next.tracks[track_index] = with_normalized_items(track, clips);
    Ok(next)
}

/// Places a generated clip (adjustment, background, text) on a track.
pub fn add_virtual_clip_to_track(
    doc: &TimelineDocument,
    track_id: &str,
    name: &str,
    spec: &VirtualClipSpec,
    duration_us: i64,
    start_us: Option<i64>,
    id: Option<&str>,
) -> Result<TimelineDocument> {
    let fps = doc.fps();
    let track_index = doc.track_index(track_id)?;
    let track = &doc.tracks[track_index];

    let start = start_us.unwrap_or_else(|| track_end_us(track)).max(0);
    let range = quantize_range(TimeRange::new(start, duration_us.max(0)), fps);

    let kind = match spec {
        VirtualClipSpec::Adjustment => ClipKind::Adjustment,
        VirtualClipSpec::Background { color } => ClipKind::Background {
            color: color.clone().unwrap_or_else(|| "#000000".to_string()),
        },
        VirtualClipSpec::Text { text, style } => ClipKind::Text {
            text: text.clone().unwrap_or_else(|| "Text".to_string()),
            style: style.clone().unwrap_or_default(),
        },
    };
    let used = doc.used_item_ids();
    let id = id
        .map(str::to_string)
        .unwrap_or_else(|| unique_item_id(&format!("{track_id}:{}:{name}", range.start_us), &used));
    let clip = Clip::new(
        id,
        track.id.clone(),
        name,
        kind,
        range,
        TimeRange::new(0, range.duration_us),
    );

    let mut clips = clips_of(track);
    assert_no_overlap(&clips, &clip)?;

    info!(track_id, clip_id = %clip.id, start_us = range.start_us, "virtual clip added");
    let mut next = doc.clone();
    clips.push(clip);
    next.tracks[track_index] = with_normalized_items(track, clips);
    Ok(next)
}

/// Relocates a clip within its track to a frame-quantized start.
///
/// Moving a locked linked audio clip is redirected to its video clip;
/// the mirrored audio follows.
pub fn move_item(
    doc: &TimelineDocument,
    track_id: &str,
    item_id: &str,
    start_us: i64,
) -> Result<TimelineDocument> {
    let fps = doc.fps();
    let track_index = doc.track_index(track_id)?;
    let clip = doc.tracks[track_index].clip(item_id)?.clone();

    if let Some(video_id) = clip.locked_link() {
        if let Some((video_track, _)) = doc.find_clip(video_id) {
            let video_track_id = video_track.id.clone();
            let video_id = video_id.to_string();
            debug!(item_id, video_id = %video_id, "move redirected to linked video clip");
            return move_item(doc, &video_track_id, &video_id, start_us);
        }
    }
    if clip.locked {
        return Err(EngineError::LockedClip {
            item_id: item_id.to_string(),
        });
    }

    let range = quantize_range(
        TimeRange::new(start_us.max(0), clip.timeline_range.duration_us),
        fps,
    );
    if range == clip.timeline_range {
        return Ok(doc.clone());
    }

    let mut moved = clip.clone();
    moved.timeline_range = range;
    assert_no_overlap(&clips_of(&doc.tracks[track_index]), &moved)?;

    info!(track_id, item_id, start_us = range.start_us, "move applied");
    let mut next = doc.clone();
    let mut clips = clips_of(&next.tracks[track_index]);
    for candidate in &mut clips {
        if candidate.id == item_id {
            candidate.timeline_range = range;
        }
    }
    next.tracks[track_index] = with_normalized_items(&next.tracks[track_index], clips);
    mirror_locked_audio(next)
}

/// Relocates a clip onto another track. A same-track move delegates to
/// [`move_item`] so both command paths share one behavior.
pub fn move_item_to_track(
    doc: &TimelineDocument,
    item_id: &str,
    from_track_id: &str,
    to_track_id: &str,
    start_us: i64,
) -> Result<TimelineDocument> {
    if from_track_id == to_track_id {
        return move_item(doc, from_track_id, item_id, start_us);
    }

    let fps = doc.fps();
    let from_index = doc.track_index(from_track_id)?;
    let to_index = doc.track_index(to_track_id)?;
    let clip = doc.tracks[from_index].clip(item_id)?.clone();
    if clip.locked {
        return Err(EngineError::LockedClip {
            item_id: item_id.to_string(),
        });
    }

    if let Some(video_id) = clip.locked_link() {
        if let Some((video_track, _)) = doc.find_clip(video_id) {
            // The start change belongs to the video clip; the audio
            // clip itself relocates and keeps mirroring.
            let video_track_id = video_track.id.clone();
            let video_id = video_id.to_string();
            let moved = move_item(doc, &video_track_id, &video_id, start_us)?;
            return relocate_clip(&moved, item_id, from_index, to_index);
        }
    }

    let mut moved = clip.clone();
    moved.timeline_range = quantize_range(
        TimeRange::new(start_us.max(0), clip.timeline_range.duration_us),
        fps,
    );
    moved.track_id = to_track_id.to_string();
    assert_no_overlap(&clips_of(&doc.tracks[to_index]), &moved)?;

    info!(
        item_id,
        from_track_id,
        to_track_id,
        start_us = moved.timeline_range.start_us,
        "cross-track move applied"
    );
    let mut next = doc.clone();
    let mut from_clips = clips_of(&next.tracks[from_index]);
    from_clips.retain(|candidate| candidate.id != item_id);
    next.tracks[from_index] = with_normalized_items(&next.tracks[from_index], from_clips);

    let mut to_clips = clips_of(&next.tracks[to_index]);
    to_clips.push(moved);
    next.tracks[to_index] = with_normalized_items(&next.tracks[to_index], to_clips);
    mirror_locked_audio(next)
}

fn relocate_clip(
    doc: &TimelineDocument,
    item_id: &str,
    from_index: usize,
    to_index: usize,
) -> Result<TimelineDocument> {
    let clip = doc.tracks[from_index].clip(item_id)?.clone();
    assert_no_overlap(&clips_of(&doc.tracks[to_index]), &clip)?;

    let mut next = doc.clone();
    let mut from_clips = clips_of(&next.tracks[from_index]);
    from_clips.retain(|candidate| candidate.id != item_id);
    next.tracks[from_index] = with_normalized_items(&next.tracks[from_index], from_clips);

    let mut to_clips = clips_of(&next.tracks[to_index]);
    to_clips.push(clip);
    next.tracks[to_index] = with_normalized_items(&next.tracks[to_index], to_clips);
    Ok(next)
}

/// Computes the trimmed version of a clip. The requested timeline
/// delta is scaled by the clip speed into source time, clamped against
/// the source bounds (media-backed kinds only), converted back, and
/// frame-quantized with independent start/end boundaries.
fn trim_clip(clip: &Clip, edge: Edge, delta_us: i64, fps: f64) -> Clip {
    let speed = clip.speed.max(MIN_SPEED);
    let frame = frame_duration_us(fps);
    let min_src = ((frame as f64) * speed).round().max(1.0) as i64;
    let total = clip.source_duration_us();
    let mut next = clip.clone();

    match edge {
        Edge::End => {
            let desired_src = to_source(delta_us, speed);
            let lo = (min_src - clip.source_range.duration_us).min(0);
            let hi = total
                .map(|total| (total - clip.source_range.end_us()).max(0))
                .unwrap_or(i64::MAX / 4);
            let src_delta = desired_src.clamp(lo, hi);
            let tl_delta = to_timeline(src_delta, speed);

            let range = quantize_range(
                TimeRange::new(
                    clip.timeline_range.start_us,
                    clip.timeline_range.duration_us + tl_delta,
                ),
                fps,
            );
            next.timeline_range = range;
            let mut src_duration = to_source(range.duration_us, speed);
            if let Some(total) = total {
                src_duration = src_duration.min(total - next.source_range.start_us);
            }
            next.source_range.duration_us = src_duration.max(0);
        }
        Edge::Start => {
            let desired_src = to_source(delta_us, speed);
            let lo = if total.is_some() {
                -clip.source_range.start_us
            } else {
                i64::MIN / 4
            };
            let hi = (clip.source_range.duration_us - min_src).max(0);
            let src_delta = desired_src.clamp(lo, hi);
            let tl_delta = to_timeline(src_delta, speed);

            let new_start = (clip.timeline_range.start_us + tl_delta).max(0);
            let range = quantize_range(
                TimeRange::new(new_start, clip.timeline_range.end_us() - new_start),
                fps,
            );
            next.timeline_range = range;

            let shift = to_source(range.start_us - clip.timeline_range.start_us, speed);
            let src_start = (clip.source_range.start_us + shift).max(0);
            let mut src_duration = to_source(range.duration_us, speed);
            if let Some(total) = total {
                src_duration = src_duration.min(total - src_start);
            }
            next.source_range = TimeRange::new(src_start, src_duration.max(0));
        }
    }
    next
}

/// Adjusts one clip edge by a signed timeline delta.
pub fn trim_item(
    doc: &TimelineDocument,
    track_id: &str,
    item_id: &str,
    edge: Edge,
    delta_us: i64,
) -> Result<TimelineDocument> {
    let fps = doc.fps();
    let track_index = doc.track_index(track_id)?;
    let clip = doc.tracks[track_index].clip(item_id)?.clone();
    if clip.locked || has_live_link(doc, &clip) {
        return Err(EngineError::LockedClip {
            item_id: item_id.to_string(),
        });
    }

    let trimmed = trim_clip(&clip, edge, delta_us, fps);
    if trimmed.timeline_range == clip.timeline_range && trimmed.source_range == clip.source_range {
        return Ok(doc.clone());
    }
    assert_no_overlap(&clips_of(&doc.tracks[track_index]), &trimmed)?;

    info!(
        track_id,
        item_id,
        ?edge,
        delta_us,
        duration_us = trimmed.timeline_range.duration_us,
        "trim applied"
    );
    let mut next = doc.clone();
    let mut clips = clips_of(&next.tracks[track_index]);
    for candidate in &mut clips {
        if candidate.id == item_id {
            *candidate = trimmed.clone();
        }
    }
    next.tracks[track_index] = with_normalized_items(&next.tracks[track_index], clips);
    mirror_locked_audio(next)
}

/// Cuts a clip at a frame-quantized instant strictly inside its range.
/// The left part keeps the original id; the right part gets a fresh
/// one. Locked linked audio is split alongside its video clip.
pub fn split_item(
    doc: &TimelineDocument,
    track_id: &str,
    item_id: &str,
    at_us: i64,
) -> Result<TimelineDocument> {
    let fps = doc.fps();
    let track_index = doc.track_index(track_id)?;
    let clip = doc.tracks[track_index].clip(item_id)?.clone();

    if let Some(video_id) = clip.locked_link() {
        if let Some((video_track, _)) = doc.find_clip(video_id) {
            let video_track_id = video_track.id.clone();
            let video_id = video_id.to_string();
            debug!(item_id, video_id = %video_id, "split redirected to linked video clip");
            return split_item(doc, &video_track_id, &video_id, at_us);
        }
    }
    if clip.locked {
        return Err(EngineError::LockedClip {
            item_id: item_id.to_string(),
        });
    }

    let at = quantize_time_us(at_us, fps, RoundMode::Round);
    if at <= clip.timeline_range.start_us || at >= clip.timeline_range.end_us() {
        return Err(EngineError::SplitPointOutOfRange {
            item_id: item_id.to_string(),
            at_us: at,
        });
    }

    let mut used = doc.used_item_ids();
    let right_id = unique_item_id(&format!("{item_id}:split:{at}"), &used);
    used.insert(right_id.clone());
    let (left, right) = split_clip(&clip, at, right_id.clone());

    info!(track_id, item_id, at_us = at, right_id = %right.id, "split applied");
    let mut next = doc.clone();
    let mut clips = clips_of(&next.tracks[track_index]);
    clips.retain(|candidate| candidate.id != item_id);
    clips.push(left);
    clips.push(right);
    next.tracks[track_index] = with_normalized_items(&next.tracks[track_index], clips);

    // Split any locked linked audio at the same instant and re-link the
    // right-hand fragment to the right-hand video fragment.
    let linked_ids: Vec<String> = doc
        .linked_audio_clips(item_id)
        .into_iter()
        .map(|audio| audio.id.clone())
        .collect();
    for audio_id in linked_ids {
        let Some((audio_track, audio)) = next.find_clip(&audio_id) else {
            continue;
        };
        if at <= audio.timeline_range.start_us || at >= audio.timeline_range.end_us() {
            continue;
        }
        let audio_track_index = next.track_index(&audio_track.id.clone())?;
        let audio = audio.clone();
        let right_audio_id = unique_item_id(&format!("{audio_id}:split:{at}"), &used);
        used.insert(right_audio_id.clone());
        let (left_audio, mut right_audio) = split_clip(&audio, at, right_audio_id);
        if let ClipKind::Media {
            linked_video_clip_id,
            ..
        } = &mut right_audio.kind
        {
            *linked_video_clip_id = Some(right_id.clone());
        }
        let mut audio_clips = clips_of(&next.tracks[audio_track_index]);
        audio_clips.retain(|candidate| candidate.id != audio_id);
        audio_clips.push(left_audio);
        audio_clips.push(right_audio);
        next.tracks[audio_track_index] =
            with_normalized_items(&next.tracks[audio_track_index], audio_clips);
    }
    Ok(next)
}

fn split_clip(clip: &Clip, at_us: i64, right_id: String) -> (Clip, Clip) {
    let speed = clip.speed.max(MIN_SPEED);
    let local = at_us - clip.timeline_range.start_us;
    let src_offset = to_source(local, speed).clamp(0, clip.source_range.duration_us);

    let mut left = clip.clone();
    left.timeline_range = TimeRange::new(clip.timeline_range.start_us, local);
    left.source_range = TimeRange::new(clip.source_range.start_us, src_offset);
    left.transition_out = None;

    let mut right = clip.clone();
    right.id = right_id;
    right.timeline_range = TimeRange::new(at_us, clip.timeline_range.end_us() - at_us);
    right.source_range = TimeRange::new(
        clip.source_range.start_us + src_offset,
        clip.source_range.duration_us - src_offset,
    );
    right.transition_in = None;

    (left, right)
}

/// Removes a set of clips outright. Locked clips are skipped; unknown
/// ids are ignored. Gaps are renormalized afterwards.
pub fn delete_items(doc: &TimelineDocument, item_ids: &[String]) -> Result<TimelineDocument> {
    let ids: HashSet<&str> = item_ids.iter().map(String::as_str).collect();
    let mut next = doc.clone();
    let mut removed = 0usize;
    for index in 0..next.tracks.len() {
        let track = &next.tracks[index];
        let mut clips = clips_of(track);
        let before = clips.len();
        clips.retain(|clip| clip.locked || !ids.contains(clip.id.as_str()));
        if clips.len() == before {
            continue;
        }
        removed += before - clips.len();
        next.tracks[index] = with_normalized_items(track, clips);
    }
    if removed == 0 {
        return Ok(doc.clone());
    }
    info!(removed, "items deleted");
    Ok(next)
}

/// Removes one item from a track. Removing a gap performs a
/// ripple-left: every item after the gap shifts left by its duration.
pub fn remove_item(
    doc: &TimelineDocument,
    track_id: &str,
    item_id: &str,
) -> Result<TimelineDocument> {
    let track_index = doc.track_index(track_id)?;
    let track = &doc.tracks[track_index];

    if let Some(gap) = track.items.iter().find_map(|item| match item {
        crate::model::TrackItem::Gap(gap) if gap.id == item_id => Some(gap.clone()),
        _ => None,
    }) {
        let shift = gap.timeline_range.duration_us;
        let boundary = gap.timeline_range.end_us();
        info!(track_id, gap_id = %item_id, shift_us = shift, "gap removed, ripple left");

        let mut next = doc.clone();
        let mut clips = clips_of(&next.tracks[track_index]);
        for clip in &mut clips {
            if clip.timeline_range.start_us >= boundary {
                clip.timeline_range.start_us -= shift;
            }
        }
        next.tracks[track_index] = with_normalized_items(&next.tracks[track_index], clips);
        return mirror_locked_audio(next);
    }

    let clip = track.clip(item_id)?;
    if clip.locked {
        // Locked clips are excluded from removal, not an error.
        return Ok(doc.clone());
    }
    delete_items(doc, &[item_id.to_string()])
}

fn clamp_patch_value(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_finite() { value.clamp(lo, hi) } else { lo }
}

fn apply_clip_patch(clip: &mut Clip, patch: &ClipPatch) {
    if let Some(name) = &patch.name {
        clip.name = name.clone();
    }
    if let Some(opacity) = patch.opacity {
        clip.opacity = clamp_patch_value(opacity, 0.0, 1.0);
    }
    if let Some(locked) = patch.locked {
        clip.locked = locked;
    }
    if let Some(disabled) = patch.disabled {
        clip.disabled = disabled;
    }
    if let Some(transform) = patch.transform {
        clip.transform = Some(transform);
    }
    if let Some(effects) = &patch.effects {
        clip.effects = effects.clone();
    }
    match &mut clip.kind {
        ClipKind::Text { text, style } => {
            if let Some(new_text) = &patch.text {
                *text = new_text.clone();
            }
            if let Some(new_style) = &patch.text_style {
                *style = new_style.clone();
            }
        }
        ClipKind::Background { color } => {
            if let Some(new_color) = &patch.background_color {
                *color = new_color.clone();
            }
        }
        ClipKind::Media { audio, .. } => {
            if let Some(gain) = patch.audio_gain {
                audio.gain = clamp_patch_value(gain, MIN_AUDIO_GAIN, MAX_AUDIO_GAIN);
            }
            if let Some(balance) = patch.audio_balance {
                audio.balance = clamp_patch_value(balance, MIN_AUDIO_BALANCE, MAX_AUDIO_BALANCE);
            }
            if let Some(fade_in) = patch.audio_fade_in_us {
                audio.fade_in_us = fade_in.max(0);
            }
            if let Some(fade_out) = patch.audio_fade_out_us {
                audio.fade_out_us = fade_out.max(0);
            }
        }
        ClipKind::Timeline { .. } | ClipKind::Adjustment => {}
    }
}

/// Patches clip-type-appropriate fields. A speed change recomputes the
/// timeline duration; if the clip would grow into the next clip, the
/// downstream clips are rippled right instead of failing the edit.
pub fn update_clip_properties(
    doc: &TimelineDocument,
    track_id: &str,
    item_id: &str,
    patch: &ClipPatch,
) -> Result<TimelineDocument> {
    let fps = doc.fps();
    let track_index = doc.track_index(track_id)?;
    let clip = doc.tracks[track_index].clip(item_id)?.clone();

    let unlocking = patch.locked == Some(false);
    if clip.locked && !unlocking {
        return Err(EngineError::LockedClip {
            item_id: item_id.to_string(),
        });
    }

    let mut updated = clip.clone();
    apply_clip_patch(&mut updated, patch);

    let mut ripple: Option<(i64, i64)> = None; // (boundary, shift)
    if let Some(new_speed) = patch.speed {
        let new_speed = clamp_patch_value(new_speed, MIN_SPEED, MAX_SPEED);
        if new_speed != clip.speed {
            updated.speed = new_speed;
            let new_duration = to_timeline(updated.source_range.duration_us, new_speed);
            let range = quantize_range(
                TimeRange::new(clip.timeline_range.start_us, new_duration.max(1)),
                fps,
            );
            updated.timeline_range = range;

            if range.end_us() > clip.timeline_range.end_us() {
                let next_start = doc.tracks[track_index]
                    .clips()
                    .filter(|other| {
                        other.id != item_id
                            && other.timeline_range.start_us >= clip.timeline_range.end_us()
                    })
                    .map(|other| other.timeline_range.start_us)
                    .min();
                if let Some(next_start) = next_start {
                    if range.end_us() > next_start {
                        ripple = Some((next_start, range.end_us() - next_start));
                    }
                }
            }
        }
    }

    let mut next = doc.clone();
    let mut clips = clips_of(&next.tracks[track_index]);
    if let Some((boundary, shift)) = ripple {
        info!(track_id, item_id, shift_us = shift, "speed change rippled downstream clips");
        for candidate in &mut clips {
            if candidate.id != item_id && candidate.timeline_range.start_us >= boundary {
                candidate.timeline_range.start_us += shift;
            }
        }
    }
    for candidate in &mut clips {
        if candidate.id == item_id {
            *candidate = updated.clone();
        }
    }
    let others: Vec<Clip> = clips
        .iter()
        .filter(|candidate| candidate.id != item_id)
        .cloned()
        .collect();
    assert_no_overlap(&others, &updated)?;

    next.tracks[track_index] = with_normalized_items(&next.tracks[track_index], clips);
    mirror_locked_audio(next)
}

/// Sets or clears a transition at a clip edge.
///
/// Across a cut the engine computes the allowed crossfade overlap,
/// extends the left clip into the right one by exactly that overlap
/// (consuming its unused source handle) and writes matching
/// `transition_out`/`transition_in` on both sides. Clearing reverses
/// the extension and clears both sides.
pub fn update_clip_transition(
    doc: &TimelineDocument,
    track_id: &str,
    item_id: &str,
    edge: TransitionEdge,
    spec: Option<&TransitionSpec>,
) -> Result<TimelineDocument> {
    let fps = doc.fps();
    let frame = frame_duration_us(fps);
    let track_index = doc.track_index(track_id)?;
    let clip = doc.tracks[track_index].clip(item_id)?.clone();
    if clip.locked {
        return Err(EngineError::LockedClip {
            item_id: item_id.to_string(),
        });
    }

    let clips = clips_of(&doc.tracks[track_index]);
    let pair = cut_pair(&clips, &clip, edge);

    // Both sides of the cut change: the partner clip gains or loses the
    // stored overlap, so a locked partner blocks the command too.
    if let Some((left, right)) = &pair {
        let partner = if left.id == item_id { right } else { left };
        if partner.locked {
            return Err(EngineError::LockedClip {
                item_id: partner.id.clone(),
            });
        }
    }

    let mut next = doc.clone();
    let mut next_clips = clips_of(&next.tracks[track_index]);

    match (spec, pair) {
        (Some(spec), Some((left, right))) => {
            let cut_us = right.timeline_range.start_us;
            let overlap_before = (left.timeline_range.end_us() - cut_us).max(0);
            let speed = left.speed.max(MIN_SPEED);
            let base_duration = cut_us - left.timeline_range.start_us;
            let base_src_duration = left.source_range.duration_us - to_source(overlap_before, speed);

            let mut allowed = quantize_delta_us(spec.duration_us.max(0), fps, RoundMode::Round);
            if let Some(total) = left.source_duration_us() {
                let handle_src = (total - (left.source_range.start_us + base_src_duration)).max(0);
                allowed = allowed.min(to_timeline(handle_src, speed));
            }
            allowed = allowed.min(right.timeline_range.duration_us - frame);
            if overlap_before == 0 {
                if let Some(existing) = &right.transition_in {
                    // Opposite side already budgeted its own fade.
                    allowed = allowed.min(existing.duration_us.max(0));
                }
            }
            allowed = quantize_delta_us(allowed.max(0), fps, RoundMode::Floor).max(0);

            let left_id = left.id.clone();
            let right_id = right.id.clone();
            for candidate in &mut next_clips {
                if candidate.id == left_id {
                    candidate.timeline_range = TimeRange::new(
                        candidate.timeline_range.start_us,
                        base_duration + allowed,
                    );
                    let mut src_duration = base_src_duration + to_source(allowed, speed);
                    if let Some(total) = candidate.source_duration_us() {
                        src_duration = src_duration.min(total - candidate.source_range.start_us);
                    }
                    candidate.source_range.duration_us = src_duration.max(0);
                    candidate.transition_out = (allowed > 0).then(|| Transition {
                        kind: spec.kind.clone(),
                        duration_us: allowed,
                        mode: spec.mode,
                        curve: spec.curve.clone(),
                    });
                }
                if candidate.id == right_id {
                    candidate.transition_in = (allowed > 0).then(|| Transition {
                        kind: spec.kind.clone(),
                        duration_us: allowed,
                        mode: spec.mode,
                        curve: spec.curve.clone(),
                    });
                }
            }
            info!(track_id, left_id = %left_id, right_id = %right_id, overlap_us = allowed, "transition set");
        }
        (Some(spec), None) => {
            // No adjacent clip across this edge: a plain fade with no
            // overlap to negotiate.
            let duration = quantize_delta_us(spec.duration_us.max(0), fps, RoundMode::Round)
                .clamp(0, clip.timeline_range.duration_us);
            let transition = (duration > 0).then(|| Transition {
                kind: spec.kind.clone(),
                duration_us: duration,
                mode: spec.mode,
                curve: spec.curve.clone(),
            });
            for candidate in &mut next_clips {
                if candidate.id == item_id {
                    match edge {
                        TransitionEdge::In => candidate.transition_in = transition.clone(),
                        TransitionEdge::Out => candidate.transition_out = transition.clone(),
                    }
                }
            }
        }
        (None, Some((left, right))) => {
            let cut_us = right.timeline_range.start_us;
            let overlap_before = (left.timeline_range.end_us() - cut_us).max(0);
            let speed = left.speed.max(MIN_SPEED);
            let left_id = left.id.clone();
            let right_id = right.id.clone();
            for candidate in &mut next_clips {
                if candidate.id == left_id {
                    candidate.timeline_range = TimeRange::new(
                        candidate.timeline_range.start_us,
                        cut_us - candidate.timeline_range.start_us,
                    );
                    candidate.source_range.duration_us =
                        (candidate.source_range.duration_us - to_source(overlap_before, speed))
                            .max(0);
                    candidate.transition_out = None;
                }
                if candidate.id == right_id {
                    candidate.transition_in = None;
                }
            }
            info!(track_id, left_id = %left_id, right_id = %right_id, restored_us = overlap_before, "transition cleared");
        }
        (None, None) => {
            for candidate in &mut next_clips {
                if candidate.id == item_id {
                    match edge {
                        TransitionEdge::In => candidate.transition_in = None,
                        TransitionEdge::Out => candidate.transition_out = None,
                    }
                }
            }
        }
    }

    let updated: Vec<Clip> = next_clips.clone();
    for candidate in &updated {
        let others: Vec<Clip> = updated
            .iter()
            .filter(|other| other.id != candidate.id)
            .cloned()
            .collect();
        assert_no_overlap(&others, candidate)?;
    }
    next.tracks[track_index] = with_normalized_items(&next.tracks[track_index], next_clips);
    mirror_locked_audio(next)
}

/// Finds the (left, right) clips of the cut addressed by `edge` on
/// `clip`, or `None` when no clip abuts (or crossfades) that edge.
fn cut_pair(clips: &[Clip], clip: &Clip, edge: TransitionEdge) -> Option<(Clip, Clip)> {
    match edge {
        TransitionEdge::Out => {
            let right = clips
                .iter()
                .filter(|other| other.timeline_range.start_us > clip.timeline_range.start_us)
                .min_by_key(|other| other.timeline_range.start_us)?;
            let touches = right.timeline_range.start_us <= clip.timeline_range.end_us();
            touches.then(|| (clip.clone(), right.clone()))
        }
        TransitionEdge::In => {
            let left = clips
                .iter()
                .filter(|other| other.timeline_range.start_us < clip.timeline_range.start_us)
                .max_by_key(|other| other.timeline_range.start_us)?;
            let touches = left.timeline_range.end_us() >= clip.timeline_range.start_us;
            touches.then(|| (left.clone(), clip.clone()))
        }
    }
}

/// Carves every unlocked clip touched by `new_range` out of the way:
/// fully covered clips are deleted, partially covered ones truncated,
/// and clips that fully cover the range are split into two fragments.
fn carve_clips(
    doc: &TimelineDocument,
    clips: Vec<Clip>,
    new_range: TimeRange,
    used: &mut HashSet<String>,
    frame: i64,
) -> Result<Vec<Clip>> {
    let mut survivors = Vec::with_capacity(clips.len());
    for other in clips {
        let overlap = other.timeline_range.overlap_with(&new_range);
        if overlap == 0 {
            survivors.push(other);
            continue;
        }
        if other.locked || has_live_link(doc, &other) {
            return Err(EngineError::LockedClip {
                item_id: other.id.clone(),
            });
        }

        let o = other.timeline_range;
        let speed = other.speed.max(MIN_SPEED);
        let covered = new_range.start_us <= o.start_us && o.end_us() <= new_range.end_us();
        if covered {
            debug!(item_id = %other.id, "overlay deleted covered clip");
            continue;
        }

        let surrounds = o.start_us < new_range.start_us && new_range.end_us() < o.end_us();
        if surrounds {
            let mut left = other.clone();
            left.timeline_range = TimeRange::new(o.start_us, new_range.start_us - o.start_us);
            left.source_range.duration_us = to_source(left.timeline_range.duration_us, speed)
                .min(other.source_range.duration_us);
            left.transition_out = None;

            let mut right = other.clone();
            right.id = unique_item_id(&format!("{}:overlay:{}", other.id, new_range.end_us()), used);
            used.insert(right.id.clone());
            right.timeline_range = TimeRange::new(new_range.end_us(), o.end_us() - new_range.end_us());
            let consumed = to_source(new_range.end_us() - o.start_us, speed);
            right.source_range = TimeRange::new(
                other.source_range.start_us + consumed.min(other.source_range.duration_us),
                to_source(right.timeline_range.duration_us, speed),
            );
            right.transition_in = None;
            if let ClipKind::Media {
                linked_video_clip_id,
                lock_to_linked_video,
                ..
            } = &mut right.kind
            {
                *linked_video_clip_id = None;
                *lock_to_linked_video = false;
            }

            debug!(item_id = %other.id, right_id = %right.id, "overlay split surrounding clip");
            if left.timeline_range.duration_us >= frame {
                survivors.push(left);
            }
            if right.timeline_range.duration_us >= frame {
                survivors.push(right);
            }
            continue;
        }

        if o.start_us < new_range.start_us {
            // Tail of `other` covered: truncate its end.
            let mut truncated = other.clone();
            truncated.timeline_range = TimeRange::new(o.start_us, new_range.start_us - o.start_us);
            truncated.source_range.duration_us =
                to_source(truncated.timeline_range.duration_us, speed)
                    .min(other.source_range.duration_us);
            truncated.transition_out = None;
            debug!(item_id = %truncated.id, "overlay truncated clip tail");
            if truncated.timeline_range.duration_us >= frame {
                survivors.push(truncated);
            }
        } else {
            // Head of `other` covered: trim its start.
            let mut trimmed = other.clone();
            let shift = new_range.end_us() - o.start_us;
            trimmed.timeline_range = TimeRange::new(new_range.end_us(), o.end_us() - new_range.end_us());
            let consumed = to_source(shift, speed).min(other.source_range.duration_us);
            trimmed.source_range = TimeRange::new(
                other.source_range.start_us + consumed,
                other.source_range.duration_us - consumed,
            );
            trimmed.transition_in = None;
            debug!(item_id = %trimmed.id, "overlay trimmed clip head");
            if trimmed.timeline_range.duration_us >= frame {
                survivors.push(trimmed);
            }
        }
    }
    Ok(survivors)
}

/// Places an item destructively: clips in the way are deleted,
/// truncated, or split instead of rejecting the placement.
pub fn overlay_place_item(
    doc: &TimelineDocument,
    track_id: &str,
    item_id: &str,
    start_us: i64,
    to_track_id: Option<&str>,
) -> Result<TimelineDocument> {
    let fps = doc.fps();
    let frame = frame_duration_us(fps);
    let from_index = doc.track_index(track_id)?;
    let clip = doc.tracks[from_index].clip(item_id)?.clone();
    if clip.locked || has_live_link(doc, &clip) {
        return Err(EngineError::LockedClip {
            item_id: item_id.to_string(),
        });
    }

    let target_track_id = to_track_id.unwrap_or(track_id);
    let to_index = doc.track_index(target_track_id)?;
    let new_range = quantize_range(
        TimeRange::new(start_us.max(0), clip.timeline_range.duration_us),
        fps,
    );

    let mut next = doc.clone();
    let mut used = next.used_item_ids();

    let target_clips: Vec<Clip> = clips_of(&next.tracks[to_index])
        .into_iter()
        .filter(|candidate| candidate.id != item_id)
        .collect();
    let mut survivors = carve_clips(doc, target_clips, new_range, &mut used, frame)?;

    let mut moved = clip.clone();
    moved.timeline_range = new_range;
    moved.track_id = target_track_id.to_string();
    survivors.push(moved);

    if from_index != to_index {
        let mut from_clips = clips_of(&next.tracks[from_index]);
        from_clips.retain(|candidate| candidate.id != item_id);
        next.tracks[from_index] = with_normalized_items(&next.tracks[from_index], from_clips);
    }
    next.tracks[to_index] = with_normalized_items(&next.tracks[to_index], survivors);

    info!(
        track_id,
        item_id,
        target_track_id,
        start_us = new_range.start_us,
        "overlay place applied"
    );
    mirror_locked_audio(next)
}

/// Trims an item destructively: growth carves overlapped clips away
/// instead of rejecting the edit.
pub fn overlay_trim_item(
    doc: &TimelineDocument,
    track_id: &str,
    item_id: &str,
    edge: Edge,
    delta_us: i64,
) -> Result<TimelineDocument> {
    let fps = doc.fps();
    let frame = frame_duration_us(fps);
    let track_index = doc.track_index(track_id)?;
    let clip = doc.tracks[track_index].clip(item_id)?.clone();
    if clip.locked || has_live_link(doc, &clip) {
        return Err(EngineError::LockedClip {
            item_id: item_id.to_string(),
        });
    }

    let trimmed = trim_clip(&clip, edge, delta_us, fps);
    if trimmed.timeline_range == clip.timeline_range && trimmed.source_range == clip.source_range {
        return Ok(doc.clone());
    }

    let mut next = doc.clone();
    let mut used = next.used_item_ids();
    let other_clips: Vec<Clip> = clips_of(&next.tracks[track_index])
        .into_iter()
        .filter(|candidate| candidate.id != item_id)
        .collect();
    let mut survivors = carve_clips(doc, other_clips, trimmed.timeline_range, &mut used, frame)?;
    survivors.push(trimmed.clone());

    next.tracks[track_index] = with_normalized_items(&next.tracks[track_index], survivors);
    info!(
        track_id,
        item_id,
        ?edge,
        duration_us = trimmed.timeline_range.duration_us,
        "overlay trim applied"
    );
    mirror_locked_audio(next)
}

#[cfg(test)]
mod tests {
    use super::{
        add_clip_to_track, add_virtual_clip_to_track, delete_items, move_item, move_item_to_track,
        overlay_place_item, overlay_trim_item, remove_item, split_item, trim_item,
        update_clip_properties, update_clip_transition,
    };
    use crate::links::extract_audio_to_track;
    use crate::command::{ClipPatch, Edge, TransitionEdge, TransitionSpec, VirtualClipSpec};
    use crate::error::EngineError;
    use crate::model::{
        ClipKind, TimelineDocument, TimelineTrack, TrackItem, TrackKind, TransitionMode,
    };
    use crate::time::{TimeRange, quantize_time_us, RoundMode};

    fn empty_doc() -> TimelineDocument {
        let mut doc = TimelineDocument::new("test", 30.0);
        doc.tracks
            .push(TimelineTrack::new("v1".to_string(), TrackKind::Video, "V1"));
        doc.tracks
            .push(TimelineTrack::new("a1".to_string(), TrackKind::Audio, "A1"));
        doc
    }

    fn add_media(
        doc: &TimelineDocument,
        id: &str,
        start_us: i64,
        duration_us: i64,
    ) -> TimelineDocument {
        add_clip_to_track(
            doc,
            "v1",
            id,
            "demo.mp4",
            duration_us,
            Some(start_us),
            false,
            Some(id),
        )
        .expect("add clip should succeed")
    }

    #[test]
    fn add_clip_without_start_appends_at_track_end() {
        let doc = empty_doc();
        let doc = add_media(&doc, "c1", 0, 1_000_000);
        let doc = add_clip_to_track(
            &doc, "v1", "c2", "demo.mp4", 500_000, None, false, Some("c2"),
        )
        .expect("append should succeed");

        let clip = doc.tracks[0].clip("c2").expect("clip exists");
        assert_eq!(clip.timeline_range.start_us, 1_000_000);
    }

    #[test]
    fn add_virtual_background_gets_default_color() {
        let doc = empty_doc();
        let doc = add_virtual_clip_to_track(
            &doc,
            "v1",
            "bg",
            &VirtualClipSpec::Background { color: None },
            2_000_000,
            Some(0),
            Some("bg"),
        )
        .expect("add should succeed");

        let clip = doc.tracks[0].clip("bg").expect("clip exists");
        assert!(matches!(&clip.kind, ClipKind::Background { color } if color == "#000000"));
    }

    #[test]
    fn move_creates_single_gap_between_clips() {
        let doc = empty_doc();
        let doc = add_media(&doc, "c1", 0, 1_000_000);
        let doc = add_media(&doc, "c2", 2_000_000, 1_000_000);

        let doc = move_item(&doc, "v1", "c2", 3_000_000).expect("move should succeed");

        let items = &doc.tracks[0].items;
        assert_eq!(items.len(), 3);
        let TrackItem::Gap(gap) = &items[1] else {
            panic!("middle item must be a gap");
        };
        assert_eq!(gap.timeline_range, TimeRange::new(1_000_000, 2_000_000));
    }

    #[test]
    fn move_by_one_microsecond_does_not_open_a_gap() {
        let doc = empty_doc();
        let doc = add_media(&doc, "c1", 0, 1_000_000);
        let doc = add_media(&doc, "c2", 1_000_000, 1_000_000);

        let doc = move_item(&doc, "v1", "c2", 1_000_001).expect("move should succeed");

        assert!(doc.tracks[0]
            .items
            .iter()
            .all(|item| matches!(item, TrackItem::Clip(_))));
    }

    #[test]
    fn move_onto_other_clip_is_rejected() {
        let doc = empty_doc();
        let doc = add_media(&doc, "c1", 0, 1_000_000);
        let doc = add_media(&doc, "c2", 2_000_000, 1_000_000);

        let result = move_item(&doc, "v1", "c2", 500_000);
        assert!(matches!(result, Err(EngineError::ItemOverlap { .. })));
    }

    #[test]
    fn same_track_move_to_track_delegates_to_plain_move() {
        let doc = empty_doc();
        let doc = add_media(&doc, "c1", 0, 1_000_000);
        let doc = add_media(&doc, "c2", 2_000_000, 1_000_000);

        let via_move = move_item(&doc, "v1", "c2", 3_000_000).expect("move");
        let via_move_to_track =
            move_item_to_track(&doc, "c2", "v1", "v1", 3_000_000).expect("move to track");
        assert_eq!(via_move, via_move_to_track);
    }

    #[test]
    fn trim_end_result_is_stable_under_requantization() {
        let doc = empty_doc();
        let doc = add_media(&doc, "c1", 0, 5_000_000);

        let doc = trim_item(&doc, "v1", "c1", Edge::End, -123_456).expect("trim should succeed");

        let clip = doc.tracks[0].clip("c1").expect("clip exists");
        let end = clip.timeline_range.end_us();
        assert_eq!(end, quantize_time_us(end, 30.0, RoundMode::Round));
    }

    #[test]
    fn trim_start_respects_source_bounds() {
        let doc = empty_doc();
        let doc = add_media(&doc, "c1", 1_000_000, 2_000_000);

        // Requesting far more material than exists before the in-point.
        let doc = trim_item(&doc, "v1", "c1", Edge::Start, -5_000_000).expect("trim");

        let clip = doc.tracks[0].clip("c1").expect("clip exists");
        assert_eq!(clip.source_range.start_us, 0);
        assert!(clip.source_range.end_us() <= 2_000_000);
    }

    #[test]
    fn trim_locked_clip_is_rejected() {
        let doc = empty_doc();
        let doc = add_media(&doc, "c1", 0, 1_000_000);
        let doc = update_clip_properties(
            &doc,
            "v1",
            "c1",
            &ClipPatch {
                locked: Some(true),
                ..Default::default()
            },
        )
        .expect("lock should succeed");

        let result = trim_item(&doc, "v1", "c1", Edge::End, -100_000);
        assert!(matches!(result, Err(EngineError::LockedClip { .. })));
    }

    #[test]
    fn split_partitions_timeline_and_source_ranges() {
        let doc = empty_doc();
        let doc = add_media(&doc, "c1", 0, 2_000_000);

        let doc = split_item(&doc, "v1", "c1", 800_000).expect("split should succeed");

        let track = &doc.tracks[0];
        let clips: Vec<_> = track.clips().collect();
        assert_eq!(clips.len(), 2);
        let at = quantize_time_us(800_000, 30.0, RoundMode::Round);
        assert_eq!(clips[0].id, "c1");
        assert_eq!(clips[0].timeline_range.end_us(), at);
        assert_eq!(clips[1].timeline_range.start_us, at);
        assert_eq!(clips[0].source_range.end_us(), clips[1].source_range.start_us);
        assert_eq!(
            clips[0].source_range.duration_us + clips[1].source_range.duration_us,
            2_000_000
        );
    }

    #[test]
    fn split_at_boundary_is_rejected() {
        let doc = empty_doc();
        let doc = add_media(&doc, "c1", 0, 2_000_000);

        let result = split_item(&doc, "v1", "c1", 0);
        assert!(matches!(
            result,
            Err(EngineError::SplitPointOutOfRange { .. })
        ));
    }

    #[test]
    fn remove_gap_ripples_following_items_left() {
        let doc = empty_doc();
        let doc = add_media(&doc, "c1", 0, 1_000_000);
        let doc = add_media(&doc, "c2", 3_000_000, 1_000_000);

        let gap_id = {
            let TrackItem::Gap(gap) = &doc.tracks[0].items[1] else {
                panic!("expected a gap between the clips");
            };
            gap.id.clone()
        };

        let doc = remove_item(&doc, "v1", &gap_id).expect("gap removal should succeed");

        let clips: Vec<_> = doc.tracks[0].clips().collect();
        assert_eq!(clips[1].timeline_range.start_us, 1_000_000);
        assert!(doc.tracks[0]
            .items
            .iter()
            .all(|item| matches!(item, TrackItem::Clip(_))));
    }

    #[test]
    fn delete_items_skips_locked_clips_and_ignores_unknown_ids() {
        let doc = empty_doc();
        let doc = add_media(&doc, "c1", 0, 1_000_000);
        let doc = add_media(&doc, "c2", 1_000_000, 1_000_000);
        let doc = update_clip_properties(
            &doc,
            "v1",
            "c1",
            &ClipPatch {
                locked: Some(true),
                ..Default::default()
            },
        )
        .expect("lock");

        let doc = delete_items(
            &doc,
            &["c1".to_string(), "c2".to_string(), "nope".to_string()],
        )
        .expect("delete should succeed");

        assert!(doc.tracks[0].clip("c1").is_ok());
        assert!(doc.tracks[0].clip("c2").is_err());
    }

    #[test]
    fn speed_change_ripples_downstream_instead_of_failing() {
        let doc = empty_doc();
        let doc = add_media(&doc, "c1", 0, 1_000_000);
        let doc = add_media(&doc, "c2", 1_000_000, 1_000_000);

        // Half speed doubles the clip duration; c2 must slide right.
        let doc = update_clip_properties(
            &doc,
            "v1",
            "c1",
            &ClipPatch {
                speed: Some(0.5),
                ..Default::default()
            },
        )
        .expect("speed change should succeed");

        let c1 = doc.tracks[0].clip("c1").expect("c1 exists");
        let c2 = doc.tracks[0].clip("c2").expect("c2 exists");
        assert_eq!(c1.timeline_range.duration_us, 2_000_000);
        assert_eq!(c2.timeline_range.start_us, 2_000_000);
    }

    #[test]
    fn transition_extends_left_clip_and_writes_both_sides() {
        let doc = empty_doc();
        // Leave source handle beyond the visible range: visible 1s of a 5s file.
        let doc = add_media(&doc, "c1", 0, 5_000_000);
        let doc = trim_item(&doc, "v1", "c1", Edge::End, -4_000_000).expect("trim");
        let doc = add_media(&doc, "c2", 1_000_000, 1_000_000);

        let doc = update_clip_transition(
            &doc,
            "v1",
            "c1",
            TransitionEdge::Out,
            Some(&TransitionSpec {
                kind: "crossfade".to_string(),
                duration_us: 400_000,
                mode: TransitionMode::Blend,
                curve: "linear".to_string(),
            }),
        )
        .expect("transition should succeed");

        let c1 = doc.tracks[0].clip("c1").expect("c1");
        let c2 = doc.tracks[0].clip("c2").expect("c2");
        let out = c1.transition_out.as_ref().expect("transition out set");
        let into = c2.transition_in.as_ref().expect("transition in set");
        assert_eq!(out.duration_us, into.duration_us);
        assert!(out.duration_us > 0);
        assert_eq!(
            c1.timeline_range.end_us() - c2.timeline_range.start_us,
            out.duration_us
        );
    }

    #[test]
    fn clearing_transition_restores_left_clip_duration() {
        let doc = empty_doc();
        let doc = add_media(&doc, "c1", 0, 5_000_000);
        let doc = trim_item(&doc, "v1", "c1", Edge::End, -4_000_000).expect("trim");
        let doc = add_media(&doc, "c2", 1_000_000, 1_000_000);
        let with_fade = update_clip_transition(
            &doc,
            "v1",
            "c1",
            TransitionEdge::Out,
            Some(&TransitionSpec {
                kind: "crossfade".to_string(),
                duration_us: 400_000,
                mode: TransitionMode::Blend,
                curve: "linear".to_string(),
            }),
        )
        .expect("set transition");

        let cleared =
            update_clip_transition(&with_fade, "v1", "c1", TransitionEdge::Out, None)
                .expect("clear transition");

        let c1 = cleared.tracks[0].clip("c1").expect("c1");
        let c2 = cleared.tracks[0].clip("c2").expect("c2");
        assert_eq!(c1.timeline_range.end_us(), c2.timeline_range.start_us);
        assert!(c1.transition_out.is_none());
        assert!(c2.transition_in.is_none());
    }

    #[test]
    fn transition_is_bounded_by_source_handle() {
        let doc = empty_doc();
        // No handle at all: the whole file is visible.
        let doc = add_media(&doc, "c1", 0, 1_000_000);
        let doc = add_media(&doc, "c2", 1_000_000, 1_000_000);

        let doc = update_clip_transition(
            &doc,
            "v1",
            "c1",
            TransitionEdge::Out,
            Some(&TransitionSpec {
                kind: "crossfade".to_string(),
                duration_us: 400_000,
                mode: TransitionMode::Blend,
                curve: "linear".to_string(),
            }),
        )
        .expect("transition should succeed");

        let c1 = doc.tracks[0].clip("c1").expect("c1");
        assert!(c1.transition_out.is_none());
        assert_eq!(c1.timeline_range.end_us(), 1_000_000);
    }

    #[test]
    fn transition_is_rejected_when_cut_partner_is_locked() {
        let doc = empty_doc();
        let doc = add_media(&doc, "c1", 0, 5_000_000);
        let doc = trim_item(&doc, "v1", "c1", Edge::End, -4_000_000).expect("trim");
        let doc = add_media(&doc, "c2", 1_000_000, 1_000_000);
        let doc = update_clip_properties(
            &doc,
            "v1",
            "c1",
            &ClipPatch {
                locked: Some(true),
                ..Default::default()
            },
        )
        .expect("lock");

        // c2 itself is unlocked, but a fade-in would extend locked c1.
        let result = update_clip_transition(
            &doc,
            "v1",
            "c2",
            TransitionEdge::In,
            Some(&TransitionSpec {
                kind: "crossfade".to_string(),
                duration_us: 400_000,
                mode: TransitionMode::Blend,
                curve: "linear".to_string(),
            }),
        );

        assert!(matches!(
            result,
            Err(EngineError::LockedClip { item_id }) if item_id == "c1"
        ));
        let c1 = doc.tracks[0].clip("c1").expect("c1");
        assert_eq!(c1.timeline_range, TimeRange::new(0, 1_000_000));
        assert!(c1.transition_out.is_none());
    }

    #[test]
    fn clearing_transition_is_rejected_when_cut_partner_is_locked() {
        let doc = empty_doc();
        let doc = add_media(&doc, "c1", 0, 5_000_000);
        let doc = trim_item(&doc, "v1", "c1", Edge::End, -4_000_000).expect("trim");
        let doc = add_media(&doc, "c2", 1_000_000, 1_000_000);
        let doc = update_clip_transition(
            &doc,
            "v1",
            "c1",
            TransitionEdge::Out,
            Some(&TransitionSpec {
                kind: "crossfade".to_string(),
                duration_us: 400_000,
                mode: TransitionMode::Blend,
                curve: "linear".to_string(),
            }),
        )
        .expect("set transition");
        let doc = update_clip_properties(
            &doc,
            "v1",
            "c1",
            &ClipPatch {
                locked: Some(true),
                ..Default::default()
            },
        )
        .expect("lock");

        let result = update_clip_transition(&doc, "v1", "c2", TransitionEdge::In, None);
        assert!(matches!(
            result,
            Err(EngineError::LockedClip { item_id }) if item_id == "c1"
        ));
    }

    #[test]
    fn overlay_place_deletes_fully_covered_clip() {
        let doc = empty_doc();
        let doc = add_media(&doc, "victim", 0, 1_000_000);
        let doc = add_media(&doc, "mover", 2_000_000, 1_000_000);

        let doc = overlay_place_item(&doc, "v1", "mover", 0, None).expect("overlay place");

        assert!(doc.tracks[0].clip("victim").is_err());
        let mover = doc.tracks[0].clip("mover").expect("mover exists");
        assert_eq!(mover.timeline_range, TimeRange::new(0, 1_000_000));
    }

    #[test]
    fn overlay_place_truncates_partially_covered_neighbors() {
        let doc = empty_doc();
        let doc = add_media(&doc, "left", 0, 1_000_000);
        let doc = add_media(&doc, "right", 1_000_000, 1_000_000);
        let doc = add_media(&doc, "mover", 3_000_000, 1_000_000);

        let doc = overlay_place_item(&doc, "v1", "mover", 500_000, None).expect("overlay place");

        let left = doc.tracks[0].clip("left").expect("left exists");
        assert_eq!(left.timeline_range, TimeRange::new(0, 500_000));
        assert_eq!(left.source_range.duration_us, 500_000);

        let right = doc.tracks[0].clip("right").expect("right exists");
        assert_eq!(right.timeline_range, TimeRange::new(1_500_000, 500_000));
        assert_eq!(right.source_range, TimeRange::new(500_000, 500_000));
    }

    #[test]
    fn overlay_place_splits_surrounding_clip_into_fragments() {
        let doc = empty_doc();
        let doc = add_media(&doc, "victim", 0, 2_000_000);
        let doc = add_media(&doc, "mover", 3_000_000, 400_000);

        let doc = overlay_place_item(&doc, "v1", "mover", 800_000, None).expect("overlay place");

        let clips: Vec<_> = doc.tracks[0].clips().collect();
        assert_eq!(clips.len(), 3);

        assert_eq!(clips[0].id, "victim");
        assert_eq!(clips[0].timeline_range, TimeRange::new(0, 800_000));
        assert_eq!(clips[0].source_range, TimeRange::new(0, 800_000));
        assert!(clips[0].transition_out.is_none());

        assert_eq!(clips[1].id, "mover");
        assert_eq!(clips[1].timeline_range, TimeRange::new(800_000, 400_000));

        // The right fragment keeps the tail of the victim's source under
        // a fresh id.
        assert_ne!(clips[2].id, "victim");
        assert_eq!(clips[2].timeline_range, TimeRange::new(1_200_000, 800_000));
        assert_eq!(clips[2].source_range, TimeRange::new(1_200_000, 800_000));
        assert!(clips[2].transition_in.is_none());
    }

    #[test]
    fn overlay_place_moves_clip_onto_another_track() {
        let mut doc = empty_doc();
        doc.tracks
            .push(TimelineTrack::new("v2".to_string(), TrackKind::Video, "V2"));
        let doc = add_media(&doc, "mover", 0, 1_000_000);
        let doc = add_clip_to_track(
            &doc,
            "v2",
            "victim",
            "demo.mp4",
            1_000_000,
            Some(0),
            false,
            Some("victim"),
        )
        .expect("add victim");

        let doc = overlay_place_item(&doc, "v1", "mover", 0, Some("v2")).expect("overlay place");

        assert!(doc.tracks[0].clip("mover").is_err());
        assert!(doc.tracks[2].clip("victim").is_err());
        let mover = doc.tracks[2].clip("mover").expect("mover on target track");
        assert_eq!(mover.track_id, "v2");
        assert_eq!(mover.timeline_range, TimeRange::new(0, 1_000_000));
    }

    #[test]
    fn dangling_audio_link_no_longer_locks_the_clip() {
        let doc = empty_doc();
        let doc = add_media(&doc, "vc", 0, 2_000_000);
        let doc = extract_audio_to_track(&doc, "vc", "a1").expect("extract");
        let audio_id = doc.linked_audio_clips("vc")[0].id.clone();

        let while_linked = trim_item(&doc, "a1", &audio_id, Edge::End, -500_000);
        assert!(matches!(while_linked, Err(EngineError::LockedClip { .. })));

        let doc = delete_items(&doc, &["vc".to_string()]).expect("delete video");
        let doc = trim_item(&doc, "a1", &audio_id, Edge::End, -500_000)
            .expect("orphaned mirror should trim");

        let audio = doc.tracks[1].clip(&audio_id).expect("audio exists");
        assert_eq!(audio.timeline_range.duration_us, 1_500_000);
    }

    #[test]
    fn overlay_trim_consumes_fully_covered_clip() {
        let doc = empty_doc();
        let doc = add_media(&doc, "mover", 0, 1_000_000);
        let doc = trim_item(&doc, "v1", "mover", Edge::End, -500_000).expect("shrink mover");
        let doc = add_media(&doc, "victim", 500_000, 300_000);

        // Extend mover's end over the whole victim.
        let doc =
            overlay_trim_item(&doc, "v1", "mover", Edge::End, 500_000).expect("overlay trim");

        assert!(doc.tracks[0].clip("victim").is_err());
        let mover = doc.tracks[0].clip("mover").expect("mover exists");
        assert_eq!(mover.timeline_range.duration_us, 1_000_000);
    }
}
