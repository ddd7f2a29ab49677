use std::collections::HashSet;

use tracing::info;

use crate::command::TrackPatch;
use crate::error::{EngineError, Result};
use crate::model::{
    MAX_AUDIO_BALANCE, MAX_AUDIO_GAIN, MIN_AUDIO_BALANCE, MIN_AUDIO_GAIN, TimelineDocument,
    TimelineTrack, TrackControls, TrackKind, unique_item_id,
};

/// Inserts a new track: video tracks go to the top, audio tracks to
/// the bottom, so video always precedes audio in document order.
pub fn add_track(
    doc: &TimelineDocument,
    kind: TrackKind,
    name: &str,
    id: Option<&str>,
) -> Result<TimelineDocument> {
    let used: HashSet<String> = doc.tracks.iter().map(|track| track.id.clone()).collect();
    let id = match id {
        Some(id) => {
            if used.contains(id) {
                return Err(EngineError::TrackAlreadyExists {
                    track_id: id.to_string(),
                });
            }
            id.to_string()
        }
        None => unique_item_id(&format!("track:{}:{name}", doc.id), &used),
    };

    let track = TimelineTrack::new(id.clone(), kind, name);
    let mut next = doc.clone();
    match kind {
        TrackKind::Video => next.tracks.insert(0, track),
        TrackKind::Audio => next.tracks.push(track),
    }

    info!(track_id = %id, ?kind, name, "track added");
    Ok(next)
}

pub fn rename_track(
    doc: &TimelineDocument,
    track_id: &str,
    name: &str,
) -> Result<TimelineDocument> {
    let index = doc.track_index(track_id)?;
    if doc.tracks[index].name == name {
        return Ok(doc.clone());
    }
    let mut next = doc.clone();
    next.tracks[index].name = name.to_string();
    Ok(next)
}

/// Removes a track. A track still holding clips is rejected with
/// `TrackNotEmpty` unless `force` is set.
pub fn delete_track(
    doc: &TimelineDocument,
    track_id: &str,
    force: bool,
) -> Result<TimelineDocument> {
    let index = doc.track_index(track_id)?;
    if doc.tracks[index].has_clips() && !force {
        return Err(EngineError::TrackNotEmpty {
            track_id: track_id.to_string(),
        });
    }
    let mut next = doc.clone();
    next.tracks.remove(index);
    info!(track_id, force, "track deleted");
    Ok(next)
}

/// Re-sequences tracks by a caller-supplied id order. Unknown ids are
/// dropped, omitted tracks keep their relative order at the end, and
/// the result is re-partitioned so video tracks precede audio tracks.
pub fn reorder_tracks(doc: &TimelineDocument, track_ids: &[String]) -> Result<TimelineDocument> {
    let mut ordered: Vec<TimelineTrack> = Vec::with_capacity(doc.tracks.len());
    let mut seen: HashSet<&str> = HashSet::new();
    for id in track_ids {
        if let Some(track) = doc.tracks.iter().find(|track| &track.id == id) {
            if seen.insert(track.id.as_str()) {
                ordered.push(track.clone());
            }
        }
    }
    for track in &doc.tracks {
        if !seen.contains(track.id.as_str()) {
            ordered.push(track.clone());
        }
    }

    // Stable partition: video before audio, relative order preserved.
    let mut partitioned: Vec<TimelineTrack> = Vec::with_capacity(ordered.len());
    partitioned.extend(
        ordered
            .iter()
            .filter(|track| track.kind == TrackKind::Video)
            .cloned(),
    );
    partitioned.extend(
        ordered
            .into_iter()
            .filter(|track| track.kind == TrackKind::Audio),
    );

    let mut next = doc.clone();
    next.tracks = partitioned;
    Ok(next)
}

/// Patches kind-specific track flags. Flags that do not apply to the
/// track's kind are ignored; gain and balance are clamped.
pub fn update_track_properties(
    doc: &TimelineDocument,
    track_id: &str,
    patch: &TrackPatch,
) -> Result<TimelineDocument> {
    let index = doc.track_index(track_id)?;
    let mut next = doc.clone();
    let track = &mut next.tracks[index];

    match &mut track.controls {
        TrackControls::Video { hidden } => {
            if let Some(video_hidden) = patch.video_hidden {
                *hidden = video_hidden;
            }
        }
        TrackControls::Audio {
            muted,
            solo,
            gain,
            balance,
        } => {
            if let Some(audio_muted) = patch.audio_muted {
                *muted = audio_muted;
            }
            if let Some(audio_solo) = patch.audio_solo {
                *solo = audio_solo;
            }
            if let Some(audio_gain) = patch.audio_gain {
                *gain = if audio_gain.is_finite() {
                    audio_gain.clamp(MIN_AUDIO_GAIN, MAX_AUDIO_GAIN)
                } else {
                    MIN_AUDIO_GAIN
                };
            }
            if let Some(audio_balance) = patch.audio_balance {
                *balance = if audio_balance.is_finite() {
                    audio_balance.clamp(MIN_AUDIO_BALANCE, MAX_AUDIO_BALANCE)
                } else {
                    0.0
                };
            }
        }
    }
    if let Some(effects) = &patch.effects {
        track.effects = effects.clone();
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::{add_track, delete_track, reorder_tracks, rename_track, update_track_properties};
    use crate::command::TrackPatch;
    use crate::error::EngineError;
    use crate::model::{TimelineDocument, TrackControls, TrackKind};

    fn doc() -> TimelineDocument {
        TimelineDocument::default_document()
    }

    #[test]
    fn video_track_is_added_at_the_top() {
        let doc = doc();
        let next = add_track(&doc, TrackKind::Video, "V3", Some("v3")).expect("add should succeed");
        assert_eq!(next.tracks[0].id, "v3");
        assert_eq!(next.tracks.len(), doc.tracks.len() + 1);
    }

    #[test]
    fn audio_track_is_added_at_the_bottom() {
        let doc = doc();
        let next = add_track(&doc, TrackKind::Audio, "A3", Some("a3")).expect("add should succeed");
        assert_eq!(next.tracks.last().map(|track| track.id.as_str()), Some("a3"));
    }

    #[test]
    fn duplicate_track_id_is_rejected() {
        let doc = doc();
        let existing = doc.tracks[0].id.clone();
        let result = add_track(&doc, TrackKind::Video, "V3", Some(&existing));
        assert!(matches!(
            result,
            Err(EngineError::TrackAlreadyExists { .. })
        ));
    }

    #[test]
    fn rename_unknown_track_is_rejected() {
        let doc = doc();
        let result = rename_track(&doc, "missing", "name");
        assert!(matches!(result, Err(EngineError::TrackNotFound { .. })));
    }

    #[test]
    fn delete_empty_track_succeeds() {
        let doc = doc();
        let id = doc.tracks[0].id.clone();
        let next = delete_track(&doc, &id, false).expect("delete should succeed");
        assert_eq!(next.tracks.len(), doc.tracks.len() - 1);
    }

    #[test]
    fn reorder_partitions_video_before_audio() {
        let doc = doc();
        // Ask for an audio track first; the partition must win.
        let audio_id = doc
            .tracks
            .iter()
            .find(|track| track.kind == TrackKind::Audio)
            .map(|track| track.id.clone())
            .expect("default document has audio tracks");

        let next = reorder_tracks(&doc, &[audio_id]).expect("reorder should succeed");

        let first_audio = next
            .tracks
            .iter()
            .position(|track| track.kind == TrackKind::Audio)
            .expect("audio track present");
        assert!(next.tracks[..first_audio]
            .iter()
            .all(|track| track.kind == TrackKind::Video));
        assert_eq!(next.tracks.len(), doc.tracks.len());
    }

    #[test]
    fn reorder_drops_unknown_ids_and_keeps_all_tracks() {
        let doc = doc();
        let next =
            reorder_tracks(&doc, &["nope".to_string()]).expect("reorder should succeed");
        assert_eq!(next.tracks.len(), doc.tracks.len());
    }

    #[test]
    fn track_patch_clamps_gain_and_ignores_wrong_kind_flags() {
        let doc = doc();
        let audio_id = doc
            .tracks
            .iter()
            .find(|track| track.kind == TrackKind::Audio)
            .map(|track| track.id.clone())
            .expect("audio track present");

        let next = update_track_properties(
            &doc,
            &audio_id,
            &TrackPatch {
                audio_gain: Some(5.0),
                video_hidden: Some(true),
                ..Default::default()
            },
        )
        .expect("patch should succeed");

        let track = next.track(&audio_id).expect("track present");
        let TrackControls::Audio { gain, .. } = &track.controls else {
            panic!("audio track must carry audio controls");
        };
        assert_eq!(*gain, 2.0);
    }
}
