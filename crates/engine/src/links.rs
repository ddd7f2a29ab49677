use tracing::info;

use crate::error::{EngineError, Result};
use crate::model::{Clip, ClipKind, TimelineDocument, TrackKind, unique_item_id};
use crate::normalize::{assert_no_overlap, clips_of, with_normalized_items};

/// Re-mirrors every locked linked audio clip onto its video clip.
///
/// Called at the end of any handler that may have changed a video
/// clip's placement. Audio clips whose linked video no longer exists
/// are left untouched (the link is a weak reference). A mirrored clip
/// that would land on an unrelated clip fails the whole command with
/// `ItemOverlap`, so the caller's document stays consistent.
pub(crate) fn mirror_locked_audio(mut doc: TimelineDocument) -> Result<TimelineDocument> {
    let mut targets = Vec::new();
    for track in &doc.tracks {
        for clip in track.clips() {
            if let Some(video_id) = clip.locked_link() {
                if let Some((_, video)) = doc.find_clip(video_id) {
                    targets.push((
                        clip.id.clone(),
                        video.timeline_range,
                        video.source_range,
                        video.speed,
                    ));
                }
            }
        }
    }
    if targets.is_empty() {
        return Ok(doc);
    }

    for index in 0..doc.tracks.len() {
        let track = &doc.tracks[index];
        let mut clips = clips_of(track);
        let mut changed = false;
        for clip in &mut clips {
            let Some((_, timeline_range, source_range, speed)) =
                targets.iter().find(|(id, ..)| *id == clip.id)
            else {
                continue;
            };
            if clip.timeline_range != *timeline_range
                || clip.source_range != *source_range
                || clip.speed != *speed
            {
                clip.timeline_range = *timeline_range;
                clip.source_range = *source_range;
                clip.speed = *speed;
                changed = true;
            }
        }
        if !changed {
            continue;
        }

        // Mirrored clips may legitimately overlap each other when their
        // video clips crossfade; only collisions with unrelated clips
        // are structural conflicts.
        let unrelated: Vec<Clip> = clips
            .iter()
            .filter(|clip| clip.locked_link().is_none())
            .cloned()
            .collect();
        for clip in &clips {
            if clip.locked_link().is_some() {
                assert_no_overlap(&unrelated, clip)?;
            }
        }
        doc.tracks[index] = with_normalized_items(track, clips);
    }
    Ok(doc)
}

/// Creates a locked audio clip on `audio_track_id` mirroring the
/// embedded audio of the given video clip, and disables the video
/// clip's own audio contribution. A second extraction while a lock
/// already exists is a no-op.
pub fn extract_audio_to_track(
    doc: &TimelineDocument,
    video_clip_id: &str,
    audio_track_id: &str,
) -> Result<TimelineDocument> {
    let (video_track, video) =
        doc.find_clip(video_clip_id)
            .ok_or_else(|| EngineError::ItemNotFound {
                item_id: video_clip_id.to_string(),
            })?;
    let ClipKind::Media { source, .. } = &video.kind else {
        return Err(EngineError::NotAMediaVideoClip {
            item_id: video_clip_id.to_string(),
        });
    };
    if video_track.kind != TrackKind::Video {
        return Err(EngineError::NotAMediaVideoClip {
            item_id: video_clip_id.to_string(),
        });
    }
    let audio_track = doc.track(audio_track_id)?;
    if audio_track.kind != TrackKind::Audio {
        return Err(EngineError::TrackKindMismatch {
            track_id: audio_track_id.to_string(),
        });
    }

    if !doc.linked_audio_clips(video_clip_id).is_empty() {
        return Ok(doc.clone());
    }

    let used = doc.used_item_ids();
    let mut audio_clip = Clip::new(
        unique_item_id(&format!("{video_clip_id}:audio"), &used),
        audio_track.id.clone(),
        &format!("{} audio", video.name),
        ClipKind::Media {
            source: source.clone(),
            audio: Default::default(),
            linked_video_clip_id: Some(video_clip_id.to_string()),
            lock_to_linked_video: true,
            audio_from_video_disabled: false,
        },
        video.timeline_range,
        video.source_range,
    );
    audio_clip.speed = video.speed;

    let audio_clips = clips_of(audio_track);
    assert_no_overlap(&audio_clips, &audio_clip)?;

    let mut next = doc.clone();
    let video_track_index = next.track_index(&video_track.id)?;
    let audio_track_index = next.track_index(audio_track_id)?;

    let mut video_clips = clips_of(&next.tracks[video_track_index]);
    for clip in &mut video_clips {
        if clip.id == video_clip_id {
            if let ClipKind::Media {
                audio_from_video_disabled,
                ..
            } = &mut clip.kind
            {
                *audio_from_video_disabled = true;
            }
        }
    }
    next.tracks[video_track_index] =
        with_normalized_items(&next.tracks[video_track_index], video_clips);

    let mut audio_clips = clips_of(&next.tracks[audio_track_index]);
    let audio_clip_id = audio_clip.id.clone();
    audio_clips.push(audio_clip);
    next.tracks[audio_track_index] =
        with_normalized_items(&next.tracks[audio_track_index], audio_clips);

    info!(
        video_clip_id,
        audio_track_id,
        audio_clip_id = %audio_clip_id,
        "audio extracted"
    );
    Ok(next)
}

/// Removes the locked audio clip(s) linked to a video clip and
/// restores the video clip's own audio contribution. The link is a
/// weak reference, so when the video clip has already been deleted the
/// stale mirrors are still removed and only the flag restore is
/// skipped.
pub fn return_audio_to_video(
    doc: &TimelineDocument,
    video_clip_id: &str,
) -> Result<TimelineDocument> {
    let video = doc.find_clip(video_clip_id).map(|(_, clip)| clip);
    let linked_ids: Vec<String> = doc
        .linked_audio_clips(video_clip_id)
        .into_iter()
        .map(|clip| clip.id.clone())
        .collect();

    let needs_flag_restore = matches!(
        video.map(|clip| &clip.kind),
        Some(ClipKind::Media {
            audio_from_video_disabled: true,
            ..
        })
    );
    if linked_ids.is_empty() && !needs_flag_restore {
        return if video.is_some() {
            Ok(doc.clone())
        } else {
            Err(EngineError::ItemNotFound {
                item_id: video_clip_id.to_string(),
            })
        };
    }

    let mut next = doc.clone();
    for index in 0..next.tracks.len() {
        let track = &next.tracks[index];
        let mut clips = clips_of(track);
        let before = clips.len();
        clips.retain(|clip| !linked_ids.contains(&clip.id));
        let mut changed = clips.len() != before;
        for clip in &mut clips {
            if clip.id == video_clip_id {
                if let ClipKind::Media {
                    audio_from_video_disabled,
                    ..
                } = &mut clip.kind
                {
                    if *audio_from_video_disabled {
                        *audio_from_video_disabled = false;
                        changed = true;
                    }
                }
            }
        }
        if changed {
            next.tracks[index] = with_normalized_items(track, clips);
        }
    }

    info!(video_clip_id, removed = linked_ids.len(), "audio returned to video");
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::{extract_audio_to_track, return_audio_to_video};
    use crate::error::EngineError;
    use crate::items::delete_items;
    use crate::model::{
        Clip, ClipKind, MediaSource, TimelineDocument, TimelineTrack, TrackKind, stable_id,
    };
    use crate::normalize::with_normalized_items;
    use crate::time::TimeRange;

    fn media_clip(id: &str, track_id: &str, start_us: i64, duration_us: i64) -> Clip {
        Clip::new(
            id.to_string(),
            track_id.to_string(),
            id,
            ClipKind::Media {
                source: MediaSource {
                    path: "demo.mp4".to_string(),
                    duration_us: 10_000_000,
                },
                audio: Default::default(),
                linked_video_clip_id: None,
                lock_to_linked_video: false,
                audio_from_video_disabled: false,
            },
            TimeRange::new(start_us, duration_us),
            TimeRange::new(0, duration_us),
        )
    }

    fn doc_with_video_clip() -> TimelineDocument {
        let mut doc = TimelineDocument::new("test", 30.0);
        doc.tracks.push(TimelineTrack::new(
            "v1".to_string(),
            TrackKind::Video,
            "V1",
        ));
        doc.tracks.push(TimelineTrack::new(
            "a1".to_string(),
            TrackKind::Audio,
            "A1",
        ));
        let clip = media_clip("vc1", "v1", 0, 2_000_000);
        doc.tracks[0] = with_normalized_items(&doc.tracks[0], vec![clip]);
        doc
    }

    #[test]
    fn extract_creates_locked_mirror_and_disables_video_audio() {
        let doc = doc_with_video_clip();

        let next = extract_audio_to_track(&doc, "vc1", "a1").expect("extract should succeed");

        let linked = next.linked_audio_clips("vc1");
        assert_eq!(linked.len(), 1);
        let audio = linked[0];
        assert_eq!(audio.timeline_range, TimeRange::new(0, 2_000_000));
        assert_eq!(audio.locked_link(), Some("vc1"));
        assert_eq!(audio.id, stable_id("vc1:audio"));

        let (_, video) = next.find_clip("vc1").expect("video clip still present");
        assert!(matches!(
            &video.kind,
            ClipKind::Media {
                audio_from_video_disabled: true,
                ..
            }
        ));
    }

    #[test]
    fn second_extraction_is_a_no_op() {
        let doc = doc_with_video_clip();
        let once = extract_audio_to_track(&doc, "vc1", "a1").expect("first extract");
        let twice = extract_audio_to_track(&once, "vc1", "a1").expect("second extract");
        assert_eq!(once, twice);
    }

    #[test]
    fn extract_rejects_non_audio_target_track() {
        let doc = doc_with_video_clip();
        let result = extract_audio_to_track(&doc, "vc1", "v1");
        assert!(matches!(
            result,
            Err(EngineError::TrackKindMismatch { .. })
        ));
    }

    #[test]
    fn return_removes_linked_clip_and_restores_audio_flag() {
        let doc = doc_with_video_clip();
        let extracted = extract_audio_to_track(&doc, "vc1", "a1").expect("extract");

        let returned = return_audio_to_video(&extracted, "vc1").expect("return should succeed");

        assert!(returned.linked_audio_clips("vc1").is_empty());
        let (_, video) = returned.find_clip("vc1").expect("video clip present");
        assert!(matches!(
            &video.kind,
            ClipKind::Media {
                audio_from_video_disabled: false,
                ..
            }
        ));
        assert!(!returned.tracks[1].has_clips());
    }

    #[test]
    fn return_without_linked_audio_is_a_no_op() {
        let doc = doc_with_video_clip();
        let next = return_audio_to_video(&doc, "vc1").expect("return should succeed");
        assert_eq!(doc, next);
    }

    #[test]
    fn return_cleans_up_mirrors_of_a_deleted_video_clip() {
        let doc = doc_with_video_clip();
        let extracted = extract_audio_to_track(&doc, "vc1", "a1").expect("extract");
        let orphaned = delete_items(&extracted, &["vc1".to_string()]).expect("delete video");
        assert_eq!(orphaned.tracks[1].clips().count(), 1);

        let cleaned = return_audio_to_video(&orphaned, "vc1").expect("return should succeed");
        assert!(!cleaned.tracks[1].has_clips());
    }
}
