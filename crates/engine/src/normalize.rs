use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::model::{Clip, Gap, TimelineTrack, TrackItem, gap_id};
use crate::time::TimeRange;

/// Checks `candidate` against every other clip in `clips`.
///
/// A temporal intersection is tolerated only as a bounded crossfade: it
/// must sit exactly at the cut between the two clips (the later clip's
/// start inside the earlier clip's tail) and both sides must declare
/// matching transition durations covering the whole intersection.
pub(crate) fn assert_no_overlap(clips: &[Clip], candidate: &Clip) -> Result<()> {
    for other in clips {
        if other.id == candidate.id {
            continue;
        }
        let overlap = candidate.timeline_range.overlap_with(&other.timeline_range);
        if overlap == 0 {
            continue;
        }

        let (left, right) = if candidate.timeline_range.start_us <= other.timeline_range.start_us {
            (candidate, other)
        } else {
            (other, candidate)
        };
        if crossfade_covers(left, right, overlap) {
            debug!(
                item_id = %candidate.id,
                other_id = %other.id,
                overlap_us = overlap,
                "overlap tolerated as crossfade"
            );
            continue;
        }

        warn!(
            item_id = %candidate.id,
            other_id = %other.id,
            overlap_us = overlap,
            "overlap rejected"
        );
        return Err(EngineError::ItemOverlap {
            item_id: candidate.id.clone(),
            other_id: other.id.clone(),
        });
    }
    Ok(())
}

fn crossfade_covers(left: &Clip, right: &Clip, overlap: i64) -> bool {
    // Pure cut-point overlap: the left clip's tail reaches into the
    // right clip's head and nothing more.
    let cut_overlap = left.timeline_range.start_us < right.timeline_range.start_us
        && left.timeline_range.end_us() > right.timeline_range.start_us
        && left.timeline_range.end_us() < right.timeline_range.end_us();
    if !cut_overlap {
        return false;
    }

    match (&left.transition_out, &right.transition_in) {
        (Some(out), Some(into)) => {
            out.duration_us == into.duration_us && out.duration_us >= overlap
        }
        _ => false,
    }
}

/// Rebuilds a track's item list from clip items alone.
///
/// Clips are sorted by start time and every uncovered span between the
/// track start and the last clip becomes exactly one gap item. This is
/// the single source of truth for gap placement; handlers never
/// construct gaps themselves.
pub(crate) fn normalize_gaps(track_id: &str, mut clips: Vec<Clip>) -> Vec<TrackItem> {
    clips.sort_by(|a, b| {
        a.timeline_range
            .start_us
            .cmp(&b.timeline_range.start_us)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut items = Vec::with_capacity(clips.len() * 2);
    let mut cursor = 0i64;
    let mut gap_index = 0usize;
    for mut clip in clips {
        clip.track_id = track_id.to_string();
        let start = clip.timeline_range.start_us;
        if start > cursor {
            items.push(TrackItem::Gap(Gap {
                id: gap_id(track_id, gap_index),
                track_id: track_id.to_string(),
                timeline_range: TimeRange::new(cursor, start - cursor),
            }));
            gap_index += 1;
        }
        cursor = cursor.max(clip.timeline_range.end_us());
        items.push(TrackItem::Clip(clip));
    }

    debug!(track_id, item_count = items.len(), gap_count = gap_index, "track normalized");
    items
}

/// Returns a copy of `track` whose items are the normalized form of `clips`.
pub(crate) fn with_normalized_items(track: &TimelineTrack, clips: Vec<Clip>) -> TimelineTrack {
    let mut next = track.clone();
    next.items = normalize_gaps(&track.id, clips);
    next
}

/// Extracts the clip items of a track, dropping synthesized gaps.
pub(crate) fn clips_of(track: &TimelineTrack) -> Vec<Clip> {
    track.clips().cloned().collect()
}
