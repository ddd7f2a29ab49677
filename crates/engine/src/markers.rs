use tracing::info;

use crate::command::MarkerPatch;
use crate::error::{EngineError, Result};
use crate::model::{Marker, TimelineDocument};

fn sort_markers(markers: &mut [Marker]) {
    markers.sort_by(|a, b| a.time_us.cmp(&b.time_us).then_with(|| a.id.cmp(&b.id)));
}

/// Adds a marker; duplicate ids are rejected.
pub fn add_marker(doc: &TimelineDocument, marker: &Marker) -> Result<TimelineDocument> {
    if doc.markers.iter().any(|existing| existing.id == marker.id) {
        return Err(EngineError::MarkerAlreadyExists {
            marker_id: marker.id.clone(),
        });
    }
    let mut next = doc.clone();
    let mut marker = marker.clone();
    marker.time_us = marker.time_us.max(0);
    next.markers.push(marker);
    sort_markers(&mut next.markers);
    info!(marker_count = next.markers.len(), "marker added");
    Ok(next)
}

/// Patches an existing marker; missing ids are rejected.
pub fn update_marker(
    doc: &TimelineDocument,
    marker_id: &str,
    patch: &MarkerPatch,
) -> Result<TimelineDocument> {
    let mut next = doc.clone();
    let marker = next
        .markers
        .iter_mut()
        .find(|marker| marker.id == marker_id)
        .ok_or_else(|| EngineError::MarkerNotFound {
            marker_id: marker_id.to_string(),
        })?;

    if let Some(time_us) = patch.time_us {
        marker.time_us = time_us.max(0);
    }
    if let Some(name) = &patch.name {
        marker.name = name.clone();
    }
    if let Some(color) = &patch.color {
        marker.color = color.clone();
    }
    sort_markers(&mut next.markers);
    Ok(next)
}

/// Removes a marker; a missing id is a no-op.
pub fn remove_marker(doc: &TimelineDocument, marker_id: &str) -> Result<TimelineDocument> {
    if !doc.markers.iter().any(|marker| marker.id == marker_id) {
        return Ok(doc.clone());
    }
    let mut next = doc.clone();
    next.markers.retain(|marker| marker.id != marker_id);
    Ok(next)
}
