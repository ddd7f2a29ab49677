use std::fmt::{Display, Formatter};

/// Result type used by the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Business-rule violations raised by command handlers.
///
/// Every error is raised before a new document value is assembled, so a
/// failed command always leaves the caller's document unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    TrackNotFound {
        track_id: String,
    },
    ItemNotFound {
        item_id: String,
    },
    ItemOverlap {
        item_id: String,
        other_id: String,
    },
    LockedClip {
        item_id: String,
    },
    TrackAlreadyExists {
        track_id: String,
    },
    TrackNotEmpty {
        track_id: String,
    },
    SplitPointOutOfRange {
        item_id: String,
        at_us: i64,
    },
    MarkerAlreadyExists {
        marker_id: String,
    },
    MarkerNotFound {
        marker_id: String,
    },
    NotAMediaVideoClip {
        item_id: String,
    },
    TrackKindMismatch {
        track_id: String,
    },
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TrackNotFound { track_id } => write!(f, "track not found: {track_id}"),
            Self::ItemNotFound { item_id } => write!(f, "item not found: {item_id}"),
            Self::ItemOverlap { item_id, other_id } => {
                write!(f, "item {item_id} overlaps item {other_id}")
            }
            Self::LockedClip { item_id } => write!(f, "clip is locked: {item_id}"),
            Self::TrackAlreadyExists { track_id } => {
                write!(f, "track already exists: {track_id}")
            }
            Self::TrackNotEmpty { track_id } => {
                write!(f, "track is not empty: {track_id}")
            }
            Self::SplitPointOutOfRange { item_id, at_us } => {
                write!(f, "split point {at_us} is outside item {item_id}")
            }
            Self::MarkerAlreadyExists { marker_id } => {
                write!(f, "marker already exists: {marker_id}")
            }
            Self::MarkerNotFound { marker_id } => write!(f, "marker not found: {marker_id}"),
            Self::NotAMediaVideoClip { item_id } => {
                write!(f, "item {item_id} is not a media clip on a video track")
            }
            Self::TrackKindMismatch { track_id } => {
                write!(f, "track {track_id} has an incompatible kind for this item")
            }
        }
    }
}

impl std::error::Error for EngineError {}
