//! Value types shared by the selector, playback engine, and stream connection.
//!
//! Queue rows and fallback picks travel through the engine as a single `Track`
//! whose `origin` records whether a persisted queue row backs it.

use std::path::Path;

/// Pending or in-progress row of the shared `queue` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedPlay {
    pub id: i64,
    pub filename: String,
    pub title: String,
    /// Catalog row this play was queued from, if any.
    pub song_id: Option<i64>,
    /// SQLite datetime text; set while the row is pending.
    pub queued_at: Option<String>,
    /// SQLite datetime text; set once the engine has claimed the row.
    pub played_at: Option<String>,
}

impl QueuedPlay {
    pub fn is_pending(&self) -> bool {
        self.queued_at.is_some() && self.played_at.is_none()
    }
}

#[cfg(test)]
impl QueuedPlay {
    pub fn is_in_progress(&self) -> bool {
        self.played_at.is_some()
    }
}

/// Row of the shared `songs` catalog table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: i64,
    pub filename: String,
    pub title: String,
    pub play_count: i64,
    pub last_played_at: Option<String>,
}

/// Where a track handed to the playback engine came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOrigin {
    /// A claimed queue row; completing the track deletes this row.
    Queue { play_id: i64, song_id: Option<i64> },
    /// A random library pick that only exists for one playback.
    Fallback,
}

/// One playable item, either claimed from the queue or picked from the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Path relative to the library root.
    pub filename: String,
    pub title: String,
    pub origin: TrackOrigin,
}

impl Track {
    pub fn from_claim(play: &QueuedPlay) -> Self {
        Self {
            filename: play.filename.clone(),
            title: play.title.clone(),
            origin: TrackOrigin::Queue {
                play_id: play.id,
                song_id: play.song_id,
            },
        }
    }

    pub fn fallback(filename: String, title: String) -> Self {
        Self {
            filename,
            title,
            origin: TrackOrigin::Fallback,
        }
    }

    pub fn play_id(&self) -> Option<i64> {
        match self.origin {
            TrackOrigin::Queue { play_id, .. } => Some(play_id),
            TrackOrigin::Fallback => None,
        }
    }

    pub fn format(&self) -> StreamFormat {
        StreamFormat::from_filename(&self.filename)
    }

    /// Short label for log lines.
    pub fn describe(&self) -> String {
        match self.origin {
            TrackOrigin::Queue { play_id, .. } => {
                format!("play {} '{}' ({})", play_id, self.title, self.filename)
            }
            TrackOrigin::Fallback => format!("fallback '{}' ({})", self.title, self.filename),
        }
    }
}

/// Who chose the most recent track. Governs the queue-jump interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// The track came from the user-populated queue.
    #[default]
    User,
    /// The track is filler picked at random from the library.
    Auto,
}

/// Audio container announced to the broadcast destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamFormat {
    #[default]
    Mp3,
    Ogg,
}

impl StreamFormat {
    /// `.ogg` selects OGG; every other or missing extension selects MP3.
    /// The match is case-sensitive, so `.OGG` streams as MP3.
    pub fn from_filename(filename: &str) -> Self {
        let is_ogg = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "ogg");
        if is_ogg {
            StreamFormat::Ogg
        } else {
            StreamFormat::Mp3
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            StreamFormat::Mp3 => "audio/mpeg",
            StreamFormat::Ogg => "application/ogg",
        }
    }

    pub fn supports_metadata(self) -> bool {
        self == StreamFormat::Mp3
    }
}

impl std::fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamFormat::Mp3 => write!(f, "MP3"),
            StreamFormat::Ogg => write!(f, "OGG"),
        }
    }
}

/// Per-track tags attached to an MP3 stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub song: String,
    pub filename: String,
}

/// Result of one `PlaybackEngine::play` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Every byte of the file was handed to the connection.
    Completed,
    /// The file did not exist; nothing was sent.
    Skipped,
    /// Filler playback was abandoned because a queue row appeared.
    Interrupted,
    /// No track was available from any source; the engine slept.
    Idle,
}

impl PlaybackOutcome {
    /// Outcomes after which a claimed queue row is removed.
    pub fn concludes_claim(self) -> bool {
        matches!(
            self,
            PlaybackOutcome::Completed | PlaybackOutcome::Skipped | PlaybackOutcome::Interrupted
        )
    }
}

/// What happened to a single chunk handed to `StreamConnection::send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// The write failed; the connection was re-established and the chunk discarded.
    Dropped,
}
