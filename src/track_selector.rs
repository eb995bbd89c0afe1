//! Next-track selection: claim from the shared queue, or pick filler from the library.
//!
//! Store failures are logged here and read as "nothing this cycle"; callers never
//! see a storage error.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, error, info, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::media_file_discovery::{collect_library_tracks, quick_title};
use crate::protocol::{QueuedPlay, SelectionMode, Track};
use crate::queue_store::QueueStore;

pub struct TrackSelector {
    store: QueueStore,
    library_root: PathBuf,
    mode: SelectionMode,
    rng: StdRng,
}

fn os_seed() -> [u8; 32] {
    let mut seed = [0u8; 32];
    if let Err(err) = getrandom::fill(&mut seed) {
        warn!("TrackSelector: OS randomness unavailable, seeding from clock: {}", err);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|value| value.as_nanos())
            .unwrap_or(0);
        seed[..16].copy_from_slice(&nanos.to_le_bytes());
    }
    seed
}

impl TrackSelector {
    pub fn new(store: QueueStore, library_root: PathBuf) -> Self {
        Self::with_seed(store, library_root, os_seed())
    }

    pub fn with_seed(store: QueueStore, library_root: PathBuf, seed: [u8; 32]) -> Self {
        Self {
            store,
            library_root,
            mode: SelectionMode::User,
            rng: StdRng::from_seed(seed),
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn library_root(&self) -> &Path {
        &self.library_root
    }

    /// Oldest pending queue row, read-only.
    pub fn peek_pending(&self) -> Option<QueuedPlay> {
        match self.store.peek_pending() {
            Ok(play) => play.filter(QueuedPlay::is_pending),
            Err(err) => {
                error!("TrackSelector: peek_pending failed: {}", err);
                None
            }
        }
    }

    /// Claims the oldest pending row and does the catalog bookkeeping for it.
    /// A bookkeeping failure is logged; the claim still stands.
    pub fn claim_next(&mut self) -> Option<Track> {
        let play = match self.store.claim_next() {
            Ok(Some(play)) => play,
            Ok(None) => return None,
            Err(err) => {
                error!("TrackSelector: claim_next failed: {}", err);
                return None;
            }
        };
        self.mode = SelectionMode::User;
        info!(
            "TrackSelector: claimed play {} '{}' ({})",
            play.id, play.title, play.filename
        );

        if let (Some(song_id), Some(played_at)) = (play.song_id, play.played_at.as_deref()) {
            self.record_song_play(play.id, song_id, played_at);
        }
        Some(Track::from_claim(&play))
    }

    fn record_song_play(&self, play_id: i64, song_id: i64, played_at: &str) {
        match self.store.record_song_play(song_id, played_at) {
            Ok(0) => warn!(
                "TrackSelector: song {} for play {} is not in the catalog; play count not updated",
                song_id, play_id
            ),
            Ok(_) => match self.store.catalog_entry(song_id) {
                Ok(Some(entry)) => debug!(
                    "TrackSelector: song {} '{}' play_count={}",
                    entry.id, entry.title, entry.play_count
                ),
                Ok(None) => {}
                Err(err) => debug!("TrackSelector: could not re-read song {}: {}", song_id, err),
            },
            Err(err) => error!(
                "TrackSelector: failed to record play of song {} (play {}): {}",
                song_id, play_id, err
            ),
        }
    }

    /// Removes the queue row behind `track`. Fallback picks have no row.
    pub fn complete(&self, track: &Track) {
        let Some(play_id) = track.play_id() else {
            return;
        };
        match self.store.delete_play(play_id) {
            Ok(0) => debug!("TrackSelector: play {} was already removed", play_id),
            Ok(_) => debug!("TrackSelector: completed play {}", play_id),
            Err(err) => error!(
                "TrackSelector: failed to mark play {} ({}) done: {}",
                play_id, track.filename, err
            ),
        }
    }

    /// Picks a uniformly random `.mp3`/`.ogg` file under the library root and
    /// switches to auto mode, whether or not anything was found.
    pub fn random_fallback(&mut self) -> Option<Track> {
        self.mode = SelectionMode::Auto;

        let tracks = collect_library_tracks(&self.library_root);
        if tracks.is_empty() {
            debug!(
                "TrackSelector: no playable files under {}",
                self.library_root.display()
            );
            return None;
        }
        let path = &tracks[self.rng.random_range(0..tracks.len())];
        let filename = path.to_string_lossy().to_string();
        let title = quick_title(&filename);
        Some(Track::fallback(filename, title))
    }

    /// Deletes rows a previous run left in-progress. Returns how many were removed.
    pub fn purge_stale_claims(&self) -> usize {
        let ids = match self.store.in_progress_ids() {
            Ok(ids) => ids,
            Err(err) => {
                error!("TrackSelector: could not list stale claims: {}", err);
                return 0;
            }
        };
        let mut removed = 0;
        for play_id in ids {
            match self.store.delete_play(play_id) {
                Ok(count) => removed += count,
                Err(err) => error!("TrackSelector: failed to purge play {}: {}", play_id, err),
            }
        }
        if removed > 0 {
            info!("TrackSelector: purged {} stale in-progress plays", removed);
        }
        removed
    }
}

#[cfg(test)]
impl TrackSelector {
    pub fn store(&self) -> &QueueStore {
        &self.store
    }
}
