//! Streams one track at a time through the `StreamConnection`.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::thread;

use log::{debug, error, info, warn};

use crate::config::PlaybackConfig;
use crate::protocol::{Delivery, PlaybackOutcome, SelectionMode, Track, TrackMetadata};
use crate::stream_connection::{SourceClient, StreamConnection};
use crate::stream_pacer::StreamPacer;
use crate::track_selector::TrackSelector;

pub struct PlaybackEngine<C: SourceClient> {
    connection: StreamConnection<C>,
    settings: PlaybackConfig,
}

impl<C: SourceClient> PlaybackEngine<C> {
    pub fn new(connection: StreamConnection<C>, settings: PlaybackConfig) -> Self {
        Self {
            connection,
            settings,
        }
    }

    /// Plays `track` to the end, unless it is filler and a queue row shows up
    /// while interrupts are enabled. `None` sleeps the idle interval.
    pub fn play(&mut self, track: Option<&Track>, selector: &TrackSelector) -> PlaybackOutcome {
        let Some(track) = track else {
            info!(
                "PlaybackEngine: nothing to play, idling for {}s",
                self.settings.idle_interval_secs
            );
            thread::sleep(self.settings.idle_interval());
            return PlaybackOutcome::Idle;
        };

        let path = selector.library_root().join(&track.filename);
        if !path.is_file() {
            warn!(
                "PlaybackEngine: skipping {}: {} does not exist",
                track.describe(),
                path.display()
            );
            return PlaybackOutcome::Skipped;
        }
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) => {
                error!(
                    "PlaybackEngine: skipping {}: failed to open {}: {}",
                    track.describe(),
                    path.display(),
                    err
                );
                return PlaybackOutcome::Skipped;
            }
        };

        self.connection.ensure_format(track.format());
        if track.format().supports_metadata() {
            self.connection.set_track_metadata(TrackMetadata {
                song: track.title.clone(),
                filename: track.filename.clone(),
            });
        }
        info!("PlaybackEngine: now playing {}", track.describe());

        let mut pacer = self.pacer_for(&path, &file);
        self.stream_file(track, file, &mut pacer, selector)
    }

    fn pacer_for(&self, path: &Path, file: &File) -> StreamPacer {
        if !self.settings.realtime_pacing {
            return StreamPacer::disabled();
        }
        let file_len = file.metadata().map(|meta| meta.len()).unwrap_or(0);
        StreamPacer::for_file(path, file_len, self.settings.fallback_bitrate_kbps)
    }

    fn stream_file(
        &mut self,
        track: &Track,
        mut file: File,
        pacer: &mut StreamPacer,
        selector: &TrackSelector,
    ) -> PlaybackOutcome {
        let chunk_size = self.settings.chunk_size_bytes.max(1);
        let mut chunk = Vec::with_capacity(chunk_size);
        let mut dropped_chunks: u64 = 0;

        loop {
            chunk.clear();
            match (&mut file).take(chunk_size as u64).read_to_end(&mut chunk) {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) => {
                    error!(
                        "PlaybackEngine: read error in {}, abandoning the rest: {}",
                        track.describe(),
                        err
                    );
                    break;
                }
            }

            if self.connection.send(&chunk) == Delivery::Dropped {
                dropped_chunks += 1;
            }
            pacer.pace(chunk.len());

            if self.should_interrupt(selector) {
                info!(
                    "PlaybackEngine: queue has a new play, interrupting {}",
                    track.describe()
                );
                return PlaybackOutcome::Interrupted;
            }
        }

        if dropped_chunks > 0 {
            warn!(
                "PlaybackEngine: {} chunks of {} were dropped by reconnects ({} reconnects so far)",
                dropped_chunks,
                track.describe(),
                self.connection.reconnect_count()
            );
        }
        debug!("PlaybackEngine: finished {}", track.describe());
        PlaybackOutcome::Completed
    }

    fn should_interrupt(&self, selector: &TrackSelector) -> bool {
        self.settings.interrupt_empty_queue
            && selector.mode() == SelectionMode::Auto
            && selector.peek_pending().is_some()
    }
}

#[cfg(test)]
impl<C: SourceClient> PlaybackEngine<C> {
    pub fn connection(&self) -> &StreamConnection<C> {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut StreamConnection<C> {
        &mut self.connection
    }
}
