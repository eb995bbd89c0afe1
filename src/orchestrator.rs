//! Main loop: claim a queued play or fall back to a random library track, play
//! it, and retire the claimed row.

use log::debug;

use crate::playback_engine::PlaybackEngine;
use crate::protocol::PlaybackOutcome;
use crate::stream_connection::SourceClient;
use crate::track_selector::TrackSelector;

pub struct Orchestrator<C: SourceClient> {
    selector: TrackSelector,
    engine: PlaybackEngine<C>,
}

impl<C: SourceClient> Orchestrator<C> {
    pub fn new(selector: TrackSelector, engine: PlaybackEngine<C>) -> Self {
        Self { selector, engine }
    }

    /// One iteration of the loop.
    ///
    /// A claimed row is removed once playback concludes, including when it was
    /// interrupted. Fallback picks are never persisted.
    pub fn run_once(&mut self) -> PlaybackOutcome {
        if let Some(track) = self.selector.claim_next() {
            let outcome = self.engine.play(Some(&track), &self.selector);
            debug!("Orchestrator: {} -> {:?}", track.describe(), outcome);
            if outcome.concludes_claim() {
                self.selector.complete(&track);
            }
            return outcome;
        }

        let fallback = self.selector.random_fallback();
        self.engine.play(fallback.as_ref(), &self.selector)
    }

    pub fn run_forever(&mut self) -> ! {
        loop {
            self.run_once();
        }
    }
}

#[cfg(test)]
impl<C: SourceClient> Orchestrator<C> {
    pub fn selector(&self) -> &TrackSelector {
        &self.selector
    }

    pub fn engine(&self) -> &PlaybackEngine<C> {
        &self.engine
    }
}
