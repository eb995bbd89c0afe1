//! Real-time pacing for file-backed streams.
//!
//! Icecast relays whatever arrives, so a source that writes a file as fast as
//! the socket accepts it drains the whole track in seconds. The pacer keeps the
//! byte rate close to the file's average bitrate.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use lofty::file::AudioFile;
use log::debug;

pub struct StreamPacer {
    bytes_per_second: Option<f64>,
    started_at: Instant,
    sent_bytes: u64,
}

impl StreamPacer {
    /// Pacer that never sleeps.
    pub fn disabled() -> Self {
        Self {
            bytes_per_second: None,
            started_at: Instant::now(),
            sent_bytes: 0,
        }
    }

    pub fn with_rate(bytes_per_second: f64) -> Self {
        let rate = (bytes_per_second.is_finite() && bytes_per_second > 0.0).then_some(bytes_per_second);
        Self {
            bytes_per_second: rate,
            started_at: Instant::now(),
            sent_bytes: 0,
        }
    }

    /// Derives the rate from the file's duration tag, falling back to a fixed bitrate.
    pub fn for_file(path: &Path, file_len: u64, fallback_bitrate_kbps: u32) -> Self {
        let duration = read_duration(path);
        let pacer = Self::with_rate(estimate_bytes_per_second(
            file_len,
            duration,
            fallback_bitrate_kbps,
        ));
        debug!(
            "StreamPacer: {} paced at {:?} bytes/s (duration {:?})",
            path.display(),
            pacer.bytes_per_second(),
            duration
        );
        pacer
    }

    pub fn bytes_per_second(&self) -> Option<f64> {
        self.bytes_per_second
    }

    /// Accounts for `chunk_len` bytes and sleeps until the stream is back on schedule.
    pub fn pace(&mut self, chunk_len: usize) {
        self.sent_bytes += chunk_len as u64;
        let Some(rate) = self.bytes_per_second else {
            return;
        };
        let delay = pacing_delay(self.sent_bytes, rate, self.started_at.elapsed());
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

fn read_duration(path: &Path) -> Option<Duration> {
    match lofty::read_from_path(path) {
        Ok(tagged_file) => {
            Some(tagged_file.properties().duration()).filter(|duration| !duration.is_zero())
        }
        Err(err) => {
            debug!("StreamPacer: no duration for {}: {}", path.display(), err);
            None
        }
    }
}

pub fn estimate_bytes_per_second(
    file_len: u64,
    duration: Option<Duration>,
    fallback_bitrate_kbps: u32,
) -> f64 {
    match duration {
        Some(duration) if file_len > 0 && duration.as_secs_f64() > 0.0 => {
            file_len as f64 / duration.as_secs_f64()
        }
        _ => f64::from(fallback_bitrate_kbps) * 1000.0 / 8.0,
    }
}

/// Time left before `sent_bytes` would be due at `bytes_per_second`.
pub fn pacing_delay(sent_bytes: u64, bytes_per_second: f64, elapsed: Duration) -> Duration {
    let due = Duration::from_secs_f64(sent_bytes as f64 / bytes_per_second);
    due.saturating_sub(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_comes_from_length_over_duration() {
        let rate = estimate_bytes_per_second(4_000_000, Some(Duration::from_secs(250)), 128);
        assert_eq!(rate, 16_000.0);
    }

    #[test]
    fn test_rate_falls_back_to_configured_bitrate() {
        assert_eq!(estimate_bytes_per_second(4_000_000, None, 128), 16_000.0);
        assert_eq!(
            estimate_bytes_per_second(0, Some(Duration::from_secs(10)), 320),
            40_000.0
        );
    }

    #[test]
    fn test_delay_waits_for_schedule() {
        let delay = pacing_delay(32_000, 16_000.0, Duration::from_millis(500));
        assert_eq!(delay, Duration::from_millis(1500));
    }

    #[test]
    fn test_no_delay_when_behind_schedule() {
        let delay = pacing_delay(16_000, 16_000.0, Duration::from_secs(3));
        assert_eq!(delay, Duration::ZERO);
    }

    #[test]
    fn test_invalid_rate_disables_pacing() {
        assert_eq!(StreamPacer::with_rate(0.0).bytes_per_second(), None);
        assert_eq!(StreamPacer::with_rate(f64::NAN).bytes_per_second(), None);
        let mut pacer = StreamPacer::disabled();
        let started = Instant::now();
        pacer.pace(10_000_000);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_unreadable_file_uses_fallback_rate() {
        let pacer = StreamPacer::for_file(Path::new("/definitely/missing.mp3"), 1000, 64);
        assert_eq!(pacer.bytes_per_second(), Some(8_000.0));
    }
}
