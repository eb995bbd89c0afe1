//! Connection state machine for the broadcast destination.
//!
//! `StreamConnection` owns a `SourceClient` (the wire-level session) and keeps
//! it connected in the format the current track needs. Only the initial
//! `connect` can fail; once running, write failures turn into an immediate
//! reconnect that is retried until it succeeds.

use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use crate::protocol::{Delivery, StreamFormat, TrackMetadata};

/// Wire-level session with a streaming server.
pub trait SourceClient {
    /// Opens the source session announcing `format` as the content type.
    fn open(&mut self, format: StreamFormat) -> Result<(), String>;
    /// Closes the session. Closing a closed session is a no-op.
    fn close(&mut self);
    /// Writes one chunk of audio bytes.
    fn send(&mut self, chunk: &[u8]) -> Result<(), String>;
    /// Publishes per-track tags for the open session.
    fn set_metadata(&mut self, metadata: &TrackMetadata) -> Result<(), String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected(StreamFormat),
}

pub struct StreamConnection<C: SourceClient> {
    client: C,
    state: ConnectionState,
    format: StreamFormat,
    reconnect_delay: Duration,
    current_metadata: Option<TrackMetadata>,
    reconnects: u64,
}

impl<C: SourceClient> StreamConnection<C> {
    pub fn new(client: C, reconnect_delay: Duration) -> Self {
        Self {
            client,
            state: ConnectionState::Disconnected,
            format: StreamFormat::default(),
            reconnect_delay,
            current_metadata: None,
            reconnects: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of reconnects performed after a failure or format switch.
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects
    }

    /// Opens the session in the current format. The caller decides whether a
    /// failure here is fatal; no retry happens.
    pub fn connect(&mut self) -> Result<(), String> {
        if let ConnectionState::Connected(_) = self.state {
            return Ok(());
        }
        self.client.open(self.format)?;
        self.state = ConnectionState::Connected(self.format);
        info!("StreamConnection: connected ({})", self.format);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.state != ConnectionState::Disconnected {
            self.client.close();
            self.state = ConnectionState::Disconnected;
        }
    }

    /// Reopens the session in `required` format when it differs from the live one.
    pub fn ensure_format(&mut self, required: StreamFormat) {
        if self.state == ConnectionState::Connected(required) {
            return;
        }
        if let ConnectionState::Connected(current) = self.state {
            info!(
                "StreamConnection: switching stream format {} -> {}, reconnecting",
                current, required
            );
        }
        self.disconnect();
        self.format = required;
        self.current_metadata = None;
        self.reconnect();
    }

    /// Sends one chunk. A failed write reconnects and drops the chunk.
    pub fn send(&mut self, chunk: &[u8]) -> Delivery {
        if self.state == ConnectionState::Disconnected {
            self.reconnect();
        }
        match self.client.send(chunk) {
            Ok(()) => Delivery::Sent,
            Err(err) => {
                error!(
                    "StreamConnection: error sending to the streaming server, reconnecting: {}",
                    err
                );
                self.disconnect();
                self.reconnect();
                Delivery::Dropped
            }
        }
    }

    /// Attaches track tags. Only MP3 sessions carry per-track metadata.
    pub fn set_track_metadata(&mut self, metadata: TrackMetadata) {
        if self.state != ConnectionState::Connected(StreamFormat::Mp3) {
            return;
        }
        if let Err(err) = self.client.set_metadata(&metadata) {
            warn!(
                "StreamConnection: failed to update metadata for {}: {}",
                metadata.filename, err
            );
        }
        self.current_metadata = Some(metadata);
    }

    /// Loops until the session is open again. The first attempt is immediate;
    /// later attempts wait the constant reconnect delay.
    fn reconnect(&mut self) {
        let mut failed_attempts: u64 = 0;
        loop {
            match self.client.open(self.format) {
                Ok(()) => break,
                Err(err) => {
                    failed_attempts += 1;
                    error!(
                        "StreamConnection: reconnect attempt {} failed: {}",
                        failed_attempts, err
                    );
                    if !self.reconnect_delay.is_zero() {
                        thread::sleep(self.reconnect_delay);
                    }
                }
            }
        }
        self.state = ConnectionState::Connected(self.format);
        self.reconnects += 1;
        info!(
            "StreamConnection: reconnected ({}) after {} failed attempts",
            self.format, failed_attempts
        );

        if let Some(metadata) = self.current_metadata.clone() {
            if self.format.supports_metadata() {
                if let Err(err) = self.client.set_metadata(&metadata) {
                    warn!("StreamConnection: failed to restore metadata: {}", err);
                }
            }
        }
    }
}

#[cfg(test)]
impl<C: SourceClient> StreamConnection<C> {
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }
}

#[cfg(test)]
pub mod test_support {
    use super::SourceClient;
    use crate::protocol::{StreamFormat, TrackMetadata};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ClientEvent {
        Open(StreamFormat),
        Close,
        Send(usize),
        Metadata(TrackMetadata),
    }

    /// In-memory client that records calls and fails on demand.
    #[derive(Debug, Default)]
    pub struct ScriptedClient {
        pub events: Vec<ClientEvent>,
        pub failing_opens: usize,
        pub failing_sends: usize,
        pub is_open: bool,
    }

    impl ScriptedClient {
        pub fn sent_bytes(&self) -> usize {
            self.events
                .iter()
                .map(|event| match event {
                    ClientEvent::Send(len) => *len,
                    _ => 0,
                })
                .sum()
        }

        pub fn send_count(&self) -> usize {
            self.events
                .iter()
                .filter(|event| matches!(event, ClientEvent::Send(_)))
                .count()
        }
    }

    impl SourceClient for ScriptedClient {
        fn open(&mut self, format: StreamFormat) -> Result<(), String> {
            if self.failing_opens > 0 {
                self.failing_opens -= 1;
                return Err("connection refused".to_string());
            }
            self.is_open = true;
            self.events.push(ClientEvent::Open(format));
            Ok(())
        }

        fn close(&mut self) {
            self.is_open = false;
            self.events.push(ClientEvent::Close);
        }

        fn send(&mut self, chunk: &[u8]) -> Result<(), String> {
            assert!(self.is_open, "send on a closed session");
            if self.failing_sends > 0 {
                self.failing_sends -= 1;
                return Err("broken pipe".to_string());
            }
            self.events.push(ClientEvent::Send(chunk.len()));
            Ok(())
        }

        fn set_metadata(&mut self, metadata: &TrackMetadata) -> Result<(), String> {
            self.events.push(ClientEvent::Metadata(metadata.clone()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{ClientEvent, ScriptedClient};
    use super::*;

    fn connection() -> StreamConnection<ScriptedClient> {
        StreamConnection::new(ScriptedClient::default(), Duration::ZERO)
    }

    fn metadata(song: &str) -> TrackMetadata {
        TrackMetadata {
            song: song.to_string(),
            filename: format!("{song}.mp3"),
        }
    }

    #[test]
    fn test_connect_opens_in_default_mp3_format() {
        let mut connection = connection();
        assert_eq!(connection.state(), ConnectionState::Disconnected);

        connection.connect().expect("connect should succeed");
        assert_eq!(connection.state(), ConnectionState::Connected(StreamFormat::Mp3));
        assert_eq!(
            connection.client().events,
            vec![ClientEvent::Open(StreamFormat::Mp3)]
        );
    }

    #[test]
    fn test_initial_connect_failure_is_reported_without_retry() {
        let mut connection = connection();
        connection.client_mut().failing_opens = 1;

        assert!(connection.connect().is_err());
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert!(connection.client().events.is_empty());
    }

    #[test]
    fn test_format_switch_reconnects_before_next_send() {
        let mut connection = connection();
        connection.connect().expect("connect should succeed");

        connection.ensure_format(StreamFormat::Ogg);
        assert_eq!(connection.send(b"ogg"), Delivery::Sent);

        assert_eq!(
            connection.client().events,
            vec![
                ClientEvent::Open(StreamFormat::Mp3),
                ClientEvent::Close,
                ClientEvent::Open(StreamFormat::Ogg),
                ClientEvent::Send(3),
            ]
        );
        assert_eq!(connection.format(), StreamFormat::Ogg);
    }

    #[test]
    fn test_same_format_does_not_reconnect() {
        let mut connection = connection();
        connection.connect().expect("connect should succeed");

        connection.ensure_format(StreamFormat::Mp3);
        assert_eq!(connection.reconnect_count(), 0);
        assert_eq!(connection.client().events.len(), 1);
    }

    #[test]
    fn test_send_failures_reconnect_and_continue() {
        let mut connection = connection();
        connection.connect().expect("connect should succeed");
        connection.client_mut().failing_sends = 25;

        let deliveries: Vec<Delivery> = (0..30).map(|_| connection.send(b"chunk")).collect();
        assert_eq!(
            deliveries.iter().filter(|d| **d == Delivery::Dropped).count(),
            25
        );
        assert_eq!(connection.reconnect_count(), 25);
        assert_eq!(connection.state(), ConnectionState::Connected(StreamFormat::Mp3));
        assert_eq!(connection.client().send_count(), 5);
    }

    #[test]
    fn test_reconnect_retries_failed_opens_until_connected() {
        let mut connection = connection();
        connection.connect().expect("connect should succeed");
        connection.client_mut().failing_sends = 1;
        connection.client_mut().failing_opens = 10;

        assert_eq!(connection.send(b"chunk"), Delivery::Dropped);
        assert_eq!(connection.state(), ConnectionState::Connected(StreamFormat::Mp3));
        assert_eq!(connection.send(b"chunk"), Delivery::Sent);
    }

    #[test]
    fn test_metadata_is_only_attached_to_mp3_sessions() {
        let mut connection = connection();
        connection.connect().expect("connect should succeed");
        connection.set_track_metadata(metadata("first"));

        connection.ensure_format(StreamFormat::Ogg);
        connection.set_track_metadata(metadata("second"));

        let metadata_events: Vec<&ClientEvent> = connection
            .client()
            .events
            .iter()
            .filter(|event| matches!(event, ClientEvent::Metadata(_)))
            .collect();
        assert_eq!(metadata_events, vec![&ClientEvent::Metadata(metadata("first"))]);
    }

    #[test]
    fn test_metadata_is_restored_after_reconnect() {
        let mut connection = connection();
        connection.connect().expect("connect should succeed");
        connection.set_track_metadata(metadata("song"));
        connection.client_mut().failing_sends = 1;

        connection.send(b"chunk");

        let events = &connection.client().events;
        assert_eq!(
            events[events.len() - 2..],
            [
                ClientEvent::Open(StreamFormat::Mp3),
                ClientEvent::Metadata(metadata("song")),
            ]
        );
    }
}
