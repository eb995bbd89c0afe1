//! Engine configuration model, defaults, and loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};

/// Library root used when the configured folder does not exist.
pub const DEFAULT_MUSIC_FOLDER: &str = "./music";

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    /// Stream display name announced to listeners.
    #[serde(default = "default_radio_name", alias = "name")]
    pub radio_name: String,
    #[serde(default)]
    /// Broadcast destination.
    pub icecast: IcecastConfig,
    #[serde(default)]
    /// Track library on disk.
    pub library: LibraryConfig,
    #[serde(default)]
    /// Shared queue/catalog store.
    pub database: DatabaseConfig,
    #[serde(default)]
    /// Streaming and interrupt behavior.
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Legacy top-level `music_folder`, migrated into `library` on load.
    #[serde(rename = "music_folder", default, skip_serializing)]
    pub legacy_music_folder: Option<String>,
    /// Legacy top-level `interrupt_empty_queue`, migrated into `playback` on load.
    #[serde(rename = "interrupt_empty_queue", default, skip_serializing)]
    pub legacy_interrupt_empty_queue: Option<bool>,
    /// Legacy top-level `dj_log_file`, migrated into `logging` on load.
    #[serde(rename = "dj_log_file", default, skip_serializing)]
    pub legacy_log_file: Option<String>,
}

/// Wire protocol used to open the source connection.
#[derive(Debug, Clone, Copy, serde::Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceProtocol {
    /// HTTP `PUT`, accepted by Icecast 2.4 and later.
    #[default]
    Http,
    /// Legacy `SOURCE` request.
    Source,
}

/// Icecast server and mount settings.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct IcecastConfig {
    #[serde(default = "default_host", alias = "server")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_mount")]
    pub mount: String,
    #[serde(default = "default_username", alias = "user")]
    pub username: String,
    #[serde(default = "default_password", alias = "pass")]
    pub password: String,
    #[serde(default)]
    pub protocol: SourceProtocol,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Constant pause between failed reconnect attempts. The first attempt is immediate.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LibraryConfig {
    #[serde(default = "default_music_folder")]
    pub music_folder: String,
}

/// Shared SQLite store settings.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Catalog table name, e.g. `rubedo_songs`.
    #[serde(default = "default_songs_table")]
    pub songs_table: String,
    /// Queue table name, e.g. `rubedo_plays`.
    #[serde(default = "default_queue_table")]
    pub queue_table: String,
    /// Creates both tables when missing. The front end normally owns the schema.
    #[serde(default)]
    pub create_tables: bool,
    #[serde(default = "default_true")]
    pub purge_stale_claims_on_start: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PlaybackConfig {
    /// Abort filler playback as soon as a queue row appears.
    #[serde(default)]
    pub interrupt_empty_queue: bool,
    #[serde(default = "default_chunk_size_bytes")]
    pub chunk_size_bytes: usize,
    #[serde(default = "default_idle_interval_secs")]
    pub idle_interval_secs: u64,
    #[serde(default = "default_true")]
    pub realtime_pacing: bool,
    #[serde(default = "default_fallback_bitrate_kbps")]
    pub fallback_bitrate_kbps: u32,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log destination. Empty means stderr.
    #[serde(default)]
    pub file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            radio_name: default_radio_name(),
            icecast: IcecastConfig::default(),
            library: LibraryConfig::default(),
            database: DatabaseConfig::default(),
            playback: PlaybackConfig::default(),
            logging: LoggingConfig::default(),
            legacy_music_folder: None,
            legacy_interrupt_empty_queue: None,
            legacy_log_file: None,
        }
    }
}

impl Default for IcecastConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            mount: default_mount(),
            username: default_username(),
            password: default_password(),
            protocol: SourceProtocol::Http,
            tls: false,
            description: String::new(),
            genre: String::new(),
            public: false,
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            music_folder: default_music_folder(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            songs_table: default_songs_table(),
            queue_table: default_queue_table(),
            create_tables: false,
            purge_stale_claims_on_start: true,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            interrupt_empty_queue: false,
            chunk_size_bytes: default_chunk_size_bytes(),
            idle_interval_secs: default_idle_interval_secs(),
            realtime_pacing: true,
            fallback_bitrate_kbps: default_fallback_bitrate_kbps(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: String::new(),
        }
    }
}

impl IcecastConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl LibraryConfig {
    /// Configured folder if it exists, otherwise `./music`.
    pub fn resolve_root(&self) -> PathBuf {
        let configured = Path::new(self.music_folder.trim());
        if !self.music_folder.trim().is_empty() && configured.exists() {
            configured.to_path_buf()
        } else {
            PathBuf::from(DEFAULT_MUSIC_FOLDER)
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
impl DatabaseConfig {
    /// Defaults plus schema bootstrap, for stores that start out empty.
    pub fn standalone() -> Self {
        Self {
            create_tables: true,
            ..Self::default()
        }
    }
}

impl PlaybackConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_radio_name() -> String {
    "Queuecast Radio".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_mount() -> String {
    "/radio".to_string()
}

fn default_username() -> String {
    "source".to_string()
}

fn default_password() -> String {
    "hackme".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_reconnect_delay_ms() -> u64 {
    0
}

fn default_music_folder() -> String {
    DEFAULT_MUSIC_FOLDER.to_string()
}

fn default_database_path() -> String {
    "db/rubedo.db".to_string()
}

fn default_songs_table() -> String {
    "songs".to_string()
}

fn default_queue_table() -> String {
    "queue".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    200
}

fn default_chunk_size_bytes() -> usize {
    16_384
}

fn default_idle_interval_secs() -> u64 {
    500
}

fn default_fallback_bitrate_kbps() -> u32 {
    128
}

fn default_log_level() -> String {
    "info".to_string()
}

fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

fn sanitize_table_name(key: &str, name: String, fallback: String) -> String {
    if is_valid_table_name(&name) {
        return name;
    }
    warn!(
        "Config: ignoring database.{} '{}'; only letters, digits and '_' are allowed, using '{}'",
        key, name, fallback
    );
    fallback
}

/// Migrates legacy keys and clamps values the engine cannot run with.
pub fn sanitize_config(config: Config) -> Config {
    let mut config = config;

    if let Some(folder) = config.legacy_music_folder.take() {
        if config.library.music_folder == default_music_folder() {
            config.library.music_folder = folder;
        }
    }
    if let Some(interrupt) = config.legacy_interrupt_empty_queue.take() {
        config.playback.interrupt_empty_queue |= interrupt;
    }
    if let Some(file) = config.legacy_log_file.take() {
        if config.logging.file.is_empty() {
            config.logging.file = file;
        }
    }

    let mount = config.icecast.mount.trim();
    config.icecast.mount = if mount.starts_with('/') {
        mount.to_string()
    } else {
        format!("/{mount}")
    };
    if config.icecast.port == 0 {
        warn!("Config: icecast.port must be non-zero, using {}", default_port());
        config.icecast.port = default_port();
    }
    config.icecast.connect_timeout_ms = config.icecast.connect_timeout_ms.max(100);

    config.database.songs_table = sanitize_table_name(
        "songs_table",
        std::mem::take(&mut config.database.songs_table),
        default_songs_table(),
    );
    config.database.queue_table = sanitize_table_name(
        "queue_table",
        std::mem::take(&mut config.database.queue_table),
        default_queue_table(),
    );
    config.database.busy_timeout_ms = config.database.busy_timeout_ms.max(1);

    config.playback.chunk_size_bytes = config.playback.chunk_size_bytes.max(1_024);
    config.playback.fallback_bitrate_kbps = config.playback.fallback_bitrate_kbps.max(8);

    config
}

/// `$QUEUECAST_CONFIG`, else `<config dir>/queuecast/config.toml`.
pub fn default_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os("QUEUECAST_CONFIG") {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("queuecast")
        .join("config.toml")
}

/// Reads the config file, writing defaults first when it does not exist.
/// A file that fails to parse yields the defaults.
pub fn load_or_create(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    format!("failed to create config directory {}: {err}", parent.display())
                })?;
            }
        }
        let text = toml::to_string(&Config::default())
            .map_err(|err| format!("failed to serialize default config: {err}"))?;
        std::fs::write(path, text)
            .map_err(|err| format!("failed to write config {}: {err}", path.display()))?;
    }

    let content = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read config {}: {err}", path.display()))?;
    Ok(sanitize_config(parse_config(&content)))
}

fn parse_config(content: &str) -> Config {
    match toml::from_str::<Config>(content) {
        Ok(config) => config,
        Err(err) => {
            warn!("Config file is invalid, using defaults: {}", err);
            Config::default()
        }
    }
}
