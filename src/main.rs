mod config;
mod icecast_client;
mod logging;
mod media_file_discovery;
mod orchestrator;
mod playback_engine;
mod protocol;
mod queue_store;
mod stream_connection;
mod stream_pacer;
mod track_selector;

use std::path::{Path, PathBuf};

use log::{error, info, warn};

use config::Config;
use icecast_client::IcecastClient;
use orchestrator::Orchestrator;
use playback_engine::PlaybackEngine;
use queue_store::QueueStore;
use stream_connection::StreamConnection;
use track_selector::TrackSelector;

fn config_path() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::default_config_path)
}

fn open_store(config: &Config) -> Result<QueueStore, String> {
    let db_path = Path::new(&config.database.path);
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|err| {
                format!("failed to create database directory {}: {err}", parent.display())
            })?;
        }
    }
    QueueStore::open(db_path, &config.database)
        .map_err(|err| format!("failed to open queue database {}: {err}", db_path.display()))
}

fn main() {
    let path = config_path();
    let (config, config_error) = match config::load_or_create(&path) {
        Ok(config) => (config, None),
        Err(err) => (Config::default(), Some(err)),
    };

    logging::init_logging(&config.logging);
    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    match config_error {
        Some(err) => warn!("Using default config: {}", err),
        None => info!("Loaded config from {}", path.display()),
    }

    let store = match open_store(&config) {
        Ok(store) => store,
        Err(err) => {
            error!("{}", err);
            std::process::exit(1);
        }
    };

    let library_root = config.library.resolve_root();
    if library_root != Path::new(config.library.music_folder.trim()) {
        warn!(
            "Music folder '{}' not found, using {}",
            config.library.music_folder,
            library_root.display()
        );
    }
    let selector = TrackSelector::new(store, library_root);
    if config.database.purge_stale_claims_on_start {
        selector.purge_stale_claims();
    }

    let client = IcecastClient::new(config.icecast.clone(), config.radio_name.clone());
    let mut connection = StreamConnection::new(client, config.icecast.reconnect_delay());
    if let Err(err) = connection.connect() {
        error!(
            "Could not connect to {}:{}{}: {}",
            config.icecast.host, config.icecast.port, config.icecast.mount, err
        );
        std::process::exit(1);
    }
    info!(
        "Broadcasting '{}' to {}:{}{} ({:?})",
        config.radio_name,
        config.icecast.host,
        config.icecast.port,
        config.icecast.mount,
        connection.state()
    );

    let engine = PlaybackEngine::new(connection, config.playback.clone());
    Orchestrator::new(selector, engine).run_forever();
}
