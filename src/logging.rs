//! Log backend setup.
//!
//! Console output uses colog's colored format. When a log file is configured,
//! records are appended to it in a plain timestamped format instead.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use log::{warn, LevelFilter};

use crate::config::LoggingConfig;

pub fn parse_level(level: &str) -> LevelFilter {
    match level.trim().to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn open_log_file(path: &Path) -> Result<File, String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|err| {
                format!("failed to create log directory {}: {err}", parent.display())
            })?;
        }
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| format!("failed to open log file {}: {err}", path.display()))
}

/// Installs the global logger. `RUST_LOG` directives override the configured level.
pub fn init_logging(config: &LoggingConfig) {
    let mut builder = colog::default_builder();
    builder.filter(None, parse_level(&config.level));
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    let mut file_error = None;
    let log_file = config.file.trim();
    if !log_file.is_empty() {
        match open_log_file(Path::new(log_file)) {
            Ok(file) => {
                builder
                    .format(|buf, record| {
                        writeln!(
                            buf,
                            "{} {:<5} {}: {}",
                            buf.timestamp(),
                            record.level(),
                            record.target(),
                            record.args()
                        )
                    })
                    .write_style(env_logger::WriteStyle::Never)
                    .target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(err) => file_error = Some(err),
        }
    }

    if let Err(err) = builder.try_init() {
        eprintln!("logger already initialized: {err}");
    }
    if let Some(err) = file_error {
        warn!("Logging to stderr instead: {}", err);
    }
}
