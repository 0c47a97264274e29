use super::commands::{Cli, OutputFormat};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vigil_daemon::LoggingConfig;
use vigil_types::{VigilError, VigilResult, WorkerStatus};

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".vigil"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/vigil"))
}

/// Command-line flags win over the `[logging]` section; `RUST_LOG` wins over
/// both.
pub fn init_logging(cli: &Cli, logging: &LoggingConfig) {
    let level = if cli.quiet {
        "warn".to_string()
    } else {
        match cli.verbose {
            0 => logging.level.to_string(),
            1 => "info,vigil_daemon=debug".to_string(),
            2 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let json = cli.log_json || logging.json;
    let subscriber = tracing_subscriber::registry().with(env_filter);

    let file = cli.log_file.as_ref().or(logging.file.as_ref()).and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| eprintln!("Failed to open log file {:?}: {}, logging to stdout", path, e))
            .ok()
    });

    match (file, json) {
        (Some(file), true) => subscriber
            .with(fmt::layer().json().with_writer(std::sync::Mutex::new(file)).with_ansi(false))
            .init(),
        (Some(file), false) => subscriber
            .with(fmt::layer().with_writer(std::sync::Mutex::new(file)).with_ansi(false))
            .init(),
        (None, true) => subscriber.with(fmt::layer().json()).init(),
        (None, false) => subscriber.with(fmt::layer().with_target(cli.verbose >= 2)).init(),
    }
}

pub fn print_banner() {
    println!("\x1b[38;5;46m");
    println!(
        r#"
    ██╗   ██╗██╗ ██████╗ ██╗██╗
    ██║   ██║██║██╔════╝ ██║██║
    ██║   ██║██║██║  ███╗██║██║
    ╚██╗ ██╔╝██║██║   ██║██║██║
     ╚████╔╝ ██║╚██████╔╝██║███████╗
      ╚═══╝  ╚═╝ ╚═════╝ ╚═╝╚══════╝"#
    );
    println!("\x1b[0m");
    println!("        \x1b[38;5;245mSelf-healing worker supervisor - v{}\x1b[0m", BUILD_VERSION);
    println!();
}

pub fn paint_status(status: WorkerStatus) -> String {
    let colour = match status {
        WorkerStatus::Healthy => "46",
        WorkerStatus::Degraded => "226",
        WorkerStatus::Recovering => "51",
        WorkerStatus::Escalated => "196",
        WorkerStatus::Unknown => "245",
    };
    format!("\x1b[38;5;{}m{:<10}\x1b[0m", colour, status.to_string())
}

pub fn print_json<T: Serialize>(value: &T) -> VigilResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| VigilError::Serialization(format!("Failed to encode output: {}", e)))?;
    println!("{}", json);
    Ok(())
}

pub fn wants_json(format: &OutputFormat) -> bool {
    matches!(format, OutputFormat::Json)
}
