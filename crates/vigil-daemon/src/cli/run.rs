use super::utils::print_banner;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use vigil_daemon::config::DEFAULT_PID_FILE;
use vigil_daemon::{
    CancellationToken, DaemonConfig, DiscoveryMode, DiscoverySource, FileHeartbeat, FileQueueInspector,
    LocalProcessController, LogIncidentChannel, ProcessController, ProcessScaler, ProcessScanDiscovery,
    RecoveryActions, RosterDiscovery, StorageConfig, Supervisor, SupervisorParts, SupervisorStorage,
    SystemProbe,
};
use vigil_types::{VigilError, VigilResult};

const STOP_GRACE: Duration = Duration::from_secs(5);

pub async fn run_daemon(
    config_path: &Path,
    data_dir: &Path,
    pid_file: Option<PathBuf>,
    systemd: bool,
) -> VigilResult<()> {
    print_banner();
    info!("Starting vigil supervisor v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {:?}", data_dir);

    std::fs::create_dir_all(data_dir)
        .map_err(|e| VigilError::Config(format!("Failed to create data directory: {}", e)))?;

    let pid_path = pid_file.unwrap_or_else(|| data_dir.join(DEFAULT_PID_FILE));
    std::fs::write(&pid_path, std::process::id().to_string())
        .map_err(|e| VigilError::Config(format!("Failed to write PID file: {}", e)))?;
    info!("PID file written: {:?}", pid_path);

    let result = supervise(config_path, data_dir, systemd).await;

    let _ = std::fs::remove_file(&pid_path);
    if let Err(ref e) = result {
        error!("Supervisor exited with error: {}", e);
    } else {
        info!("Shutdown complete");
    }
    result
}

async fn supervise(config_path: &Path, data_dir: &Path, systemd: bool) -> VigilResult<()> {
    if config_path.exists() {
        info!("Loading configuration from {:?}", config_path);
    } else {
        info!("Using default configuration");
    }
    let mut config = DaemonConfig::load(config_path)?;
    config.data_dir = data_dir.to_path_buf();
    for line in config.summary().to_string().lines() {
        info!("{}", line);
    }

    let storage_path = config.storage_dir();
    let storage = SupervisorStorage::open(StorageConfig::from_persistence(&storage_path, &config.persistence))?;
    info!("Storage initialized at {:?} (schema v{})", storage_path, storage.schema_version()?);

    let supervisor = Supervisor::open(&config, build_parts(&config, Arc::new(storage.clone())))
        .await?
        .with_reset_inbox(config.reset_dir())
        .with_status_file(config.status_file());
    let supervisor = Arc::new(supervisor);

    let orphans = supervisor.start().await?;
    if !orphans.is_empty() {
        warn!("Closed {} recovery attempts left open by a previous run", orphans.len());
    }

    let (cancel, token) = CancellationToken::new();
    let interval = config.supervisor.tick_interval();
    let loop_handle = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.run(interval, token).await })
    };

    if systemd {
        notify_systemd_ready();
    }
    print_ready_message(&config);

    wait_for_shutdown().await;

    info!("Shutting down...");
    cancel.cancel();
    if let Err(e) = loop_handle.await {
        error!("Supervision loop ended abnormally: {}", e);
    }

    let report = supervisor.shutdown(config.supervisor.drain_timeout()).await;
    info!(
        "Recoveries drained: {}, abandoned: {}, unflushed writes: {}",
        report.drained, report.abandoned, report.unflushed
    );

    storage.flush_async().await?;
    Ok(())
}

fn build_parts(config: &DaemonConfig, persistence: Arc<SupervisorStorage>) -> SupervisorParts {
    let discovery: Arc<dyn DiscoverySource> = match config.discovery.mode {
        DiscoveryMode::Process => Arc::new(ProcessScanDiscovery::new(config.worker_types.clone())),
        DiscoveryMode::Roster => {
            warn!("Roster discovery selected but no roster feed is attached; the fleet starts empty");
            Arc::new(RosterDiscovery::new())
        }
    };

    let mut probe = SystemProbe::new();
    if let Some(dir) = &config.discovery.heartbeat_dir {
        info!("Reading heartbeats from {:?}", dir);
        probe = probe.with_heartbeat(Arc::new(FileHeartbeat::new(dir.clone())));
    }
    if let Some(dir) = &config.discovery.backlog_dir {
        info!("Reading queue backlogs from {:?}", dir);
        probe = probe.with_queue_inspector(Arc::new(FileQueueInspector::new(dir.clone())));
    }

    let controller: Arc<dyn ProcessController> =
        Arc::new(LocalProcessController::new(&config.worker_types, STOP_GRACE));

    SupervisorParts {
        discovery,
        probe: Arc::new(probe),
        actions: RecoveryActions {
            controller: controller.clone(),
            scaler: Arc::new(ProcessScaler::new(controller)),
            incidents: Arc::new(LogIncidentChannel),
        },
        persistence,
    }
}

fn print_ready_message(config: &DaemonConfig) {
    println!();
    println!("\x1b[38;5;46m╔══════════════════════════════════════════════════════════════╗\x1b[0m");
    println!("\x1b[38;5;46m║\x1b[0m  \x1b[1;38;5;46mvigil is now supervising\x1b[0m                                    \x1b[38;5;46m║\x1b[0m");
    println!("\x1b[38;5;46m╠══════════════════════════════════════════════════════════════╣\x1b[0m");
    println!(
        "\x1b[38;5;46m║\x1b[0m  Discovery: \x1b[38;5;226m{:<10}\x1b[0m Tick: \x1b[38;5;51m{:<6}\x1b[0m                       \x1b[38;5;46m║\x1b[0m",
        config.discovery.mode.to_string(),
        format!("{}s", config.supervisor.tick_interval_secs)
    );
    println!(
        "\x1b[38;5;46m║\x1b[0m  Status: \x1b[38;5;51m{:<52}\x1b[0m\x1b[38;5;46m║\x1b[0m",
        config.status_file().display().to_string()
    );
    println!("\x1b[38;5;46m╠══════════════════════════════════════════════════════════════╣\x1b[0m");
    println!("\x1b[38;5;46m║\x1b[0m  \x1b[38;5;245mRun '\x1b[38;5;51mvigil status\x1b[38;5;245m' in another terminal for the fleet view\x1b[0m   \x1b[38;5;46m║\x1b[0m");
    println!("\x1b[38;5;46m║\x1b[0m  \x1b[38;5;245mPress Ctrl+C to stop\x1b[0m                                        \x1b[38;5;46m║\x1b[0m");
    println!("\x1b[38;5;46m╚══════════════════════════════════════════════════════════════╝\x1b[0m");
    println!();
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => { info!("Received SIGTERM"); }
            _ = sigint.recv() => { info!("Received SIGINT"); }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Received Ctrl+C");
    }
}

fn notify_systemd_ready() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(socket_path) = std::env::var("NOTIFY_SOCKET") {
            use std::os::unix::net::UnixDatagram;
            if let Ok(socket) = UnixDatagram::unbound() {
                let _ = socket.send_to(b"READY=1", &socket_path);
                tracing::debug!("Notified systemd: READY=1");
            }
        }
    }
}
