use super::commands::OutputFormat;
use super::utils::{paint_status, print_json, wants_json};
use std::path::Path;
use vigil_daemon::config::DEFAULT_PID_FILE;
use vigil_daemon::{DaemonConfig, ProfileSnapshot, StatusDigest, StorageConfig, SupervisorStorage};
use vigil_types::{VigilResult, WorkerId};

pub async fn show_status(config_path: &Path, data_dir: &Path, format: &OutputFormat) -> VigilResult<()> {
    let config = load_config(config_path, data_dir)?;
    let status_file = config.status_file();
    let running = daemon_pid(data_dir).filter(|pid| process_alive(*pid));

    if !status_file.exists() {
        println!("\x1b[38;5;245mNo status digest at {:?} yet\x1b[0m", status_file);
        if running.is_none() {
            println!("Start the supervisor with '\x1b[38;5;51mvigil run\x1b[0m'");
        }
        return Ok(());
    }

    let digest = StatusDigest::load(&status_file)?;
    if wants_json(format) {
        return print_json(&digest);
    }

    match running {
        Some(pid) => println!("\x1b[38;5;46m[+]\x1b[0m Supervisor running (pid {})", pid),
        None => println!("\x1b[38;5;226m[!]\x1b[0m Supervisor not running; showing last digest"),
    }
    println!(
        "Tick {} at {} (uptime {}s)",
        digest.tick,
        digest.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        digest.uptime_secs
    );
    println!("{}", digest);
    if digest.buffered_writes > 0 {
        println!("\x1b[38;5;226m{} attempt writes waiting for storage\x1b[0m", digest.buffered_writes);
    }
    println!();

    println!("  {:<28} {:<10} {:>8}  {}", "WORKER", "STATUS", "FAILURES", "SINCE");
    for worker in &digest.workers {
        println!(
            "  {:<28} {} {:>8}  {}",
            worker.worker_id.to_string(),
            paint_status(worker.status),
            worker.consecutive_failures,
            worker.last_transition_at.format("%H:%M:%S")
        );
    }

    let escalated = digest.escalated();
    if !escalated.is_empty() {
        println!();
        println!("\x1b[38;5;196m{} worker(s) need an operator:\x1b[0m", escalated.len());
        for id in escalated {
            println!("  vigil reset {}", id);
        }
    }
    Ok(())
}

pub fn show_attempts(
    config_path: &Path,
    data_dir: &Path,
    worker: Option<String>,
    limit: usize,
    format: &OutputFormat,
) -> VigilResult<()> {
    let Some(storage) = open_storage(config_path, data_dir)? else {
        return Ok(());
    };
    let worker = worker.map(WorkerId::new);
    let attempts = storage.recent_attempts(worker.as_ref(), limit)?;

    if wants_json(format) {
        return print_json(&attempts);
    }
    if attempts.is_empty() {
        println!("\x1b[38;5;245mNo recovery attempts recorded\x1b[0m");
        return Ok(());
    }

    println!(
        "  {:<20} {:<24} {:<20} {:<12} {:<15} {:>8}",
        "STARTED", "WORKER", "CATEGORY", "STRATEGY", "OUTCOME", "SECONDS"
    );
    for attempt in &attempts {
        let outcome = attempt.outcome.map(|o| o.to_string()).unwrap_or_else(|| "-".into());
        let seconds = attempt
            .recovery_seconds()
            .map(|s| format!("{:.1}", s))
            .unwrap_or_else(|| "-".into());
        println!(
            "  {:<20} {:<24} {:<20} {:<12} {:<15} {:>8}",
            attempt.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            attempt.worker_id.to_string(),
            attempt.failure_category.to_string(),
            attempt.chosen_strategy.to_string(),
            outcome,
            seconds
        );
    }
    Ok(())
}

pub fn show_profiles(config_path: &Path, data_dir: &Path, format: &OutputFormat) -> VigilResult<()> {
    let config = load_config(config_path, data_dir)?;
    let Some(storage) = open_storage(config_path, data_dir)? else {
        return Ok(());
    };
    let attempts = storage.attempt_records()?;
    let rows = ProfileSnapshot::replay(&attempts, &config.learning).rows();

    if wants_json(format) {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("\x1b[38;5;245mNothing learned yet\x1b[0m");
        return Ok(());
    }

    println!(
        "  {:<20} {:<20} {:<12} {:>9} {:>9} {:>8} {:>9}",
        "TYPE", "CATEGORY", "STRATEGY", "ATTEMPTS", "SUCCESSES", "RATE", "MEAN(s)"
    );
    for row in &rows {
        let mean = row
            .mean_recovery_seconds
            .map(|s| format!("{:.1}", s))
            .unwrap_or_else(|| "-".into());
        println!(
            "  {:<20} {:<20} {:<12} {:>9} {:>9} {:>7.0}% {:>9}",
            row.worker_type.to_string(),
            row.failure_category.to_string(),
            row.strategy.to_string(),
            row.attempts,
            row.successes,
            row.success_rate * 100.0,
            mean
        );
    }
    Ok(())
}

fn load_config(config_path: &Path, data_dir: &Path) -> VigilResult<DaemonConfig> {
    let mut config = DaemonConfig::load(config_path)?;
    config.data_dir = data_dir.to_path_buf();
    Ok(config)
}

/// `None` when there is no store yet or the running daemon holds its lock.
fn open_storage(config_path: &Path, data_dir: &Path) -> VigilResult<Option<SupervisorStorage>> {
    let config = load_config(config_path, data_dir)?;
    let storage_dir = config.storage_dir();
    if !storage_dir.exists() {
        println!("\x1b[38;5;245mNo storage at {:?} yet\x1b[0m", storage_dir);
        return Ok(None);
    }
    match SupervisorStorage::open(StorageConfig::from_persistence(&storage_dir, &config.persistence)) {
        Ok(storage) => Ok(Some(storage)),
        Err(e) if daemon_pid(data_dir).is_some_and(process_alive) => {
            println!("\x1b[38;5;226m[!]\x1b[0m Storage is locked by the running supervisor ({})", e);
            println!("Stop it first, or read '\x1b[38;5;51mvigil status\x1b[0m' for the live view");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

pub(super) fn daemon_pid(data_dir: &Path) -> Option<i32> {
    std::fs::read_to_string(data_dir.join(DEFAULT_PID_FILE))
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

pub(super) fn process_alive(pid: i32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        kill(Pid::from_raw(pid), None).is_ok()
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}
