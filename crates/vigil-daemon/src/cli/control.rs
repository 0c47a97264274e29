use super::inspect::{daemon_pid, process_alive};
use std::path::Path;
use vigil_daemon::{DaemonConfig, ResetInbox};
use vigil_types::{VigilResult, WorkerId};

/// Drops a reset request into the inbox the running supervisor drains on
/// its next tick.
pub fn request_reset(config_path: &Path, data_dir: &Path, worker_id: String) -> VigilResult<()> {
    let mut config = DaemonConfig::load(config_path)?;
    config.data_dir = data_dir.to_path_buf();

    let worker_id = WorkerId::new(worker_id);
    let path = ResetInbox::request(&config.reset_dir(), &worker_id)?;
    println!("\x1b[38;5;46m[+]\x1b[0m Reset requested for {} ({:?})", worker_id, path);

    if !daemon_pid(data_dir).is_some_and(process_alive) {
        println!("\x1b[38;5;226m[!]\x1b[0m Supervisor is not running; the request is applied on next start");
    }
    Ok(())
}

pub async fn stop_daemon(data_dir: &Path, force: bool) -> VigilResult<()> {
    let Some(pid) = daemon_pid(data_dir) else {
        println!("\x1b[38;5;245mNo PID file found. Supervisor may not be running.\x1b[0m");
        return Ok(());
    };

    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
        match kill(Pid::from_raw(pid), signal) {
            Ok(_) => println!("\x1b[38;5;46m[+]\x1b[0m Sent {} to process {}", signal.as_str(), pid),
            Err(e) => println!("\x1b[38;5;196m[-]\x1b[0m Failed to signal process: {}", e),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = force;
        println!("Stop not supported on this platform. Kill process {} manually.", pid);
    }
    Ok(())
}
