use std::path::Path;
use vigil_daemon::DaemonConfig;
use vigil_types::{VigilError, VigilResult};

pub fn init_daemon(config_path: &Path, data_dir: &Path, force: bool) -> VigilResult<()> {
    println!("\x1b[38;5;46mInitializing vigil...\x1b[0m");
    println!();

    if config_path.exists() && !force {
        println!("\x1b[38;5;226mConfiguration already exists at {:?}\x1b[0m", config_path);
        println!("Use --force to overwrite");
        return Ok(());
    }

    std::fs::create_dir_all(data_dir)
        .map_err(|e| VigilError::Config(format!("Failed to create data directory: {}", e)))?;

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| VigilError::Config(format!("Failed to create config directory: {}", e)))?;
    }

    let config = DaemonConfig {
        data_dir: data_dir.to_path_buf(),
        ..Default::default()
    };
    config.save(config_path)?;

    std::fs::create_dir_all(config.reset_dir())
        .map_err(|e| VigilError::Config(format!("Failed to create reset directory: {}", e)))?;

    println!("\x1b[38;5;46m[+]\x1b[0m Config: \x1b[38;5;51m{:?}\x1b[0m", config_path);
    println!("\x1b[38;5;46m[+]\x1b[0m Data:   \x1b[38;5;51m{:?}\x1b[0m", data_dir);
    println!();
    println!("\x1b[38;5;226mNext steps:\x1b[0m");
    println!("  1. Add a [[worker_types]] entry for each kind of worker to supervise");
    println!("  2. Check the setup: \x1b[38;5;51mvigil check\x1b[0m");
    println!("  3. Start supervising: \x1b[38;5;51mvigil run\x1b[0m");

    Ok(())
}
