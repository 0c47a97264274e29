use super::commands::ConfigAction;
use std::path::Path;
use vigil_daemon::DaemonConfig;
use vigil_types::{VigilError, VigilResult};

pub fn handle_config(config_path: &Path, action: Option<ConfigAction>) -> VigilResult<()> {
    match action {
        Some(ConfigAction::Show) | None => {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .map_err(|e| VigilError::Config(format!("Failed to read config: {}", e)))?;
                println!("{}", content);
            } else {
                println!("\x1b[38;5;245mNo configuration file found at {:?}\x1b[0m", config_path);
                println!("Run '\x1b[38;5;51mvigil init\x1b[0m' to create one");
            }
        }
        Some(ConfigAction::Validate) => {
            if config_path.exists() {
                match DaemonConfig::load(config_path) {
                    Ok(config) => {
                        println!("\x1b[38;5;46m[+]\x1b[0m Configuration is valid");
                        println!();
                        print!("{}", config.summary());
                    }
                    Err(e) => println!("\x1b[38;5;196m[-]\x1b[0m Configuration error: {}", e),
                }
            } else {
                println!("\x1b[38;5;245mNo configuration file found at {:?}\x1b[0m", config_path);
            }
        }
        Some(ConfigAction::Path) => {
            println!("{}", config_path.display());
        }
    }
    Ok(())
}
