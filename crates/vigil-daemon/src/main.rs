mod cli;

use clap::Parser;
use cli::{
    default_data_dir, handle_config, init_daemon, init_logging, request_reset, run_checks, run_daemon,
    show_attempts, show_profiles, show_status, stop_daemon, Cli, Commands,
};
use vigil_daemon::config::DEFAULT_CONFIG_FILE;
use vigil_daemon::DaemonConfig;
use vigil_types::VigilResult;

#[tokio::main]
async fn main() -> VigilResult<()> {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let config_path = cli.config.clone().unwrap_or_else(|| data_dir.join(DEFAULT_CONFIG_FILE));

    let logging = std::fs::read_to_string(&config_path)
        .ok()
        .and_then(|content| toml::from_str::<DaemonConfig>(&content).ok())
        .map(|config| config.logging)
        .unwrap_or_default();
    init_logging(&cli, &logging);

    match cli.command {
        Commands::Run { pid_file, systemd } => {
            run_daemon(&config_path, &data_dir, pid_file, systemd).await?;
        }
        Commands::Init { force } => {
            init_daemon(&config_path, &data_dir, force)?;
        }
        Commands::Config { action } => {
            handle_config(&config_path, action)?;
        }
        Commands::Check => {
            run_checks(&config_path, &data_dir).await?;
        }
        Commands::Status => {
            show_status(&config_path, &data_dir, &cli.format).await?;
        }
        Commands::Attempts { worker, limit } => {
            show_attempts(&config_path, &data_dir, worker, limit, &cli.format)?;
        }
        Commands::Profiles => {
            show_profiles(&config_path, &data_dir, &cli.format)?;
        }
        Commands::Reset { worker_id } => {
            request_reset(&config_path, &data_dir, worker_id)?;
        }
        Commands::Stop { force } => {
            stop_daemon(&data_dir, force).await?;
        }
    }

    Ok(())
}
