use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "vigil")]
#[command(version = BUILD_VERSION)]
#[command(about = "vigil - Self-healing supervisor for queue-based worker fleets")]
#[command(long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(short, long, global = true, value_name = "FILE", help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[arg(short = 'd', long, global = true, value_name = "DIR", env = "VIGIL_DATA_DIR", help = "Data directory path")]
    pub data_dir: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase verbosity (-v, -vv, -vvv)")]
    pub verbose: u8,

    #[arg(short, long, global = true, help = "Suppress non-error output")]
    pub quiet: bool,

    #[arg(long, global = true, value_name = "FILE", help = "Write logs to file")]
    pub log_file: Option<PathBuf>,

    #[arg(long, global = true, help = "Emit logs as JSON")]
    pub log_json: bool,

    #[arg(long, global = true, default_value = "text", help = "Output format")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Start the supervisor")]
    #[command(long_about = "Start the supervision loop.\n\nDiscovers workers, probes them every tick and recovers unhealthy ones until SIGTERM or SIGINT.")]
    Run {
        #[arg(long, value_name = "FILE", help = "Write PID to file (default: <data-dir>/vigil.pid)")]
        pid_file: Option<PathBuf>,
        #[arg(long, help = "Notify systemd when ready")]
        systemd: bool,
    },

    #[command(about = "Write a default configuration")]
    Init {
        #[arg(short, long, help = "Overwrite existing configuration")]
        force: bool,
    },

    #[command(about = "Manage configuration")]
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    #[command(about = "Validate configuration and run one discovery pass")]
    Check,

    #[command(about = "Show the last status digest")]
    Status,

    #[command(about = "List recorded recovery attempts")]
    Attempts {
        #[arg(long, value_name = "ID", help = "Only attempts for this worker")]
        worker: Option<String>,
        #[arg(long, default_value = "20", help = "Maximum number of attempts")]
        limit: usize,
    },

    #[command(about = "Show learned strategy profiles")]
    Profiles,

    #[command(about = "Clear an escalated worker")]
    Reset {
        #[arg(help = "Worker ID")]
        worker_id: String,
    },

    #[command(about = "Stop the supervisor")]
    Stop {
        #[arg(short, long, help = "Force stop (SIGKILL)")]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    #[command(about = "Show current configuration")]
    Show,
    #[command(about = "Validate configuration")]
    Validate,
    #[command(about = "Print the configuration file path")]
    Path,
}
