mod checks;
mod commands;
mod config_cmd;
mod control;
mod init;
mod inspect;
mod run;
mod utils;

pub use checks::run_checks;
pub use commands::{Cli, Commands};
pub use config_cmd::handle_config;
pub use control::{request_reset, stop_daemon};
pub use init::init_daemon;
pub use inspect::{show_attempts, show_profiles, show_status};
pub use run::run_daemon;
pub use utils::{default_data_dir, init_logging};
