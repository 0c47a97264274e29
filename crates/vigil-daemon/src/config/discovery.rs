use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use super::types::DiscoveryMode;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub mode: DiscoveryMode,
    pub heartbeat_dir: Option<PathBuf>,
    pub backlog_dir: Option<PathBuf>,
}

/// How to recognise, identify and (re)start one kind of worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerTypeConfig {
    pub name: String,
    pub match_pattern: String,
    #[serde(default)]
    pub id_flag: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}
