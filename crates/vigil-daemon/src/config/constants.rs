pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_STORAGE_DIR: &str = "data";

pub const DEFAULT_STATUS_FILE: &str = "status.json";

pub const DEFAULT_RESET_DIR: &str = "resets";

pub const DEFAULT_PID_FILE: &str = "vigil.pid";
