use std::io::Write;
use std::path::Path;
use vigil_daemon::{
    DaemonConfig, DiscoveryMode, DiscoverySource, ProcessScanDiscovery, StorageConfig, SupervisorStorage,
};
use vigil_types::VigilResult;

const OK: &str = "\x1b[38;5;46mOK\x1b[0m";
const WARN: &str = "\x1b[38;5;226mWARN\x1b[0m";
const FAIL: &str = "\x1b[38;5;196mFAIL\x1b[0m";

pub async fn run_checks(config_path: &Path, data_dir: &Path) -> VigilResult<()> {
    println!("\x1b[38;5;46mvigil Diagnostics\x1b[0m");
    println!("\x1b[38;5;245m{}\x1b[0m", "═".repeat(50));
    println!();

    let mut passed = 0;
    let mut failed = 0;
    let mut warnings = 0;

    step("[1/5] Configuration:       ");
    let mut config = if config_path.exists() {
        match DaemonConfig::load(config_path) {
            Ok(config) => {
                println!("{}", OK);
                passed += 1;
                config
            }
            Err(e) => {
                println!("{} - {}", FAIL, e);
                failed += 1;
                DaemonConfig::default()
            }
        }
    } else {
        println!("{} - Using defaults", WARN);
        warnings += 1;
        DaemonConfig::default()
    };
    config.data_dir = data_dir.to_path_buf();

    step("[2/5] Data Directory:      ");
    if data_dir.is_dir() {
        println!("{}", OK);
        passed += 1;
    } else if data_dir.exists() {
        println!("{} - Not a directory", FAIL);
        failed += 1;
    } else {
        println!("{} - Will be created on start", WARN);
        warnings += 1;
    }

    step("[3/5] Worker Types:        ");
    if config.worker_types.is_empty() {
        println!("{} - None configured", WARN);
        warnings += 1;
    } else {
        println!("{} ({})", OK, config.worker_types.len());
        passed += 1;
    }

    step("[4/5] Discovery:           ");
    match config.discovery.mode {
        DiscoveryMode::Process => {
            let discovery = ProcessScanDiscovery::new(config.worker_types.clone());
            match discovery.list_workers().await {
                Ok(workers) if workers.is_empty() => {
                    println!("{} - No matching worker processes", WARN);
                    warnings += 1;
                }
                Ok(workers) => {
                    println!("{} ({} workers found)", OK, workers.len());
                    for worker in &workers {
                        println!("        {} [{}] {}", worker.worker_id, worker.worker_type, worker.process_handle);
                    }
                    passed += 1;
                }
                Err(e) => {
                    println!("{} - {}", FAIL, e);
                    failed += 1;
                }
            }
        }
        DiscoveryMode::Roster => {
            println!("{} - Roster mode, nothing to scan", WARN);
            warnings += 1;
        }
    }

    step("[5/5] Storage:             ");
    let storage_dir = config.storage_dir();
    if storage_dir.exists() {
        match SupervisorStorage::open(StorageConfig::from_persistence(&storage_dir, &config.persistence)) {
            Ok(storage) => {
                let sizes = storage.tree_sizes();
                println!(
                    "{} ({} attempts, {} in flight, {} events)",
                    OK, sizes.attempts, sizes.inflight, sizes.events
                );
                passed += 1;
            }
            Err(e) => {
                println!("{} - {} (is the daemon running?)", WARN, e);
                warnings += 1;
            }
        }
    } else {
        println!("{} - Will be created on start", WARN);
        warnings += 1;
    }

    println!();
    println!(
        "Result: \x1b[38;5;46m{} passed\x1b[0m, \x1b[38;5;226m{} warnings\x1b[0m, \x1b[38;5;196m{} failed\x1b[0m",
        passed, warnings, failed
    );
    Ok(())
}

fn step(label: &str) {
    print!("{}", label);
    let _ = std::io::stdout().flush();
}
