use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;
use vigil_types::{VigilError, VigilResult, WorkerId};

const REQUEST_EXT: &str = "reset";

/// Directory of pending reset requests. The CLI drops one file per request;
/// the daemon handles them on every tick once discovery has run.
pub struct ResetInbox {
    dir: PathBuf,
}

impl ResetInbox {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Queues a reset for `worker_id` and returns the request file.
    pub fn request(dir: &Path, worker_id: &WorkerId) -> VigilResult<PathBuf> {
        fs::create_dir_all(dir)
            .map_err(|e| VigilError::Storage(format!("Failed to create {}: {}", dir.display(), e)))?;

        let name = format!("{}.{}", Uuid::new_v4(), REQUEST_EXT);
        let tmp = dir.join(format!(".{}", name));
        let path = dir.join(name);
        fs::write(&tmp, worker_id.as_str())
            .map_err(|e| VigilError::Storage(format!("Failed to write reset request: {}", e)))?;
        fs::rename(&tmp, &path)
            .map_err(|e| VigilError::Storage(format!("Failed to publish reset request: {}", e)))?;
        Ok(path)
    }

    /// Every queued request, oldest first. Requests stay on disk until
    /// [`ResetInbox::complete`]; unreadable or empty files are discarded.
    pub fn pending(&self) -> Vec<ResetRequest> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Cannot read reset inbox {}: {}", self.dir.display(), e);
                return Vec::new();
            }
        };

        let mut files: Vec<(std::time::SystemTime, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(REQUEST_EXT))
            .map(|path| {
                let modified = fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .unwrap_or(std::time::UNIX_EPOCH);
                (modified, path)
            })
            .collect();
        files.sort();

        let mut requests = Vec::with_capacity(files.len());
        for (_, path) in files {
            match fs::read_to_string(&path) {
                Ok(content) if !content.trim().is_empty() => requests.push(ResetRequest {
                    worker_id: WorkerId::new(content.trim()),
                    path,
                }),
                Ok(_) => {
                    warn!("Discarding empty reset request {}", path.display());
                    remove_request(&path);
                }
                Err(e) => {
                    warn!("Discarding unreadable reset request {}: {}", path.display(), e);
                    remove_request(&path);
                }
            }
        }

        if !requests.is_empty() {
            debug!("{} reset request(s) pending", requests.len());
        }
        requests
    }

    /// Removes a handled request from the inbox.
    pub fn complete(&self, request: ResetRequest) {
        remove_request(&request.path);
    }
}

/// One queued reset, backed by its request file.
#[derive(Debug)]
pub struct ResetRequest {
    pub worker_id: WorkerId,
    path: PathBuf,
}

fn remove_request(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("Failed to remove reset request {}: {}", path.display(), e);
    }
}
