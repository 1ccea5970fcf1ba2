//! Locate a document inside a deal folder.
//!
//! Deal folders live on synced shares where a file can appear a few seconds
//! after it was announced, so a miss is retried with linear backoff:
//! `initial_delay * (attempt + 1)` (10 s, then 20 s by default).

use crate::pipeline::llm::{Sleeper, TokioSleeper};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_LOCATE_ATTEMPTS: u32 = 3;
pub const DEFAULT_LOCATE_DELAY: Duration = Duration::from_secs(10);

/// Resolves `(container, file name)` to a path on disk.
#[async_trait]
pub trait FileLocator: Send + Sync {
    async fn locate(&self, container: &str, file_name: &str) -> Option<PathBuf>;
}

/// Searches `<root>/<container>/**/<file_name>` under each root in order.
pub struct DirectoryLocator {
    roots: Vec<PathBuf>,
    attempts: u32,
    initial_delay: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl DirectoryLocator {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            attempts: DEFAULT_LOCATE_ATTEMPTS,
            initial_delay: DEFAULT_LOCATE_DELAY,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_retries(mut self, attempts: u32, initial_delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.initial_delay = initial_delay;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn search_once(&self, container: &str, file_name: &str) -> Option<PathBuf> {
        self.roots
            .iter()
            .map(|root| root.join(container))
            .filter(|dir| dir.is_dir())
            .find_map(|dir| find_file(&dir, file_name))
    }
}

#[async_trait]
impl FileLocator for DirectoryLocator {
    async fn locate(&self, container: &str, file_name: &str) -> Option<PathBuf> {
        for attempt in 0..self.attempts {
            if let Some(found) = self.search_once(container, file_name) {
                debug!("Located {} at {}", file_name, found.display());
                return Some(found);
            }
            if attempt + 1 < self.attempts {
                let delay = self.initial_delay * (attempt + 1);
                info!("File {} not found in {}. Retrying in {:?}", file_name, container, delay);
                self.sleeper.sleep(delay).await;
            }
        }
        warn!(
            "Failed to find {} in {} after {} attempts",
            file_name, container, self.attempts
        );
        None
    }
}

/// Depth-first search for a regular file named `file_name`.
fn find_file(dir: &Path, file_name: &str) -> Option<PathBuf> {
    let direct = dir.join(file_name);
    if direct.is_file() {
        return Some(direct);
    }

    let mut subdirs: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    subdirs.sort();
    subdirs.iter().find_map(|d| find_file(d, file_name))
}
