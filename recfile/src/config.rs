//! Engine configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default upper bound on a single recutils command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time to wait for another writer to release a store
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration shared by the evaluation capability and the mutation engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding `recsel`, `recinf` and `rec2csv` (None = resolve via PATH)
    pub recutils_dir: Option<PathBuf>,
    /// Hard bound on each recutils invocation
    pub command_timeout: Duration,
    /// How long a mutation waits for the store lock
    pub lock_timeout: Duration,
    /// Take an advisory lock around insert/update/delete
    pub use_lock: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            recutils_dir: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            use_lock: true,
        }
    }
}

impl EngineConfig {
    /// Resolve a recutils program name against `recutils_dir`
    pub fn program(&self, name: &str) -> PathBuf {
        match &self.recutils_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }
}

/// Expand a leading `~/` against the user's home directory
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    Path::new(path).to_path_buf()
}
