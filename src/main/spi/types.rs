use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Error type for discovery operations.
#[derive(Debug)]
pub enum DiscoveryError {
    /// A configuration error: invalid pattern override, unknown strategy.
    Config(String),
    /// An I/O error with the failing path attached.
    Io { path: PathBuf, source: io::Error },
    /// Reconciliation failed under the active strategy (no merged catalog).
    Reconcile { key: String, message: String },
    /// The operation was cancelled via its [`CancelToken`].
    Cancelled,
    /// The catalog repository reported a non-retryable failure.
    Repo(RepoError),
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::Config(msg) => write!(f, "Configuration error: {}", msg),
            DiscoveryError::Io { path, source } => {
                write!(f, "IO error at '{}': {}", path.display(), source)
            }
            DiscoveryError::Reconcile { key, message } => {
                write!(f, "Reconciliation error for '{}': {}", key, message)
            }
            DiscoveryError::Cancelled => write!(f, "Operation cancelled"),
            DiscoveryError::Repo(e) => write!(f, "Repository error: {}", e),
        }
    }
}

impl std::error::Error for DiscoveryError {}

impl From<RepoError> for DiscoveryError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Cancelled => DiscoveryError::Cancelled,
            other => DiscoveryError::Repo(other),
        }
    }
}

/// Error type for repository operations.
#[derive(Debug)]
pub enum RepoError {
    /// A uniqueness violation on task-identifier registration. Retryable:
    /// re-read the max sequence and re-propose.
    Conflict(String),
    /// The call observed a cancelled token before completing.
    Cancelled,
    /// Any other backend failure (connection, query, schema).
    Backend(String),
}

impl fmt::Display for RepoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoError::Conflict(key) => write!(f, "Duplicate task identifier '{}'", key),
            RepoError::Cancelled => write!(f, "Repository call cancelled"),
            RepoError::Backend(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for RepoError {}

/// Cooperative cancellation flag shared between the caller and the engine.
///
/// Cloning is cheap; all clones observe the same flag. The engine checks the
/// token between phases and passes it into every repository call. There are
/// no implicit timeouts: callers that want one cancel the token themselves.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
