//! Boundary contract between the session core and the environment that owns the
//! file system.
//!
//! The core never touches the disk directly: listing, reading, searching, picking
//! a folder and change notification all go through [`FileSystemGateway`]. Every
//! method is an await point, so the caller yields while the environment works.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

use crate::entry::DirectoryEntry;

/// 預設的變更事件緩衝容量。 / Default capacity of a change feed before subscribers lag.
pub const DEFAULT_CHANGE_CAPACITY: usize = 256;

/// 閘道操作的錯誤。 / Failures reported by a gateway implementation.
///
/// The core passes these through untouched; it never retries.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("path already exists: {}", .0.display())]
    AlreadyExists(PathBuf),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is not a supported text encoding", .0.display())]
    InvalidEncoding(PathBuf),
    #[error("operation not supported by this gateway: {0}")]
    Unsupported(&'static str),
    #[error("change monitor error: {0}")]
    Watch(String),
    #[error("invalid search query: {0}")]
    Search(String),
}

impl GatewayError {
    /// 依 I/O 錯誤種類轉換成較精確的變體。 / Maps an I/O error onto the closest variant.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => GatewayError::NotFound(path),
            io::ErrorKind::AlreadyExists => GatewayError::AlreadyExists(path),
            _ => GatewayError::Io { path, source },
        }
    }
}

/// 資料夾選擇器的結果。 / Outcome of the native folder picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderSelection {
    Selected(PathBuf),
    Cancelled,
    /// Pickers are asked for a single folder; the session rejects this outcome.
    Multiple(Vec<PathBuf>),
}

/// 變更事件的種類。 / Classifies an external file-system change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
    Renamed { from: PathBuf, to: PathBuf },
    Other,
    /// The subscriber fell behind and `dropped` events were lost.
    Overflow { dropped: u64 },
}

/// 外部變更通知。 / A change notification for the directory the gateway is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: Option<PathBuf>,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: Some(path.into()),
            kind,
        }
    }

    pub fn overflow(dropped: u64) -> Self {
        Self {
            path: None,
            kind: ChangeKind::Overflow { dropped },
        }
    }
}

/// 可取消的變更訂閱，丟棄即取消。 / Cancellable change subscription; dropping it unsubscribes.
#[derive(Debug)]
pub struct ChangeSubscription {
    rx: broadcast::Receiver<ChangeEvent>,
}

impl ChangeSubscription {
    pub fn new(rx: broadcast::Receiver<ChangeEvent>) -> Self {
        Self { rx }
    }

    /// 等待下一個事件；來源關閉時回傳 `None`。 / Waits for the next event, `None` once the source is gone.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        match self.rx.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(dropped)) => {
                warn!(dropped, "change subscriber lagged behind");
                Some(ChangeEvent::overflow(dropped))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

/// Fan-out helper shared by gateway implementations.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// 發佈事件，回傳收到事件的訂閱者數量。 / Publishes an event, returning how many subscribers saw it.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> ChangeSubscription {
        ChangeSubscription::new(self.tx.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CHANGE_CAPACITY)
    }
}

/// 工作階段核心所依賴的外部檔案系統介面。 / File-system collaborator used by the session core.
#[async_trait]
pub trait FileSystemGateway: Send + Sync {
    /// Lists the direct children of `path`.
    async fn list_directory(&self, path: &Path) -> Result<Vec<DirectoryEntry>, GatewayError>;

    /// Reads the full text content of the file at `path`.
    async fn read_file(&self, path: &Path) -> Result<String, GatewayError>;

    /// Recursively searches `root` for entries matching `query`.
    async fn search(&self, root: &Path, query: &str) -> Result<Vec<DirectoryEntry>, GatewayError>;

    /// Asks the user for a single folder.
    async fn pick_folder(&self) -> Result<FolderSelection, GatewayError>;

    /// Subscribes to change notifications for whichever directory is in scope.
    async fn subscribe_changes(&self) -> Result<ChangeSubscription, GatewayError>;

    /// Tells the gateway which directory change notifications should cover.
    async fn scope_changes(&self, _directory: &Path) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn create_file(&self, _path: &Path) -> Result<DirectoryEntry, GatewayError> {
        Err(GatewayError::Unsupported("create file"))
    }

    async fn create_directory(&self, _path: &Path) -> Result<DirectoryEntry, GatewayError> {
        Err(GatewayError::Unsupported("create directory"))
    }
}
