//! Editor session and explorer state core.
//!
//! [`SessionStore`] owns the open files, the active tab and the current folder.
//! [`ExplorerFeed`] caches the listing and search results for that folder, and
//! [`ExplorerWatch`] keeps it fresh. Everything that touches the disk goes
//! through a [`FileSystemGateway`].

pub mod config;
pub mod entry;
pub mod explorer;
pub mod gateway;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod watch;

pub use config::{ConfigError, ExplorerConfig, SearchConfig, ShellConfig, WatchConfig};
pub use entry::{display_name, DirectoryEntry, EntryKind, FileRef, OpenFile};
pub use explorer::{ExplorerError, ExplorerFeed, ExplorerSnapshot, FeedRevision, RefreshOutcome};
pub use gateway::{
    ChangeEvent, ChangeFeed, ChangeKind, ChangeSubscription, FileSystemGateway, FolderSelection,
    GatewayError, DEFAULT_CHANGE_CAPACITY,
};
pub use session::{CloseFocus, SessionError, SessionSnapshot, SessionStore};
pub use watch::{ExplorerWatch, WatchOptions};
