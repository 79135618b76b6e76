use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use crate::entry::DirectoryEntry;
use crate::gateway::{FileSystemGateway, GatewayError};
use crate::session::SessionStore;

/// 檔案總管操作的錯誤。 / Errors raised by explorer operations.
#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("no directory is open")]
    NoDirectory,
    #[error("invalid entry name {0:?}")]
    InvalidName(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// 一次重新整理或搜尋的結果。 / What happened to a listing or search request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied { entries: usize },
    /// No directory is open; nothing was requested.
    NoDirectory,
    /// The response arrived for a directory that is no longer current, or a
    /// newer response was already applied. It was dropped.
    Stale,
}

/// 清單與搜尋結果的版本號，每次套用新結果時遞增。 / Revision counters bumped whenever a new result is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedRevision {
    pub listing: u64,
    pub search: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExplorerSnapshot {
    pub listing: Vec<DirectoryEntry>,
    pub listing_directory: Option<PathBuf>,
    pub search_term: String,
    pub search_results: Vec<DirectoryEntry>,
}

#[derive(Debug, Default)]
struct FeedState {
    listing: Vec<DirectoryEntry>,
    listing_directory: Option<PathBuf>,
    listing_ticket: u64,
    search_term: String,
    search_results: Vec<DirectoryEntry>,
    search_ticket: u64,
}

/// 側邊欄顯示的目錄清單與搜尋結果快取。 / Listing and search-result cache shown in the side panel.
///
/// Results are stale-tolerant: a failed request keeps the previous value and is
/// not retried. Every request carries a ticket and the directory it targeted, so
/// a response that arrives after the directory changed, or after a newer
/// response, is dropped instead of overwriting fresher state.
pub struct ExplorerFeed {
    gateway: Arc<dyn FileSystemGateway>,
    session: Arc<SessionStore>,
    state: Mutex<FeedState>,
    tickets: AtomicU64,
    revisions: watch::Sender<FeedRevision>,
}

impl ExplorerFeed {
    pub fn new(session: Arc<SessionStore>) -> Self {
        let (revisions, _) = watch::channel(FeedRevision::default());
        Self {
            gateway: session.gateway().clone(),
            session,
            state: Mutex::new(FeedState::default()),
            tickets: AtomicU64::new(0),
            revisions,
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn gateway(&self) -> &Arc<dyn FileSystemGateway> {
        &self.gateway
    }

    /// 重新讀取目前資料夾的清單。 / Re-lists the current directory.
    ///
    /// Without an open directory this is a no-op and the previous listing stays.
    pub async fn refresh_listing(&self) -> Result<RefreshOutcome, ExplorerError> {
        let Some(directory) = self.session.current_directory() else {
            return Ok(RefreshOutcome::NoDirectory);
        };
        let ticket = self.next_ticket();
        let entries = self.gateway.list_directory(&directory).await?;

        if !self.is_current(&directory) {
            debug!(directory = %directory.display(), "dropping listing for a directory that is no longer open");
            return Ok(RefreshOutcome::Stale);
        }
        let count = entries.len();
        {
            let mut state = self.state();
            if ticket < state.listing_ticket {
                debug!(ticket, latest = state.listing_ticket, "dropping superseded listing");
                return Ok(RefreshOutcome::Stale);
            }
            state.listing_ticket = ticket;
            state.listing = entries;
            state.listing_directory = Some(directory);
        }
        self.revisions.send_modify(|revision| revision.listing += 1);
        Ok(RefreshOutcome::Applied { entries: count })
    }

    /// 暫存搜尋字串但不執行搜尋。 / Buffers the search term without searching.
    pub fn set_search_term(&self, term: impl Into<String>) {
        self.state().search_term = term.into();
    }

    /// 設定搜尋字串並立即搜尋。 / Stores `term` and searches the current directory for it.
    pub async fn search(&self, term: impl Into<String>) -> Result<RefreshOutcome, ExplorerError> {
        self.set_search_term(term);
        self.search_buffered().await
    }

    /// 以暫存的搜尋字串執行搜尋。 / Runs the search for the buffered term.
    pub async fn search_buffered(&self) -> Result<RefreshOutcome, ExplorerError> {
        let Some(directory) = self.session.current_directory() else {
            return Ok(RefreshOutcome::NoDirectory);
        };
        let term = self.search_term();
        let ticket = self.next_ticket();
        let results = self.gateway.search(&directory, &term).await?;

        if !self.is_current(&directory) {
            debug!(directory = %directory.display(), "dropping search results for a directory that is no longer open");
            return Ok(RefreshOutcome::Stale);
        }
        let count = results.len();
        {
            let mut state = self.state();
            if ticket < state.search_ticket {
                return Ok(RefreshOutcome::Stale);
            }
            state.search_ticket = ticket;
            state.search_results = results;
        }
        debug!(term = %term, hits = count, "search results updated");
        self.revisions.send_modify(|revision| revision.search += 1);
        Ok(RefreshOutcome::Applied { entries: count })
    }

    /// 在目前資料夾建立空白檔案並重新整理清單。 / Creates an empty file in the current directory and refreshes the listing.
    pub async fn create_file(&self, name: &str) -> Result<DirectoryEntry, ExplorerError> {
        let path = self.child_path(name)?;
        let entry = self.gateway.create_file(&path).await?;
        self.refresh_listing().await?;
        Ok(entry)
    }

    pub async fn create_directory(&self, name: &str) -> Result<DirectoryEntry, ExplorerError> {
        let path = self.child_path(name)?;
        let entry = self.gateway.create_directory(&path).await?;
        self.refresh_listing().await?;
        Ok(entry)
    }

    pub fn listing(&self) -> Vec<DirectoryEntry> {
        self.state().listing.clone()
    }

    pub fn listing_directory(&self) -> Option<PathBuf> {
        self.state().listing_directory.clone()
    }

    pub fn search_term(&self) -> String {
        self.state().search_term.clone()
    }

    pub fn search_results(&self) -> Vec<DirectoryEntry> {
        self.state().search_results.clone()
    }

    pub fn snapshot(&self) -> ExplorerSnapshot {
        let state = self.state();
        ExplorerSnapshot {
            listing: state.listing.clone(),
            listing_directory: state.listing_directory.clone(),
            search_term: state.search_term.clone(),
            search_results: state.search_results.clone(),
        }
    }

    pub fn revision(&self) -> FeedRevision {
        *self.revisions.borrow()
    }

    /// 訂閱結果更新，用於觸發重新繪製。 / Subscribes to result updates, e.g. to trigger a re-render.
    pub fn subscribe_updates(&self) -> watch::Receiver<FeedRevision> {
        self.revisions.subscribe()
    }

    fn child_path(&self, name: &str) -> Result<PathBuf, ExplorerError> {
        let directory = self
            .session
            .current_directory()
            .ok_or(ExplorerError::NoDirectory)?;
        let trimmed = name.trim();
        let is_plain = !trimmed.is_empty()
            && trimmed != "."
            && trimmed != ".."
            && !trimmed.contains(['/', '\\']);
        if !is_plain {
            return Err(ExplorerError::InvalidName(name.to_string()));
        }
        Ok(directory.join(trimmed))
    }

    fn is_current(&self, directory: &Path) -> bool {
        self.session.current_directory().as_deref() == Some(directory)
    }

    fn next_ticket(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn state(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ExplorerFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("ExplorerFeed")
            .field("listing", &state.listing.len())
            .field("listing_directory", &state.listing_directory)
            .field("search_term", &state.search_term)
            .field("search_results", &state.search_results.len())
            .finish()
    }
}
