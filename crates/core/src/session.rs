use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::entry::{FileRef, OpenFile};
use crate::gateway::{FileSystemGateway, FolderSelection, GatewayError};

/// 工作階段操作的錯誤。 / Errors raised by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("tab index {index} is out of range for {len} open files")]
    IndexOutOfRange { index: usize, len: usize },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// 關閉分頁後的焦點策略。 / Which tab becomes active after a close.
///
/// `First` jumps to the first tab whenever any tab is closed. `Nearest` keeps
/// the previously active tab when a different one is closed, and otherwise moves
/// to the tab that took the closed one's place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseFocus {
    #[default]
    First,
    Nearest,
}

/// 工作階段的唯讀快照。 / Read-only copy of the session state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub open_files: Vec<OpenFile>,
    pub active_index: Option<usize>,
    pub current_directory: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct Tabs {
    files: Vec<OpenFile>,
    active: Option<usize>,
}

impl Tabs {
    fn position_of(&self, path: &Path) -> Option<usize> {
        self.files.iter().position(|file| file.path() == path)
    }

    fn check_index(&self, index: usize) -> Result<(), SessionError> {
        let len = self.files.len();
        if index >= len {
            return Err(SessionError::IndexOutOfRange { index, len });
        }
        Ok(())
    }
}

/// 開啟檔案、作用中分頁與目前資料夾的唯一來源。 / Single source of truth for open files, the active tab and the open folder.
///
/// State lives behind short critical sections that are never held across an
/// `await`, so concurrent callers observe each mutation as a whole. File reads
/// append in the order they resolve.
pub struct SessionStore {
    gateway: Arc<dyn FileSystemGateway>,
    tabs: Mutex<Tabs>,
    directory: watch::Sender<Option<PathBuf>>,
    close_focus: CloseFocus,
}

impl SessionStore {
    pub fn new(gateway: Arc<dyn FileSystemGateway>) -> Self {
        let (directory, _) = watch::channel(None);
        Self {
            gateway,
            tabs: Mutex::new(Tabs::default()),
            directory,
            close_focus: CloseFocus::default(),
        }
    }

    pub fn with_close_focus(mut self, close_focus: CloseFocus) -> Self {
        self.close_focus = close_focus;
        self
    }

    pub fn gateway(&self) -> &Arc<dyn FileSystemGateway> {
        &self.gateway
    }

    /// 開啟檔案；已開啟的路徑只會切換焦點。 / Opens a file, or only focuses it when its path is already open.
    ///
    /// Returns the index of the now-active tab. A path that is already open is
    /// never read again.
    pub async fn open_file(&self, file: FileRef) -> Result<usize, SessionError> {
        if let Some(index) = self.activate_existing(&file.path) {
            debug!(path = %file.path.display(), index, "file already open, focusing tab");
            return Ok(index);
        }

        let content = self.gateway.read_file(&file.path).await?;

        let mut tabs = self.tabs();
        // Another open of the same path may have resolved while this read was pending.
        if let Some(index) = tabs.position_of(&file.path) {
            tabs.active = Some(index);
            return Ok(index);
        }
        debug!(path = %file.path.display(), bytes = content.len(), "opened file");
        tabs.files.push(OpenFile::new(file, content));
        let index = tabs.files.len() - 1;
        tabs.active = Some(index);
        Ok(index)
    }

    /// 關閉指定分頁並回傳被移除的檔案。 / Closes the tab at `index` and returns the removed file.
    pub fn close_file(&self, index: usize) -> Result<OpenFile, SessionError> {
        let mut tabs = self.tabs();
        tabs.check_index(index)?;

        let previous = tabs.active;
        let removed = tabs.files.remove(index);
        let remaining = tabs.files.len();
        tabs.active = if remaining == 0 {
            None
        } else {
            Some(match self.close_focus {
                CloseFocus::First => 0,
                CloseFocus::Nearest => nearest_after_close(previous, index, remaining),
            })
        };
        debug!(path = %removed.path().display(), active = ?tabs.active, "closed file");
        Ok(removed)
    }

    pub fn set_active_index(&self, index: usize) -> Result<(), SessionError> {
        let mut tabs = self.tabs();
        tabs.check_index(index)?;
        tabs.active = Some(index);
        Ok(())
    }

    /// 判斷路徑是否為目前作用中的分頁。 / Returns `true` only when `path` is the active tab.
    ///
    /// Use [`SessionStore::position_of`] to ask whether a path is open at all.
    pub fn is_file_open(&self, path: impl AsRef<Path>) -> bool {
        let tabs = self.tabs();
        match (tabs.position_of(path.as_ref()), tabs.active) {
            (Some(position), Some(active)) => position == active,
            _ => false,
        }
    }

    pub fn position_of(&self, path: impl AsRef<Path>) -> Option<usize> {
        self.tabs().position_of(path.as_ref())
    }

    /// 透過資料夾選擇器切換目前資料夾。 / Switches the open folder through the folder picker.
    ///
    /// Returns the newly selected folder, or `None` when the picker was cancelled
    /// or returned several folders.
    pub async fn open_folder(&self) -> Result<Option<PathBuf>, SessionError> {
        match self.gateway.pick_folder().await? {
            FolderSelection::Selected(path) => {
                self.set_current_directory(path.clone());
                Ok(Some(path))
            }
            FolderSelection::Cancelled => {
                debug!("folder picker cancelled");
                Ok(None)
            }
            FolderSelection::Multiple(paths) => {
                warn!(
                    count = paths.len(),
                    "folder picker returned several folders; a session holds exactly one"
                );
                Ok(None)
            }
        }
    }

    /// 設定目前資料夾，值有變動時才通知觀察者。 / Sets the open folder; observers are woken only on an actual change.
    pub fn set_current_directory(&self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        let changed = self.directory.send_if_modified(|current| {
            if current.as_deref() == Some(path.as_path()) {
                return false;
            }
            *current = Some(path.clone());
            true
        });
        if changed {
            info!(directory = %path.display(), "current directory changed");
        }
        changed
    }

    pub fn current_directory(&self) -> Option<PathBuf> {
        self.directory.borrow().clone()
    }

    /// 訂閱目前資料夾的變更。 / Subscribes to changes of the open folder.
    pub fn subscribe_directory(&self) -> watch::Receiver<Option<PathBuf>> {
        self.directory.subscribe()
    }

    pub fn open_files(&self) -> Vec<OpenFile> {
        self.tabs().files.clone()
    }

    pub fn active_index(&self) -> Option<usize> {
        self.tabs().active
    }

    pub fn active_file(&self) -> Option<OpenFile> {
        let tabs = self.tabs();
        tabs.active.and_then(|index| tabs.files.get(index).cloned())
    }

    pub fn len(&self) -> usize {
        self.tabs().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs().files.is_empty()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let tabs = self.tabs();
        SessionSnapshot {
            open_files: tabs.files.clone(),
            active_index: tabs.active,
            current_directory: self.current_directory(),
        }
    }

    fn activate_existing(&self, path: &Path) -> Option<usize> {
        let mut tabs = self.tabs();
        let index = tabs.position_of(path)?;
        tabs.active = Some(index);
        Some(index)
    }

    fn tabs(&self) -> MutexGuard<'_, Tabs> {
        self.tabs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tabs = self.tabs();
        f.debug_struct("SessionStore")
            .field("open_files", &tabs.files.len())
            .field("active", &tabs.active)
            .field("current_directory", &*self.directory.borrow())
            .field("close_focus", &self.close_focus)
            .finish()
    }
}

fn nearest_after_close(previous: Option<usize>, closed: usize, remaining: usize) -> usize {
    match previous {
        Some(active) if active < closed => active,
        Some(active) if active > closed => active - 1,
        _ => closed.min(remaining - 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryGateway;

    fn store_with_files(paths: &[&str]) -> (Arc<MemoryGateway>, SessionStore) {
        let gateway = Arc::new(MemoryGateway::new());
        for path in paths {
            gateway.insert_file(path, format!("contents of {path}"));
        }
        let store = SessionStore::new(gateway.clone());
        (gateway, store)
    }

    #[tokio::test]
    async fn opening_same_path_twice_keeps_one_tab() {
        let (gateway, store) = store_with_files(&["/w/a.rs", "/w/b.rs"]);

        store.open_file(FileRef::new("/w/a.rs")).await.unwrap();
        store.open_file(FileRef::new("/w/b.rs")).await.unwrap();
        let index = store.open_file(FileRef::new("/w/a.rs")).await.unwrap();

        assert_eq!(index, 0);
        assert_eq!(store.len(), 2);
        assert_eq!(store.active_index(), Some(0));
        assert_eq!(gateway.read_calls(), vec![PathBuf::from("/w/a.rs"), PathBuf::from("/w/b.rs")]);
    }

    #[tokio::test]
    async fn sequential_opens_append_and_focus_last() {
        let (_, store) = store_with_files(&["/w/1", "/w/2", "/w/3"]);
        for path in ["/w/1", "/w/2", "/w/3"] {
            store.open_file(FileRef::new(path)).await.unwrap();
        }

        let names: Vec<_> = store.open_files().iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["1", "2", "3"]);
        assert_eq!(store.active_index(), Some(2));
        assert_eq!(store.active_file().unwrap().content(), "contents of /w/3");
    }

    #[tokio::test]
    async fn open_keeps_requested_label() {
        let (_, store) = store_with_files(&["/w/readme.md"]);
        store
            .open_file(FileRef::with_name("/w/readme.md", "README"))
            .await
            .unwrap();
        assert_eq!(store.open_files()[0].name(), "README");
    }

    #[tokio::test]
    async fn read_failure_leaves_session_untouched() {
        let (_, store) = store_with_files(&["/w/a.rs"]);
        store.open_file(FileRef::new("/w/a.rs")).await.unwrap();

        let err = store.open_file(FileRef::new("/w/missing.rs")).await.unwrap_err();
        assert!(matches!(err, SessionError::Gateway(GatewayError::NotFound(_))));
        assert_eq!(store.len(), 1);
        assert_eq!(store.active_index(), Some(0));
    }

    #[tokio::test]
    async fn closing_sole_file_clears_active_index() {
        let (_, store) = store_with_files(&["/w/a.rs"]);
        store.open_file(FileRef::new("/w/a.rs")).await.unwrap();

        let removed = store.close_file(0).unwrap();
        assert_eq!(removed.path(), Path::new("/w/a.rs"));
        assert!(store.is_empty());
        assert_eq!(store.active_index(), None);
    }

    #[tokio::test]
    async fn closing_middle_tab_focuses_first_tab() {
        let (_, store) = store_with_files(&["/w/1", "/w/2", "/w/3"]);
        for path in ["/w/1", "/w/2", "/w/3"] {
            store.open_file(FileRef::new(path)).await.unwrap();
        }

        store.close_file(1).unwrap();
        assert_eq!(store.len(), 2);
        // The previously active tab (/w/3) is not preserved.
        assert_eq!(store.active_index(), Some(0));
    }

    #[tokio::test]
    async fn nearest_focus_keeps_active_tab_identity() {
        let (gateway, _) = store_with_files(&["/w/1", "/w/2", "/w/3"]);
        let store = SessionStore::new(gateway).with_close_focus(CloseFocus::Nearest);
        for path in ["/w/1", "/w/2", "/w/3"] {
            store.open_file(FileRef::new(path)).await.unwrap();
        }

        store.close_file(1).unwrap();
        assert_eq!(store.active_file().unwrap().path(), Path::new("/w/3"));

        store.close_file(1).unwrap();
        assert_eq!(store.active_file().unwrap().path(), Path::new("/w/1"));
    }

    #[test]
    fn nearest_after_close_picks_neighbour() {
        assert_eq!(nearest_after_close(Some(0), 2, 3), 0);
        assert_eq!(nearest_after_close(Some(3), 1, 3), 2);
        assert_eq!(nearest_after_close(Some(2), 2, 2), 1);
        assert_eq!(nearest_after_close(Some(1), 1, 3), 1);
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let (_, store) = store_with_files(&[]);
        let err = store.close_file(0).unwrap_err();
        assert!(matches!(err, SessionError::IndexOutOfRange { index: 0, len: 0 }));
        assert!(store.set_active_index(3).is_err());
        assert_eq!(store.active_index(), None);
    }

    #[tokio::test]
    async fn is_file_open_answers_for_active_tab_only() {
        let (_, store) = store_with_files(&["/w/a", "/w/b"]);
        store.open_file(FileRef::new("/w/a")).await.unwrap();
        store.open_file(FileRef::new("/w/b")).await.unwrap();

        assert!(store.is_file_open("/w/b"));
        assert!(!store.is_file_open("/w/a"));
        assert_eq!(store.position_of("/w/a"), Some(0));

        store.set_active_index(0).unwrap();
        assert!(store.is_file_open("/w/a"));
        assert!(!store.is_file_open("/w/unknown"));
    }

    #[tokio::test]
    async fn concurrent_opens_append_in_resolution_order() {
        let (gateway, store) = store_with_files(&["/w/slow", "/w/fast"]);
        let release = gateway.hold_read("/w/slow");

        let (slow, fast) = tokio::join!(store.open_file(FileRef::new("/w/slow")), async {
            let index = store.open_file(FileRef::new("/w/fast")).await;
            release.release();
            index
        });

        assert_eq!(fast.unwrap(), 0);
        assert_eq!(slow.unwrap(), 1);
        let paths: Vec<_> = store.open_files().iter().map(|f| f.path().to_path_buf()).collect();
        assert_eq!(paths, vec![PathBuf::from("/w/fast"), PathBuf::from("/w/slow")]);
        assert_eq!(store.active_index(), Some(1));
    }

    #[tokio::test]
    async fn concurrent_opens_of_same_path_stay_unique() {
        let (gateway, store) = store_with_files(&["/w/a"]);
        let release = gateway.hold_read("/w/a");

        let (first, second) = tokio::join!(store.open_file(FileRef::new("/w/a")), async {
            tokio::task::yield_now().await;
            let pending = store.open_file(FileRef::new("/w/a"));
            release.release();
            pending.await
        });

        assert_eq!(first.unwrap(), 0);
        assert_eq!(second.unwrap(), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn open_folder_applies_single_selection() {
        let (gateway, store) = store_with_files(&[]);
        gateway.queue_pick(FolderSelection::Selected(PathBuf::from("/w")));
        let mut directory = store.subscribe_directory();

        let picked = store.open_folder().await.unwrap();
        assert_eq!(picked, Some(PathBuf::from("/w")));
        assert_eq!(store.current_directory(), Some(PathBuf::from("/w")));
        assert!(directory.has_changed().unwrap());
    }

    #[tokio::test]
    async fn cancelled_or_multiple_picks_leave_directory_unchanged() {
        let (gateway, store) = store_with_files(&[]);
        store.set_current_directory("/w");
        gateway.queue_pick(FolderSelection::Cancelled);
        gateway.queue_pick(FolderSelection::Multiple(vec!["/x".into(), "/y".into()]));

        assert_eq!(store.open_folder().await.unwrap(), None);
        assert_eq!(store.open_folder().await.unwrap(), None);
        assert_eq!(store.current_directory(), Some(PathBuf::from("/w")));
    }

    #[test]
    fn setting_same_directory_does_not_notify() {
        let (_, store) = store_with_files(&[]);
        assert!(store.set_current_directory("/w"));
        let mut directory = store.subscribe_directory();
        assert!(!store.set_current_directory("/w"));
        assert!(!directory.has_changed().unwrap());
        assert!(store.set_current_directory("/v"));
        assert!(directory.has_changed().unwrap());
    }
}
