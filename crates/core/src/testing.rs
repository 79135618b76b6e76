//! In-memory gateway for exercising the session core without a real file system.
//!
//! `MemoryGateway` records every call, can hold a read or listing until the test
//! releases it (to control resolution order), fails on demand and lets tests
//! emit change notifications by hand.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::entry::DirectoryEntry;
use crate::gateway::{
    ChangeEvent, ChangeFeed, ChangeSubscription, FileSystemGateway, FolderSelection, GatewayError,
};

/// 可注入失敗的閘道操作。 / Gateway operations that can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    List,
    Read,
    Search,
    Pick,
    Subscribe,
    Create,
}

/// 釋放被暫停的請求。 / Releases a held request; dropping it releases as well.
#[derive(Debug)]
pub struct Release(oneshot::Sender<()>);

impl Release {
    pub fn release(self) {
        let _ = self.0.send(());
    }
}

#[derive(Debug, Default)]
struct CallLog {
    list: Vec<PathBuf>,
    read: Vec<PathBuf>,
    search: Vec<(PathBuf, String)>,
    scope: Vec<PathBuf>,
    picks: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    directories: BTreeMap<PathBuf, Vec<DirectoryEntry>>,
    files: BTreeMap<PathBuf, String>,
    searches: HashMap<(PathBuf, String), Vec<DirectoryEntry>>,
    picks: VecDeque<FolderSelection>,
    held_reads: HashMap<PathBuf, oneshot::Receiver<()>>,
    held_lists: HashMap<PathBuf, VecDeque<oneshot::Receiver<()>>>,
    failures: HashMap<GatewayOp, VecDeque<String>>,
    calls: CallLog,
}

#[derive(Debug, Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
    changes: ChangeFeed,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// 設定目錄清單內容。 / Sets the listing returned for `path`.
    pub fn insert_directory(&self, path: impl Into<PathBuf>, entries: Vec<DirectoryEntry>) {
        self.state().directories.insert(path.into(), entries);
    }

    pub fn insert_file(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.state().files.insert(path.into(), content.into());
    }

    /// 指定某查詢的搜尋結果。 / Registers the result of searching `root` for `query`.
    pub fn insert_search(
        &self,
        root: impl Into<PathBuf>,
        query: impl Into<String>,
        entries: Vec<DirectoryEntry>,
    ) {
        self.state()
            .searches
            .insert((root.into(), query.into()), entries);
    }

    pub fn queue_pick(&self, selection: FolderSelection) {
        self.state().picks.push_back(selection);
    }

    /// The next read of `path` waits until the returned handle is released.
    pub fn hold_read(&self, path: impl Into<PathBuf>) -> Release {
        let (tx, rx) = oneshot::channel();
        self.state().held_reads.insert(path.into(), rx);
        Release(tx)
    }

    /// The next listing of `path` waits until the returned handle is released.
    pub fn hold_listing(&self, path: impl Into<PathBuf>) -> Release {
        let (tx, rx) = oneshot::channel();
        self.state()
            .held_lists
            .entry(path.into())
            .or_default()
            .push_back(rx);
        Release(tx)
    }

    /// 讓下一次指定操作失敗。 / Makes the next call of `op` fail as unavailable.
    pub fn fail_next(&self, op: GatewayOp, message: impl Into<String>) {
        self.state()
            .failures
            .entry(op)
            .or_default()
            .push_back(message.into());
    }

    /// 發出變更通知。 / Emits a change notification to every subscriber.
    pub fn emit(&self, event: ChangeEvent) -> usize {
        self.changes.publish(event)
    }

    pub fn subscriber_count(&self) -> usize {
        self.changes.subscriber_count()
    }

    pub fn list_calls(&self) -> Vec<PathBuf> {
        self.state().calls.list.clone()
    }

    pub fn read_calls(&self) -> Vec<PathBuf> {
        self.state().calls.read.clone()
    }

    pub fn search_calls(&self) -> Vec<(PathBuf, String)> {
        self.state().calls.search.clone()
    }

    pub fn scoped_directories(&self) -> Vec<PathBuf> {
        self.state().calls.scope.clone()
    }

    pub fn pick_calls(&self) -> usize {
        self.state().calls.picks
    }

    pub fn file_content(&self, path: impl AsRef<Path>) -> Option<String> {
        self.state().files.get(path.as_ref()).cloned()
    }

    fn take_failure(&self, op: GatewayOp) -> Result<(), GatewayError> {
        match self.state().failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(message) => Err(GatewayError::Unavailable(message)),
            None => Ok(()),
        }
    }

    fn add_child(&self, entry: DirectoryEntry) {
        if let Some(parent) = entry.path.parent() {
            self.state()
                .directories
                .entry(parent.to_path_buf())
                .or_default()
                .push(entry);
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl FileSystemGateway for MemoryGateway {
    async fn list_directory(&self, path: &Path) -> Result<Vec<DirectoryEntry>, GatewayError> {
        let hold = {
            let mut state = self.state();
            state.calls.list.push(path.to_path_buf());
            state
                .held_lists
                .get_mut(path)
                .and_then(VecDeque::pop_front)
        };
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        self.take_failure(GatewayOp::List)?;
        self.state()
            .directories
            .get(path)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(path.to_path_buf()))
    }

    async fn read_file(&self, path: &Path) -> Result<String, GatewayError> {
        let hold = {
            let mut state = self.state();
            state.calls.read.push(path.to_path_buf());
            state.held_reads.remove(path)
        };
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        self.take_failure(GatewayOp::Read)?;
        self.state()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(path.to_path_buf()))
    }

    async fn search(&self, root: &Path, query: &str) -> Result<Vec<DirectoryEntry>, GatewayError> {
        self.state()
            .calls
            .search
            .push((root.to_path_buf(), query.to_string()));
        self.take_failure(GatewayOp::Search)?;

        let state = self.state();
        if let Some(entries) = state.searches.get(&(root.to_path_buf(), query.to_string())) {
            return Ok(entries.clone());
        }
        if query.is_empty() {
            return Ok(Vec::new());
        }
        Ok(state
            .files
            .iter()
            .filter(|(path, content)| path.starts_with(root) && content.contains(query))
            .map(|(path, _)| DirectoryEntry::file(path.clone()))
            .collect())
    }

    async fn pick_folder(&self) -> Result<FolderSelection, GatewayError> {
        self.state().calls.picks += 1;
        self.take_failure(GatewayOp::Pick)?;
        Ok(self
            .state()
            .picks
            .pop_front()
            .unwrap_or(FolderSelection::Cancelled))
    }

    async fn subscribe_changes(&self) -> Result<ChangeSubscription, GatewayError> {
        self.take_failure(GatewayOp::Subscribe)?;
        Ok(self.changes.subscribe())
    }

    async fn scope_changes(&self, directory: &Path) -> Result<(), GatewayError> {
        self.state().calls.scope.push(directory.to_path_buf());
        Ok(())
    }

    async fn create_file(&self, path: &Path) -> Result<DirectoryEntry, GatewayError> {
        self.take_failure(GatewayOp::Create)?;
        {
            let mut state = self.state();
            if state.files.contains_key(path) || state.directories.contains_key(path) {
                return Err(GatewayError::AlreadyExists(path.to_path_buf()));
            }
            state.files.insert(path.to_path_buf(), String::new());
        }
        let entry = DirectoryEntry::file(path);
        self.add_child(entry.clone());
        Ok(entry)
    }

    async fn create_directory(&self, path: &Path) -> Result<DirectoryEntry, GatewayError> {
        self.take_failure(GatewayOp::Create)?;
        {
            let mut state = self.state();
            if state.files.contains_key(path) || state.directories.contains_key(path) {
                return Err(GatewayError::AlreadyExists(path.to_path_buf()));
            }
            state.directories.insert(path.to_path_buf(), Vec::new());
        }
        let entry = DirectoryEntry::directory(path);
        self.add_child(entry.clone());
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_and_serves_registered_data() {
        let gateway = MemoryGateway::new();
        gateway.insert_directory("/w", vec![DirectoryEntry::file("/w/a.rs")]);
        gateway.insert_file("/w/a.rs", "fn main() {}");

        let listing = gateway.list_directory(Path::new("/w")).await.unwrap();
        assert_eq!(listing.len(), 1);
        let hits = gateway.search(Path::new("/w"), "main").await.unwrap();
        assert_eq!(hits, vec![DirectoryEntry::file("/w/a.rs")]);
        assert_eq!(gateway.list_calls(), vec![PathBuf::from("/w")]);
        assert_eq!(gateway.search_calls().len(), 1);
    }

    #[tokio::test]
    async fn injected_failures_are_one_shot() {
        let gateway = MemoryGateway::new();
        gateway.insert_file("/w/a", "x");
        gateway.fail_next(GatewayOp::Read, "disk offline");

        let err = gateway.read_file(Path::new("/w/a")).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(ref msg) if msg == "disk offline"));
        assert_eq!(gateway.read_file(Path::new("/w/a")).await.unwrap(), "x");
    }

    #[tokio::test]
    async fn created_entries_join_parent_listing() {
        let gateway = MemoryGateway::new();
        gateway.insert_directory("/w", Vec::new());
        gateway.create_file(Path::new("/w/new.txt")).await.unwrap();
        gateway.create_directory(Path::new("/w/sub")).await.unwrap();

        let names: Vec<_> = gateway
            .list_directory(Path::new("/w"))
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names, vec!["new.txt", "sub"]);
        assert!(matches!(
            gateway.create_file(Path::new("/w/new.txt")).await,
            Err(GatewayError::AlreadyExists(_))
        ));
    }
}
