use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use codeshell_core::{
    ChangeFeed, ChangeSubscription, DirectoryEntry, EntryKind, FileSystemGateway,
    FolderSelection, GatewayError, SearchConfig, ShellConfig,
};
use codeshell_search::{search_directory_with, DirectorySearchLimits, SearchError, SearchOptions};
use tokio::task;
use tracing::{debug, instrument};

use crate::decode::decode_text;
use crate::monitor::ChangeMonitor;
use crate::picker::{FolderPicker, StaticPicker};

/// 以本機檔案系統實作的閘道。 / Gateway backed by the local file system.
///
/// Disk work runs on tokio's blocking pool, including (re)attaching the
/// `notify` watcher, which registers one watch per directory when recursive.
/// Change notifications follow whichever directory the session scopes to.
pub struct LocalGateway {
    show_hidden: bool,
    search: SearchConfig,
    picker: Box<dyn FolderPicker>,
    changes: ChangeFeed,
    monitor: Arc<Mutex<ChangeMonitor>>,
}

impl LocalGateway {
    pub fn new(config: &ShellConfig, picker: Box<dyn FolderPicker>) -> Self {
        let changes = ChangeFeed::default();
        Self {
            show_hidden: config.explorer.show_hidden,
            search: config.search.clone(),
            picker,
            monitor: Arc::new(Mutex::new(ChangeMonitor::new(
                changes.clone(),
                config.watch.recursive,
            ))),
            changes,
        }
    }

    /// Default configuration and a picker that always cancels.
    pub fn with_defaults() -> Self {
        Self::new(&ShellConfig::default(), Box::new(StaticPicker::cancelled()))
    }

    /// 目前監看的資料夾。 / Directory the change monitor currently follows.
    pub fn watched_directory(&self) -> Option<PathBuf> {
        self.monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .watched()
            .map(Path::to_path_buf)
    }

    fn search_options(&self, query: &str) -> SearchOptions {
        SearchOptions::new(query)
            .regex(self.search.regex)
            .case_sensitive(self.search.case_sensitive)
            .whole_word(self.search.whole_word)
    }

    fn search_limits(&self) -> DirectorySearchLimits {
        DirectorySearchLimits {
            max_results: self.search.max_results,
            max_file_bytes: self.search.max_file_bytes,
            match_file_names: self.search.match_file_names,
            include_hidden: self.show_hidden,
            ignored_dirs: self.search.ignored_dirs.clone(),
        }
    }
}

impl std::fmt::Debug for LocalGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalGateway")
            .field("show_hidden", &self.show_hidden)
            .field("search", &self.search)
            .field("watched", &self.watched_directory())
            .finish()
    }
}

#[async_trait]
impl FileSystemGateway for LocalGateway {
    #[instrument(level = "debug", skip(self))]
    async fn list_directory(&self, path: &Path) -> Result<Vec<DirectoryEntry>, GatewayError> {
        let path = path.to_path_buf();
        let show_hidden = self.show_hidden;
        let entries = task::spawn_blocking(move || list_blocking(&path, show_hidden))
            .await
            .map_err(join_error)??;
        debug!(entries = entries.len(), "listed directory");
        Ok(entries)
    }

    #[instrument(level = "debug", skip(self))]
    async fn read_file(&self, path: &Path) -> Result<String, GatewayError> {
        let path = path.to_path_buf();
        task::spawn_blocking(move || {
            let bytes = fs::read(&path).map_err(|err| GatewayError::io(&path, err))?;
            decode_text(bytes).ok_or(GatewayError::InvalidEncoding(path))
        })
        .await
        .map_err(join_error)?
    }

    #[instrument(level = "debug", skip(self))]
    async fn search(&self, root: &Path, query: &str) -> Result<Vec<DirectoryEntry>, GatewayError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let root = root.to_path_buf();
        let options = self.search_options(query);
        let limits = self.search_limits();
        let hits = task::spawn_blocking(move || {
            search_directory_with(&root, &options, &limits, decode_text)
                .map_err(search_error)
        })
        .await
        .map_err(join_error)??;

        debug!(hits = hits.len(), "search finished");
        Ok(hits
            .into_iter()
            .map(|hit| {
                let kind = if hit.is_dir {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                };
                DirectoryEntry::new(hit.path, kind)
            })
            .collect())
    }

    async fn pick_folder(&self) -> Result<FolderSelection, GatewayError> {
        self.picker.pick_folder().await
    }

    async fn subscribe_changes(&self) -> Result<ChangeSubscription, GatewayError> {
        Ok(self.changes.subscribe())
    }

    #[instrument(level = "debug", skip(self))]
    async fn scope_changes(&self, directory: &Path) -> Result<(), GatewayError> {
        let monitor = Arc::clone(&self.monitor);
        let directory = directory.to_path_buf();
        task::spawn_blocking(move || {
            monitor
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .scope(&directory)
        })
        .await
        .map_err(join_error)?
    }

    async fn create_file(&self, path: &Path) -> Result<DirectoryEntry, GatewayError> {
        let path = path.to_path_buf();
        task::spawn_blocking(move || {
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .map_err(|err| GatewayError::io(&path, err))?;
            debug!(path = %path.display(), "created file");
            Ok(DirectoryEntry::file(path))
        })
        .await
        .map_err(join_error)?
    }

    async fn create_directory(&self, path: &Path) -> Result<DirectoryEntry, GatewayError> {
        let path = path.to_path_buf();
        task::spawn_blocking(move || {
            fs::create_dir(&path).map_err(|err| GatewayError::io(&path, err))?;
            debug!(path = %path.display(), "created directory");
            Ok(DirectoryEntry::directory(path))
        })
        .await
        .map_err(join_error)?
    }
}

/// Lists `path` with directories first, then files, each sorted by name
/// ignoring case.
fn list_blocking(path: &Path, show_hidden: bool) -> Result<Vec<DirectoryEntry>, GatewayError> {
    let mut entries = Vec::new();
    for child in fs::read_dir(path).map_err(|err| GatewayError::io(path, err))? {
        let child = child.map_err(|err| GatewayError::io(path, err))?;
        let name = child.file_name().to_string_lossy().into_owned();
        if !show_hidden && name.starts_with('.') {
            continue;
        }
        let child_path = child.path();
        let file_type = child.file_type().map_err(|err| GatewayError::io(&child_path, err))?;
        let is_dir = if file_type.is_symlink() {
            // Dangling links show up as files.
            fs::metadata(&child_path).map(|meta| meta.is_dir()).unwrap_or(false)
        } else {
            file_type.is_dir()
        };
        let kind = if is_dir {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        entries.push(DirectoryEntry::new(child_path, kind));
    }
    entries.sort_by(|a, b| {
        b.is_directory()
            .cmp(&a.is_directory())
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(entries)
}

fn search_error(err: SearchError) -> GatewayError {
    match err {
        SearchError::Root { root, source } => GatewayError::io(root, source),
        SearchError::NotADirectory(root) => GatewayError::Io {
            path: root,
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
        },
        other => GatewayError::Search(other.to_string()),
    }
}

fn join_error(err: task::JoinError) -> GatewayError {
    GatewayError::Unavailable(format!("blocking task failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn listing_puts_directories_first_and_filters_hidden() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "").unwrap();
        fs::write(dir.path().join("A.txt"), "").unwrap();
        fs::write(dir.path().join(".env"), "").unwrap();
        fs::create_dir(dir.path().join("zeta")).unwrap();

        let names = |entries: Vec<DirectoryEntry>| -> Vec<String> {
            entries.into_iter().map(|entry| entry.name).collect()
        };
        assert_eq!(
            names(list_blocking(dir.path(), true).unwrap()),
            vec!["zeta", ".env", "A.txt", "b.txt"]
        );
        assert_eq!(
            names(list_blocking(dir.path(), false).unwrap()),
            vec!["zeta", "A.txt", "b.txt"]
        );
    }

    #[tokio::test]
    async fn search_root_errors_are_not_query_errors() {
        let dir = tempdir().unwrap();
        let gateway = LocalGateway::with_defaults();

        let missing = dir.path().join("gone");
        let err = gateway.search(&missing, "x").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(path) if path == missing));

        let file = dir.path().join("notes.txt");
        fs::write(&file, "x").unwrap();
        let err = gateway.search(&file, "x").await.unwrap_err();
        assert!(matches!(err, GatewayError::Io { ref path, .. } if *path == file));
        assert!(err.to_string().contains("not a directory"));

        // Plain patterns are escaped, so this is an ordinary query.
        assert!(gateway.search(dir.path(), "(").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_regex_is_a_query_error() {
        let dir = tempdir().unwrap();
        let mut config = ShellConfig::default();
        config.search.regex = true;
        let gateway = LocalGateway::new(&config, Box::new(StaticPicker::cancelled()));

        let err = gateway.search(dir.path(), "(").await.unwrap_err();
        assert!(matches!(err, GatewayError::Search(_)));
    }

    #[tokio::test]
    async fn scoping_runs_off_the_async_task() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        let gateway = LocalGateway::with_defaults();

        gateway.scope_changes(dir.path()).await.unwrap();
        assert_eq!(gateway.watched_directory().as_deref(), Some(dir.path()));

        let err = gateway
            .scope_changes(&dir.path().join("absent"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Watch(_)));
        assert!(gateway.watched_directory().is_none());
    }
}
