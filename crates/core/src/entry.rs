use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// 目錄項目的種類。 / Kind of a directory child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn is_directory(self) -> bool {
        matches!(self, EntryKind::Directory)
    }
}

/// 描述檔案系統中的單一子項目。 / Describes one file-system child returned by a listing or search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub path: PathBuf,
    pub name: String,
    pub kind: EntryKind,
}

impl DirectoryEntry {
    /// 以路徑建立項目，名稱取自最後一段路徑。 / Builds an entry whose name is the final path component.
    pub fn new(path: impl Into<PathBuf>, kind: EntryKind) -> Self {
        let path = path.into();
        let name = display_name(&path);
        Self { path, name, kind }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(path, EntryKind::File)
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::new(path, EntryKind::Directory)
    }

    pub fn is_directory(&self) -> bool {
        self.kind.is_directory()
    }
}

/// 開啟檔案的請求內容。 / Request shape for opening a file as a tab.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileRef {
    pub path: PathBuf,
    pub name: String,
}

impl FileRef {
    /// 以路徑建立請求，顯示名稱由路徑推導。 / Creates a request deriving the display name from the path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = display_name(&path);
        Self { path, name }
    }

    pub fn with_name(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }
}

impl From<&DirectoryEntry> for FileRef {
    fn from(entry: &DirectoryEntry) -> Self {
        Self::with_name(entry.path.clone(), entry.name.clone())
    }
}

impl From<DirectoryEntry> for FileRef {
    fn from(entry: DirectoryEntry) -> Self {
        Self::with_name(entry.path, entry.name)
    }
}

/// 工作階段持有的檔案緩衝，內容於開啟時擷取一次。 / A file buffer held by the session.
///
/// The content is a snapshot captured when the file was opened; the session never
/// re-reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFile {
    path: PathBuf,
    name: String,
    content: String,
}

impl OpenFile {
    pub(crate) fn new(file: FileRef, content: String) -> Self {
        Self {
            path: file.path,
            name: file.name,
            content,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// 取得路徑最後一段作為顯示名稱。 / Returns the last path component, or the whole path for roots.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
