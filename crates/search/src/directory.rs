use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::{Matcher, SearchError, SearchOptions};

/// 遞迴搜尋的範圍限制。 / Bounds applied to a recursive directory search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectorySearchLimits {
    /// Stop after this many hits; zero means unbounded.
    pub max_results: usize,
    /// Files larger than this are matched by name only.
    pub max_file_bytes: u64,
    pub match_file_names: bool,
    pub include_hidden: bool,
    /// Directory names that are never descended into.
    pub ignored_dirs: Vec<String>,
}

impl Default for DirectorySearchLimits {
    fn default() -> Self {
        Self {
            max_results: 500,
            max_file_bytes: 2 * 1024 * 1024,
            match_file_names: true,
            include_hidden: true,
            ignored_dirs: vec![".git".into(), "node_modules".into(), "target".into()],
        }
    }
}

/// 一筆符合的項目。 / One entry that matched by name or content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryHit {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Searches `root` recursively, treating file contents as UTF-8.
pub fn search_directory(
    root: &Path,
    options: &SearchOptions,
    limits: &DirectorySearchLimits,
) -> Result<Vec<DirectoryHit>, SearchError> {
    search_directory_with(root, options, limits, |bytes| String::from_utf8(bytes).ok())
}

/// Searches `root` recursively, decoding file contents with `decode`.
///
/// Files `decode` rejects are matched by name only. Hits come back in walk
/// order, siblings sorted by file name.
pub fn search_directory_with<D>(
    root: &Path,
    options: &SearchOptions,
    limits: &DirectorySearchLimits,
    mut decode: D,
) -> Result<Vec<DirectoryHit>, SearchError>
where
    D: FnMut(Vec<u8>) -> Option<String>,
{
    let matcher = options.compile()?;
    let metadata = fs::metadata(root).map_err(|source| SearchError::Root {
        root: root.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(SearchError::NotADirectory(root.to_path_buf()));
    }

    let mut hits = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_pruned(entry, limits));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        let is_dir = entry.file_type().is_dir();
        let name_hit = limits.match_file_names
            && matcher.is_match(&entry.file_name().to_string_lossy());
        // Contents are only read when the name alone did not match.
        let hit = name_hit || (!is_dir && content_matches(&entry, &matcher, limits, &mut decode));

        if hit {
            hits.push(DirectoryHit {
                path: entry.into_path(),
                is_dir,
            });
            if limits.max_results > 0 && hits.len() >= limits.max_results {
                debug!(limit = limits.max_results, "search result limit reached");
                break;
            }
        }
    }
    Ok(hits)
}

fn is_pruned(entry: &DirEntry, limits: &DirectorySearchLimits) -> bool {
    let name = entry.file_name().to_string_lossy();
    if !limits.include_hidden && name.starts_with('.') {
        return true;
    }
    entry.file_type().is_dir() && limits.ignored_dirs.iter().any(|ignored| *ignored == name)
}

fn content_matches<D>(
    entry: &DirEntry,
    matcher: &Matcher,
    limits: &DirectorySearchLimits,
    decode: &mut D,
) -> bool
where
    D: FnMut(Vec<u8>) -> Option<String>,
{
    let Some(size) = entry.metadata().ok().map(|meta| meta.len()) else {
        return false;
    };
    if size > limits.max_file_bytes {
        debug!(path = %entry.path().display(), size, "skipping large file contents");
        return false;
    }
    fs::read(entry.path())
        .ok()
        .and_then(|bytes| decode(bytes))
        .is_some_and(|text| matcher.is_match(&text))
}
