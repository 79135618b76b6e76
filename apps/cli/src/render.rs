use std::fmt::Write as _;
use std::path::Path;

use codeshell_core::{DirectoryEntry, OpenFile};

/// 將清單格式化為 `[d] name` / `[f] name`。 / Formats a listing as `[d] name` / `[f] name` lines.
pub fn listing(entries: &[DirectoryEntry]) -> String {
    let mut out = String::new();
    for (position, entry) in entries.iter().enumerate() {
        let marker = if entry.is_directory() { 'd' } else { 'f' };
        let _ = writeln!(out, "{:>3}  [{marker}] {}", position + 1, entry.name);
    }
    out
}

/// Formats search hits relative to `root` when possible.
pub fn search_results(root: Option<&Path>, entries: &[DirectoryEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let shown = root
            .and_then(|root| entry.path.strip_prefix(root).ok())
            .unwrap_or(entry.path.as_path());
        let suffix = if entry.is_directory() { "/" } else { "" };
        let _ = writeln!(out, "{}{suffix}", shown.display());
    }
    out
}

pub fn tabs(files: &[OpenFile], active: Option<usize>) -> String {
    let mut out = String::new();
    for (index, file) in files.iter().enumerate() {
        let marker = if Some(index) == active { '*' } else { ' ' };
        let _ = writeln!(out, "{marker}{:>2}  {}", index + 1, file.name());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_marks_directories() {
        let out = listing(&[
            DirectoryEntry::directory("/w/src"),
            DirectoryEntry::file("/w/Cargo.toml"),
        ]);
        assert_eq!(out, "  1  [d] src\n  2  [f] Cargo.toml\n");
    }

    #[test]
    fn search_results_are_relative_to_root() {
        let out = search_results(
            Some(Path::new("/w")),
            &[
                DirectoryEntry::file("/w/src/lib.rs"),
                DirectoryEntry::directory("/w/docs"),
                DirectoryEntry::file("/elsewhere/x"),
            ],
        );
        assert_eq!(out, "src/lib.rs\ndocs/\n/elsewhere/x\n");
    }
}
