use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::session::CloseFocus;

const CONFIG_VERSION: u32 = 1;
const MAX_SEARCH_RESULTS: usize = 10_000;
const MAX_COALESCE_MS: u64 = 5_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub explorer: ExplorerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            explorer: ExplorerConfig::default(),
            search: SearchConfig::default(),
            watch: WatchConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl ShellConfig {
    /// 載入設定；檔案不存在時使用預設值。 / Loads the config, falling back to defaults when the file is missing.
    ///
    /// Out-of-range values are clamped and unknown log levels reset to `info`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            let mut config = ShellConfig::default();
            config.sanitize();
            return Ok(config);
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: ShellConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.sanitize();
        Ok(config)
    }

    pub fn sanitize(&mut self) {
        if self.version == 0 {
            self.version = CONFIG_VERSION;
        }
        self.search.sanitize();
        self.watch.sanitize();
        let level = self.log_level.trim().to_ascii_lowercase();
        self.log_level = match level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => level,
            _ => default_log_level(),
        };
    }
}

/// 檔案總管清單設定。 / Directory listing options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    #[serde(default = "default_true")]
    pub show_hidden: bool,
    #[serde(default)]
    pub close_focus: CloseFocus,
}

fn default_true() -> bool {
    true
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            show_hidden: true,
            close_focus: CloseFocus::default(),
        }
    }
}

/// 遞迴搜尋設定。 / Options for the recursive directory search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub whole_word: bool,
    #[serde(default)]
    pub regex: bool,
    #[serde(default = "default_true")]
    pub match_file_names: bool,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_ignored_dirs")]
    pub ignored_dirs: Vec<String>,
}

fn default_max_results() -> usize {
    500
}

fn default_max_file_bytes() -> u64 {
    2 * 1024 * 1024
}

fn default_ignored_dirs() -> Vec<String> {
    vec![".git".into(), "node_modules".into(), "target".into()]
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            whole_word: false,
            regex: false,
            match_file_names: true,
            max_results: default_max_results(),
            max_file_bytes: default_max_file_bytes(),
            ignored_dirs: default_ignored_dirs(),
        }
    }
}

impl SearchConfig {
    fn sanitize(&mut self) {
        if self.max_results == 0 {
            self.max_results = default_max_results();
        }
        self.max_results = self.max_results.min(MAX_SEARCH_RESULTS);
        if self.max_file_bytes == 0 {
            self.max_file_bytes = default_max_file_bytes();
        }
        self.ignored_dirs.retain(|name| !name.trim().is_empty());
        self.ignored_dirs.sort();
        self.ignored_dirs.dedup();
    }
}

/// 變更監看設定。 / Change-notification options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_true")]
    pub recursive: bool,
    #[serde(default = "default_coalesce_ms")]
    pub coalesce_ms: u64,
}

fn default_coalesce_ms() -> u64 {
    150
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            recursive: true,
            coalesce_ms: default_coalesce_ms(),
        }
    }
}

impl WatchConfig {
    fn sanitize(&mut self) {
        self.coalesce_ms = self.coalesce_ms.min(MAX_COALESCE_MS);
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_ms)
    }
}
