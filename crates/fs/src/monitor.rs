use std::path::{Path, PathBuf};

use codeshell_core::{ChangeEvent, ChangeFeed, ChangeKind, GatewayError};
use notify::event::{EventKind, ModifyKind, RemoveKind};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

/// 封裝 `notify` 監視器並將事件轉送至變更廣播。 / Wraps a `notify` watcher and forwards its events into a change feed.
///
/// Only one directory is watched at a time; scoping to a new one replaces the
/// previous watcher.
pub struct ChangeMonitor {
    feed: ChangeFeed,
    recursive: bool,
    active: Option<(PathBuf, RecommendedWatcher)>,
}

impl ChangeMonitor {
    pub fn new(feed: ChangeFeed, recursive: bool) -> Self {
        Self {
            feed,
            recursive,
            active: None,
        }
    }

    /// 改為監看指定資料夾。 / Starts watching `directory` instead of the previous one.
    pub fn scope(&mut self, directory: &Path) -> Result<(), GatewayError> {
        if self.watched() == Some(directory) {
            return Ok(());
        }
        // Release the old watch first so a failure leaves nothing half-attached.
        self.active = None;

        let feed = self.feed.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if let Some(mapped) = map_event(event) {
                        feed.publish(mapped);
                    }
                }
                Err(err) => warn!(error = %err, "change monitor reported an error"),
            },
            Config::default(),
        )
        .map_err(|err| GatewayError::Watch(err.to_string()))?;

        let mode = if self.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(directory, mode)
            .map_err(|err| GatewayError::Watch(format!("{}: {err}", directory.display())))?;
        debug!(directory = %directory.display(), recursive = self.recursive, "watching directory");
        self.active = Some((directory.to_path_buf(), watcher));
        Ok(())
    }

    pub fn watched(&self) -> Option<&Path> {
        self.active.as_ref().map(|(path, _)| path.as_path())
    }
}

impl std::fmt::Debug for ChangeMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeMonitor")
            .field("recursive", &self.recursive)
            .field("watched", &self.watched())
            .finish()
    }
}

fn map_event(event: notify::Event) -> Option<ChangeEvent> {
    let primary = event.paths.first()?.clone();
    let kind = match event.kind {
        EventKind::Modify(ModifyKind::Name(_)) if event.paths.len() >= 2 => ChangeKind::Renamed {
            from: primary.clone(),
            to: event.paths[1].clone(),
        },
        EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Metadata(_))
        | EventKind::Modify(ModifyKind::Any) => ChangeKind::Modified,
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Remove(RemoveKind::File)
        | EventKind::Remove(RemoveKind::Folder)
        | EventKind::Remove(RemoveKind::Any) => ChangeKind::Removed,
        EventKind::Access(_) => return None,
        _ => ChangeKind::Other,
    };

    let path = match &kind {
        ChangeKind::Renamed { to, .. } => to.clone(),
        _ => primary,
    };
    Some(ChangeEvent::new(path, kind))
}
