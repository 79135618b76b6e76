//! Observer registration that keeps the explorer listing in step with the open
//! folder and with external changes.
//!
//! Attaching subscribes once to the gateway's change notifications and to the
//! session's current directory. A background task then refreshes the listing
//! whenever either fires, until the watch is shut down or dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::explorer::{ExplorerError, ExplorerFeed};
use crate::gateway::ChangeSubscription;

/// 監看行為設定。 / Tuning for the explorer watch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Notifications arriving within this window after the first one are folded
    /// into a single refresh. Zero refreshes once per notification.
    pub coalesce: Duration,
}

impl WatchOptions {
    pub fn coalescing(window: Duration) -> Self {
        Self { coalesce: window }
    }
}

/// 檔案總管的觀察者註冊；丟棄即停止。 / Live observer registration for an explorer feed; dropping it stops observing.
#[derive(Debug)]
pub struct ExplorerWatch {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ExplorerWatch {
    /// 建立監看並在已有資料夾時立即重新整理。 / Starts observing, refreshing right away when a folder is already open.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn attach(feed: Arc<ExplorerFeed>, options: WatchOptions) -> Result<Self, ExplorerError> {
        let changes = feed.gateway().subscribe_changes().await?;
        let mut directory = feed.session().subscribe_directory();

        let initial = directory.borrow_and_update().clone();
        if let Some(initial) = initial {
            follow_directory(&feed, &initial).await;
        }

        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(observe(feed, directory, changes, options, stopped));
        Ok(Self {
            stop: Some(stop),
            task: Some(task),
        })
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// 停止監看並等待背景工作結束。 / Stops observing and waits for the background task to finish.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                if err.is_panic() {
                    warn!(error = %err, "explorer watch task panicked");
                }
            }
        }
    }
}

impl Drop for ExplorerWatch {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl ExplorerFeed {
    /// 註冊此清單的自動重新整理。 / Registers automatic refreshes for this feed.
    pub async fn attach(self: Arc<Self>, options: WatchOptions) -> Result<ExplorerWatch, ExplorerError> {
        ExplorerWatch::attach(self, options).await
    }
}

async fn observe(
    feed: Arc<ExplorerFeed>,
    mut directory: watch::Receiver<Option<PathBuf>>,
    mut changes: ChangeSubscription,
    options: WatchOptions,
    mut stopped: oneshot::Receiver<()>,
) {
    let mut notifications_open = true;
    loop {
        tokio::select! {
            biased;
            _ = &mut stopped => break,
            changed = directory.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = directory.borrow_and_update().clone();
                if let Some(current) = current {
                    follow_directory(&feed, &current).await;
                }
            }
            event = changes.next(), if notifications_open => match event {
                Some(event) => {
                    debug!(path = ?event.path, kind = ?event.kind, "change notification");
                    if !options.coalesce.is_zero() {
                        let folded = absorb_burst(&mut changes, options.coalesce).await;
                        if folded > 0 {
                            debug!(folded, "coalesced change notifications");
                        }
                    }
                    refresh(&feed, "notification").await;
                }
                None => {
                    debug!("change notifications closed");
                    notifications_open = false;
                }
            },
        }
    }
    debug!("explorer watch stopped");
}

async fn follow_directory(feed: &ExplorerFeed, directory: &Path) {
    if let Err(err) = feed.gateway().scope_changes(directory).await {
        warn!(directory = %directory.display(), error = %err, "failed to scope change notifications");
    }
    refresh(feed, "directory").await;
}

async fn refresh(feed: &ExplorerFeed, reason: &'static str) {
    match feed.refresh_listing().await {
        Ok(outcome) => debug!(reason, ?outcome, "explorer refreshed"),
        Err(err) => warn!(reason, error = %err, "explorer refresh failed"),
    }
}

/// Swallows notifications until `window` has passed since the first one.
async fn absorb_burst(changes: &mut ChangeSubscription, window: Duration) -> usize {
    let deadline = Instant::now() + window;
    let mut folded = 0;
    while let Ok(Some(_)) = time::timeout_at(deadline, changes.next()).await {
        folded += 1;
    }
    folded
}
