use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use codeshell_core::{FolderSelection, GatewayError};

/// 原生資料夾選擇器介面。 / Native folder-picker dialog.
///
/// The local gateway owns no UI; frontends plug their own dialog in here.
#[async_trait]
pub trait FolderPicker: Send + Sync {
    async fn pick_folder(&self) -> Result<FolderSelection, GatewayError>;
}

/// Picker that replays a fixed queue of answers, then reports cancellation.
#[derive(Debug, Default)]
pub struct StaticPicker {
    answers: Mutex<VecDeque<FolderSelection>>,
}

impl StaticPicker {
    pub fn new(answers: impl IntoIterator<Item = FolderSelection>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
        }
    }

    pub fn selecting(path: impl Into<PathBuf>) -> Self {
        Self::new([FolderSelection::Selected(path.into())])
    }

    /// A picker that always cancels, for environments without a dialog.
    pub fn cancelled() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FolderPicker for StaticPicker {
    async fn pick_folder(&self) -> Result<FolderSelection, GatewayError> {
        let mut answers = self
            .answers
            .lock()
            .map_err(|_| GatewayError::Unavailable("folder picker state poisoned".into()))?;
        Ok(answers.pop_front().unwrap_or(FolderSelection::Cancelled))
    }
}
