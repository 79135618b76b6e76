use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use codeshell_core::{FolderSelection, GatewayError};
use codeshell_fs::FolderPicker;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Input;

/// 在終端機上詢問資料夾的選擇器。 / Folder picker that prompts on the terminal.
///
/// Interactive terminals get a dialoguer prompt; piped input is read as a plain
/// line so scripted sessions work too. An empty answer cancels.
#[derive(Debug, Clone)]
pub struct DialoguerPicker {
    base: PathBuf,
}

impl DialoguerPicker {
    /// Relative answers are resolved against `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

#[async_trait]
impl FolderPicker for DialoguerPicker {
    async fn pick_folder(&self) -> Result<FolderSelection, GatewayError> {
        let base = self.base.clone();
        tokio::task::spawn_blocking(move || prompt_folder(&base))
            .await
            .map_err(|err| GatewayError::Unavailable(format!("folder prompt failed: {err}")))?
    }
}

fn prompt_folder(base: &Path) -> Result<FolderSelection, GatewayError> {
    let answer = if io::stdin().is_terminal() {
        Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt("Open folder")
            .allow_empty(true)
            .interact_text()
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?
    } else {
        eprint!("Open folder: ");
        let _ = io::stderr().flush();
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?;
        line
    };
    match selection_from_answer(base, &answer) {
        FolderSelection::Selected(path) if !path.is_dir() => Err(GatewayError::NotFound(path)),
        selection => Ok(selection),
    }
}

fn selection_from_answer(base: &Path, answer: &str) -> FolderSelection {
    let answer = answer.trim();
    if answer.is_empty() {
        return FolderSelection::Cancelled;
    }
    FolderSelection::Selected(base.join(answer))
}
