//! Interactive view shell: reads commands line by line, drives the session and
//! re-renders the listing when change notifications refresh it.

use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use codeshell_core::{ExplorerFeed, FileRef, RefreshOutcome, SessionStore};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::render;

const HELP: &str = "\
Commands:
  open-folder        pick a folder to open
  cd <dir>           open a folder by path
  ls                 refresh and print the listing
  open <path|#n>     open a file (or enter a folder) by path or listing number
  close <n>          close tab n
  activate <n>       focus tab n
  tabs               list open tabs
  show               print the active file
  search <term>      search the open folder
  touch <name>       create an empty file in the open folder
  mkdir <name>       create a folder in the open folder
  refresh            same as ls
  help               show this help
  quit               leave the shell";

/// 指令開啟的目標。 / What `open` refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// One-based position in the last printed listing.
    Listed(usize),
    Path(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    OpenFolder,
    Cd(String),
    Ls,
    Open(Target),
    Close(usize),
    Activate(usize),
    Tabs,
    Show,
    Search(String),
    Touch(String),
    Mkdir(String),
    Refresh,
    Help,
    Quit,
}

/// 解析一行輸入；空白行回傳 `None`。 / Parses one input line, `None` for blank lines.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let argument = |usage: &str| -> Result<String, String> {
        if rest.is_empty() {
            Err(format!("usage: {usage}"))
        } else {
            Ok(rest.to_string())
        }
    };
    let tab = |usage: &str| -> Result<usize, String> {
        match rest.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(format!("usage: {usage} (tabs are numbered from 1)")),
        }
    };

    let command = match word {
        "open-folder" => Command::OpenFolder,
        "cd" => Command::Cd(argument("cd <dir>")?),
        "ls" => Command::Ls,
        "open" => {
            let target = argument("open <path|#n>")?;
            match target.strip_prefix('#') {
                Some(number) => match number.parse::<usize>() {
                    Ok(n) if n > 0 => Command::Open(Target::Listed(n)),
                    _ => return Err(format!("invalid listing number {target:?}")),
                },
                None => Command::Open(Target::Path(target)),
            }
        }
        "close" => Command::Close(tab("close <n>")?),
        "activate" => Command::Activate(tab("activate <n>")?),
        "tabs" => Command::Tabs,
        "show" => Command::Show,
        // An empty term is allowed and passed through as-is.
        "search" => Command::Search(rest.to_string()),
        "touch" => Command::Touch(argument("touch <name>")?),
        "mkdir" => Command::Mkdir(argument("mkdir <name>")?),
        "refresh" => Command::Refresh,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command {other:?}; try `help`")),
    };
    Ok(Some(command))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// 互動式殼層狀態。 / State of the interactive shell.
pub struct Shell {
    session: Arc<SessionStore>,
    feed: Arc<ExplorerFeed>,
    base: PathBuf,
    rendered_listing: u64,
}

impl Shell {
    /// `base` resolves relative paths while no folder is open.
    pub fn new(feed: Arc<ExplorerFeed>, base: impl Into<PathBuf>) -> Self {
        Self {
            session: feed.session().clone(),
            feed,
            base: base.into(),
            rendered_listing: 0,
        }
    }

    pub async fn execute(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::OpenFolder => match self.session.open_folder().await? {
                Some(path) => println!("Opened folder {}", path.display()),
                None => println!("No folder selected."),
            },
            Command::Cd(target) => {
                let path = self.resolve(&target)?;
                if !path.is_dir() {
                    bail!("{} is not a directory", path.display());
                }
                self.enter(path);
            }
            Command::Ls | Command::Refresh => self.show_listing().await?,
            Command::Open(target) => self.open(target).await?,
            Command::Close(n) => {
                let removed = self.session.close_file(n - 1)?;
                println!("Closed {}", removed.name());
            }
            Command::Activate(n) => {
                self.session.set_active_index(n - 1)?;
                self.print_tabs();
            }
            Command::Tabs => self.print_tabs(),
            Command::Show => match self.session.active_file() {
                Some(file) => {
                    print!("{}", file.content());
                    if !file.content().ends_with('\n') {
                        println!();
                    }
                }
                None => println!("No active file."),
            },
            Command::Search(term) => match self.feed.search(term).await? {
                RefreshOutcome::NoDirectory => println!("No folder open."),
                RefreshOutcome::Stale => println!("Folder changed; search discarded."),
                RefreshOutcome::Applied { entries: 0 } => println!("No matches found."),
                RefreshOutcome::Applied { .. } => {
                    let root = self.session.current_directory();
                    print!(
                        "{}",
                        render::search_results(root.as_deref(), &self.feed.search_results())
                    );
                }
            },
            Command::Touch(name) => {
                let entry = self.feed.create_file(&name).await?;
                println!("Created {}", entry.name);
            }
            Command::Mkdir(name) => {
                let entry = self.feed.create_directory(&name).await?;
                println!("Created {}/", entry.name);
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    async fn open(&mut self, target: Target) -> Result<()> {
        let file = match target {
            Target::Listed(n) => {
                let listing = self.feed.listing();
                let entry = listing
                    .get(n - 1)
                    .with_context(|| format!("no entry #{n} in the listing; run `ls` first"))?;
                if entry.is_directory() {
                    self.enter(entry.path.clone());
                    return Ok(());
                }
                FileRef::from(entry)
            }
            Target::Path(path) => {
                let path = self.resolve(&path)?;
                if path.is_dir() {
                    self.enter(path);
                    return Ok(());
                }
                FileRef::new(path)
            }
        };
        let index = self.session.open_file(file).await?;
        if let Some(active) = self.session.active_file() {
            println!("Opened {} (tab {})", active.name(), index + 1);
        }
        Ok(())
    }

    fn enter(&mut self, path: PathBuf) {
        if self.session.set_current_directory(path.clone()) {
            println!("Opened folder {}", path.display());
        } else {
            println!("Already in {}", path.display());
        }
    }

    fn resolve(&self, target: &str) -> Result<PathBuf> {
        let base = self
            .session
            .current_directory()
            .unwrap_or_else(|| self.base.clone());
        let joined = base.join(target);
        fs::canonicalize(&joined).with_context(|| format!("cannot resolve {}", joined.display()))
    }

    async fn show_listing(&mut self) -> Result<()> {
        match self.feed.refresh_listing().await? {
            RefreshOutcome::NoDirectory => println!("No folder open."),
            _ => self.print_listing(),
        }
        Ok(())
    }

    fn print_listing(&mut self) {
        if let Some(directory) = self.feed.listing_directory() {
            println!("{}:", directory.display());
        }
        let entries = self.feed.listing();
        if entries.is_empty() {
            println!("  (empty)");
        } else {
            print!("{}", render::listing(&entries));
        }
        self.rendered_listing = self.feed.revision().listing;
    }

    fn print_tabs(&self) {
        let files = self.session.open_files();
        if files.is_empty() {
            println!("No open files.");
            return;
        }
        print!("{}", render::tabs(&files, self.session.active_index()));
    }

    /// Re-renders the listing when a background refresh produced one we have
    /// not shown yet.
    fn on_feed_update(&mut self) {
        if self.feed.revision().listing > self.rendered_listing {
            debug!("listing changed in the background");
            self.print_listing();
        }
    }
}

/// 執行讀取-執行迴圈直到 `quit` 或輸入結束。 / Runs the read-eval loop until `quit` or end of input.
pub async fn run(mut shell: Shell) -> Result<()> {
    let interactive = io::stdin().is_terminal();
    let mut updates = shell.feed.subscribe_updates();
    let _ = updates.borrow_and_update();

    prompt(interactive);
    let mut pending = read_line();
    loop {
        tokio::select! {
            line = &mut pending => {
                let Some(line) = line.context("stdin reader stopped")?.context("failed to read stdin")? else {
                    break;
                };
                match parse(&line) {
                    Ok(None) => {}
                    Ok(Some(command)) => match shell.execute(command).await {
                        Ok(Flow::Quit) => break,
                        Ok(Flow::Continue) => {}
                        Err(err) => eprintln!("error: {err:#}"),
                    },
                    Err(message) => eprintln!("error: {message}"),
                }
                prompt(interactive);
                pending = read_line();
            }
            changed = updates.changed() => {
                if changed.is_ok() {
                    let _ = updates.borrow_and_update();
                    shell.on_feed_update();
                }
            }
        }
    }
    Ok(())
}

fn prompt(interactive: bool) {
    if interactive {
        print!("codeshell> ");
        let _ = io::stdout().flush();
    }
}

/// Reads one line on the blocking pool; `None` at end of input.
fn read_line() -> JoinHandle<io::Result<Option<String>>> {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        Ok((read > 0).then_some(line))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(parse("  \n"), Ok(None));
        assert_eq!(parse("ls"), Ok(Some(Command::Ls)));
        assert_eq!(
            parse("cd  my folder "),
            Ok(Some(Command::Cd("my folder".into())))
        );
        assert_eq!(
            parse("open #3"),
            Ok(Some(Command::Open(Target::Listed(3))))
        );
        assert_eq!(
            parse("open src/lib.rs"),
            Ok(Some(Command::Open(Target::Path("src/lib.rs".into()))))
        );
        assert_eq!(parse("close 2"), Ok(Some(Command::Close(2))));
        assert_eq!(parse("search"), Ok(Some(Command::Search(String::new()))));
        assert_eq!(parse("exit"), Ok(Some(Command::Quit)));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse("close").is_err());
        assert!(parse("close 0").is_err());
        assert!(parse("activate x").is_err());
        assert!(parse("open #0").is_err());
        assert!(parse("touch").is_err());
        assert!(parse("frobnicate").unwrap_err().contains("frobnicate"));
    }
}
