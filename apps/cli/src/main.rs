mod logging;
mod picker;
mod render;
mod shell;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use codeshell_core::{
    ExplorerFeed, FileRef, RefreshOutcome, SessionStore, ShellConfig, WatchOptions,
};
use codeshell_fs::{FolderPicker, LocalGateway, StaticPicker};
use tracing::debug;

use crate::logging::{init_logging, parse_level, LoggingConfig};
use crate::picker::DialoguerPicker;
use crate::shell::Shell;

#[derive(Parser)]
#[command(
    name = "codeshell",
    about = "Browse folders, search them and view files from the terminal",
    author,
    version
)]
struct Cli {
    /// 設定檔路徑。 / Path of the JSON configuration file.
    #[arg(long, global = true, value_name = "PATH", default_value = "codeshell.json")]
    config: PathBuf,
    /// 覆寫設定檔中的日誌等級。 / Overrides the configured log level (trace, debug, info, warn, error).
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 列出資料夾內容。 / List a folder.
    Ls(DirArgs),
    /// 遞迴搜尋資料夾。 / Search a folder recursively by name and content.
    Search(SearchArgs),
    /// 開啟檔案並輸出內容。 / Open a file and print its contents.
    Cat(CatArgs),
    /// 互動式檢視殼層。 / Interactive view shell.
    Shell(ShellArgs),
}

#[derive(Args)]
struct DirArgs {
    dir: PathBuf,
}

#[derive(Args)]
struct SearchArgs {
    dir: PathBuf,
    term: String,
}

#[derive(Args)]
struct CatArgs {
    file: PathBuf,
}

#[derive(Args)]
struct ShellArgs {
    /// 起始資料夾。 / Folder to open on start.
    dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let Cli {
        config,
        log_level,
        command,
    } = Cli::parse();
    let config = ShellConfig::load(&config)?;

    let level_name = log_level.as_deref().unwrap_or(&config.log_level);
    let level = parse_level(level_name)
        .with_context(|| format!("unknown log level {level_name:?}"))?;
    init_logging(LoggingConfig::with_level(level));
    debug!(?config, "configuration loaded");

    match command {
        Commands::Ls(args) => execute_ls(&config, args).await,
        Commands::Search(args) => execute_search(&config, args).await,
        Commands::Cat(args) => execute_cat(&config, args).await,
        Commands::Shell(args) => execute_shell(&config, args).await,
    }
}

/// Wires a local gateway, a session and an explorer feed together.
fn build_feed(config: &ShellConfig, picker: Box<dyn FolderPicker>) -> Arc<ExplorerFeed> {
    let gateway = Arc::new(LocalGateway::new(config, picker));
    let session =
        Arc::new(SessionStore::new(gateway).with_close_focus(config.explorer.close_focus));
    Arc::new(ExplorerFeed::new(session))
}

fn resolve_dir(path: &Path) -> Result<PathBuf> {
    let resolved =
        fs::canonicalize(path).with_context(|| format!("cannot open {}", path.display()))?;
    if !resolved.is_dir() {
        anyhow::bail!("{} is not a directory", path.display());
    }
    Ok(resolved)
}

async fn execute_ls(config: &ShellConfig, args: DirArgs) -> Result<()> {
    let dir = resolve_dir(&args.dir)?;
    let feed = build_feed(config, Box::new(StaticPicker::cancelled()));
    feed.session().set_current_directory(dir.clone());
    feed.refresh_listing()
        .await
        .with_context(|| format!("failed to list {}", dir.display()))?;

    let entries = feed.listing();
    if entries.is_empty() {
        println!("(empty)");
    } else {
        print!("{}", render::listing(&entries));
    }
    Ok(())
}

async fn execute_search(config: &ShellConfig, args: SearchArgs) -> Result<()> {
    let dir = resolve_dir(&args.dir)?;
    let feed = build_feed(config, Box::new(StaticPicker::cancelled()));
    feed.session().set_current_directory(dir.clone());
    let outcome = feed
        .search(args.term.clone())
        .await
        .with_context(|| format!("failed to search {}", dir.display()))?;

    match outcome {
        RefreshOutcome::Applied { entries } if entries > 0 => {
            print!("{}", render::search_results(Some(dir.as_path()), &feed.search_results()));
        }
        _ => println!("No matches found."),
    }
    Ok(())
}

async fn execute_cat(config: &ShellConfig, args: CatArgs) -> Result<()> {
    let path = fs::canonicalize(&args.file)
        .with_context(|| format!("cannot open {}", args.file.display()))?;
    let feed = build_feed(config, Box::new(StaticPicker::cancelled()));
    let session = feed.session();
    session
        .open_file(FileRef::new(&path))
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    if let Some(file) = session.active_file() {
        print!("{}", file.content());
    }
    Ok(())
}

async fn execute_shell(config: &ShellConfig, args: ShellArgs) -> Result<()> {
    let base = env::current_dir().context("cannot determine the working directory")?;
    let feed = build_feed(config, Box::new(DialoguerPicker::new(base.clone())));
    if let Some(dir) = args.dir {
        feed.session().set_current_directory(resolve_dir(&dir)?);
    }

    let options = WatchOptions::coalescing(config.watch.coalesce_window());
    let watch = feed
        .clone()
        .attach(options)
        .await
        .context("failed to start watching the open folder")?;

    let result = shell::run(Shell::new(feed, base)).await;
    watch.shutdown().await;
    result
}
