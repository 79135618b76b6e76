use std::error::Error;
use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::{tempdir, TempDir};

fn codeshell(config_dir: &Path) -> Result<Command, Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("codeshell")?;
    cmd.arg("--config")
        .arg(config_dir.join("codeshell.json"))
        .env_remove("RUST_LOG");
    Ok(cmd)
}

fn workspace() -> Result<TempDir, Box<dyn Error>> {
    let dir = tempdir()?;
    fs::create_dir(dir.path().join("docs"))?;
    fs::write(dir.path().join("hello.txt"), "hello world\n")?;
    fs::write(dir.path().join("notes.md"), "remember the needle\n")?;
    Ok(dir)
}

#[test]
fn ls_prints_directories_first() -> Result<(), Box<dyn Error>> {
    let dir = workspace()?;
    codeshell(dir.path())?
        .arg("ls")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::diff(
            "  1  [d] docs\n  2  [f] hello.txt\n  3  [f] notes.md\n",
        ));
    Ok(())
}

#[test]
fn ls_rejects_files() -> Result<(), Box<dyn Error>> {
    let dir = workspace()?;
    codeshell(dir.path())?
        .arg("ls")
        .arg(dir.path().join("hello.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not a directory"));
    Ok(())
}

#[test]
fn search_prints_relative_matches() -> Result<(), Box<dyn Error>> {
    let dir = workspace()?;
    fs::create_dir(dir.path().join("docs/needle"))?;

    codeshell(dir.path())?
        .args(["search"])
        .arg(dir.path())
        .arg("needle")
        .assert()
        .success()
        .stdout(predicate::str::diff("docs/needle/\nnotes.md\n"));

    codeshell(dir.path())?
        .args(["search"])
        .arg(dir.path())
        .arg("absent-term")
        .assert()
        .success()
        .stdout(predicate::str::contains("No matches found."));
    Ok(())
}

#[test]
fn cat_prints_decoded_contents() -> Result<(), Box<dyn Error>> {
    let dir = workspace()?;
    let wide = dir.path().join("wide.txt");
    let mut bytes = vec![0xFF, 0xFE];
    bytes.extend("utf-16 text".encode_utf16().flat_map(u16::to_le_bytes));
    fs::write(&wide, bytes)?;

    codeshell(dir.path())?
        .arg("cat")
        .arg(&wide)
        .assert()
        .success()
        .stdout("utf-16 text");

    codeshell(dir.path())?
        .arg("cat")
        .arg(dir.path().join("missing.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot open"));
    Ok(())
}

#[test]
fn malformed_config_is_reported() -> Result<(), Box<dyn Error>> {
    let dir = workspace()?;
    fs::write(dir.path().join("codeshell.json"), "{ nope")?;
    codeshell(dir.path())?
        .arg("ls")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse config"));
    Ok(())
}
