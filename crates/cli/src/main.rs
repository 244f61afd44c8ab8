//! Treewatch CLI - tw command

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

mod cmd;
mod logging;

/// Treewatch - print every change under a set of directory trees
#[derive(Parser, Debug)]
#[command(name = "tw")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directories to watch recursively
    dirs: Vec<PathBuf>,

    /// TOML config file with additional roots and the thread name
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write logs to <DIR>/tw.log instead of stderr
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Keep the guard alive so buffered log lines are flushed on exit
    let _log_guard = logging::init(cli.log_dir.as_deref())?;

    cmd::watch::run(cli.dirs, cli.config.as_deref())
}
