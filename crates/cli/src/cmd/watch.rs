//! Watch directories and print every change until Enter is pressed

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::debug;
use treewatch::{ChangeEvent, EventKind, ExitReason, WatchConfig, WatchSession};

pub fn run(dirs: Vec<PathBuf>, config_path: Option<&Path>) -> Result<()> {
    let mut config = match config_path {
        Some(path) => WatchConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => WatchConfig::default(),
    };
    config.roots.extend(dirs);
    debug!("Watch config: {:?}", config);

    if config.roots.is_empty() {
        println!("{}", "Nothing to watch (pass one or more directories)".dimmed());
        return Ok(());
    }

    let handle = WatchSession::from_config(&config)
        .start(print_events)
        .context("Failed to start watching")?;

    println!(
        "{} {} {}",
        "Watching".bold(),
        describe_roots(&config),
        "(press Enter to stop)".dimmed()
    );

    // EOF counts as a stop request too
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read stdin")?;

    println!("{}", "Interrupting...".yellow());
    handle.request_stop();
    let reason = handle.await_termination();

    match reason {
        ExitReason::Cancelled | ExitReason::Drained => {
            println!("{} {}", "Stopped:".green(), reason);
            Ok(())
        }
        ExitReason::Failed(_) | ExitReason::CallbackPanicked(_) | ExitReason::Panicked(_) => {
            anyhow::bail!("Watcher stopped unexpectedly: {}", reason)
        }
    }
}

fn print_events(dir: &Path, events: &[ChangeEvent]) {
    for event in events {
        let file = dir.join(&event.name);
        let kind = match event.kind {
            EventKind::Created => event.kind.to_string().green().to_string(),
            EventKind::Modified => event.kind.to_string().cyan().to_string(),
            EventKind::Deleted => event.kind.to_string().red().to_string(),
        };
        println!("Notified: {} on file: {}", kind, file.display());
    }
}

fn describe_roots(config: &WatchConfig) -> String {
    config
        .roots
        .iter()
        .map(|root| root.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
