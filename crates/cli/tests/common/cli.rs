//! CLI command execution helpers with automatic timing
//!
//! Wraps the `tw` binary: measures execution time, feeds stdin and
//! provides convenient assertion methods. A command can also be spawned
//! and observed while it runs, since `tw` only exits once stdin closes.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// CLI command builder with timing
pub struct TwCommand {
    binary_path: PathBuf,
    working_dir: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    stdin_data: Option<String>,
    timeout: Duration,
}

impl TwCommand {
    /// Create a new command in the given working directory
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        Self {
            binary_path: PathBuf::from(env!("CARGO_BIN_EXE_tw")),
            working_dir: working_dir.as_ref().to_path_buf(),
            args: Vec::new(),
            env: HashMap::new(),
            stdin_data: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Add command arguments
    pub fn args(&mut self, args: &[&str]) -> &mut Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    /// Set environment variable
    pub fn env(&mut self, key: &str, value: &str) -> &mut Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    /// Provide stdin data (stdin is closed after it is written)
    pub fn stdin(&mut self, data: &str) -> &mut Self {
        self.stdin_data = Some(data.to_string());
        self
    }

    /// Set command timeout
    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Start the command without closing stdin
    pub fn spawn(&self) -> Result<RunningCommand> {
        let start = Instant::now();

        let mut child = Command::new(&self.binary_path)
            .args(&self.args)
            .current_dir(&self.working_dir)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn command")?;

        let mut stdin = child.stdin.take().context("stdin not piped")?;
        if let Some(data) = &self.stdin_data {
            stdin.write_all(data.as_bytes())?;
        }

        // Forward stdout line by line so tests can wait for progress
        let stdout = child.stdout.take().context("stdout not piped")?;
        let (line_tx, lines) = mpsc::channel();
        let stdout_reader = thread::spawn(move || {
            for line in BufReader::new(stdout).lines().map_while(|line| line.ok()) {
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        });

        let mut stderr = child.stderr.take().context("stderr not piped")?;
        let stderr_reader = thread::spawn(move || {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf);
            buf
        });

        Ok(RunningCommand {
            child,
            stdin: Some(stdin),
            lines,
            stdout: Vec::new(),
            stdout_reader,
            stderr_reader,
            args: self.args.clone(),
            timeout: self.timeout,
            start,
        })
    }

    /// Execute command and return result with timing
    ///
    /// Stdin is closed right after the configured data is written.
    pub fn execute(&self) -> Result<CommandResult> {
        self.spawn()?.finish()
    }

    /// Execute and assert success
    pub fn assert_success(&self) -> Result<CommandResult> {
        let result = self.execute()?;

        if !result.success() {
            anyhow::bail!(
                "Command failed (exit code: {}):\nArgs: {:?}\nStdout: {}\nStderr: {}",
                result.exit_code,
                self.args,
                result.stdout,
                result.stderr
            );
        }

        Ok(result)
    }

    /// Execute and expect failure
    pub fn assert_failure(&self) -> Result<CommandResult> {
        let result = self.execute()?;

        if result.success() {
            anyhow::bail!(
                "Command should have failed but succeeded:\nArgs: {:?}\nStdout: {}",
                self.args,
                result.stdout
            );
        }

        Ok(result)
    }
}

/// A spawned command whose stdin is still open
pub struct RunningCommand {
    child: Child,
    stdin: Option<ChildStdin>,
    lines: mpsc::Receiver<String>,
    stdout: Vec<String>,
    stdout_reader: JoinHandle<()>,
    stderr_reader: JoinHandle<String>,
    args: Vec<String>,
    timeout: Duration,
    start: Instant,
}

impl RunningCommand {
    /// Block until a stdout line contains `text`, within the command timeout
    pub fn wait_for_stdout(&mut self, text: &str) -> Result<()> {
        let deadline = self.start + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let line = self.lines.recv_timeout(remaining).with_context(|| {
                format!(
                    "No stdout line containing {:?} from {:?}; got:\n{}",
                    text,
                    self.args,
                    self.stdout.join("\n")
                )
            })?;
            let found = line.contains(text);
            self.stdout.push(line);
            if found {
                return Ok(());
            }
        }
    }

    /// Close stdin and wait for the process to exit
    pub fn finish(mut self) -> Result<CommandResult> {
        // Dropping stdin closes it, which the launcher treats as a stop request
        drop(self.stdin.take());

        // Wait on a helper thread so a hung process fails the test
        let (tx, rx) = mpsc::channel();
        let mut child = self.child;
        thread::spawn(move || {
            let _ = tx.send(child.wait());
        });
        let remaining = (self.start + self.timeout).saturating_duration_since(Instant::now());
        let status = rx
            .recv_timeout(remaining)
            .with_context(|| format!("Command timed out after {:?}: {:?}", self.timeout, self.args))?
            .context("Failed to wait for command")?;

        let _ = self.stdout_reader.join();
        let mut stdout = self.stdout;
        stdout.extend(self.lines.try_iter());
        let stderr = self.stderr_reader.join().unwrap_or_default();

        Ok(CommandResult {
            stdout: stdout.iter().map(|line| format!("{}\n", line)).collect(),
            stderr,
            exit_code: status.code().unwrap_or(-1),
            duration: self.start.elapsed(),
        })
    }
}

/// Command execution result with timing
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl CommandResult {
    /// Check if command succeeded
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Check if stdout contains text
    pub fn contains_stdout(&self, text: &str) -> bool {
        self.stdout.contains(text)
    }

    /// Check if stderr contains text
    pub fn contains_stderr(&self, text: &str) -> bool {
        self.stderr.contains(text)
    }
}

/// Macro for convenient command construction
///
/// Usage:
/// ```ignore
/// tw!(dir, "src").stdin("\n").assert_success()?;
/// ```
#[macro_export]
macro_rules! tw {
    ($dir:expr $(, $arg:expr)*) => {{
        let mut cmd = $crate::common::cli::TwCommand::new($dir);
        cmd.args(&[$($arg),*]);
        cmd
    }};
}
