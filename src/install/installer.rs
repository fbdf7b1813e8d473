//! External installer invocation
//!
//! The package manager runs as `<command> install <args...>` inside the
//! package directory. Stderr is always captured for the error message;
//! in verbose mode both streams are mirrored to the terminal as they arrive.

use crate::error::{SmiError, SmiResult};
use async_trait::async_trait;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Something that can materialize a package's dependencies
#[async_trait]
pub trait Installer: Send + Sync {
    /// Install dependencies for the package in `package_dir`
    async fn install(&self, package_dir: &Path, args: &[String]) -> SmiResult<()>;

    /// Human-readable installer name for display
    fn name(&self) -> &str;
}

/// Installer running an external package manager
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: String,
    verbose: bool,
    timeout: Option<Duration>,
}

impl CommandInstaller {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            verbose: false,
            timeout: None,
        }
    }

    /// Mirror installer output to the terminal
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Kill the installer if it runs longer than `timeout`
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command_line(&self, args: &[String]) -> String {
        std::iter::once(self.program.as_str())
            .chain(std::iter::once("install"))
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl Installer for CommandInstaller {
    async fn install(&self, package_dir: &Path, args: &[String]) -> SmiResult<()> {
        let command_line = self.command_line(args);
        info!("Installing with '{}': {}", self.program, package_dir.display());
        debug!("Executing: {}", command_line);

        let mut child = Command::new(&self.program)
            .arg("install")
            .args(args)
            .current_dir(package_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SmiError::command_failed(command_line.clone(), e))?;

        let verbose = self.verbose;
        let run = async {
            let stderr = stream_child_output(&mut child, verbose).await;
            let status = child.wait().await;
            (stderr, status)
        };

        let finished = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.ok(),
            None => Some(run.await),
        };

        let Some((stderr, status)) = finished else {
            // kill_on_drop would also reap it, but wait for it here so the
            // caller never races a still-running installer.
            if let Err(e) = child.kill().await {
                warn!("Failed to kill timed-out installer '{}': {}", command_line, e);
            }
            return Err(SmiError::InstallerTimeout {
                command: command_line,
                seconds: self.timeout.map(|t| t.as_secs()).unwrap_or_default(),
            });
        };

        let status: ExitStatus = status.map_err(|e| SmiError::command_failed(command_line.clone(), e))?;
        if status.success() {
            return Ok(());
        }

        Err(SmiError::InstallerFailed {
            command: command_line,
            code: status.code().unwrap_or(-1),
            stderr: stderr.join("\n"),
        })
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Drain stdout and stderr of a child, returning the stderr lines.
///
/// Stdout is only printed in verbose mode; stderr is always collected.
async fn stream_child_output(child: &mut Child, verbose: bool) -> Vec<String> {
    let mut stdout_lines = child.stdout.take().map(|s| BufReader::new(s).lines());
    let mut stderr_lines = child.stderr.take().map(|s| BufReader::new(s).lines());

    let mut captured = Vec::new();
    let mut stdout_done = stdout_lines.is_none();
    let mut stderr_done = stderr_lines.is_none();

    while !stdout_done || !stderr_done {
        tokio::select! {
            line = next_line(&mut stdout_lines), if !stdout_done => {
                match line {
                    Some(line) => {
                        if verbose {
                            println!("{line}");
                        }
                    }
                    None => stdout_done = true,
                }
            }
            line = next_line(&mut stderr_lines), if !stderr_done => {
                match line {
                    Some(line) => {
                        if verbose {
                            eprintln!("{line}");
                        }
                        captured.push(line);
                    }
                    None => stderr_done = true,
                }
            }
        }
    }

    captured
}

async fn next_line<R>(lines: &mut Option<tokio::io::Lines<BufReader<R>>>) -> Option<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    match lines {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => None,
    }
}
