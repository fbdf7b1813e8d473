//! Bulk copy backends
//!
//! The cache only depends on the `BulkCopy` contract: copy a whole tree, or
//! copy an explicit list of relative paths between two roots. Both merge into
//! an existing destination and overwrite what is already there.
//!
//! - `NativeCopier`: std::fs on the blocking pool, symlinks copied as links
//! - `CommandCopier`: `rsync -a --force`, with `--files-from` for path lists.
//!   rsync replaces a stale symlink or file with the directory it copies

use crate::error::{SmiError, SmiResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;
use walkdir::WalkDir;

/// Copy capability used to populate and restore cache entries
#[async_trait]
pub trait BulkCopy: Send + Sync {
    /// Copy the contents of `source` into `dest`, creating `dest` if needed
    async fn copy_tree(&self, source: &Path, dest: &Path) -> SmiResult<()>;

    /// Copy `paths` (relative, '/'-separated) from `source_root` to `dest_root`
    async fn copy_paths(&self, source_root: &Path, dest_root: &Path, paths: &[String]) -> SmiResult<()>;

    /// Human-readable backend name
    fn name(&self) -> &'static str;
}

/// Which copy backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyBackend {
    #[default]
    Native,
    Command,
}

/// Build the copier for a backend
pub fn create_copier(backend: CopyBackend) -> Arc<dyn BulkCopy> {
    match backend {
        CopyBackend::Native => Arc::new(NativeCopier),
        CopyBackend::Command => Arc::new(CommandCopier),
    }
}

/// In-process copier
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeCopier;

#[async_trait]
impl BulkCopy for NativeCopier {
    async fn copy_tree(&self, source: &Path, dest: &Path) -> SmiResult<()> {
        let source = source.to_path_buf();
        let dest = dest.to_path_buf();
        run_blocking(move || copy_tree_blocking(&source, &dest)).await
    }

    async fn copy_paths(&self, source_root: &Path, dest_root: &Path, paths: &[String]) -> SmiResult<()> {
        let source_root = source_root.to_path_buf();
        let dest_root = dest_root.to_path_buf();
        let paths = paths.to_vec();
        run_blocking(move || {
            fs::create_dir_all(&dest_root)
                .map_err(|e| SmiError::io(format!("creating {}", dest_root.display()), e))?;
            for relative in &paths {
                let from = source_root.join(relative);
                let to = dest_root.join(relative);
                copy_entry(&from, &to)?;
            }
            Ok(())
        })
        .await
    }

    fn name(&self) -> &'static str {
        "native"
    }
}

async fn run_blocking<F>(f: F) -> SmiResult<()>
where
    F: FnOnce() -> SmiResult<()> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SmiError::Internal(format!("copy task failed: {e}")))?
}

fn copy_tree_blocking(source: &Path, dest: &Path) -> SmiResult<()> {
    fs::create_dir_all(dest).map_err(|e| SmiError::io(format!("creating {}", dest.display()), e))?;

    for entry in WalkDir::new(source).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|e| {
            let context = format!("walking {}", source.display());
            match e.into_io_error() {
                Some(io) => SmiError::io(context, io),
                None => SmiError::Internal(context),
            }
        })?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| SmiError::Internal(e.to_string()))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            if fs::symlink_metadata(&target).is_ok_and(|m| !m.is_dir()) {
                remove_existing(&target)?;
            }
            fs::create_dir_all(&target)
                .map_err(|e| SmiError::io(format!("creating {}", target.display()), e))?;
        } else {
            copy_entry(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Copy a single file or symlink, replacing whatever sits at `to`
fn copy_entry(from: &Path, to: &Path) -> SmiResult<()> {
    let meta = fs::symlink_metadata(from)
        .map_err(|e| SmiError::io(format!("reading {}", from.display()), e))?;

    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| SmiError::io(format!("creating {}", parent.display()), e))?;
    }
    if fs::symlink_metadata(to).is_ok() {
        remove_existing(to)?;
    }

    if meta.file_type().is_symlink() {
        let link = fs::read_link(from)
            .map_err(|e| SmiError::io(format!("reading link {}", from.display()), e))?;
        make_symlink(&link, to).map_err(|e| SmiError::io(format!("linking {}", to.display()), e))?;
    } else if meta.is_dir() {
        copy_tree_blocking(from, to)?;
    } else {
        fs::copy(from, to).map_err(|e| {
            SmiError::io(format!("copying {} to {}", from.display(), to.display()), e)
        })?;
    }
    Ok(())
}

fn remove_existing(path: &Path) -> SmiResult<()> {
    let meta = fs::symlink_metadata(path)
        .map_err(|e| SmiError::io(format!("reading {}", path.display()), e))?;
    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| SmiError::io(format!("removing {}", path.display()), e))
}

#[cfg(unix)]
fn make_symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn make_symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(original, link)
}

/// Copier shelling out to `rsync`
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandCopier;

impl CommandCopier {
    async fn run(&self, mut cmd: Command, command_line: String, stdin: Option<String>) -> SmiResult<()> {
        debug!("Executing: {}", command_line);

        let mut child = cmd
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SmiError::command_failed(command_line.clone(), e))?;

        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input.as_bytes())
                    .await
                    .map_err(|e| SmiError::io(format!("writing file list to {command_line}"), e))?;
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SmiError::command_failed(command_line.clone(), e))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(SmiError::copy_failed(
                command_line,
                String::from_utf8_lossy(&output.stderr),
            ))
        }
    }
}

#[async_trait]
impl BulkCopy for CommandCopier {
    async fn copy_tree(&self, source: &Path, dest: &Path) -> SmiResult<()> {
        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|e| SmiError::io(format!("creating {}", dest.display()), e))?;

        let from = format!("{}/", source.display());
        let to = format!("{}/", dest.display());
        let mut cmd = Command::new("rsync");
        cmd.args(["-a", "--force"]).arg(&from).arg(&to);
        let command_line = format!("rsync -a --force {from} {to}");
        self.run(cmd, command_line, None).await
    }

    async fn copy_paths(&self, source_root: &Path, dest_root: &Path, paths: &[String]) -> SmiResult<()> {
        tokio::fs::create_dir_all(dest_root)
            .await
            .map_err(|e| SmiError::io(format!("creating {}", dest_root.display()), e))?;

        let from = format!("{}/", source_root.display());
        let to = format!("{}/", dest_root.display());
        let mut cmd = Command::new("rsync");
        cmd.args(["-a", "--force", "--files-from=-"]).arg(&from).arg(&to);
        let command_line = format!("rsync -a --force --files-from=- {from} {to}");
        self.run(cmd, command_line, Some(paths.join("\n"))).await
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn native_copy_tree_merges_and_keeps_links() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write(&src.path().join("a/index.js"), "a");
        std::os::unix::fs::symlink("../a", src.path().join("link")).unwrap();
        write(&dst.path().join("out/existing.txt"), "keep");
        write(&dst.path().join("out/a/index.js"), "old");

        NativeCopier
            .copy_tree(src.path(), &dst.path().join("out"))
            .await
            .unwrap();

        let out = dst.path().join("out");
        assert_eq!(fs::read_to_string(out.join("a/index.js")).unwrap(), "a");
        assert_eq!(fs::read_to_string(out.join("existing.txt")).unwrap(), "keep");
        assert_eq!(fs::read_link(out.join("link")).unwrap(), PathBuf::from("../a"));
    }

    #[tokio::test]
    async fn native_copy_paths_copies_only_listed() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write(&src.path().join("dist/out.js"), "built");
        write(&src.path().join("src/main.js"), "source");

        NativeCopier
            .copy_paths(src.path(), dst.path(), &["dist/out.js".to_string()])
            .await
            .unwrap();

        assert_eq!(
            fs::read_to_string(dst.path().join("dist/out.js")).unwrap(),
            "built"
        );
        assert!(!dst.path().join("src").exists());
    }

    #[tokio::test]
    async fn native_copy_missing_path_fails() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();

        let result = NativeCopier
            .copy_paths(src.path(), dst.path(), &["gone.js".to_string()])
            .await;

        assert!(matches!(result, Err(SmiError::Io { .. })));
    }

    async fn has_rsync() -> bool {
        Command::new("rsync")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok_and(|s| s.success())
    }

    #[tokio::test]
    async fn command_copy_tree_replaces_stale_link() {
        if !has_rsync().await {
            return;
        }
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write(&src.path().join("lib/index.js"), "fresh");
        std::os::unix::fs::symlink("../a", src.path().join("link")).unwrap();
        let out = dst.path().join("out");
        write(&out.join("elsewhere/index.js"), "stale");
        write(&out.join("existing.txt"), "keep");
        std::os::unix::fs::symlink(out.join("elsewhere"), out.join("lib")).unwrap();

        CommandCopier.copy_tree(src.path(), &out).await.unwrap();

        assert!(fs::symlink_metadata(out.join("lib")).unwrap().is_dir());
        assert_eq!(fs::read_to_string(out.join("lib/index.js")).unwrap(), "fresh");
        assert_eq!(fs::read_to_string(out.join("elsewhere/index.js")).unwrap(), "stale");
        assert_eq!(fs::read_to_string(out.join("existing.txt")).unwrap(), "keep");
        assert_eq!(fs::read_link(out.join("link")).unwrap(), PathBuf::from("../a"));
    }

    #[tokio::test]
    async fn command_copy_paths_copies_only_listed() {
        if !has_rsync().await {
            return;
        }
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write(&src.path().join("dist/out.js"), "built");
        write(&src.path().join("src/main.js"), "source");
        write(&dst.path().join("dist/out.js"), "old");

        CommandCopier
            .copy_paths(src.path(), dst.path(), &["dist/out.js".to_string()])
            .await
            .unwrap();

        assert_eq!(
            fs::read_to_string(dst.path().join("dist/out.js")).unwrap(),
            "built"
        );
        assert!(!dst.path().join("src").exists());
    }

    #[tokio::test]
    async fn command_copy_missing_path_reports_stderr() {
        if !has_rsync().await {
            return;
        }
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();

        let result = CommandCopier
            .copy_paths(src.path(), dst.path(), &["gone.js".to_string()])
            .await;

        assert!(matches!(result, Err(SmiError::CopyFailed { .. })));
    }

    #[test]
    fn backend_from_config_string() {
        #[derive(Deserialize)]
        struct Wrap {
            backend: CopyBackend,
        }
        let w: Wrap = toml::from_str(r#"backend = "command""#).unwrap();
        assert_eq!(w.backend, CopyBackend::Command);
        assert_eq!(create_copier(CopyBackend::Native).name(), "native");
    }
}
