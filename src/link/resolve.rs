//! Dependency symlink resolution
//!
//! For each package descriptor under a workspace root, links every declared
//! dependency that is already available elsewhere into the descriptor's
//! `node_modules`, so the installer treats it as satisfied.
//!
//! Existing targets:
//! - a symlink is left alone
//! - anything else is removed and replaced by the link

use crate::descriptor::{PackageDescriptor, DESCRIPTOR_FILE};
use crate::error::{SmiError, SmiResult};
use crate::fingerprint::DEPENDENCY_DIR;
use crate::link::locate::AvailablePackages;
use futures_util::future::{join_all, try_join_all};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Which descriptors under the root take part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DescriptorScope {
    /// Only the root's own package.json
    #[default]
    Root,
    /// Every package.json below the root, dependency trees included
    Recursive,
}

/// Options for a linking pass
#[derive(Debug, Clone, Copy)]
pub struct LinkOptions {
    pub scope: DescriptorScope,
    /// Link with paths relative to the link's parent (survives relocation)
    pub relative: bool,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            scope: DescriptorScope::Root,
            relative: true,
        }
    }
}

/// What a linking pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkReport {
    pub descriptors: usize,
    pub skipped_descriptors: usize,
    pub created: usize,
    pub replaced: usize,
    pub already_linked: usize,
}

impl LinkReport {
    fn absorb(&mut self, other: LinkReport) {
        self.descriptors += other.descriptors;
        self.skipped_descriptors += other.skipped_descriptors;
        self.created += other.created;
        self.replaced += other.replaced;
        self.already_linked += other.already_linked;
    }
}

enum LinkOutcome {
    Created,
    Replaced,
    AlreadyLinked,
}

/// Links one descriptor will create
struct DescriptorPlan {
    dir: PathBuf,
    links: Vec<PlannedLink>,
}

struct PlannedLink {
    name: String,
    source: PathBuf,
    target: PathBuf,
}

/// Link available dependencies for every descriptor under `root`
///
/// Descriptors that fail to parse are skipped with a warning. A descriptor
/// inside a target that another descriptor links is dropped, since that
/// directory is about to be replaced. Filesystem failures abort the pass;
/// pending sibling operations are dropped.
pub async fn link_available(
    root: &Path,
    available: &AvailablePackages,
    options: LinkOptions,
) -> SmiResult<LinkReport> {
    let descriptor_paths = discover_descriptors(root, options.scope).await?;
    if descriptor_paths.is_empty() || available.is_empty() {
        return Ok(LinkReport::default());
    }

    let mut total = LinkReport::default();
    let mut plans = Vec::new();
    let parsed = join_all(descriptor_paths.iter().map(|path| PackageDescriptor::from_file(path))).await;
    for (path, result) in descriptor_paths.iter().zip(parsed) {
        match result {
            Ok(descriptor) => plans.push(plan_descriptor(&descriptor, available)),
            Err(e) => {
                warn!("Skipping descriptor {}: {}", path.display(), e);
                total.skipped_descriptors += 1;
            }
        }
    }

    let targets: Vec<PathBuf> = plans
        .iter()
        .flat_map(|plan| plan.links.iter().map(|link| link.target.clone()))
        .collect();
    plans.retain(|plan| match targets.iter().find(|target| plan.dir.starts_with(target)) {
        Some(target) => {
            debug!(
                "Ignoring descriptor in {}: {} is being relinked",
                plan.dir.display(),
                target.display()
            );
            false
        }
        None => true,
    });

    let reports = try_join_all(
        plans
            .iter()
            .map(|plan| link_descriptor(plan, options.relative)),
    )
    .await?;

    for report in reports {
        total.absorb(report);
    }

    info!(
        "Linked {} dependencies ({} replaced, {} already linked) across {} descriptors",
        total.created + total.replaced,
        total.replaced,
        total.already_linked,
        total.descriptors
    );
    Ok(total)
}

fn plan_descriptor(descriptor: &PackageDescriptor, available: &AvailablePackages) -> DescriptorPlan {
    let dir = descriptor.dir().to_path_buf();
    let modules_dir = dir.join(DEPENDENCY_DIR);

    // Dedup happens here, before any task starts
    let mut linked = HashSet::new();
    let mut links = Vec::new();
    for (name, _ty) in descriptor.dependencies.unique_names() {
        let Some(source) = available.get(name) else {
            continue;
        };
        if !linked.insert(name) {
            continue;
        }
        let target = modules_dir.join(name);
        if target == source {
            continue;
        }
        links.push(PlannedLink {
            name: name.to_string(),
            source: source.to_path_buf(),
            target,
        });
    }
    DescriptorPlan { dir, links }
}

async fn link_descriptor(plan: &DescriptorPlan, relative: bool) -> SmiResult<LinkReport> {
    let outcomes = try_join_all(
        plan.links
            .iter()
            .map(|link| link_one(&link.name, &link.source, &link.target, relative)),
    )
    .await?;

    let mut report = LinkReport {
        descriptors: 1,
        ..LinkReport::default()
    };
    for outcome in outcomes {
        match outcome {
            LinkOutcome::Created => report.created += 1,
            LinkOutcome::Replaced => report.replaced += 1,
            LinkOutcome::AlreadyLinked => report.already_linked += 1,
        }
    }
    Ok(report)
}

async fn link_one(name: &str, source: &Path, target: &Path, relative: bool) -> SmiResult<LinkOutcome> {
    let mut outcome = LinkOutcome::Created;

    if let Ok(meta) = fs::symlink_metadata(target).await {
        if meta.file_type().is_symlink() {
            return Ok(LinkOutcome::AlreadyLinked);
        }
        debug!("Replacing materialized copy at {}", target.display());
        let removed = if meta.is_dir() {
            fs::remove_dir_all(target).await
        } else {
            fs::remove_file(target).await
        };
        removed.map_err(|e| SmiError::io(format!("removing {}", target.display()), e))?;
        outcome = LinkOutcome::Replaced;
    }

    let parent = target
        .parent()
        .ok_or_else(|| SmiError::Internal(format!("link target {} has no parent", target.display())))?;
    fs::create_dir_all(parent)
        .await
        .map_err(|e| SmiError::io(format!("creating {}", parent.display()), e))?;

    let link_value = if relative {
        relative_path(parent, source)
    } else {
        source.to_path_buf()
    };

    debug!(
        "Symlinking dependency {} from {} to {}",
        name,
        link_value.display(),
        target.display()
    );
    symlink_dir(&link_value, target)
        .await
        .map_err(|e| SmiError::io(format!("symlinking {}", target.display()), e))?;

    Ok(outcome)
}

#[cfg(unix)]
async fn symlink_dir(original: &Path, link: &Path) -> std::io::Result<()> {
    fs::symlink(original, link).await
}

#[cfg(windows)]
async fn symlink_dir(original: &Path, link: &Path) -> std::io::Result<()> {
    fs::symlink_dir(original, link).await
}

/// Descriptor files under `root` for the given scope
pub async fn discover_descriptors(root: &Path, scope: DescriptorScope) -> SmiResult<Vec<PathBuf>> {
    match scope {
        DescriptorScope::Root => {
            let path = root.join(DESCRIPTOR_FILE);
            if fs::try_exists(&path).await.unwrap_or(false) {
                Ok(vec![path])
            } else {
                Ok(vec![])
            }
        }
        DescriptorScope::Recursive => {
            let root = root.to_path_buf();
            tokio::task::spawn_blocking(move || discover_recursive(&root))
                .await
                .map_err(|e| SmiError::Internal(format!("descriptor scan failed: {e}")))?
        }
    }
}

fn discover_recursive(root: &Path) -> SmiResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    let walker = WalkDir::new(root).follow_links(false).sort_by_file_name();
    for entry in walker.into_iter().filter_entry(|e| {
        e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.')
    }) {
        let entry = entry.map_err(|e| {
            let context = format!("scanning {} for descriptors", root.display());
            match e.into_io_error() {
                Some(source) => SmiError::io(context, source),
                None => SmiError::Internal(context),
            }
        })?;
        if entry.file_type().is_file() && entry.file_name() == DESCRIPTOR_FILE {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

/// Path to `to` as seen from directory `from`; both absolute
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component> = from.components().collect();
    let to: Vec<Component> = to.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common..from.len() {
        result.push("..");
    }
    for component in &to[common..] {
        result.push(component.as_os_str());
    }
    if result.as_os_str().is_empty() {
        result.push(".");
    }
    result
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::link::locate::locate;
    use std::fs as stdfs;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        stdfs::create_dir_all(path.parent().unwrap()).unwrap();
        stdfs::write(path, content).unwrap();
    }

    /// /ws/app declares lib; /ws/other/node_modules/lib exists
    fn workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        let ws = dir.path();
        write(
            &ws.join("app/package.json"),
            r#"{"name":"app","dependencies":{"lib":"^1.0.0"}}"#,
        );
        write(&ws.join("other/node_modules/lib/package.json"), r#"{"name":"lib"}"#);
        dir
    }

    #[test]
    fn relative_paths() {
        assert_eq!(
            relative_path(Path::new("/ws/app/node_modules"), Path::new("/ws/other/node_modules/lib")),
            PathBuf::from("../../other/node_modules/lib")
        );
        assert_eq!(relative_path(Path::new("/a/b"), Path::new("/a/b")), PathBuf::from("."));
        assert_eq!(relative_path(Path::new("/a"), Path::new("/a/b/c")), PathBuf::from("b/c"));
    }

    #[tokio::test]
    async fn links_available_dependency() {
        let dir = workspace();
        let ws = dir.path();
        let available = locate(&ws.join("other")).await.unwrap();

        let report = link_available(&ws.join("app"), &available, LinkOptions::default())
            .await
            .unwrap();

        let link = ws.join("app/node_modules/lib");
        assert!(stdfs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(
            stdfs::read_link(&link).unwrap(),
            PathBuf::from("../../other/node_modules/lib")
        );
        assert_eq!(
            stdfs::canonicalize(&link).unwrap(),
            stdfs::canonicalize(ws.join("other/node_modules/lib")).unwrap()
        );
        assert_eq!(report.created, 1);
    }

    #[tokio::test]
    async fn absolute_links_when_requested() {
        let dir = workspace();
        let ws = dir.path();
        let available = locate(&ws.join("other")).await.unwrap();
        let options = LinkOptions {
            relative: false,
            ..LinkOptions::default()
        };

        link_available(&ws.join("app"), &available, options).await.unwrap();

        assert_eq!(
            stdfs::read_link(ws.join("app/node_modules/lib")).unwrap(),
            ws.join("other/node_modules/lib")
        );
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let dir = workspace();
        let ws = dir.path();
        let available = locate(&ws.join("other")).await.unwrap();

        link_available(&ws.join("app"), &available, LinkOptions::default())
            .await
            .unwrap();
        let before = stdfs::read_link(ws.join("app/node_modules/lib")).unwrap();

        let report = link_available(&ws.join("app"), &available, LinkOptions::default())
            .await
            .unwrap();

        assert_eq!(report.created, 0);
        assert_eq!(report.already_linked, 1);
        assert_eq!(stdfs::read_link(ws.join("app/node_modules/lib")).unwrap(), before);
    }

    #[tokio::test]
    async fn replaces_materialized_copy() {
        let dir = workspace();
        let ws = dir.path();
        write(&ws.join("app/node_modules/lib/stale.js"), "old");
        let available = locate(&ws.join("other")).await.unwrap();

        let report = link_available(&ws.join("app"), &available, LinkOptions::default())
            .await
            .unwrap();

        assert_eq!(report.replaced, 1);
        assert!(stdfs::symlink_metadata(ws.join("app/node_modules/lib"))
            .unwrap()
            .file_type()
            .is_symlink());
    }

    #[tokio::test]
    async fn duplicate_declarations_link_once() {
        let dir = workspace();
        let ws = dir.path();
        write(
            &ws.join("app/package.json"),
            r#"{"dependencies":{"lib":"^1.0.0"},"devDependencies":{"lib":"^1.0.0"}}"#,
        );
        let available = locate(&ws.join("other")).await.unwrap();

        let report = link_available(&ws.join("app"), &available, LinkOptions::default())
            .await
            .unwrap();

        assert_eq!(report.created, 1);
        assert_eq!(report.already_linked, 0);
    }

    #[tokio::test]
    async fn unparsable_descriptor_is_skipped() {
        let dir = workspace();
        let ws = dir.path();
        write(&ws.join("app/package.json"), "{ broken");
        let available = locate(&ws.join("other")).await.unwrap();

        let report = link_available(&ws.join("app"), &available, LinkOptions::default())
            .await
            .unwrap();

        assert_eq!(report.skipped_descriptors, 1);
        assert!(!ws.join("app/node_modules").exists());
    }

    #[tokio::test]
    async fn recursive_scope_links_nested_descriptors() {
        let dir = workspace();
        let ws = dir.path();
        write(
            &ws.join("app/packages/sub/package.json"),
            r#"{"dependencies":{"lib":"1"}}"#,
        );
        write(&ws.join("app/.hidden/package.json"), r#"{"dependencies":{"lib":"1"}}"#);
        let available = locate(&ws.join("other")).await.unwrap();
        let options = LinkOptions {
            scope: DescriptorScope::Recursive,
            ..LinkOptions::default()
        };

        let report = link_available(&ws.join("app"), &available, options).await.unwrap();

        assert_eq!(report.descriptors, 2);
        assert!(ws.join("app/packages/sub/node_modules/lib").exists());
        assert!(!ws.join("app/.hidden/node_modules").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn recursive_scope_ignores_descriptors_inside_replaced_targets() {
        let options = LinkOptions {
            scope: DescriptorScope::Recursive,
            ..LinkOptions::default()
        };

        for _ in 0..20 {
            let dir = workspace();
            let ws = dir.path();
            // Materialized copy of lib that itself declares x
            write(
                &ws.join("app/node_modules/lib/package.json"),
                r#"{"name":"lib","dependencies":{"x":"1"}}"#,
            );
            write(&ws.join("other/node_modules/x/package.json"), r#"{"name":"x"}"#);
            let available = locate(&ws.join("other")).await.unwrap();

            let report = link_available(&ws.join("app"), &available, options)
                .await
                .unwrap();

            assert_eq!(report.descriptors, 1);
            assert_eq!(report.replaced, 1);
            let link = ws.join("app/node_modules/lib");
            assert!(stdfs::symlink_metadata(&link).unwrap().file_type().is_symlink());
            assert!(!ws.join("other/node_modules/lib/node_modules").exists());
        }
    }

    #[tokio::test]
    async fn link_failure_aborts() {
        let dir = workspace();
        let ws = dir.path();
        // A file where the node_modules directory should go
        write(&ws.join("app/node_modules"), "not a dir");
        let available = locate(&ws.join("other")).await.unwrap();

        let result = link_available(&ws.join("app"), &available, LinkOptions::default()).await;

        assert!(matches!(result, Err(SmiError::Io { .. })));
    }
}
