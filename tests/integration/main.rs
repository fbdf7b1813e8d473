//! Integration tests for smi

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// Command isolated from the user's config and environment
    fn smi(home: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("smi");
        cmd.env("SMI_CONFIG", home.path().join("config.toml"))
            .env_remove("SMI_CACHE_DIRPATH")
            .env_remove("SMI_CACHE_EPOCH");
        cmd
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        smi(&home)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("cached npm installs"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        smi(&home)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("smi"));
    }

    #[test]
    fn install_without_cache_root_fails() {
        let home = TempDir::new().unwrap();
        smi(&home)
            .args(["install", "--path"])
            .arg(home.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("No cache root configured"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn install_without_package_json_fails() {
        let home = TempDir::new().unwrap();
        let pkg = home.path().join("empty");
        std::fs::create_dir_all(&pkg).unwrap();

        smi(&home)
            .env("SMI_CACHE_DIRPATH", home.path().join("cache"))
            .args(["install", "--path"])
            .arg(&pkg)
            .assert()
            .failure()
            .stderr(predicate::str::contains("no package.json found"));
    }

    #[test]
    fn relink_missing_path_fails() {
        let home = TempDir::new().unwrap();
        smi(&home)
            .args(["relink", "--path"])
            .arg(home.path().join("nope"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("Path not found"));
    }

    #[test]
    fn cache_path_includes_epoch() {
        let home = TempDir::new().unwrap();
        smi(&home)
            .env("SMI_CACHE_DIRPATH", home.path().join("cache"))
            .env("SMI_CACHE_EPOCH", "gen2")
            .args(["cache", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("gen2"));
    }

    #[test]
    fn cache_list_empty() {
        let home = TempDir::new().unwrap();
        smi(&home)
            .args(["cache", "list", "--cache-dir"])
            .arg(home.path().join("cache"))
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache entries"));
    }

    #[test]
    fn config_path() {
        let home = TempDir::new().unwrap();
        smi(&home)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_init_then_show() {
        let home = TempDir::new().unwrap();
        smi(&home).args(["config", "init"]).assert().success();
        assert!(home.path().join("config.toml").exists());

        smi(&home)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[install]"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let home = TempDir::new().unwrap();
        std::fs::write(home.path().join("config.toml"), "[cache\n").unwrap();

        smi(&home)
            .args(["cache", "path"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }
}

#[cfg(unix)]
mod install_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Workspace with a fake package manager configured as the installer
    struct Workspace {
        dir: TempDir,
    }

    impl Workspace {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let program = dir.path().join("fake-npm");
            fs::write(
                &program,
                "#!/bin/sh\n\
                 echo \"$@\" >> \"$(dirname \"$0\")/calls.log\"\n\
                 mkdir -p node_modules/dep\n\
                 echo 'module.exports = 1' > node_modules/dep/index.js\n\
                 echo built > build.txt\n",
            )
            .unwrap();
            fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();

            let config = format!(
                "[install]\ncommand = {:?}\n",
                program.to_string_lossy().into_owned()
            );
            fs::write(dir.path().join("config.toml"), config).unwrap();

            Self { dir }
        }

        fn smi(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("smi");
            cmd.env("SMI_CONFIG", self.dir.path().join("config.toml"))
                .env("SMI_CACHE_DIRPATH", self.dir.path().join("cache"))
                .env_remove("SMI_CACHE_EPOCH");
            cmd
        }

        fn package(&self, name: &str, dependencies: &str) -> PathBuf {
            let pkg = self.dir.path().join("ws").join(name);
            fs::create_dir_all(&pkg).unwrap();
            fs::write(
                pkg.join("package.json"),
                format!(r#"{{"name":"pkg","dependencies":{dependencies}}}"#),
            )
            .unwrap();
            pkg
        }

        fn installer_calls(&self) -> usize {
            fs::read_to_string(self.dir.path().join("calls.log"))
                .map(|s| s.lines().count())
                .unwrap_or(0)
        }

        fn install(&self, pkg: &Path) -> assert_cmd::assert::Assert {
            self.smi().args(["install", "--path"]).arg(pkg).assert()
        }
    }

    #[test]
    fn second_install_is_a_no_op() {
        let ws = Workspace::new();
        let app = ws.package("app", r#"{"dep":"^1.0.0"}"#);

        ws.install(&app)
            .success()
            .stdout(predicate::str::contains("(installed)"));
        ws.install(&app)
            .success()
            .stdout(predicate::str::contains("(already installed)"));

        assert_eq!(ws.installer_calls(), 1);
        assert!(app.join(".smi-install.json").exists());
    }

    #[test]
    fn fresh_copy_restores_from_cache() {
        let ws = Workspace::new();
        let first = ws.package("first", r#"{"dep":"^1.0.0"}"#);
        let second = ws.package("second", r#"{"dep":"^1.0.0"}"#);
        ws.install(&first).success();
        ws.install(&second)
            .success()
            .stdout(predicate::str::contains("(installed from cache)"));

        assert_eq!(ws.installer_calls(), 1);
        assert_eq!(
            fs::read(first.join("build.txt")).unwrap(),
            fs::read(second.join("build.txt")).unwrap()
        );
        assert!(second.join("node_modules/dep/index.js").exists());

        ws.smi()
            .args(["cache", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("-dependencies"))
            .stdout(predicate::str::contains("-changes"));
    }

    #[test]
    fn trailing_args_reach_installer() {
        let ws = Workspace::new();
        let app = ws.package("app", "{}");

        ws.smi()
            .args(["install", "--path"])
            .arg(&app)
            .args(["--", "--production"])
            .assert()
            .success();

        let calls = fs::read_to_string(ws.dir.path().join("calls.log")).unwrap();
        assert_eq!(calls.trim(), "install --production");
    }

    #[test]
    fn links_sibling_dependency() {
        let ws = Workspace::new();
        let app = ws.package("app", r#"{"lib":"^1.0.0"}"#);
        let other = ws.dir.path().join("other");
        fs::create_dir_all(other.join("node_modules/lib")).unwrap();
        fs::write(other.join("node_modules/lib/package.json"), "{}").unwrap();

        ws.smi()
            .args(["install", "--path"])
            .arg(&app)
            .arg("--link-from")
            .arg(&other)
            .assert()
            .success();

        let link = app.join("node_modules/lib");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(
            fs::canonicalize(&link).unwrap(),
            fs::canonicalize(other.join("node_modules/lib")).unwrap()
        );
    }

    #[test]
    fn relink_without_cache_root() {
        let ws = Workspace::new();
        let app = ws.package("app", r#"{"lib":"^1.0.0"}"#);
        let other = ws.dir.path().join("other");
        fs::create_dir_all(other.join("node_modules/lib")).unwrap();

        ws.smi()
            .env_remove("SMI_CACHE_DIRPATH")
            .args(["relink", "--path"])
            .arg(&app)
            .arg("--link-from")
            .arg(&other)
            .assert()
            .success()
            .stdout(predicate::str::contains("Linked 1 dependencies"));

        assert!(app.join("node_modules/lib").exists());
    }

    #[test]
    fn info_reports_cached_entries() {
        let ws = Workspace::new();
        let app = ws.package("app", r#"{"dep":"^1.0.0"}"#);

        ws.smi()
            .args(["info", "--path"])
            .arg(&app)
            .assert()
            .success()
            .stdout(predicate::str::contains("Installed: no"))
            .stdout(predicate::str::contains("Name:    pkg"));

        ws.install(&app).success();

        ws.smi()
            .args(["info", "--path"])
            .arg(&app)
            .assert()
            .success()
            .stdout(predicate::str::contains("Installed: yes"))
            .stdout(predicate::str::contains(".smi-install.json"))
            .stdout(predicate::str::contains("-dependencies"));
    }

    #[test]
    fn failing_installer_surfaces_stderr() {
        let ws = Workspace::new();
        let program = ws.dir.path().join("broken-npm");
        fs::write(&program, "#!/bin/sh\necho 'ERR! 404 not found' >&2\nexit 1\n").unwrap();
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();
        fs::write(
            ws.dir.path().join("config.toml"),
            format!("[install]\ncommand = {:?}\n", program.to_string_lossy().into_owned()),
        )
        .unwrap();
        let app = ws.package("app", "{}");

        ws.install(&app)
            .failure()
            .stderr(predicate::str::contains("ERR! 404 not found"));
        assert!(!app.join(".smi-install.json").exists());
    }
}
