//! Initialization helpers for `.router/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{RouterConfig, write_config};

/// Canonical paths within `.router/` for a project root.
#[derive(Debug, Clone)]
pub struct RouterPaths {
    pub root: PathBuf,
    pub router_dir: PathBuf,
    pub config_path: PathBuf,
    pub runs_dir: PathBuf,
    pub gitignore_path: PathBuf,
}

impl RouterPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let router_dir = root.join(".router");
        Self {
            root,
            config_path: router_dir.join("config.toml"),
            runs_dir: router_dir.join("runs"),
            gitignore_path: router_dir.join(".gitignore"),
            router_dir,
        }
    }
}

/// Options for [`init_router`].
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing router-owned files.
    pub force: bool,
}

/// Create `.router/` scaffolding in `root` with the default config.
///
/// Fails if `.router/` already exists unless `options.force` is set.
pub fn init_router(root: &Path, options: &InitOptions) -> Result<RouterPaths> {
    let paths = RouterPaths::new(root);
    if paths.router_dir.exists() && !paths.router_dir.is_dir() {
        return Err(anyhow!("router init: .router exists but is not a directory"));
    }
    if paths.router_dir.exists() && !options.force {
        return Err(anyhow!(
            "router init: .router already exists (use --force to overwrite)"
        ));
    }

    fs::create_dir_all(&paths.runs_dir)
        .with_context(|| format!("create directory {}", paths.runs_dir.display()))?;
    fs::write(&paths.gitignore_path, ROUTER_GITIGNORE)
        .with_context(|| format!("write file {}", paths.gitignore_path.display()))?;
    write_config(&paths.config_path, &RouterConfig::default())?;

    Ok(paths)
}

const ROUTER_GITIGNORE: &str = "runs/\n";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_config;

    #[test]
    fn init_creates_expected_layout() {
        let temp = tempfile::tempdir().expect("tempdir");

        let paths = init_router(temp.path(), &InitOptions { force: false }).expect("init");

        assert!(paths.router_dir.is_dir());
        assert!(paths.runs_dir.is_dir());
        assert!(paths.config_path.is_file());
        assert_eq!(
            fs::read_to_string(&paths.gitignore_path).expect("read"),
            ROUTER_GITIGNORE
        );
        assert_eq!(
            load_config(&paths.config_path).expect("load"),
            RouterConfig::default()
        );
    }

    #[test]
    fn init_without_force_refuses_existing_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_router(temp.path(), &InitOptions { force: false }).expect("init");

        let err = init_router(temp.path(), &InitOptions { force: false }).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn init_with_force_restores_default_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_router(temp.path(), &InitOptions { force: false }).expect("init");
        fs::write(&paths.config_path, "max_steps = 9\n").expect("customize");

        init_router(temp.path(), &InitOptions { force: true }).expect("re-init");

        assert_eq!(load_config(&paths.config_path).expect("load").max_steps, 5);
    }
}
