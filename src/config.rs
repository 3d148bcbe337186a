//! Project-level configuration: `.wicked-search/config.toml`.
//!
//! A TOML file supplies defaults, and CLI flags always override them.
//! Discovery walks up from the current directory, so a config file
//! anywhere above the working directory is honored.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level representation of `.wicked-search/config.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub index: Option<IndexSection>,
    #[serde(default)]
    pub serve: Option<ServeSection>,
    #[serde(default)]
    pub store: Option<StoreSection>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IndexSection {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub include_globs: Vec<String>,
    #[serde(default, alias = "exclude")]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub languages: Option<Vec<String>>,
    #[serde(default)]
    pub incremental: Option<bool>,
    #[serde(default)]
    pub max_file_size_bytes: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServeSection {
    #[serde(default)]
    pub addr: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StoreSection {
    #[serde(default)]
    pub index_path: Option<PathBuf>,
}

/// Discover and load a project-local `.wicked-search/config.toml` starting
/// from the current working directory and walking up parent directories.
/// Returns `Ok(None)` when no config file exists anywhere up the tree.
pub fn load_cli_config() -> Result<Option<CliConfig>> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    load_cli_config_from(&cwd)
}

/// Same as [`load_cli_config`] but rooted at an explicit starting
/// directory, split out for testability.
pub fn load_cli_config_from(start: &Path) -> Result<Option<CliConfig>> {
    let Some(path) = find_project_config(start) else {
        return Ok(None);
    };

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: CliConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse TOML config at {}", path.display()))?;

    Ok(Some(config))
}

fn find_project_config(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);

    while let Some(current) = dir {
        let candidate = current.join(".wicked-search").join("config.toml");
        if candidate.is_file() {
            return Some(candidate);
        }

        let flat = current.join(".wicked-search.toml");
        if flat.is_file() {
            return Some(flat);
        }

        dir = current.parent();
    }

    None
}

/// Resolve the default on-disk index path for a project rooted at
/// `root`, honoring an explicit `store.index_path` override.
pub fn resolve_index_path(config: &Option<CliConfig>, root: &Path) -> PathBuf {
    if let Some(cfg) = config {
        if let Some(store) = &cfg.store {
            if let Some(path) = &store.index_path {
                return path.clone();
            }
        }
    }
    root.join(".wicked-search").join("index.sqlite3")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_cli_config_returns_none_when_absent() {
        let dir = tempdir().unwrap();
        let config = load_cli_config_from(dir.path()).unwrap();
        assert!(config.is_none());
    }

    #[test]
    fn load_cli_config_parses_nested_config_toml() {
        let dir = tempdir().unwrap();
        let cfg_dir = dir.path().join(".wicked-search");
        fs::create_dir_all(&cfg_dir).unwrap();
        fs::write(
            cfg_dir.join("config.toml"),
            r#"
            [index]
            project = "acme"
            include_globs = ["src/**"]
            exclude_globs = ["vendor/**"]

            [serve]
            port = 9090

            [store]
            index_path = "custom.sqlite3"
            "#,
        )
        .unwrap();

        let sub = dir.path().join("nested").join("deeper");
        fs::create_dir_all(&sub).unwrap();

        let config = load_cli_config_from(&sub).unwrap().unwrap();
        let index = config.index.unwrap();
        assert_eq!(index.project.as_deref(), Some("acme"));
        assert_eq!(index.include_globs, vec!["src/**".to_string()]);
        assert_eq!(config.serve.unwrap().port, Some(9090));
        assert_eq!(
            config.store.unwrap().index_path,
            Some(PathBuf::from("custom.sqlite3"))
        );
    }

    #[test]
    fn resolve_index_path_falls_back_to_default_location() {
        let dir = tempdir().unwrap();
        let path = resolve_index_path(&None, dir.path());
        assert_eq!(path, dir.path().join(".wicked-search").join("index.sqlite3"));
    }
}
