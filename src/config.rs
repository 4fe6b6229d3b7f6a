//! Configuration for rookery paths and ingest limits.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (ROOKERY_HOME)
//! 2. Config file (.rookery/config.yaml, searched upward from cwd)
//! 3. Defaults (~/.rookery)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<std::result::Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub limits: Option<LimitsConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to the config file)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    pub max_batch_results: Option<usize>,
    pub max_page_size: Option<usize>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to rookery home (flow state)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Ingest limits
    pub limits: IngestLimits,
}

/// Bounds on ingestion and query sizes
#[derive(Debug, Clone, Copy)]
pub struct IngestLimits {
    /// Largest accepted result batch
    pub max_batch_results: usize,

    /// Largest result page a single query may return
    pub max_page_size: usize,
}

impl Default for IngestLimits {
    fn default() -> Self {
        Self {
            max_batch_results: 1000,
            max_page_size: 500,
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".rookery").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn limits_from(config: Option<&LimitsConfig>) -> IngestLimits {
    let defaults = IngestLimits::default();
    IngestLimits {
        max_batch_results: config
            .and_then(|l| l.max_batch_results)
            .unwrap_or(defaults.max_batch_results),
        max_page_size: config
            .and_then(|l| l.max_page_size)
            .unwrap_or(defaults.max_page_size),
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".rookery");

    let config_file = find_config_file();

    let (home, limits) = if let Some(ref config_path) = config_file {
        let config = load_config_file(config_path)?;

        let home = if let Ok(env_home) = std::env::var("ROOKERY_HOME") {
            PathBuf::from(env_home)
        } else if let Some(ref home_path) = config.paths.home {
            // home is relative to the .rookery/ directory
            let rookery_dir = config_path.parent().unwrap_or(Path::new("."));
            resolve_path(rookery_dir, home_path)
        } else {
            default_home.clone()
        };

        (home, limits_from(config.limits.as_ref()))
    } else {
        let home = std::env::var("ROOKERY_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_home.clone());

        (home, IngestLimits::default())
    };

    Ok(ResolvedConfig {
        home,
        config_file,
        limits,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the rookery home directory (flow state).
pub fn rookery_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// Get the flows directory ($ROOKERY_HOME/flows)
pub fn flows_dir() -> Result<PathBuf> {
    Ok(config()?.home.join("flows"))
}

/// Get the configured ingest limits
pub fn ingest_limits() -> Result<IngestLimits> {
    Ok(config()?.limits)
}
