//! Configuration file management for molar.
//!
//! Provides a TOML-based config file at `~/.config/molar/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use molar_db::config::DbConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub catalog: Option<CatalogSection>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CatalogSection {
    /// Path to the service catalog TOML file.
    pub path: String,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the molar config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/molar` or `~/.config/molar`.
/// We intentionally ignore the platform-specific `dirs::config_dir()`
/// (which returns `~/Library/Application Support` on macOS).
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("molar");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("molar")
}

/// Return the path to the molar config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct MolarConfig {
    pub db_config: DbConfig,
    /// Path to the catalog file, when one is configured anywhere in the
    /// chain. Commands that price items require it.
    pub catalog_path: Option<PathBuf>,
}

impl MolarConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config
    /// file > default.
    ///
    /// - DB URL: `cli_db_url` > `MOLAR_DATABASE_URL` env >
    ///   `config_file.database.url` > `DbConfig::DEFAULT_URL`
    /// - Catalog: `cli_catalog` > `MOLAR_CATALOG` env >
    ///   `config_file.catalog.path` > none
    pub fn resolve(cli_db_url: Option<&str>, cli_catalog: Option<&str>) -> Result<Self> {
        let file_config = load_config().ok();

        // DB URL resolution.
        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var("MOLAR_DATABASE_URL") {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };
        let db_config = DbConfig::new(db_url);

        // Catalog path resolution.
        let catalog_path = if let Some(path) = cli_catalog {
            Some(PathBuf::from(path))
        } else if let Ok(path) = std::env::var("MOLAR_CATALOG") {
            Some(PathBuf::from(path))
        } else {
            file_config
                .as_ref()
                .and_then(|cfg| cfg.catalog.as_ref())
                .map(|section| PathBuf::from(&section.path))
        };

        Ok(Self {
            db_config,
            catalog_path,
        })
    }

    /// The catalog path, or an actionable error for commands that need one.
    pub fn require_catalog(&self) -> Result<&PathBuf> {
        match self.catalog_path {
            Some(ref path) => Ok(path),
            None => bail!(
                "no service catalog configured; pass --catalog, set MOLAR_CATALOG, \
                 or add a [catalog] section to the config file"
            ),
        }
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
