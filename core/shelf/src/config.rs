//! Configuration for kshelf.
//!
//! Values are resolved in three layers, later layers winning:
//!
//! 1. built-in defaults,
//! 2. the optional `<home>/config.toml`,
//! 3. environment variables (`KSHELF_REGISTRY`, `KSHELF_REPOSITORY`).
//!
//! The data directory itself comes from `KSHELF_HOME` or, when unset, from
//! the platform home directory.
//!
//! ## Directory Structure
//!
//! ```text
//! ~/.kshelf/                  # Root directory (or KSHELF_HOME)
//!   config.toml               # Optional overrides
//!   releases.json             # Last known release list
//!   chosen.json               # Chosen release (`null` when none)
//!   compilers/                # One <version>-<timestamp>.jar per release
//!   kshelf.log                # Log file used while the TUI is running
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{ShelfError, ShelfResult};

/// Environment variable overriding the data directory.
pub const HOME_ENV: &str = "KSHELF_HOME";

/// Environment variable overriding the registry base URL.
pub const REGISTRY_ENV: &str = "KSHELF_REGISTRY";

/// Environment variable overriding the artifact repository base URL.
pub const REPOSITORY_ENV: &str = "KSHELF_REPOSITORY";

const DEFAULT_REGISTRY: &str = "https://search.maven.org";
const DEFAULT_REPOSITORY: &str = "https://repo1.maven.org/maven2";
const DEFAULT_GROUP_ID: &str = "org.jetbrains.kotlin";
const DEFAULT_ARTIFACT_ID: &str = "kotlin-compiler";
const DEFAULT_ROWS: u32 = 200;
const DEFAULT_VERIFY_CONCURRENCY: usize = 8;
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const DEFAULT_REGISTRY_TIMEOUT_SECS: u64 = 30;

const CONFIG_FILE: &str = "config.toml";
const SNAPSHOT_FILE: &str = "releases.json";
const CHOSEN_FILE: &str = "chosen.json";
const COMPILERS_DIR: &str = "compilers";
const LOG_FILE: &str = "kshelf.log";

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShelfConfig {
    /// Data directory holding records and artifacts.
    pub home: PathBuf,
    /// Base URL of the release search index.
    pub registry_url: String,
    /// Base URL of the artifact repository.
    pub repository_url: String,
    pub group_id: String,
    pub artifact_id: String,
    /// Maximum number of releases requested from the registry.
    pub rows: u32,
    /// Upper bound on concurrent existence checks during reconciliation.
    pub verify_concurrency: usize,
    pub download_timeout: Duration,
    pub registry_timeout: Duration,
}

/// On-disk shape of `config.toml`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    registry_url: Option<String>,
    repository_url: Option<String>,
    group_id: Option<String>,
    artifact_id: Option<String>,
    rows: Option<u32>,
    verify_concurrency: Option<usize>,
    download_timeout_secs: Option<u64>,
    registry_timeout_secs: Option<u64>,
}

impl ShelfConfig {
    /// Built-in defaults rooted at `home`.
    #[must_use]
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            registry_url: DEFAULT_REGISTRY.to_string(),
            repository_url: DEFAULT_REPOSITORY.to_string(),
            group_id: DEFAULT_GROUP_ID.to_string(),
            artifact_id: DEFAULT_ARTIFACT_ID.to_string(),
            rows: DEFAULT_ROWS,
            verify_concurrency: DEFAULT_VERIFY_CONCURRENCY,
            download_timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            registry_timeout: Duration::from_secs(DEFAULT_REGISTRY_TIMEOUT_SECS),
        }
    }

    /// Resolves the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined or the
    /// config file is unreadable or invalid.
    pub fn load() -> ShelfResult<Self> {
        let home = resolve_home()?;
        Self::load_from(home, |name| std::env::var(name).ok())
    }

    /// Resolves the configuration for `home`, reading overrides through
    /// `lookup` instead of the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is unreadable or invalid.
    pub fn load_from(
        home: impl Into<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ShelfResult<Self> {
        let mut config = Self::with_home(home);
        let path = config.config_path();
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let file: ConfigFile = toml::from_str(&content)
                    .map_err(|e| ShelfError::config(&path, e.to_string()))?;
                config.apply_file(file);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ShelfError::config(&path, e.to_string())),
        }
        config.apply_env(lookup);
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(url) = file.registry_url {
            self.registry_url = url;
        }
        if let Some(url) = file.repository_url {
            self.repository_url = url;
        }
        if let Some(group) = file.group_id {
            self.group_id = group;
        }
        if let Some(artifact) = file.artifact_id {
            self.artifact_id = artifact;
        }
        if let Some(rows) = file.rows {
            self.rows = rows;
        }
        if let Some(limit) = file.verify_concurrency {
            self.verify_concurrency = limit;
        }
        if let Some(secs) = file.download_timeout_secs {
            self.download_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.registry_timeout_secs {
            self.registry_timeout = Duration::from_secs(secs);
        }
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = non_blank(lookup(REGISTRY_ENV)) {
            self.registry_url = url;
        }
        if let Some(url) = non_blank(lookup(REPOSITORY_ENV)) {
            self.repository_url = url;
        }
    }

    fn validate(&self) -> ShelfResult<()> {
        let path = self.config_path();
        if self.rows == 0 {
            return Err(ShelfError::config(path, "rows must be at least 1"));
        }
        if self.verify_concurrency == 0 {
            return Err(ShelfError::config(
                path,
                "verify_concurrency must be at least 1",
            ));
        }
        if self.group_id.trim().is_empty() || self.artifact_id.trim().is_empty() {
            return Err(ShelfError::config(
                path,
                "group_id and artifact_id must not be empty",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.home.join(CONFIG_FILE)
    }

    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.home.join(SNAPSHOT_FILE)
    }

    #[must_use]
    pub fn chosen_path(&self) -> PathBuf {
        self.home.join(CHOSEN_FILE)
    }

    #[must_use]
    pub fn compilers_dir(&self) -> PathBuf {
        self.home.join(COMPILERS_DIR)
    }

    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.home.join(LOG_FILE)
    }

    /// Registry URL without a trailing slash.
    #[must_use]
    pub fn registry_base(&self) -> &str {
        trim_base(&self.registry_url)
    }

    /// Repository URL without a trailing slash.
    #[must_use]
    pub fn repository_base(&self) -> &str {
        trim_base(&self.repository_url)
    }
}

/// Returns the data directory: `KSHELF_HOME` if set, the platform default
/// otherwise.
///
/// # Errors
///
/// Returns an error if no home directory can be determined.
pub fn resolve_home() -> ShelfResult<PathBuf> {
    if let Some(home) = non_blank(std::env::var(HOME_ENV).ok()) {
        return Ok(PathBuf::from(home));
    }
    default_home()
}

fn default_home() -> ShelfResult<PathBuf> {
    #[cfg(windows)]
    {
        dirs::data_dir()
            .map(|dir| dir.join("kshelf"))
            .ok_or_else(|| ShelfError::config(Path::new("%APPDATA%"), "cannot determine AppData directory"))
    }
    #[cfg(not(windows))]
    {
        dirs::home_dir()
            .map(|dir| dir.join(".kshelf"))
            .ok_or_else(|| ShelfError::config(Path::new("~"), "cannot determine home directory"))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn trim_base(url: &str) -> &str {
    url.trim().trim_end_matches('/')
}
