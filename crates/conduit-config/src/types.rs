//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [database]               # connector/definition store
//! [catalog]                # connector definition catalog files
//! [identity]               # caller identity resolution
//! [pipeline]               # embedded workflow engine
//! [logging]                # log output
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConduitConfig {
    /// Connector database configuration.
    pub database: Option<DatabaseConfig>,

    /// Definition catalog configuration.
    pub catalog: Option<CatalogConfig>,

    /// Caller identity configuration.
    pub identity: Option<IdentityConfig>,

    /// Workflow engine configuration.
    pub pipeline: Option<PipelineSection>,

    /// Log output configuration.
    pub logging: Option<LoggingConfig>,
}

impl ConduitConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Merging is per section: a section present in `other` replaces the
    /// whole section in `self`.
    pub fn merge(&mut self, other: ConduitConfig) {
        if other.database.is_some() {
            self.database = other.database;
        }

        if other.catalog.is_some() {
            self.catalog = other.catalog;
        }

        if other.identity.is_some() {
            self.identity = other.identity;
        }

        if other.pipeline.is_some() {
            self.pipeline = other.pipeline;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let identity = self.identity_or_default();
        if identity.lookup_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "identity.lookup_timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if identity.backend == IdentityBackend::Http && identity.url.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "identity.url".to_string(),
                message: "required when identity.backend = \"http\"".to_string(),
            });
        }
        for user in &identity.users {
            if user.uid.is_empty() || user.id.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "identity.users".to_string(),
                    message: "every user needs a uid and an id".to_string(),
                });
            }
        }

        let pipeline = self.pipeline_or_default();
        if pipeline.task_queue.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.task_queue".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Identity section, or its defaults when absent.
    pub fn identity_or_default(&self) -> IdentityConfig {
        self.identity.clone().unwrap_or_default()
    }

    /// Pipeline section, or its defaults when absent.
    pub fn pipeline_or_default(&self) -> PipelineSection {
        self.pipeline.clone().unwrap_or_default()
    }

    /// Logging section, or its defaults when absent.
    pub fn logging_or_default(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Effective connector database path.
    ///
    /// Relative paths are resolved from `data_dir`.
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        let configured = self.database.as_ref().and_then(|d| d.path.clone());
        resolve_path(data_dir, configured, DEFAULT_DATABASE_FILE)
    }

    /// Effective workflow engine database path.
    pub fn pipeline_database_path(&self, data_dir: &Path) -> PathBuf {
        let configured = self.pipeline.as_ref().and_then(|p| p.database.clone());
        resolve_path(data_dir, configured, DEFAULT_PIPELINE_DATABASE_FILE)
    }

    /// Effective catalog directory.
    pub fn catalog_dir(&self, data_dir: &Path) -> PathBuf {
        let configured = self.catalog.as_ref().and_then(|c| c.dir.clone());
        resolve_path(data_dir, configured, DEFAULT_CATALOG_DIR)
    }
}

const DEFAULT_DATABASE_FILE: &str = "conduit.db";
const DEFAULT_PIPELINE_DATABASE_FILE: &str = "pipeline.db";
const DEFAULT_CATALOG_DIR: &str = "catalog";

fn resolve_path(base: &Path, configured: Option<PathBuf>, default: &str) -> PathBuf {
    match configured {
        Some(p) if p.is_absolute() => p,
        Some(p) => base.join(p),
        None => base.join(default),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Database
// ─────────────────────────────────────────────────────────────────────────────

/// Connector database configuration.
///
/// ```toml
/// [database]
/// path = "conduit.db"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database.
    /// Relative paths are resolved from the data directory.
    pub path: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

/// Connector definition catalog configuration.
///
/// The directory holds one TOML file per connector family:
/// `destination.toml`, `source.toml`, `blockchain.toml`, `ai.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Catalog directory. Relative paths are resolved from the data directory.
    pub dir: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Where owner identities are looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityBackend {
    /// Users listed in `[[identity.users]]`.
    #[default]
    Static,
    /// Remote management backend reached over HTTP.
    Http,
}

/// Caller identity configuration.
///
/// ```toml
/// [identity]
/// lookup_timeout_secs = 5
/// default_owner_id = "local-user"
/// backend = "static"
///
/// [[identity.users]]
/// uid = "9f0c6a2e-5b1d-4b8e-a1c4-2d7f3e6b9a10"
/// id = "local-user"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Deadline for a single owner lookup.
    pub lookup_timeout_secs: u64,
    /// Owner ID attached to requests that carry none.
    /// An empty string disables the default.
    pub default_owner_id: String,
    /// Lookup backend.
    pub backend: IdentityBackend,
    /// Base URL of the management backend (`http` backend only).
    pub url: Option<String>,
    /// Known users (`static` backend only).
    pub users: Vec<StaticUser>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_secs: 5,
            default_owner_id: "local-user".to_string(),
            backend: IdentityBackend::Static,
            url: None,
            users: Vec::new(),
        }
    }
}

impl IdentityConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }
}

/// A user entry for the static identity backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticUser {
    pub uid: String,
    pub id: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline
// ─────────────────────────────────────────────────────────────────────────────

/// Workflow engine configuration.
///
/// ```toml
/// [pipeline]
/// enabled = true
/// database = "pipeline.db"
/// task_queue = "connector-backend"
/// max_concurrent_tasks = 4
/// task_timeout_secs = 300
/// pipeline_timeout_secs = 600
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Whether the workflow engine is enabled.
    pub enabled: bool,
    /// Path to the SQLite database for workflow state.
    /// Relative paths are resolved from the data directory.
    pub database: Option<PathBuf>,
    /// Task queue that workflows are submitted to.
    pub task_queue: String,
    /// Maximum concurrent task executions.
    pub max_concurrent_tasks: usize,
    /// Per-task timeout in seconds.
    pub task_timeout_secs: u64,
    /// Per-workflow timeout in seconds.
    pub pipeline_timeout_secs: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            enabled: true,
            database: None,
            task_queue: "connector-backend".to_string(),
            max_concurrent_tasks: 4,
            task_timeout_secs: 300,
            pipeline_timeout_secs: 600,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Log output configuration.
///
/// ```toml
/// [logging]
/// level = "info"
/// json_file = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default console filter when `RUST_LOG` is unset.
    pub level: String,
    /// Write JSON logs to a daily rolling file under `<config_dir>/logs`.
    pub json_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_file: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
