use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use vigil_audit::RetryPolicy;
use vigil_grid::SessionOptions;

use crate::error::{RootError, RootResult};

/// Upper bound on fail-open retries. More than this just stalls the view.
pub const MAX_FAIL_OPEN_RETRIES: u32 = 5;

/// Where audit events go.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditSinkConfig {
    /// In-memory hash chain. Lost on exit.
    #[default]
    Memory,
    /// Append-only JSON-lines file.
    Jsonl { path: PathBuf },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditConfig {
    /// Extra attempts for a navigational event before it is dropped.
    #[serde(default = "default_fail_open_retries")]
    pub fail_open_retries: u32,

    #[serde(default)]
    pub sink: AuditSinkConfig,
}

fn default_fail_open_retries() -> u32 {
    1
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            fail_open_retries: default_fail_open_retries(),
            sink: AuditSinkConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MaskingConfig {
    /// Seconds without interaction before a revealed column is masked again.
    /// Absent disables auto-hide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportConfig {
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

fn default_max_records() -> usize {
    vigil_grid::DEFAULT_MAX_EXPORT_RECORDS
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
}

fn default_page_size() -> usize {
    vigil_grid::DEFAULT_PAGE_SIZE
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
        }
    }
}

/// Top-level configuration for Vigil.
///
/// Loaded from a TOML file (typically `~/.vigil/config.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RootConfig {
    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub masking: MaskingConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub query: QueryConfig,
}

/// Returns `$HOME/<suffix>` if HOME is available, otherwise `./<suffix>`.
fn dirs_or_default(suffix: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(suffix))
        .unwrap_or_else(|_| PathBuf::from(suffix))
}

impl RootConfig {
    /// Load configuration from a TOML file. If the file does not exist,
    /// returns a default configuration.
    pub fn load(path: &Path) -> RootResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(RootError::Io)?;
        let config: RootConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> RootResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RootError::Config(format!("TOML serialize error: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(RootError::Io)?;
        }
        std::fs::write(path, contents).map_err(RootError::Io)?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> RootResult<()> {
        if self.audit.fail_open_retries > MAX_FAIL_OPEN_RETRIES {
            return Err(RootError::Config(format!(
                "fail_open_retries must be at most {}, got {}",
                MAX_FAIL_OPEN_RETRIES, self.audit.fail_open_retries
            )));
        }
        if self.masking.idle_timeout_secs == Some(0) {
            return Err(RootError::Config(
                "idle_timeout_secs must be > 0 when set".into(),
            ));
        }
        if self.export.max_records == 0 {
            return Err(RootError::Config("max_records must be > 0".into()));
        }
        if self.query.default_page_size == 0 {
            return Err(RootError::Config("default_page_size must be > 0".into()));
        }
        Ok(())
    }

    /// Return the path to the default config file location.
    pub fn default_config_path() -> PathBuf {
        dirs_or_default(".vigil/config.toml")
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            fail_open_retries: self.audit.fail_open_retries,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            idle_timeout: self.masking.idle_timeout_secs.map(Duration::from_secs),
            max_export_records: self.export.max_records,
        }
    }
}
