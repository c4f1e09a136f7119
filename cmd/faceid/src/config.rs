//! Service configuration.
//!
//! Loaded from YAML (`--config`, or `~/.faceid/config.yaml` when present),
//! then overridden by environment variables and command-line flags.
//!
//! ```yaml
//! listen: ":8080"
//! data_path: /var/lib/faceid/faces.redb
//! threshold: 0.6
//! cache_max_age_secs: 30
//! api_key: secret
//! extractor:
//!   url: http://127.0.0.1:9000/extract
//!   timeout_secs: 10
//! event_log_capacity: 100
//! static_dir: ./frontend/dist
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use faceid_recognizer::{CacheConfig, DEFAULT_EVENT_CAPACITY};
use faceid_store::DescriptorStore;
use faceid_store::kv::{KVError, RedbBackend};
use serde::{Deserialize, Serialize};

/// Default base configuration directory name, under the home directory.
pub const DEFAULT_BASE_DIR: &str = ".faceid";
/// Default configuration filename.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable overriding `api_key`.
pub const API_KEY_ENV: &str = "FACEID_API_KEY";

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address; ":8080" means all interfaces.
    pub listen: String,

    /// redb database file. In-memory store when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_path: Option<PathBuf>,

    /// Maximum Euclidean distance for a match.
    pub threshold: f32,

    /// Rebuild the cached matcher after this many seconds (0 = only on
    /// local writes). The redb file at `data_path` is locked by one process,
    /// so with the bundled backends every write is local and this only
    /// forces periodic rebuilds.
    pub cache_max_age_secs: u64,

    /// Required `X-API-Key` value for the API. Open when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Remote face-embedding service for image payloads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extractor: Option<ExtractorConfig>,

    /// Number of recognition events kept for `/api/events`.
    pub event_log_capacity: usize,

    /// Directory of static UI files served at `/`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
}

/// Remote extractor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_extractor_timeout")]
    pub timeout_secs: u64,
}

fn default_extractor_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: ":8080".to_string(),
            data_path: None,
            threshold: faceid_recognizer::CacheConfig::default().threshold,
            cache_max_age_secs: 0,
            api_key: None,
            extractor: None,
            event_log_capacity: DEFAULT_EVENT_CAPACITY,
            static_dir: None,
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// used if present, otherwise built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path().filter(|p| p.exists()),
        };
        let mut cfg = match path {
            Some(p) => {
                let data = std::fs::read_to_string(&p)
                    .with_context(|| format!("read config {}", p.display()))?;
                Self::from_yaml(&data)
                    .with_context(|| format!("parse config {}", p.display()))?
            }
            None => Self::default(),
        };
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(data)?)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                self.api_key = Some(key);
            }
        }
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            bail!(
                "threshold must be a non-negative number, got {}",
                self.threshold
            );
        }
        if let Some(ex) = &self.extractor {
            if ex.url.trim().is_empty() {
                bail!("extractor.url is empty");
            }
        }
        if self.api_key.as_deref().is_some_and(str::is_empty) {
            bail!("api_key is set but empty");
        }
        parse_addr(&self.listen)?;
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            threshold: self.threshold,
            max_age: (self.cache_max_age_secs > 0)
                .then(|| Duration::from_secs(self.cache_max_age_secs)),
        }
    }

    /// Open the descriptor store named by `data_path`.
    ///
    /// A redb file can only be open in one process, so this fails while a
    /// server is running on the same `data_path`.
    pub fn open_store(&self) -> Result<DescriptorStore> {
        match &self.data_path {
            Some(path) => {
                if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                    std::fs::create_dir_all(dir)
                        .with_context(|| format!("create {}", dir.display()))?;
                }
                let backend = RedbBackend::open(path).map_err(|e| match e {
                    KVError::Locked(_) => anyhow!(
                        "store {} is in use by another faceid process",
                        path.display()
                    ),
                    e => anyhow::Error::new(e)
                        .context(format!("open store {}", path.display())),
                })?;
                Ok(DescriptorStore::open(Box::new(backend))?)
            }
            None => Ok(DescriptorStore::in_memory()),
        }
    }
}

/// `~/.faceid/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir()
        .map(|h| h.join(DEFAULT_BASE_DIR).join(DEFAULT_CONFIG_FILE))
}

/// Parse a listen address. A leading ':' means all interfaces.
pub fn parse_addr(addr: &str) -> Result<SocketAddr> {
    let addr = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };
    addr.parse()
        .with_context(|| format!("invalid listen address {addr:?}"))
}
