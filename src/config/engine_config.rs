use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::artifact_types::{AcquisitionMethod, ArtifactKind, MethodKind};
use crate::constants::{
    DEFAULT_BACKUP_TIMEOUT_SECS, DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_DEVICE_RETRY_DELAY_MS,
    DEFAULT_EVIDENCE_ROOT,
};

/// What to acquire for one artifact kind and how
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AcquisitionTarget {
    pub kind: ArtifactKind,
    /// Device paths tried in order by [`AcquisitionMethod::DirectCopy`]
    #[serde(default)]
    pub sources: Vec<String>,
    /// Permitted methods, highest priority first
    pub methods: Vec<AcquisitionMethod>,
}

impl AcquisitionTarget {
    /// Method order for one run.
    ///
    /// With elevated access a direct copy is always tried first; otherwise
    /// the configured order is kept unchanged.
    pub fn method_order(&self, elevated: bool) -> Vec<&AcquisitionMethod> {
        let mut order: Vec<&AcquisitionMethod> = self.methods.iter().collect();
        if elevated {
            if let Some(pos) = order.iter().position(|m| m.kind() == MethodKind::DirectCopy) {
                let direct = order.remove(pos);
                order.insert(0, direct);
            }
        }
        order
    }

    fn validate(&self) -> Result<()> {
        if self.methods.is_empty() {
            bail!("target {} has no acquisition methods", self.kind);
        }
        for method in &self.methods {
            match method {
                AcquisitionMethod::DirectCopy if self.sources.is_empty() => {
                    bail!("target {} uses DirectCopy without source locations", self.kind)
                }
                AcquisitionMethod::Backup { package, entries, fallback_suffixes }
                    if package.is_empty() || (entries.is_empty() && fallback_suffixes.is_empty()) =>
                {
                    bail!("target {} has an incomplete Backup method", self.kind)
                }
                AcquisitionMethod::ContentQuery { uri } if !uri.starts_with("content://") => {
                    bail!("target {} has an invalid content uri '{}'", self.kind, uri)
                }
                AcquisitionMethod::SystemDump { service } if service.trim().is_empty() => {
                    bail!("target {} has an empty SystemDump service", self.kind)
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    pub version: String,
    pub description: String,
    /// Directory under which one directory per case is created
    #[serde(default = "default_evidence_root")]
    pub evidence_root: PathBuf,
    /// Upper bound on waiting for the on-device backup confirmation
    #[serde(default = "default_backup_timeout")]
    pub backup_timeout_secs: u64,
    /// Timeout for ordinary device commands
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Pause before the single automatic device re-check
    #[serde(default = "default_retry_delay")]
    pub device_retry_delay_ms: u64,
    pub targets: Vec<AcquisitionTarget>,
}

fn default_evidence_root() -> PathBuf {
    PathBuf::from(DEFAULT_EVIDENCE_ROOT)
}

fn default_backup_timeout() -> u64 {
    DEFAULT_BACKUP_TIMEOUT_SECS
}

fn default_command_timeout() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}

fn default_retry_delay() -> u64 {
    DEFAULT_DEVICE_RETRY_DELAY_MS
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            version: "1.0".to_string(),
            description: "Default Android evidence acquisition configuration".to_string(),
            evidence_root: default_evidence_root(),
            backup_timeout_secs: DEFAULT_BACKUP_TIMEOUT_SECS,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            device_retry_delay_ms: DEFAULT_DEVICE_RETRY_DELAY_MS,
            targets: Self::default_targets(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: EngineConfig = serde_yaml::from_str(&content)
            .context("Failed to parse YAML config")?;
        config.validate()?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_yaml_file(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)
            .context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .context(format!("Failed to write config to {}", path.display()))?;

        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Reject configurations the selector cannot execute
    pub fn validate(&self) -> Result<()> {
        if self.backup_timeout_secs == 0 {
            bail!("backup_timeout_secs must be greater than zero");
        }
        let mut seen = Vec::new();
        for target in &self.targets {
            if seen.contains(&target.kind) {
                bail!("target {} is configured more than once", target.kind);
            }
            seen.push(target.kind);
            target.validate()?;
        }
        Ok(())
    }

    pub fn backup_timeout(&self) -> Duration {
        Duration::from_secs(self.backup_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn device_retry_delay(&self) -> Duration {
        Duration::from_millis(self.device_retry_delay_ms)
    }

    pub fn target(&self, kind: ArtifactKind) -> Option<&AcquisitionTarget> {
        self.targets.iter().find(|t| t.kind == kind)
    }

    /// Create a default configuration YAML file
    pub fn create_default_config_file(path: &Path) -> Result<()> {
        EngineConfig::default().save_to_yaml_file(path)
    }
}

/// Load a configuration file or create a default one.
///
/// * An existing file at `config_path` is loaded and validated.
/// * A missing file at `config_path` is created from the defaults.
/// * Without a path the built-in defaults are used.
pub fn load_or_create_config(config_path: Option<&Path>) -> Result<EngineConfig> {
    match config_path {
        Some(path) if path.exists() => EngineConfig::from_yaml_file(path),
        Some(path) => {
            info!("Creating default config at {}", path.display());
            let config = EngineConfig::default();
            config.save_to_yaml_file(path)?;
            Ok(config)
        }
        None => {
            info!("No config path provided, using default configuration");
            Ok(EngineConfig::default())
        }
    }
}
