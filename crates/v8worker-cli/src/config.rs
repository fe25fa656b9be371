//! CLI configuration with multi-source merging.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use v8worker::{PrintTarget, WorkerConfig};

/// Config file picked up from the working directory when `--config` is
/// not given.
pub const DEFAULT_CONFIG_FILE: &str = "v8worker.toml";

/// Prefix for environment overrides, e.g. `V8WORKER_EXECUTION_TIMEOUT_MS`.
pub const ENV_PREFIX: &str = "V8WORKER_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub worker: WorkerConfig,
    /// Canned `$sendSync` answers keyed by request text.
    pub replies: BTreeMap<String, String>,
}

/// Worker settings given on the command line. Unset fields leave the
/// lower-priority sources alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlagOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_heap_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print: Option<PrintTarget>,
}

/// Load configuration from all sources.
///
/// Priority (highest to lowest):
/// 1. Command-line flags
/// 2. `V8WORKER_*` environment variables
/// 3. The file given with `--config`, else `./v8worker.toml` if present
/// 4. Default values
pub fn load(config_path: Option<&Path>, flags: &FlagOverrides) -> Result<CliConfig> {
    let file = match config_path {
        Some(path) if !path.exists() => bail!("config file {} does not exist", path.display()),
        Some(path) => Some(path.to_path_buf()),
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
    };

    let mut figment = Figment::new().merge(Serialized::defaults(CliConfig::default()));

    if let Some(file) = &file {
        tracing::debug!("Loading config from {}", file.display());
        figment = figment.merge(Toml::file(file));
    }

    let config: CliConfig = figment
        .merge(
            Env::prefixed(ENV_PREFIX)
                .ignore(&["replies"])
                .map(|key| format!("worker.{}", key).into()),
        )
        .merge(Serialized::default("worker", flags))
        .extract()
        .context("invalid configuration")?;

    config.worker.validate()?;
    Ok(config)
}
