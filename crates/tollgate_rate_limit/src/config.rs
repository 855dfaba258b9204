//! Configuration structures for admission limits.
//!
//! This module provides TOML-based configuration for per-model quotas. The
//! configuration system supports:
//! - Bundled defaults (include_str! from tollgate.toml)
//! - User overrides (./tollgate.toml or ~/.config/tollgate/tollgate.toml)
//! - Automatic merging with user values taking precedence
//!
//! Limits cascade: a model entry overrides its upstream's `defaults`, which
//! override the gateway-wide `defaults`.

use std::collections::{BTreeMap, BTreeSet};

use chrono_tz::Tz;
use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};
use tollgate_error::{ConfigError, TollgateResult};
use tracing::{debug, instrument};

use crate::MAX_CONCURRENCY;

/// Quota settings for one model.
///
/// All fields are optional. A missing or non-positive value means
/// "unlimited" for that dimension.
///
/// # Example
///
/// ```toml
/// [upstreams.openai.models."gpt-4o-mini"]
/// rpm = 500
/// tpm = 200_000
/// rpd = 10_000
/// max_concurrency = 8
/// timezone = "America/Los_Angeles"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub struct ModelLimits {
    /// Requests per minute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm: Option<i64>,

    /// Tokens per minute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpm: Option<i64>,

    /// Requests per day
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpd: Option<i64>,

    /// Tokens per day
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpd: Option<i64>,

    /// Maximum concurrent requests to this model on this upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<i64>,

    /// IANA timezone whose midnight resets the daily quotas (default UTC)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl ModelLimits {
    /// Fill every unset field of `self` from `defaults`.
    pub fn merged_over(&self, defaults: &ModelLimits) -> ModelLimits {
        ModelLimits {
            rpm: self.rpm.or(defaults.rpm),
            tpm: self.tpm.or(defaults.tpm),
            rpd: self.rpd.or(defaults.rpd),
            tpd: self.tpd.or(defaults.tpd),
            max_concurrency: self.max_concurrency.or(defaults.max_concurrency),
            timezone: self.timezone.clone().or_else(|| defaults.timezone.clone()),
        }
    }

    /// Timezone for daily resets.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured name is not a known IANA timezone.
    pub fn location(&self) -> Result<Tz, ConfigError> {
        match &self.timezone {
            None => Ok(chrono_tz::UTC),
            Some(name) => name
                .parse::<Tz>()
                .map_err(|e| ConfigError::new(format!("Unknown timezone '{}': {}", name, e))),
        }
    }
}

/// Configuration for one upstream provider connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub struct UpstreamConfig {
    /// Maximum concurrent requests across every model of this upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<i64>,

    /// Limits applied to every model of this upstream unless overridden
    #[serde(default)]
    pub defaults: ModelLimits,

    /// Models served by this upstream, keyed by model name
    #[serde(default)]
    pub models: BTreeMap<String, ModelLimits>,
}

fn check_concurrency(max_concurrency: Option<i64>) -> Result<(), ConfigError> {
    match max_concurrency {
        Some(n) if usize::try_from(n).is_ok_and(|n| n > MAX_CONCURRENCY) => Err(ConfigError::new(
            format!("max_concurrency {} exceeds {}", n, MAX_CONCURRENCY),
        )),
        _ => Ok(()),
    }
}

/// Top-level gateway configuration.
///
/// Loads limits from TOML files with a precedence system:
/// 1. Bundled defaults (include_str! from tollgate.toml)
/// 2. User override (./tollgate.toml or ~/.config/tollgate/tollgate.toml)
///
/// # Example
///
/// ```no_run
/// use tollgate_rate_limit::GatewayConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = GatewayConfig::load()?;
///
/// if let Some(limits) = config.limits_for("openai", "gpt-4o-mini") {
///     println!("RPM: {:?}", limits.rpm);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub struct GatewayConfig {
    /// Limits applied to every model unless overridden
    #[serde(default)]
    pub defaults: ModelLimits,

    /// Map of upstream name to upstream configuration
    #[serde(default)]
    pub upstreams: BTreeMap<String, UpstreamConfig>,
}

impl GatewayConfig {
    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> TollgateResult<Self> {
        debug!("Loading configuration from file");

        let config: Self = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .map_err(|e| {
                ConfigError::new(format!(
                    "Failed to read configuration from {}: {}",
                    path.as_ref().display(),
                    e
                ))
            })?
            .try_deserialize()
            .map_err(|e| ConfigError::new(format!("Failed to parse configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration with precedence: user override > bundled default.
    ///
    /// Configuration sources in order of precedence (later sources override earlier):
    /// 1. Bundled defaults (tollgate.toml shipped with the library)
    /// 2. User config in home directory (~/.config/tollgate/tollgate.toml)
    /// 3. User config in current directory (./tollgate.toml)
    ///
    /// User config files are optional and will be silently skipped if not found.
    #[instrument]
    pub fn load() -> TollgateResult<Self> {
        debug!("Loading configuration with precedence: current dir > home dir > bundled defaults");

        // Bundled default configuration
        const DEFAULT_CONFIG: &str = include_str!("../../../tollgate.toml");

        let mut builder = Config::builder()
            // Start with bundled defaults
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        // Add user config from home directory (optional)
        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/tollgate/tollgate.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        // Add user config from current directory (optional, highest precedence)
        builder = builder.add_source(File::with_name("tollgate").required(false));

        let config: Self = builder
            .build()
            .map_err(|e| ConfigError::new(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| ConfigError::new(format!("Failed to parse configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Check settings that can only be verified after parsing.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first upstream/model with an unknown
    /// timezone or a concurrency cap above [`MAX_CONCURRENCY`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.defaults.location()?;
        for (upstream, upstream_config) in &self.upstreams {
            check_concurrency(upstream_config.max_concurrency)
                .map_err(|e| ConfigError::new(format!("{}: {}", upstream, e.message)))?;
            for model in upstream_config.models.keys() {
                if let Some(limits) = self.limits_for(upstream, model) {
                    limits
                        .location()
                        .and_then(|_| check_concurrency(limits.max_concurrency))
                        .map_err(|e| {
                            ConfigError::new(format!("{}/{}: {}", upstream, model, e.message))
                        })?;
                }
            }
        }
        Ok(())
    }

    /// Effective limits of `model` on `upstream`, with defaults applied.
    ///
    /// Returns `None` if the upstream does not serve the model.
    #[instrument(skip(self))]
    pub fn limits_for(&self, upstream: &str, model: &str) -> Option<ModelLimits> {
        let upstream_config = self.upstreams.get(upstream)?;
        let model_limits = upstream_config.models.get(model)?;

        debug!(upstream, model, "Resolving model limits");

        Some(
            model_limits
                .merged_over(&upstream_config.defaults)
                .merged_over(&self.defaults),
        )
    }

    /// Every model name served by at least one upstream.
    pub fn models(&self) -> BTreeSet<&str> {
        self.upstreams
            .values()
            .flat_map(|upstream| upstream.models.keys().map(String::as_str))
            .collect()
    }

    /// Upstreams serving `model`, in name order.
    pub fn upstreams_for<'a>(&'a self, model: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.upstreams
            .iter()
            .filter(move |(_, upstream)| upstream.models.contains_key(model))
            .map(|(name, _)| name.as_str())
    }
}
