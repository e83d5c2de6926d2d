#![forbid(unsafe_code)]

//! Registry configuration.
//!
//! The reference-lifetime policy is chosen per registry rather than at
//! build time, so strong and weak registries can coexist in one process.
//!
//! Configuration comes from, in increasing precedence:
//!
//! 1. [`RegistryConfig::default`]
//! 2. A TOML file (`config-file` feature): [`RegistryConfig::load`]
//! 3. Environment overrides: [`RegistryConfig::apply_env_overrides`]
//!
//! ```toml
//! reference_mode = "strong"
//! rebind_policy = "replace"
//! strict_unbind = true
//! initial_sync = true
//! max_propagation_steps = 256
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Selects `reference_mode` from the environment: `strong` or `weak`.
pub const ENV_REFERENCE_MODE: &str = "KVBIND_REFERENCE_MODE";
/// Selects `strict_unbind` from the environment: `1`/`true` or `0`/`false`.
pub const ENV_STRICT_UNBIND: &str = "KVBIND_STRICT_UNBIND";

const DEFAULT_MAX_PROPAGATION_STEPS: usize = 1024;

/// How a binding holds on to the object it observes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReferenceMode {
    /// The binding retains its target. Destroying the target only marks it
    /// released; it stays alive until every binding on it is unbound.
    #[cfg_attr(feature = "serde", serde(rename = "strong", alias = "strong_reference"))]
    StrongReference,
    /// The binding does not retain either endpoint. Destroying either one
    /// invalidates the binding immediately.
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "weak", alias = "weak_reference"))]
    WeakReference,
}

impl fmt::Display for ReferenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StrongReference => "strong",
            Self::WeakReference => "weak",
        })
    }
}

impl FromStr for ReferenceMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strong" | "strong_reference" | "strongreference" => Ok(Self::StrongReference),
            "weak" | "weak_reference" | "weakreference" => Ok(Self::WeakReference),
            _ => Err(ConfigError::InvalidValue {
                field: "reference_mode",
                value: s.to_owned(),
            }),
        }
    }
}

/// What `bind` does when the identical (receiver, property, target,
/// key path) tuple is already bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum RebindPolicy {
    /// Keep the existing registration and return its id. The bound
    /// property is re-synced; no duplicate subscription is created.
    #[default]
    KeepExisting,
    /// Tear down the existing registration and install the new one
    /// (with its transform) under a fresh id.
    Replace,
}

/// Errors from loading or overriding configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    #[error("invalid value {value:?} for {field}")]
    InvalidValue { field: &'static str, value: String },
}

/// Per-registry configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct RegistryConfig {
    pub reference_mode: ReferenceMode,
    pub rebind_policy: RebindPolicy,
    /// Report `NoSuchBinding` from `unbind` instead of ignoring it.
    pub strict_unbind: bool,
    /// Write the current key-path value into the property on `bind`.
    pub initial_sync: bool,
    /// Upper bound on propagated writes per top-level mutation.
    pub max_propagation_steps: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            reference_mode: ReferenceMode::default(),
            rebind_policy: RebindPolicy::default(),
            strict_unbind: false,
            initial_sync: true,
            max_propagation_steps: DEFAULT_MAX_PROPAGATION_STEPS,
        }
    }
}

impl RegistryConfig {
    /// Defaults with strong-reference bindings.
    #[must_use]
    pub fn strong() -> Self {
        Self::default().with_reference_mode(ReferenceMode::StrongReference)
    }

    /// Defaults with weak-reference bindings.
    #[must_use]
    pub fn weak() -> Self {
        Self::default().with_reference_mode(ReferenceMode::WeakReference)
    }

    #[must_use]
    pub fn with_reference_mode(mut self, mode: ReferenceMode) -> Self {
        self.reference_mode = mode;
        self
    }

    #[must_use]
    pub fn with_rebind_policy(mut self, policy: RebindPolicy) -> Self {
        self.rebind_policy = policy;
        self
    }

    #[must_use]
    pub fn with_strict_unbind(mut self, strict: bool) -> Self {
        self.strict_unbind = strict;
        self
    }

    #[must_use]
    pub fn with_initial_sync(mut self, initial_sync: bool) -> Self {
        self.initial_sync = initial_sync;
        self
    }

    /// Set the propagation bound. Clamped to at least 1.
    #[must_use]
    pub fn with_max_propagation_steps(mut self, steps: usize) -> Self {
        self.max_propagation_steps = steps.max(1);
        self
    }

    /// Parse a TOML document. Missing fields take their defaults.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: Self =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.max_propagation_steps = config.max_propagation_steps.max(1);
        Ok(config)
    }

    /// Load a TOML configuration file.
    #[cfg(feature = "config-file")]
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(
            path = %path.display(),
            reference_mode = %config.reference_mode,
            "loaded registry config"
        );
        Ok(config)
    }

    /// Apply [`ENV_REFERENCE_MODE`] and [`ENV_STRICT_UNBIND`] from the
    /// process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_env_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply environment overrides from an arbitrary lookup.
    pub fn apply_env_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(raw) = lookup(ENV_REFERENCE_MODE) {
            self.reference_mode = raw.parse()?;
            tracing::debug!(
                mode = %self.reference_mode,
                "reference mode overridden from environment"
            );
        }
        if let Some(raw) = lookup(ENV_STRICT_UNBIND) {
            self.strict_unbind = parse_flag(&raw).ok_or(ConfigError::InvalidValue {
                field: "strict_unbind",
                value: raw.clone(),
            })?;
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
