//! Render configuration
//!
//! Loaded from a YAML file (all keys optional), then overridden by the
//! environment:
//!
//! 1. `SCOPEBIND_DEPRECATIONS` (`warn`, `silence`, `raise`)
//! 2. Config file
//! 3. Defaults

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ScopeError;

/// Environment variable overriding [`RenderConfig::deprecations`]
pub const DEPRECATIONS_ENV: &str = "SCOPEBIND_DEPRECATIONS";

/// What to do when a deprecated template form is rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeprecationPolicy {
    /// Record a diagnostic and keep rendering
    #[default]
    Warn,
    /// Keep rendering without recording anything
    Silence,
    /// Fail the render with `SB-005`
    Raise,
}

impl FromStr for DeprecationPolicy {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(Self::Warn),
            "silence" | "off" => Ok(Self::Silence),
            "raise" | "error" => Ok(Self::Raise),
            other => Err(ScopeError::Config {
                reason: format!("unknown deprecation policy '{other}' (expected warn, silence or raise)"),
            }),
        }
    }
}

impl fmt::Display for DeprecationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Warn => "warn",
            Self::Silence => "silence",
            Self::Raise => "raise",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// HTML-escape `{{expr}}` output (`{{{expr}}}` is never escaped)
    pub escape_html: bool,

    pub deprecations: DeprecationPolicy,

    /// Reject `{{#with a as b.c}}` style aliases
    pub strict_aliases: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            escape_html: true,
            deprecations: DeprecationPolicy::Warn,
            strict_aliases: true,
        }
    }
}

impl RenderConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ScopeError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load from file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScopeError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ScopeError::Config {
            reason: format!("Failed to read config file {}: {}", path.display(), e),
        })?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `SCOPEBIND_DEPRECATIONS` if set
    pub fn apply_env(&mut self) -> Result<(), ScopeError> {
        self.apply_overrides(std::env::var(DEPRECATIONS_ENV).ok().as_deref())
    }

    fn apply_overrides(&mut self, deprecations: Option<&str>) -> Result<(), ScopeError> {
        if let Some(value) = deprecations {
            self.deprecations = value.parse()?;
        }
        Ok(())
    }
}
