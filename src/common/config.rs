use serde::{Deserialize, Serialize};
use tracing::warn;

/// Top-level configuration. Every field has a default so a missing or
/// partial config file degrades to built-in behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub settings: Settings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub discriminator: DiscriminatorSettings,
    pub resolver: ResolverSettings,
    pub frames: FrameSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DiscriminatorSettings {
    /// Windows smaller than this in either dimension with an empty title are
    /// treated as auxiliary rendering surfaces, not user windows.
    pub min_dimension: f64,
    /// Bundle ids allowed to live outside the normal window level band.
    pub level_whitelist: Vec<String>,
}

impl Default for DiscriminatorSettings {
    fn default() -> Self {
        Self {
            min_dimension: 50.0,
            level_whitelist: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverSettings {
    /// Per-process accessibility messaging timeout. One hung process must
    /// not stall a whole scan.
    pub ax_timeout_ms: u64,
    /// Include windows on other virtual desktops in scans.
    pub include_offscreen: bool,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            ax_timeout_ms: 100,
            include_offscreen: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FrameSettings {
    /// Tolerance in logical units when matching a reported frame against an
    /// expected frame we set ourselves.
    pub match_tolerance: f64,
    /// How long an expected frame stays valid for suppression matching.
    pub suppress_deadline_ms: u64,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            match_tolerance: 2.0,
            suppress_deadline_ms: 500,
        }
    }
}

impl Config {
    pub fn parse(text: &str) -> Result<Config, toml::de::Error> {
        toml::from_str(text)
    }

    /// Parses `text`, falling back to the default configuration on error.
    /// Parse failures are surfaced once here and never retried.
    pub fn parse_or_default(text: &str) -> Config {
        match Config::parse(text) {
            Ok(config) => config,
            Err(err) => {
                warn!("invalid configuration, using defaults: {err}");
                Config::default()
            }
        }
    }
}
