// Copyright (c) 2026 envfuse contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/envfuse/envfuse

//! Configuration module

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::alerts::{AbsentPolicy, AlertRule, CompoundRule, Condition, Severity};
use crate::reading::Channel;
use crate::sources::SourceKind;

/// Shortest accepted adapter timeout in seconds
const MIN_TIMEOUT_SECS: u64 = 1;
/// Longest accepted adapter timeout in seconds
const MAX_TIMEOUT_SECS: u64 = 30;

/// Invalid configuration. Fatal at construction: the pipeline refuses to
/// start rather than running with a nonsensical parameter.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("smoothing coefficient must be in (0, 1], got {0}")]
    InvalidAlpha(f64),

    #[error("local blend weight must be in [0, 1], got {0}")]
    InvalidWeight(f64),

    #[error("poll interval for source '{0}' must be positive")]
    NonPositiveInterval(String),

    #[error("timeout for source '{0}' must be between {MIN_TIMEOUT_SECS} and {MAX_TIMEOUT_SECS} seconds")]
    InvalidTimeout(String),

    #[error("history capacity must be at least 1")]
    ZeroCapacity,

    #[error("expected packet rate must be positive, got {0}")]
    InvalidExpectedRate(f64),

    #[error("at least one source must be configured")]
    NoSources,

    #[error("duplicate source name '{0}'")]
    DuplicateSource(String),

    #[error("priority rank {0} is shared by multiple sources; exactly one source must hold the lowest rank")]
    SharedPrimaryRank(u8),

    #[error("source '{name}' is missing required field '{field}'")]
    MissingField { name: String, field: &'static str },
}

/// Display profile. Lite is the low-resource single-source mode; Pro keeps
/// the full history and blends in external baselines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    Lite,
    Pro,
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Log level
    pub log_level: String,

    /// Run against the built-in simulated source instead of live upstreams
    pub demo_mode: bool,

    /// Display profile (lite = capacity 20, no baseline blending)
    pub profile: Profile,

    /// Configured upstream sources
    pub sources: Vec<SourceConfig>,

    /// Fusion filter settings
    pub fusion: FusionConfig,

    /// History buffer settings
    pub history: HistoryConfig,

    /// Health monitor settings
    pub health: HealthConfig,

    /// Alert rule set
    pub alerts: AlertConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "envfuse".to_string(),
            log_level: "info".to_string(),
            demo_mode: true,
            profile: Profile::Pro,
            sources: vec![
                SourceConfig::simulator("esp32-sim", 3, 0),
                SourceConfig::open_meteo("open-meteo", 17.3850, 78.4867, 120, 1),
                SourceConfig::air_quality("open-meteo-aq", 17.3850, 78.4867, 120, 2),
            ],
            fusion: FusionConfig::default(),
            history: HistoryConfig::default(),
            health: HealthConfig::default(),
            alerts: AlertConfig::default(),
        }
    }
}

impl Config {
    /// Low-resource profile: smaller history, single-source fusion.
    pub fn lite() -> Self {
        Self {
            profile: Profile::Lite,
            history: HistoryConfig { capacity: 20 },
            ..Self::default()
        }
    }

    /// Reject invalid parameters before the pipeline starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if !names.insert(source.name.as_str()) {
                return Err(ConfigError::DuplicateSource(source.name.clone()));
            }
            if source.poll_interval_secs == 0 {
                return Err(ConfigError::NonPositiveInterval(source.name.clone()));
            }
            if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&source.timeout_secs) {
                return Err(ConfigError::InvalidTimeout(source.name.clone()));
            }
            match source.kind {
                SourceKind::OpenMeteo | SourceKind::AirQuality => {
                    if source.latitude.is_none() || source.longitude.is_none() {
                        return Err(ConfigError::MissingField {
                            name: source.name.clone(),
                            field: "latitude/longitude",
                        });
                    }
                }
                SourceKind::Bridge => {
                    if source.channel_id.is_none() {
                        return Err(ConfigError::MissingField {
                            name: source.name.clone(),
                            field: "channel_id",
                        });
                    }
                }
                SourceKind::Simulator => {}
            }
        }

        // The scheduler treats the lowest rank as the local reading; two
        // sources sharing it would interleave as primary in one filter
        if let Some(min_rank) = self.sources.iter().map(|s| s.priority).min() {
            let primaries = self
                .sources
                .iter()
                .filter(|s| s.priority == min_rank)
                .count();
            if primaries > 1 {
                return Err(ConfigError::SharedPrimaryRank(min_rank));
            }
        }

        if !(self.fusion.default_alpha > 0.0 && self.fusion.default_alpha <= 1.0) {
            return Err(ConfigError::InvalidAlpha(self.fusion.default_alpha));
        }
        for &alpha in self.fusion.channel_alpha.values() {
            if !(alpha > 0.0 && alpha <= 1.0) {
                return Err(ConfigError::InvalidAlpha(alpha));
            }
        }
        if !(0.0..=1.0).contains(&self.fusion.local_weight) {
            return Err(ConfigError::InvalidWeight(self.fusion.local_weight));
        }

        if self.history.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        if self.health.expected_rate_per_min <= 0.0 {
            return Err(ConfigError::InvalidExpectedRate(
                self.health.expected_rate_per_min,
            ));
        }

        Ok(())
    }

    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("envfuse"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path.
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// One upstream source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique source name
    pub name: String,

    /// Upstream payload shape
    pub kind: SourceKind,

    /// Poll interval in seconds (must be positive)
    pub poll_interval_secs: u64,

    /// Priority rank; the lowest rank is the local reading, higher ranks
    /// contribute baselines
    pub priority: u8,

    /// Request timeout in seconds, 1..=30 (default 6)
    pub timeout_secs: u64,

    /// Coordinate for the Open-Meteo endpoints
    pub latitude: Option<f64>,

    /// Coordinate for the Open-Meteo endpoints
    pub longitude: Option<f64>,

    /// Channel id for the hardware-bridge feed
    pub channel_id: Option<String>,

    /// Override the upstream base URL (testing, self-hosted mirrors)
    pub base_url: Option<String>,
}

impl SourceConfig {
    /// Built-in demo generator.
    pub fn simulator(name: &str, interval_secs: u64, priority: u8) -> Self {
        Self {
            name: name.to_string(),
            kind: SourceKind::Simulator,
            poll_interval_secs: interval_secs,
            priority,
            timeout_secs: 6,
            latitude: None,
            longitude: None,
            channel_id: None,
            base_url: None,
        }
    }

    /// Open-Meteo current weather at a coordinate.
    pub fn open_meteo(name: &str, lat: f64, lon: f64, interval_secs: u64, priority: u8) -> Self {
        Self {
            name: name.to_string(),
            kind: SourceKind::OpenMeteo,
            poll_interval_secs: interval_secs,
            priority,
            timeout_secs: 6,
            latitude: Some(lat),
            longitude: Some(lon),
            channel_id: None,
            base_url: None,
        }
    }

    /// Open-Meteo air quality at a coordinate.
    pub fn air_quality(name: &str, lat: f64, lon: f64, interval_secs: u64, priority: u8) -> Self {
        Self {
            name: name.to_string(),
            kind: SourceKind::AirQuality,
            poll_interval_secs: interval_secs,
            priority,
            timeout_secs: 6,
            latitude: Some(lat),
            longitude: Some(lon),
            channel_id: None,
            base_url: None,
        }
    }

    /// Hardware-bridge channel feed.
    pub fn bridge(name: &str, channel_id: &str, interval_secs: u64, priority: u8) -> Self {
        Self {
            name: name.to_string(),
            kind: SourceKind::Bridge,
            poll_interval_secs: interval_secs,
            priority,
            timeout_secs: 6,
            latitude: None,
            longitude: None,
            channel_id: Some(channel_id.to_string()),
            base_url: None,
        }
    }
}

/// Fusion filter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Smoothing coefficient applied to channels without an override,
    /// 0 < α ≤ 1 (default 0.2)
    pub default_alpha: f64,

    /// Weight of the local reading in the cross-source blend (default 0.8;
    /// the baseline gets the remainder)
    pub local_weight: f64,

    /// Per-channel α overrides. Flag channels default to 1.0 so they track
    /// the raw value instead of being smoothed.
    pub channel_alpha: BTreeMap<Channel, f64>,
}

impl Default for FusionConfig {
    fn default() -> Self {
        let mut channel_alpha = BTreeMap::new();
        channel_alpha.insert(Channel::Motion, 1.0);

        Self {
            default_alpha: 0.2,
            local_weight: 0.8,
            channel_alpha,
        }
    }
}

/// History buffer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum retained readings (default 50, lite profile 20)
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { capacity: 50 }
    }
}

/// Health monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Packets per minute expected from a healthy primary source
    /// (default 20, one packet per 3-second poll)
    pub expected_rate_per_min: f64,

    /// Fall back to the next-priority source when the primary fails
    pub fallback_enabled: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            expected_rate_per_min: 20.0,
            fallback_enabled: true,
        }
    }
}

/// Alert rule set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Independent rules, all evaluated each cycle
    pub rules: Vec<AlertRule>,

    /// Optional compound escalation rule
    pub compound: Option<CompoundRule>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            rules: vec![
                AlertRule {
                    channel: Channel::Temperature,
                    condition: Condition::Ceiling { limit: 35.0 },
                    severity: Severity::High,
                    label: "Temperature above safety ceiling".to_string(),
                    absent_policy: AbsentPolicy::Unknown,
                },
                AlertRule {
                    channel: Channel::GasPpm,
                    condition: Condition::Ceiling { limit: 120.0 },
                    severity: Severity::High,
                    label: "Critical gas concentration".to_string(),
                    absent_policy: AbsentPolicy::Unknown,
                },
                AlertRule {
                    channel: Channel::GasPpm,
                    condition: Condition::Ceiling { limit: 90.0 },
                    severity: Severity::Medium,
                    label: "Elevated gas concentration".to_string(),
                    absent_policy: AbsentPolicy::Unknown,
                },
                AlertRule {
                    channel: Channel::Pm25,
                    condition: Condition::Ceiling { limit: 90.0 },
                    severity: Severity::Medium,
                    label: "Elevated particulate level".to_string(),
                    absent_policy: AbsentPolicy::Unknown,
                },
                AlertRule {
                    channel: Channel::RainLevel,
                    condition: Condition::Ceiling { limit: 5.0 },
                    severity: Severity::Low,
                    label: "Rain detected".to_string(),
                    absent_policy: AbsentPolicy::Unknown,
                },
                AlertRule {
                    channel: Channel::Motion,
                    condition: Condition::Flag,
                    severity: Severity::Medium,
                    label: "Motion detected in restricted area".to_string(),
                    absent_policy: AbsentPolicy::Unknown,
                },
            ],
            compound: Some(CompoundRule {
                first_channel: Channel::Temperature,
                first_limit: 30.0,
                second_channel: Channel::GasPpm,
                second_limit: 120.0,
                severity: Severity::High,
                label: "Critical combined heat and gas".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
        assert!(Config::lite().validate().is_ok());
    }

    #[test]
    fn zero_alpha_is_rejected() {
        let mut config = Config::default();
        config.fusion.default_alpha = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidAlpha(_))));
    }

    #[test]
    fn alpha_above_one_is_rejected() {
        let mut config = Config::default();
        config.fusion.channel_alpha.insert(Channel::Temperature, 1.5);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidAlpha(_))));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut config = Config::default();
        config.sources[0].poll_interval_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositiveInterval(_))
        ));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut config = Config::default();
        config.history.capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroCapacity)));
    }

    #[test]
    fn out_of_range_timeout_is_rejected() {
        let mut config = Config::default();
        config.sources[0].timeout_secs = 45;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout(_))));
    }

    #[test]
    fn bridge_requires_channel_id() {
        let mut config = Config::default();
        let mut bridge = SourceConfig::bridge("bridge", "12345", 15, 0);
        bridge.channel_id = None;
        config.sources = vec![bridge];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn shared_lowest_rank_is_rejected() {
        let mut config = Config::default();
        config.sources = vec![
            SourceConfig::simulator("sim-a", 3, 0),
            SourceConfig::simulator("sim-b", 3, 0),
        ];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SharedPrimaryRank(0))
        ));

        // Shared ranks above the primary are fine: both contribute baselines
        config.sources = vec![
            SourceConfig::simulator("sim-a", 3, 0),
            SourceConfig::simulator("sim-b", 3, 1),
            SourceConfig::simulator("sim-c", 3, 1),
        ];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let restored: Config = toml::from_str(&serialized).unwrap();
        assert!(restored.validate().is_ok());
        assert_eq!(restored.sources.len(), config.sources.len());
        assert_eq!(restored.history.capacity, 50);
    }
}
