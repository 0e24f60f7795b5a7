use crate::constants::{
    DEFAULT_CLUSTER_RADIUS_METERS, EARLIEST_NORMAL_HOUR, HIGH_LOI_MULTIPLIER, LATEST_NORMAL_HOUR,
    LOW_LOI_MULTIPLIER, SHORT_GAP_SECONDS,
};
use crate::error::{QcError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Engine configuration. Every field has a default so a missing or
/// partial config file still yields a working engine.
#[derive(Debug, Clone, Deserialize)]
pub struct QcConfig {
    #[serde(default = "default_cluster_radius")]
    pub cluster_radius_meters: f64,
    /// Local start hours outside [earliest, latest] draw an odd-hour flag.
    #[serde(default = "default_earliest_normal_hour")]
    pub earliest_normal_hour: u32,
    #[serde(default = "default_latest_normal_hour")]
    pub latest_normal_hour: u32,
    /// Length-of-interview outlier thresholds, as multiples of the
    /// batch mean duration.
    #[serde(default = "default_low_loi_multiplier")]
    pub low_loi_multiplier: f64,
    #[serde(default = "default_high_loi_multiplier")]
    pub high_loi_multiplier: f64,
    /// Gaps shorter than this between consecutive interviews on one
    /// device are implausibly close together.
    #[serde(default = "default_short_gap_seconds")]
    pub short_gap_seconds: i64,
    /// File path or URL of the boundary polygon FeatureCollection.
    /// None means geofencing is disabled, which is distinct from a
    /// configured source failing to load.
    #[serde(default)]
    pub boundary_source: Option<String>,
}

fn default_cluster_radius() -> f64 {
    DEFAULT_CLUSTER_RADIUS_METERS
}

fn default_earliest_normal_hour() -> u32 {
    EARLIEST_NORMAL_HOUR
}

fn default_latest_normal_hour() -> u32 {
    LATEST_NORMAL_HOUR
}

fn default_low_loi_multiplier() -> f64 {
    LOW_LOI_MULTIPLIER
}

fn default_high_loi_multiplier() -> f64 {
    HIGH_LOI_MULTIPLIER
}

fn default_short_gap_seconds() -> i64 {
    SHORT_GAP_SECONDS
}

impl Default for QcConfig {
    fn default() -> Self {
        Self {
            cluster_radius_meters: DEFAULT_CLUSTER_RADIUS_METERS,
            earliest_normal_hour: EARLIEST_NORMAL_HOUR,
            latest_normal_hour: LATEST_NORMAL_HOUR,
            low_loi_multiplier: LOW_LOI_MULTIPLIER,
            high_loi_multiplier: HIGH_LOI_MULTIPLIER,
            short_gap_seconds: SHORT_GAP_SECONDS,
            boundary_source: None,
        }
    }
}

impl QcConfig {
    pub fn load() -> Result<Self> {
        let config_path = "config.toml";
        if !Path::new(config_path).exists() {
            return Ok(Self::default());
        }
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            QcError::Config(format!("Failed to read config file '{}': {}", config_path, e))
        })?;
        Self::from_toml_str(&config_content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: QcConfig = toml::from_str(content)?;
        Ok(config)
    }
}
