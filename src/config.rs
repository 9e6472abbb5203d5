//! Configuration loading from TOML files
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) yields a runnable configuration.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono_tz::Tz;
use serde::Deserialize;

use crate::model::{DurationMs, HOUR, MINUTE};
use crate::osrm::OsrmConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub routing: RoutingConfig,
    pub dispatch: DispatchConfig,
    pub shift: ShiftConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingBackend {
    #[default]
    Osrm,
    Haversine,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub backend: RoutingBackend,
    pub osrm: OsrmConfig,
    /// Assumed speed for the haversine backend.
    pub speed_kmh: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            backend: RoutingBackend::default(),
            osrm: OsrmConfig::default(),
            speed_kmh: 40.0,
        }
    }
}

/// Limits applied to every booking and whitelist request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Longest accepted start-to-target ride.
    pub max_travel_minutes: i64,
    /// Minimum lead time between the request and the pickup.
    pub min_prep_minutes: i64,
    /// How long a passenger may wait before a pickup when the dropoff is fixed.
    pub max_wait_pickup_minutes: i64,
    /// How much later than requested a passenger may arrive when the pickup is fixed.
    pub max_wait_dropoff_minutes: i64,
    pub passenger_change_minutes: i64,
    pub buffer_minutes: i64,
    /// Ceiling for depot-to-depot tours.
    pub max_full_tour_hours: i64,
    /// Padding around the travel interval when loading availabilities.
    pub search_padding_hours: i64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_travel_minutes: 60,
            min_prep_minutes: 30,
            max_wait_pickup_minutes: 10,
            max_wait_dropoff_minutes: 10,
            passenger_change_minutes: 1,
            buffer_minutes: 0,
            max_full_tour_hours: 3,
            search_padding_hours: 24,
        }
    }
}

impl DispatchConfig {
    pub fn max_travel_ms(&self) -> DurationMs {
        self.max_travel_minutes * MINUTE
    }

    pub fn min_prep_ms(&self) -> DurationMs {
        self.min_prep_minutes * MINUTE
    }

    pub fn max_wait_pickup_ms(&self) -> DurationMs {
        self.max_wait_pickup_minutes * MINUTE
    }

    pub fn max_wait_dropoff_ms(&self) -> DurationMs {
        self.max_wait_dropoff_minutes * MINUTE
    }

    /// Time added to every routed passenger leg.
    pub fn leg_padding_ms(&self) -> DurationMs {
        (self.passenger_change_minutes + self.buffer_minutes) * MINUTE
    }

    pub fn max_full_tour_ms(&self) -> DurationMs {
        self.max_full_tour_hours * HOUR
    }

    pub fn search_padding_ms(&self) -> DurationMs {
        self.search_padding_hours * HOUR
    }
}

/// Daily duty window in local time.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShiftConfig {
    pub start_hour: i64,
    pub end_hour: i64,
    pub timezone: Tz,
}

impl Default for ShiftConfig {
    fn default() -> Self {
        Self {
            start_hour: 6,
            end_hour: 21,
            timezone: chrono_tz::Europe::Berlin,
        }
    }
}

impl ShiftConfig {
    pub fn start_on_day_ms(&self) -> DurationMs {
        self.start_hour * HOUR
    }

    pub fn end_on_day_ms(&self) -> DurationMs {
        self.end_hour * HOUR
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON fleet seed loaded into the in-memory store at startup.
    pub seed: Option<PathBuf>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        if config.shift.start_hour > config.shift.end_hour {
            anyhow::bail!(
                "shift starts at {}h but ends at {}h in {}",
                config.shift.start_hour,
                config.shift.end_hour,
                path.display()
            );
        }
        Ok(config)
    }

    /// Like [`Config::from_file`], falling back to defaults on any error.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }
}
