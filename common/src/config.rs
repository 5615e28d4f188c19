use chrono::NaiveTime;
use chrono_tz::Tz;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_TIMEZONE: &str = "America/Los_Angeles";

/// Area name to area wiring, in configuration order.
pub type Areas = IndexMap<String, AreaConfig>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaConfig {
    pub covers: Vec<String>,
    pub temperature: Option<String>,
    pub climate: Option<String>,
    pub bedroom: bool,
    pub connectivities: Vec<String>,
}

impl AreaConfig {
    pub fn temperature_sensor(&self) -> Option<&str> {
        self.temperature.as_deref().filter(|id| !id.is_empty())
    }

    pub fn thermostat(&self) -> Option<&str> {
        self.climate.as_deref().filter(|id| !id.is_empty())
    }

    /// An area can be zoned only when it has dampers and a sensor to judge them by.
    pub fn is_controllable(&self) -> bool {
        !self.covers.is_empty() && self.temperature_sensor().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseConfig {
    #[serde(default)]
    pub areas: Areas,
    #[serde(default = "default_bed_time")]
    pub bed_time: NaiveTime,
    #[serde(default = "default_wake_time")]
    pub wake_time: NaiveTime,
    #[serde(default)]
    pub control_central_thermostat: bool,
}

impl Default for HouseConfig {
    fn default() -> Self {
        Self {
            areas: Areas::new(),
            bed_time: default_bed_time(),
            wake_time: default_wake_time(),
            control_central_thermostat: false,
        }
    }
}

impl HouseConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.areas.keys().any(|name| name.trim().is_empty()) {
            return Err(ConfigError::EmptyAreaName);
        }
        Ok(())
    }
}

fn default_bed_time() -> NaiveTime {
    NaiveTime::from_hms_opt(21, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn default_wake_time() -> NaiveTime {
    NaiveTime::from_hms_opt(5, 0, 0).unwrap_or(NaiveTime::MIN)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            user: String::new(),
            pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub house: HouseConfig,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub mqtt: MqttConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            house: HouseConfig::default(),
            timezone: default_timezone(),
            mqtt: MqttConfig::default(),
        }
    }
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

impl RuntimeConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.house.validate()?;
        Ok(config)
    }

    pub fn sanitize(&mut self) {
        if self.timezone.parse::<Tz>().is_err() {
            self.timezone = default_timezone();
        }
    }

    pub fn time_zone(&self) -> Tz {
        self.timezone.parse().unwrap_or(chrono_tz::America::Los_Angeles)
    }

    pub fn set_timezone(&mut self, timezone: &str) -> Result<Tz, ConfigError> {
        let tz = timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimezone(timezone.to_string()))?;
        self.timezone = timezone.to_string();
        Ok(tz)
    }
}
