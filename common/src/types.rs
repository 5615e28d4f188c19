use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const STATE_UNKNOWN: &str = "unknown";
pub const STATE_UNAVAILABLE: &str = "unavailable";
pub const STATE_ON: &str = "on";
pub const STATE_OFF: &str = "off";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Off,
    Heat,
    Cool,
    HeatCool,
    Auto,
    Dry,
    FanOnly,
}

impl HvacMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Heat => "heat",
            Self::Cool => "cool",
            Self::HeatCool => "heat_cool",
            Self::Auto => "auto",
            Self::Dry => "dry",
            Self::FanOnly => "fan_only",
        }
    }

    /// Parses a thermostat state string. Unrecognised modes yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Some(Self::Off),
            "heat" => Some(Self::Heat),
            "cool" => Some(Self::Cool),
            "heat_cool" => Some(Self::HeatCool),
            "auto" => Some(Self::Auto),
            "dry" => Some(Self::Dry),
            "fan_only" => Some(Self::FanOnly),
            _ => None,
        }
    }

    /// Only heating and cooling drive the temperature comparisons.
    pub fn is_supported(self) -> bool {
        matches!(self, Self::Heat | Self::Cool)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Active,
    Idle,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Idle => "idle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverAction {
    Open,
    Close,
}

impl CoverAction {
    pub fn from_action(action: Action) -> Self {
        match action {
            Action::Active => Self::Open,
            Action::Idle => Self::Close,
        }
    }

    pub fn service(self) -> &'static str {
        match self {
            Self::Open => "open_cover",
            Self::Close => "close_cover",
        }
    }
}

/// A device state as the host reports it: the raw state string plus attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl DeviceState {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn is_available(&self) -> bool {
        !self.state.is_empty() && self.state != STATE_UNKNOWN && self.state != STATE_UNAVAILABLE
    }

    /// The state string read as a temperature, e.g. a sensor reporting `"70.4"`.
    pub fn temperature(&self) -> Option<f64> {
        parse_temperature_str(&self.state)
    }

    pub fn attribute_temperature(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).and_then(parse_temperature)
    }

    pub fn hvac_mode(&self) -> Option<HvacMode> {
        HvacMode::parse(&self.state)
    }
}

pub fn parse_temperature(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64().filter(|t| t.is_finite()),
        Value::String(raw) => parse_temperature_str(raw),
        _ => None,
    }
}

pub fn parse_temperature_str(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|t| t.is_finite())
}
