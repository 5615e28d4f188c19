use indexmap::IndexMap;
use serde::Serialize;

use crate::{
    config::Areas,
    decision::decide_action,
    types::{Action, DeviceState, HvacMode},
};

pub const DEFAULT_TARGET_TEMPERATURE: f64 = 70.0;

pub const ATTR_TEMPERATURE: &str = "temperature";
pub const ATTR_CURRENT_TEMPERATURE: &str = "current_temperature";
pub const ATTR_HVAC_ACTION: &str = "hvac_action";

pub type AreaThermostats = IndexMap<String, AreaThermostat>;

pub fn virtual_thermostat_id(area: &str) -> String {
    format!("climate.{area}_thermostat")
}

/// Software-only thermostat holding one area's target temperature.
///
/// The host binding owns these records and publishes them into its state
/// store; decision cycles only ever read them back through
/// [`crate::store::area_target_temperature`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaThermostat {
    area: String,
    entity_id: String,
    target_temperature: f64,
    hvac_mode: Option<HvacMode>,
    current_temperature: Option<f64>,
}

impl AreaThermostat {
    pub fn new(area: &str) -> Self {
        Self {
            area: area.to_string(),
            entity_id: virtual_thermostat_id(area),
            target_temperature: DEFAULT_TARGET_TEMPERATURE,
            hvac_mode: None,
            current_temperature: None,
        }
    }

    /// One thermostat per area, keyed by area name.
    pub fn for_areas(areas: &Areas) -> AreaThermostats {
        areas
            .keys()
            .map(|name| (name.clone(), Self::new(name)))
            .collect()
    }

    pub fn area(&self) -> &str {
        &self.area
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn target_temperature(&self) -> f64 {
        self.target_temperature
    }

    pub fn hvac_mode(&self) -> Option<HvacMode> {
        self.hvac_mode
    }

    pub fn current_temperature(&self) -> Option<f64> {
        self.current_temperature
    }

    pub fn set_target_temperature(&mut self, temperature: f64) -> bool {
        if !temperature.is_finite() {
            return false;
        }
        if (self.target_temperature - temperature).abs() > f64::EPSILON {
            self.target_temperature = temperature;
            true
        } else {
            false
        }
    }

    pub fn set_hvac_mode(&mut self, mode: Option<HvacMode>) -> bool {
        if self.hvac_mode != mode {
            self.hvac_mode = mode;
            true
        } else {
            false
        }
    }

    pub fn set_current_temperature(&mut self, temperature: Option<f64>) -> bool {
        let temperature = temperature.filter(|t| t.is_finite());
        if self.current_temperature != temperature {
            self.current_temperature = temperature;
            true
        } else {
            false
        }
    }

    pub fn action(&self) -> Action {
        decide_action(
            Some(self.target_temperature),
            self.current_temperature,
            self.hvac_mode,
        )
    }

    fn hvac_action(&self) -> &'static str {
        match (self.hvac_mode, self.action()) {
            (Some(HvacMode::Heat), Action::Active) => "heating",
            (Some(HvacMode::Cool), Action::Active) => "cooling",
            (Some(HvacMode::Off) | None, _) => "off",
            _ => "idle",
        }
    }

    pub fn to_device_state(&self) -> DeviceState {
        let state = self.hvac_mode.map_or(HvacMode::Off.as_str(), HvacMode::as_str);
        DeviceState::new(state)
            .with_attribute(ATTR_TEMPERATURE, self.target_temperature)
            .with_attribute(ATTR_CURRENT_TEMPERATURE, self.current_temperature)
            .with_attribute(ATTR_HVAC_ACTION, self.hvac_action())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_seventy_degrees() {
        let thermostat = AreaThermostat::new("basement");

        assert_eq!(thermostat.entity_id(), "climate.basement_thermostat");
        assert_eq!(thermostat.target_temperature(), 70.0);
    }

    #[test]
    fn set_target_reports_changes_only() {
        let mut thermostat = AreaThermostat::new("basement");

        assert!(thermostat.set_target_temperature(75.0));
        assert!(!thermostat.set_target_temperature(75.0));
        assert!(!thermostat.set_target_temperature(f64::NAN));
        assert_eq!(thermostat.target_temperature(), 75.0);
    }

    #[test]
    fn device_state_exposes_target_for_decisions() {
        let mut thermostat = AreaThermostat::new("office");
        thermostat.set_target_temperature(72.0);
        thermostat.set_hvac_mode(Some(HvacMode::Heat));
        thermostat.set_current_temperature(Some(70.0));

        let state = thermostat.to_device_state();

        assert_eq!(state.state, "heat");
        assert_eq!(state.attribute_temperature(ATTR_TEMPERATURE), Some(72.0));
        assert_eq!(state.attribute_temperature(ATTR_CURRENT_TEMPERATURE), Some(70.0));
        assert_eq!(
            state.attributes.get(ATTR_HVAC_ACTION),
            Some(&serde_json::json!("heating"))
        );
    }

    #[test]
    fn satisfied_area_reports_idle() {
        let mut thermostat = AreaThermostat::new("office");
        thermostat.set_hvac_mode(Some(HvacMode::Cool));
        thermostat.set_current_temperature(Some(69.0));

        assert_eq!(thermostat.action(), Action::Idle);
        assert_eq!(
            thermostat.to_device_state().attributes.get(ATTR_HVAC_ACTION),
            Some(&serde_json::json!("idle"))
        );
    }

    #[test]
    fn unknown_mode_publishes_as_off() {
        let thermostat = AreaThermostat::new("office");
        let state = thermostat.to_device_state();

        assert_eq!(state.state, "off");
        assert!(state.is_available());
        assert_eq!(state.attribute_temperature(ATTR_CURRENT_TEMPERATURE), None);
    }
}
