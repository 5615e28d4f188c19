use std::collections::HashMap;

use crate::{
    thermostat::{virtual_thermostat_id, ATTR_CURRENT_TEMPERATURE, ATTR_TEMPERATURE},
    types::{DeviceState, HvacMode},
};

/// Read access to the host's live device states.
pub trait StateStore {
    fn state(&self, entity_id: &str) -> Option<&DeviceState>;

    fn available_state(&self, entity_id: &str) -> Option<&DeviceState> {
        self.state(entity_id).filter(|state| state.is_available())
    }
}

impl StateStore for HashMap<String, DeviceState> {
    fn state(&self, entity_id: &str) -> Option<&DeviceState> {
        self.get(entity_id)
    }
}

impl<S: StateStore + ?Sized> StateStore for &S {
    fn state(&self, entity_id: &str) -> Option<&DeviceState> {
        (**self).state(entity_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CentralReading {
    pub current_temperature: f64,
    pub hvac_mode: Option<HvacMode>,
}

/// `None` unless the thermostat is online and reports a current temperature.
pub fn central_reading<S: StateStore + ?Sized>(
    store: &S,
    entity_id: &str,
) -> Option<CentralReading> {
    let state = store.available_state(entity_id)?;
    Some(CentralReading {
        current_temperature: state.attribute_temperature(ATTR_CURRENT_TEMPERATURE)?,
        hvac_mode: state.hvac_mode(),
    })
}

/// Target temperature held by the area's virtual thermostat.
pub fn area_target_temperature<S: StateStore + ?Sized>(store: &S, area: &str) -> Option<f64> {
    store
        .state(&virtual_thermostat_id(area))?
        .attribute_temperature(ATTR_TEMPERATURE)
}

pub fn sensor_temperature<S: StateStore + ?Sized>(store: &S, sensor_id: &str) -> Option<f64> {
    store.available_state(sensor_id)?.temperature()
}
