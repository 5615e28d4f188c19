use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    areas::{
        all_connectivity_ids, all_damper_ids, all_temperature_sensor_ids, all_thermostat_ids,
        filter_valid_areas,
    },
    config::HouseConfig,
    thermostat::virtual_thermostat_id,
    types::{DeviceState, STATE_OFF, STATE_ON},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangeEvent {
    pub entity_id: String,
    pub old_state: Option<DeviceState>,
    pub new_state: Option<DeviceState>,
}

impl StateChangeEvent {
    /// A connectivity sensor going from `off` to `on`: the device just came back.
    pub fn is_reconnect(&self) -> bool {
        let old = self.old_state.as_ref().map(|state| state.state.as_str());
        let new = self.new_state.as_ref().map(|state| state.state.as_str());
        old == Some(STATE_OFF) && new == Some(STATE_ON)
    }
}

/// Entity ids whose changes should start a decision cycle.
#[derive(Debug, Clone, Default)]
pub struct TriggerSet {
    watched: HashSet<String>,
    connectivity: HashSet<String>,
}

impl TriggerSet {
    pub fn from_config(config: &HouseConfig) -> Self {
        let areas = filter_valid_areas(&config.areas);

        let mut watched: HashSet<String> = all_damper_ids(&areas)
            .into_iter()
            .chain(all_temperature_sensor_ids(&areas))
            .chain(all_thermostat_ids(&config.areas))
            .map(str::to_string)
            .collect();
        watched.extend(areas.keys().map(|name| virtual_thermostat_id(name)));

        let connectivity = all_connectivity_ids(&areas)
            .into_iter()
            .filter(|id| !watched.contains(*id))
            .map(str::to_string)
            .collect();

        Self {
            watched,
            connectivity,
        }
    }

    pub fn should_trigger(&self, event: &StateChangeEvent) -> bool {
        if self.watched.contains(&event.entity_id) {
            return true;
        }
        self.connectivity.contains(&event.entity_id) && event.is_reconnect()
    }

    pub fn is_watched(&self, entity_id: &str) -> bool {
        self.watched.contains(entity_id) || self.connectivity.contains(entity_id)
    }

    pub fn len(&self) -> usize {
        self.watched.len() + self.connectivity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AreaConfig, Areas};

    fn config() -> HouseConfig {
        let mut areas = Areas::new();
        areas.insert(
            "office".to_string(),
            AreaConfig {
                covers: vec!["cover.office_vent".to_string()],
                temperature: Some("sensor.office_temperature".to_string()),
                connectivities: vec!["binary_sensor.office_vent_connected".to_string()],
                ..AreaConfig::default()
            },
        );
        areas.insert(
            "kitchen".to_string(),
            AreaConfig {
                covers: vec!["cover.kitchen_vent".to_string()],
                ..AreaConfig::default()
            },
        );
        areas.insert(
            "main_floor".to_string(),
            AreaConfig {
                climate: Some("climate.living_room_thermostat".to_string()),
                ..AreaConfig::default()
            },
        );
        HouseConfig {
            areas,
            ..HouseConfig::default()
        }
    }

    fn change(entity_id: &str, old: Option<&str>, new: Option<&str>) -> StateChangeEvent {
        StateChangeEvent {
            entity_id: entity_id.to_string(),
            old_state: old.map(DeviceState::new),
            new_state: new.map(DeviceState::new),
        }
    }

    #[test]
    fn watches_wired_devices_and_thermostats() {
        let triggers = TriggerSet::from_config(&config());

        for id in [
            "cover.office_vent",
            "sensor.office_temperature",
            "climate.living_room_thermostat",
            "climate.office_thermostat",
        ] {
            assert!(triggers.should_trigger(&change(id, Some("1"), Some("2"))), "{id}");
        }
        assert!(!triggers.should_trigger(&change("cover.kitchen_vent", None, Some("open"))));
        let kitchen = change("climate.kitchen_thermostat", None, Some("heat"));
        assert!(!triggers.should_trigger(&kitchen));
        assert!(!triggers.should_trigger(&change("light.porch", None, Some("on"))));
        assert_eq!(triggers.len(), 5);
    }

    #[test]
    fn connectivity_triggers_only_on_reconnect() {
        let triggers = TriggerSet::from_config(&config());
        let id = "binary_sensor.office_vent_connected";

        assert!(triggers.is_watched(id));
        assert!(triggers.should_trigger(&change(id, Some("off"), Some("on"))));
        assert!(!triggers.should_trigger(&change(id, Some("on"), Some("off"))));
        assert!(!triggers.should_trigger(&change(id, None, Some("on"))));
        assert!(!triggers.should_trigger(&change(id, Some("unavailable"), Some("on"))));
    }

    #[test]
    fn empty_configuration_watches_nothing() {
        let triggers = TriggerSet::from_config(&HouseConfig::default());

        assert!(triggers.is_empty());
    }
}
