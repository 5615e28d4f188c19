//! Area classification: which configured areas can be zoned, and the device
//! ids they contribute.

use crate::config::{AreaConfig, Areas};

/// Keeps the areas that have at least one damper and a temperature sensor,
/// in their original order.
pub fn filter_valid_areas(areas: &Areas) -> Areas {
    areas
        .iter()
        .filter(|(_, area)| area.is_controllable())
        .map(|(name, area)| (name.clone(), area.clone()))
        .collect()
}

/// Dampers across all areas. Ids shared between areas are kept once per area.
pub fn all_damper_ids(areas: &Areas) -> Vec<&str> {
    areas
        .values()
        .flat_map(|area| area.covers.iter().map(String::as_str))
        .collect()
}

pub fn all_temperature_sensor_ids(areas: &Areas) -> Vec<&str> {
    areas
        .values()
        .filter_map(AreaConfig::temperature_sensor)
        .collect()
}

/// Thermostats declared anywhere in the configuration; pass the unfiltered
/// areas, since the central unit usually lives in an area without dampers.
pub fn all_thermostat_ids(areas: &Areas) -> Vec<&str> {
    areas.values().filter_map(AreaConfig::thermostat).collect()
}

/// The first declared thermostat drives the whole house.
pub fn central_thermostat_id(areas: &Areas) -> Option<&str> {
    all_thermostat_ids(areas).into_iter().next()
}

pub fn all_connectivity_ids(areas: &Areas) -> Vec<&str> {
    areas
        .values()
        .flat_map(|area| area.connectivities.iter().map(String::as_str))
        .collect()
}

pub fn bedroom_areas(areas: &Areas) -> Areas {
    areas
        .iter()
        .filter(|(_, area)| area.bedroom)
        .map(|(name, area)| (name.clone(), area.clone()))
        .collect()
}

pub fn is_night_mode_enabled(areas: &Areas) -> bool {
    areas.values().any(|area| area.bedroom)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn area(covers: &[&str], temperature: Option<&str>) -> AreaConfig {
        AreaConfig {
            covers: covers.iter().map(|id| id.to_string()).collect(),
            temperature: temperature.map(str::to_string),
            ..AreaConfig::default()
        }
    }

    fn house() -> Areas {
        let mut areas = Areas::new();
        areas.insert(
            "basement".to_string(),
            area(
                &[
                    "cover.basement_west_vent",
                    "cover.basement_northeast_vent",
                    "cover.basement_southeast_vent",
                ],
                Some("sensor.basement_temperature"),
            ),
        );
        areas.insert(
            "main_floor".to_string(),
            AreaConfig {
                climate: Some("climate.living_room_thermostat".to_string()),
                ..AreaConfig::default()
            },
        );
        areas.insert(
            "kitchen".to_string(),
            area(&["cover.kitchen_south_vent"], None),
        );
        areas.insert(
            "upstairs_bathroom".to_string(),
            area(
                &["cover.upstairs_bathroom_vent"],
                Some("sensor.upstairs_bathroom_temperature"),
            ),
        );
        areas
    }

    #[test]
    fn keeps_only_wired_areas_in_order() {
        let valid = filter_valid_areas(&house());

        let names: Vec<&str> = valid.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["basement", "upstairs_bathroom"]);
    }

    #[test]
    fn filtering_is_idempotent() {
        let once = filter_valid_areas(&house());
        let twice = filter_valid_areas(&once);

        assert_eq!(once, twice);
    }

    #[test]
    fn flattens_dampers_in_area_order() {
        let valid = filter_valid_areas(&house());

        assert_eq!(
            all_damper_ids(&valid),
            vec![
                "cover.basement_west_vent",
                "cover.basement_northeast_vent",
                "cover.basement_southeast_vent",
                "cover.upstairs_bathroom_vent",
            ]
        );
    }

    #[test]
    fn excluded_areas_contribute_no_dampers() {
        let valid = filter_valid_areas(&house());

        assert!(!all_damper_ids(&valid).contains(&"cover.kitchen_south_vent"));
    }

    #[test]
    fn shared_dampers_are_not_deduplicated() {
        let mut areas = Areas::new();
        areas.insert(
            "den".to_string(),
            area(&["cover.shared_vent"], Some("sensor.den_temperature")),
        );
        areas.insert(
            "hall".to_string(),
            area(&["cover.shared_vent"], Some("sensor.hall_temperature")),
        );

        assert_eq!(
            all_damper_ids(&areas),
            vec!["cover.shared_vent", "cover.shared_vent"]
        );
    }

    #[test]
    fn lists_one_sensor_per_valid_area() {
        let valid = filter_valid_areas(&house());

        assert_eq!(
            all_temperature_sensor_ids(&valid),
            vec![
                "sensor.basement_temperature",
                "sensor.upstairs_bathroom_temperature",
            ]
        );
    }

    #[test]
    fn thermostats_come_from_unfiltered_areas() {
        let areas = house();

        assert_eq!(
            all_thermostat_ids(&areas),
            vec!["climate.living_room_thermostat"]
        );
        assert!(all_thermostat_ids(&filter_valid_areas(&areas)).is_empty());
        assert_eq!(
            central_thermostat_id(&areas),
            Some("climate.living_room_thermostat")
        );
    }

    #[test]
    fn night_mode_follows_bedroom_flags() {
        let mut areas = house();
        assert!(!is_night_mode_enabled(&areas));
        assert!(bedroom_areas(&areas).is_empty());
        assert!(!is_night_mode_enabled(&Areas::new()));

        areas["upstairs_bathroom"].bedroom = true;

        assert!(is_night_mode_enabled(&areas));
        let bedrooms = bedroom_areas(&areas);
        assert_eq!(bedrooms.len(), 1);
        assert!(bedrooms.contains_key("upstairs_bathroom"));
    }
}
