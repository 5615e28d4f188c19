//! Zoning decisions. Every function here is total: missing readings and
//! unsupported modes resolve to a defined answer instead of an error.

use serde::Serialize;

use crate::{
    config::Areas,
    store::{area_target_temperature, sensor_temperature, StateStore},
    types::{Action, CoverAction, HvacMode},
};

/// Degrees the central setpoint is pushed past the current temperature while
/// any area still needs conditioning.
pub const SETPOINT_NUDGE: f64 = 2.0;

/// House-wide state shared by every damper decision of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HouseSnapshot {
    pub hvac_mode: Option<HvacMode>,
    pub house_action: Action,
    pub night_mode_enabled: bool,
    pub is_night: bool,
    pub control_central_thermostat: bool,
}

impl HouseSnapshot {
    pub fn night_active(&self) -> bool {
        self.night_mode_enabled && self.is_night
    }
}

fn whole_degrees(temperature: Option<f64>) -> Option<i64> {
    temperature
        .filter(|t| t.is_finite())
        .map(|t| t.trunc() as i64)
}

/// Whether one area still needs conditioning relative to its own target.
///
/// Anything the comparison cannot be made on (no mode, an unsupported mode,
/// a missing temperature) counts as still needing air.
pub fn decide_action(
    target_temperature: Option<f64>,
    actual_temperature: Option<f64>,
    hvac_mode: Option<HvacMode>,
) -> Action {
    let (Some(mode), Some(target), Some(actual)) = (
        hvac_mode,
        whole_degrees(target_temperature),
        whole_degrees(actual_temperature),
    ) else {
        return Action::Active;
    };

    match mode {
        HvacMode::Heat if actual >= target => Action::Idle,
        HvacMode::Cool if actual <= target => Action::Idle,
        _ => Action::Active,
    }
}

pub fn decide_cover_action(
    target_temperature: Option<f64>,
    actual_temperature: Option<f64>,
    is_bedroom: bool,
    house: &HouseSnapshot,
) -> CoverAction {
    if house.night_active() {
        return if is_bedroom {
            CoverAction::Open
        } else {
            CoverAction::Close
        };
    }

    // An idle house leaves the central setpoint where it is, so nothing is
    // pushing more air and every damper can open.
    let action = if house.house_action == Action::Idle {
        Action::Active
    } else {
        decide_action(target_temperature, actual_temperature, house.hvac_mode)
    };

    CoverAction::from_action(action)
}

/// Active while any polled area is active; with nothing to poll the house is idle.
pub fn decide_central_action<S: StateStore + ?Sized>(
    areas: &Areas,
    store: &S,
    hvac_mode: Option<HvacMode>,
    night_mode_enabled: bool,
    is_night: bool,
) -> Action {
    let bedrooms_only = night_mode_enabled && is_night;

    let any_active = areas
        .iter()
        .filter(|(_, area)| !bedrooms_only || area.bedroom)
        .any(|(name, area)| {
            let target = area_target_temperature(store, name);
            let actual = area
                .temperature_sensor()
                .and_then(|sensor| sensor_temperature(store, sensor));
            decide_action(target, actual, hvac_mode) == Action::Active
        });

    if any_active {
        Action::Active
    } else {
        Action::Idle
    }
}

pub fn decide_central_setpoint(
    current_temperature: f64,
    hvac_mode: Option<HvacMode>,
    house_action: Action,
) -> f64 {
    if house_action != Action::Active {
        return current_temperature;
    }
    match hvac_mode {
        Some(HvacMode::Heat) => current_temperature + SETPOINT_NUDGE,
        Some(HvacMode::Cool) => current_temperature - SETPOINT_NUDGE,
        _ => current_temperature,
    }
}
