use chrono::NaiveTime;
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    areas::{central_thermostat_id, filter_valid_areas, is_night_mode_enabled},
    config::HouseConfig,
    decision::{
        decide_central_action, decide_central_setpoint, decide_cover_action, HouseSnapshot,
    },
    night::is_night_at,
    store::{area_target_temperature, central_reading, sensor_temperature, StateStore},
    thermostat::{virtual_thermostat_id, ATTR_TEMPERATURE},
    types::{Action, CoverAction, HvacMode},
};

pub const DOMAIN_COVER: &str = "cover";
pub const DOMAIN_CLIMATE: &str = "climate";
pub const SERVICE_SET_TEMPERATURE: &str = "set_temperature";

/// A fire-and-forget request for the host to act on one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ZoningCommand {
    OpenCover { entity_id: String },
    CloseCover { entity_id: String },
    SetTemperature { entity_id: String, temperature: f64 },
}

impl ZoningCommand {
    pub fn cover(action: CoverAction, entity_id: &str) -> Self {
        let entity_id = entity_id.to_string();
        match action {
            CoverAction::Open => Self::OpenCover { entity_id },
            CoverAction::Close => Self::CloseCover { entity_id },
        }
    }

    pub fn domain(&self) -> &'static str {
        match self {
            Self::OpenCover { .. } | Self::CloseCover { .. } => DOMAIN_COVER,
            Self::SetTemperature { .. } => DOMAIN_CLIMATE,
        }
    }

    pub fn service(&self) -> &'static str {
        match self {
            Self::OpenCover { .. } => CoverAction::Open.service(),
            Self::CloseCover { .. } => CoverAction::Close.service(),
            Self::SetTemperature { .. } => SERVICE_SET_TEMPERATURE,
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            Self::OpenCover { entity_id }
            | Self::CloseCover { entity_id }
            | Self::SetTemperature { entity_id, .. } => entity_id,
        }
    }

    pub fn service_data(&self) -> Value {
        match self {
            Self::SetTemperature {
                entity_id,
                temperature,
            } => json!({ "entity_id": entity_id, ATTR_TEMPERATURE: temperature }),
            _ => json!({ "entity_id": self.entity_id() }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ThermostatUnavailable,
    SensorUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AreaOutcome {
    Decided { cover_action: CoverAction },
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaReport {
    pub area: String,
    pub target_temperature: Option<f64>,
    pub actual_temperature: Option<f64>,
    #[serde(flatten)]
    pub outcome: AreaOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub central_thermostat: String,
    pub central_temperature: f64,
    pub hvac_mode: Option<HvacMode>,
    pub house_action: Action,
    pub night_mode_enabled: bool,
    pub is_night: bool,
    pub setpoint: Option<f64>,
    pub areas: Vec<AreaReport>,
    pub commands: Vec<ZoningCommand>,
}

/// Recomputes every damper and the central setpoint from the current states.
///
/// Returns `None`, and asks for nothing, when there is no central thermostat
/// or it has no usable reading. Areas whose own thermostat or sensor is
/// unavailable are reported as skipped and get no commands.
pub fn run_decision_cycle<S: StateStore + ?Sized>(
    config: &HouseConfig,
    store: &S,
    now: NaiveTime,
) -> Option<CycleReport> {
    let central_id = central_thermostat_id(&config.areas)?;
    let central = central_reading(store, central_id)?;

    let areas = filter_valid_areas(&config.areas);
    let night_mode_enabled = is_night_mode_enabled(&areas);
    let is_night = is_night_at(config.bed_time, config.wake_time, now);

    let house_action =
        decide_central_action(&areas, store, central.hvac_mode, night_mode_enabled, is_night);
    let house = HouseSnapshot {
        hvac_mode: central.hvac_mode,
        house_action,
        night_mode_enabled,
        is_night,
        control_central_thermostat: config.control_central_thermostat,
    };

    let mut commands = Vec::new();
    let mut reports = Vec::with_capacity(areas.len());

    for (name, area) in &areas {
        let target = store
            .available_state(&virtual_thermostat_id(name))
            .and_then(|_| area_target_temperature(store, name));
        let actual = area
            .temperature_sensor()
            .and_then(|sensor| sensor_temperature(store, sensor));

        let outcome = match (target, actual) {
            (None, _) => AreaOutcome::Skipped {
                reason: SkipReason::ThermostatUnavailable,
            },
            (_, None) => AreaOutcome::Skipped {
                reason: SkipReason::SensorUnavailable,
            },
            (Some(_), Some(_)) => {
                let cover_action = decide_cover_action(target, actual, area.bedroom, &house);
                commands.extend(
                    area.covers
                        .iter()
                        .map(|cover| ZoningCommand::cover(cover_action, cover)),
                );
                AreaOutcome::Decided { cover_action }
            }
        };

        reports.push(AreaReport {
            area: name.clone(),
            target_temperature: target,
            actual_temperature: actual,
            outcome,
        });
    }

    let setpoint = house.control_central_thermostat.then(|| {
        decide_central_setpoint(central.current_temperature, central.hvac_mode, house_action)
    });
    if let Some(temperature) = setpoint {
        commands.push(ZoningCommand::SetTemperature {
            entity_id: central_id.to_string(),
            temperature,
        });
    }

    Some(CycleReport {
        central_thermostat: central_id.to_string(),
        central_temperature: central.current_temperature,
        hvac_mode: central.hvac_mode,
        house_action,
        night_mode_enabled,
        is_night,
        setpoint,
        areas: reports,
        commands,
    })
}
