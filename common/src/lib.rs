pub mod areas;
pub mod config;
pub mod cycle;
pub mod decision;
pub mod error;
pub mod events;
pub mod night;
pub mod store;
pub mod thermostat;
pub mod topics;
pub mod types;

pub use config::{AreaConfig, Areas, HouseConfig, MqttConfig, RuntimeConfig};
pub use cycle::{
    run_decision_cycle, AreaOutcome, AreaReport, CycleReport, SkipReason, ZoningCommand,
};
pub use decision::{
    decide_action, decide_central_action, decide_central_setpoint, decide_cover_action,
    HouseSnapshot,
};
pub use error::ConfigError;
pub use events::{StateChangeEvent, TriggerSet};
pub use night::{is_night_at, is_night_now, local_time};
pub use store::StateStore;
pub use thermostat::{virtual_thermostat_id, AreaThermostat, AreaThermostats};
pub use topics::*;
pub use types::{Action, CoverAction, DeviceState, HvacMode};
