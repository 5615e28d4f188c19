use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tracing::{info, warn};

use zoning_common::{
    areas::{all_temperature_sensor_ids, filter_valid_areas},
    state_topic,
    thermostat::ATTR_CURRENT_TEMPERATURE,
    DeviceState, HvacMode, RuntimeConfig,
};

const BASE_TEMPERATURE_F: f64 = 68.0;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let runtime = load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config: {err:#}");
        RuntimeConfig::default()
    });

    let zoned = filter_valid_areas(&runtime.house.areas);
    let sensors: Vec<String> = all_temperature_sensor_ids(&zoned)
        .into_iter()
        .map(str::to_string)
        .collect();
    let central = std::env::var("SIM_CENTRAL_THERMOSTAT")
        .ok()
        .filter(|id| !id.trim().is_empty());

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.mqtt.host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.mqtt.port);

    let mut mqtt_options = MqttOptions::new("zoning-sensor", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.mqtt.user.clone());
    if !mqtt_user.is_empty() {
        let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.mqtt.pass.clone());
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 32);

    tokio::spawn(async move {
        loop {
            if let Err(err) = eventloop.poll().await {
                warn!("sensor mqtt poll error: {err}");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    });

    info!(
        "sensor simulator started for {} sensors{}",
        sensors.len(),
        if central.is_some() { " and the central thermostat" } else { "" }
    );

    let mut tick: u64 = 0;
    let mut interval = tokio::time::interval(Duration::from_secs(30));

    loop {
        interval.tick().await;
        tick = tick.saturating_add(1);

        for (index, sensor) in sensors.iter().enumerate() {
            let reading = sensor_state(simulated_temperature(index, tick));
            publish_state(&mqtt, sensor, &reading)
                .await
                .with_context(|| format!("failed to publish {sensor}"))?;
        }

        if let Some(central) = &central {
            let reading = central_state(simulated_temperature(sensors.len(), tick));
            publish_state(&mqtt, central, &reading)
                .await
                .with_context(|| format!("failed to publish {central}"))?;
        }
    }
}

async fn load_runtime_config() -> anyhow::Result<RuntimeConfig> {
    let data_dir = std::env::var("ZONING_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.zoning"));
    let path = data_dir.join("runtime.json");

    match tokio::fs::read_to_string(&path).await {
        Ok(raw) => Ok(RuntimeConfig::from_json(&raw)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(RuntimeConfig::default()),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

async fn publish_state(
    mqtt: &AsyncClient,
    entity_id: &str,
    state: &DeviceState,
) -> anyhow::Result<()> {
    let body = serde_json::to_vec(state)?;
    mqtt.publish(state_topic(entity_id), QoS::AtLeastOnce, true, body)
        .await?;
    Ok(())
}

/// Each sensor sweeps a narrow band, offset so rooms disagree.
fn simulated_temperature(index: usize, tick: u64) -> f64 {
    let step = (tick + index as u64 * 3) % 10;
    let sweep = if step < 5 { step } else { 10 - step };
    let offset = (index % 4) as f64 * 0.5;
    ((BASE_TEMPERATURE_F + offset + sweep as f64 * 0.4) * 10.0).round() / 10.0
}

fn sensor_state(temperature: f64) -> DeviceState {
    DeviceState::new(format!("{temperature:.1}"))
}

fn central_state(temperature: f64) -> DeviceState {
    DeviceState::new(HvacMode::Heat.as_str())
        .with_attribute(ATTR_CURRENT_TEMPERATURE, temperature)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn temperatures_stay_in_band() {
        for index in 0..6 {
            for tick in 0..40 {
                let temperature = simulated_temperature(index, tick);
                assert!((68.0..=71.5).contains(&temperature), "{temperature}");
            }
        }
    }

    #[test]
    fn sensors_start_out_of_phase() {
        assert_eq!(simulated_temperature(0, 0), 68.0);
        assert_eq!(simulated_temperature(1, 0), 69.7);
    }

    #[test]
    fn published_states_parse_back() {
        assert_eq!(sensor_state(69.24).temperature(), Some(69.2));

        let central = central_state(70.0);
        assert_eq!(central.hvac_mode(), Some(HvacMode::Heat));
        assert_eq!(
            central.attribute_temperature(ATTR_CURRENT_TEMPERATURE),
            Some(70.0)
        );
    }
}
