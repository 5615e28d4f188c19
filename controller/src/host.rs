use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use tokio::{
    net::TcpListener,
    sync::{mpsc, Mutex},
};
use tracing::{debug, info, warn};

use zoning_common::{
    areas::{central_thermostat_id, filter_valid_areas, is_night_mode_enabled},
    area_from_target_topic, command_topic, controller_area_topic, entity_from_state_topic,
    is_night_now, local_time, run_decision_cycle, AreaOutcome, AreaThermostat, AreaThermostats,
    CycleReport, DeviceState, HouseConfig, RuntimeConfig, StateChangeEvent, TriggerSet,
    ZoningCommand, TOPIC_CMD_AREA_TARGET_ALL, TOPIC_CONTROLLER_STATE, TOPIC_STATE_ALL,
};

#[derive(Clone)]
struct AppState {
    house: Arc<HouseConfig>,
    triggers: Arc<TriggerSet>,
    devices: Arc<Mutex<HashMap<String, DeviceState>>>,
    thermostats: Arc<Mutex<AreaThermostats>>,
    last_report: Arc<Mutex<Option<CycleReport>>>,
    timezone: Arc<Mutex<Tz>>,
    tasks: mpsc::UnboundedSender<HostTask>,
    mqtt: AsyncClient,
    store: AppStore,
}

/// Work handed from the MQTT and HTTP handlers to the host worker. Only the
/// worker publishes, so the MQTT poll task never waits on its own queue.
#[derive(Debug, Clone, PartialEq)]
enum HostTask {
    PublishThermostat(AreaThermostat),
    PersistTargets,
    RunCycle,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    targets_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct StatusView {
    timezone: String,
    night_mode_enabled: bool,
    is_night: bool,
    control_central_thermostat: bool,
    last_cycle: Option<CycleReport>,
}

#[derive(Debug, Deserialize)]
struct TimezoneUpdate {
    timezone: String,
}

#[derive(Debug, Serialize)]
struct TimeStatus {
    timezone: String,
    local_time: String,
    is_night: bool,
    now_epoch: i64,
}

const MAX_MQTT_PAYLOAD_BYTES: usize = 4096;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();

    let targets = store.load_targets().await.unwrap_or_else(|err| {
        warn!("failed to load area targets from store: {err:#}");
        HashMap::new()
    });

    let zoned = filter_valid_areas(&runtime.house.areas);
    if zoned.is_empty() {
        warn!("no area has both dampers and a temperature sensor; nothing to zone");
    }
    if central_thermostat_id(&runtime.house.areas).is_none() {
        warn!("no central thermostat configured; decision cycles will not run");
    }

    let mut thermostats = AreaThermostat::for_areas(&zoned);
    for (area, thermostat) in thermostats.iter_mut() {
        if let Some(target) = targets.get(area) {
            thermostat.set_target_temperature(*target);
        }
    }

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.mqtt.host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.mqtt.port);

    let mut mqtt_options = MqttOptions::new("zoning-controller", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.mqtt.user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.mqtt.pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let night_mode = is_night_mode_enabled(&zoned);
    let timezone = runtime.time_zone();
    let (app_state, tasks) = AppState::new(runtime.house, thermostats, timezone, mqtt, store);
    info!(
        "zoning {} areas, watching {} entities",
        zoned.len(),
        app_state.triggers.len()
    );

    subscribe_topics(&app_state.mqtt).await?;
    spawn_host_worker(app_state.clone(), tasks);
    spawn_mqtt_loop(app_state.clone(), eventloop);
    if night_mode {
        spawn_night_watch_loop(app_state.clone());
    }

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/config", get(handle_get_config))
        .route("/api/areas", get(handle_get_areas))
        .route("/api/areas/{area}/target", post(handle_set_area_target))
        .route("/api/time", get(handle_get_time))
        .route("/api/timezone", put(handle_put_timezone))
        .with_state(app_state);

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

impl AppState {
    fn new(
        house: HouseConfig,
        thermostats: AreaThermostats,
        timezone: Tz,
        mqtt: AsyncClient,
        store: AppStore,
    ) -> (Self, mpsc::UnboundedReceiver<HostTask>) {
        let devices: HashMap<String, DeviceState> = thermostats
            .values()
            .map(|thermostat| {
                (
                    thermostat.entity_id().to_string(),
                    thermostat.to_device_state(),
                )
            })
            .collect();
        let (tasks, receiver) = mpsc::unbounded_channel();

        let state = Self {
            triggers: Arc::new(TriggerSet::from_config(&house)),
            house: Arc::new(house),
            devices: Arc::new(Mutex::new(devices)),
            thermostats: Arc::new(Mutex::new(thermostats)),
            last_report: Arc::new(Mutex::new(None)),
            timezone: Arc::new(Mutex::new(timezone)),
            tasks,
            mqtt,
            store,
        };
        (state, receiver)
    }

    fn queue(&self, task: HostTask) {
        if self.tasks.send(task).is_err() {
            warn!("host worker stopped; dropping queued task");
        }
    }
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    for topic in [TOPIC_STATE_ALL, TOPIC_CMD_AREA_TARGET_ALL] {
        mqtt.subscribe(topic, QoS::AtMostOnce)
            .await
            .with_context(|| format!("failed to subscribe to {topic}"))?;
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

/// Publishes and decision cycles run here, one at a time. A burst of
/// triggers collapses into a single cycle.
fn spawn_host_worker(app_state: AppState, mut tasks: mpsc::UnboundedReceiver<HostTask>) {
    tokio::spawn(async move {
        while let Some(task) = tasks.recv().await {
            let mut pending = Some(task);
            let mut cycle = false;
            let mut persist = false;

            while let Some(task) = pending {
                match task {
                    HostTask::PublishThermostat(thermostat) => {
                        publish_thermostat(&app_state.mqtt, &thermostat).await;
                    }
                    HostTask::PersistTargets => persist = true,
                    HostTask::RunCycle => cycle = true,
                }
                pending = tasks.try_recv().ok();
            }

            if persist {
                if let Err(err) = persist_targets(&app_state).await {
                    warn!("failed to persist area targets: {err:#}");
                }
            }
            if cycle {
                run_cycle(&app_state).await;
            }
        }
    });
}

/// Re-runs the cycle when the sleep window opens or closes, since no device
/// event marks those moments.
fn spawn_night_watch_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        let mut was_night: Option<bool> = None;

        loop {
            interval.tick().await;
            let tz = *app_state.timezone.lock().await;
            let night = is_night_now(app_state.house.bed_time, app_state.house.wake_time, &tz);

            if was_night.is_some_and(|previous| previous != night) {
                info!("night window {}", if night { "opened" } else { "closed" });
                app_state.queue(HostTask::RunCycle);
            }
            was_night = Some(night);
        }
    });
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    if let Some(entity_id) = entity_from_state_topic(&topic) {
        let new_state = parse_state_payload(&payload)
            .with_context(|| format!("invalid state payload for {entity_id}"))?;
        handle_state_change(app_state, entity_id, new_state).await;
        return Ok(());
    }

    if let Some(area) = area_from_target_topic(&topic) {
        let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;
        let target = message
            .trim()
            .parse::<f64>()
            .with_context(|| format!("invalid target temperature `{message}` for {area}"))?;
        if set_area_target(app_state, area, target).await.is_none() {
            warn!("ignoring target for unknown area {area}");
        }
    }

    Ok(())
}

async fn handle_state_change(
    app_state: &AppState,
    entity_id: &str,
    new_state: Option<DeviceState>,
) {
    if !app_state.triggers.is_watched(entity_id) {
        return;
    }

    let (event, mirrored) = {
        let mut thermostats = app_state.thermostats.lock().await;
        if thermostats
            .values()
            .any(|thermostat| thermostat.entity_id() == entity_id)
        {
            debug!("ignoring external state for controller-owned {entity_id}");
            return;
        }
        let mut devices = app_state.devices.lock().await;

        let event = apply_state(&mut devices, entity_id, new_state);
        let mirrored: Vec<AreaThermostat> =
            mirror_into_thermostats(&app_state.house, &mut thermostats, &event)
                .iter()
                .filter_map(|area| thermostats.get(area))
                .cloned()
                .collect();
        for thermostat in &mirrored {
            devices.insert(
                thermostat.entity_id().to_string(),
                thermostat.to_device_state(),
            );
        }
        (event, mirrored)
    };

    for thermostat in mirrored {
        app_state.queue(HostTask::PublishThermostat(thermostat));
    }

    if app_state.triggers.should_trigger(&event) {
        debug!("state change on {} triggers a decision cycle", event.entity_id);
        app_state.queue(HostTask::RunCycle);
    }
}

/// Returns `None` when the area is not zoned.
async fn set_area_target(
    app_state: &AppState,
    area: &str,
    target: f64,
) -> Option<AreaThermostat> {
    let (thermostat, event) = {
        let mut thermostats = app_state.thermostats.lock().await;
        let thermostat = thermostats.get_mut(area)?;
        if !thermostat.set_target_temperature(target) {
            return Some(thermostat.clone());
        }
        let thermostat = thermostat.clone();

        let mut devices = app_state.devices.lock().await;
        let event = apply_state(
            &mut devices,
            thermostat.entity_id(),
            Some(thermostat.to_device_state()),
        );
        (thermostat, event)
    };

    info!(
        "area {area} target set to {}",
        thermostat.target_temperature()
    );
    app_state.queue(HostTask::PublishThermostat(thermostat.clone()));
    app_state.queue(HostTask::PersistTargets);

    if app_state.triggers.should_trigger(&event) {
        app_state.queue(HostTask::RunCycle);
    }
    Some(thermostat)
}

async fn run_cycle(app_state: &AppState) {
    let Some(report) = evaluate_cycle(app_state).await else {
        return;
    };

    execute_commands(&app_state.mqtt, &report.commands).await;

    match serde_json::to_vec(&report) {
        Ok(body) => {
            if let Err(err) = app_state
                .mqtt
                .publish(TOPIC_CONTROLLER_STATE, QoS::AtLeastOnce, true, body)
                .await
            {
                warn!("controller state publish failed: {err}");
            }
        }
        Err(err) => warn!("cycle report serialization failed: {err}"),
    }

    *app_state.last_report.lock().await = Some(report);
}

/// Runs the decision engine over the current device snapshot.
async fn evaluate_cycle(app_state: &AppState) -> Option<CycleReport> {
    let tz = *app_state.timezone.lock().await;
    let report = {
        let devices = app_state.devices.lock().await;
        run_decision_cycle(&app_state.house, &*devices, local_time(&tz))
    };

    let Some(report) = report else {
        warn!("central thermostat has no usable reading; skipping decision cycle");
        return None;
    };

    for area in &report.areas {
        if let AreaOutcome::Skipped { reason } = area.outcome {
            debug!("area {} skipped: {reason:?}", area.area);
        }
    }
    info!(
        "house {} in {:?}, {} commands{}",
        report.house_action.as_str(),
        report.hvac_mode,
        report.commands.len(),
        if report.night_mode_enabled && report.is_night {
            " (night mode)"
        } else {
            ""
        }
    );
    Some(report)
}

async fn execute_commands(mqtt: &AsyncClient, commands: &[ZoningCommand]) {
    for command in commands {
        let topic = command_topic(command);
        debug!("dispatching {topic} for {}", command.entity_id());
        if let Err(err) = mqtt
            .publish(
                topic,
                QoS::AtLeastOnce,
                false,
                command.service_data().to_string(),
            )
            .await
        {
            warn!("command publish failed for {}: {err}", command.entity_id());
        }
    }
}

async fn publish_thermostat(mqtt: &AsyncClient, thermostat: &AreaThermostat) {
    let body = match serde_json::to_vec(&thermostat.to_device_state()) {
        Ok(body) => body,
        Err(err) => {
            warn!("thermostat serialization failed: {err}");
            return;
        }
    };
    if let Err(err) = mqtt
        .publish(
            controller_area_topic(thermostat.area()),
            QoS::AtLeastOnce,
            true,
            body,
        )
        .await
    {
        warn!("thermostat publish failed for {}: {err}", thermostat.area());
    }
}

/// An empty payload means the entity was removed.
fn parse_state_payload(payload: &[u8]) -> anyhow::Result<Option<DeviceState>> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(payload)?))
}

fn apply_state(
    devices: &mut HashMap<String, DeviceState>,
    entity_id: &str,
    new_state: Option<DeviceState>,
) -> StateChangeEvent {
    let old_state = match &new_state {
        Some(state) => devices.insert(entity_id.to_string(), state.clone()),
        None => devices.remove(entity_id),
    };
    StateChangeEvent {
        entity_id: entity_id.to_string(),
        old_state,
        new_state,
    }
}

/// Copies central mode and area sensor readings into the virtual thermostats.
/// Returns the areas whose thermostat changed.
fn mirror_into_thermostats(
    house: &HouseConfig,
    thermostats: &mut AreaThermostats,
    event: &StateChangeEvent,
) -> Vec<String> {
    let mut changed = Vec::new();
    let available = event.new_state.as_ref().filter(|state| state.is_available());

    if central_thermostat_id(&house.areas) == Some(event.entity_id.as_str()) {
        let mode = available.and_then(DeviceState::hvac_mode);
        for (area, thermostat) in thermostats.iter_mut() {
            if thermostat.set_hvac_mode(mode) {
                changed.push(area.clone());
            }
        }
    }

    for (area, config) in &house.areas {
        if config.temperature_sensor() != Some(event.entity_id.as_str()) {
            continue;
        }
        if let Some(thermostat) = thermostats.get_mut(area) {
            if thermostat.set_current_temperature(available.and_then(DeviceState::temperature))
                && !changed.contains(area)
            {
                changed.push(area.clone());
            }
        }
    }

    changed
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let tz = *state.timezone.lock().await;
    let zoned = filter_valid_areas(&state.house.areas);

    Json(StatusView {
        timezone: tz.name().to_string(),
        night_mode_enabled: is_night_mode_enabled(&zoned),
        is_night: is_night_now(state.house.bed_time, state.house.wake_time, &tz),
        control_central_thermostat: state.house.control_central_thermostat,
        last_cycle: state.last_report.lock().await.clone(),
    })
}

async fn handle_get_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.house.as_ref().clone())
}

async fn handle_get_areas(State(state): State<AppState>) -> impl IntoResponse {
    let thermostats: Vec<AreaThermostat> =
        state.thermostats.lock().await.values().cloned().collect();
    Json(thermostats)
}

async fn handle_set_area_target(
    State(state): State<AppState>,
    Path(area): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(target) = value.parse::<f64>().ok().filter(|t| t.is_finite()) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid temperature value");
    };

    match set_area_target(&state, &area, target).await {
        Some(thermostat) => Json(thermostat).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Unknown or unzoned area"),
    }
}

async fn handle_get_time(State(state): State<AppState>) -> impl IntoResponse {
    let tz = *state.timezone.lock().await;
    Json(TimeStatus {
        timezone: tz.name().to_string(),
        local_time: local_time(&tz).format("%H:%M:%S").to_string(),
        is_night: is_night_now(state.house.bed_time, state.house.wake_time, &tz),
        now_epoch: Utc::now().timestamp(),
    })
}

async fn handle_put_timezone(
    State(state): State<AppState>,
    Json(update): Json<TimezoneUpdate>,
) -> impl IntoResponse {
    let mut runtime = match state.store.load_runtime_config().await {
        Ok(runtime) => runtime,
        Err(err) => {
            warn!("failed to load runtime config for timezone update: {err:#}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load runtime settings",
            );
        }
    };

    let tz = match runtime.set_timezone(&update.timezone) {
        Ok(tz) => tz,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    if let Err(err) = state.store.save_runtime_config(&runtime).await {
        warn!("failed to persist timezone update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist runtime settings",
        );
    }

    *state.timezone.lock().await = tz;
    handle_get_time(State(state)).await.into_response()
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("ZONING_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.zoning"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            targets_path: Arc::new(data_dir.join("targets.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read_to_string(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(RuntimeConfig::from_json(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.runtime_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(runtime)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }

    async fn load_targets(&self) -> anyhow::Result<HashMap<String, f64>> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.targets_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_targets(&self, targets: &HashMap<String, f64>) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.targets_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(targets)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

async fn persist_targets(state: &AppState) -> anyhow::Result<()> {
    let targets: HashMap<String, f64> = state
        .thermostats
        .lock()
        .await
        .iter()
        .map(|(area, thermostat)| (area.clone(), thermostat.target_temperature()))
        .collect();
    state.store.save_targets(&targets).await
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
