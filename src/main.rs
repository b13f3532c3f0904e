//! OTA jobs firmware: main entry point.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     Adapters (outer ring)                     │
//! │                                                               │
//! │  wifi            EspMqttPublisher   MqttStreamsJson           │
//! │  (STA link)      (Publisher)        (BlockTransfer)           │
//! │  LogEventSink    LogImageSink       SerdeJsonExtractor        │
//! │  (EventSink)     (ImageSink)        (JsonExtractor)           │
//! │                                                               │
//! │  ──────────────── Port Trait Boundary ───────────────────     │
//! │                                                               │
//! │  ┌────────────────────────────────────────────────────────┐   │
//! │  │      OtaAgent (pure logic, one dispatch task)          │   │
//! │  │  router · JobLifecycleManager · BlockDownloadSession   │   │
//! │  └────────────────────────────────────────────────────────┘   │
//! │                                                               │
//! │  MQTT event task ──▶ channels::INBOUND_CHANNEL ──▶ dispatch   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use core::fmt::Write;
use std::time::Duration;

use anyhow::{Result, anyhow};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{info, warn};

use ota_jobs::adapters::device_id;
use ota_jobs::adapters::json::SerdeJsonExtractor;
use ota_jobs::adapters::log_sink::{LogEventSink, LogImageSink};
use ota_jobs::adapters::mqtt_client::EspMqttPublisher;
use ota_jobs::adapters::mqtt_streams::MqttStreamsJson;
use ota_jobs::adapters::time::MonotonicClock;
use ota_jobs::adapters::wifi;
use ota_jobs::config::{MAX_FILE_SIZE, OtaConfig, TOPIC_BUFFER_SIZE};
use ota_jobs::identity::DeviceIdentity;
use ota_jobs::jobs::JobUpdateStatus;
use ota_jobs::jobs::topics::{
    TOPIC_PREFIX, as_topic, build_start_next_accepted_topic, build_update_result_filter,
};
use ota_jobs::ota::{OtaAgent, channels};

/// Dispatch task stack: the agent holds the reassembly buffer inline.
const DISPATCH_STACK_BYTES: usize = MAX_FILE_SIZE + 32 * 1024;

/// Interval between dispatch passes.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How often an idle device asks for work.
const START_NEXT_INTERVAL_MS: u64 = 30_000;

type Agent = OtaAgent<MqttStreamsJson, LogImageSink, SerdeJsonExtractor>;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;
    info!("OTA jobs v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Network ────────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;
    let _wifi = wifi::connect(
        peripherals.modem,
        sysloop,
        nvs,
        option_env!("OTA_WIFI_SSID").unwrap_or_default(),
        option_env!("OTA_WIFI_PASS").unwrap_or_default(),
    )?;

    // ── 3. Identity + config ──────────────────────────────────
    let identity =
        device_id::resolve_identity(option_env!("OTA_THING_NAME"), &device_id::read_mac())
            .map_err(|e| anyhow!("device identity: {e}"))?;
    let config = OtaConfig::default();
    info!("Device identity: {}", identity);

    // ── 4. MQTT ───────────────────────────────────────────────
    let url = option_env!("OTA_MQTT_URL").unwrap_or("mqtt://192.168.1.10:1883");
    let mut mqtt = EspMqttPublisher::connect(url, identity.as_str())?;
    if !mqtt.wait_connected(Duration::from_secs(30)) {
        warn!("MQTT: broker not reachable yet, continuing");
    }
    subscribe_jobs(&mut mqtt, identity.as_str());
    mqtt.restore_subscriptions();

    // ── 5. Dispatch task ──────────────────────────────────────
    let dispatch = std::thread::Builder::new()
        .name("ota-dispatch".into())
        .stack_size(DISPATCH_STACK_BYTES)
        .spawn(move || dispatch_loop(identity, config, mqtt))?;
    dispatch
        .join()
        .map_err(|_| anyhow!("dispatch task panicked"))??;
    Ok(())
}

fn subscribe_jobs(mqtt: &mut EspMqttPublisher, device_id: &str) {
    let mut buf = [0u8; TOPIC_BUFFER_SIZE];
    if let Some(topic) = build_start_next_accepted_topic(device_id, &mut buf)
        .and_then(|len| as_topic(&buf, len))
    {
        mqtt.subscribe(topic);
    }
    for status in [JobUpdateStatus::Accepted, JobUpdateStatus::Rejected] {
        let mut buf = [0u8; TOPIC_BUFFER_SIZE];
        if let Some(filter) =
            build_update_result_filter(device_id, status, &mut buf).and_then(|len| as_topic(&buf, len))
        {
            mqtt.subscribe(filter);
        }
    }
    // Block data for whichever stream the active job points at.
    let mut streams = heapless::String::<TOPIC_BUFFER_SIZE>::new();
    if write!(streams, "{}{}/streams/+/data/json", TOPIC_PREFIX, device_id).is_ok() {
        mqtt.subscribe(&streams);
    }
}

/// Owns the agent for the life of the firmware.  The agent is built here
/// so that its buffer lives on this task's stack only.
fn dispatch_loop(identity: DeviceIdentity, config: OtaConfig, mut mqtt: EspMqttPublisher) -> Result<()> {
    let transfer = MqttStreamsJson::new(&config.client_token);
    let mut agent = Agent::new(identity, config, transfer, LogImageSink::new(), SerdeJsonExtractor)?;
    let clock = MonotonicClock::new();
    let mut sink = LogEventSink::new();
    let mut last_start: Option<u64> = None;

    loop {
        let now = clock.uptime_ms();
        mqtt.restore_subscriptions();

        channels::drain(|msg| {
            if !agent.route(&msg.topic, &msg.payload, now, &mut mqtt, &mut sink) {
                info!("Unhandled message on '{}' ({} bytes)", msg.topic, msg.payload.len());
            }
        });
        agent.tick(now, &mut mqtt, &mut sink);

        if agent.is_idle()
            && last_start.is_none_or(|t| now.saturating_sub(t) >= START_NEXT_INTERVAL_MS)
        {
            agent.start(&mut mqtt, &mut sink);
            last_start = Some(now);
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}
