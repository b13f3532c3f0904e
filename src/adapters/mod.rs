//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements          | Connects to                  |
//! |----------------|---------------------|------------------------------|
//! | `device_id`    | —                   | eFuse MAC / provisioning     |
//! | `json`         | JsonExtractor       | serde_json                   |
//! | `log_sink`     | EventSink           | Serial log output            |
//! |                | ImageSink           | Serial log output            |
//! | `mqtt_streams` | BlockTransfer       | MQTT streams (JSON + base64) |
//! | `subscriptions`| —                   | filters replayed on reconnect|
//! | `time`         | —                   | ESP32 system timer           |
//! | `mqtt_client`  | Publisher           | ESP-IDF MQTT client          |
//! | `wifi`         | —                   | ESP-IDF WiFi STA             |

pub mod device_id;
pub mod json;
pub mod log_sink;
pub mod mqtt_streams;
pub mod subscriptions;
pub mod time;

#[cfg(target_os = "espidf")]
pub mod mqtt_client;
#[cfg(target_os = "espidf")]
pub mod wifi;
