//! ESP-IDF MQTT client adapter.
//!
//! Implements [`Publisher`] over `EspMqttClient` (QoS 0, publish only while
//! connected).  Inbound messages are copied into the
//! [`channels`](crate::ota::channels) inbox from the client's event task;
//! the OTA agent never runs on that task.
//!
//! The client uses a clean session, so the broker drops every subscription
//! on disconnect.  Filters are kept in a [`SubscriptionSet`] and replayed
//! by [`restore_subscriptions`](EspMqttPublisher::restore_subscriptions)
//! after each `Connected` event.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use esp_idf_svc::mqtt::client::{
    Details, EspMqttClient, EventPayload, MqttClientConfiguration, QoS,
};
use log::{info, warn};

use crate::adapters::subscriptions::SubscriptionSet;
use crate::app::ports::Publisher;
use crate::error::Error;
use crate::ota::channels;

pub struct EspMqttPublisher {
    client: EspMqttClient<'static>,
    connected: Arc<AtomicBool>,
    subscriptions: SubscriptionSet,
}

impl EspMqttPublisher {
    pub fn connect(url: &str, client_id: &str) -> Result<Self, Error> {
        let connected = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&connected);
        let subscriptions = SubscriptionSet::new();
        let stale = subscriptions.stale_flag();
        let conf = MqttClientConfiguration {
            client_id: Some(client_id),
            ..Default::default()
        };

        let client = EspMqttClient::new_cb(url, &conf, move |event| match event.payload() {
            EventPayload::Connected(_) => {
                info!("MQTT: connected");
                flag.store(true, Ordering::Release);
                stale.store(true, Ordering::Release);
            }
            EventPayload::Disconnected => {
                warn!("MQTT: disconnected");
                flag.store(false, Ordering::Release);
            }
            EventPayload::Received {
                topic: Some(topic),
                data,
                details: Details::Complete,
                ..
            } => {
                channels::enqueue(topic, data);
            }
            EventPayload::Received { data, .. } => {
                warn!("MQTT: chunked message dropped ({} bytes)", data.len());
            }
            EventPayload::Error(e) => warn!("MQTT: {:?}", e),
            _ => {}
        })
        .map_err(|e| {
            warn!("MQTT client init failed: {:?}", e);
            Error::Init("mqtt client")
        })?;

        Ok(Self {
            client,
            connected,
            subscriptions,
        })
    }

    /// Block until the broker session is up or `timeout` elapses.
    pub fn wait_connected(&self, timeout: Duration) -> bool {
        let step = Duration::from_millis(100);
        let mut waited = Duration::ZERO;
        while !self.is_connected() {
            if waited >= timeout {
                return false;
            }
            std::thread::sleep(step);
            waited += step;
        }
        true
    }

    /// Record `filter`; it is subscribed by the next
    /// [`restore_subscriptions`](Self::restore_subscriptions).
    pub fn subscribe(&mut self, filter: &str) -> bool {
        self.subscriptions.add(filter)
    }

    /// Re-subscribe every recorded filter after a (re)connect.  Call from
    /// the dispatch task; a no-op while disconnected or already current.
    pub fn restore_subscriptions(&mut self) -> usize {
        if !self.is_connected() {
            return 0;
        }
        let client = &mut self.client;
        self.subscriptions
            .restore(|filter| match client.subscribe(filter, QoS::AtMostOnce) {
                Ok(_) => {
                    info!("MQTT: subscribed '{}'", filter);
                    true
                }
                Err(e) => {
                    warn!("MQTT: subscribe '{}' failed: {:?}", filter, e);
                    false
                }
            })
    }
}

impl Publisher for EspMqttPublisher {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> bool {
        if !self.is_connected() {
            return false;
        }
        match self.client.publish(topic, QoS::AtMostOnce, false, payload) {
            Ok(_) => true,
            Err(e) => {
                warn!("MQTT: publish '{}' failed: {:?}", topic, e);
                false
            }
        }
    }
}
