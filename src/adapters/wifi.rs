//! ESP-IDF WiFi station bring-up.
//!
//! Blocks until the station has an IP address.  Reconnection after a drop
//! is left to the ESP-IDF WiFi driver; the MQTT client reconnects on its
//! own once the link is back.

use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use log::{info, warn};

use crate::error::Error;

pub fn connect(
    modem: Modem,
    sysloop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
    ssid: &str,
    password: &str,
) -> Result<BlockingWifi<EspWifi<'static>>, Error> {
    let driver = EspWifi::new(modem, sysloop.clone(), Some(nvs))
        .map_err(|_| Error::Init("wifi driver"))?;
    let mut wifi = BlockingWifi::wrap(driver, sysloop).map_err(|_| Error::Init("wifi event loop"))?;

    let config = Configuration::Client(ClientConfiguration {
        ssid: ssid.try_into().map_err(|()| Error::Init("wifi ssid too long"))?,
        password: password
            .try_into()
            .map_err(|()| Error::Init("wifi password too long"))?,
        auth_method: if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        },
        ..Default::default()
    });
    wifi.set_configuration(&config)
        .map_err(|_| Error::Init("wifi configuration"))?;

    wifi.start().map_err(|_| Error::Init("wifi start"))?;
    info!("WiFi: connecting to '{}'", ssid);
    wifi.connect().map_err(|e| {
        warn!("WiFi: connect failed: {:?}", e);
        Error::Init("wifi connect")
    })?;
    wifi.wait_netif_up().map_err(|_| Error::Init("wifi netif"))?;
    info!("WiFi: up");
    Ok(wifi)
}
