//! WiFi station adapter — the [`ConnectivityPort`] boundary.
//!
//! The uplink client owns the Idle/Connecting/Connected state machine
//! and its timeout; this adapter only kicks the radio and reports
//! association.
//!
//! - **`target_os = "espidf"`**: wraps `esp_idf_svc::wifi::EspWifi`
//!   configured as a station.
//! - **other targets**: a simulation that associates two polls after
//!   `start_connect`, so host tests exercise the Connecting state.

use log::info;

use crate::ports::{ConnectivityPort, LinkError};

pub struct WifiAdapter {
    #[cfg(target_os = "espidf")]
    wifi: esp_idf_svc::wifi::EspWifi<'static>,

    #[cfg(not(target_os = "espidf"))]
    sim: SimState,
}

#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
struct SimState {
    pending: bool,
    polls_left: std::cell::Cell<u8>,
    associated: std::cell::Cell<bool>,
}

#[cfg(target_os = "espidf")]
impl WifiAdapter {
    /// Take an already-constructed driver, configure station mode, and
    /// start the radio. Association happens later via the port.
    pub fn new(
        mut wifi: esp_idf_svc::wifi::EspWifi<'static>,
        ssid: &str,
        password: &str,
    ) -> Result<Self, crate::Error> {
        use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};

        let config = Configuration::Client(ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| crate::Error::Init("ssid too long"))?,
            password: password
                .try_into()
                .map_err(|_| crate::Error::Init("password too long"))?,
            auth_method: if password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        });
        wifi.set_configuration(&config)
            .map_err(|_| crate::Error::Init("wifi configuration rejected"))?;
        wifi.start()
            .map_err(|_| crate::Error::Init("wifi start failed"))?;
        info!("Wifi: station started (SSID '{ssid}')");
        Ok(Self { wifi })
    }
}

#[cfg(not(target_os = "espidf"))]
impl WifiAdapter {
    pub fn new() -> Self {
        info!("Wifi: simulation backend");
        Self {
            sim: SimState::default(),
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityPort for WifiAdapter {
    #[cfg(target_os = "espidf")]
    fn start_connect(&mut self) -> Result<(), LinkError> {
        self.wifi.connect().map_err(|_| LinkError::ConnectFailed)
    }

    #[cfg(not(target_os = "espidf"))]
    fn start_connect(&mut self) -> Result<(), LinkError> {
        self.sim.pending = true;
        self.sim.polls_left.set(2);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn is_associated(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn is_associated(&self) -> bool {
        if self.sim.associated.get() {
            return true;
        }
        if self.sim.pending {
            let left = self.sim.polls_left.get();
            if left <= 1 {
                self.sim.associated.set(true);
                return true;
            }
            self.sim.polls_left.set(left - 1);
        }
        false
    }

    #[cfg(target_os = "espidf")]
    fn disconnect(&mut self) {
        let _ = self.wifi.disconnect();
    }

    #[cfg(not(target_os = "espidf"))]
    fn disconnect(&mut self) {
        self.sim.pending = false;
        self.sim.associated.set(false);
    }
}
