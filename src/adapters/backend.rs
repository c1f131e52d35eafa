//! Backend HTTP relay adapter — the [`BackendPort`] boundary.
//!
//! The backend accepts a JSON batch via POST and answers 201 on
//! success; everything else (including connection failure) is a
//! failure that triggers the flash fallback upstream.
//!
//! - **`target_os = "espidf"`**: `esp_http_client` from ESP-IDF.
//! - **other targets**: a simulation that refuses every Nth post, so
//!   host demos exercise the persist/retry path.

use log::{info, warn};

use crate::ports::{BackendError, BackendPort};

pub struct HttpBackendAdapter {
    url: String,
    #[cfg(not(target_os = "espidf"))]
    sim_posts: u32,
    #[cfg(not(target_os = "espidf"))]
    sim_refuse_every: u32,
}

impl HttpBackendAdapter {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_owned(),
            #[cfg(not(target_os = "espidf"))]
            sim_posts: 0,
            #[cfg(not(target_os = "espidf"))]
            sim_refuse_every: 4,
        }
    }

    #[cfg(target_os = "espidf")]
    fn post(&self, body: &str) -> Result<u16, BackendError> {
        use esp_idf_svc::sys::*;
        use std::ffi::CString;

        let url = CString::new(self.url.as_str()).map_err(|_| BackendError::ConnectionFailed)?;
        let content_type = c"application/json";
        let header_key = c"Content-Type";

        // SAFETY: the client handle is used and cleaned up entirely
        // within this call; the CStrings outlive every use.
        unsafe {
            let mut config: esp_http_client_config_t = core::mem::zeroed();
            config.url = url.as_ptr();
            config.method = esp_http_client_method_t_HTTP_METHOD_POST;
            config.timeout_ms = 5_000;

            let client = esp_http_client_init(&config);
            if client.is_null() {
                return Err(BackendError::ConnectionFailed);
            }

            esp_http_client_set_header(client, header_key.as_ptr(), content_type.as_ptr());
            esp_http_client_set_post_field(client, body.as_ptr() as *const _, body.len() as i32);

            let err = esp_http_client_perform(client);
            let status = esp_http_client_get_status_code(client) as u16;
            esp_http_client_cleanup(client);

            if err != ESP_OK {
                return Err(BackendError::ConnectionFailed);
            }
            Ok(status)
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn post(&mut self, body: &str) -> Result<u16, BackendError> {
        self.sim_posts += 1;
        // Periodic refusal exercises the flash-fallback path in demos.
        if self.sim_refuse_every > 0 && self.sim_posts % self.sim_refuse_every == 0 {
            warn!("Backend(sim): refusing post #{} to {}", self.sim_posts, self.url);
            return Ok(500);
        }
        info!(
            "Backend(sim): accepted {}-byte batch (post #{})",
            body.len(),
            self.sim_posts
        );
        Ok(201)
    }
}

impl BackendPort for HttpBackendAdapter {
    fn post_json(&mut self, body: &str) -> Result<(), BackendError> {
        match self.post(body)? {
            201 => Ok(()),
            code => Err(BackendError::Rejected(code)),
        }
    }
}
