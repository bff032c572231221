use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use ll_core::color::XyColor;
use ll_core::config::Config;
use ll_core::driver::Driver;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from applying state to the lamps.
#[derive(Debug, Error)]
pub enum ActuatorError {
    /// The bridge answered with a non-success status or reported errors in
    /// the response body.
    #[error("Hue bridge error: {status}: {body}")]
    Api { status: u16, body: String },

    /// Some of the lights in one `apply_state` call could not be updated.
    #[error("{failed} of {total} lights failed to update (first error: {first})")]
    Partial {
        failed: usize,
        total: usize,
        first: String,
    },

    /// Transport failure: connection refused, TLS, timeout, bad JSON.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ActuatorError>;

// ---------------------------------------------------------------------------
// Light state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Power {
    pub on: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimming {
    /// Percentage, 0.0 ..= 100.0.
    pub brightness: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub xy: XyColor,
}

/// Body of a light update, as the bridge expects it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightState {
    pub on: Power,
    pub dimming: Dimming,
    pub color: Color,
}

impl LightState {
    pub fn new(xy: XyColor, brightness: f64) -> Self {
        Self {
            on: Power { on: true },
            dimming: Dimming {
                brightness: brightness.clamp(0.0, 100.0),
            },
            color: Color { xy },
        }
    }

    /// Full brightness in the driver's team colour.
    pub fn for_driver(driver: &Driver) -> Self {
        Self::new(driver.xy_colour(), 100.0)
    }
}

/// Id of a light service on the bridge (the `rid` of a `light` service).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LightId(pub String);

impl fmt::Display for LightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Device resources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub rid: String,
    pub rtype: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductData {
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub manufacturer_name: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub software_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub archetype: String,
}

/// A device from `GET /clip/v2/resource/device`. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub product_data: ProductData,
    #[serde(default)]
    pub services: Vec<Service>,
}

impl Device {
    /// The device's light service, if it has one.
    pub fn light_id(&self) -> Option<LightId> {
        self.services
            .iter()
            .find(|s| s.rtype == "light")
            .map(|s| LightId(s.rid.clone()))
    }
}

#[derive(Debug, Deserialize)]
struct ResourceList<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    errors: Vec<BridgeMessage>,
}

#[derive(Debug, Deserialize)]
struct BridgeMessage {
    #[serde(default)]
    description: String,
}

// ---------------------------------------------------------------------------
// Actuator trait
// ---------------------------------------------------------------------------

/// Applies one light state to a set of lights.
#[async_trait]
pub trait LampActuator: Send + Sync {
    async fn apply_state(&self, state: &LightState, lights: &[LightId]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

const APP_KEY_HEADER: &str = "hue-application-key";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Philips Hue bridge, CLIP v2 API.
///
/// Bridges serve a self-signed certificate, so certificate validation is
/// disabled for this client only.
#[derive(Clone)]
pub struct HueBridge {
    base_url: String,
    app_key: String,
    client: reqwest::Client,
}

impl fmt::Debug for HueBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HueBridge")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HueBridge {
    /// Bridge reachable at `https://{bridge_ip}`.
    pub fn new(bridge_ip: &str, app_key: &str) -> Result<Self> {
        Self::with_base_url(&format!("https://{bridge_ip}"), app_key)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.bridge_ip, &config.username)
    }

    /// Bridge at an explicit base URL (scheme included).
    pub fn with_base_url(base_url: &str, app_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            app_key: app_key.to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -- request helpers ----------------------------------------------------

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ActuatorError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    fn errors_to_result(status: u16, errors: &[BridgeMessage]) -> Result<()> {
        if errors.is_empty() {
            return Ok(());
        }
        let body = errors
            .iter()
            .map(|e| e.description.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Err(ActuatorError::Api { status, body })
    }

    // -- resources ----------------------------------------------------------

    pub async fn list_devices(&self) -> Result<Vec<Device>> {
        let url = format!("{}/clip/v2/resource/device", self.base_url);
        let resp = self
            .client
            .get(&url)
            .header(APP_KEY_HEADER, &self.app_key)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let list: ResourceList<Device> = Self::check(resp).await?.json().await?;
        Self::errors_to_result(status, &list.errors)?;
        debug!(devices = list.data.len(), "listed bridge devices");
        Ok(list.data)
    }

    /// Light-service ids of every device that has one.
    pub async fn list_lights(&self) -> Result<Vec<LightId>> {
        let lights: Vec<LightId> = self
            .list_devices()
            .await?
            .iter()
            .filter_map(Device::light_id)
            .collect();
        info!(lights = lights.len(), "found Hue lights");
        Ok(lights)
    }

    pub async fn set_light(&self, light: &LightId, state: &LightState) -> Result<()> {
        let url = format!("{}/clip/v2/resource/light/{}", self.base_url, light);
        let resp = self
            .client
            .put(&url)
            .header(APP_KEY_HEADER, &self.app_key)
            .json(state)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let list: ResourceList<serde_json::Value> = Self::check(resp).await?.json().await?;
        Self::errors_to_result(status, &list.errors)
    }
}

#[async_trait]
impl LampActuator for HueBridge {
    async fn apply_state(&self, state: &LightState, lights: &[LightId]) -> Result<()> {
        if lights.is_empty() {
            debug!("no lights to update");
            return Ok(());
        }

        let results = join_all(lights.iter().map(|id| self.set_light(id, state))).await;

        let mut failed = 0;
        let mut first = None;
        for (id, result) in lights.iter().zip(results) {
            if let Err(e) = result {
                warn!(light = %id, error = %e, "light update failed");
                failed += 1;
                first.get_or_insert_with(|| e.to_string());
            }
        }

        if let Some(first) = first {
            return Err(ActuatorError::Partial {
                failed,
                total: lights.len(),
                first,
            });
        }
        debug!(lights = lights.len(), "updated lights in parallel");
        Ok(())
    }
}
