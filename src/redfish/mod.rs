//! Minimal access to the controller's Redfish service: just the resources the
//! iSCSI boot workflow reads and writes.

use anyhow::{bail, Context, Error};
use log::{debug, trace};
use reqwest::{blocking::Client, header::LOCATION, Method};
use serde_json::Value;
use url::Url;

use bootctl_api::constants::REDFISH_ROOT;

use crate::config::ControllerConfig;

pub mod dump;
#[cfg(test)]
pub(crate) mod mock;
pub mod network;
pub mod system;

/// Raw outcome of a request the controller answered. Non-2xx statuses are
/// not errors at this level; callers decide whether a rejection is fatal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RedfishResponse {
    pub status: u16,

    /// Value of the `Location` header, if any.
    pub location: Option<String>,

    pub body: String,
}

impl RedfishResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parses the body as JSON.
    pub fn json(&self) -> Result<Value, Error> {
        serde_json::from_str(&self.body).context("Failed to parse controller response as JSON")
    }

    /// Job id carried by the `Location` header: its last path segment.
    pub fn job_id(&self) -> Option<String> {
        let location = self.location.as_deref()?.trim();
        let path = location.split(['?', '#']).next().unwrap_or(location);
        path.trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }

    /// Best-effort human readable reason for a rejected request.
    pub fn error_message(&self) -> String {
        let extended = self.json().ok().and_then(|json| {
            let error = json.get("error")?;
            error
                .pointer("/@Message.ExtendedInfo/0/Message")
                .or_else(|| error.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        });

        match extended {
            Some(message) => format!("HTTP {}: {message}", self.status),
            None if self.body.trim().is_empty() => format!("HTTP {}", self.status),
            None => format!("HTTP {}: {}", self.status, self.body.trim()),
        }
    }
}

/// Seam between the workflow and the controller. Only failures to get an
/// answer at all are `Err`.
pub trait RedfishTransport {
    fn get(&self, path: &str) -> Result<RedfishResponse, Error>;

    fn patch(&self, path: &str, body: &Value) -> Result<RedfishResponse, Error>;

    fn post(&self, path: &str, body: &Value) -> Result<RedfishResponse, Error>;
}

/// GETs `path` and parses the JSON body, failing on any non-2xx status.
pub fn fetch_json(transport: &dyn RedfishTransport, path: &str) -> Result<Value, Error> {
    let response = transport
        .get(path)
        .with_context(|| format!("Failed to GET '{path}'"))?;
    if !response.is_success() {
        bail!("GET '{path}' was rejected: {}", response.error_message());
    }
    response.json()
}

/// Blocking HTTP transport with basic auth.
pub struct HttpTransport {
    client: Client,
    base: Url,
    username: String,
    password: String,
}

impl HttpTransport {
    pub fn new(config: &ControllerConfig) -> Result<Self, Error> {
        let client = reqwest::blocking::ClientBuilder::new()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base: config.endpoint.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RedfishResponse, Error> {
        let url = self
            .base
            .join(path)
            .with_context(|| format!("Failed to build URL for '{path}'"))?;

        // Bodies may carry CHAP secrets and are not logged
        debug!("{method} {url}");

        let mut request = self
            .client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().context("Failed to send request to controller")?;
        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .context("Failed to read controller response body")?;
        trace!("Response ({status}): {body}");

        Ok(RedfishResponse {
            status,
            location,
            body,
        })
    }
}

impl RedfishTransport for HttpTransport {
    fn get(&self, path: &str) -> Result<RedfishResponse, Error> {
        self.send(Method::GET, path, None)
    }

    fn patch(&self, path: &str, body: &Value) -> Result<RedfishResponse, Error> {
        self.send(Method::PATCH, path, Some(body))
    }

    fn post(&self, path: &str, body: &Value) -> Result<RedfishResponse, Error> {
        self.send(Method::POST, path, Some(body))
    }
}

/// Ids of the resources a session operates on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceLayout {
    pub system_id: String,
    pub manager_id: String,
    pub chassis_id: String,
}

impl ResourceLayout {
    pub fn system(&self) -> String {
        format!("{REDFISH_ROOT}/Systems/{}", self.system_id)
    }

    pub fn reset_action(&self) -> String {
        format!("{}/Actions/ComputerSystem.Reset", self.system())
    }

    pub fn bios_reset_action(&self) -> String {
        format!("{}/Bios/Actions/Bios.ResetBios", self.system())
    }

    pub fn boot_options(&self) -> String {
        format!("{}/BootOptions?$expand=*($levels=1)", self.system())
    }

    pub fn manager(&self) -> String {
        format!("{REDFISH_ROOT}/Managers/{}", self.manager_id)
    }

    pub fn job(&self, job_id: &str) -> String {
        format!("{}/Jobs/{job_id}", self.manager())
    }

    pub fn network_adapters(&self) -> String {
        format!("{REDFISH_ROOT}/Chassis/{}/NetworkAdapters", self.chassis_id)
    }

    /// Device function resource of a NIC. The adapter id is the NIC id up to
    /// its first `-`.
    pub fn nic(&self, nic_id: &str) -> String {
        let adapter = nic_id.split('-').next().unwrap_or(nic_id);
        format!(
            "{}/{adapter}/NetworkDeviceFunctions/{nic_id}",
            self.network_adapters()
        )
    }

    /// Staged settings resource of a NIC.
    pub fn nic_settings(&self, nic_id: &str) -> String {
        format!("{}/Settings", self.nic(nic_id))
    }
}
