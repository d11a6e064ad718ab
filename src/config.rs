use std::time::Duration;

use url::Url;

use bootctl_api::{
    constants::{
        DEFAULT_CHASSIS_ID, DEFAULT_MANAGER_ID, DEFAULT_SYSTEM_ID, REQUEST_TIMEOUT_SECS,
    },
    error::{BootctlError, PreconditionError, ReportError},
};

use crate::redfish::ResourceLayout;

/// Everything needed to talk to one out-of-band controller. Built explicitly
/// by the caller; there are no fallback credentials.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Base URL of the controller, e.g. `https://10.0.0.5`.
    pub endpoint: Url,

    pub username: String,

    pub password: String,

    /// Whether to verify the controller's TLS certificate. Controllers usually
    /// ship self-signed certificates.
    pub verify_tls: bool,

    /// Timeout of a single request.
    pub request_timeout: Duration,

    /// Ids of the Redfish resources to operate on.
    pub layout: ResourceLayout,
}

impl ControllerConfig {
    /// Builds a config for `server`, which may be a bare host or a URL.
    pub fn new(server: &str, username: &str, password: &str) -> Result<Self, BootctlError> {
        if username.is_empty() || password.is_empty() {
            return Err(BootctlError::new(PreconditionError::MissingCredentials));
        }

        let endpoint = if server.contains("://") {
            server.to_string()
        } else {
            format!("https://{server}")
        };
        let endpoint = Url::parse(&endpoint).structured(PreconditionError::InvalidEndpoint {
            endpoint: server.to_string(),
        })?;
        if endpoint.host_str().is_none() {
            return Err(BootctlError::new(PreconditionError::InvalidEndpoint {
                endpoint: server.to_string(),
            }));
        }

        Ok(Self {
            endpoint,
            username: username.to_string(),
            password: password.to_string(),
            verify_tls: false,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            layout: ResourceLayout::default(),
        })
    }

    pub fn with_verify_tls(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }

    pub fn with_layout(mut self, layout: ResourceLayout) -> Self {
        self.layout = layout;
        self
    }
}

impl Default for ResourceLayout {
    fn default() -> Self {
        Self {
            system_id: DEFAULT_SYSTEM_ID.into(),
            manager_id: DEFAULT_MANAGER_ID.into(),
            chassis_id: DEFAULT_CHASSIS_ID.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bootctl_api::error::ErrorKind;

    #[test]
    fn test_bare_host_gets_https() {
        let config = ControllerConfig::new("10.0.0.5", "root", "calvin").unwrap();
        assert_eq!(config.endpoint.as_str(), "https://10.0.0.5/");
        assert!(!config.verify_tls);
        assert_eq!(config.layout.system_id, "System.Embedded.1");
    }

    #[test]
    fn test_custom_layout() {
        let config = ControllerConfig::new("bmc.lab", "admin", "secret")
            .unwrap()
            .with_verify_tls(true)
            .with_layout(ResourceLayout {
                system_id: "1".into(),
                manager_id: "BMC".into(),
                chassis_id: "1".into(),
            });
        assert!(config.verify_tls);
        assert_eq!(config.layout.system(), "/redfish/v1/Systems/1");
    }

    #[test]
    fn test_explicit_scheme_kept() {
        let config = ControllerConfig::new("http://127.0.0.1:8000", "root", "calvin").unwrap();
        assert_eq!(config.endpoint.as_str(), "http://127.0.0.1:8000/");
    }

    #[test]
    fn test_missing_credentials() {
        let err = ControllerConfig::new("10.0.0.5", "root", "").unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::Precondition(PreconditionError::MissingCredentials)
        );
    }

    #[test]
    fn test_invalid_endpoint() {
        let err = ControllerConfig::new("https://", "root", "calvin").unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::Precondition(PreconditionError::InvalidEndpoint { .. })
        ));
    }
}
