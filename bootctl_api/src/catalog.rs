use std::{collections::HashSet, fs, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{
    constants::DEFAULT_ISCSI_PORT,
    error::{BootctlError, PreconditionError, ReportError},
};

/// Authentication scheme an initiator uses against a target.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum AuthMethod {
    #[default]
    None,
    #[serde(rename = "CHAP")]
    Chap,
}

/// An iSCSI target an initiator can boot from.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TargetDescriptor {
    /// Unique key of the target within the catalog.
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// IQN of the target.
    pub iqn: String,

    /// Portal IP address.
    pub ip: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub lun: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<AuthMethod>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chap_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chap_secret: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_ISCSI_PORT
}

impl TargetDescriptor {
    /// Returns the CHAP username and secret when the target requires CHAP and
    /// both credentials are set.
    pub fn chap_credentials(&self) -> Option<(&str, &str)> {
        if self.auth_method != Some(AuthMethod::Chap) {
            return None;
        }

        match (self.chap_username.as_deref(), self.chap_secret.as_deref()) {
            (Some(user), Some(secret)) if !user.is_empty() && !secret.is_empty() => {
                Some((user, secret))
            }
            _ => None,
        }
    }
}

/// Static list of known targets, loaded once per session.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TargetCatalog {
    #[serde(default)]
    pub targets: Vec<TargetDescriptor>,
}

impl TargetCatalog {
    /// Loads and checks the catalog at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BootctlError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read '{}'", path.display()))
            .structured(PreconditionError::LoadCatalog {
                path: path.display().to_string(),
            })?;

        Self::from_yaml(&contents)
    }

    /// Parses a catalog from YAML and rejects duplicate target names.
    pub fn from_yaml(contents: &str) -> Result<Self, BootctlError> {
        let catalog: TargetCatalog =
            serde_yaml::from_str(contents).structured(PreconditionError::ParseCatalog)?;

        let mut seen = HashSet::new();
        for target in &catalog.targets {
            if !seen.insert(target.name.as_str()) {
                return Err(BootctlError::new(PreconditionError::DuplicateTarget {
                    name: target.name.clone(),
                }));
            }
        }

        Ok(catalog)
    }

    /// Looks up a target by name. A miss is a fatal precondition.
    pub fn get(&self, name: &str) -> Result<&TargetDescriptor, BootctlError> {
        self.targets
            .iter()
            .find(|target| target.name == name)
            .structured(PreconditionError::TargetNotFound {
                name: name.to_string(),
            })
    }
}
