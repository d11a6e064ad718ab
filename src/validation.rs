//! Checks a NIC's property dump against the configuration that was written.
//! Validation is advisory; callers log the result and carry on.

use log::{info, warn};
use regex::Regex;

use bootctl_api::constants::ISCSI_BOOT_SECTION;

/// Fields a usable iSCSI boot configuration always carries.
pub const REQUIRED_FIELDS: &[&str] = &["PrimaryTargetName", "PrimaryTargetIPAddress", "PrimaryLUN"];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub ok: bool,
    pub reasons: Vec<String>,
}

impl ValidationResult {
    /// Logs the result, one warning per reason.
    pub fn report(&self, nic_id: &str) {
        if self.ok {
            info!("iSCSI boot configuration of NIC '{nic_id}' looks correct");
        } else {
            for reason in &self.reasons {
                warn!("[validation] NIC '{nic_id}': {reason}");
            }
        }
    }
}

/// Whether the dump contains an iSCSI boot section at all.
pub fn has_iscsi_section(properties: &str) -> bool {
    let section = ISCSI_BOOT_SECTION.to_ascii_lowercase();
    properties
        .lines()
        .any(|line| line.to_ascii_lowercase().contains(&section))
}

/// Value of `field` in a dump, accepting `Field=value`, `Field: value` and
/// section-prefixed keys such as `iSCSIBoot.Field=value`. Empty values count
/// as absent.
pub fn field_value(properties: &str, field: &str) -> Option<String> {
    let pattern = format!(
        r"(?im)^[ \t]*(?:[\w#.-]*[.#])?{}[ \t]*[=:][ \t]*(.*?)[ \t\r]*$",
        regex::escape(field)
    );
    // The pattern is built from an escaped literal and always compiles.
    let re = Regex::new(&pattern).ok()?;
    let value = re
        .captures_iter(properties)
        .filter_map(|captures| captures.get(1))
        .map(|value| value.as_str().to_string())
        .find(|value| !value.is_empty());
    value
}

/// Validates a NIC property dump. Every check runs; all failures are
/// reported together.
pub fn validate(properties: &str, expected_target_iqn: Option<&str>) -> ValidationResult {
    let mut reasons = Vec::new();

    if !has_iscsi_section(properties) {
        reasons.push(format!("No {ISCSI_BOOT_SECTION} attribute section found"));
    }

    if let Some(expected) = expected_target_iqn {
        match field_value(properties, "PrimaryTargetName") {
            Some(actual) if actual == expected => {}
            Some(actual) => reasons.push(format!(
                "PrimaryTargetName is '{actual}', expected '{expected}'"
            )),
            None => reasons.push(format!(
                "PrimaryTargetName is not set, expected '{expected}'"
            )),
        }
    }

    for field in REQUIRED_FIELDS {
        if field_value(properties, field).is_none() {
            reasons.push(format!("Required field {field} is missing"));
        }
    }

    ValidationResult {
        ok: reasons.is_empty(),
        reasons,
    }
}
