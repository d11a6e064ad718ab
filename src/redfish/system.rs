use anyhow::{bail, Context, Error};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{fetch_json, RedfishTransport, ResourceLayout};

/// Power state reported by the system resource.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, strum_macros::Display)]
pub enum PowerState {
    On,
    Off,
    PoweringOn,
    PoweringOff,
    #[serde(other)]
    Unknown,
}

/// Reset types the workflow issues.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, strum_macros::Display)]
pub enum ResetType {
    GracefulRestart,
    ForceRestart,
    On,
}

/// Reads `PowerState` from the system resource.
pub fn power_state(
    transport: &dyn RedfishTransport,
    layout: &ResourceLayout,
) -> Result<PowerState, Error> {
    let system = fetch_json(transport, &layout.system())?;
    let state = system
        .get("PowerState")
        .context("System resource has no PowerState")?;
    serde_json::from_value(state.clone()).context("Failed to parse PowerState")
}

/// Issues a reset action on the system.
pub fn reset(
    transport: &dyn RedfishTransport,
    layout: &ResourceLayout,
    reset_type: ResetType,
) -> Result<(), Error> {
    debug!("Issuing {reset_type} reset");
    let response = transport
        .post(&layout.reset_action(), &json!({ "ResetType": reset_type }))
        .context("Failed to send reset action")?;
    if !response.is_success() {
        bail!("{reset_type} reset was rejected: {}", response.error_message());
    }
    Ok(())
}

/// Resets BIOS settings to their factory defaults. Takes effect on the next
/// reboot.
pub fn reset_bios(transport: &dyn RedfishTransport, layout: &ResourceLayout) -> Result<(), Error> {
    let response = transport
        .post(&layout.bios_reset_action(), &json!({}))
        .context("Failed to send BIOS reset action")?;
    if !response.is_success() {
        bail!("BIOS reset was rejected: {}", response.error_message());
    }
    Ok(())
}

/// Reads the current boot order and renders it as `BootXXXX: label` lines.
/// Labels come from the BootOptions collection; slots without one keep only
/// their id.
pub fn boot_order_text(
    transport: &dyn RedfishTransport,
    layout: &ResourceLayout,
) -> Result<String, Error> {
    let order = boot_order(transport, layout)?;

    let labels = match fetch_json(transport, &layout.boot_options()) {
        Ok(options) => boot_option_labels(&options),
        Err(e) => {
            debug!("Boot option labels unavailable: {e:?}");
            Vec::new()
        }
    };

    Ok(order
        .iter()
        .map(|slot| {
            match labels.iter().find(|(id, _)| id.eq_ignore_ascii_case(slot)) {
                Some((_, label)) => format!("{slot}: {label}"),
                None => slot.clone(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Reads `Boot.BootOrder` from the system resource.
pub fn boot_order(
    transport: &dyn RedfishTransport,
    layout: &ResourceLayout,
) -> Result<Vec<String>, Error> {
    let system = fetch_json(transport, &layout.system())?;
    Ok(system
        .pointer("/Boot/BootOrder")
        .and_then(Value::as_array)
        .map(|order| {
            order
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default())
}

fn boot_option_labels(options: &Value) -> Vec<(String, String)> {
    options
        .get("Members")
        .and_then(Value::as_array)
        .map(|members| {
            members
                .iter()
                .filter_map(|member| {
                    let id = member
                        .get("BootOptionReference")
                        .or_else(|| member.get("Id"))?
                        .as_str()?;
                    let label = member
                        .get("DisplayName")
                        .or_else(|| member.get("Name"))?
                        .as_str()?;
                    Some((id.to_string(), label.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Writes a new boot order.
pub fn set_boot_order(
    transport: &dyn RedfishTransport,
    layout: &ResourceLayout,
    order: &[String],
) -> Result<(), Error> {
    let response = transport
        .patch(&layout.system(), &json!({ "Boot": { "BootOrder": order } }))
        .context("Failed to send boot order")?;
    if !response.is_success() {
        bail!("Boot order was rejected: {}", response.error_message());
    }
    Ok(())
}

/// Reads the controller's firmware version.
pub fn firmware_version(
    transport: &dyn RedfishTransport,
    layout: &ResourceLayout,
) -> Result<String, Error> {
    let manager = fetch_json(transport, &layout.manager())?;
    manager
        .get("FirmwareVersion")
        .and_then(Value::as_str)
        .map(str::to_string)
        .context("Manager resource has no FirmwareVersion")
}

/// Reads the `JobState` of a controller job.
pub fn job_state(
    transport: &dyn RedfishTransport,
    layout: &ResourceLayout,
    job_id: &str,
) -> Result<String, Error> {
    let job = fetch_json(transport, &layout.job(job_id))?;
    job.get("JobState")
        .and_then(Value::as_str)
        .map(str::to_string)
        .context("Job resource has no JobState")
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::redfish::{mock::MockTransport, RedfishResponse};

    fn layout() -> ResourceLayout {
        ResourceLayout::default()
    }

    #[test]
    fn test_power_state() {
        let transport = MockTransport::new().get_json(
            layout().system(),
            json!({ "PowerState": "PoweringOn" }),
        );
        assert_eq!(
            power_state(&transport, &layout()).unwrap(),
            PowerState::PoweringOn
        );

        let transport = MockTransport::new()
            .get_json(layout().system(), json!({ "PowerState": "Paused" }));
        assert_eq!(
            power_state(&transport, &layout()).unwrap(),
            PowerState::Unknown
        );

        let transport = MockTransport::new().get_json(layout().system(), json!({}));
        power_state(&transport, &layout()).unwrap_err();
    }

    #[test]
    fn test_reset_body() {
        let transport = MockTransport::new().route(
            "POST",
            layout().reset_action(),
            RedfishResponse::new(204),
        );
        reset(&transport, &layout(), ResetType::GracefulRestart).unwrap();
        assert_eq!(
            transport.calls()[0].body,
            Some(json!({ "ResetType": "GracefulRestart" }))
        );

        let transport = MockTransport::new().route(
            "POST",
            layout().reset_action(),
            RedfishResponse::new(409),
        );
        let err = reset(&transport, &layout(), ResetType::On).unwrap_err();
        assert!(err.to_string().contains("HTTP 409"));
    }

    #[test]
    fn test_boot_order_text() {
        let transport = MockTransport::new()
            .get_json(
                layout().system(),
                json!({ "Boot": { "BootOrder": ["Boot0001", "Boot0002", "Boot0005"] } }),
            )
            .get_json(
                layout().boot_options(),
                json!({ "Members": [
                    { "Id": "Boot0001", "DisplayName": "Hard Drive C:" },
                    { "Id": "Boot0002", "DisplayName": "PXE Device 1" }
                ]}),
            );
        assert_eq!(
            boot_order_text(&transport, &layout()).unwrap(),
            "Boot0001: Hard Drive C:\nBoot0002: PXE Device 1\nBoot0005"
        );
    }

    #[test]
    fn test_boot_order_text_without_labels() {
        let transport = MockTransport::new().get_json(
            layout().system(),
            json!({ "Boot": { "BootOrder": ["Boot0003"] } }),
        );
        assert_eq!(boot_order_text(&transport, &layout()).unwrap(), "Boot0003");
    }

    #[test]
    fn test_firmware_and_job() {
        let transport = MockTransport::new()
            .get_json(layout().manager(), json!({ "FirmwareVersion": "5.10.50.00" }))
            .get_json(layout().job("JID_1"), json!({ "JobState": "Scheduled" }));
        assert_eq!(
            firmware_version(&transport, &layout()).unwrap(),
            "5.10.50.00"
        );
        assert_eq!(
            job_state(&transport, &layout(), "JID_1").unwrap(),
            "Scheduled"
        );
    }
}
