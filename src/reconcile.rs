//! Reduces a server with several iSCSI-enabled NICs to a single boot path.

use std::collections::BTreeMap;

use log::{info, warn};

use bootctl_api::error::{BootctlError, ControllerError, PreconditionError, ReportError};

use crate::{
    apply::{ConfigurationClient, RebootPolicy},
    attributes::BootAttributeGroup,
    reboot::RebootCoordinator,
    redfish::{network, RedfishTransport, ResourceLayout},
    validation,
};

/// iSCSI view of one NIC, read fresh for each pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NicIscsiState {
    pub nic_id: String,
    pub iscsi_configured: bool,
    pub primary_target_name: Option<String>,
    pub primary_target_ip: Option<String>,

    /// Every `key=value` line of the NIC's property dump.
    pub snapshot: BTreeMap<String, String>,
}

impl NicIscsiState {
    /// Derives the state from a property dump. A NIC counts as configured
    /// when it has an iSCSI boot section naming a primary target.
    pub fn from_properties(nic_id: &str, properties: &str) -> Self {
        let primary_target_name = validation::field_value(properties, "PrimaryTargetName");
        let snapshot = properties
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect();

        Self {
            nic_id: nic_id.to_string(),
            iscsi_configured: validation::has_iscsi_section(properties)
                && primary_target_name.is_some(),
            primary_target_ip: validation::field_value(properties, "PrimaryTargetIPAddress"),
            primary_target_name,
            snapshot,
        }
    }
}

/// Outcome of a reconciliation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub kept: Vec<String>,
    pub disabled_ok: Vec<String>,
    pub disabled_failed: Vec<String>,

    /// Whether the closing reboot was requested successfully.
    pub rebooted: bool,
}

pub struct MultiNicReconciler<'a> {
    transport: &'a dyn RedfishTransport,
    layout: &'a ResourceLayout,
    client: ConfigurationClient<'a>,
    coordinator: RebootCoordinator<'a>,
}

impl<'a> MultiNicReconciler<'a> {
    pub fn new(
        transport: &'a dyn RedfishTransport,
        layout: &'a ResourceLayout,
        client: ConfigurationClient<'a>,
        coordinator: RebootCoordinator<'a>,
    ) -> Self {
        Self {
            transport,
            layout,
            client,
            coordinator,
        }
    }

    /// Lists every NIC the controller exposes, in enumeration order.
    pub fn discover(&self) -> Result<Vec<String>, BootctlError> {
        network::discover_nics(self.transport, self.layout)
            .structured(ControllerError::EnumerateNics)
    }

    /// Reads the iSCSI state of each NIC, one at a time.
    pub fn inspect(&self, nic_ids: &[String]) -> Result<Vec<NicIscsiState>, BootctlError> {
        nic_ids
            .iter()
            .map(|nic_id| {
                let properties = network::nic_properties(self.transport, self.layout, nic_id)
                    .structured(ControllerError::ReadNic {
                        nic: nic_id.clone(),
                    })?;
                Ok(NicIscsiState::from_properties(nic_id, &properties))
            })
            .collect()
    }

    /// Disables iSCSI boot on every configured NIC except `primary_nic_id`,
    /// then reboots once if anything was disabled and `reboot` is set.
    ///
    /// Refuses to write anything when the primary NIC is not among the
    /// configured ones.
    pub fn reconcile_to_single_primary(
        &self,
        nic_ids: &[String],
        primary_nic_id: &str,
        reboot: bool,
        force: bool,
    ) -> Result<ReconcileSummary, BootctlError> {
        let states = self.inspect(nic_ids)?;

        if !states
            .iter()
            .any(|state| state.iscsi_configured && state.nic_id == primary_nic_id)
        {
            return Err(BootctlError::new(PreconditionError::PrimaryNicNotConfigured {
                nic: primary_nic_id.to_string(),
            }));
        }

        let mut summary = ReconcileSummary::default();
        for state in &states {
            if !state.iscsi_configured {
                continue;
            }
            if state.nic_id == primary_nic_id {
                info!(
                    "Keeping iSCSI boot on primary NIC '{}' (target {})",
                    state.nic_id,
                    state.primary_target_name.as_deref().unwrap_or("unknown")
                );
                summary.kept.push(state.nic_id.clone());
                continue;
            }

            info!("Disabling iSCSI boot on NIC '{}'", state.nic_id);
            match self.client.apply(
                &state.nic_id,
                &[BootAttributeGroup::disable()],
                RebootPolicy::Deferred,
            ) {
                Ok(result) if result.writes.rejected_count() == 0 => {
                    summary.disabled_ok.push(state.nic_id.clone())
                }
                Ok(_) => {
                    warn!("Controller rejected clearing iSCSI boot on NIC '{}'", state.nic_id);
                    summary.disabled_failed.push(state.nic_id.clone());
                }
                Err(e) => {
                    warn!(
                        "Failed to disable iSCSI boot on NIC '{}': {e:?}",
                        state.nic_id
                    );
                    summary.disabled_failed.push(state.nic_id.clone());
                }
            }
        }

        if reboot && !summary.disabled_ok.is_empty() {
            summary.rebooted = self.coordinator.reboot(force);
            if !summary.rebooted {
                warn!("[reboot] Changes are staged and will apply at the next manual reboot");
            }
        }

        tracing::info!(
            metric_name = "reconcile_completed",
            kept = summary.kept.len(),
            disabled = summary.disabled_ok.len(),
            failed = summary.disabled_failed.len()
        );

        Ok(summary)
    }
}
