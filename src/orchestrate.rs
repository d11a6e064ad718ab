//! The workflows behind each command, composed from the components.

use std::time::Duration;

use log::{info, warn};

use bootctl_api::{
    catalog::TargetCatalog,
    constants::REBOOT_POLL_INTERVAL_SECS,
    error::{
        ApplyError, BootctlError, ControllerError, InternalError, PreconditionError, ReportError,
    },
};

use crate::{
    apply::{ApplyResult, ConfigurationClient, RebootPolicy, RebootStatus, SettingsTarget},
    attributes::{build_attribute_groups, BuildOptions},
    bootorder::{self, BootClass, BootOrderResolver},
    reboot::{RebootCoordinator, RebootWait, Sleeper},
    reconcile::{MultiNicReconciler, NicIscsiState, ReconcileSummary},
    redfish::{network, system, RedfishTransport, ResourceLayout},
    validation::{self, ValidationResult},
};

/// Inputs of `configure-target`.
#[derive(Clone, Debug, Default)]
pub struct ConfigureRequest {
    pub nic_id: String,
    pub target: String,
    pub secondary_target: Option<String>,
    pub initiator_name: Option<String>,
    pub gateway: Option<String>,

    /// Apply immediately and restart instead of deferring to the next reboot.
    pub reboot: bool,

    /// After a restart, wait this long for the server to power back on before
    /// validating.
    pub wait_timeout: Option<Duration>,
}

#[derive(Debug)]
pub struct ConfigureOutcome {
    pub apply: ApplyResult,
    pub wait: Option<RebootWait>,

    /// `None` when the NIC could not be read back.
    pub validation: Option<ValidationResult>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootOrderOutcome {
    pub slot: String,
    pub order: Vec<String>,

    /// Whether a reboot was requested successfully; `None` when not asked to.
    pub rebooted: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisableOutcome {
    /// `--list-only`: the current state of every NIC, nothing written.
    Listed(Vec<NicIscsiState>),
    Reconciled(ReconcileSummary),
}

/// One controller session. All work is sequential.
pub struct Orchestrator<'a> {
    transport: &'a dyn RedfishTransport,
    layout: &'a ResourceLayout,
    sleeper: &'a dyn Sleeper,
    settings_target: SettingsTarget,
    poll_interval: Duration,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        transport: &'a dyn RedfishTransport,
        layout: &'a ResourceLayout,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            transport,
            layout,
            sleeper,
            settings_target: SettingsTarget::default(),
            poll_interval: Duration::from_secs(REBOOT_POLL_INTERVAL_SECS),
        }
    }

    pub fn with_settings_target(mut self, target: SettingsTarget) -> Self {
        self.settings_target = target;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn client(&self) -> ConfigurationClient<'a> {
        ConfigurationClient::new(self.transport, self.layout)
            .with_settings_target(self.settings_target)
    }

    fn coordinator(&self) -> RebootCoordinator<'a> {
        RebootCoordinator::new(self.transport, self.layout, self.sleeper)
    }

    /// Writes the boot configuration for a catalog target to a NIC, then reads
    /// it back and validates it.
    pub fn configure_target(
        &self,
        catalog: &TargetCatalog,
        request: &ConfigureRequest,
    ) -> Result<ConfigureOutcome, BootctlError> {
        let primary = catalog.get(&request.target)?;
        let secondary = request
            .secondary_target
            .as_deref()
            .map(|name| catalog.get(name))
            .transpose()?;

        let groups = build_attribute_groups(
            primary,
            &BuildOptions {
                secondary,
                initiator_name: request.initiator_name.as_deref(),
                gateway: request.gateway.as_deref(),
            },
        );
        info!(
            "Configuring NIC '{}' to boot from '{}' ({})",
            request.nic_id, primary.name, primary.iqn
        );

        let client = self.client();
        client.probe_firmware();

        let policy = if request.reboot {
            RebootPolicy::Immediate
        } else {
            RebootPolicy::Deferred
        };
        let apply = client.apply(&request.nic_id, &groups, policy)?;
        if let Some(state) = client.job_state(&apply.job) {
            info!("Job state: {state}");
        }

        let wait = match (request.wait_timeout, &apply.reboot) {
            (Some(timeout), RebootStatus::Issued) => Some(
                self.coordinator()
                    .wait_for_power_on(timeout, self.poll_interval),
            ),
            _ => None,
        };

        // Staged values only show on the device function once the server has
        // been seen back on after a reset.
        let live =
            wait == Some(RebootWait::Online) || self.settings_target == SettingsTarget::Direct;
        let properties = if live {
            network::nic_properties(self.transport, self.layout, &request.nic_id)
        } else {
            info!(
                "Changes to NIC '{}' are pending a reset; validating the staged settings",
                request.nic_id
            );
            network::nic_staged_properties(self.transport, self.layout, &request.nic_id)
        };
        let validation = match properties {
            Ok(properties) => {
                let result = validation::validate(&properties, Some(&primary.iqn));
                result.report(&request.nic_id);
                Some(result)
            }
            Err(e) => {
                warn!(
                    "[validation] Could not read back NIC '{}': {e:#}",
                    request.nic_id
                );
                None
            }
        };

        Ok(ConfigureOutcome {
            apply,
            wait,
            validation,
        })
    }

    /// Moves the first device of `class` to the front of the boot order.
    pub fn set_boot_order(
        &self,
        class: BootClass,
        reboot: bool,
    ) -> Result<BootOrderOutcome, BootctlError> {
        let text = system::boot_order_text(self.transport, self.layout)
            .structured(ControllerError::ReadBootOrder)?;

        let resolver = BootOrderResolver::new()
            .structured(InternalError::Internal("Invalid built-in boot classification rules"))?;
        let slot = resolver.resolve_slot(&text, class).structured(
            PreconditionError::BootDeviceNotFound {
                class: class.to_string(),
            },
        )?;

        let current: Vec<String> = resolver
            .parse(&text)
            .into_iter()
            .map(|device| device.slot_id)
            .collect();
        let order = bootorder::promote(&current, &slot);
        info!("Setting boot order to {order:?}");

        system::set_boot_order(self.transport, self.layout, &order)
            .structured(ApplyError::SetBootOrder)?;

        let rebooted = reboot.then(|| self.coordinator().reboot(false));
        Ok(BootOrderOutcome {
            slot,
            order,
            rebooted,
        })
    }

    /// Leaves iSCSI boot configured only on `primary_nic_id`. With
    /// `list_only`, reports the current state and writes nothing.
    pub fn disable_redundant(
        &self,
        primary_nic_id: &str,
        list_only: bool,
        reboot: bool,
        force: bool,
    ) -> Result<DisableOutcome, BootctlError> {
        let reconciler = MultiNicReconciler::new(
            self.transport,
            self.layout,
            self.client(),
            self.coordinator(),
        );

        let nic_ids = reconciler.discover()?;
        if list_only {
            return reconciler.inspect(&nic_ids).map(DisableOutcome::Listed);
        }

        reconciler
            .reconcile_to_single_primary(&nic_ids, primary_nic_id, reboot, force)
            .map(DisableOutcome::Reconciled)
    }

    /// Reads a NIC back and validates it. Mismatches are reported, not
    /// raised.
    pub fn validate(
        &self,
        nic_id: &str,
        expected_iqn: Option<&str>,
    ) -> Result<ValidationResult, BootctlError> {
        let properties = network::nic_properties(self.transport, self.layout, nic_id).structured(
            ControllerError::ReadNic {
                nic: nic_id.to_string(),
            },
        )?;

        let result = validation::validate(&properties, expected_iqn);
        result.report(nic_id);
        Ok(result)
    }

    /// Resets BIOS settings to factory defaults and optionally reboots to apply
    /// them. Returns whether a reboot was requested successfully.
    pub fn reset_to_defaults(&self, reboot: bool) -> Result<Option<bool>, BootctlError> {
        system::reset_bios(self.transport, self.layout).structured(ApplyError::ResetBios)?;
        info!("BIOS reset to defaults scheduled");

        if !reboot {
            info!("BIOS defaults will take effect at the next reboot");
            return Ok(None);
        }
        Ok(Some(self.coordinator().reboot(false)))
    }
}

/// Renders NIC states as a fixed-width table.
pub fn render_nic_table(states: &[NicIscsiState]) -> String {
    let width = states
        .iter()
        .map(|state| state.nic_id.len())
        .max()
        .unwrap_or(0)
        .max("NIC".len());

    let mut table = format!("{:<width$}  {:<5}  {}\n", "NIC", "ISCSI", "TARGET");
    for state in states {
        table.push_str(&format!(
            "{:<width$}  {:<5}  {}\n",
            state.nic_id,
            if state.iscsi_configured { "yes" } else { "no" },
            match (&state.primary_target_name, &state.primary_target_ip) {
                (Some(name), Some(ip)) => format!("{name} @ {ip}"),
                (Some(name), None) => name.clone(),
                _ => "-".to_string(),
            }
        ));
    }
    table
}
