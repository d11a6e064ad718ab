//! Writes attribute groups to a NIC's settings resource and commits them.
//!
//! Group writes are soft: a rejected group is recorded and the sequence goes
//! on, since firmware commonly refuses unsupported attribute combinations
//! while accepting the critical subset. The apply-time directive that follows
//! is the only fatal write.

use log::{debug, info, warn};
use serde_json::json;

use bootctl_api::{
    constants::{MIN_KNOWN_GOOD_FIRMWARE, SETTINGS_APPLY_TIME_KEY},
    error::{ApplyError, BootctlError, ReportError},
};

use crate::{
    attributes::{BootAttributeGroup, GroupKind},
    redfish::{
        system::{self, ResetType},
        RedfishTransport, ResourceLayout,
    },
};

/// Whether staged changes should take effect right away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebootPolicy {
    /// Apply now and restart the server.
    Immediate,

    /// Leave changes staged until the next reboot.
    Deferred,
}

/// When the controller commits staged settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum ApplyTime {
    Immediate,
    OnReset,
}

impl From<RebootPolicy> for ApplyTime {
    fn from(policy: RebootPolicy) -> Self {
        match policy {
            RebootPolicy::Immediate => ApplyTime::Immediate,
            RebootPolicy::Deferred => ApplyTime::OnReset,
        }
    }
}

/// Which resource the attribute groups are written to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SettingsTarget {
    /// The `/Settings` resource holding pending changes.
    #[default]
    Staged,

    /// The device function resource itself.
    Direct,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    /// The controller returned a job id.
    Pending,

    /// The controller returned no job; changes may have been applied
    /// synchronously.
    Unknown,
}

/// Controller job created by committing the settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplyJob {
    pub id: Option<String>,
    pub apply_time: ApplyTime,
    pub state: JobState,
}

impl ApplyJob {
    pub fn is_tracked(&self) -> bool {
        self.id.is_some()
    }
}

/// Progress of one configuration session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Unconfigured,
    AttributesStaged,
    ApplyTimeSet,
    RebootRequested,
    Deferred,
    Done,
    Failed,
}

/// Outcome of writing one group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupOutcome {
    pub kind: GroupKind,

    /// Rejection reason; `None` when the controller accepted the group.
    pub rejection: Option<String>,
}

impl GroupOutcome {
    pub fn accepted(&self) -> bool {
        self.rejection.is_none()
    }
}

/// Collects group outcomes through the write loop.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteLog {
    pub outcomes: Vec<GroupOutcome>,
}

impl WriteLog {
    fn accept(&mut self, kind: GroupKind) {
        debug!("Attribute group '{kind}' accepted");
        self.outcomes.push(GroupOutcome {
            kind,
            rejection: None,
        });
    }

    fn reject(&mut self, kind: GroupKind, reason: String) {
        warn!("[rejected-group] Attribute group '{kind}' was rejected, continuing: {reason}");
        self.outcomes.push(GroupOutcome {
            kind,
            rejection: Some(reason),
        });
    }

    pub fn accepted_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.accepted()).count()
    }

    pub fn rejected_count(&self) -> usize {
        self.outcomes.len() - self.accepted_count()
    }
}

/// Result of the reset issued after an immediate apply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RebootStatus {
    NotRequested,
    Issued,
    Failed(String),
}

/// Outcome of a successful [`ConfigurationClient::apply`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplyResult {
    pub writes: WriteLog,
    pub job: ApplyJob,
    pub reboot: RebootStatus,
    pub state: SessionState,
}

/// Configuration client for one controller.
pub struct ConfigurationClient<'a> {
    transport: &'a dyn RedfishTransport,
    layout: &'a ResourceLayout,
    target: SettingsTarget,
}

impl<'a> ConfigurationClient<'a> {
    pub fn new(transport: &'a dyn RedfishTransport, layout: &'a ResourceLayout) -> Self {
        Self {
            transport,
            layout,
            target: SettingsTarget::default(),
        }
    }

    pub fn with_settings_target(mut self, target: SettingsTarget) -> Self {
        self.target = target;
        self
    }

    fn settings_path(&self, nic_id: &str) -> String {
        match self.target {
            SettingsTarget::Staged => self.layout.nic_settings(nic_id),
            SettingsTarget::Direct => self.layout.nic(nic_id),
        }
    }

    /// Warns when the controller firmware is older than the known-good
    /// version. Never fails.
    pub fn probe_firmware(&self) {
        match system::firmware_version(self.transport, self.layout) {
            Ok(version) if firmware_older_than(&version, MIN_KNOWN_GOOD_FIRMWARE) => warn!(
                "[firmware] Controller firmware {version} is older than {MIN_KNOWN_GOOD_FIRMWARE}; some iSCSI attributes may be rejected"
            ),
            Ok(version) => debug!("Controller firmware {version}"),
            Err(e) => debug!("Could not read controller firmware version: {e:?}"),
        }
    }

    /// Writes `groups` in order, sets the apply time and, for an immediate
    /// apply, restarts the server.
    ///
    /// Fails only when the apply-time directive cannot be set.
    pub fn apply(
        &self,
        nic_id: &str,
        groups: &[BootAttributeGroup],
        policy: RebootPolicy,
    ) -> Result<ApplyResult, BootctlError> {
        let path = self.settings_path(nic_id);
        info!("Writing {} attribute group(s) to NIC '{nic_id}'", groups.len());

        let mut state = SessionState::Unconfigured;
        debug!("Session {state:?}");

        let mut writes = WriteLog::default();
        for group in groups {
            match self.transport.patch(&path, &group.to_patch()) {
                Ok(response) if response.is_success() => writes.accept(group.kind),
                Ok(response) => writes.reject(group.kind, response.error_message()),
                Err(e) => writes.reject(group.kind, format!("{e:#}")),
            }
        }
        state = SessionState::AttributesStaged;
        debug!(
            "Session {state:?}: {} accepted, {} rejected",
            writes.accepted_count(),
            writes.rejected_count()
        );

        let apply_time = ApplyTime::from(policy);
        let body = json!({ SETTINGS_APPLY_TIME_KEY: { "ApplyTime": apply_time.to_string() } });
        let response = self
            .transport
            .patch(&path, &body)
            .structured(ApplyError::SetApplyTime {
                nic: nic_id.to_string(),
            })?;
        if !response.is_success() {
            state = SessionState::Failed;
            warn!(
                "Session {state:?}: apply time for NIC '{nic_id}' was rejected after {} accepted group(s); staged changes are not committed",
                writes.accepted_count()
            );
            return Err(anyhow::anyhow!(response.error_message())).structured(
                ApplyError::SetApplyTime {
                    nic: nic_id.to_string(),
                },
            );
        }
        state = SessionState::ApplyTimeSet;
        debug!("Session {state:?}: apply time {apply_time}");

        let job = match response.job_id() {
            Some(id) => {
                info!("Settings for NIC '{nic_id}' scheduled as job {id} ({apply_time})");
                ApplyJob {
                    id: Some(id),
                    apply_time,
                    state: JobState::Pending,
                }
            }
            None => {
                info!("Settings for NIC '{nic_id}' accepted without a job id; untracked");
                ApplyJob {
                    id: None,
                    apply_time,
                    state: JobState::Unknown,
                }
            }
        };

        let reboot = if apply_time == ApplyTime::Immediate {
            state = SessionState::RebootRequested;
            match system::reset(self.transport, self.layout, ResetType::GracefulRestart) {
                Ok(()) => {
                    tracing::info!(metric_name = "reboot_issued", nic = nic_id);
                    RebootStatus::Issued
                }
                Err(e) => {
                    warn!(
                        "[reboot] Failed to restart server, changes will take effect at the next manual reboot: {e:#}"
                    );
                    RebootStatus::Failed(format!("{e:#}"))
                }
            }
        } else {
            state = SessionState::Deferred;
            info!("Changes for NIC '{nic_id}' will take effect at the next reboot");
            RebootStatus::NotRequested
        };
        debug!("Session {state:?}");

        tracing::info!(
            metric_name = "apply_completed",
            nic = nic_id,
            accepted = writes.accepted_count(),
            rejected = writes.rejected_count()
        );

        Ok(ApplyResult {
            writes,
            job,
            reboot,
            state: SessionState::Done,
        })
    }

    /// Best-effort read of a job's state, for logging.
    pub fn job_state(&self, job: &ApplyJob) -> Option<String> {
        let id = job.id.as_deref()?;
        match system::job_state(self.transport, self.layout, id) {
            Ok(state) => Some(state),
            Err(e) => {
                debug!("Could not read state of job {id}: {e:?}");
                None
            }
        }
    }
}

/// Compares dotted numeric versions; non-numeric parts count as zero.
fn firmware_older_than(version: &str, minimum: &str) -> bool {
    let parse = |v: &str| -> Vec<u64> {
        v.split(['.', '-'])
            .map(|part| part.trim().parse().unwrap_or(0))
            .collect()
    };
    let (mut version, mut minimum) = (parse(version), parse(minimum));
    let len = version.len().max(minimum.len());
    version.resize(len, 0);
    minimum.resize(len, 0);
    version < minimum
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::Value;

    use bootctl_api::{catalog::TargetDescriptor, error::ErrorKind};

    use crate::{
        attributes::{build_attribute_groups, BuildOptions},
        redfish::{mock::MockTransport, RedfishResponse},
    };

    const NIC: &str = "NIC.Integrated.1-1-1";

    fn layout() -> ResourceLayout {
        ResourceLayout::default()
    }

    fn groups() -> Vec<BootAttributeGroup> {
        let target = TargetDescriptor {
            name: "lab-a".into(),
            description: String::new(),
            iqn: "iqn.2010-06.com.example:lab-a".into(),
            ip: "10.0.0.10".into(),
            port: 3260,
            lun: 0,
            auth_method: None,
            chap_username: None,
            chap_secret: None,
        };
        build_attribute_groups(&target, &BuildOptions::default())
    }

    fn is_apply_time(body: &Option<Value>) -> bool {
        body.as_ref()
            .is_some_and(|body| body.get(SETTINGS_APPLY_TIME_KEY).is_some())
    }

    #[test]
    fn test_apply_deferred() {
        let transport = MockTransport::new().on(|call| {
            (call.method == "PATCH").then(|| {
                if is_apply_time(&call.body) {
                    RedfishResponse::new(202)
                        .with_location("/redfish/v1/Managers/iDRAC.Embedded.1/Jobs/JID_42")
                } else {
                    RedfishResponse::new(200)
                }
            })
        });
        let layout = layout();
        let client = ConfigurationClient::new(&transport, &layout);

        let result = client.apply(NIC, &groups(), RebootPolicy::Deferred).unwrap();
        assert_eq!(result.writes.accepted_count(), 2);
        assert_eq!(
            result.job,
            ApplyJob {
                id: Some("JID_42".into()),
                apply_time: ApplyTime::OnReset,
                state: JobState::Pending,
            }
        );
        assert_eq!(result.reboot, RebootStatus::NotRequested);
        assert_eq!(result.state, SessionState::Done);

        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls
            .iter()
            .all(|call| call.path == layout.nic_settings(NIC)));
        assert_eq!(
            calls[2].body,
            Some(json!({ "@Redfish.SettingsApplyTime": { "ApplyTime": "OnReset" } }))
        );
        assert!(transport.calls_to("POST").is_empty());
    }

    #[test]
    fn test_rejected_group_does_not_abort() {
        let transport = MockTransport::new().on(|call| {
            let body = call.body.as_ref()?;
            Some(if body.pointer("/iSCSIBoot/IPAddressType").is_some() {
                RedfishResponse::new(400).with_body(
                    json!({"error": {"message": "Unsupported attribute combination"}}).to_string(),
                )
            } else {
                RedfishResponse::new(200)
            })
        });
        let layout = layout();
        let client = ConfigurationClient::new(&transport, &layout);

        let result = client.apply(NIC, &groups(), RebootPolicy::Deferred).unwrap();
        assert_eq!(result.writes.rejected_count(), 1);
        assert_eq!(result.writes.accepted_count(), 1);
        assert_eq!(result.writes.outcomes[0].kind, GroupKind::Basic);
        assert_eq!(
            result.writes.outcomes[0].rejection.as_deref(),
            Some("HTTP 400: Unsupported attribute combination")
        );
        assert_eq!(result.job.state, JobState::Unknown);
        assert!(!result.job.is_tracked());
        assert_eq!(transport.calls().len(), 3);
    }

    #[test]
    fn test_apply_time_failure_is_fatal() {
        // Every group is accepted; only the final directive is rejected
        let transport = MockTransport::new().on(|call| {
            Some(if is_apply_time(&call.body) {
                RedfishResponse::new(500)
            } else {
                RedfishResponse::new(200)
            })
        });
        let layout = layout();
        let client = ConfigurationClient::new(&transport, &layout);

        let err = client
            .apply(NIC, &groups(), RebootPolicy::Immediate)
            .unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::Apply(ApplyError::SetApplyTime { nic: NIC.into() })
        );
        assert!(transport.calls_to("POST").is_empty());
    }

    #[test]
    fn test_apply_time_transport_error_is_fatal() {
        let transport = MockTransport::new().on(|call| {
            (!is_apply_time(&call.body)).then(|| RedfishResponse::new(200))
        });
        let layout = layout();
        let client = ConfigurationClient::new(&transport, &layout);
        client
            .apply(NIC, &groups(), RebootPolicy::Deferred)
            .unwrap_err();
    }

    #[test]
    fn test_immediate_apply_restarts() {
        let layout = layout();
        let transport = MockTransport::new()
            .route("POST", layout.reset_action(), RedfishResponse::new(204))
            .on(|call| (call.method == "PATCH").then(|| RedfishResponse::new(200)));
        let client = ConfigurationClient::new(&transport, &layout);

        let result = client.apply(NIC, &groups(), RebootPolicy::Immediate).unwrap();
        assert_eq!(result.reboot, RebootStatus::Issued);
        assert_eq!(result.job.apply_time, ApplyTime::Immediate);

        let posts = transport.calls_to("POST");
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].body, Some(json!({ "ResetType": "GracefulRestart" })));
        // The reset comes after every write
        assert_eq!(transport.calls().last().unwrap().method, "POST");
    }

    #[test]
    fn test_reset_failure_is_soft() {
        let layout = layout();
        let transport = MockTransport::new()
            .route("POST", layout.reset_action(), RedfishResponse::new(503))
            .on(|call| (call.method == "PATCH").then(|| RedfishResponse::new(200)));
        let client = ConfigurationClient::new(&transport, &layout);

        let result = client.apply(NIC, &groups(), RebootPolicy::Immediate).unwrap();
        assert!(matches!(result.reboot, RebootStatus::Failed(_)));
        assert_eq!(result.state, SessionState::Done);
    }

    #[test]
    fn test_direct_settings_target() {
        let layout = layout();
        let transport = MockTransport::new()
            .on(|call| (call.method == "PATCH").then(|| RedfishResponse::new(200)));
        let client = ConfigurationClient::new(&transport, &layout)
            .with_settings_target(SettingsTarget::Direct);
        client.apply(NIC, &groups(), RebootPolicy::Deferred).unwrap();
        assert!(transport.calls().iter().all(|call| call.path == layout.nic(NIC)));
    }

    #[test]
    fn test_probe_firmware_never_fails() {
        let layout = layout();
        let transport = MockTransport::new();
        ConfigurationClient::new(&transport, &layout).probe_firmware();

        let transport = MockTransport::new()
            .get_json(layout.manager(), json!({ "FirmwareVersion": "3.21.26.22" }));
        ConfigurationClient::new(&transport, &layout).probe_firmware();
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_firmware_older_than() {
        assert!(firmware_older_than("3.21.26.22", "4.40.00.00"));
        assert!(firmware_older_than("4.39.99.99", "4.40.00.00"));
        assert!(!firmware_older_than("4.40.00.00", "4.40.00.00"));
        assert!(!firmware_older_than("5.10.50.00", "4.40.00.00"));
        assert!(!firmware_older_than("4.40.10", "4.40.00.00"));
    }

    #[test]
    fn test_job_state() {
        let layout = layout();
        let transport =
            MockTransport::new().get_json(layout.job("JID_42"), json!({ "JobState": "Scheduled" }));
        let client = ConfigurationClient::new(&transport, &layout);
        let job = ApplyJob {
            id: Some("JID_42".into()),
            apply_time: ApplyTime::OnReset,
            state: JobState::Pending,
        };
        assert_eq!(client.job_state(&job).as_deref(), Some("Scheduled"));

        let untracked = ApplyJob { id: None, ..job };
        assert_eq!(client.job_state(&untracked), None);
    }
}
