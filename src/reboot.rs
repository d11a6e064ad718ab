use std::{thread, time::Duration};

use log::{debug, info, warn};

use crate::redfish::{
    system::{self, PowerState, ResetType},
    RedfishTransport, ResourceLayout,
};

/// Blocking pause between polls.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// What [`RebootCoordinator::reboot`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebootAction {
    /// The server was off and no force was requested.
    NothingToDo,
    PoweredOn,
    Restarted,
    Failed,
}

/// Outcome of waiting for a server to come back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebootWait {
    /// Power state `On` was observed after the action.
    Online,

    /// The server was off and left off.
    NothingToDo,

    /// The timeout elapsed first. The reboot may still be in progress.
    TimedOut,

    /// The reset action itself failed.
    ActionFailed,
}

impl RebootWait {
    pub fn is_success(self) -> bool {
        matches!(self, RebootWait::Online | RebootWait::NothingToDo)
    }
}

pub struct RebootCoordinator<'a> {
    transport: &'a dyn RedfishTransport,
    layout: &'a ResourceLayout,
    sleeper: &'a dyn Sleeper,
}

impl<'a> RebootCoordinator<'a> {
    pub fn new(
        transport: &'a dyn RedfishTransport,
        layout: &'a ResourceLayout,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            transport,
            layout,
            sleeper,
        }
    }

    /// Restarts the server. A powered-off server is left alone unless `force`
    /// is set, in which case it is powered on. Returns whether the request
    /// succeeded.
    pub fn reboot(&self, force: bool) -> bool {
        self.reboot_action(force) != RebootAction::Failed
    }

    fn reboot_action(&self, force: bool) -> RebootAction {
        let system = &self.layout.system_id;
        let state = match system::power_state(self.transport, self.layout) {
            Ok(state) => state,
            Err(e) => {
                // Without a power state, a restart is still the right request.
                warn!("[reboot] Could not read power state of '{system}': {e:#}");
                PowerState::Unknown
            }
        };
        debug!("Power state of '{system}': {state}");

        let (reset_type, action) = match state {
            PowerState::Off if !force => {
                info!("'{system}' is powered off; nothing to do");
                return RebootAction::NothingToDo;
            }
            PowerState::Off => (ResetType::On, RebootAction::PoweredOn),
            _ => (ResetType::GracefulRestart, RebootAction::Restarted),
        };

        match system::reset(self.transport, self.layout, reset_type) {
            Ok(()) => {
                info!("Requested {reset_type} of '{system}'");
                tracing::info!(metric_name = "reboot_issued", system = system.as_str());
                action
            }
            Err(e) => {
                warn!(
                    "[reboot] {reset_type} of '{system}' failed, a manual reboot may be required: {e:#}"
                );
                RebootAction::Failed
            }
        }
    }

    /// Reboots, then waits for the server to report `On`.
    pub fn reboot_and_wait(
        &self,
        force: bool,
        timeout: Duration,
        poll_interval: Duration,
    ) -> RebootWait {
        match self.reboot_action(force) {
            RebootAction::Failed => RebootWait::ActionFailed,
            RebootAction::NothingToDo => RebootWait::NothingToDo,
            RebootAction::PoweredOn | RebootAction::Restarted => {
                self.wait_for_power_on(timeout, poll_interval)
            }
        }
    }

    /// Polls the power state every `poll_interval` until `On` is seen, for at
    /// most `timeout / poll_interval` polls. A timeout shorter than one
    /// interval times out without polling. A zero interval checks once.
    pub fn wait_for_power_on(&self, timeout: Duration, poll_interval: Duration) -> RebootWait {
        let polls = timeout
            .as_millis()
            .checked_div(poll_interval.as_millis())
            .unwrap_or(1);

        for poll in 1..=polls {
            self.sleeper.sleep(poll_interval);
            match system::power_state(self.transport, self.layout) {
                Ok(PowerState::On) => {
                    info!("Server is back on after {poll} poll(s)");
                    return RebootWait::Online;
                }
                Ok(state) => debug!("Poll {poll}/{polls}: power state {state}"),
                // The controller may drop requests while the host resets.
                Err(e) => debug!("Poll {poll}/{polls}: {e:#}"),
            }
        }

        warn!(
            "[reboot] Server did not report power on within {}s; the reboot may still be in progress",
            timeout.as_secs()
        );
        RebootWait::TimedOut
    }
}
