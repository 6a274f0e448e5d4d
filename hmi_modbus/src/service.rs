//! Device connection as a supervised service.
//!
//! The service owns no I/O. Its entry and exit actions queue
//! [`LinkCommand`]s; the host executes them and reports back by setting
//! the `connected` / `disconnected` readiness flags or reporting a fault.

use std::collections::VecDeque;

use hmi_services::{
    ServiceContext, ServiceError, ServiceRules, ServiceState, Serviceable, StateKey, Statuses,
    Transition,
};

/// Flag set once the device answered the connection probe.
pub const CONNECTED: &str = "connected";
/// Flag set once the device link is torn down.
pub const DISCONNECTED: &str = "disconnected";

/// Action requested from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCommand {
    /// Open the link and probe the device.
    Connect,
    /// Close the link and forget outstanding requests.
    Disconnect,
    /// Begin background polling and attach registers.
    StartPolling,
    /// End background polling.
    StopPolling,
}

/// Lifecycle of one device link.
#[derive(Debug, Default)]
pub struct DeviceService {
    commands: VecDeque<LinkCommand>,
}

impl DeviceService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take queued commands in order.
    pub fn take_commands(&mut self) -> Vec<LinkCommand> {
        self.commands.drain(..).collect()
    }

    fn push(&mut self, command: LinkCommand) {
        self.commands.push_back(command);
    }
}

impl Serviceable for DeviceService {
    fn configure(&self, rules: &mut ServiceRules<'_>) -> Result<(), ServiceError> {
        rules.configure(StateKey::Starting, Statuses::all([CONNECTED]))?;
        rules.configure(StateKey::Started, Statuses::all([CONNECTED]))?;
        rules.configure(StateKey::Stopping, Statuses::all([DISCONNECTED]))?;
        rules.configure(StateKey::Repairing, Statuses::all([CONNECTED]))?;
        rules.configure(StateKey::Evacuating, Statuses::all([DISCONNECTED]))?;
        rules.initial_flag(DISCONNECTED, true);
        Ok(())
    }

    fn on_exit(&mut self, transition: &Transition, _ctx: &mut ServiceContext) {
        if transition.leaves_started() {
            self.push(LinkCommand::StopPolling);
        }
    }

    fn on_enter(&mut self, transition: &Transition, ctx: &mut ServiceContext) {
        if transition.enters_started() {
            self.push(LinkCommand::StartPolling);
            return;
        }

        match transition.to {
            ServiceState::Starting | ServiceState::Repairing => {
                ctx.set_flag(DISCONNECTED, false);
                self.push(LinkCommand::Connect);
            }
            ServiceState::Stopping | ServiceState::Evacuating | ServiceState::Broken => {
                self.push(LinkCommand::Disconnect);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmi_services::{Activity, Service};

    fn service() -> Service<DeviceService> {
        Service::new("plc", DeviceService::new()).unwrap()
    }

    #[test]
    fn connect_then_poll() {
        let mut s = service();
        s.start();
        assert_eq!(s.current_state(), ServiceState::Starting);
        assert_eq!(s.inner_mut().take_commands(), vec![LinkCommand::Connect]);
        assert!(!s.flags().get(DISCONNECTED));

        s.set_flag(CONNECTED, true);
        assert_eq!(s.current_state(), ServiceState::Started(Activity::Active));
        assert_eq!(s.inner_mut().take_commands(), vec![LinkCommand::StartPolling]);
    }

    #[test]
    fn stop_disconnects() {
        let mut s = service();
        s.start();
        s.set_flag(CONNECTED, true);
        s.inner_mut().take_commands();

        s.stop();
        assert_eq!(
            s.inner_mut().take_commands(),
            vec![LinkCommand::StopPolling, LinkCommand::Disconnect]
        );
        s.set_flag(CONNECTED, false);
        assert_eq!(s.current_state(), ServiceState::Stopping);
        s.set_flag(DISCONNECTED, true);
        assert_eq!(s.current_state(), ServiceState::Stopped);
    }

    #[test]
    fn lost_connection_breaks_and_repairs() {
        let mut s = service();
        s.start();
        s.set_flag(CONNECTED, true);
        s.inner_mut().take_commands();

        s.set_flag(CONNECTED, false);
        assert_eq!(s.current_state(), ServiceState::Broken);
        assert_eq!(
            s.inner_mut().take_commands(),
            vec![LinkCommand::StopPolling, LinkCommand::Disconnect]
        );

        s.request_repair();
        assert_eq!(s.current_state(), ServiceState::Repairing);
        assert_eq!(s.inner_mut().take_commands(), vec![LinkCommand::Connect]);
        s.set_flag(CONNECTED, true);
        assert!(s.current_state().is_started());
    }

    #[test]
    fn starting_probe_failure() {
        let mut s = service();
        s.start();
        s.report_fault("probe failed");
        assert_eq!(s.current_state(), ServiceState::Broken);
        assert_eq!(
            s.inner_mut().take_commands(),
            vec![LinkCommand::Connect, LinkCommand::Disconnect]
        );
    }
}
