//! Host event loop.
//!
//! One thread owns every controller and service. The loop waits on the
//! first of: a device reply, the earliest delayed-write deadline, the
//! background poll tick, the history tick, or the shutdown signal. After
//! each wake-up, link commands queued by the device service are executed
//! and register events are logged.
//!
//! ```text
//!            ┌──────────────── replies ◀──────── simulated device
//!            ▼
//!  Runtime ──┼── RegisterBank ── DeviceClient ── requests ──▶
//!            ├── Service<DeviceService>   (connect / poll commands)
//!            └── Service<HistoryWriter>   (sampling ticks)
//! ```

use std::collections::BTreeSet;
use std::future::{self, Future};
use std::rc::Rc;
use std::time::{Duration, Instant};

use chrono::Utc;
use hmi_common::config::HmiConfig;
use hmi_history::{
    HistorySettings, HistoryStore, HistoryWriter, JsonLinesStore, MemoryStore, Sample,
};
use hmi_modbus::{
    BankEvent, CONNECTED, ChannelTransport, DISCONNECTED, DeviceClient, DeviceService, Function,
    LinkCommand, RegisterBank, RegisterEvent, Reply, RequestId, RequestIssuer, SimulatorLink,
    StaleRequest, Value,
};
use hmi_services::{Service, ServiceGroup, ServiceState};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::RuntimeError;

/// Device client shared by every register.
pub type Client = Rc<DeviceClient<ChannelTransport>>;

/// Batches kept by the in-memory history store.
const MEMORY_HISTORY_RETAIN: usize = 16;

/// Everything the host process drives.
pub struct Runtime {
    config: HmiConfig,
    client: Client,
    replies: mpsc::UnboundedReceiver<Reply>,
    bank: RegisterBank<Client>,
    device: Service<DeviceService>,
    history: Service<HistoryWriter<Box<dyn HistoryStore>>>,
    probe: Option<RequestId>,
    /// Stuck requests already warned about.
    reported: BTreeSet<RequestId>,
    polling: bool,
    initial_applied: bool,
}

impl Runtime {
    /// Build registers and services for `config` on top of `link`.
    ///
    /// # Errors
    ///
    /// Invalid configuration, duplicate registers, or service setup errors.
    pub fn new(config: HmiConfig, link: SimulatorLink) -> Result<Self, RuntimeError> {
        config.validate()?;

        let client = Rc::new(DeviceClient::new(config.device.name.as_str(), link.transport));
        let bank = RegisterBank::from_config(&config.registers)?;

        let store: Box<dyn HistoryStore> = match &config.history.path {
            Some(path) => Box::new(JsonLinesStore::new(path)),
            None => Box::new(MemoryStore::bounded(MEMORY_HISTORY_RETAIN)),
        };
        let writer = HistoryWriter::new(store, HistorySettings::from_config(&config))?;

        Ok(Self {
            device: Service::new(config.device.name.as_str(), DeviceService::new())?,
            history: Service::new("history", writer)?,
            config,
            client,
            replies: link.replies,
            bank,
            probe: None,
            reported: BTreeSet::new(),
            polling: false,
            initial_applied: false,
        })
    }

    pub fn bank(&self) -> &RegisterBank<Client> {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut RegisterBank<Client> {
        &mut self.bank
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn device_state(&self) -> ServiceState {
        self.device.current_state()
    }

    pub fn device_fault(&self) -> Option<&str> {
        self.device.last_fault()
    }

    pub fn history_state(&self) -> ServiceState {
        self.history.current_state()
    }

    /// Whether background polling is on.
    pub fn is_polling(&self) -> bool {
        self.polling
    }

    /// Start every service in dependency order.
    pub fn start(&mut self) {
        let started = ServiceGroup::new()
            .with(&mut self.device)
            .with(&mut self.history)
            .start_all();
        info!(services = started, "Services started");
        self.execute_commands();
    }

    /// Stop every service in reverse order and release the link.
    pub fn shutdown(&mut self) {
        ServiceGroup::new()
            .with(&mut self.device)
            .with(&mut self.history)
            .stop_all();
        self.execute_commands();
        info!(
            device = %self.device.current_state(),
            history = %self.history.current_state(),
            "Services stopped"
        );
    }

    /// Run until `shutdown` completes.
    ///
    /// # Errors
    ///
    /// `RuntimeError::LinkClosed` when the reply channel closes.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> Result<(), RuntimeError> {
        tokio::pin!(shutdown);

        let mut poll = interval(Duration::from_millis(self.config.device.poll_interval_ms));
        let mut sample = interval(self.history.inner().interval());

        loop {
            let deadline = self.bank.next_deadline();

            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested");
                    return Ok(());
                }
                reply = self.replies.recv() => match reply {
                    Some(reply) => self.handle_reply(reply),
                    None => {
                        error!(device = %self.client.name(), "Reply channel closed");
                        return Err(RuntimeError::LinkClosed);
                    }
                },
                () = sleep_until(deadline) => {
                    self.bank.poll_timers(Instant::now());
                }
                () = tick(&mut poll) => {
                    self.poll();
                    self.report_stale(Instant::now());
                }
                () = tick(&mut sample) => self.sample_history(),
            }

            self.execute_commands();
            self.log_events();
        }
    }

    /// Route one device reply.
    pub fn handle_reply(&mut self, reply: Reply) {
        let Some(completion) = self.client.resolve(reply) else {
            return;
        };

        if self.probe == Some(completion.id()) {
            self.probe = None;
            if completion.success {
                info!(device = %self.client.name(), "Device answered connection probe");
                self.device.set_flag(CONNECTED, true);
            } else {
                self.device.report_fault("device rejected connection probe");
            }
        }

        self.bank.dispatch(&completion);
    }

    /// Issue background reads if polling is on.
    pub fn poll(&mut self) {
        if self.polling {
            self.bank.poll_all(&self.client);
        }
    }

    /// Take one history sample of the current register values.
    pub fn sample_history(&mut self) {
        let values: Vec<(String, Sample)> = self
            .history
            .inner()
            .tags()
            .filter_map(|tag| Some((tag.to_owned(), sample(self.bank.value(tag)?))))
            .collect();

        let now = Utc::now();
        self.history.update(|writer, ctx| {
            writer.tick(values.iter().map(|(tag, s)| (tag.as_str(), *s)), now, ctx)
        });
    }

    fn report_stale(&mut self, now: Instant) {
        let timeout = Duration::from_millis(self.config.device.request_timeout_ms);
        let stale = self.client.stale_requests(now, timeout);
        for stale in newly_stale(&mut self.reported, stale) {
            warn!(
                device = %self.client.name(),
                request_id = %stale.id,
                function = %stale.function,
                address = stale.address,
                age = ?stale.age,
                "Request still unanswered"
            );
        }
    }

    /// Execute link commands until the device service stops queueing them.
    pub fn execute_commands(&mut self) {
        loop {
            let commands = self.device.inner_mut().take_commands();
            if commands.is_empty() {
                return;
            }
            for command in commands {
                debug!(device = %self.client.name(), ?command, "Link command");
                self.execute(command);
            }
        }
    }

    fn execute(&mut self, command: LinkCommand) {
        match command {
            LinkCommand::Connect => self.connect(),
            LinkCommand::Disconnect => {
                self.probe = None;
                self.bank.detach();
                let dropped = self.client.clear_outstanding();
                if dropped > 0 {
                    debug!(device = %self.client.name(), dropped, "Outstanding requests dropped");
                }
                self.device.set_flag(CONNECTED, false);
                self.device.set_flag(DISCONNECTED, true);
            }
            LinkCommand::StartPolling => {
                self.bank.attach(Rc::clone(&self.client));
                self.polling = true;
                self.apply_initial_values();
                self.poll();
            }
            LinkCommand::StopPolling => {
                self.polling = false;
            }
        }
    }

    fn connect(&mut self) {
        let (function, amount) = if self.config.device.coils > 0 {
            (Function::ReadCoils, 1)
        } else {
            (Function::ReadHoldingRegisters, 1)
        };

        match self.client.issue_read(function, 0, amount) {
            Ok(id) => {
                debug!(device = %self.client.name(), request_id = %id, "Connection probe issued");
                self.probe = Some(id);
            }
            Err(e) => {
                self.device.report_fault(format!("connection probe not issued: {e}"));
            }
        }
    }

    /// Request configured initial values once the device is first reached.
    fn apply_initial_values(&mut self) {
        if self.initial_applied {
            return;
        }
        self.initial_applied = true;

        let now = Instant::now();
        for register in &self.config.registers {
            let Some(initial) = register.initial else {
                continue;
            };
            if let Err(e) = self.bank.set_value(&register.name, Value::from(initial), now) {
                warn!(register = %register.name, "Initial value not applied: {}", e);
            }
        }
    }

    fn log_events(&mut self) {
        for BankEvent { register, event } in self.bank.drain_events() {
            match event {
                RegisterEvent::ValueFailed => warn!(register = %register, "Write failed"),
                RegisterEvent::ValueMismatch => {
                    warn!(register = %register, "Verification read differs from written value")
                }
                other => debug!(register = %register, event = ?other, "Register event"),
            }
        }
    }
}

/// Requests in `stale` not seen before. Forgets ids no longer stale.
fn newly_stale(reported: &mut BTreeSet<RequestId>, stale: Vec<StaleRequest>) -> Vec<StaleRequest> {
    reported.retain(|id| stale.iter().any(|s| s.id == *id));
    stale
        .into_iter()
        .filter(|s| reported.insert(s.id))
        .collect()
}

fn sample(value: Value) -> Sample {
    match value {
        Value::Bool(b) => Sample::Bool(b),
        Value::Int(i) => Sample::Int(i),
        Value::Real(r) => Sample::Real(r),
    }
}

/// Interval that never fires when `period` is zero.
fn interval(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => future::pending().await,
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => {
            error!("Cannot listen for shutdown signal: {}", e);
            future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stale(id: u64) -> StaleRequest {
        StaleRequest {
            id: RequestId(id),
            function: Function::ReadCoils,
            address: 0,
            age: Duration::from_secs(2),
        }
    }

    fn ids(requests: &[StaleRequest]) -> Vec<u64> {
        requests.iter().map(|s| s.id.0).collect()
    }

    #[test]
    fn stale_request_reported_once() {
        let mut reported = BTreeSet::new();
        assert_eq!(ids(&newly_stale(&mut reported, vec![stale(1)])), vec![1]);
        assert!(newly_stale(&mut reported, vec![stale(1)]).is_empty());
        assert_eq!(
            ids(&newly_stale(&mut reported, vec![stale(1), stale(2)])),
            vec![2]
        );
    }

    #[test]
    fn answered_requests_are_forgotten() {
        let mut reported = BTreeSet::new();
        newly_stale(&mut reported, vec![stale(1), stale(2)]);
        assert!(newly_stale(&mut reported, vec![stale(2)]).is_empty());
        assert_eq!(reported.len(), 1);

        newly_stale(&mut reported, Vec::new());
        assert!(reported.is_empty());
    }
}
