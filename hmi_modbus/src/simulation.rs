//! In-process simulated field device.
//!
//! The device runs as a tokio task: requests arrive on a channel, each is
//! executed after the configured latency and answered on a reply channel
//! in arrival order. Addresses outside a table fail the request.

use std::time::Duration;

use hmi_common::device::DeviceConfig;
use hmi_common::init::{InitError, Subsystem};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::function::{Function, Table};
use crate::request::{Payload, Reply, Request};
use crate::transport::ChannelTransport;

/// Memory model of a device: four tables of the configured sizes.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    name: String,
    coils: Vec<bool>,
    discrete_inputs: Vec<bool>,
    holding_registers: Vec<u16>,
    input_registers: Vec<u16>,
}

impl SimulatedDevice {
    /// Zeroed device with `coils` bits and `registers` words per table.
    pub fn new(name: impl Into<String>, coils: usize, registers: usize) -> Self {
        Self {
            name: name.into(),
            coils: vec![false; coils],
            discrete_inputs: vec![false; coils],
            holding_registers: vec![0; registers],
            input_registers: vec![0; registers],
        }
    }

    /// Device sized from its configuration.
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(
            config.name.as_str(),
            config.coils as usize,
            config.holding_registers as usize,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn coil(&self, address: u16) -> Option<bool> {
        self.coils.get(usize::from(address)).copied()
    }

    pub fn holding_register(&self, address: u16) -> Option<u16> {
        self.holding_registers.get(usize::from(address)).copied()
    }

    /// Change a coil from the device side.
    pub fn set_coil(&mut self, address: u16, value: bool) -> bool {
        set(&mut self.coils, address, &[value])
    }

    /// Change holding registers from the device side.
    pub fn set_holding_registers(&mut self, address: u16, words: &[u16]) -> bool {
        set(&mut self.holding_registers, address, words)
    }

    /// Change a discrete input.
    pub fn set_discrete_input(&mut self, address: u16, value: bool) -> bool {
        set(&mut self.discrete_inputs, address, &[value])
    }

    /// Change input registers.
    pub fn set_input_registers(&mut self, address: u16, words: &[u16]) -> bool {
        set(&mut self.input_registers, address, words)
    }

    /// Execute `request` against the tables.
    pub fn execute(&mut self, request: &Request) -> Reply {
        let start = usize::from(request.address);
        let end = start + usize::from(request.amount);

        let payload = match (request.function, &request.payload) {
            (f, _) if f.is_read() => self.read(f.table(), start, end),
            (Function::WriteCoil | Function::WriteMultipleCoils, Payload::Bits(bits)) => {
                set(&mut self.coils, request.address, bits).then_some(Payload::None)
            }
            (
                Function::WriteHoldingRegister | Function::WriteMultipleHoldingRegisters,
                Payload::Words(words),
            ) => set(&mut self.holding_registers, request.address, words).then_some(Payload::None),
            _ => None,
        };

        match payload {
            Some(payload) => Reply::ok(request.id, payload),
            None => {
                debug!(
                    device = %self.name,
                    request_id = %request.id,
                    function = %request.function,
                    address = request.address,
                    amount = request.amount,
                    "Illegal request"
                );
                Reply::failed(request.id)
            }
        }
    }

    fn read(&self, table: Table, start: usize, end: usize) -> Option<Payload> {
        if start == end {
            return None;
        }
        Some(match table {
            Table::Coils => Payload::Bits(self.coils.get(start..end)?.to_vec()),
            Table::DiscreteInputs => Payload::Bits(self.discrete_inputs.get(start..end)?.to_vec()),
            Table::HoldingRegisters => {
                Payload::Words(self.holding_registers.get(start..end)?.to_vec())
            }
            Table::InputRegisters => Payload::Words(self.input_registers.get(start..end)?.to_vec()),
        })
    }

    /// Answer requests until the request channel closes or nobody listens
    /// for replies. Returns the device for inspection.
    pub async fn serve(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Request>,
        replies: mpsc::UnboundedSender<Reply>,
        latency: Duration,
    ) -> Self {
        while let Some(request) = requests.recv().await {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let reply = self.execute(&request);
            if replies.send(reply).is_err() {
                break;
            }
        }
        debug!(device = %self.name, "Simulated device stopped");
        self
    }
}

fn set<T: Copy>(table: &mut [T], address: u16, values: &[T]) -> bool {
    let start = usize::from(address);
    match table.get_mut(start..start + values.len()) {
        Some(slot) if !values.is_empty() => {
            slot.copy_from_slice(values);
            true
        }
        _ => false,
    }
}

/// Host side of a simulator: where requests go and replies come from.
#[derive(Debug)]
pub struct SimulatorLink {
    pub transport: ChannelTransport,
    pub replies: mpsc::UnboundedReceiver<Reply>,
}

/// The simulated device as a startup subsystem.
///
/// `init()` spawns the device task on the current tokio runtime;
/// `shutdown()` aborts it.
#[derive(Debug)]
pub struct DeviceSimulator {
    device: Option<SimulatedDevice>,
    requests: Option<mpsc::UnboundedReceiver<Request>>,
    replies: mpsc::UnboundedSender<Reply>,
    latency: Duration,
    task: Option<JoinHandle<SimulatedDevice>>,
}

impl DeviceSimulator {
    /// Simulator for `config` and the link used to reach it.
    pub fn new(config: &DeviceConfig) -> (Self, SimulatorLink) {
        Self::with_device(
            SimulatedDevice::from_config(config),
            Duration::from_millis(config.latency_ms),
        )
    }

    /// Simulator around a prepared device.
    pub fn with_device(device: SimulatedDevice, latency: Duration) -> (Self, SimulatorLink) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        let simulator = Self {
            device: Some(device),
            requests: Some(request_rx),
            replies: reply_tx,
            latency,
            task: None,
        };
        let link = SimulatorLink {
            transport: ChannelTransport::new(request_tx),
            replies: reply_rx,
        };
        (simulator, link)
    }

    /// Whether the device task is running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Subsystem for DeviceSimulator {
    fn name(&self) -> &'static str {
        "device-simulator"
    }

    fn init(&mut self) -> Result<(), InitError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| InitError::Failed {
            subsystem: "device-simulator",
            reason: e.to_string(),
        })?;

        let (Some(device), Some(requests)) = (self.device.take(), self.requests.take()) else {
            return Err(InitError::AlreadyInitialized {
                subsystem: "device-simulator",
            });
        };

        info!(device = %device.name(), latency = ?self.latency, "Simulated device started");
        self.task = Some(runtime.spawn(device.serve(requests, self.replies.clone(), self.latency)));
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), InitError> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }
}
