//! Named set of register controllers sharing one device.
//!
//! Controllers of different value kinds are stored as [`AnyRegister`]
//! variants, so dispatching a completion is a `match`, not a virtual call.

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use hmi_common::device::{InitialValue, RegisterConfig, RegisterKind};
use thiserror::Error;
use tracing::{debug, warn};

use crate::controller::{RegisterController, RegisterEvent, RegisterStatus, WriteMode};
use crate::function::{Function, Table};
use crate::request::Completion;
use crate::transport::{RequestIssuer, TransportError};
use crate::value::{Coil, IntRegister, RealRegister, ValueKind};

/// Errors raised by register bank operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModbusError {
    /// No register with this name.
    #[error("unknown register '{0}'")]
    UnknownRegister(String),

    /// A register with this name already exists.
    #[error("duplicate register '{0}'")]
    DuplicateRegister(String),

    /// Value of the wrong kind for the register.
    #[error("register '{name}' holds {expected} values, got {got}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        got: Value,
    },

    /// Transport refused a bank-level request.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Dynamically typed register value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Real(f64),
}

impl Value {
    /// Numeric view; booleans are 0 or 1.
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Bool(b) => f64::from(u8::from(b)),
            Self::Int(i) => f64::from(i),
            Self::Real(r) => r,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
        }
    }
}

impl From<InitialValue> for Value {
    fn from(value: InitialValue) -> Self {
        match value {
            InitialValue::Bool(b) => Self::Bool(b),
            InitialValue::Int(i) => Self::Int(i.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32),
            InitialValue::Real(r) => Self::Real(r),
        }
    }
}

/// Register event tagged with the register name.
#[derive(Debug, Clone, PartialEq)]
pub struct BankEvent {
    pub register: String,
    pub event: RegisterEvent<Value>,
}

/// Controller of any supported kind.
#[derive(Debug)]
pub enum AnyRegister<D> {
    Coil(RegisterController<Coil, D>),
    Int(RegisterController<IntRegister, D>),
    Real(RegisterController<RealRegister, D>),
}

/// Applies `$body` to the controller inside any variant.
macro_rules! each {
    ($reg:expr, $c:ident => $body:expr) => {
        match $reg {
            AnyRegister::Coil($c) => $body,
            AnyRegister::Int($c) => $body,
            AnyRegister::Real($c) => $body,
        }
    };
}

impl<D: RequestIssuer> AnyRegister<D> {
    /// Build a detached controller from its configuration.
    pub fn from_config(config: &RegisterConfig) -> Self {
        let mode = WriteMode::from_config(config.write_mode, config.write_delay_ms);
        let name = config.name.as_str();
        let address = config.address;
        let encoding = config.effective_encoding();

        match config.kind {
            RegisterKind::Coil => Self::Coil(
                RegisterController::new(name, address, Coil, mode)
                    .with_read_on_write(config.read_on_write),
            ),
            RegisterKind::Int => Self::Int(
                RegisterController::new(
                    name,
                    address,
                    encoding.map_or_else(IntRegister::default, IntRegister::new),
                    mode,
                )
                .with_read_on_write(config.read_on_write),
            ),
            RegisterKind::Real => Self::Real(
                RegisterController::new(
                    name,
                    address,
                    encoding.map_or_else(RealRegister::default, RealRegister::new),
                    mode,
                )
                .with_read_on_write(config.read_on_write),
            ),
        }
    }

    pub fn name(&self) -> &str {
        each!(self, c => c.name())
    }

    pub fn address(&self) -> u16 {
        each!(self, c => c.address())
    }

    pub fn width(&self) -> u16 {
        each!(self, c => c.width())
    }

    pub fn table(&self) -> Table {
        each!(self, c => c.kind().table())
    }

    pub fn status(&self) -> RegisterStatus {
        each!(self, c => c.status())
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        each!(self, c => c.next_deadline())
    }

    /// Current value, dynamically typed.
    pub fn value(&self) -> Option<Value> {
        match self {
            Self::Coil(c) => c.value().copied().map(Value::Bool),
            Self::Int(c) => c.value().copied().map(Value::Int),
            Self::Real(c) => c.value().copied().map(Value::Real),
        }
    }

    /// Request `value`. Integers and reals convert into each other.
    pub fn set_value(&mut self, value: Value, now: Instant) -> Result<(), ModbusError> {
        match (self, value) {
            (Self::Coil(c), Value::Bool(b)) => c.set_value(b, now),
            (Self::Int(c), Value::Int(i)) => c.set_value(i, now),
            (Self::Int(c), Value::Real(r)) => c.set_value(r.round() as i32, now),
            (Self::Real(c), Value::Real(r)) => c.set_value(r, now),
            (Self::Real(c), Value::Int(i)) => c.set_value(f64::from(i), now),
            (reg, got) => {
                return Err(ModbusError::TypeMismatch {
                    name: reg.name().to_string(),
                    expected: reg.kind_name(),
                    got,
                });
            }
        }
        Ok(())
    }

    pub fn write(&mut self) {
        each!(self, c => c.write())
    }

    pub fn attach(&mut self, device: D) {
        each!(self, c => c.attach(device))
    }

    pub fn detach(&mut self) -> Option<D> {
        each!(self, c => c.detach())
    }

    pub fn poll_timer(&mut self, now: Instant) -> bool {
        each!(self, c => c.poll_timer(now))
    }

    pub fn on_reply(&mut self, completion: &Completion) {
        each!(self, c => c.on_reply(completion))
    }

    /// Drain events, converting values to [`Value`].
    pub fn drain_events(&mut self, out: &mut Vec<BankEvent>) {
        match self {
            Self::Coil(c) => drain_into(c, out, Value::Bool),
            Self::Int(c) => drain_into(c, out, Value::Int),
            Self::Real(c) => drain_into(c, out, Value::Real),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Self::Coil(_) => "bool",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
        }
    }
}

fn drain_into<K, D, F>(c: &mut RegisterController<K, D>, out: &mut Vec<BankEvent>, wrap: F)
where
    K: ValueKind,
    D: RequestIssuer,
    F: Fn(K::Value) -> Value,
{
    let name = c.name().to_string();
    out.extend(c.drain_events().map(|event| BankEvent {
        register: name.clone(),
        event: event.map(&wrap),
    }));
}

/// A contiguous read issued by background polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSpan {
    pub table: Table,
    pub address: u16,
    pub amount: u16,
}

/// Registers of one device, addressed by name.
#[derive(Debug)]
pub struct RegisterBank<D> {
    registers: Vec<AnyRegister<D>>,
    index: HashMap<String, usize>,
}

impl<D> Default for RegisterBank<D> {
    fn default() -> Self {
        Self {
            registers: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<D: RequestIssuer + Clone> RegisterBank<D> {
    /// Create an empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build detached controllers for every configured register.
    ///
    /// # Errors
    ///
    /// `ModbusError::DuplicateRegister` if two registers share a name.
    pub fn from_config(configs: &[RegisterConfig]) -> Result<Self, ModbusError> {
        let mut bank = Self::new();
        for config in configs {
            bank.insert(AnyRegister::from_config(config))?;
        }
        Ok(bank)
    }

    /// Add a controller.
    pub fn insert(&mut self, register: AnyRegister<D>) -> Result<(), ModbusError> {
        let name = register.name().to_string();
        if self.index.contains_key(&name) {
            return Err(ModbusError::DuplicateRegister(name));
        }
        self.index.insert(name, self.registers.len());
        self.registers.push(register);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnyRegister<D>> {
        self.registers.iter()
    }

    pub fn get(&self, name: &str) -> Option<&AnyRegister<D>> {
        self.index.get(name).map(|&i| &self.registers[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut AnyRegister<D>> {
        self.index.get(name).map(|&i| &mut self.registers[i])
    }

    /// Current value of `name`.
    pub fn value(&self, name: &str) -> Option<Value> {
        self.get(name).and_then(AnyRegister::value)
    }

    /// Request `value` on `name`.
    pub fn set_value(&mut self, name: &str, value: Value, now: Instant) -> Result<(), ModbusError> {
        self.lookup(name)?.set_value(value, now)
    }

    /// Explicitly write `name`.
    pub fn write(&mut self, name: &str) -> Result<(), ModbusError> {
        self.lookup(name)?.write();
        Ok(())
    }

    /// Attach `device` to every register.
    pub fn attach(&mut self, device: D) {
        for register in &mut self.registers {
            register.attach(device.clone());
        }
    }

    /// Detach every register.
    pub fn detach(&mut self) {
        for register in &mut self.registers {
            register.detach();
        }
    }

    /// Offer a completion to every register.
    pub fn dispatch(&mut self, completion: &Completion) {
        for register in &mut self.registers {
            register.on_reply(completion);
        }
    }

    /// Fire due delayed writes. Returns how many fired.
    pub fn poll_timers(&mut self, now: Instant) -> usize {
        self.registers
            .iter_mut()
            .map(|register| register.poll_timer(now))
            .filter(|&fired| fired)
            .count()
    }

    /// Earliest pending delayed write.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.registers
            .iter()
            .filter_map(AnyRegister::next_deadline)
            .min()
    }

    /// Reads covering every register, merged per table into spans no
    /// longer than the table's read limit.
    pub fn poll_spans(&self) -> Vec<PollSpan> {
        let mut ranges: Vec<(Table, u32, u32)> = self
            .registers
            .iter()
            .map(|r| {
                let start = u32::from(r.address());
                (r.table(), start, start + u32::from(r.width()))
            })
            .collect();
        ranges.sort_by_key(|&(table, start, _)| (table as u8, start));

        let mut spans: Vec<PollSpan> = Vec::new();
        for (table, start, end) in ranges {
            if let Some(last) = spans.last_mut() {
                let last_end = u32::from(last.address) + u32::from(last.amount);
                let merged = end.max(last_end) - u32::from(last.address);
                if last.table == table && start <= last_end && merged <= u32::from(table.max_read())
                {
                    last.amount = merged as u16;
                    continue;
                }
            }
            spans.push(PollSpan {
                table,
                address: start as u16,
                amount: (end - start) as u16,
            });
        }
        spans
    }

    /// Issue background reads for every register through `device`.
    ///
    /// Returns how many reads were issued.
    pub fn poll_all(&self, device: &impl RequestIssuer) -> usize {
        let mut issued = 0;
        for span in self.poll_spans() {
            match device.issue_read(Function::read(span.table), span.address, span.amount) {
                Ok(id) => {
                    debug!(request_id = %id, ?span, "Background read issued");
                    issued += 1;
                }
                Err(e) => warn!(?span, "Background read not issued: {}", e),
            }
        }
        issued
    }

    /// Drain events of every register, in register order.
    pub fn drain_events(&mut self) -> Vec<BankEvent> {
        let mut out = Vec::new();
        for register in &mut self.registers {
            register.drain_events(&mut out);
        }
        out
    }

    fn lookup(&mut self, name: &str) -> Result<&mut AnyRegister<D>, ModbusError> {
        self.get_mut(name)
            .ok_or_else(|| ModbusError::UnknownRegister(name.to_string()))
    }
}
