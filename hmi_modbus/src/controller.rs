//! Register controller: keeps one device register in sync with a requested
//! value.
//!
//! The controller is sans-IO. It issues requests through a
//! [`RequestIssuer`], learns about their outcome through
//! [`RegisterController::on_reply`], is told the time by its caller and
//! queues [`RegisterEvent`]s for the caller to drain.
//!
//! Every completion on the device is offered to every controller. A
//! controller reacts only to its own request, or to a read covering its
//! address while it has nothing of its own in flight.

use std::collections::VecDeque;
use std::collections::vec_deque::Drain;
use std::time::{Duration, Instant};

use bitflags::bitflags;
use hmi_common::device::WriteModeKind;
use tracing::{debug, warn};

use crate::request::{Completion, RequestId};
use crate::transport::RequestIssuer;
use crate::value::ValueKind;

bitflags! {
    /// Observable status bits of a register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RegisterStatus: u8 {
        /// Outcome of the latest change is not determined yet.
        const BUSY = 1 << 0;
        /// Target changed but the corresponding write is not issued yet.
        const ADJUSTING = 1 << 1;
        /// One follow-up write is due once the slot frees up.
        const POSTPONED_WRITE = 1 << 2;
    }
}

/// When a change of the requested value reaches the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Write on every change, even while another write is in flight.
    Immediate,
    /// Write once the value has been stable for the given delay.
    Delayed(Duration),
    /// Write now if idle, otherwise once after the current request.
    Postponed,
    /// Write only on [`RegisterController::write`].
    Explicit,
}

impl WriteMode {
    /// Mode from its configuration form.
    pub fn from_config(kind: WriteModeKind, delay_ms: u64) -> Self {
        match kind {
            WriteModeKind::Immediate => Self::Immediate,
            WriteModeKind::Delayed => Self::Delayed(Duration::from_millis(delay_ms)),
            WriteModeKind::Postponed => Self::Postponed,
            WriteModeKind::Explicit => Self::Explicit,
        }
    }
}

/// Notification emitted by a controller.
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterEvent<V> {
    /// Current value changed.
    ValueChanged(V),
    /// A write was confirmed.
    ValueWritten,
    /// A write failed.
    ValueFailed,
    /// Read-back after a write did not match, or could not be read.
    ValueMismatch,
    /// Busy flag changed.
    BusyChanged(bool),
}

impl<V> RegisterEvent<V> {
    /// Same event with the value mapped.
    pub fn map<W>(self, f: impl FnOnce(V) -> W) -> RegisterEvent<W> {
        match self {
            Self::ValueChanged(v) => RegisterEvent::ValueChanged(f(v)),
            Self::ValueWritten => RegisterEvent::ValueWritten,
            Self::ValueFailed => RegisterEvent::ValueFailed,
            Self::ValueMismatch => RegisterEvent::ValueMismatch,
            Self::BusyChanged(busy) => RegisterEvent::BusyChanged(busy),
        }
    }
}

/// One register of kind `K` driven through device `D`.
#[derive(Debug)]
pub struct RegisterController<K: ValueKind, D> {
    name: String,
    address: u16,
    kind: K,
    mode: WriteMode,
    read_on_write: bool,
    device: Option<D>,
    value: Option<K::Value>,
    requested: Option<K::Value>,
    status: RegisterStatus,
    /// Own request awaiting a reply. Non-null implies a device.
    in_flight: Option<RequestId>,
    /// Value carried by the latest issued write, as it reads back.
    written: Option<K::Value>,
    /// Pending delayed write.
    deadline: Option<Instant>,
    events: VecDeque<RegisterEvent<K::Value>>,
}

impl<K: ValueKind, D: RequestIssuer> RegisterController<K, D> {
    /// Create a detached controller with unknown current value.
    pub fn new(name: impl Into<String>, address: u16, kind: K, mode: WriteMode) -> Self {
        Self {
            name: name.into(),
            address,
            kind,
            mode,
            read_on_write: true,
            device: None,
            value: None,
            requested: None,
            status: RegisterStatus::empty(),
            in_flight: None,
            written: None,
            deadline: None,
            events: VecDeque::new(),
        }
    }

    /// Enable or disable read-back verification of writes.
    pub fn with_read_on_write(mut self, read_on_write: bool) -> Self {
        self.read_on_write = read_on_write;
        self
    }

    // ─── Accessors ──────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    pub fn width(&self) -> u16 {
        self.kind.width()
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    pub fn read_on_write(&self) -> bool {
        self.read_on_write
    }

    /// Last value known to be in the device.
    pub fn value(&self) -> Option<&K::Value> {
        self.value.as_ref()
    }

    /// Latest requested value.
    pub fn requested(&self) -> Option<&K::Value> {
        self.requested.as_ref()
    }

    pub fn status(&self) -> RegisterStatus {
        self.status
    }

    pub fn is_busy(&self) -> bool {
        self.status.contains(RegisterStatus::BUSY)
    }

    pub fn is_adjusting(&self) -> bool {
        self.status.contains(RegisterStatus::ADJUSTING)
    }

    pub fn is_postponed_write_pending(&self) -> bool {
        self.status.contains(RegisterStatus::POSTPONED_WRITE)
    }

    /// Own request awaiting a reply.
    pub fn in_flight(&self) -> Option<RequestId> {
        self.in_flight
    }

    /// When the pending delayed write is due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_attached(&self) -> bool {
        self.device.is_some()
    }

    /// Drain queued events in emission order.
    pub fn drain_events(&mut self) -> Drain<'_, RegisterEvent<K::Value>> {
        self.events.drain(..)
    }

    // ─── Device ─────────────────────────────────────────────────────

    /// Attach a device. The previous one, if any, is detached first.
    pub fn attach(&mut self, device: D) {
        self.detach();
        self.device = Some(device);
    }

    /// Detach the device, forgetting the slot, the timer and pending writes.
    ///
    /// A reply to the forgotten request is treated as foreign.
    pub fn detach(&mut self) -> Option<D> {
        self.in_flight = None;
        self.deadline = None;
        self.status
            .remove(RegisterStatus::ADJUSTING | RegisterStatus::POSTPONED_WRITE);
        self.set_busy(false);
        self.device.take()
    }

    // ─── Operations ─────────────────────────────────────────────────

    /// Request `value`. The write mode decides when it is written.
    pub fn set_value(&mut self, value: K::Value, now: Instant) {
        self.requested = Some(value);

        if self.device.is_none() {
            warn!(register = %self.name, "Value set, but no device is attached");
            return;
        }

        let in_flight = self.in_flight.is_some();
        if self.value != self.target() {
            self.status.insert(RegisterStatus::ADJUSTING);
            match self.mode {
                WriteMode::Delayed(delay) => self.deadline = Some(now + delay),
                WriteMode::Postponed if in_flight => {
                    self.status.insert(RegisterStatus::POSTPONED_WRITE);
                }
                WriteMode::Postponed | WriteMode::Immediate => self.write_value(),
                WriteMode::Explicit => {}
            }
            return;
        }

        // Back to the current value.
        match self.mode {
            WriteMode::Delayed(delay) if in_flight => {
                // The request in flight may still change the value.
                self.status.insert(RegisterStatus::ADJUSTING);
                self.deadline = Some(now + delay);
            }
            WriteMode::Postponed if in_flight => {
                self.status
                    .insert(RegisterStatus::ADJUSTING | RegisterStatus::POSTPONED_WRITE);
            }
            WriteMode::Immediate if in_flight => self.write_value(),
            _ => {
                self.deadline = None;
                self.status.remove(RegisterStatus::ADJUSTING);
            }
        }
    }

    /// Write the requested value now (the explicit write mode's trigger).
    ///
    /// With a request in flight the write follows once it completes.
    pub fn write(&mut self) {
        if self.device.is_none() {
            warn!(register = %self.name, "Write requested, but no device is attached");
            return;
        }
        if self.requested.is_none() {
            debug!(register = %self.name, "Write requested without a value");
            return;
        }

        self.deadline = None;
        if self.in_flight.is_some() {
            self.status.insert(RegisterStatus::POSTPONED_WRITE);
        } else {
            self.write_value();
        }
    }

    /// Fire the delayed write if due at `now`. Returns whether it fired.
    ///
    /// A due write meeting a request in flight is postponed behind it.
    pub fn poll_timer(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {}
            _ => return false,
        }
        self.deadline = None;

        if self.in_flight.is_some() {
            self.status.insert(RegisterStatus::POSTPONED_WRITE);
        } else {
            self.write_value();
        }
        true
    }

    /// React to a completion on the device.
    pub fn on_reply(&mut self, completion: &Completion) {
        let request = &completion.request;
        let own = self.in_flight == Some(request.id);

        if request.function.is_write() {
            if own {
                self.on_write_completed(completion);
            }
        } else if request.function == self.kind.read_function()
            && request.covers(self.address, self.kind.width())
        {
            let offset = usize::from(self.address - request.address);
            let read = if completion.success {
                self.kind.decode(&completion.payload, offset)
            } else {
                None
            };
            if completion.success && read.is_none() {
                debug!(register = %self.name, request_id = %request.id, "Read reply too short");
            }

            if own {
                self.on_verification(read);
            } else if self.in_flight.is_none() {
                let pending = self.is_postponed_write_pending();
                self.set_busy(read.is_none() || pending);
                if let Some(value) = read {
                    self.update_value(value);
                }
            }
        }

        if self.in_flight.is_none() {
            self.flush_postponed();
        }
    }

    // ─── Internals ──────────────────────────────────────────────────

    fn on_write_completed(&mut self, completion: &Completion) {
        if !completion.success {
            self.in_flight = None;
            let pending = self.is_postponed_write_pending();
            self.set_busy(pending);
            self.events.push_back(RegisterEvent::ValueFailed);
            return;
        }

        if self.read_on_write {
            self.request_verification();
            return;
        }

        self.in_flight = None;
        let pending = self.is_postponed_write_pending();
        self.set_busy(pending);
        self.events.push_back(RegisterEvent::ValueWritten);
        // Without verification the written value is taken as current.
        if let Some(value) = self.kind.decode(&completion.request.payload, 0) {
            self.update_value(value);
        }
    }

    fn request_verification(&mut self) {
        let Some(device) = &self.device else {
            return;
        };

        match device.issue_read(self.kind.read_function(), self.address, self.kind.width()) {
            Ok(id) => self.in_flight = Some(id),
            Err(e) => {
                warn!(register = %self.name, "Verification read not issued: {}", e);
                self.on_verification(None);
            }
        }
    }

    fn on_verification(&mut self, read: Option<K::Value>) {
        self.in_flight = None;
        let pending = self.is_postponed_write_pending();
        self.set_busy(pending);

        let event = match &read {
            Some(value) if Some(value) == self.written.as_ref() => RegisterEvent::ValueWritten,
            _ => RegisterEvent::ValueMismatch,
        };
        self.events.push_back(event);

        if let Some(value) = read {
            self.update_value(value);
        }
    }

    fn flush_postponed(&mut self) {
        if !self.is_postponed_write_pending() {
            return;
        }
        self.status.remove(RegisterStatus::POSTPONED_WRITE);

        let target = self.target();
        if target.is_some() && target != self.value {
            self.write_value();
        } else {
            self.status.remove(RegisterStatus::ADJUSTING);
            self.set_busy(false);
        }
    }

    fn write_value(&mut self) {
        self.status.remove(RegisterStatus::ADJUSTING);

        let (Some(device), Some(value)) = (&self.device, &self.requested) else {
            return;
        };
        let payload = self.kind.encode(value);
        let written = self.kind.normalize(value);

        match device.issue_write(self.kind.write_function(), self.address, payload) {
            Ok(id) => {
                debug!(register = %self.name, request_id = %id, "Write issued");
                self.in_flight = Some(id);
                self.written = written;
                self.set_busy(true);
            }
            Err(e) => {
                warn!(register = %self.name, "Write not issued: {}", e);
                self.events.push_back(RegisterEvent::ValueFailed);
                let busy = self.in_flight.is_some();
                self.set_busy(busy);
            }
        }
    }

    /// Requested value as the device would hold it.
    fn target(&self) -> Option<K::Value> {
        let requested = self.requested.as_ref()?;
        Some(
            self.kind
                .normalize(requested)
                .unwrap_or_else(|| requested.clone()),
        )
    }

    fn update_value(&mut self, value: K::Value) {
        if self.value.as_ref() != Some(&value) {
            self.value = Some(value.clone());
            self.events.push_back(RegisterEvent::ValueChanged(value));
        }
    }

    fn set_busy(&mut self, busy: bool) {
        if self.is_busy() != busy {
            self.status.set(RegisterStatus::BUSY, busy);
            self.events.push_back(RegisterEvent::BusyChanged(busy));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Function;
    use crate::request::{Payload, Request};
    use crate::transport::TransportError;
    use crate::value::{Coil, IntRegister, RealRegister};
    use hmi_common::device::Encoding;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Issuer remembering every request; replies are built by the test.
    #[derive(Debug, Default)]
    struct Bus {
        next: Cell<u64>,
        sent: RefCell<Vec<Request>>,
        refuse: Cell<bool>,
    }

    impl Bus {
        fn push(&self, function: Function, address: u16, amount: u16, payload: Payload) -> Result<RequestId, TransportError> {
            if self.refuse.get() {
                return Err(TransportError::Rejected("test".into()));
            }
            self.next.set(self.next.get() + 1);
            let id = RequestId(self.next.get());
            self.sent.borrow_mut().push(Request { id, function, address, amount, payload });
            Ok(id)
        }

        fn last(&self) -> Request {
            self.sent.borrow().last().cloned().unwrap()
        }

        fn count(&self) -> usize {
            self.sent.borrow().len()
        }
    }

    impl RequestIssuer for Bus {
        fn issue_read(&self, function: Function, address: u16, amount: u16) -> Result<RequestId, TransportError> {
            self.push(function, address, amount, Payload::None)
        }

        fn issue_write(&self, function: Function, address: u16, payload: Payload) -> Result<RequestId, TransportError> {
            let amount = payload.len() as u16;
            self.push(function, address, amount, payload)
        }
    }

    fn done(request: Request, success: bool, payload: Payload) -> Completion {
        Completion { request, success, payload }
    }

    fn int(mode: WriteMode, read_on_write: bool) -> (Rc<Bus>, RegisterController<IntRegister, Rc<Bus>>) {
        let bus = Rc::new(Bus::default());
        let mut reg = RegisterController::new("r", 10, IntRegister::new(Encoding::Int16), mode)
            .with_read_on_write(read_on_write);
        reg.attach(Rc::clone(&bus));
        (bus, reg)
    }

    #[test]
    fn detached_set_value_does_no_io() {
        let mut reg: RegisterController<Coil, Rc<Bus>> =
            RegisterController::new("lamp", 0, Coil, WriteMode::Immediate);
        reg.set_value(true, Instant::now());
        assert_eq!(reg.requested(), Some(&true));
        assert!(!reg.is_busy());
        assert!(!reg.is_adjusting());
        assert_eq!(reg.drain_events().count(), 0);
    }

    #[test]
    fn immediate_write_with_verification() {
        let (bus, mut reg) = int(WriteMode::Immediate, true);
        reg.set_value(5, Instant::now());
        let write = bus.last();
        assert_eq!(write.function, Function::WriteHoldingRegister);
        assert_eq!(write.payload, Payload::Words(vec![5]));
        assert!(reg.is_busy());
        assert!(!reg.is_adjusting());

        reg.on_reply(&done(write, true, Payload::None));
        let read = bus.last();
        assert_eq!(read.function, Function::ReadHoldingRegisters);
        assert_eq!(reg.in_flight(), Some(read.id));
        assert!(reg.is_busy());

        reg.on_reply(&done(read, true, Payload::Words(vec![5])));
        assert_eq!(reg.value(), Some(&5));
        assert!(!reg.is_busy());
        assert_eq!(
            reg.drain_events().collect::<Vec<_>>(),
            vec![
                RegisterEvent::BusyChanged(true),
                RegisterEvent::BusyChanged(false),
                RegisterEvent::ValueWritten,
                RegisterEvent::ValueChanged(5),
            ]
        );
    }

    #[test]
    fn verification_mismatch_adopts_device_value() {
        let (bus, mut reg) = int(WriteMode::Immediate, true);
        reg.set_value(5, Instant::now());
        reg.on_reply(&done(bus.last(), true, Payload::None));
        reg.on_reply(&done(bus.last(), true, Payload::Words(vec![4])));
        let events: Vec<_> = reg.drain_events().collect();
        assert!(events.contains(&RegisterEvent::ValueMismatch));
        assert_eq!(reg.value(), Some(&4));
    }

    #[test]
    fn verification_checks_the_value_written() {
        let (bus, mut reg) = int(WriteMode::Postponed, true);
        let now = Instant::now();
        reg.set_value(5, now);
        let write = bus.last();
        reg.set_value(7, now);
        assert!(reg.is_postponed_write_pending());
        reg.drain_events().for_each(drop);

        reg.on_reply(&done(write, true, Payload::None));
        let read = bus.last();
        assert_eq!(read.function, Function::ReadHoldingRegisters);
        reg.on_reply(&done(read, true, Payload::Words(vec![5])));

        assert_eq!(
            reg.drain_events().collect::<Vec<_>>(),
            vec![RegisterEvent::ValueWritten, RegisterEvent::ValueChanged(5)]
        );
        assert_eq!(bus.last().payload, Payload::Words(vec![7]));
        assert!(reg.is_busy());
    }

    #[test]
    fn float_round_trip_does_not_rewrite() {
        let bus = Rc::new(Bus::default());
        let mut reg = RegisterController::new(
            "setpoint",
            20,
            RealRegister::new(Encoding::Float32),
            WriteMode::Immediate,
        )
        .with_read_on_write(false);
        reg.attach(Rc::clone(&bus));
        let now = Instant::now();

        reg.set_value(0.1, now);
        reg.on_reply(&done(bus.last(), true, Payload::None));
        assert_eq!(reg.value(), Some(&f64::from(0.1_f32)));

        reg.set_value(0.1, now);
        assert_eq!(bus.count(), 1);
        assert!(!reg.is_adjusting());
        assert!(!reg.is_busy());
    }

    #[test]
    fn truncated_int16_does_not_rewrite() {
        let (bus, mut reg) = int(WriteMode::Postponed, false);
        let now = Instant::now();
        reg.set_value(70_000, now);
        reg.on_reply(&done(bus.last(), true, Payload::None));
        assert_eq!(reg.value(), Some(&(70_000_i32 as i16 as i32)));

        reg.set_value(70_000, now);
        assert_eq!(bus.count(), 1);
        assert!(!reg.is_adjusting());
    }

    #[test]
    fn failed_verification_read_is_mismatch() {
        let (bus, mut reg) = int(WriteMode::Immediate, true);
        reg.set_value(5, Instant::now());
        reg.on_reply(&done(bus.last(), true, Payload::None));
        reg.on_reply(&done(bus.last(), false, Payload::None));
        assert!(reg.drain_events().any(|e| e == RegisterEvent::ValueMismatch));
        assert_eq!(reg.value(), None);
        assert!(!reg.is_busy());
    }

    #[test]
    fn failed_write_clears_busy() {
        let (bus, mut reg) = int(WriteMode::Immediate, true);
        reg.set_value(5, Instant::now());
        reg.on_reply(&done(bus.last(), false, Payload::None));
        assert!(!reg.is_busy());
        assert_eq!(reg.in_flight(), None);
        assert!(reg.drain_events().any(|e| e == RegisterEvent::ValueFailed));
        assert_eq!(bus.count(), 1);
    }

    #[test]
    fn immediate_races_and_ignores_superseded_reply() {
        let (bus, mut reg) = int(WriteMode::Immediate, false);
        let now = Instant::now();
        reg.set_value(1, now);
        let first = bus.last();
        reg.set_value(2, now);
        let second = bus.last();
        assert_eq!(bus.count(), 2);
        assert_eq!(reg.in_flight(), Some(second.id));

        reg.on_reply(&done(first, true, Payload::None));
        assert_eq!(reg.value(), None);
        reg.on_reply(&done(second, true, Payload::None));
        assert_eq!(reg.value(), Some(&2));
        assert!(!reg.is_busy());
    }

    #[test]
    fn immediate_rewrites_current_value_while_in_flight() {
        let (bus, mut reg) = int(WriteMode::Immediate, false);
        let now = Instant::now();
        reg.set_value(3, now);
        reg.on_reply(&done(bus.last(), true, Payload::None));
        reg.set_value(4, now);
        reg.set_value(3, now);
        assert_eq!(bus.count(), 3);
        assert_eq!(bus.last().payload, Payload::Words(vec![3]));
    }

    #[test]
    fn delayed_write_fires_once_with_latest_value() {
        let (bus, mut reg) = int(WriteMode::Delayed(Duration::from_millis(100)), false);
        let t0 = Instant::now();
        reg.set_value(1, t0);
        reg.set_value(2, t0 + Duration::from_millis(50));
        assert!(reg.is_adjusting());
        assert_eq!(reg.next_deadline(), Some(t0 + Duration::from_millis(150)));

        assert!(!reg.poll_timer(t0 + Duration::from_millis(149)));
        assert_eq!(bus.count(), 0);
        assert!(reg.poll_timer(t0 + Duration::from_millis(150)));
        assert_eq!(bus.count(), 1);
        assert_eq!(bus.last().payload, Payload::Words(vec![2]));
        assert!(!reg.is_adjusting());
        assert!(!reg.poll_timer(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn delayed_back_to_current_cancels_timer() {
        let (bus, mut reg) = int(WriteMode::Delayed(Duration::from_millis(100)), false);
        let t0 = Instant::now();
        reg.set_value(7, t0);
        reg.poll_timer(t0 + Duration::from_millis(100));
        reg.on_reply(&done(bus.last(), true, Payload::None));
        assert_eq!(reg.value(), Some(&7));

        reg.set_value(8, t0 + Duration::from_millis(200));
        reg.set_value(7, t0 + Duration::from_millis(210));
        assert_eq!(reg.next_deadline(), None);
        assert!(!reg.is_adjusting());
        assert_eq!(bus.count(), 1);
    }

    #[test]
    fn delayed_timer_waits_for_request_in_flight() {
        let (bus, mut reg) = int(WriteMode::Delayed(Duration::from_millis(10)), false);
        let t0 = Instant::now();
        reg.set_value(1, t0);
        reg.poll_timer(t0 + Duration::from_millis(10));
        let first = bus.last();

        reg.set_value(2, t0 + Duration::from_millis(11));
        assert!(reg.poll_timer(t0 + Duration::from_millis(21)));
        assert_eq!(bus.count(), 1);
        assert!(reg.is_postponed_write_pending());

        reg.on_reply(&done(first, true, Payload::None));
        assert_eq!(bus.count(), 2);
        assert_eq!(bus.last().payload, Payload::Words(vec![2]));
    }

    #[test]
    fn postponed_coalesces_to_one_follow_up() {
        let (bus, mut reg) = int(WriteMode::Postponed, false);
        let now = Instant::now();
        reg.set_value(5, now);
        let a = bus.last();
        for v in [6, 7, 8, 7] {
            reg.set_value(v, now);
        }
        assert_eq!(bus.count(), 1);
        assert!(reg.is_postponed_write_pending());

        reg.on_reply(&done(a, true, Payload::None));
        assert_eq!(bus.count(), 2);
        assert_eq!(bus.last().payload, Payload::Words(vec![7]));
        assert!(!reg.is_postponed_write_pending());
        assert!(reg.is_busy());
    }

    #[test]
    fn postponed_follow_up_skipped_when_already_current() {
        let (bus, mut reg) = int(WriteMode::Postponed, false);
        let now = Instant::now();
        reg.set_value(5, now);
        let a = bus.last();
        reg.set_value(5, now);
        assert!(reg.is_postponed_write_pending());

        reg.on_reply(&done(a, true, Payload::None));
        assert_eq!(bus.count(), 1);
        assert!(!reg.is_busy());
        assert!(!reg.is_adjusting());
    }

    #[test]
    fn explicit_waits_for_write() {
        let (bus, mut reg) = int(WriteMode::Explicit, false);
        reg.set_value(9, Instant::now());
        assert!(reg.is_adjusting());
        assert_eq!(bus.count(), 0);
        reg.write();
        assert_eq!(bus.count(), 1);
        assert!(!reg.is_adjusting());
    }

    #[test]
    fn explicit_back_to_current_clears_adjusting() {
        let (_bus, mut reg) = int(WriteMode::Explicit, false);
        let now = Instant::now();
        reg.set_value(9, now);
        reg.set_value(9, now);
        assert!(reg.is_adjusting());

        let (bus, mut reg) = int(WriteMode::Explicit, false);
        reg.set_value(1, now);
        reg.write();
        reg.on_reply(&done(bus.last(), true, Payload::None));
        reg.set_value(2, now);
        reg.set_value(1, now);
        assert!(!reg.is_adjusting());
    }

    #[test]
    fn background_read_updates_idle_register() {
        let (_bus, mut reg) = int(WriteMode::Explicit, false);
        let poll = Request {
            id: RequestId(99),
            function: Function::ReadHoldingRegisters,
            address: 8,
            amount: 4,
            payload: Payload::None,
        };
        reg.on_reply(&done(poll.clone(), true, Payload::Words(vec![0, 0, 42, 0])));
        assert_eq!(reg.value(), Some(&42));
        assert!(!reg.is_busy());

        reg.on_reply(&done(poll, false, Payload::None));
        assert!(reg.is_busy());
        assert_eq!(reg.value(), Some(&42));
    }

    #[test]
    fn foreign_read_ignored_while_own_request_in_flight() {
        let (_bus, mut reg) = int(WriteMode::Immediate, true);
        reg.set_value(5, Instant::now());
        let foreign = Request {
            id: RequestId(99),
            function: Function::ReadHoldingRegisters,
            address: 10,
            amount: 1,
            payload: Payload::None,
        };
        reg.on_reply(&done(foreign, true, Payload::Words(vec![1])));
        assert_eq!(reg.value(), None);
        assert!(reg.is_busy());
    }

    #[test]
    fn unrelated_replies_leave_register_unchanged() {
        let (_bus, mut reg) = int(WriteMode::Immediate, false);
        let coil_read = Request {
            id: RequestId(50),
            function: Function::ReadCoils,
            address: 10,
            amount: 1,
            payload: Payload::None,
        };
        let elsewhere = Request {
            id: RequestId(51),
            function: Function::ReadHoldingRegisters,
            address: 11,
            amount: 5,
            payload: Payload::None,
        };
        let foreign_write = Request {
            id: RequestId(52),
            function: Function::WriteHoldingRegister,
            address: 10,
            amount: 1,
            payload: Payload::Words(vec![3]),
        };
        for request in [coil_read, elsewhere, foreign_write] {
            reg.on_reply(&done(request, true, Payload::Bits(vec![true])));
        }
        assert_eq!(reg.value(), None);
        assert_eq!(reg.drain_events().count(), 0);
    }

    #[test]
    fn refused_write_reports_failure() {
        let (bus, mut reg) = int(WriteMode::Immediate, false);
        bus.refuse.set(true);
        reg.set_value(1, Instant::now());
        assert!(!reg.is_busy());
        assert_eq!(reg.in_flight(), None);
        assert_eq!(reg.drain_events().collect::<Vec<_>>(), vec![RegisterEvent::ValueFailed]);
    }

    #[test]
    fn detach_forgets_everything() {
        let (bus, mut reg) = int(WriteMode::Postponed, false);
        let now = Instant::now();
        reg.set_value(1, now);
        reg.set_value(2, now);
        let write = bus.last();
        assert!(reg.detach().is_some());
        assert!(!reg.is_busy());
        assert!(!reg.is_postponed_write_pending());
        assert_eq!(reg.in_flight(), None);

        // Late reply to the forgotten write is foreign now.
        reg.on_reply(&done(write, true, Payload::None));
        assert_eq!(reg.value(), None);
    }

    #[test]
    fn write_mode_from_config() {
        assert_eq!(
            WriteMode::from_config(WriteModeKind::Delayed, 250),
            WriteMode::Delayed(Duration::from_millis(250))
        );
        assert_eq!(WriteMode::from_config(WriteModeKind::Explicit, 250), WriteMode::Explicit);
    }
}
