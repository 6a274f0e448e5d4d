//! Device transport abstraction and the client that issues requests.
//!
//! A [`DeviceTransport`] only accepts requests; replies come back later
//! as [`Reply`] messages on a channel owned by the host and are resolved
//! through [`DeviceClient::resolve`]. Controllers talk to the client
//! through [`RequestIssuer`], which never blocks.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::correlator::{PendingRequest, RequestCorrelator};
use crate::function::Function;
use crate::request::{Completion, Payload, Reply, Request, RequestId};

/// Errors raised when a request cannot be handed to the transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The transport has shut down.
    #[error("transport closed")]
    Closed,

    /// The transport refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Accepts requests for asynchronous execution.
pub trait DeviceTransport {
    /// Queue `request`. The reply is delivered out of band.
    fn submit(&self, request: &Request) -> Result<(), TransportError>;
}

/// Transport backed by an unbounded channel to a device task.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    requests: mpsc::UnboundedSender<Request>,
}

impl ChannelTransport {
    /// Wrap the sending half of a request channel.
    pub fn new(requests: mpsc::UnboundedSender<Request>) -> Self {
        Self { requests }
    }
}

impl DeviceTransport for ChannelTransport {
    fn submit(&self, request: &Request) -> Result<(), TransportError> {
        self.requests
            .send(request.clone())
            .map_err(|_| TransportError::Closed)
    }
}

/// Issues reads and writes on behalf of register controllers.
pub trait RequestIssuer {
    /// Issue a read of `amount` entries starting at `address`.
    fn issue_read(
        &self,
        function: Function,
        address: u16,
        amount: u16,
    ) -> Result<RequestId, TransportError>;

    /// Issue a write of `payload` starting at `address`.
    fn issue_write(
        &self,
        function: Function,
        address: u16,
        payload: Payload,
    ) -> Result<RequestId, TransportError>;
}

impl<T: RequestIssuer + ?Sized> RequestIssuer for Rc<T> {
    fn issue_read(
        &self,
        function: Function,
        address: u16,
        amount: u16,
    ) -> Result<RequestId, TransportError> {
        (**self).issue_read(function, address, amount)
    }

    fn issue_write(
        &self,
        function: Function,
        address: u16,
        payload: Payload,
    ) -> Result<RequestId, TransportError> {
        (**self).issue_write(function, address, payload)
    }
}

/// Stuck request summary for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleRequest {
    pub id: RequestId,
    pub function: Function,
    pub address: u16,
    pub age: Duration,
}

/// Numbers requests, tracks them and hands them to a transport.
///
/// Shared between controllers as `Rc<DeviceClient<T>>` on one thread.
#[derive(Debug)]
pub struct DeviceClient<T> {
    name: String,
    transport: T,
    next_id: Cell<u64>,
    correlator: RefCell<RequestCorrelator>,
}

impl<T: DeviceTransport> DeviceClient<T> {
    /// Create a client for the device called `name`.
    pub fn new(name: impl Into<String>, transport: T) -> Self {
        Self {
            name: name.into(),
            transport,
            next_id: Cell::new(1),
            correlator: RefCell::new(RequestCorrelator::new()),
        }
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Join a transport reply with its request.
    pub fn resolve(&self, reply: Reply) -> Option<Completion> {
        self.correlator.borrow_mut().resolve(reply)
    }

    /// Number of requests awaiting a reply.
    pub fn outstanding(&self) -> usize {
        self.correlator.borrow().outstanding()
    }

    /// Requests awaiting a reply for longer than `timeout`.
    pub fn stale_requests(&self, now: Instant, timeout: Duration) -> Vec<StaleRequest> {
        self.correlator
            .borrow()
            .stale(now, timeout)
            .map(|pending: &PendingRequest| StaleRequest {
                id: pending.request.id,
                function: pending.request.function,
                address: pending.request.address,
                age: pending.age(now),
            })
            .collect()
    }

    /// Forget every outstanding request; late replies will be dropped.
    pub fn clear_outstanding(&self) -> usize {
        self.correlator.borrow_mut().clear()
    }

    fn submit(
        &self,
        function: Function,
        address: u16,
        amount: u16,
        payload: Payload,
    ) -> Result<RequestId, TransportError> {
        let id = RequestId(self.next_id.get());
        self.next_id.set(id.0.wrapping_add(1));

        let request = Request {
            id,
            function,
            address,
            amount,
            payload,
        };

        // Tracked before submit so a synchronous transport can reply at once.
        self.correlator
            .borrow_mut()
            .track(request.clone(), Instant::now());

        if let Err(e) = self.transport.submit(&request) {
            warn!(device = %self.name, request_id = %id, "Submit failed: {}", e);
            self.correlator.borrow_mut().forget(id);
            return Err(e);
        }

        trace!(device = %self.name, request_id = %id, %function, address, amount, "Request issued");
        Ok(id)
    }
}

impl<T: DeviceTransport> RequestIssuer for DeviceClient<T> {
    fn issue_read(
        &self,
        function: Function,
        address: u16,
        amount: u16,
    ) -> Result<RequestId, TransportError> {
        self.submit(function, address, amount, Payload::None)
    }

    fn issue_write(
        &self,
        function: Function,
        address: u16,
        payload: Payload,
    ) -> Result<RequestId, TransportError> {
        let amount = u16::try_from(payload.len())
            .map_err(|_| TransportError::Rejected(format!("{} entries", payload.len())))?;
        self.submit(function, address, amount, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Recording {
        sent: RefCell<Vec<Request>>,
        closed: Cell<bool>,
    }

    impl DeviceTransport for Recording {
        fn submit(&self, request: &Request) -> Result<(), TransportError> {
            if self.closed.get() {
                return Err(TransportError::Closed);
            }
            self.sent.borrow_mut().push(request.clone());
            Ok(())
        }
    }

    #[test]
    fn ids_are_sequential_and_tracked() {
        let client = DeviceClient::new("plc", Recording::default());
        let a = client.issue_read(Function::ReadCoils, 0, 4).unwrap();
        let b = client
            .issue_write(Function::WriteHoldingRegister, 10, Payload::Words(vec![7]))
            .unwrap();
        assert_eq!((a, b), (RequestId(1), RequestId(2)));
        assert_eq!(client.outstanding(), 2);

        let sent = client.transport.sent.borrow();
        assert_eq!(sent[1].amount, 1);
        assert_eq!(sent[1].payload, Payload::Words(vec![7]));
    }

    #[test]
    fn failed_submit_is_not_tracked() {
        let client = DeviceClient::new("plc", Recording::default());
        client.transport.closed.set(true);
        assert_eq!(
            client.issue_read(Function::ReadCoils, 0, 1),
            Err(TransportError::Closed)
        );
        assert_eq!(client.outstanding(), 0);
    }

    #[test]
    fn resolve_through_client() {
        let client = DeviceClient::new("plc", Recording::default());
        let id = client.issue_read(Function::ReadHoldingRegisters, 3, 2).unwrap();
        let done = client
            .resolve(Reply::ok(id, Payload::Words(vec![1, 2])))
            .unwrap();
        assert_eq!(done.request.address, 3);
        assert_eq!(client.outstanding(), 0);
    }

    #[test]
    fn stale_report() {
        let client = DeviceClient::new("plc", Recording::default());
        let id = client.issue_read(Function::ReadCoils, 0, 1).unwrap();
        let later = Instant::now() + Duration::from_secs(10);
        let stale = client.stale_requests(later, Duration::from_secs(3));
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, id);
        assert!(stale[0].age >= Duration::from_secs(7));
        assert_eq!(client.clear_outstanding(), 1);
    }

    #[test]
    fn channel_transport_reports_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = ChannelTransport::new(tx);
        drop(rx);
        let client = DeviceClient::new("plc", transport);
        assert_eq!(
            client.issue_read(Function::ReadCoils, 0, 1),
            Err(TransportError::Closed)
        );
    }
}
