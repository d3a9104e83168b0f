//! In-memory mailbox transport.
//!
//! [`LoopbackTransport`] answers mailbox requests from a per-device object
//! dictionary instead of a bus. Each device behaves like a real mailbox:
//! one request at a time, answered after a configurable number of polls.
//! A device can be made unresponsive to exercise timeouts.
//!
//! Object dictionaries are filled at setup time; `start` and `poll` only
//! touch existing entries and never allocate.

use crate::mailbox::{MailboxHandle, MailboxOperation, MailboxTransaction};
use crate::transport::{MailboxTransport, RequestStatus, TransportError};

#[derive(Debug, Clone, Copy)]
struct ObjectEntry {
    index: u16,
    subindex: u8,
    raw: u32,
}

#[derive(Debug, Clone, Copy)]
struct ActiveRequest {
    index: u16,
    subindex: u8,
    operation: MailboxOperation,
    raw_value: u32,
    remaining: u32,
    outcome: Option<RequestStatus>,
}

#[derive(Debug, Clone)]
struct Endpoint {
    objects: Vec<ObjectEntry>,
    responsive: bool,
    active: Option<ActiveRequest>,
}

impl Endpoint {
    fn resolve(&mut self, request: ActiveRequest) -> RequestStatus {
        let mut index_known = false;
        for object in &mut self.objects {
            if object.index != request.index {
                continue;
            }
            index_known = true;
            if object.subindex == request.subindex {
                return match request.operation {
                    MailboxOperation::Read => RequestStatus::Done(object.raw),
                    MailboxOperation::Write => {
                        object.raw = request.raw_value;
                        RequestStatus::Done(request.raw_value)
                    }
                };
            }
        }
        let code = if index_known {
            TransportError::ABORT_NO_SUBINDEX
        } else {
            TransportError::ABORT_NO_OBJECT
        };
        RequestStatus::Failed(TransportError::Aborted(code))
    }
}

/// Mailbox transport backed by in-memory object dictionaries.
///
/// Handles are dense: device `n` is `MailboxHandle(n)`.
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    endpoints: Vec<Endpoint>,
    ack_latency: u32,
}

impl LoopbackTransport {
    /// Create `devices` empty, responsive mailboxes.
    ///
    /// Each request is answered on the poll after `ack_latency` busy polls.
    pub fn new(devices: usize, ack_latency: u32) -> Self {
        let endpoint = Endpoint {
            objects: Vec::new(),
            responsive: true,
            active: None,
        };
        Self {
            endpoints: vec![endpoint; devices],
            ack_latency,
        }
    }

    /// Number of mailboxes.
    pub fn devices(&self) -> usize {
        self.endpoints.len()
    }

    /// Define or overwrite object `index:subindex` of `handle`'s dictionary.
    pub fn insert_object(
        &mut self,
        handle: MailboxHandle,
        index: u16,
        subindex: u8,
        raw: u32,
    ) -> Result<(), TransportError> {
        let endpoint = self.endpoint_mut(handle)?;
        match endpoint
            .objects
            .iter_mut()
            .find(|o| o.index == index && o.subindex == subindex)
        {
            Some(object) => object.raw = raw,
            None => endpoint.objects.push(ObjectEntry {
                index,
                subindex,
                raw,
            }),
        }
        Ok(())
    }

    /// Raw value of object `index:subindex` of `handle`.
    pub fn object(&self, handle: MailboxHandle, index: u16, subindex: u8) -> Option<u32> {
        self.endpoints
            .get(handle.0 as usize)?
            .objects
            .iter()
            .find(|o| o.index == index && o.subindex == subindex)
            .map(|o| o.raw)
    }

    /// Make `handle` answer requests (`true`) or stay busy forever (`false`).
    pub fn set_responsive(
        &mut self,
        handle: MailboxHandle,
        responsive: bool,
    ) -> Result<(), TransportError> {
        self.endpoint_mut(handle)?.responsive = responsive;
        Ok(())
    }

    fn endpoint_mut(&mut self, handle: MailboxHandle) -> Result<&mut Endpoint, TransportError> {
        self.endpoints
            .get_mut(handle.0 as usize)
            .ok_or(TransportError::UnknownHandle(handle.0))
    }
}

impl MailboxTransport for LoopbackTransport {
    fn start(&mut self, request: &MailboxTransaction) -> Result<(), TransportError> {
        let latency = self.ack_latency;
        let endpoint = self.endpoint_mut(request.handle)?;
        if matches!(endpoint.active, Some(active) if active.outcome.is_none()) {
            return Err(TransportError::Busy);
        }
        endpoint.active = Some(ActiveRequest {
            index: request.index,
            subindex: request.subindex,
            operation: request.operation,
            raw_value: request.raw_value(),
            remaining: latency,
            outcome: None,
        });
        Ok(())
    }

    fn poll(&mut self, request: &MailboxTransaction) -> RequestStatus {
        let endpoint = match self.endpoint_mut(request.handle) {
            Ok(endpoint) => endpoint,
            Err(e) => return RequestStatus::Failed(e),
        };
        let Some(mut active) = endpoint.active else {
            return RequestStatus::Idle;
        };
        if let Some(outcome) = active.outcome {
            return outcome;
        }
        if !endpoint.responsive {
            return RequestStatus::Busy;
        }
        let status = if active.remaining > 0 {
            active.remaining -= 1;
            RequestStatus::Busy
        } else {
            let outcome = endpoint.resolve(active);
            active.outcome = Some(outcome);
            outcome
        };
        endpoint.active = Some(active);
        status
    }

    fn cancel(&mut self, request: &MailboxTransaction) {
        if let Ok(endpoint) = self.endpoint_mut(request.handle) {
            endpoint.active = None;
        }
    }
}
