//! Non-blocking request handles.
//!
//! A send returns a [`RequestHandle`] immediately. The transport later
//! completes the matching [`ResponseSlot`]; the protocol polls the handle on
//! its next tick. Every completion is stamped with a sequence number from a
//! counter shared by all handles of one [`ResponseTracker`], so callers can
//! tell which of several responses arrived first.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot::{self, error::TryRecvError};

use crate::error::GossipError;
use crate::membership::{MemberId, MembershipEvent};
use crate::protocol::{GossipRequest, GossipResponse};

/// A response as handed over by the transport
#[derive(Debug)]
struct Arrival {
    sequence: u64,
    response: GossipResponse,
}

#[derive(Debug)]
enum HandleState {
    Pending,
    Received {
        sequence: u64,
        response: Option<GossipResponse>,
    },
    Failed(GossipError),
}

#[derive(Debug)]
pub struct RequestHandle {
    target: MemberId,
    deadline: Instant,
    receiver: Option<oneshot::Receiver<Result<Arrival, String>>>,
    state: HandleState,
}

impl RequestHandle {
    /// A handle that failed before anything was sent
    pub fn failed(target: MemberId, deadline: Instant, reason: impl Into<String>) -> Self {
        Self {
            target,
            deadline,
            receiver: None,
            state: HandleState::Failed(GossipError::Transport(reason.into())),
        }
    }

    pub fn target(&self) -> &MemberId {
        &self.target
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Pick up a completion from the transport, if any. Never blocks.
    pub fn poll(&mut self) {
        if !matches!(self.state, HandleState::Pending) {
            return;
        }
        let Some(receiver) = self.receiver.as_mut() else {
            return;
        };
        match receiver.try_recv() {
            Ok(Ok(Arrival {
                response: GossipResponse::Nack { reason },
                ..
            })) => {
                self.state = HandleState::Failed(GossipError::Rejected(reason));
                self.receiver = None;
            }
            Ok(Ok(Arrival { sequence, response })) => {
                self.state = HandleState::Received {
                    sequence,
                    response: Some(response),
                };
                self.receiver = None;
            }
            Ok(Err(reason)) => {
                self.state = HandleState::Failed(GossipError::Transport(reason));
                self.receiver = None;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Closed) => {
                self.state = HandleState::Failed(transport_error!("request abandoned by transport"));
                self.receiver = None;
            }
        }
    }

    pub fn is_received(&self) -> bool {
        matches!(self.state, HandleState::Received { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, HandleState::Failed(_))
    }

    /// True if nothing arrived before the deadline
    pub fn is_timed_out(&self, now: Instant) -> bool {
        matches!(self.state, HandleState::Pending) && now >= self.deadline
    }

    /// Failed or timed out: this handle will never deliver
    pub fn is_done_without_response(&self, now: Instant) -> bool {
        self.is_failed() || self.is_timed_out(now)
    }

    /// Arrival sequence number of a received response
    pub fn arrival(&self) -> Option<u64> {
        match self.state {
            HandleState::Received { sequence, .. } => Some(sequence),
            _ => None,
        }
    }

    /// True if the peer answered with an explicit NACK
    pub fn is_rejected(&self) -> bool {
        matches!(self.state, HandleState::Failed(GossipError::Rejected(_)))
    }

    /// Why the request failed: `Rejected` for a NACK, `Transport` otherwise
    pub fn failure(&self) -> Option<&GossipError> {
        match &self.state {
            HandleState::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Take the received payload; `None` if nothing arrived or already taken
    pub fn take_response(&mut self) -> Option<GossipResponse> {
        match &mut self.state {
            HandleState::Received { response, .. } => response.take(),
            _ => None,
        }
    }
}

/// Completion side of a [`RequestHandle`], owned by the transport
#[derive(Debug)]
pub struct ResponseSlot {
    sender: oneshot::Sender<Result<Arrival, String>>,
    arrivals: Arc<AtomicU64>,
}

impl ResponseSlot {
    pub fn complete(self, response: GossipResponse) {
        let sequence = self.arrivals.fetch_add(1, Ordering::SeqCst);
        // the requester may have given up already
        let _ = self.sender.send(Ok(Arrival { sequence, response }));
    }

    pub fn fail(self, reason: impl Into<String>) {
        let _ = self.sender.send(Err(reason.into()));
    }
}

/// Creates handle/slot pairs sharing one arrival counter
#[derive(Clone, Debug, Default)]
pub struct ResponseTracker {
    arrivals: Arc<AtomicU64>,
}

impl ResponseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, target: MemberId, deadline: Instant) -> (RequestHandle, ResponseSlot) {
        let (sender, receiver) = oneshot::channel();
        let handle = RequestHandle {
            target,
            deadline,
            receiver: Some(receiver),
            state: HandleState::Pending,
        };
        let slot = ResponseSlot {
            sender,
            arrivals: self.arrivals.clone(),
        };
        (handle, slot)
    }
}

/// The transport capability the protocol core consumes.
///
/// Implementations must not block: a send only enqueues, the outcome is
/// observed through the returned handle.
pub trait GossipEventSender {
    fn send_request(
        &mut self,
        to: &MemberId,
        request: GossipRequest,
        deadline: Instant,
    ) -> RequestHandle;

    fn send_response(&mut self, to: &MemberId, request_id: u64, response: GossipResponse);

    fn send_ping(
        &mut self,
        to: &MemberId,
        events: Vec<MembershipEvent>,
        deadline: Instant,
    ) -> RequestHandle {
        self.send_request(to, GossipRequest::Ping { events }, deadline)
    }

    fn send_ping_req(
        &mut self,
        relay: &MemberId,
        target: &MemberId,
        events: Vec<MembershipEvent>,
        deadline: Instant,
    ) -> RequestHandle {
        let request = GossipRequest::PingReq {
            target: target.clone(),
            events,
        };
        self.send_request(relay, request, deadline)
    }

    fn send_sync_request(
        &mut self,
        to: &MemberId,
        events: Vec<MembershipEvent>,
        deadline: Instant,
    ) -> RequestHandle {
        self.send_request(to, GossipRequest::SyncRequest { events }, deadline)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn ack() -> GossipResponse {
        GossipResponse::Ack { events: vec![] }
    }

    #[test]
    fn test_pending_until_completed() {
        let tracker = ResponseTracker::new();
        let now = Instant::now();
        let (mut handle, slot) = tracker.register(MemberId::from("a"), now + Duration::from_secs(1));

        handle.poll();
        assert!(!handle.is_received());
        assert!(!handle.is_failed());
        assert!(!handle.is_timed_out(now));
        assert!(handle.is_timed_out(now + Duration::from_secs(1)));

        slot.complete(ack());
        handle.poll();
        assert!(handle.is_received());
        assert!(!handle.is_timed_out(now + Duration::from_secs(5)));
        assert_eq!(handle.take_response(), Some(ack()));
        assert_eq!(handle.take_response(), None);
    }

    #[test]
    fn test_arrival_order_is_completion_order() {
        let tracker = ResponseTracker::new();
        let deadline = Instant::now() + Duration::from_secs(1);
        let (mut first, first_slot) = tracker.register(MemberId::from("a"), deadline);
        let (mut second, second_slot) = tracker.register(MemberId::from("b"), deadline);

        second_slot.complete(ack());
        first_slot.complete(ack());
        first.poll();
        second.poll();

        assert!(second.arrival() < first.arrival());
    }

    #[test]
    fn test_nack_and_dropped_slot_fail_the_handle() {
        let tracker = ResponseTracker::new();
        let deadline = Instant::now() + Duration::from_secs(1);

        let (mut rejected, slot) = tracker.register(MemberId::from("a"), deadline);
        slot.complete(GossipResponse::Nack {
            reason: "target unreachable".to_string(),
        });
        rejected.poll();
        assert!(rejected.is_failed());
        assert!(rejected.is_rejected());
        assert!(matches!(
            rejected.failure(),
            Some(GossipError::Rejected(reason)) if reason == "target unreachable"
        ));

        let (mut abandoned, slot) = tracker.register(MemberId::from("b"), deadline);
        drop(slot);
        abandoned.poll();
        assert!(abandoned.is_failed());
        assert!(!abandoned.is_rejected());
        assert_eq!(abandoned.failure().map(|e| e.error_type()), Some("transport_error"));
    }

    #[test]
    fn test_failed_handle_never_times_out() {
        let now = Instant::now();
        let handle = RequestHandle::failed(MemberId::from("a"), now, "bad address");
        assert!(handle.is_failed());
        assert!(!handle.is_timed_out(now + Duration::from_secs(10)));
        assert!(handle.is_done_without_response(now));
    }
}
