//! SWIM-style gossip protocol core.
//!
//! [`Gossip`] is the per-node aggregate. It owns the membership view, the
//! dissemination buffer and the transport handle, and is driven by a
//! cooperative scheduler calling [`Gossip::do_work`] with the current time.
//! Nothing in here blocks: sends return a [`RequestHandle`] that is polled on
//! later ticks.
//!
//! - [`JoinController`] enters the cluster through the configured contact
//!   points (JOIN, then a full SYNC).
//! - [`FailureDetector`] probes members round-robin (PING, then PING-REQ
//!   through relays) and expires suspicions.
//! - [`handler`] applies the facts piggybacked on every message.
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::dissemination::DisseminationComponent;
use crate::membership::{
    GossipTerm, MemberId, MemberRecord, MembershipEvent, MembershipEventType, MembershipList,
    MembershipListener,
};
use crate::protocol::{GossipRequest, GossipResponse, InboundRequest};
use crate::settings::GossipSettings;

pub mod failure_detection;
pub mod handler;
pub mod join;
pub mod request;

#[cfg(test)]
pub(crate) mod testing;

pub use failure_detection::FailureDetector;
pub use join::{JoinController, JoinState, JoinTrigger};
pub use request::{GossipEventSender, RequestHandle, ResponseSlot, ResponseTracker};

/// State shared by the controllers of one node
#[derive(Debug)]
pub struct GossipContext<S> {
    pub settings: GossipSettings,
    pub membership: MembershipList,
    pub dissemination: DisseminationComponent,
    pub sender: S,
}

impl<S: GossipEventSender> GossipContext<S> {
    pub fn new(self_id: MemberId, term: GossipTerm, settings: GossipSettings, sender: S) -> Self {
        Self {
            membership: MembershipList::new(self_id, term, &settings),
            dissemination: DisseminationComponent::new(&settings),
            settings,
            sender,
        }
    }

    /// Facts to piggyback on the next outgoing message
    pub fn outgoing_events(&mut self) -> Vec<MembershipEvent> {
        let cluster_size = self.membership.cluster_size();
        self.dissemination.events_for_message(cluster_size)
    }

    pub fn apply_events(&mut self, events: &[MembershipEvent], now: Instant) -> usize {
        handler::apply_events(&mut self.membership, &mut self.dissemination, events, now)
    }

    pub fn apply_snapshot(&mut self, members: &[MemberRecord], now: Instant) -> usize {
        handler::apply_snapshot(&mut self.membership, &mut self.dissemination, members, now)
    }
}

/// Local membership as published to the status API
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct MembershipView {
    pub self_id: MemberId,
    // taking part in failure detection, either joined or bootstrapped alone
    pub joined: bool,
    pub members: Vec<MemberRecord>,
}

/// A PING-REQ we relay: answered once our own PING to the target settles
#[derive(Debug)]
struct PendingRelay {
    requester: MemberId,
    request_id: u64,
    handle: RequestHandle,
}

#[derive(Debug)]
pub struct Gossip<S> {
    context: GossipContext<S>,
    join: JoinController,
    failure_detector: FailureDetector,
    relays: Vec<PendingRelay>,
    left: bool,
}

impl<S: GossipEventSender> Gossip<S> {
    /// A node whose own term starts at the current wall-clock epoch
    pub fn new(self_id: MemberId, settings: GossipSettings, sender: S) -> Self {
        Self::with_term(self_id, GossipTerm::starting_now(), settings, sender)
    }

    pub fn with_term(
        self_id: MemberId,
        term: GossipTerm,
        settings: GossipSettings,
        sender: S,
    ) -> Self {
        Self {
            context: GossipContext::new(self_id, term, settings, sender),
            join: JoinController::new(),
            failure_detector: FailureDetector::new(),
            relays: Vec::new(),
            left: false,
        }
    }

    pub fn self_id(&self) -> &MemberId {
        self.context.membership.self_id()
    }

    pub fn membership(&self) -> &MembershipList {
        &self.context.membership
    }

    pub fn dissemination(&self) -> &DisseminationComponent {
        &self.context.dissemination
    }

    pub fn sender(&self) -> &S {
        &self.context.sender
    }

    pub fn sender_mut(&mut self) -> &mut S {
        &mut self.context.sender
    }

    pub fn context(&self) -> &GossipContext<S> {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut GossipContext<S> {
        &mut self.context
    }

    pub fn add_listener(&mut self, listener: Box<dyn MembershipListener>) {
        self.context.membership.add_listener(listener);
    }

    pub fn join_state(&self) -> JoinState {
        self.join.state()
    }

    pub fn is_joined(&self) -> bool {
        self.join.is_joined()
    }

    pub fn has_left(&self) -> bool {
        self.left
    }

    /// True while the failure detector runs
    pub fn is_active(&self) -> bool {
        !self.left && (self.join.is_joined() || self.join.is_idle())
    }

    /// Start joining through `contact_points`. Ignored while a join is in
    /// flight, once joined, or after leaving.
    pub fn join(&mut self, contact_points: Vec<MemberId>) -> bool {
        if self.left {
            debug!("[{}] Ignoring join after leave", self.self_id());
            return false;
        }
        self.join.join(contact_points)
    }

    /// Announce that this node leaves the cluster.
    ///
    /// The LEAVE fact rides on one last PING to every known member. The node
    /// keeps answering requests but stops joining and probing.
    pub fn leave(&mut self, now: Instant) {
        if self.left {
            return;
        }
        self.left = true;

        let ctx = &mut self.context;
        let term = ctx.membership.bump_self_term();
        let self_id = ctx.membership.self_id().clone();
        info!("[{}] Leaving cluster with term {}", self_id, term);
        ctx.dissemination
            .add_membership_event(self_id, MembershipEventType::Leave, term);

        let deadline = now + ctx.settings.probe_timeout;
        let members: Vec<MemberId> = ctx.membership.iter().map(|m| m.id().clone()).collect();
        let events = ctx.outgoing_events();
        for member in members {
            // nobody waits for these acks
            let _ = ctx.sender.send_ping(&member, events.clone(), deadline);
        }
    }

    /// Perform one bounded step of protocol work; returns the number of
    /// work items done.
    pub fn do_work(&mut self, now: Instant) -> usize {
        let mut work_count = self.complete_relays(now);
        if self.left {
            return work_count;
        }

        work_count += self.join.do_work(&mut self.context, now);
        if self.join.is_joined() || self.join.is_idle() {
            work_count += self.failure_detector.do_work(&mut self.context, now);
        }
        work_count
    }

    /// Answer a request received from a peer
    pub fn on_request(&mut self, inbound: InboundRequest, now: Instant) {
        let InboundRequest {
            from,
            request_id,
            request,
        } = inbound;
        trace!(
            "[{}] Received {} from {}",
            self.self_id(),
            request.kind(),
            from
        );

        let ctx = &mut self.context;
        match request {
            GossipRequest::Ping { events } => {
                ctx.apply_events(&events, now);
                let events = ctx.outgoing_events();
                ctx.sender
                    .send_response(&from, request_id, GossipResponse::Ack { events });
            }
            GossipRequest::SyncRequest { events } => {
                ctx.apply_events(&events, now);
                let members = ctx.membership.snapshot();
                ctx.sender
                    .send_response(&from, request_id, GossipResponse::Sync { members });
            }
            GossipRequest::PingReq { target, events } => {
                ctx.apply_events(&events, now);
                if ctx.membership.is_self(&target) {
                    let events = ctx.outgoing_events();
                    ctx.sender
                        .send_response(&from, request_id, GossipResponse::Ack { events });
                    return;
                }
                debug!(
                    "[{}] Probing {} on behalf of {}",
                    ctx.membership.self_id(),
                    target,
                    from
                );
                let events = ctx.outgoing_events();
                let deadline = now + ctx.settings.probe_timeout;
                let handle = ctx.sender.send_ping(&target, events, deadline);
                self.relays.push(PendingRelay {
                    requester: from,
                    request_id,
                    handle,
                });
            }
        }
    }

    fn complete_relays(&mut self, now: Instant) -> usize {
        let mut work_count = 0;
        let mut pending = Vec::with_capacity(self.relays.len());

        for mut relay in self.relays.drain(..) {
            relay.handle.poll();
            if relay.handle.is_received() {
                if let Some(response) = relay.handle.take_response() {
                    self.context.apply_events(response.events(), now);
                }
                let events = self.context.outgoing_events();
                self.context.sender.send_response(
                    &relay.requester,
                    relay.request_id,
                    GossipResponse::Ack { events },
                );
                work_count += 1;
            } else if relay.handle.is_done_without_response(now) {
                let reason = match relay.handle.failure() {
                    Some(error) => format!("{} unreachable: {}", relay.handle.target(), error),
                    None => format!("{} unreachable: timed out", relay.handle.target()),
                };
                self.context.sender.send_response(
                    &relay.requester,
                    relay.request_id,
                    GossipResponse::Nack { reason },
                );
                work_count += 1;
            } else {
                pending.push(relay);
            }
        }

        self.relays = pending;
        work_count
    }

    pub fn view(&self) -> MembershipView {
        MembershipView {
            self_id: self.self_id().clone(),
            joined: self.is_active(),
            members: self.context.membership.iter().map(|m| m.record()).collect(),
        }
    }
}
