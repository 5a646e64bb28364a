//! Failure detection.
//!
//! Once per probe interval one member is probed, round-robin:
//!
//! 1. PING the member and wait for an ACK until the probe timeout.
//! 2. Without an ACK, ask up to `probe_indirect_nodes` random alive members
//!    to PING it for us (PING-REQ) and wait for any relayed ACK.
//! 3. Without any ACK the member becomes suspect. A suspect that does not
//!    refute the suspicion before its deadline is confirmed dead and removed.
use std::time::Instant;

use rand::seq::SliceRandom;
use tracing::{debug, info, trace};

use super::{GossipContext, GossipEventSender, RequestHandle};
use crate::membership::{
    Member, MemberId, MembershipCursor, MembershipEventType, MembershipList, MembershipStatus,
};
use crate::protocol::GossipResponse;

#[derive(Debug)]
enum ProbeState {
    AwaitNextProbe,
    AwaitAck {
        target: MemberId,
        handle: RequestHandle,
    },
    AwaitIndirectAck {
        target: MemberId,
        handles: Vec<RequestHandle>,
    },
}

#[derive(Debug)]
pub struct FailureDetector {
    state: ProbeState,
    cursor: MembershipCursor,
    next_probe: Option<Instant>,
}

impl Default for FailureDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl FailureDetector {
    pub fn new() -> Self {
        Self {
            state: ProbeState::AwaitNextProbe,
            cursor: MembershipCursor::default(),
            next_probe: None,
        }
    }

    /// The member currently being probed
    pub fn probe_target(&self) -> Option<&MemberId> {
        match &self.state {
            ProbeState::AwaitNextProbe => None,
            ProbeState::AwaitAck { target, .. } | ProbeState::AwaitIndirectAck { target, .. } => {
                Some(target)
            }
        }
    }

    pub fn do_work<S: GossipEventSender>(
        &mut self,
        ctx: &mut GossipContext<S>,
        now: Instant,
    ) -> usize {
        let expired = expire_suspicions(ctx, now);
        expired + self.probe(ctx, now)
    }

    fn probe<S: GossipEventSender>(&mut self, ctx: &mut GossipContext<S>, now: Instant) -> usize {
        let state = std::mem::replace(&mut self.state, ProbeState::AwaitNextProbe);
        let (next, work_count) = match state {
            ProbeState::AwaitNextProbe => self.start_probe(ctx, now),
            ProbeState::AwaitAck { target, handle } => await_ack(ctx, target, handle, now),
            ProbeState::AwaitIndirectAck { target, handles } => {
                await_indirect_ack(ctx, target, handles, now)
            }
        };
        self.state = next;
        work_count
    }

    fn start_probe<S: GossipEventSender>(
        &mut self,
        ctx: &mut GossipContext<S>,
        now: Instant,
    ) -> (ProbeState, usize) {
        if matches!(self.next_probe, Some(at) if now < at) {
            return (ProbeState::AwaitNextProbe, 0);
        }
        let Some(target) = self.next_target(&ctx.membership) else {
            return (ProbeState::AwaitNextProbe, 0);
        };
        self.next_probe = Some(now + ctx.settings.probe_interval);

        trace!("[{}] Probe {}", ctx.membership.self_id(), target);
        let events = ctx.outgoing_events();
        let deadline = now + ctx.settings.probe_timeout;
        let handle = ctx.sender.send_ping(&target, events, deadline);
        (ProbeState::AwaitAck { target, handle }, 1)
    }

    fn next_target(&mut self, membership: &MembershipList) -> Option<MemberId> {
        // one full lap at most
        for _ in 0..=membership.len() {
            if !self.cursor.has_next(membership) {
                self.cursor.reset();
            }
            match self.cursor.next(membership) {
                Some(member) if member.status() != MembershipStatus::Dead => {
                    return Some(member.id().clone());
                }
                Some(_) => continue,
                None => return None,
            }
        }
        None
    }
}

fn await_ack<S: GossipEventSender>(
    ctx: &mut GossipContext<S>,
    target: MemberId,
    mut handle: RequestHandle,
    now: Instant,
) -> (ProbeState, usize) {
    handle.poll();

    if !ctx.membership.has_member(&target) {
        trace!("[{}] {} left during probe", ctx.membership.self_id(), target);
        return (ProbeState::AwaitNextProbe, 1);
    }
    if handle.is_received() {
        on_ack(ctx, &target, handle.take_response(), now);
        return (ProbeState::AwaitNextProbe, 1);
    }
    if handle.is_done_without_response(now) {
        debug!(
            "[{}] No ACK from {}, probing indirectly",
            ctx.membership.self_id(),
            target
        );
        return probe_indirect(ctx, target, now);
    }
    (ProbeState::AwaitAck { target, handle }, 0)
}

fn probe_indirect<S: GossipEventSender>(
    ctx: &mut GossipContext<S>,
    target: MemberId,
    now: Instant,
) -> (ProbeState, usize) {
    let relays: Vec<MemberId> = {
        let candidates: Vec<&Member> = ctx
            .membership
            .iter()
            .filter(|m| *m.id() != target && m.status() == MembershipStatus::Alive)
            .collect();
        candidates
            .choose_multiple(&mut rand::thread_rng(), ctx.settings.probe_indirect_nodes)
            .map(|m| m.id().clone())
            .collect()
    };

    if relays.is_empty() {
        suspect(ctx, &target, now);
        return (ProbeState::AwaitNextProbe, 1);
    }

    let deadline = now + ctx.settings.probe_indirect_timeout;
    let mut handles = Vec::with_capacity(relays.len());
    for relay in &relays {
        trace!("[{}] PING-REQ {} via {}", ctx.membership.self_id(), target, relay);
        let events = ctx.outgoing_events();
        handles.push(ctx.sender.send_ping_req(relay, &target, events, deadline));
    }
    (ProbeState::AwaitIndirectAck { target, handles }, 1)
}

fn await_indirect_ack<S: GossipEventSender>(
    ctx: &mut GossipContext<S>,
    target: MemberId,
    mut handles: Vec<RequestHandle>,
    now: Instant,
) -> (ProbeState, usize) {
    for handle in handles.iter_mut() {
        handle.poll();
    }

    if !ctx.membership.has_member(&target) {
        trace!("[{}] {} left during probe", ctx.membership.self_id(), target);
        return (ProbeState::AwaitNextProbe, 1);
    }

    let acked = handles
        .iter_mut()
        .filter(|h| h.is_received())
        .min_by_key(|h| h.arrival());
    if let Some(handle) = acked {
        let response = handle.take_response();
        on_ack(ctx, &target, response, now);
        return (ProbeState::AwaitNextProbe, 1);
    }

    if handles.iter().all(|h| h.is_done_without_response(now)) {
        suspect(ctx, &target, now);
        return (ProbeState::AwaitNextProbe, 1);
    }
    (ProbeState::AwaitIndirectAck { target, handles }, 0)
}

fn on_ack<S: GossipEventSender>(
    ctx: &mut GossipContext<S>,
    target: &MemberId,
    response: Option<GossipResponse>,
    now: Instant,
) {
    if let Some(response) = response {
        ctx.apply_events(response.events(), now);
    }

    let Some(member) = ctx.membership.get(target) else {
        return;
    };
    if member.is_suspect() {
        let term = member.term();
        if ctx.membership.alive_member(target, term) {
            debug!("[{}] {} answered, no longer suspect", ctx.membership.self_id(), target);
            ctx.dissemination
                .add_membership_event(target.clone(), MembershipEventType::Alive, term);
        }
    }
}

fn suspect<S: GossipEventSender>(ctx: &mut GossipContext<S>, target: &MemberId, now: Instant) {
    let Some(member) = ctx.membership.get(target) else {
        return;
    };
    if member.status() != MembershipStatus::Alive {
        return;
    }
    let term = member.term();
    if ctx.membership.suspect_member(target, term, now) {
        info!("[{}] Suspecting {}", ctx.membership.self_id(), target);
        ctx.dissemination
            .add_membership_event(target.clone(), MembershipEventType::Suspect, term);
    }
}

/// Confirm and remove every suspect whose deadline passed
fn expire_suspicions<S: GossipEventSender>(ctx: &mut GossipContext<S>, now: Instant) -> usize {
    let mut confirmed = 0;
    let mut cursor = ctx.membership.cursor();

    while let Some(member) = cursor.next(&ctx.membership) {
        if !member.suspicion_expired(now) {
            continue;
        }
        let id = member.id().clone();
        let term = member.term();
        info!(
            "[{}] Suspicion of {} expired, confirming it dead",
            ctx.membership.self_id(),
            id
        );
        ctx.dissemination
            .add_membership_event(id, MembershipEventType::Confirm, term);
        cursor.remove(&mut ctx.membership);
        confirmed += 1;
    }
    confirmed
}
