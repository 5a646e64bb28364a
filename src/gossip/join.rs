//! Cluster entry.
//!
//! ```text
//! AwaitJoin --Join--> SendJoin --> AwaitJoinResponse --Received--> SendSyncRequest
//!                        ^                |                               |
//!                        |             Timeout                            v
//!                        +--- AwaitRetryInterval <--Fail/Timeout-- AwaitSyncResponse
//!                                                                         |
//!                                                                     Received
//!                                                                         v
//!                                                                       Joined
//! ```
//!
//! A JOIN fact is piggybacked on a PING to every contact point. The first
//! contact point to answer is asked for its full membership (SYNC). Without
//! any answer the attempt is repeated after the join interval, forever.
use std::time::Instant;

use tracing::{debug, info, trace, warn};

use super::{GossipContext, GossipEventSender, RequestHandle};
use crate::membership::{MemberId, MembershipEventType};
use crate::protocol::GossipResponse;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoinState {
    AwaitJoin,
    SendJoin,
    AwaitJoinResponse,
    SendSyncRequest,
    AwaitSyncResponse,
    AwaitRetryInterval,
    Joined,
}

impl std::fmt::Display for JoinState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JoinState::AwaitJoin => "await-join",
            JoinState::SendJoin => "send-join",
            JoinState::AwaitJoinResponse => "await-join-response",
            JoinState::SendSyncRequest => "send-sync-request",
            JoinState::AwaitSyncResponse => "await-sync-response",
            JoinState::AwaitRetryInterval => "await-retry-interval",
            JoinState::Joined => "joined",
        };
        write!(f, "{}", name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoinTrigger {
    Default,
    Received,
    Timeout,
    Fail,
    Join,
}

/// The transition table. `None` means the trigger is not accepted in `state`.
pub fn transition(state: JoinState, trigger: JoinTrigger) -> Option<JoinState> {
    use JoinState::*;

    match (state, trigger) {
        (AwaitJoin, JoinTrigger::Join) => Some(SendJoin),
        (SendJoin, JoinTrigger::Default) => Some(AwaitJoinResponse),
        (AwaitJoinResponse, JoinTrigger::Received) => Some(SendSyncRequest),
        (AwaitJoinResponse, JoinTrigger::Timeout) => Some(AwaitRetryInterval),
        (SendSyncRequest, JoinTrigger::Default) => Some(AwaitSyncResponse),
        (AwaitSyncResponse, JoinTrigger::Received) => Some(Joined),
        (AwaitSyncResponse, JoinTrigger::Fail | JoinTrigger::Timeout) => Some(AwaitRetryInterval),
        (AwaitRetryInterval, JoinTrigger::Default | JoinTrigger::Join) => Some(SendJoin),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct JoinContext {
    contact_points: Vec<MemberId>,
    requests: Vec<RequestHandle>,
    join_timeout: Option<Instant>,
    next_join_interval: Option<Instant>,
    contact_point: Option<MemberId>,
    sync_request: Option<RequestHandle>,
}

#[derive(Debug)]
pub struct JoinController {
    state: JoinState,
    context: JoinContext,
}

impl Default for JoinController {
    fn default() -> Self {
        Self::new()
    }
}

impl JoinController {
    pub fn new() -> Self {
        Self {
            state: JoinState::AwaitJoin,
            context: JoinContext::default(),
        }
    }

    pub fn state(&self) -> JoinState {
        self.state
    }

    pub fn is_joined(&self) -> bool {
        self.state == JoinState::Joined
    }

    /// Never asked to join
    pub fn is_idle(&self) -> bool {
        self.state == JoinState::AwaitJoin
    }

    /// The contact point that answered the current attempt first
    pub fn contact_point(&self) -> Option<&MemberId> {
        self.context.contact_point.as_ref()
    }

    /// Start joining. Only accepted before the first attempt and while
    /// waiting to retry; returns whether the request was taken.
    pub fn join(&mut self, contact_points: Vec<MemberId>) -> bool {
        match transition(self.state, JoinTrigger::Join) {
            Some(next) => {
                debug!("Join cluster with known contact points: {:?}", contact_points);
                self.context = JoinContext {
                    contact_points,
                    ..Default::default()
                };
                self.state = next;
                true
            }
            None => {
                debug!("Ignoring join request in state {}", self.state);
                false
            }
        }
    }

    /// Run the current state; a transition into a send state runs that
    /// state as well. Returns the number of transitions taken.
    pub fn do_work<S: GossipEventSender>(
        &mut self,
        ctx: &mut GossipContext<S>,
        now: Instant,
    ) -> usize {
        let mut work_count = 0;
        loop {
            let trigger = match self.state {
                JoinState::AwaitJoin | JoinState::Joined => None,
                JoinState::SendJoin => Some(self.send_join(ctx, now)),
                JoinState::AwaitJoinResponse => self.await_join_response(ctx, now),
                JoinState::SendSyncRequest => Some(self.send_sync_request(ctx, now)),
                JoinState::AwaitSyncResponse => self.await_sync_response(ctx, now),
                JoinState::AwaitRetryInterval => self.await_retry_interval(now),
            };
            let Some(trigger) = trigger else {
                break;
            };
            if !self.take(trigger) {
                break;
            }
            work_count += 1;
            if !matches!(self.state, JoinState::SendJoin | JoinState::SendSyncRequest) {
                break;
            }
        }
        work_count
    }

    fn take(&mut self, trigger: JoinTrigger) -> bool {
        let Some(next) = transition(self.state, trigger) else {
            warn!("No join transition from {} on {:?}", self.state, trigger);
            return false;
        };
        match self.state {
            JoinState::AwaitJoinResponse => self.context.requests.clear(),
            JoinState::AwaitSyncResponse => self.context.sync_request = None,
            _ => {}
        }
        trace!("Join state {} -> {}", self.state, next);
        self.state = next;
        true
    }

    fn send_join<S: GossipEventSender>(
        &mut self,
        ctx: &mut GossipContext<S>,
        now: Instant,
    ) -> JoinTrigger {
        let term = ctx.membership.bump_self_term();
        let self_id = ctx.membership.self_id().clone();
        ctx.dissemination
            .add_membership_event(self_id.clone(), MembershipEventType::Join, term);

        self.context.contact_point = None;
        let deadline = now + ctx.settings.join_timeout;
        // one batch for all contact points, so the JOIN reaches each of them
        let events = ctx.outgoing_events();
        for contact_point in &self.context.contact_points {
            if *contact_point == self_id {
                continue;
            }
            trace!("[{}] Spread JOIN to contact point {}", self_id, contact_point);
            let handle = ctx.sender.send_ping(contact_point, events.clone(), deadline);
            self.context.requests.push(handle);
        }

        self.context.join_timeout = Some(deadline);
        JoinTrigger::Default
    }

    fn await_join_response<S: GossipEventSender>(
        &mut self,
        ctx: &mut GossipContext<S>,
        now: Instant,
    ) -> Option<JoinTrigger> {
        for handle in self.context.requests.iter_mut() {
            handle.poll();
        }

        // the earliest arrival wins, wherever it sits in the list
        let first = self
            .context
            .requests
            .iter_mut()
            .filter(|h| h.is_received())
            .min_by_key(|h| h.arrival());

        if let Some(handle) = first {
            let contact_point = handle.target().clone();
            trace!("Received JOIN response from contact point {}", contact_point);
            if let Some(response) = handle.take_response() {
                ctx.apply_events(response.events(), now);
            }
            self.context.contact_point = Some(contact_point);
            return Some(JoinTrigger::Received);
        }

        if now >= self.context.join_timeout.unwrap_or(now) {
            warn!(
                "[{}] Failed to contact any of {:?}. Try again in {}ms",
                ctx.membership.self_id(),
                self.context.contact_points,
                ctx.settings.join_interval.as_millis()
            );
            self.context.next_join_interval = Some(now + ctx.settings.join_interval);
            return Some(JoinTrigger::Timeout);
        }
        None
    }

    fn send_sync_request<S: GossipEventSender>(
        &mut self,
        ctx: &mut GossipContext<S>,
        now: Instant,
    ) -> JoinTrigger {
        if let Some(contact_point) = &self.context.contact_point {
            trace!("Send SYNC request to {}", contact_point);
            let events = ctx.outgoing_events();
            let deadline = now + ctx.settings.sync_timeout;
            let handle = ctx.sender.send_sync_request(contact_point, events, deadline);
            self.context.sync_request = Some(handle);
        }
        JoinTrigger::Default
    }

    fn await_sync_response<S: GossipEventSender>(
        &mut self,
        ctx: &mut GossipContext<S>,
        now: Instant,
    ) -> Option<JoinTrigger> {
        let contact_point = self.context.contact_point.clone().unwrap_or_default();
        let retry_at = now + ctx.settings.join_interval;

        let Some(handle) = self.context.sync_request.as_mut() else {
            self.context.next_join_interval = Some(retry_at);
            return Some(JoinTrigger::Fail);
        };
        handle.poll();

        if handle.is_received() {
            match handle.take_response() {
                Some(GossipResponse::Sync { members }) => {
                    ctx.apply_snapshot(&members, now);
                }
                Some(other) => {
                    ctx.apply_events(other.events(), now);
                }
                None => {}
            }
            info!(
                "[{}] Joined cluster through {} with {} other members",
                ctx.membership.self_id(),
                contact_point,
                ctx.membership.len()
            );
            self.context = JoinContext::default();
            return Some(JoinTrigger::Received);
        }

        if handle.is_failed() {
            if let Some(error) = handle.failure() {
                debug!(
                    "Failed to receive SYNC response from {} ({}): {}",
                    contact_point,
                    error.error_type(),
                    error
                );
            }
            self.context.next_join_interval = Some(retry_at);
            return Some(JoinTrigger::Fail);
        }

        if handle.is_timed_out(now) {
            warn!(
                "No SYNC response from {}. Try again in {}ms",
                contact_point,
                ctx.settings.join_interval.as_millis()
            );
            self.context.next_join_interval = Some(retry_at);
            return Some(JoinTrigger::Timeout);
        }
        None
    }

    fn await_retry_interval(&mut self, now: Instant) -> Option<JoinTrigger> {
        match self.context.next_join_interval {
            Some(at) if now < at => None,
            _ => Some(JoinTrigger::Default),
        }
    }
}
