//! Deterministic in-memory cluster for driving several nodes in lockstep
#![allow(dead_code)]
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

use murmur::gossip::{Gossip, GossipEventSender, RequestHandle, ResponseSlot, ResponseTracker};
use murmur::membership::{GossipTerm, MemberId};
use murmur::protocol::{GossipRequest, GossipResponse, InboundRequest};
use murmur::settings::GossipSettings;

pub const TICK: Duration = Duration::from_millis(10);

enum Outgoing {
    Request {
        to: MemberId,
        request_id: u64,
        request: GossipRequest,
    },
    Response {
        to: MemberId,
        request_id: u64,
        response: GossipResponse,
    },
}

/// Sender that parks messages until the network delivers them
#[derive(Default)]
pub struct LocalSender {
    tracker: ResponseTracker,
    next_request_id: u64,
    pending: HashMap<u64, ResponseSlot>,
    outbox: Vec<Outgoing>,
}

impl GossipEventSender for LocalSender {
    fn send_request(
        &mut self,
        to: &MemberId,
        request: GossipRequest,
        deadline: Instant,
    ) -> RequestHandle {
        self.next_request_id += 1;
        let (handle, slot) = self.tracker.register(to.clone(), deadline);
        self.pending.insert(self.next_request_id, slot);
        self.outbox.push(Outgoing::Request {
            to: to.clone(),
            request_id: self.next_request_id,
            request,
        });
        handle
    }

    fn send_response(&mut self, to: &MemberId, request_id: u64, response: GossipResponse) {
        self.outbox.push(Outgoing::Response {
            to: to.clone(),
            request_id,
            response,
        });
    }
}

pub struct LocalNetwork {
    pub now: Instant,
    settings: GossipSettings,
    nodes: BTreeMap<MemberId, Gossip<LocalSender>>,
    crashed: HashSet<MemberId>,
}

impl LocalNetwork {
    pub fn new(settings: GossipSettings) -> Self {
        Self {
            now: Instant::now(),
            settings,
            nodes: BTreeMap::new(),
            crashed: HashSet::new(),
        }
    }

    /// Add a node; it joins through `contact_points` unless there are none
    pub fn start(&mut self, name: &str, contact_points: &[&str]) -> MemberId {
        let id = MemberId::from(name);
        let mut gossip = Gossip::with_term(
            id.clone(),
            GossipTerm::new(1, 0),
            self.settings.clone(),
            LocalSender::default(),
        );
        if !contact_points.is_empty() {
            gossip.join(contact_points.iter().map(|c| MemberId::from(*c)).collect());
        }
        self.nodes.insert(id.clone(), gossip);
        id
    }

    pub fn node(&self, name: &str) -> &Gossip<LocalSender> {
        &self.nodes[&MemberId::from(name)]
    }

    pub fn node_mut(&mut self, name: &str) -> &mut Gossip<LocalSender> {
        self.nodes
            .get_mut(&MemberId::from(name))
            .expect("unknown node")
    }

    /// The node stops stepping and every message to it is lost
    pub fn crash(&mut self, name: &str) {
        self.crashed.insert(MemberId::from(name));
    }

    pub fn peers_of(&self, name: &str) -> Vec<String> {
        self.node(name)
            .membership()
            .iter()
            .map(|m| m.id().as_str().to_string())
            .collect()
    }

    /// One tick: every live node works, then all messages are delivered
    pub fn step(&mut self) {
        self.now += TICK;
        let now = self.now;
        for (id, gossip) in self.nodes.iter_mut() {
            if !self.crashed.contains(id) {
                gossip.do_work(now);
            }
        }
        self.deliver();
    }

    pub fn run_for(&mut self, duration: Duration) {
        let end = self.now + duration;
        while self.now < end {
            self.step();
        }
    }

    /// Step until `done` holds or `limit` elapsed; returns whether it held
    pub fn run_until(&mut self, limit: Duration, done: impl Fn(&LocalNetwork) -> bool) -> bool {
        let end = self.now + limit;
        while self.now < end {
            if done(self) {
                return true;
            }
            self.step();
        }
        done(self)
    }

    fn deliver(&mut self) {
        let now = self.now;
        // requests produce responses and relayed pings, so drain until quiet
        for _ in 0..8 {
            let mut in_flight = Vec::new();
            for (id, gossip) in self.nodes.iter_mut() {
                for message in gossip.sender_mut().outbox.drain(..) {
                    in_flight.push((id.clone(), message));
                }
            }
            if in_flight.is_empty() {
                return;
            }

            for (from, message) in in_flight {
                if self.crashed.contains(&from) {
                    continue;
                }
                match message {
                    Outgoing::Request {
                        to,
                        request_id,
                        request,
                    } => {
                        if self.crashed.contains(&to) {
                            continue;
                        }
                        if let Some(target) = self.nodes.get_mut(&to) {
                            target.on_request(
                                InboundRequest {
                                    from,
                                    request_id,
                                    request,
                                },
                                now,
                            );
                        }
                    }
                    Outgoing::Response {
                        to,
                        request_id,
                        response,
                    } => {
                        if self.crashed.contains(&to) {
                            continue;
                        }
                        if let Some(requester) = self.nodes.get_mut(&to) {
                            if let Some(slot) = requester.sender_mut().pending.remove(&request_id) {
                                slot.complete(response);
                            }
                        }
                    }
                }
            }
        }
    }
}
