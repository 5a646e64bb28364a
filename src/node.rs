//! A running murmur node.
//!
//! One task owns the [`Gossip`] state and is the only writer: it steps the
//! protocol on every tick and answers requests forwarded by the transport.
//! The membership view is published for the HTTP API after each change.
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::error::Result;
use crate::gossip::{Gossip, GossipEventSender, MembershipView};
use crate::membership::{Member, MemberId, MembershipListener};
use crate::protocol::InboundRequest;
use crate::settings::Settings;
use crate::transport::UdpTransport;

pub type SharedView = Arc<RwLock<MembershipView>>;

/// Logs every membership change
#[derive(Clone, Debug)]
pub struct LoggingListener {
    self_id: MemberId,
}

impl LoggingListener {
    pub fn new(self_id: MemberId) -> Self {
        Self { self_id }
    }
}

impl MembershipListener for LoggingListener {
    fn on_add(&mut self, member: &Member) -> Result<()> {
        info!(
            "[{}] Member {} added with term {}",
            self.self_id,
            member.id(),
            member.term()
        );
        Ok(())
    }

    fn on_remove(&mut self, member: &Member) -> Result<()> {
        info!(
            "[{}] Member {} removed ({})",
            self.self_id,
            member.id(),
            member.status()
        );
        Ok(())
    }
}

pub struct Node {
    settings: Settings,
    view: SharedView,
}

impl Node {
    pub fn new(settings: Settings) -> Self {
        let view = MembershipView {
            self_id: settings.member_id(),
            ..Default::default()
        };
        Self {
            settings,
            view: Arc::new(RwLock::new(view)),
        }
    }

    /// Handle to the published membership view
    pub fn view(&self) -> SharedView {
        self.view.clone()
    }

    /// Bind the transport, join the cluster and run until `shutdown`
    /// resolves. On shutdown the node announces that it leaves.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        self.settings.validate()?;
        let self_id = self.settings.member_id();
        let (transport, sender, inbound_rx) =
            UdpTransport::bind(self.settings.udp_listen_addr()?, self_id.clone()).await?;

        let mut gossip = Gossip::new(self_id.clone(), self.settings.gossip.clone(), sender);
        gossip.add_listener(Box::new(LoggingListener::new(self_id.clone())));

        let contact_points = self.settings.contact_points();
        if contact_points.is_empty() {
            info!("[{}] No contact points given, starting a new cluster", self_id);
        } else {
            info!("[{}] Joining cluster through {:?}", self_id, contact_points);
            gossip.join(contact_points);
        }

        run_loop(
            &mut gossip,
            inbound_rx,
            self.settings.tick_interval,
            &self.view,
            shutdown,
        )
        .await;

        transport.shutdown();
        Ok(())
    }
}

/// Drive `gossip` until `shutdown` resolves.
///
/// After shutdown the node keeps answering requests for one probe timeout
/// so the LEAVE announcement can go out.
pub async fn run_loop<S, F>(
    gossip: &mut Gossip<S>,
    mut inbound_rx: mpsc::Receiver<InboundRequest>,
    tick_interval: Duration,
    view: &SharedView,
    shutdown: F,
) where
    S: GossipEventSender,
    F: Future<Output = ()>,
{
    info!(
        "[{}] Starting gossip loop with {}ms tick interval",
        gossip.self_id(),
        tick_interval.as_millis()
    );

    publish(gossip, view);
    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(request) = inbound_rx.recv() => {
                gossip.on_request(request, Instant::now());
                publish(gossip, view);
            }

            _ = ticker.tick() => {
                if gossip.do_work(Instant::now()) > 0 {
                    publish(gossip, view);
                }
            }

            _ = &mut shutdown => {
                info!("[{}] Shutting down, leaving cluster", gossip.self_id());
                gossip.leave(Instant::now());
                publish(gossip, view);
                break;
            }
        }
    }

    let linger = tokio::time::sleep(gossip.context().settings.probe_timeout);
    tokio::pin!(linger);
    loop {
        tokio::select! {
            Some(request) = inbound_rx.recv() => {
                gossip.on_request(request, Instant::now());
            }
            _ = &mut linger => break,
        }
    }
}

fn publish<S: GossipEventSender>(gossip: &Gossip<S>, view: &SharedView) {
    match view.write() {
        Ok(mut published) => *published = gossip.view(),
        Err(e) => warn!("Membership view lock poisoned: {}", e),
    }
}
