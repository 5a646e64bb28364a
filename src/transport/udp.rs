//! UDP gossip transport.
//!
//! One socket per node. A writer task drains outgoing packets, a reader task
//! decodes incoming ones: responses complete the pending [`ResponseSlot`]
//! registered under their request id, requests are forwarded to the node
//! loop over an mpsc channel.
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::gossip::{GossipEventSender, RequestHandle, ResponseSlot, ResponseTracker};
use crate::membership::MemberId;
use crate::protocol::{GossipPacket, GossipRequest, GossipResponse, InboundRequest, PacketBody};

// Largest payload of a single UDP datagram
const MAX_DATAGRAM_SIZE: usize = 65507;
const INBOUND_QUEUE_SIZE: usize = 1024;
// Slots outliving their deadline by this much are dropped
const PENDING_GRACE: Duration = Duration::from_secs(5);

/// Statistics for the transport
#[derive(Debug, Default)]
pub struct TransportStats {
    pub packets_sent: AtomicU64,
    pub packets_received: AtomicU64,
    pub send_errors: AtomicU64,
    pub decode_errors: AtomicU64,
    pub unmatched_responses: AtomicU64,
}

type PendingSlots = Arc<Mutex<HashMap<u64, (Instant, ResponseSlot)>>>;

fn lock_pending(pending: &PendingSlots) -> MutexGuard<'_, HashMap<u64, (Instant, ResponseSlot)>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owner of the background IO tasks
#[derive(Debug)]
pub struct UdpTransport {
    local_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl UdpTransport {
    /// Bind the gossip socket and start the IO tasks.
    ///
    /// Returns the transport, the sender handed to [`crate::gossip::Gossip`]
    /// and the stream of requests received from peers.
    pub async fn bind(
        bind_addr: SocketAddr,
        self_id: MemberId,
    ) -> Result<(Self, UdpEventSender, mpsc::Receiver<InboundRequest>)> {
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| transport_error!("Socket creation failed: {}", e))?;
        Self::from_socket(socket, self_id)
    }

    /// Start the IO tasks on an already bound socket
    pub fn from_socket(
        socket: UdpSocket,
        self_id: MemberId,
    ) -> Result<(Self, UdpEventSender, mpsc::Receiver<InboundRequest>)> {
        let local_addr = socket.local_addr()?;
        let socket = Arc::new(socket);
        debug!("[{}] Gossip transport listening on {}", self_id, local_addr);

        let stats = Arc::new(TransportStats::default());
        let pending: PendingSlots = Arc::new(Mutex::new(HashMap::new()));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_SIZE);

        let writer = tokio::spawn(write_loop(socket.clone(), outbound_rx, stats.clone()));
        let reader = tokio::spawn(read_loop(
            socket,
            inbound_tx,
            pending.clone(),
            stats.clone(),
        ));

        let sender = UdpEventSender {
            self_id,
            tracker: ResponseTracker::new(),
            next_request_id: 0,
            pending,
            outbound: outbound_tx,
            stats,
        };
        let transport = Self {
            local_addr,
            tasks: vec![writer, reader],
        };
        Ok((transport, sender, inbound_rx))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the IO tasks; in-flight requests fail on their next poll
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

async fn write_loop(
    socket: Arc<UdpSocket>,
    mut outbound: mpsc::UnboundedReceiver<(SocketAddr, Vec<u8>)>,
    stats: Arc<TransportStats>,
) {
    while let Some((addr, data)) = outbound.recv().await {
        match socket.send_to(&data, addr).await {
            Ok(_) => {
                stats.packets_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                stats.send_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Failed to send {} bytes to {}: {}", data.len(), addr, e);
            }
        }
    }
}

async fn read_loop(
    socket: Arc<UdpSocket>,
    inbound: mpsc::Sender<InboundRequest>,
    pending: PendingSlots,
    stats: Arc<TransportStats>,
) {
    let mut buf = vec![0u8; 65536]; // 64KB buffer

    loop {
        let (len, addr) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                // e.g. ICMP port unreachable surfacing on some platforms
                debug!("UDP receive error: {}", e);
                continue;
            }
        };
        stats.packets_received.fetch_add(1, Ordering::Relaxed);

        let packet = match GossipPacket::deserialize(&buf[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Dropping undecodable packet from {}: {}", addr, e);
                continue;
            }
        };

        match packet.body {
            PacketBody::Response(response) => {
                let slot = lock_pending(&pending).remove(&packet.request_id);
                match slot {
                    Some((_, slot)) => slot.complete(response),
                    None => {
                        stats.unmatched_responses.fetch_add(1, Ordering::Relaxed);
                        trace!(
                            "Late or unknown response {} from {}",
                            packet.request_id,
                            packet.sender
                        );
                    }
                }
            }
            PacketBody::Request(request) => {
                let inbound_request = InboundRequest {
                    from: packet.sender,
                    request_id: packet.request_id,
                    request,
                };
                if inbound.send(inbound_request).await.is_err() {
                    debug!("Inbound request channel closed, stopping receiver");
                    return;
                }
            }
        }
    }
}

/// [`GossipEventSender`] over UDP. Sends never block: packets are queued
/// for the writer task.
#[derive(Debug)]
pub struct UdpEventSender {
    self_id: MemberId,
    tracker: ResponseTracker,
    next_request_id: u64,
    pending: PendingSlots,
    outbound: mpsc::UnboundedSender<(SocketAddr, Vec<u8>)>,
    stats: Arc<TransportStats>,
}

impl UdpEventSender {
    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Number of requests still waiting for a response
    pub fn pending_requests(&self) -> usize {
        lock_pending(&self.pending).len()
    }

    fn enqueue(&self, to: &MemberId, packet: &GossipPacket) -> Result<()> {
        let addr = to.socket_addr()?;
        let data = packet.serialize()?;
        if data.len() > MAX_DATAGRAM_SIZE {
            return Err(transport_error!(
                "Packet of {} bytes exceeds the datagram limit",
                data.len()
            ));
        }
        self.outbound
            .send((addr, data))
            .map_err(|_| transport_error!("Transport writer stopped"))
    }
}

impl GossipEventSender for UdpEventSender {
    fn send_request(
        &mut self,
        to: &MemberId,
        request: GossipRequest,
        deadline: Instant,
    ) -> RequestHandle {
        self.next_request_id = self.next_request_id.wrapping_add(1);
        let request_id = self.next_request_id;
        let kind = request.kind();
        let packet = GossipPacket::request(request_id, self.self_id.clone(), request);

        let (handle, slot) = self.tracker.register(to.clone(), deadline);
        {
            let mut pending = lock_pending(&self.pending);
            let now = Instant::now();
            pending.retain(|_, (expires, _)| *expires > now);
            pending.insert(request_id, (deadline + PENDING_GRACE, slot));
        }

        if let Err(e) = self.enqueue(to, &packet) {
            debug!("[{}] Failed to send {} to {}: {}", self.self_id, kind, to, e);
            if let Some((_, slot)) = lock_pending(&self.pending).remove(&request_id) {
                slot.fail(e.to_string());
            }
        }
        handle
    }

    fn send_response(&mut self, to: &MemberId, request_id: u64, response: GossipResponse) {
        let packet = GossipPacket::response(request_id, self.self_id.clone(), response);
        if let Err(e) = self.enqueue(to, &packet) {
            debug!("[{}] Failed to respond to {}: {}", self.self_id, to, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::{GossipTerm, MembershipEvent, MembershipEventType};

    async fn bind_local() -> (UdpTransport, UdpEventSender, mpsc::Receiver<InboundRequest>) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let local = socket.local_addr().unwrap();
        UdpTransport::from_socket(socket, MemberId::from(local)).unwrap()
    }

    #[tokio::test]
    async fn test_ping_ack_exchange() {
        let (transport_a, mut sender_a, _inbound_a) = bind_local().await;
        let (transport_b, mut sender_b, mut inbound_b) = bind_local().await;
        let id_b = MemberId::from(transport_b.local_addr());

        let event = MembershipEvent::new(
            MemberId::from(transport_a.local_addr()),
            MembershipEventType::Join,
            GossipTerm::new(1, 1),
        );
        let mut handle = sender_a.send_ping(
            &id_b,
            vec![event.clone()],
            Instant::now() + Duration::from_secs(5),
        );

        let request = tokio::time::timeout(Duration::from_secs(5), inbound_b.recv())
            .await
            .expect("request should arrive")
            .expect("channel open");
        assert_eq!(request.from, MemberId::from(transport_a.local_addr()));
        assert_eq!(request.request, GossipRequest::Ping { events: vec![event] });

        sender_b.send_response(
            &request.from,
            request.request_id,
            GossipResponse::Ack { events: vec![] },
        );

        let received = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                handle.poll();
                if handle.is_received() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(received.is_ok());
        assert_eq!(
            handle.take_response(),
            Some(GossipResponse::Ack { events: vec![] })
        );
        assert_eq!(sender_a.pending_requests(), 0);

        transport_a.shutdown();
        transport_b.shutdown();
    }

    #[tokio::test]
    async fn test_unresolvable_target_fails_handle() {
        let (transport, mut sender, _inbound) = bind_local().await;

        let mut handle = sender.send_ping(
            &MemberId::from("not-an-address"),
            vec![],
            Instant::now() + Duration::from_secs(1),
        );
        handle.poll();
        assert!(handle.is_failed());
        assert_eq!(sender.pending_requests(), 0);

        transport.shutdown();
    }
}
