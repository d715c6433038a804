//! The core UDP task loop: receive, classify, authorize, dispatch;
//! keepalive clock; peer reconnection clock; queued outbound fan-out
//! (§4.4-§4.6).

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::callsign::Callsign;
use crate::client::Client;
use crate::config::{BindMode, ReflectorConfig};
use crate::error::ReflectorError;
use crate::gatekeeper::Protocol;
use crate::peer::{Peer, PeerKind, ProtocolRevision, Version};
use crate::reflector::Reflector;
use crate::wire::control::{encode_connect, encode_connect_ack, encode_connect_nack, encode_disconnect, encode_keepalive};
use crate::wire::frame::{encode_voice_frame, truncate_to_legacy};
use crate::wire::{classify, Connect, ConnectAck, ConnectNack, Disconnect, KeepAlive, Packet};
use std::sync::Arc;

/// The bounded wait on each receive attempt (§4.4): bounds shutdown
/// latency since nothing else in the loop blocks longer.
const RECEIVE_WAIT: Duration = Duration::from_millis(20);

/// The version this reflector advertises in its own Connect/ConnectAck
/// packets, always capable of revision-2 framing.
const OUR_VERSION: Version = Version { major: 2, minor: 0, revision: 0 };

struct Sockets {
    primary: UdpSocket,
    secondary: Option<UdpSocket>,
}

impl Sockets {
    async fn bind(bind_mode: BindMode, port: u16) -> Result<Self, ReflectorError> {
        match bind_mode {
            BindMode::V4 => {
                let primary = UdpSocket::bind(("0.0.0.0", port))
                    .await
                    .map_err(|e| ReflectorError::bind(e.to_string()))?;
                Ok(Self { primary, secondary: None })
            }
            BindMode::V6 => {
                let primary = UdpSocket::bind(("::", port))
                    .await
                    .map_err(|e| ReflectorError::bind(e.to_string()))?;
                Ok(Self { primary, secondary: None })
            }
            BindMode::Dual => {
                let primary = UdpSocket::bind(("0.0.0.0", port))
                    .await
                    .map_err(|e| ReflectorError::bind(e.to_string()))?;
                let secondary = UdpSocket::bind(("::", port))
                    .await
                    .map_err(|e| ReflectorError::bind(e.to_string()))?;
                Ok(Self { primary, secondary: Some(secondary) })
            }
        }
    }

    async fn receive(&self) -> Option<(Vec<u8>, SocketAddr)> {
        let mut primary_buf = [0u8; 2048];
        if let Some(secondary) = &self.secondary {
            let mut secondary_buf = [0u8; 2048];
            tokio::select! {
                res = self.primary.recv_from(&mut primary_buf) => {
                    res.ok().map(|(n, addr)| (primary_buf[..n].to_vec(), addr))
                }
                res = secondary.recv_from(&mut secondary_buf) => {
                    res.ok().map(|(n, addr)| (secondary_buf[..n].to_vec(), addr))
                }
                _ = tokio::time::sleep(RECEIVE_WAIT) => None,
            }
        } else {
            match timeout(RECEIVE_WAIT, self.primary.recv_from(&mut primary_buf)).await {
                Ok(Ok((n, addr))) => Some((primary_buf[..n].to_vec(), addr)),
                _ => None,
            }
        }
    }

    async fn send_to(&self, buf: &[u8], addr: SocketAddr) {
        let sock = match (&addr, &self.secondary) {
            (SocketAddr::V6(_), Some(secondary)) => secondary,
            _ => &self.primary,
        };
        if let Err(e) = sock.send_to(buf, addr).await {
            tracing::debug!(error = %e, %addr, "send failed (transient I/O, ignored)");
        }
    }
}

struct Timers {
    keepalive_period: Duration,
    keepalive_timeout: Duration,
    reconnect_period: Duration,
    stream_timeout: Duration,
    listen_port: u16,
}

pub struct PeerProtocol {
    reflector: Arc<Reflector>,
    sockets: Sockets,
    timers: Timers,
    last_keepalive_broadcast: Instant,
    last_peer_link: Instant,
}

impl PeerProtocol {
    pub async fn bind(reflector: Arc<Reflector>, config: &ReflectorConfig) -> Result<Self, ReflectorError> {
        let sockets = Sockets::bind(config.bind_mode, config.listen_port).await?;
        let now = Instant::now();
        Ok(Self {
            reflector,
            sockets,
            timers: Timers {
                keepalive_period: Duration::from_millis(config.keepalive_period_ms),
                keepalive_timeout: Duration::from_millis(config.keepalive_timeout_ms),
                reconnect_period: Duration::from_millis(config.reconnect_period_ms),
                stream_timeout: Duration::from_millis(config.stream_timeout_ms),
                listen_port: config.listen_port,
            },
            last_keepalive_broadcast: now,
            last_peer_link: now,
        })
    }

    /// Runs the cooperative task loop until `cancellation_token` fires.
    pub async fn run(mut self, cancellation_token: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    tracing::info!("peer protocol task shutting down");
                    return;
                }
                datagram = self.sockets.receive() => {
                    if let Some((buf, addr)) = datagram {
                        self.handle_datagram(&buf, addr).await;
                    }
                }
            }

            self.check_streams_timeout().await;
            self.handle_queue().await;

            if self.last_keepalive_broadcast.elapsed() > self.timers.keepalive_period {
                self.handle_keepalives().await;
                self.last_keepalive_broadcast = Instant::now();
            }
            if self.last_peer_link.elapsed() > self.timers.reconnect_period {
                self.handle_peer_links().await;
                self.last_peer_link = Instant::now();
            }
        }
    }

    async fn handle_datagram(&self, buf: &[u8], addr: SocketAddr) {
        match classify(buf) {
            Some(Packet::DvFrame(frame)) => self.handle_dv_frame(frame, addr).await,
            Some(Packet::DvHeader(header)) => self.handle_dv_header(header, addr).await,
            Some(Packet::Connect(connect)) => self.handle_connect(connect, addr).await,
            Some(Packet::ConnectAck(ack)) => self.handle_ack(ack, addr).await,
            Some(Packet::Disconnect(disconnect)) => self.handle_disconnect(disconnect, addr).await,
            Some(Packet::ConnectNack(nack)) => self.handle_nack(nack, addr),
            Some(Packet::KeepAlive(keepalive)) => self.handle_keepalive_packet(keepalive, addr).await,
            None => tracing::warn!(%addr, len = buf.len(), "unrecognized packet"),
        }
    }

    async fn handle_connect(&self, connect: Connect, addr: SocketAddr) {
        tracing::info!(version = ?connect.version, modules = %connect.modules, callsign = %connect.callsign, %addr, "connect packet");

        if !self
            .reflector
            .gatekeeper
            .may_link(&connect.callsign, addr.ip(), Protocol::Urf, &connect.modules)
            .await
        {
            let nack = encode_connect_nack(&self.reflector.callsign);
            self.sockets.send_to(&nack, addr).await;
            return;
        }

        let kind = PeerKind::classify(&connect.callsign);
        let revision = kind.protocol_revision(connect.version);

        // Open question (§9): revision 0 suppresses the ack on a duplicate
        // peer; revision 1+ always acks. Preserved as observed.
        let should_ack = match revision {
            ProtocolRevision::Rev0 => !self.reflector.get_peers().await.contains(addr.ip(), Protocol::Urf),
            ProtocolRevision::Rev1 | ProtocolRevision::Rev2 => true,
        };
        if should_ack {
            let ack = encode_connect_ack(&self.reflector.callsign, OUR_VERSION, &connect.modules);
            self.sockets.send_to(&ack, addr).await;
        }
    }

    async fn handle_ack(&self, ack: ConnectAck, addr: SocketAddr) {
        tracing::info!(modules = %ack.modules, callsign = %ack.callsign, %addr, "ack packet");

        if !self
            .reflector
            .gatekeeper
            .may_link(&ack.callsign, addr.ip(), Protocol::Urf, &ack.modules)
            .await
        {
            return;
        }
        if self.reflector.get_peers().await.contains(addr.ip(), Protocol::Urf) {
            return;
        }

        let kind = PeerKind::classify(&ack.callsign);
        let peer = Peer::new(ack.callsign, addr, kind, ack.modules.clone(), ack.version);
        let revision = peer.revision();
        let callsign = ack.callsign;
        self.reflector
            .add_peer_with_clients(peer, move |module| Client::new(callsign, addr, Protocol::Urf, module, revision))
            .await;
    }

    async fn handle_disconnect(&self, disconnect: Disconnect, addr: SocketAddr) {
        tracing::info!(callsign = %disconnect.callsign, %addr, "disconnect packet");
        self.reflector.remove_peer(addr.ip(), Protocol::Urf).await;
    }

    fn handle_nack(&self, nack: ConnectNack, addr: SocketAddr) {
        tracing::info!(callsign = %nack.callsign, %addr, "nack packet");
    }

    async fn handle_keepalive_packet(&self, _keepalive: KeepAlive, addr: SocketAddr) {
        let mut peers = self.reflector.get_peers().await;
        if let Some(peer) = peers.find_mut(addr.ip(), Protocol::Urf) {
            peer.alive();
        }
    }

    async fn handle_dv_header(&self, mut header: crate::wire::DvHeader, addr: SocketAddr) {
        header.remote_peer_origin = true;

        if !self.reflector.gatekeeper.may_transmit(&header.my_callsign, addr.ip()).await {
            return;
        }

        let already_open = self.reflector.get_streams().await.get(header.stream_id).is_some();
        if already_open {
            self.reflector.get_streams().await.tickle(header.stream_id);
            return;
        }

        let module = header.rpt2_module();
        let client_id = self.reflector.get_clients().await.find(addr, Protocol::Urf, module).await;
        if let Some(client_id) = client_id {
            if self.reflector.open_stream(&header, client_id).await {
                if let Some(handle) = self.reflector.get_clients().await.handle(client_id) {
                    handle.write().await.set_master(true);
                }
            }
        }

        self.reflector
            .heard
            .heard(&header.my_callsign, &header.rpt1_callsign, &header.rpt2_callsign, None);
    }

    async fn handle_dv_frame(&self, mut frame: crate::wire::VoiceFrame, _addr: SocketAddr) {
        frame.remote_peer_origin = true;

        let module = {
            let streams = self.reflector.get_streams().await;
            streams.get(frame.stream_id).map(|s| s.module())
        };
        let Some(module) = module else {
            return;
        };

        if frame.is_last {
            let closed = self.reflector.get_streams().await.close(frame.stream_id);
            if let Some(stream) = closed {
                if let Some(handle) = stream.owning_client() {
                    handle.write().await.set_master(false);
                }
            }
        } else {
            self.reflector.get_streams().await.tickle(frame.stream_id);
        }

        self.reflector.queue.push(frame, module).await;
    }

    /// Drains the outbound queue and fans each locally originated frame
    /// out to every matching, non-master client (§4.5).
    async fn handle_queue(&self) {
        let queued = self.reflector.queue.drain().await;
        for item in queued {
            if item.frame.remote_peer_origin {
                // prevents peer<->peer loops: never echo a frame this
                // protocol itself received back out to its own clients.
                continue;
            }

            let rev2 = encode_voice_frame(&item.frame);
            let legacy = truncate_to_legacy(&rev2);

            let clients = self.reflector.get_clients().await;
            let ids = clients.ids_for_protocol(Protocol::Urf);
            for id in ids {
                let Some(handle) = clients.handle(id) else {
                    continue;
                };
                let (is_master, module, revision, dest) = {
                    let client = handle.read().await;
                    (client.is_master(), client.module(), client.revision(), client.ip())
                };
                if is_master || module != item.module {
                    continue;
                }
                let buf = match revision {
                    ProtocolRevision::Rev0 | ProtocolRevision::Rev1 => &legacy,
                    ProtocolRevision::Rev2 => {
                        if self.reflector.transcoder.is_connected() {
                            &rev2
                        } else {
                            &legacy
                        }
                    }
                };
                self.sockets.send_to(buf, dest).await;
            }
        }
    }

    async fn check_streams_timeout(&self) {
        let closed = self.reflector.get_streams().await.close_timed_out(self.timers.stream_timeout);
        for (_, client) in closed {
            if let Some(handle) = client {
                handle.write().await.set_master(false);
            }
        }
    }

    /// Sends a keepalive to every peer; tickles masters locally, and
    /// disconnects peers that have gone silent past the timeout.
    async fn handle_keepalives(&self) {
        let keepalive = encode_keepalive(&self.reflector.callsign);
        let keepalive_timeout = self.timers.keepalive_timeout;
        let mut to_remove = Vec::new();

        {
            let mut peers = self.reflector.get_peers().await;
            let ips: Vec<IpAddr> = peers.iter_protocol(Protocol::Urf).map(|(ip, _)| ip).collect();
            for ip in ips {
                let Some(peer) = peers.find_mut(ip, Protocol::Urf) else {
                    continue;
                };
                let addr = peer.ip();
                self.sockets.send_to(&keepalive, addr).await;
                if peer.is_master() {
                    peer.alive();
                } else if !peer.is_alive(keepalive_timeout) {
                    tracing::info!(callsign = %peer.callsign(), "peer keepalive timeout");
                    let disconnect = encode_disconnect(&self.reflector.callsign);
                    self.sockets.send_to(&disconnect, addr).await;
                    to_remove.push(ip);
                }
            }
        }

        for ip in to_remove {
            self.reflector.remove_peer(ip, Protocol::Urf).await;
        }
    }

    /// Reconciles live peers against the Gatekeeper's peer-allow list:
    /// disconnects peers no longer listed, and (re)connects listed peers
    /// that aren't live, skipping `XRF*` peers which belong to the
    /// DExtra protocol (§9 open question, preserved as documented).
    async fn handle_peer_links(&self) {
        let allow_list = self.reflector.gatekeeper.peer_list_items().await;

        let mut to_disconnect = Vec::new();
        {
            let peers = self.reflector.get_peers().await;
            for (ip, peer) in peers.iter_protocol(Protocol::Urf) {
                let still_allowed = allow_list.iter().any(|item| item.callsign().has_same_callsign(peer.callsign()));
                if !still_allowed {
                    to_disconnect.push((ip, peer.ip()));
                }
            }
        }
        for (ip, addr) in to_disconnect {
            let disconnect = encode_disconnect(&self.reflector.callsign);
            self.sockets.send_to(&disconnect, addr).await;
            tracing::info!(%addr, "sending disconnect packet to peer no longer on allow list");
            self.reflector.remove_peer(ip, Protocol::Urf).await;
        }

        let xrf_pattern = Callsign::from_str_padded("XRF*");
        for item in allow_list {
            if item.callsign().has_same_callsign_with_wildcard(&xrf_pattern) {
                continue;
            }
            // Only peers with a resolved address can be dialed; today that
            // means a literal IP in the allow-list row (§1: DNS lookup is
            // out of scope).
            let Some(ip) = item.resolved_ip() else {
                continue;
            };
            if self.reflector.get_peers().await.contains(ip, Protocol::Urf) {
                continue;
            }
            let addr = SocketAddr::new(ip, self.timers.listen_port);
            let connect = encode_connect(&self.reflector.callsign, OUR_VERSION, item.modules());
            self.sockets.send_to(&connect, addr).await;
            tracing::info!(callsign = %item.callsign(), %addr, modules = %item.modules(), "sending connect packet to peer");
        }
    }
}
