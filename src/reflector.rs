//! The explicit context object that replaces the original's process-wide
//! singletons (§9): owns the shared registries, the Gatekeeper, and the
//! collaborator trait objects, and is constructed once at startup and
//! dropped after the protocol task joins.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::client::Client;
use crate::config::ReflectorConfig;
use crate::gatekeeper::Gatekeeper;
use crate::heard::HeardSink;
use crate::outbound_queue::OutboundQueue;
use crate::registry::{ClientId, ClientRegistry, PeerRegistry};
use crate::stream_registry::StreamRegistry;
use crate::transcoder::Transcoder;
use crate::wire::DvHeader;

pub struct Reflector {
    pub callsign: crate::callsign::Callsign,
    peers: Mutex<PeerRegistry>,
    clients: Mutex<ClientRegistry>,
    streams: Mutex<StreamRegistry>,
    pub gatekeeper: Gatekeeper,
    pub queue: OutboundQueue,
    pub heard: Arc<dyn HeardSink>,
    pub transcoder: Arc<dyn Transcoder>,
}

impl Reflector {
    pub fn new(config: &ReflectorConfig, gatekeeper: Gatekeeper, heard: Arc<dyn HeardSink>, transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            callsign: crate::callsign::Callsign::from_str_padded(&config.reflector_callsign),
            peers: Mutex::new(PeerRegistry::new()),
            clients: Mutex::new(ClientRegistry::new()),
            streams: Mutex::new(StreamRegistry::new()),
            gatekeeper,
            queue: OutboundQueue::new(),
            heard,
            transcoder,
        }
    }

    /// A task may hold at most one of {peers, clients, streams} at a
    /// time (§5); these accessors return the guard directly so the
    /// lifetime makes that visible at the call site.
    pub async fn get_peers(&self) -> tokio::sync::MutexGuard<'_, PeerRegistry> {
        self.peers.lock().await
    }

    pub async fn get_clients(&self) -> tokio::sync::MutexGuard<'_, ClientRegistry> {
        self.clients.lock().await
    }

    pub async fn get_streams(&self) -> tokio::sync::MutexGuard<'_, StreamRegistry> {
        self.streams.lock().await
    }

    /// Opens a stream owned by `client_id`, looking the client's shared
    /// handle up in a short-lived `clients` acquisition that is released
    /// before the `streams` lock is taken (no nested acquisition, §5).
    pub async fn open_stream(&self, header: &DvHeader, client_id: ClientId) -> bool {
        let handle = {
            let clients = self.get_clients().await;
            clients.handle(client_id)
        };
        let Some(handle) = handle else {
            return false;
        };
        let mut streams = self.get_streams().await;
        streams.open_stream(header.stream_id, header.rpt2_module(), &handle)
    }

    /// Inserts a newly accepted peer along with one client per module
    /// letter in its module string (§3: "a Peer owns one Client per
    /// letter in its module string").
    pub async fn add_peer_with_clients(&self, peer: crate::peer::Peer, make_client: impl Fn(u8) -> Client) {
        let ip = peer.ip().ip();
        let protocol = crate::gatekeeper::Protocol::Urf;
        let modules: Vec<u8> = peer.client_modules().to_vec();

        let client_ids: Vec<ClientId> = {
            let mut clients = self.get_clients().await;
            modules.iter().map(|&m| clients.insert(make_client(m))).collect()
        };

        let mut peers = self.get_peers().await;
        peers.insert(ip, protocol, peer, client_ids);
    }

    /// Removes a peer and cascades removal of every client it owns
    /// (§3 invariant 3), sequencing the two lock acquisitions rather
    /// than nesting them.
    pub async fn remove_peer(&self, ip: std::net::IpAddr, protocol: crate::gatekeeper::Protocol) -> bool {
        let owned = {
            let mut peers = self.get_peers().await;
            peers.remove(ip, protocol)
        };
        match owned {
            Some(client_ids) => {
                let mut clients = self.get_clients().await;
                clients.remove_many(&client_ids);
                true
            }
            None => false,
        }
    }
}
