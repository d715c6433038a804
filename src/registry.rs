//! Shared, exclusively-locked collections of active peers and their
//! per-module client shadows (§5 Concurrency & Resource Model).
//!
//! These collections are plain, unlocked containers; the locking
//! discipline ("at most one of Peers/Clients/Users held at a time") lives
//! one layer up, in [`crate::reflector::Reflector`], which wraps each of
//! these in its own `tokio::sync::Mutex`. Clients are held behind
//! `Arc<RwLock<_>>` so a [`crate::stream_registry::Stream`] can keep a
//! weak handle to its owning client without participating in the
//! registry's exclusive lock (§5, §9 cyclic-ownership note).

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::callsign::Callsign;
use crate::client::Client;
use crate::gatekeeper::Protocol;
use crate::peer::Peer;

pub type ClientId = u64;
pub type ClientHandle = Arc<RwLock<Client>>;

/// Every [`Client`] currently subscribed to some module, across all
/// protocols, keyed by an opaque id so a peer's per-module clients can be
/// looked up by address, by protocol, or removed as a batch when their
/// owning peer disconnects.
#[derive(Default)]
pub struct ClientRegistry {
    next_id: ClientId,
    clients: HashMap<ClientId, ClientHandle>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, client: Client) -> ClientId {
        let id = self.next_id;
        self.next_id += 1;
        self.clients.insert(id, Arc::new(RwLock::new(client)));
        id
    }

    pub fn remove(&mut self, id: ClientId) -> Option<ClientHandle> {
        self.clients.remove(&id)
    }

    pub fn handle(&self, id: ClientId) -> Option<ClientHandle> {
        self.clients.get(&id).cloned()
    }

    /// Finds the client subscribed to `module` at `ip` under `protocol`.
    pub async fn find(&self, ip: SocketAddr, protocol: Protocol, module: u8) -> Option<ClientId> {
        for (id, handle) in &self.clients {
            let c = handle.read().await;
            if c.ip() == ip && c.protocol() == protocol && c.module() == module {
                return Some(*id);
            }
        }
        None
    }

    /// Iterates every client id subscribed to `protocol`, the equivalent
    /// of the original's `FindNextClient` cursor; the caller reads/writes
    /// each handle individually since a registry-wide hold would violate
    /// the "brief, single-collection lock" contract.
    pub fn ids_for_protocol(&self, protocol: Protocol) -> Vec<ClientId> {
        // The filter below briefly borrows `read()` synchronously via
        // try_read, which always succeeds here because nothing else holds
        // a per-client lock while the registry-level lock is held.
        self.clients
            .iter()
            .filter_map(|(id, handle)| {
                handle
                    .try_read()
                    .ok()
                    .filter(|c| c.protocol() == protocol)
                    .map(|_| *id)
            })
            .collect()
    }

    pub fn remove_many(&mut self, ids: &[ClientId]) {
        for id in ids {
            self.clients.remove(id);
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

struct PeerEntry {
    peer: Peer,
    client_ids: Vec<ClientId>,
}

/// Every linked [`Peer`], keyed by `(ip, protocol)`. Peer lookup ignores
/// UDP port (§3): a peer's link is identified by its address, not the
/// ephemeral source port of whichever datagram last arrived from it.
#[derive(Default)]
pub struct PeerRegistry {
    peers: HashMap<(IpAddr, Protocol), PeerEntry>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, ip: IpAddr, protocol: Protocol) -> bool {
        self.peers.contains_key(&(ip, protocol))
    }

    pub fn find(&self, ip: IpAddr, protocol: Protocol) -> Option<&Peer> {
        self.peers.get(&(ip, protocol)).map(|e| &e.peer)
    }

    pub fn find_mut(&mut self, ip: IpAddr, protocol: Protocol) -> Option<&mut Peer> {
        self.peers.get_mut(&(ip, protocol)).map(|e| &mut e.peer)
    }

    pub fn find_by_callsign(&self, callsign: &Callsign, protocol: Protocol) -> Option<&Peer> {
        self.peers
            .values()
            .map(|e| &e.peer)
            .find(|p| p.callsign().has_same_callsign(callsign) && protocol == Protocol::Urf)
    }

    /// Inserts a new peer along with the ids of the per-module clients
    /// already materialized for it in the [`ClientRegistry`].
    pub fn insert(&mut self, ip: IpAddr, protocol: Protocol, peer: Peer, client_ids: Vec<ClientId>) {
        self.peers.insert((ip, protocol), PeerEntry { peer, client_ids });
    }

    /// Removes the peer at `(ip, protocol)` and returns the ids of the
    /// clients it owned, so the caller can remove them from the
    /// [`ClientRegistry`] in a separate, non-nested lock acquisition.
    pub fn remove(&mut self, ip: IpAddr, protocol: Protocol) -> Option<Vec<ClientId>> {
        self.peers.remove(&(ip, protocol)).map(|e| e.client_ids)
    }

    pub fn iter_protocol(&self, protocol: Protocol) -> impl Iterator<Item = (IpAddr, &Peer)> {
        self.peers
            .iter()
            .filter(move |((_, p), _)| *p == protocol)
            .map(|((ip, _), e)| (*ip, &e.peer))
    }

    pub fn iter_protocol_mut(&mut self, protocol: Protocol) -> impl Iterator<Item = (IpAddr, &mut Peer)> {
        self.peers
            .iter_mut()
            .filter(move |((_, p), _)| *p == protocol)
            .map(|((ip, _), e)| (*ip, &mut e.peer))
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callsign::Callsign;
    use crate::peer::{PeerKind, Version};

    #[tokio::test]
    async fn client_find_by_ip_protocol_module() {
        let mut reg = ClientRegistry::new();
        let ip: SocketAddr = "127.0.0.1:10017".parse().unwrap();
        let cs = Callsign::from_str_padded("N7TAE");
        let id = reg.insert(Client::new(cs, ip, Protocol::Urf, b'A', crate::peer::ProtocolRevision::Rev2));
        assert_eq!(reg.find(ip, Protocol::Urf, b'A').await, Some(id));
        assert_eq!(reg.find(ip, Protocol::Urf, b'B').await, None);
    }

    #[test]
    fn peer_removal_returns_owned_client_ids() {
        let mut peers = PeerRegistry::new();
        let mut clients = ClientRegistry::new();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let sock: SocketAddr = "127.0.0.1:10017".parse().unwrap();
        let cs = Callsign::from_str_padded("N7TAE");
        let client_id = clients.insert(Client::new(cs, sock, Protocol::Urf, b'A', crate::peer::ProtocolRevision::Rev2));
        let peer = Peer::new(cs, sock, PeerKind::Urf, "A".into(), Version::new(2, 0, 0));
        peers.insert(ip, Protocol::Urf, peer, vec![client_id]);

        assert!(peers.contains(ip, Protocol::Urf));
        let owned = peers.remove(ip, Protocol::Urf).unwrap();
        clients.remove_many(&owned);
        assert!(clients.is_empty());
    }
}
