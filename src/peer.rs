//! Peer: a remote reflector linked to this one, plus the version/revision
//! negotiation that governs how stream frames are sent to it.

use std::net::SocketAddr;
use std::time::Instant;

use crate::callsign::Callsign;

/// Three-part protocol version advertised in Connect/ConnectAck packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub revision: u8,
}

impl Version {
    pub fn new(major: u8, minor: u8, revision: u8) -> Self {
        Self { major, minor, revision }
    }
}

/// The negotiated wire-format variant for a peer or client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProtocolRevision {
    Rev0,
    Rev1,
    Rev2,
}

/// Which version-to-revision mapping applies to a connecting callsign.
/// Native URF peers and "BM" (BrandMeister bridge) peers are negotiated
/// differently; this is a tag, not a class hierarchy (§9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerKind {
    Urf,
    Bm,
}

impl PeerKind {
    /// Classifies a connecting callsign by its `BM*` prefix.
    pub fn classify(callsign: &Callsign) -> Self {
        let bm_pattern = Callsign::from_str_padded("BM*");
        if callsign.has_same_callsign_with_wildcard(&bm_pattern) {
            PeerKind::Bm
        } else {
            PeerKind::Urf
        }
    }

    /// Maps an advertised version triple to a negotiated protocol revision.
    pub fn protocol_revision(&self, version: Version) -> ProtocolRevision {
        match self {
            PeerKind::Urf => match version.major {
                0 => ProtocolRevision::Rev0,
                1 => ProtocolRevision::Rev1,
                _ => ProtocolRevision::Rev2,
            },
            // BrandMeister bridges only ever speak the legacy or latest
            // wire format; there is no intermediate revision to negotiate.
            PeerKind::Bm => match version.major {
                0 => ProtocolRevision::Rev0,
                _ => ProtocolRevision::Rev2,
            },
        }
    }
}

/// A remote reflector linked to this one over the URF/XLX protocol.
///
/// Owned exclusively by [`crate::registry::PeerRegistry`]. Destroying a
/// `Peer` cascades removal of every [`crate::client::Client`] it owns.
pub struct Peer {
    callsign: Callsign,
    ip: SocketAddr,
    kind: PeerKind,
    modules: String,
    version: Version,
    revision: ProtocolRevision,
    last_keepalive: Instant,
    is_master: bool,
    client_modules: Vec<u8>,
}

impl Peer {
    pub fn new(callsign: Callsign, ip: SocketAddr, kind: PeerKind, modules: String, version: Version) -> Self {
        let revision = kind.protocol_revision(version);
        let client_modules = modules.bytes().collect();
        Self {
            callsign,
            ip,
            kind,
            modules,
            version,
            revision,
            last_keepalive: Instant::now(),
            is_master: false,
            client_modules,
        }
    }

    pub fn callsign(&self) -> &Callsign {
        &self.callsign
    }

    pub fn ip(&self) -> SocketAddr {
        self.ip
    }

    pub fn kind(&self) -> PeerKind {
        self.kind
    }

    pub fn modules(&self) -> &str {
        &self.modules
    }

    pub fn revision(&self) -> ProtocolRevision {
        self.revision
    }

    pub fn client_modules(&self) -> &[u8] {
        &self.client_modules
    }

    pub fn is_master(&self) -> bool {
        self.is_master
    }

    pub fn set_master(&mut self, master: bool) {
        self.is_master = master;
    }

    /// Stamps the peer as alive (resets the keepalive timeout clock).
    pub fn alive(&mut self) {
        self.last_keepalive = Instant::now();
    }

    pub fn is_alive(&self, timeout: std::time::Duration) -> bool {
        self.last_keepalive.elapsed() <= timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_bm_prefix() {
        let bm = Callsign::from_str_padded("BM1234");
        assert_eq!(PeerKind::classify(&bm), PeerKind::Bm);
        let urf = Callsign::from_str_padded("N7TAE");
        assert_eq!(PeerKind::classify(&urf), PeerKind::Urf);
    }

    #[test]
    fn urf_revision_mapping() {
        assert_eq!(
            PeerKind::Urf.protocol_revision(Version::new(0, 0, 0)),
            ProtocolRevision::Rev0
        );
        assert_eq!(
            PeerKind::Urf.protocol_revision(Version::new(1, 0, 0)),
            ProtocolRevision::Rev1
        );
        assert_eq!(
            PeerKind::Urf.protocol_revision(Version::new(2, 0, 0)),
            ProtocolRevision::Rev2
        );
    }
}
