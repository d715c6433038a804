//! Client: one module-subscription endpoint, owned either by a gateway or
//! by a [`crate::peer::Peer`] as one of its per-module shadows.

use std::net::SocketAddr;
use std::time::Instant;

use crate::callsign::Callsign;
use crate::gatekeeper::Protocol;
use crate::peer::ProtocolRevision;

pub struct Client {
    callsign: Callsign,
    ip: SocketAddr,
    protocol: Protocol,
    module: u8,
    revision: ProtocolRevision,
    last_keepalive: Instant,
    is_master: bool,
}

impl Client {
    pub fn new(callsign: Callsign, ip: SocketAddr, protocol: Protocol, module: u8, revision: ProtocolRevision) -> Self {
        Self {
            callsign,
            ip,
            protocol,
            module,
            revision,
            last_keepalive: Instant::now(),
            is_master: false,
        }
    }

    pub fn callsign(&self) -> &Callsign {
        &self.callsign
    }

    pub fn ip(&self) -> SocketAddr {
        self.ip
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn module(&self) -> u8 {
        self.module
    }

    pub fn revision(&self) -> ProtocolRevision {
        self.revision
    }

    /// True while this client is the source of an ongoing stream; a
    /// master client must never receive fan-out (it would echo its own
    /// transmission back to itself).
    pub fn is_master(&self) -> bool {
        self.is_master
    }

    pub fn set_master(&mut self, master: bool) {
        self.is_master = master;
    }

    pub fn alive(&mut self) {
        self.last_keepalive = Instant::now();
    }

    pub fn is_alive(&self, timeout: std::time::Duration) -> bool {
        self.last_keepalive.elapsed() <= timeout
    }
}
