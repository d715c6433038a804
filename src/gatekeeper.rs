//! Combines the transmitter, node, and peer allow-lists plus an IP
//! blacklist into the two authorization checks the protocol layer needs.

use std::net::IpAddr;
use std::path::PathBuf;

use crate::access_list::{AccessList, AccessListItem};
use crate::callsign::Callsign;

/// Which sibling protocol is asking. This core only ever dispatches
/// [`Protocol::Urf`] itself; the other variants exist so `may_link`'s
/// signature matches the shared gatekeeper contract every gateway-client
/// protocol is expected to call into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Urf,
    Dextra,
    Dplus,
    Dcs,
    M17,
}

pub struct GatekeeperConfig {
    pub transmitter_allow_file: PathBuf,
    pub node_allow_file: PathBuf,
    pub peer_allow_file: PathBuf,
    pub blacklist_file: PathBuf,
}

pub struct Gatekeeper {
    transmitter_allow: AccessList,
    #[allow(dead_code)]
    node_allow: AccessList,
    peer_allow: AccessList,
    blacklist: AccessList,
}

impl Gatekeeper {
    pub fn new() -> Self {
        Self {
            transmitter_allow: AccessList::new(),
            node_allow: AccessList::new(),
            peer_allow: AccessList::new(),
            blacklist: AccessList::new(),
        }
    }

    pub async fn load(&self, config: &GatekeeperConfig) {
        self.transmitter_allow.load_from_file(&config.transmitter_allow_file).await;
        self.node_allow.load_from_file(&config.node_allow_file).await;
        self.peer_allow.load_from_file(&config.peer_allow_file).await;
        self.blacklist.load_from_file(&config.blacklist_file).await;
    }

    /// Re-stats and conditionally reloads all four lists. Intended to be
    /// called from a single background poller tick (§4.2).
    pub async fn reload_if_changed(&self) {
        self.transmitter_allow.reload_if_changed().await;
        self.node_allow.reload_if_changed().await;
        self.peer_allow.reload_if_changed().await;
        self.blacklist.reload_if_changed().await;
    }

    async fn is_blacklisted(&self, ip: IpAddr) -> bool {
        let blacklisted_callsign = Callsign::from_str_padded(&ip.to_string());
        self.blacklist.is_listed_wildcard(&blacklisted_callsign).await
    }

    pub async fn may_transmit(&self, callsign: &Callsign, ip: IpAddr) -> bool {
        if self.is_blacklisted(ip).await {
            return false;
        }
        self.transmitter_allow.is_listed_wildcard(callsign).await
    }

    pub async fn may_link(
        &self,
        callsign: &Callsign,
        ip: IpAddr,
        protocol: Protocol,
        requested_modules: &str,
    ) -> bool {
        if protocol != Protocol::Urf {
            return false;
        }
        if self.is_blacklisted(ip).await {
            return false;
        }
        self.peer_allow.is_listed_modules(callsign, requested_modules).await
    }

    pub async fn peer_list_items(&self) -> Vec<AccessListItem> {
        self.peer_allow.items().await
    }
}

impl Default for Gatekeeper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn may_transmit_false_when_not_listed() {
        let gk = Gatekeeper::new();
        let cs = Callsign::from_str_padded("N7TAE");
        assert!(!gk.may_transmit(&cs, "127.0.0.1".parse().unwrap()).await);
    }

    #[tokio::test]
    async fn may_link_false_for_non_urf_protocol() {
        let gk = Gatekeeper::new();
        let cs = Callsign::from_str_padded("N7TAE");
        assert!(
            !gk.may_link(&cs, "127.0.0.1".parse().unwrap(), Protocol::Dextra, "A")
                .await
        );
    }

    #[tokio::test]
    async fn may_link_requires_module_superset() {
        let dir = std::env::temp_dir().join(format!("urf-gk-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let peer_file = dir.join("peers.txt");
        tokio::fs::write(&peer_file, "N7TAE A\n").await.unwrap();

        let gk = Gatekeeper::new();
        gk.load(&GatekeeperConfig {
            transmitter_allow_file: dir.join("missing.txt"),
            node_allow_file: dir.join("missing.txt"),
            peer_allow_file: peer_file,
            blacklist_file: dir.join("missing.txt"),
        })
        .await;

        let cs = Callsign::from_str_padded("N7TAE");
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(gk.may_link(&cs, ip, Protocol::Urf, "A").await);
        assert!(!gk.may_link(&cs, ip, Protocol::Urf, "AB").await);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
