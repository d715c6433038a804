//! A mtime-polled text file of `CALLSIGN [MODULES]` rows.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::sync::Mutex;

use crate::callsign::Callsign;

#[derive(Debug, Clone)]
pub struct AccessListItem {
    callsign: Callsign,
    resolved_ip: Option<std::net::IpAddr>,
    modules: String,
}

impl AccessListItem {
    fn new(callsign: Callsign, modules: String) -> Self {
        Self {
            callsign,
            resolved_ip: None,
            modules,
        }
    }

    pub fn callsign(&self) -> &Callsign {
        &self.callsign
    }

    pub fn modules(&self) -> &str {
        &self.modules
    }

    pub fn resolved_ip(&self) -> Option<std::net::IpAddr> {
        self.resolved_ip
    }

    /// Records the IP a peer should be dialed at, whether that came from a
    /// literal address in the allow-list file or a future DNS resolver.
    pub fn set_resolved_ip(&mut self, ip: std::net::IpAddr) {
        self.resolved_ip = Some(ip);
    }

    fn has_module_listed(&self, module: u8) -> bool {
        self.modules == "*" || self.modules.bytes().any(|b| b == module)
    }

    fn check_listed_modules(&self, requested: &str) -> bool {
        if self.modules == "*" {
            return true;
        }
        requested.bytes().all(|m| self.modules.bytes().any(|b| b == m))
    }
}

struct Inner {
    filename: Option<PathBuf>,
    last_mod_time: Option<SystemTime>,
    items: Vec<AccessListItem>,
}

/// A single callsign allow/deny list, loaded from a flat text file and
/// reloaded only when the file's mtime changes.
pub struct AccessList {
    inner: Mutex<Inner>,
}

impl AccessList {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                filename: None,
                last_mod_time: None,
                items: Vec::new(),
            }),
        }
    }

    /// Parses `path` and replaces the list's contents wholesale. A missing
    /// file is logged and leaves any prior contents untouched.
    pub async fn load_from_file(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(_) => {
                tracing::warn!(path = %path.display(), "gatekeeper cannot find access list file");
                return false;
            }
        };

        let mut items = Vec::new();
        for line in contents.lines() {
            let Some(item) = parse_line(line) else {
                continue;
            };
            items.push(item);
        }

        let mtime = std::fs::metadata(path).ok().and_then(|m| m.modified().ok());

        let mut inner = self.inner.lock().await;
        let count = items.len();
        inner.items = items;
        inner.filename = Some(path.to_path_buf());
        inner.last_mod_time = mtime;
        tracing::info!(path = %path.display(), count, "gatekeeper loaded access list");
        true
    }

    /// Re-loads from the previously recorded filename, if any.
    pub async fn reload_from_file(&self) -> bool {
        let filename = {
            let inner = self.inner.lock().await;
            inner.filename.clone()
        };
        match filename {
            Some(path) => self.load_from_file(path).await,
            None => false,
        }
    }

    /// Stats the backing file and reloads iff its mtime has changed since
    /// the last successful load.
    pub async fn reload_if_changed(&self) {
        let (filename, last_mod_time) = {
            let inner = self.inner.lock().await;
            (inner.filename.clone(), inner.last_mod_time)
        };
        let Some(path) = filename else {
            return;
        };
        let current = std::fs::metadata(&path).ok().and_then(|m| m.modified().ok());
        if current.is_some() && current != last_mod_time {
            self.reload_from_file().await;
        }
    }

    pub async fn is_listed_wildcard(&self, callsign: &Callsign) -> bool {
        let inner = self.inner.lock().await;
        inner
            .items
            .iter()
            .any(|item| callsign.has_same_callsign_with_wildcard(&item.callsign))
    }

    pub async fn is_listed_wildcard_module(&self, callsign: &Callsign, module: u8) -> bool {
        let inner = self.inner.lock().await;
        inner.items.iter().any(|item| {
            callsign.has_same_callsign_with_wildcard(&item.callsign)
                && (module == b' ' || item.has_module_listed(module))
        })
    }

    pub async fn is_listed(&self, callsign: &Callsign, module: u8) -> bool {
        let inner = self.inner.lock().await;
        inner
            .items
            .iter()
            .any(|item| item.callsign.has_same_callsign(callsign) && item.has_module_listed(module))
    }

    pub async fn is_listed_modules(&self, callsign: &Callsign, modules: &str) -> bool {
        let inner = self.inner.lock().await;
        inner
            .items
            .iter()
            .any(|item| item.callsign.has_same_callsign(callsign) && item.check_listed_modules(modules))
    }

    pub async fn find(&self, callsign: &Callsign) -> Option<AccessListItem> {
        let inner = self.inner.lock().await;
        inner
            .items
            .iter()
            .find(|item| item.callsign.has_same_callsign(callsign))
            .cloned()
    }

    pub async fn items(&self) -> Vec<AccessListItem> {
        self.inner.lock().await.items.clone()
    }
}

impl Default for AccessList {
    fn default() -> Self {
        Self::new()
    }
}

/// Trims leading/trailing spaces, tabs, and `\r`, skips blank lines and
/// `#` comments, and tokenizes on space/tab/comma: first token is the
/// callsign, second (optional, default `*`) is the module mask, third
/// (optional) is a literal IP address for peers that can't be reached by
/// DNS lookup — `peer_protocol::handle_peer_links` only dials entries that
/// carry one.
fn parse_line(raw: &str) -> Option<AccessListItem> {
    let trimmed = raw.trim_matches(|c| c == ' ' || c == '\t' || c == '\r');
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let mut tokens = trimmed.split([' ', '\t', ',']).filter(|t| !t.is_empty());
    let callsign_token = tokens.next()?;
    let modules = tokens.next().unwrap_or("*").to_string();
    let ip_token = tokens.next();

    let mut base = [b' '; crate::callsign::CALLSIGN_LEN];
    for (slot, byte) in base.iter_mut().zip(callsign_token.as_bytes().iter()) {
        *slot = byte.to_ascii_uppercase();
    }
    let callsign = Callsign::from_bytes(base);

    let mut item = AccessListItem::new(callsign, modules);
    if let Some(ip) = ip_token.and_then(|token| token.parse::<std::net::IpAddr>().ok()) {
        item.set_resolved_ip(ip);
    }

    Some(item)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comment_and_blank_lines() {
        assert!(parse_line("# comment").is_none());
        assert!(parse_line("   ").is_none());
    }

    #[test]
    fn defaults_module_mask_to_wildcard() {
        let item = parse_line("N7TAE").unwrap();
        assert_eq!(item.modules(), "*");
    }

    #[test]
    fn tokenizes_on_comma_and_tab() {
        let item = parse_line("N7TAE,\tAB").unwrap();
        assert_eq!(item.modules(), "AB");
    }

    #[test]
    fn trims_trailing_carriage_return() {
        let item = parse_line("N7TAE AB\r").unwrap();
        assert_eq!(item.modules(), "AB");
    }

    #[test]
    fn third_token_populates_resolved_ip() {
        let item = parse_line("N7TAE AB 192.168.1.10").unwrap();
        assert_eq!(item.resolved_ip(), Some("192.168.1.10".parse().unwrap()));
    }

    #[test]
    fn unparseable_third_token_leaves_resolved_ip_unset() {
        let item = parse_line("N7TAE AB not-an-ip").unwrap();
        assert_eq!(item.resolved_ip(), None);
    }

    #[tokio::test]
    async fn missing_file_returns_false_and_keeps_prior_entries() {
        let list = AccessList::new();
        assert!(!list.load_from_file("/nonexistent/path/does-not-exist.txt").await);
        assert!(list.items().await.is_empty());
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn missing_file_logs_a_warning() {
        let list = AccessList::new();
        list.load_from_file("/nonexistent/path/does-not-exist.txt").await;
        assert!(logs_contain("gatekeeper cannot find access list file"));
    }

    #[tokio::test]
    async fn load_then_query_wildcard_and_module_mask() {
        let dir = std::env::temp_dir().join(format!("urf-acl-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("allow.txt");
        tokio::fs::write(&path, "# comment\nN7TAE AB\nBM*  \n").await.unwrap();

        let list = AccessList::new();
        assert!(list.load_from_file(&path).await);

        let n7tae = Callsign::from_str_padded("N7TAE");
        assert!(list.is_listed(&n7tae, b'A').await);
        assert!(!list.is_listed(&n7tae, b'C').await);
        assert!(list.is_listed_wildcard_module(&n7tae, b' ').await);

        let bm = Callsign::from_str_padded("BM1234");
        assert!(list.is_listed_wildcard(&bm).await);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn reload_if_changed_is_noop_when_mtime_unchanged() {
        let dir = std::env::temp_dir().join(format!("urf-acl-test2-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("allow.txt");
        tokio::fs::write(&path, "N7TAE\n").await.unwrap();

        let list = AccessList::new();
        assert!(list.load_from_file(&path).await);
        list.reload_if_changed().await;
        assert_eq!(list.items().await.len(), 1);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
