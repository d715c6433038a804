//! The five fixed-length control packets: KeepAlive, Connect, ConnectAck,
//! ConnectNack, Disconnect.

use bytes::{BufMut, BytesMut};

use crate::callsign::{Callsign, CALLSIGN_LEN};
use crate::peer::Version;

pub const KEEPALIVE_LEN: usize = 9;
pub const CONNECT_LEN: usize = 39;
pub const DISCONNECT_LEN: usize = 10;

const MODULES_FIELD_LEN: usize = CONNECT_LEN - 1 - CALLSIGN_LEN - 3; // 27

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepAlive {
    pub callsign: Callsign,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub callsign: Callsign,
    pub version: Version,
    pub modules: String,
}

pub type ConnectAck = Connect;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    pub callsign: Callsign,
}

pub type ConnectNack = Disconnect;

fn is_module_letter(b: u8) -> bool {
    b.is_ascii_uppercase()
}

fn callsign_base(buf: &[u8]) -> [u8; CALLSIGN_LEN] {
    let mut base = [0u8; CALLSIGN_LEN];
    base.copy_from_slice(&buf[..CALLSIGN_LEN]);
    base
}

pub fn parse_keepalive(buf: &[u8]) -> Option<KeepAlive> {
    if buf.len() != KEEPALIVE_LEN {
        return None;
    }
    let callsign = Callsign::from_bytes(callsign_base(buf));
    callsign.is_valid().then_some(KeepAlive { callsign })
}

pub fn encode_keepalive(callsign: &Callsign) -> BytesMut {
    let mut buf = BytesMut::with_capacity(KEEPALIVE_LEN);
    buf.put_slice(callsign.base_bytes());
    buf.put_u8(0);
    buf
}

fn parse_connect_like(buf: &[u8], tag: u8) -> Option<Connect> {
    if buf.len() != CONNECT_LEN || buf[0] != tag || buf[CONNECT_LEN - 1] != 0 {
        return None;
    }
    let callsign = Callsign::from_bytes(callsign_base(&buf[1..]));
    if !callsign.is_valid() {
        return None;
    }
    let version = Version::new(buf[9], buf[10], buf[11]);

    let modules_field = &buf[12..12 + MODULES_FIELD_LEN];
    let nul_at = modules_field.iter().position(|&b| b == 0).unwrap_or(modules_field.len());
    let modules_bytes = &modules_field[..nul_at];
    if !modules_bytes.iter().all(|&b| is_module_letter(b)) {
        return None;
    }
    let modules = String::from_utf8_lossy(modules_bytes).into_owned();

    Some(Connect { callsign, version, modules })
}

fn encode_connect_like(tag: u8, callsign: &Callsign, version: Version, modules: &str) -> BytesMut {
    let mut buf = BytesMut::with_capacity(CONNECT_LEN);
    buf.put_u8(tag);
    buf.put_slice(callsign.base_bytes());
    buf.put_u8(version.major);
    buf.put_u8(version.minor);
    buf.put_u8(version.revision);
    buf.put_slice(modules.as_bytes());
    buf.resize(CONNECT_LEN, 0);
    buf
}

pub fn parse_connect(buf: &[u8]) -> Option<Connect> {
    parse_connect_like(buf, b'L')
}

pub fn encode_connect(callsign: &Callsign, version: Version, modules: &str) -> BytesMut {
    encode_connect_like(b'L', callsign, version, modules)
}

pub fn parse_connect_ack(buf: &[u8]) -> Option<ConnectAck> {
    parse_connect_like(buf, b'A')
}

pub fn encode_connect_ack(callsign: &Callsign, version: Version, modules: &str) -> BytesMut {
    encode_connect_like(b'A', callsign, version, modules)
}

fn parse_disconnect_like(buf: &[u8], tag: u8) -> Option<Disconnect> {
    if buf.len() != DISCONNECT_LEN || buf[0] != tag || buf[DISCONNECT_LEN - 1] != 0 {
        return None;
    }
    let callsign = Callsign::from_bytes(callsign_base(&buf[1..]));
    callsign.is_valid().then_some(Disconnect { callsign })
}

fn encode_disconnect_like(tag: u8, callsign: &Callsign) -> BytesMut {
    let mut buf = BytesMut::with_capacity(DISCONNECT_LEN);
    buf.put_u8(tag);
    buf.put_slice(callsign.base_bytes());
    buf.put_u8(0);
    buf
}

pub fn parse_disconnect(buf: &[u8]) -> Option<Disconnect> {
    parse_disconnect_like(buf, b'U')
}

pub fn encode_disconnect(callsign: &Callsign) -> BytesMut {
    encode_disconnect_like(b'U', callsign)
}

pub fn parse_connect_nack(buf: &[u8]) -> Option<ConnectNack> {
    parse_disconnect_like(buf, b'N')
}

pub fn encode_connect_nack(callsign: &Callsign) -> BytesMut {
    encode_disconnect_like(b'N', callsign)
}
