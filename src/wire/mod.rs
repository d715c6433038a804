//! WireCodec: parses and emits the five control packets and the two
//! stream-frame layouts (§4.3).

pub mod control;
pub mod frame;

pub use control::{Connect, ConnectAck, ConnectNack, Disconnect, KeepAlive};
pub use frame::{DvHeader, VoiceFrame};

/// One classified inbound datagram. Variant order mirrors the dispatch
/// order in §4.4: stream frames first, then the control handshake, then
/// keepalive, with anything else falling through to `Unknown`.
#[derive(Debug, Clone)]
pub enum Packet {
    DvFrame(VoiceFrame),
    DvHeader(DvHeader),
    Connect(Connect),
    ConnectAck(ConnectAck),
    Disconnect(Disconnect),
    ConnectNack(ConnectNack),
    KeepAlive(KeepAlive),
}

/// Classifies a raw datagram into one of the eight recognized kinds.
/// Returns `None` for anything that fails every parser, which the caller
/// logs as an unrecognized packet (§4.4, §7).
pub fn classify(buf: &[u8]) -> Option<Packet> {
    if let Some(frame) = frame::parse_voice_frame(buf) {
        return Some(Packet::DvFrame(frame));
    }
    if let Some(header) = frame::parse_dv_header(buf) {
        return Some(Packet::DvHeader(header));
    }
    if let Some(connect) = control::parse_connect(buf) {
        return Some(Packet::Connect(connect));
    }
    if let Some(ack) = control::parse_connect_ack(buf) {
        return Some(Packet::ConnectAck(ack));
    }
    if let Some(disconnect) = control::parse_disconnect(buf) {
        return Some(Packet::Disconnect(disconnect));
    }
    if let Some(nack) = control::parse_connect_nack(buf) {
        return Some(Packet::ConnectNack(nack));
    }
    if let Some(keepalive) = control::parse_keepalive(buf) {
        return Some(Packet::KeepAlive(keepalive));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callsign::Callsign;
    use crate::peer::Version;

    #[test]
    fn classifies_connect_and_keepalive() {
        let cs = Callsign::from_str_padded("N7TAE");
        let connect = control::encode_connect(&cs, Version::new(2, 0, 0), "A");
        assert!(matches!(classify(&connect), Some(Packet::Connect(_))));

        let keepalive = control::encode_keepalive(&cs);
        assert!(matches!(classify(&keepalive), Some(Packet::KeepAlive(_))));
    }

    #[test]
    fn unrecognized_bytes_classify_to_none() {
        let garbage = vec![0xffu8; 13];
        assert!(classify(&garbage).is_none());
    }
}
