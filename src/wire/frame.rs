//! Stream-frame layouts: the D-STAR header, and the two voice-frame
//! encodings (27-byte legacy, 45-byte revision-2) that carry AMBE/AMBE+
//! payloads opaquely.

use bytes::{BufMut, BytesMut};

use crate::callsign::{Callsign, CALLSIGN_LEN};

/// The 12-byte DSVT frame-type tag shared by every voice frame this
/// reflector emits. Bytes 4 and 8 (`0x20`) mark a voice (not header)
/// frame; bytes 9..12 (`0x00 0x01 0x02`) are a fixed sub-type constant.
const VOICE_TAG: [u8; 12] = *b"DSVT\x20\x00\x00\x00\x20\x00\x01\x02";
const VOICE_FRAME_LEN_REV2: usize = 45;
const VOICE_FRAME_LEN_LEGACY: usize = 27;

const AMBE_LEN: usize = 9;
const DV_DATA_LEN: usize = 3;
const AMBE_PLUS_LEN: usize = 9;
const DV_SYNC_LEN: usize = 7;

/// One D-STAR/DMR voice frame. `is_last` distinguishes a `DvLastFrame`
/// from a `DvFrame`: both share this layout, differing only in the
/// terminator bit (byte 14, `0x40`) and, for the last frame, a fixed
/// silence pattern in the D-STAR payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceFrame {
    pub stream_id: u16,
    pub packet_id: u8,
    pub is_last: bool,
    pub ambe: [u8; AMBE_LEN],
    pub dv_data: [u8; DV_DATA_LEN],
    pub dmr_packet_id: u8,
    pub dmr_packet_subid: u8,
    pub ambe_plus: [u8; AMBE_PLUS_LEN],
    pub dv_sync: [u8; DV_SYNC_LEN],
    /// Set once this protocol receives the frame off the wire; never set
    /// for locally originated frames. Gates the outbound fan-out loop
    /// check in `handle_queue` (§4.5).
    pub remote_peer_origin: bool,
}

const LAST_FRAME_AMBE: [u8; AMBE_LEN] = [0x55, 0xC8, 0x7A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
const LAST_FRAME_DV_DATA: [u8; DV_DATA_LEN] = [0x25, 0x1A, 0xC6];

impl VoiceFrame {
    /// Builds the canonical DvLastFrame payload for `stream_id`/`packet_id`,
    /// matching the fixed silence pattern the original encoder emits.
    pub fn last_frame(stream_id: u16, packet_id: u8, dmr_packet_id: u8, dmr_packet_subid: u8, ambe_plus: [u8; AMBE_PLUS_LEN], dv_sync: [u8; DV_SYNC_LEN]) -> Self {
        Self {
            stream_id,
            packet_id,
            is_last: true,
            ambe: LAST_FRAME_AMBE,
            dv_data: LAST_FRAME_DV_DATA,
            dmr_packet_id,
            dmr_packet_subid,
            ambe_plus,
            dv_sync,
        remote_peer_origin: false,
        }
    }
}

/// Encodes the 45-byte revision-2 form. The caller truncates to 27 bytes
/// for revision-0/1 clients; the first 27 bytes are wire-compatible by
/// construction (§4.3).
pub fn encode_voice_frame(frame: &VoiceFrame) -> BytesMut {
    let mut buf = BytesMut::with_capacity(VOICE_FRAME_LEN_REV2);
    buf.put_slice(&VOICE_TAG);
    buf.put_u16_le(frame.stream_id);
    let packet_byte = (frame.packet_id % 21) | if frame.is_last { 0x40 } else { 0x00 };
    buf.put_u8(packet_byte);
    buf.put_slice(&frame.ambe);
    buf.put_slice(&frame.dv_data);
    buf.put_u8(frame.dmr_packet_id);
    buf.put_u8(frame.dmr_packet_subid);
    buf.put_slice(&frame.ambe_plus);
    buf.put_slice(&frame.dv_sync);
    debug_assert_eq!(buf.len(), VOICE_FRAME_LEN_REV2);
    buf
}

/// Truncates an encoded revision-2 frame to its 27-byte legacy
/// projection, as the dispatcher does per client revision.
pub fn truncate_to_legacy(rev2: &[u8]) -> BytesMut {
    let mut legacy = BytesMut::from(&rev2[..VOICE_FRAME_LEN_LEGACY.min(rev2.len())]);
    legacy.resize(VOICE_FRAME_LEN_LEGACY, 0);
    legacy
}

fn has_voice_tag(buf: &[u8]) -> bool {
    buf.len() >= 15 && buf[0..4] == VOICE_TAG[0..4] && buf[4] == 0x20 && buf[8] == 0x20
}

/// Parses either the 27-byte legacy or 45-byte revision-2 voice frame
/// layout, selecting on length and the terminator bit.
pub fn parse_voice_frame(buf: &[u8]) -> Option<VoiceFrame> {
    if buf.len() != VOICE_FRAME_LEN_LEGACY && buf.len() != VOICE_FRAME_LEN_REV2 {
        return None;
    }
    if !has_voice_tag(buf) {
        return None;
    }

    let stream_id = u16::from_le_bytes([buf[12], buf[13]]);
    let packet_byte = buf[14];
    let is_last = packet_byte & 0x40 != 0;
    let packet_id = packet_byte & 0x3f;

    let mut ambe = [0u8; AMBE_LEN];
    ambe.copy_from_slice(&buf[15..24]);
    let mut dv_data = [0u8; DV_DATA_LEN];
    dv_data.copy_from_slice(&buf[24..27]);

    let (dmr_packet_id, dmr_packet_subid, ambe_plus, dv_sync) = if buf.len() == VOICE_FRAME_LEN_REV2 {
        let mut ambe_plus = [0u8; AMBE_PLUS_LEN];
        ambe_plus.copy_from_slice(&buf[29..38]);
        let mut dv_sync = [0u8; DV_SYNC_LEN];
        dv_sync.copy_from_slice(&buf[38..45]);
        (buf[27], buf[28], ambe_plus, dv_sync)
    } else {
        (0, 0, [0u8; AMBE_PLUS_LEN], [0u8; DV_SYNC_LEN])
    };

    Some(VoiceFrame {
        stream_id,
        packet_id,
        is_last,
        ambe,
        dv_data,
        dmr_packet_id,
        dmr_packet_subid,
        ambe_plus,
        dv_sync,
        remote_peer_origin: false,
    })
}

/// Length of the D-STAR header frame this core recognizes. The exact
/// D-STAR field layout is inherited shared framing owned by the
/// gateway-client protocols (§1, §4.3); this core only extracts the
/// fields it needs to route the stream.
pub const DV_HEADER_LEN: usize = 58;
/// Same twelve-byte frame-type tag shape as [`VOICE_TAG`], with byte 4
/// set to `0x10` rather than `0x20` to mark a header frame.
const HEADER_TAG: [u8; 12] = *b"DSVT\x10\x00\x00\x00\x20\x00\x01\x02";

/// The subset of a D-STAR header this core consumes: enough to find the
/// owning client and tag the opened stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DvHeader {
    pub stream_id: u16,
    pub my_callsign: Callsign,
    pub rpt1_callsign: Callsign,
    pub rpt2_callsign: Callsign,
    pub remote_peer_origin: bool,
}

impl DvHeader {
    /// The module this header is routed to: the last byte of `rpt2`'s
    /// base callsign (D-STAR convention places the module letter there).
    pub fn rpt2_module(&self) -> u8 {
        self.rpt2_callsign.base_bytes()[CALLSIGN_LEN - 1]
    }
}

pub fn parse_dv_header(buf: &[u8]) -> Option<DvHeader> {
    if buf.len() != DV_HEADER_LEN || buf[0..12] != HEADER_TAG {
        return None;
    }
    let stream_id = u16::from_le_bytes([buf[12], buf[13]]);
    let mut rpt1 = [0u8; CALLSIGN_LEN];
    rpt1.copy_from_slice(&buf[14..22]);
    let mut rpt2 = [0u8; CALLSIGN_LEN];
    rpt2.copy_from_slice(&buf[22..30]);
    let mut my = [0u8; CALLSIGN_LEN];
    my.copy_from_slice(&buf[30..38]);

    let rpt1_callsign = Callsign::from_bytes(rpt1);
    let rpt2_callsign = Callsign::from_bytes(rpt2);
    let my_callsign = Callsign::from_bytes(my);
    if !(rpt1_callsign.is_valid() && rpt2_callsign.is_valid() && my_callsign.is_valid()) {
        return None;
    }

    Some(DvHeader {
        stream_id,
        my_callsign,
        rpt1_callsign,
        rpt2_callsign,
        remote_peer_origin: false,
    })
}

pub fn encode_dv_header(header: &DvHeader) -> BytesMut {
    let mut buf = BytesMut::with_capacity(DV_HEADER_LEN);
    buf.put_slice(&HEADER_TAG);
    buf.put_u16_le(header.stream_id);
    buf.put_slice(header.rpt1_callsign.base_bytes());
    buf.put_slice(header.rpt2_callsign.base_bytes());
    buf.put_slice(header.my_callsign.base_bytes());
    buf.resize(DV_HEADER_LEN, 0);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame(is_last: bool) -> VoiceFrame {
        VoiceFrame {
            stream_id: 0x1234,
            packet_id: 5,
            is_last,
            ambe: [1; AMBE_LEN],
            dv_data: [2; DV_DATA_LEN],
            dmr_packet_id: 7,
            dmr_packet_subid: 8,
            ambe_plus: [3; AMBE_PLUS_LEN],
            dv_sync: [4; DV_SYNC_LEN],
            remote_peer_origin: false,
        }
    }

    #[test]
    fn voice_frame_rev2_round_trip() {
        let frame = sample_frame(false);
        let encoded = encode_voice_frame(&frame);
        assert_eq!(encoded.len(), VOICE_FRAME_LEN_REV2);
        let parsed = parse_voice_frame(&encoded).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn legacy_truncation_is_wire_compatible_prefix() {
        let frame = sample_frame(false);
        let encoded = encode_voice_frame(&frame);
        let legacy = truncate_to_legacy(&encoded);
        assert_eq!(legacy.len(), VOICE_FRAME_LEN_LEGACY);
        let parsed = parse_voice_frame(&legacy).unwrap();
        assert_eq!(parsed.stream_id, frame.stream_id);
        assert_eq!(parsed.ambe, frame.ambe);
        assert_eq!(parsed.dv_data, frame.dv_data);
        // legacy frames carry no DMR tail
        assert_eq!(parsed.dmr_packet_id, 0);
    }

    #[test]
    fn last_frame_sets_terminator_bit_and_packet_id_mod_21() {
        let frame = sample_frame(true);
        let mut with_high_id = frame.clone();
        with_high_id.packet_id = 21 + 5;
        let encoded = encode_voice_frame(&with_high_id);
        assert_eq!(encoded[14] & 0x40, 0x40);
        assert_eq!(encoded[14] & 0x3f, 5);
    }

    #[test]
    fn dv_header_round_trip_and_module_extraction() {
        let mut rpt2_base = [b' '; CALLSIGN_LEN];
        rpt2_base[..6].copy_from_slice(b"REF001");
        rpt2_base[7] = b'A';

        let header = DvHeader {
            stream_id: 42,
            my_callsign: Callsign::from_str_padded("N7TAE"),
            rpt1_callsign: Callsign::from_str_padded("REF001"),
            rpt2_callsign: Callsign::from_bytes(rpt2_base),
            remote_peer_origin: false,
        };
        let encoded = encode_dv_header(&header);
        let parsed = parse_dv_header(&encoded).unwrap();
        assert_eq!(parsed.stream_id, 42);
        assert_eq!(parsed.rpt2_module(), b'A');
    }
}
