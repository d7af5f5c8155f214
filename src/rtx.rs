//! RFC 4588 retransmission encoding.
//!
//! Retransmitted packets travel on their own SSRC and payload type with a
//! dedicated monotonic sequence space; the original sequence number moves
//! into the first two payload bytes so the receiver can restore it.

use bytes::Bytes;
use rtp::packet::Packet;

pub(crate) struct RtxEncoder {
    payload_type: u8,
    ssrc: u32,
    seq: u16,
}

impl RtxEncoder {
    /// The RTX sequence space starts at a random point.
    pub(crate) fn new(payload_type: u8, ssrc: u32) -> Self {
        Self {
            payload_type,
            ssrc,
            seq: rand::random::<u16>(),
        }
    }

    /// Rewrite `packet` in place as an RTX packet:
    /// - RTX SSRC and payload type,
    /// - next RTX sequence number (incremented on every call),
    /// - payload prefixed with the original sequence number, big-endian.
    pub(crate) fn encode(&mut self, packet: &mut Packet) {
        self.seq = self.seq.wrapping_add(1);

        let original_seq = packet.header.sequence_number;
        let mut payload = Vec::with_capacity(2 + packet.payload.len());
        payload.extend_from_slice(&original_seq.to_be_bytes());
        payload.extend_from_slice(&packet.payload);

        packet.header.ssrc = self.ssrc;
        packet.header.payload_type = self.payload_type;
        packet.header.sequence_number = self.seq;
        packet.payload = Bytes::from(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_packet(seq: u16, payload: &[u8]) -> Packet {
        Packet {
            header: rtp::header::Header {
                version: 2,
                payload_type: 96,
                sequence_number: seq,
                timestamp: 3000,
                ssrc: 1111,
                ..Default::default()
            },
            payload: payload.to_vec().into(),
        }
    }

    #[test]
    fn test_encode_rewrites_header_and_payload() {
        let mut encoder = RtxEncoder::new(97, 2222);

        let mut packet = make_packet(500, &[0xAA, 0xBB]);
        encoder.encode(&mut packet);

        assert_eq!(packet.header.ssrc, 2222);
        assert_eq!(packet.header.payload_type, 97);
        // Timestamp and marker travel unchanged.
        assert_eq!(packet.header.timestamp, 3000);
        // Original sequence number leads the payload in network order.
        assert_eq!(&packet.payload[..2], &500u16.to_be_bytes());
        assert_eq!(&packet.payload[2..], &[0xAA, 0xBB]);
    }

    #[test]
    fn test_sequence_increments_per_encode() {
        let mut encoder = RtxEncoder::new(97, 2222);

        let mut first = make_packet(1, &[]);
        let mut second = make_packet(2, &[]);
        encoder.encode(&mut first);
        encoder.encode(&mut second);

        assert_eq!(
            second.header.sequence_number,
            first.header.sequence_number.wrapping_add(1)
        );
    }
}
