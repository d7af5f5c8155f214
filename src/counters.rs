use log::warn;
use rtp::packet::Packet;

/// Wrapping packet/octet counters feeding the RTCP sender report.
#[derive(Debug, Default)]
pub(crate) struct TransmissionCounter {
    packets: u32,
    octets: u32,
}

impl TransmissionCounter {
    pub(crate) fn update(&mut self, packet: &Packet) {
        self.packets = self.packets.wrapping_add(1);

        // account for a payload size of at most `u32::MAX`
        // and log a message if larger
        self.octets = self
            .octets
            .wrapping_add(packet.payload.len().try_into().unwrap_or_else(|_| {
                warn!("packet payload larger than 32 bits");
                u32::MAX
            }));
    }

    pub(crate) fn packet_count(&self) -> u32 {
        self.packets
    }

    pub(crate) fn octet_count(&self) -> u32 {
        self.octets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_packets_and_payload_octets() {
        let mut counter = TransmissionCounter::default();

        for seq in 0..4u16 {
            let packet = Packet {
                header: rtp::header::Header {
                    version: 2,
                    sequence_number: seq,
                    ..Default::default()
                },
                payload: vec![0u8; 25].into(),
            };
            counter.update(&packet);
        }

        assert_eq!(counter.packet_count(), 4);
        assert_eq!(counter.octet_count(), 100);
    }
}
