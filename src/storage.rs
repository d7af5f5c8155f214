//! Pre-allocated storage for retained packet clones.
//!
//! The pool owns all bytes ever stored by a stream: `buffer_size` slots of
//! `MTU + 100` bytes each, allocated once at construction and reused for the
//! lifetime of the stream. Retained packets are serialized into a slot with
//! [`Marshal::marshal_to`] and re-materialized with [`Unmarshal::unmarshal`],
//! so the store path performs no per-packet heap allocation.

use rtp::packet::Packet;
use util::marshal::{Marshal, Unmarshal};

use crate::error::Result;

/// Ceiling on the serialized size of a storable packet.
pub const MTU: usize = 1500;

/// Headroom past the MTU, reserving space for the 2-byte RTX header plus
/// padding.
const SLOT_HEADROOM: usize = 100;

/// One fixed-size byte buffer. `len == 0` means free; `len > 0` means bound
/// to exactly one buffer item.
struct StorageSlot {
    buf: Box<[u8]>,
    len: usize,
}

pub(crate) struct PacketStorage {
    slots: Vec<StorageSlot>,
}

impl PacketStorage {
    pub(crate) fn new(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| StorageSlot {
                buf: vec![0u8; MTU + SLOT_HEADROOM].into_boxed_slice(),
                len: 0,
            })
            .collect();

        Self { slots }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Clone `packet` into the free slot at `index`.
    pub(crate) fn store(&mut self, index: usize, packet: &Packet) -> Result<()> {
        let slot = &mut self.slots[index];
        debug_assert_eq!(slot.len, 0, "storage slot {index} already bound");

        slot.len = packet.marshal_to(&mut slot.buf)?;

        Ok(())
    }

    /// Overwrite the bound slot at `index` with a clone of `packet`.
    pub(crate) fn replace(&mut self, index: usize, packet: &Packet) -> Result<()> {
        let slot = &mut self.slots[index];
        debug_assert!(slot.len > 0, "replacing an unbound storage slot {index}");

        slot.len = packet.marshal_to(&mut slot.buf)?;

        Ok(())
    }

    /// Free the slot at `index` for reuse.
    pub(crate) fn release(&mut self, index: usize) {
        self.slots[index].len = 0;
    }

    /// Re-materialize the packet cloned into the slot at `index`.
    pub(crate) fn packet(&self, index: usize) -> Result<Packet> {
        let slot = &self.slots[index];
        debug_assert!(slot.len > 0, "reading an unbound storage slot {index}");

        let mut buf = &slot.buf[..slot.len];

        Ok(Packet::unmarshal(&mut buf)?)
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
                timestamp: 1234,
                ssrc: 5678,
                ..Default::default()
            },
            payload: payload.to_vec().into(),
        }
    }

    #[test]
    fn test_store_and_rematerialize() {
        let mut storage = PacketStorage::new(2);
        let packet = make_packet(42, &[1, 2, 3, 4]);

        storage.store(0, &packet).unwrap();

        let restored = storage.packet(0).unwrap();
        assert_eq!(restored.header.sequence_number, 42);
        assert_eq!(restored.header.ssrc, 5678);
        assert_eq!(&restored.payload[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_release_and_reuse() {
        let mut storage = PacketStorage::new(1);

        storage.store(0, &make_packet(1, &[9; 32])).unwrap();
        storage.release(0);
        storage.store(0, &make_packet(2, &[7; 16])).unwrap();

        let restored = storage.packet(0).unwrap();
        assert_eq!(restored.header.sequence_number, 2);
        assert_eq!(restored.payload.len(), 16);
    }

    #[test]
    fn test_replace_keeps_binding() {
        let mut storage = PacketStorage::new(1);

        storage.store(0, &make_packet(5, &[1; 100])).unwrap();
        storage.replace(0, &make_packet(5, &[2; 10])).unwrap();

        let restored = storage.packet(0).unwrap();
        assert_eq!(&restored.payload[..], &[2; 10]);
    }

    #[test]
    fn test_slot_fits_mtu_sized_packet() {
        let mut storage = PacketStorage::new(1);
        // 12-byte header + payload right at the MTU ceiling.
        let packet = make_packet(9, &vec![0u8; MTU - 12]);

        storage.store(0, &packet).unwrap();
        assert_eq!(storage.packet(0).unwrap().payload.len(), MTU - 12);
    }
}
