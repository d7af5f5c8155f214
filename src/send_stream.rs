//! Sender-side stream core: retained-packet history, NACK responses,
//! receiver-report consumption and sender-report emission.

use std::time::{Duration, Instant, SystemTime};

use log::{debug, warn};
use rtcp::reception_report::ReceptionReport;
use rtcp::sender_report::SenderReport;
use rtcp::transport_feedbacks::transport_layer_nack::TransportLayerNack;
use rtp::extension::abs_send_time_extension::unix2ntp;
use rtp::packet::Packet;
use util::marshal::MarshalSize;

use crate::buffer::{BufferItem, Insert, RetransmissionBuffer};
use crate::counters::TransmissionCounter;
use crate::error::Result;
use crate::rtx::RtxEncoder;
use crate::seqnum::{is_seq_higher_than, is_seq_lower_than};
use crate::stats::SendStreamStats;
use crate::storage::{PacketStorage, MTU};
use crate::stream_params::StreamParams;

/// A NACK names at most the base sequence plus 16 bitmask follow-ups.
pub const MAX_REQUESTED_PACKETS: usize = 17;
/// Don't retransmit packets older than this.
pub const MAX_RETRANSMISSION_DELAY_MS: u64 = 2000;
/// RTT substituted while no receiver report has produced a sample.
pub const DEFAULT_RTT_MS: u64 = 100;

/// Outgoing RTP stream with a bounded retransmission history.
///
/// Single-threaded and sans-io: nothing blocks, nothing is scheduled, and
/// every time-sensitive operation takes the current time as an argument
/// ([`Instant`] for retransmission throttling, [`SystemTime`] where an NTP
/// timestamp is derived).
pub struct SendStream {
    params: StreamParams,
    use_nack: bool,

    storage: PacketStorage,
    buffer: RetransmissionBuffer,
    transmission_counter: TransmissionCounter,

    /// Whether any packet has passed validation yet.
    started: bool,
    max_seq: u16,
    /// RTP timestamp of the newest packet, the reference for packet age.
    max_packet_ts: u32,

    /// Loss counters cached from the latest receiver report, advisory.
    packets_lost: u32,
    fraction_lost: u8,
    /// Smoothed RTT in milliseconds, 0 while unknown.
    rtt: f32,

    rtx: Option<RtxEncoder>,
}

impl SendStream {
    /// `buffer_size` bounds the retransmission history in packets; 0
    /// disables retention entirely (counters and reports still work).
    /// Storage for the whole history is allocated here, once.
    pub fn new(params: StreamParams, buffer_size: usize) -> Self {
        debug_assert!(params.clock_rate > 0, "stream params without clock rate");

        let use_nack = params.supports_nack();

        Self {
            use_nack,
            storage: PacketStorage::new(buffer_size),
            buffer: RetransmissionBuffer::new(buffer_size),
            transmission_counter: TransmissionCounter::default(),
            started: false,
            max_seq: 0,
            max_packet_ts: 0,
            packets_lost: 0,
            fraction_lost: 0,
            rtt: 0.0,
            rtx: None,
            params,
        }
    }

    /// Observe an outgoing packet.
    ///
    /// Validates it against the stream, retains a clone for retransmission
    /// when retention is enabled, and updates the transmission counters.
    /// Returns `Ok(false)` when validation rejects the packet. Oversized
    /// packets are not retained but still count as sent.
    pub fn receive_packet(&mut self, packet: &Packet) -> Result<bool> {
        if !self.update_seq(packet) {
            return Ok(false);
        }

        if !self.storage.is_empty() {
            self.store_packet(packet)?;
        }

        self.transmission_counter.update(packet);

        Ok(true)
    }

    /// Consume a reception report for this stream, refreshing the RTT
    /// estimate and the advisory loss counters.
    ///
    /// RTT is derived per RFC 3550 from `last_sender_report` and `delay`:
    /// the middle 32 bits of the current NTP time minus LSR minus DLSR,
    /// under unsigned 32-bit arithmetic.
    pub fn receive_rtcp_receiver_report(&mut self, report: &ReceptionReport, now: SystemTime) {
        let compact_ntp = (unix2ntp(now) >> 16) as u32;

        let last_sr = report.last_sender_report;
        let dlsr = report.delay;

        // RTT in 1/2^16 second fractions.
        let rtt = if compact_ntp > dlsr.wrapping_add(last_sr) {
            compact_ntp.wrapping_sub(dlsr).wrapping_sub(last_sr)
        } else {
            0
        };

        // RTT in milliseconds.
        self.rtt = (rtt >> 16) as f32 * 1000.0 + ((rtt & 0x0000FFFF) as f32 / 65536.0) * 1000.0;

        self.packets_lost = report.total_lost;
        self.fraction_lost = report.fraction_lost;
    }

    /// Look up the packets named by a NACK item and append the ones that
    /// may be resent right now to `out` (cleared on entry).
    ///
    /// Targets are the base sequence plus one per bitmask bit, LSB first;
    /// `out` preserves that order. A target is omitted when it is not in
    /// the buffer, older than [`MAX_RETRANSMISSION_DELAY_MS`] relative to
    /// the newest packet, or was already resent within the last RTT.
    pub fn request_retransmission(
        &mut self,
        base_seq: u16,
        bitmask: u16,
        now: Instant,
        out: &mut Vec<Packet>,
    ) -> Result<()> {
        out.clear();

        if !self.use_nack {
            warn!("NACK not supported [ssrc:{}]", self.params.ssrc);
            return Ok(());
        }

        let (first_stored, last_stored) = match (self.buffer.first(), self.buffer.last()) {
            (Some(first), Some(last)) => (first.seq, last.seq),
            _ => return Ok(()),
        };

        // Requested range entirely outside the retained one?
        let last_requested = base_seq.wrapping_add(16);
        if is_seq_lower_than(last_requested, first_stored)
            || is_seq_higher_than(base_seq, last_stored)
        {
            warn!(
                "requested packet range not in the buffer [ssrc:{}, seq:{}, bitmask:{:#018b}]",
                self.params.ssrc, base_seq, bitmask
            );
            return Ok(());
        }

        let rtt = Duration::from_millis(if self.rtt > 0.0 {
            self.rtt as u64
        } else {
            DEFAULT_RTT_MS
        });

        let orig_bitmask = bitmask;
        let mut bitmask = bitmask;
        let mut seq = base_seq;
        let mut requested = true;

        // Diagnostics for the post-loop summary.
        let mut sent_bitmask: u16 = 0;
        let mut is_first_packet = true;
        let mut first_packet_sent = false;
        let mut bitmask_counter = 0u8;
        let mut too_old_packet_found = false;

        while requested || bitmask != 0 {
            let mut sent = false;

            if requested {
                if let Some(index) = self.find_item(seq) {
                    let item = self.buffer[index];

                    // Elapsed time between the newest timestamp seen and the
                    // requested packet's, in ms.
                    let diff_ts = self.max_packet_ts.wrapping_sub(item.timestamp);
                    let diff_ms = u64::from(diff_ts) * 1000 / u64::from(self.params.clock_rate);

                    if diff_ms > MAX_RETRANSMISSION_DELAY_MS {
                        if !too_old_packet_found {
                            warn!(
                                "ignoring retransmission for too old packet \
                                 [seq:{}, max age:{}ms, packet age:{}ms]",
                                item.seq, MAX_RETRANSMISSION_DELAY_MS, diff_ms
                            );
                            too_old_packet_found = true;
                        }
                    } else if item
                        .resent_at
                        .is_some_and(|at| now.duration_since(at) <= rtt)
                    {
                        debug!(
                            "ignoring retransmission for a packet already resent \
                             in the last RTT [seq:{}, rtt:{}ms]",
                            item.seq,
                            rtt.as_millis()
                        );
                    } else if let Some(slot) = item.slot {
                        out.push(self.storage.packet(slot)?);

                        let item = &mut self.buffer[index];
                        item.resent_at = Some(now);
                        item.sent_times = item.sent_times.wrapping_add(1);

                        sent = true;
                        if is_first_packet {
                            first_packet_sent = true;
                        }
                    }
                }
            }

            requested = (bitmask & 1) != 0;
            bitmask >>= 1;
            seq = seq.wrapping_add(1);

            if !is_first_packet {
                sent_bitmask |= u16::from(sent) << bitmask_counter;
                bitmask_counter += 1;
            } else {
                is_first_packet = false;
            }
        }

        if !first_packet_sent || orig_bitmask != sent_bitmask {
            debug!(
                "could not resend all requested packets \
                 [seq:{}, first sent:{}, bitmask:{:#018b}, sent bitmask:{:#018b}]",
                base_seq, first_packet_sent, orig_bitmask, sent_bitmask
            );
        } else {
            debug!(
                "all requested packets resent [seq:{}, bitmask:{:#018b}]",
                base_seq, orig_bitmask
            );
        }

        Ok(())
    }

    /// Answer a full NACK packet: every `(packet_id, lost_packets)` pair is
    /// looked up via [`Self::request_retransmission`] and the results are
    /// RTX-encoded when RTX is enabled. `out` is cleared on entry.
    pub fn receive_nack(
        &mut self,
        nack: &TransportLayerNack,
        now: Instant,
        out: &mut Vec<Packet>,
    ) -> Result<()> {
        out.clear();

        if nack.media_ssrc != self.params.ssrc {
            warn!(
                "NACK for another media ssrc [ssrc:{}, nack media ssrc:{}]",
                self.params.ssrc, nack.media_ssrc
            );
            return Ok(());
        }

        let mut requested = Vec::with_capacity(MAX_REQUESTED_PACKETS);
        for pair in &nack.nacks {
            self.request_retransmission(pair.packet_id, pair.lost_packets, now, &mut requested)?;

            for mut packet in requested.drain(..) {
                if self.has_rtx() {
                    self.rtx_encode(&mut packet);
                }
                out.push(packet);
            }
        }

        Ok(())
    }

    /// Produce the RTCP sender report for `now`, or `None` while nothing
    /// has been sent yet.
    pub fn get_sender_report(&self, now: SystemTime) -> Option<SenderReport> {
        if self.transmission_counter.packet_count() == 0 {
            return None;
        }

        Some(SenderReport {
            ssrc: self.params.ssrc,
            ntp_time: unix2ntp(now),
            rtp_time: self.max_packet_ts,
            packet_count: self.transmission_counter.packet_count(),
            octet_count: self.transmission_counter.octet_count(),
            ..Default::default()
        })
    }

    /// Enable RFC 4588 retransmission on a separate SSRC and payload type.
    pub fn set_rtx(&mut self, payload_type: u8, ssrc: u32) {
        self.rtx = Some(RtxEncoder::new(payload_type, ssrc));
    }

    pub fn has_rtx(&self) -> bool {
        self.rtx.is_some()
    }

    /// Rewrite `packet` in place as an RTX packet.
    ///
    /// # Panics
    ///
    /// Panics when called before [`Self::set_rtx`]; that is a programming
    /// error, not a runtime condition.
    pub fn rtx_encode(&mut self, packet: &mut Packet) {
        let rtx = self.rtx.as_mut().expect("RTX not enabled on this stream");
        rtx.encode(packet);
    }

    /// Drop every retained packet, freeing all storage slots for reuse.
    pub fn clear_retransmission_buffer(&mut self) {
        if self.storage.is_empty() {
            return;
        }

        for index in 0..self.buffer.len() {
            if let Some(slot) = self.buffer[index].slot {
                self.storage.release(slot);
            }
        }

        self.buffer.clear();
    }

    pub fn get_stats(&self) -> SendStreamStats {
        SendStreamStats {
            typ: "outbound-rtp".to_string(),
            ssrc: self.params.ssrc,
            packets_sent: self.transmission_counter.packet_count(),
            bytes_sent: self.transmission_counter.octet_count(),
            packets_lost: self.packets_lost,
            fraction_lost: self.fraction_lost,
            round_trip_time: self.rtt as u32,
        }
    }

    /// Bookkeeping of the retained packets, oldest first.
    pub fn retained(&self) -> impl Iterator<Item = &BufferItem> + '_ {
        self.buffer.iter()
    }

    pub fn retained_count(&self) -> usize {
        self.buffer.len()
    }

    /// Base validation and max-seq/max-ts tracking. Returns `false` when
    /// the packet does not belong to this stream.
    fn update_seq(&mut self, packet: &Packet) -> bool {
        if packet.header.ssrc != self.params.ssrc {
            warn!(
                "packet for another stream [ssrc:{}, packet ssrc:{}]",
                self.params.ssrc, packet.header.ssrc
            );
            return false;
        }

        let seq = packet.header.sequence_number;
        if !self.started {
            self.started = true;
            self.max_seq = seq;
            self.max_packet_ts = packet.header.timestamp;
        } else if is_seq_higher_than(seq, self.max_seq) {
            self.max_seq = seq;
            self.max_packet_ts = packet.header.timestamp;
        }

        true
    }

    /// Retain a clone of `packet`, keeping the buffer sequence-ordered and
    /// bounded, and reusing the evicted slot once full.
    fn store_packet(&mut self, packet: &Packet) -> Result<()> {
        let size = packet.marshal_size();
        if size > MTU {
            warn!(
                "packet too big [ssrc:{}, seq:{}, size:{}]",
                packet.header.ssrc, packet.header.sequence_number, size
            );
            return Ok(());
        }

        let mut item = BufferItem {
            seq: packet.header.sequence_number,
            timestamp: packet.header.timestamp,
            resent_at: None,
            sent_times: 0,
            slot: None,
        };

        if self.buffer.is_empty() {
            self.storage.store(0, packet)?;
            item.slot = Some(0);
            self.buffer.push_back(item);
            return Ok(());
        }

        match self.buffer.ordered_insert_by_seq(item) {
            Insert::Duplicate(index) => {
                let existing = self.buffer[index];

                // Exact duplicate: ignore. New timestamp under the same
                // sequence number: replace the stored clone in place.
                if existing.timestamp == packet.header.timestamp {
                    return Ok(());
                }

                let Some(slot) = existing.slot else {
                    debug_assert!(false, "retained item without a bound slot");
                    return Ok(());
                };
                self.storage.replace(slot, packet)?;

                let item = &mut self.buffer[index];
                item.timestamp = packet.header.timestamp;
                item.resent_at = None;
                item.sent_times = 0;
            }
            Insert::Inserted(mut index) => {
                let slot;
                if self.buffer.len() <= self.buffer.max_size() {
                    // Not overfull: the next unused slot is the one past the
                    // previously bound ones.
                    slot = self.buffer.len() - 1;
                } else {
                    let reclaimed = self.buffer.trim_front().and_then(|evicted| evicted.slot);

                    if index == 0 {
                        // The packet is older than the entire full buffer:
                        // the trim evicted it right back out.
                        debug!(
                            "packet older than the whole buffer, not retained [seq:{}]",
                            packet.header.sequence_number
                        );
                        debug_assert!(reclaimed.is_none());
                        return Ok(());
                    }
                    index -= 1;

                    debug_assert!(reclaimed.is_some(), "evicted item without a bound slot");
                    let Some(freed) = reclaimed else {
                        return Ok(());
                    };
                    self.storage.release(freed);
                    slot = freed;
                }

                self.storage.store(slot, packet)?;
                self.buffer[index].slot = Some(slot);
            }
        }

        Ok(())
    }

    /// Index of the retained item with sequence number `seq`, scanning from
    /// the oldest; `None` as soon as a newer sequence is reached.
    fn find_item(&self, seq: u16) -> Option<usize> {
        for index in 0..self.buffer.len() {
            let stored = self.buffer[index].seq;
            if stored == seq {
                return Some(index);
            }
            if is_seq_higher_than(stored, seq) {
                return None;
            }
        }

        None
    }
}

impl std::fmt::Debug for SendStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendStream")
            .field("ssrc", &self.params.ssrc)
            .field("use_nack", &self.use_nack)
            .field("retained", &self.buffer.len())
            .field("capacity", &self.storage.capacity())
            .field("rtt", &self.rtt)
            .field("has_rtx", &self.has_rtx())
            .finish()
    }
}
