//! Sender-side RTP stream core for a selective forwarding unit.
//!
//! [`SendStream`] sits on the egress side of an RTP flow. It observes every
//! outgoing packet, retains recent ones in a bounded, pre-allocated history,
//! answers RTCP NACK feedback ([RFC 4585]) with per-packet throttling by RTT
//! and packet age, re-encodes retransmissions as RTX ([RFC 4588]), consumes
//! Receiver Reports for the RTT estimate, and emits Sender Reports
//! ([RFC 3550]).
//!
//! Packet parsing and serialization belong to the [`rtp`] and [`rtcp`]
//! crates; this crate receives and emits fully-formed packet objects.
//! Transport, SRTP and send scheduling live elsewhere.
//!
//! # Design
//!
//! The core is sans-io and single-threaded: every operation completes
//! synchronously in bounded time, and the current time is an argument
//! wherever it matters. Memory for the whole retransmission history
//! (`buffer_size` slots of MTU-plus-headroom bytes) is allocated once at
//! construction; storing a packet never allocates.
//!
//! # Example
//!
//! ```ignore
//! use rtc_sendstream::{RTCPFeedback, SendStream, StreamParams};
//! use std::time::Instant;
//!
//! let params = StreamParams {
//!     ssrc: 0x1234,
//!     payload_type: 96,
//!     mime_type: "video/VP8".to_string(),
//!     clock_rate: 90000,
//!     rtcp_feedback: vec![RTCPFeedback { typ: "nack".to_string(), parameter: String::new() }],
//! };
//! let mut stream = SendStream::new(params, 600);
//!
//! // For every outgoing packet:
//! stream.receive_packet(&packet)?;
//!
//! // When a NACK arrives:
//! let mut resend = Vec::new();
//! stream.request_retransmission(base_seq, bitmask, Instant::now(), &mut resend)?;
//! ```
//!
//! [RFC 3550]: https://datatracker.ietf.org/doc/html/rfc3550
//! [RFC 4585]: https://datatracker.ietf.org/doc/html/rfc4585
//! [RFC 4588]: https://datatracker.ietf.org/doc/html/rfc4588

#![warn(rust_2018_idioms)]

mod buffer;
mod counters;
mod error;
mod rtx;
mod send_stream;
mod seqnum;
mod stats;
mod storage;
mod stream_params;

pub use buffer::BufferItem;
pub use error::{Error, Result};
pub use send_stream::{
    SendStream, DEFAULT_RTT_MS, MAX_REQUESTED_PACKETS, MAX_RETRANSMISSION_DELAY_MS,
};
pub use stats::SendStreamStats;
pub use storage::MTU;
pub use stream_params::{RTCPFeedback, StreamParams};
