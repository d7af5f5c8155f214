use serde::{Deserialize, Serialize};

/// Snapshot of the stream's outbound statistics.
///
/// Serializes with the field names the stats consumers expect
/// (`"type": "outbound-rtp"`, camelCase keys).
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendStreamStats {
    #[serde(rename = "type")]
    pub typ: String,

    pub ssrc: u32,
    pub packets_sent: u32,
    pub bytes_sent: u32,
    /// Cumulative loss reported by the remote receiver, advisory.
    pub packets_lost: u32,
    /// Fraction lost from the latest receiver report, advisory.
    pub fraction_lost: u8,
    /// Smoothed RTT in whole milliseconds, 0 while unknown.
    pub round_trip_time: u32,
}
