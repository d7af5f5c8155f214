//! Negotiated parameters of the outgoing stream.

/// RTCP feedback mechanism negotiated for the stream.
///
/// See: <https://draft.ortc.org/#dom-rtcrtcpfeedback>
#[derive(Default, Debug, Clone)]
pub struct RTCPFeedback {
    /// Type of feedback mechanism ("ack", "ccm", "nack", "goog-remb",
    /// "transport-cc").
    pub typ: String,
    /// Parameter value depending on the feedback type; `typ = "nack"` with
    /// an empty parameter is generic NACK.
    pub parameter: String,
}

/// Stream context handed to [`SendStream::new`](crate::SendStream::new).
#[derive(Default, Debug, Clone)]
pub struct StreamParams {
    /// Synchronization Source identifier of the stream.
    pub ssrc: u32,
    /// RTP payload type (e.g. 96 for VP8, 111 for Opus).
    pub payload_type: u8,
    /// MIME type of the codec (e.g. "video/VP8", "audio/opus").
    pub mime_type: String,
    /// Clock rate in Hz (90000 for video, 48000 for Opus audio).
    pub clock_rate: u32,
    /// RTCP feedback mechanisms negotiated for this stream.
    pub rtcp_feedback: Vec<RTCPFeedback>,
}

impl StreamParams {
    /// Whether generic NACK was negotiated: an [`RTCPFeedback`] entry with
    /// `typ == "nack"` and an empty parameter.
    pub fn supports_nack(&self) -> bool {
        self.rtcp_feedback
            .iter()
            .any(|fb| fb.typ == "nack" && fb.parameter.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports_nack() {
        let with_nack = StreamParams {
            ssrc: 12345,
            rtcp_feedback: vec![RTCPFeedback {
                typ: "nack".to_string(),
                parameter: String::new(),
            }],
            ..Default::default()
        };
        assert!(with_nack.supports_nack());

        // nack-pli is not generic NACK.
        let with_nack_pli = StreamParams {
            ssrc: 12345,
            rtcp_feedback: vec![RTCPFeedback {
                typ: "nack".to_string(),
                parameter: "pli".to_string(),
            }],
            ..Default::default()
        };
        assert!(!with_nack_pli.supports_nack());

        let without_feedback = StreamParams {
            ssrc: 12345,
            ..Default::default()
        };
        assert!(!without_feedback.supports_nack());
    }
}
