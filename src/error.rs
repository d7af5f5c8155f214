use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the stream core.
///
/// Only failures of the packet layer (storing or re-materializing a clone)
/// become errors; every recoverable anomaly in the retransmission path is a
/// logged no-op instead, see the per-operation docs on
/// [`SendStream`](crate::SendStream).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("marshal: {0}")]
    Marshal(#[from] util::Error),
}
