use thiserror::Error;

/// Client-side failure surface. Transport problems are fatal to the one
/// connection and never retried; everything else is recovered in place.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    /// Empty, or would smuggle extra lines into the handshake.
    #[error("unusable chat name {0:?}")]
    InvalidName(String),
}
