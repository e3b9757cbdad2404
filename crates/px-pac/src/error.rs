/// Failure to apply a message from the background context.
#[derive(Debug, thiserror::Error)]
pub enum PacError {
    #[error("failed to decode PAC message: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("PAC runtime has not received its initial snapshot")]
    NotInitialized,
}
