use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    /// The node could not be reached, timed out, or refused the credentials.
    #[error("bitcoin node unavailable: {0}")]
    Unavailable(String),
    #[error("rpc call failed at height {height}: {message}")]
    Rpc { height: u64, message: String },
    #[error("cancelled")]
    Cancelled,
}

impl From<bitcoincore_rpc::Error> for SourceError {
    fn from(err: bitcoincore_rpc::Error) -> Self {
        SourceError::Unavailable(err.to_string())
    }
}
