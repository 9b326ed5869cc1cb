use opd_core::SourceError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Maps a transport failure. Connection and timeout failures keep reqwest's description.
pub(crate) fn transport(err: reqwest::Error) -> SourceError {
    if err.is_decode() {
        SourceError::Decode(err.to_string())
    } else {
        SourceError::Transport(err.to_string())
    }
}
