use thiserror::Error;

use crate::client::LoginStage;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Everything that can go wrong between a caller and the service.
///
/// Protocol and auth failures always surface; only storage initialization
/// trouble is absorbed (the store degrades to memory-only and logs instead).
#[derive(Debug, Error)]
pub enum ClientError {
    /// An authenticated call came back as a fresh OpenID transaction
    /// instead of a result. Recoverable: log in and retry the call.
    #[error("{url} requires a logged in user")]
    LoginRequired { url: String },

    /// The server answered a step of the redirect sequence with a shape we
    /// cannot drive: no form, no action, a missing expected field. Fatal to
    /// the current login attempt, never retried.
    #[error("login sequence broke during {stage}: {reason}")]
    Protocol { stage: LoginStage, reason: String },

    /// The caller asked for an HTTP verb the dispatcher does not implement.
    #[error("unsupported HTTP verb: {0}")]
    UnsupportedVerb(String),

    /// Transport-level failure (connect refused, timeout), surfaced after
    /// the configured retries are exhausted.
    #[error("transport failure: {0}")]
    Transport(#[from] rquest::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl ClientError {
    pub(crate) fn protocol(stage: LoginStage, reason: impl Into<String>) -> Self {
        ClientError::Protocol {
            stage,
            reason: reason.into(),
        }
    }
}
