//! Error types and conversions

use thiserror::Error;

/// Failure classes of the session adapter.
///
/// The enum is `Clone` (payloads are plain strings) so a settled
/// redirect-completion failure can be replayed to every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Interactive login failed: {0}")]
    Interactive(String),

    #[error("Redirect handling failed: {0}")]
    RedirectHandling(String),

    #[error("Logout failed: {0}")]
    Logout(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("No authenticated session")]
    NoSession,

    #[error("Another acquisition is already in flight")]
    AcquisitionInFlight,
}

pub type SessionResult<T> = Result<T, SessionError>;

impl From<SessionError> for String {
    fn from(err: SessionError) -> String {
        err.to_string()
    }
}
