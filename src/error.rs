//! Error taxonomy shared by the player core, the Web API client and the CLI.
//!
//! Every failure the session manager can surface is a [`PlayerError`]. The
//! store keeps the latest one as an [`ErrorRecord`], which additionally tells
//! the UI what the user is expected to do about it (see [`UserAction`]).

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = PlayerError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Error)]
pub enum PlayerError {
    #[error("no session available, please run `sporlplay auth`")]
    NoSession,

    #[error("session expired and could not be refreshed, please run `sporlplay auth`")]
    AuthExpired,

    #[error("playback SDK failed to load: {0}")]
    SdkLoadError(String),

    #[error("playback SDK did not become ready within {0:?}")]
    SdkTimeout(Duration),

    #[error("device initialization failed: {0}")]
    InitializationError(String),

    #[error("device authentication failed: {0}")]
    AuthenticationError(String),

    #[error("account error: {message}")]
    AccountError {
        message: String,
        premium_required: bool,
    },

    #[error("playback failed: {0}")]
    PlaybackError(String),

    #[error("playback device is not ready")]
    DeviceNotReady,

    #[error("request was not authorized")]
    Unauthorized,

    #[error("this operation requires a Spotify Premium account")]
    PremiumRequired,

    #[error("Spotify API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("rate limited by Spotify API, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("http error: {0}")]
    Http(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("invalid json: {0}")]
    Json(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for PlayerError {
    fn from(err: reqwest::Error) -> Self {
        PlayerError::Http(err.to_string())
    }
}

impl From<std::io::Error> for PlayerError {
    fn from(err: std::io::Error) -> Self {
        PlayerError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PlayerError {
    fn from(err: serde_json::Error) -> Self {
        PlayerError::Json(err.to_string())
    }
}

impl PlayerError {
    /// Builds an account error, flagging the premium-required sub-case from
    /// the message the SDK or API handed us.
    pub fn account(message: impl Into<String>) -> Self {
        let message = message.into();
        let premium_required = mentions_premium(&message);
        PlayerError::AccountError {
            message,
            premium_required,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PlayerError::NoSession => ErrorKind::NoSession,
            PlayerError::AuthExpired => ErrorKind::AuthExpired,
            PlayerError::SdkLoadError(_) => ErrorKind::SdkLoadError,
            PlayerError::SdkTimeout(_) => ErrorKind::SdkTimeout,
            PlayerError::InitializationError(_) => ErrorKind::InitializationError,
            PlayerError::AuthenticationError(_) => ErrorKind::AuthenticationError,
            PlayerError::AccountError {
                premium_required, ..
            } => ErrorKind::AccountError {
                premium_required: *premium_required,
            },
            PlayerError::PremiumRequired => ErrorKind::AccountError {
                premium_required: true,
            },
            PlayerError::PlaybackError(_) => ErrorKind::PlaybackError,
            PlayerError::DeviceNotReady => ErrorKind::DeviceNotReady,
            PlayerError::Unauthorized => ErrorKind::AuthExpired,
            PlayerError::Api { status, .. } => ErrorKind::Api { status: *status },
            PlayerError::RateLimited { retry_after } => ErrorKind::RateLimited {
                retry_after: *retry_after,
            },
            PlayerError::Http(_) | PlayerError::Io(_) | PlayerError::Json(_) => {
                ErrorKind::PlaybackError
            }
            PlayerError::Config(_) => ErrorKind::InitializationError,
        }
    }

    /// True for failures that can only be fixed by signing in again.
    pub fn needs_login(&self) -> bool {
        matches!(
            self,
            PlayerError::NoSession | PlayerError::AuthExpired | PlayerError::Unauthorized
        )
    }
}

pub(crate) fn mentions_premium(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("premium")
}

/// Classification of an [`ErrorRecord`], one per entry of the taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NoSession,
    AuthExpired,
    SdkLoadError,
    SdkTimeout,
    InitializationError,
    AuthenticationError,
    AccountError { premium_required: bool },
    PlaybackError,
    DeviceNotReady,
    Api { status: u16 },
    RateLimited { retry_after: Duration },
}

/// What the user should do about an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    /// Transient, nothing to do.
    Wait,
    /// Sign in again.
    Login,
    /// Upgrade to a premium account.
    UpgradeAccount,
    /// Dismiss and possibly re-issue the same control.
    Retry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let retry_after = match kind {
            ErrorKind::RateLimited { retry_after } => Some(retry_after),
            _ => None,
        };
        Self {
            kind,
            message: message.into(),
            retry_after,
        }
    }

    pub fn action(&self) -> UserAction {
        match self.kind {
            ErrorKind::DeviceNotReady => UserAction::Wait,
            ErrorKind::NoSession | ErrorKind::AuthExpired | ErrorKind::AuthenticationError => {
                UserAction::Login
            }
            ErrorKind::AccountError {
                premium_required: true,
            } => UserAction::UpgradeAccount,
            _ => UserAction::Retry,
        }
    }
}

impl From<&PlayerError> for ErrorRecord {
    fn from(err: &PlayerError) -> Self {
        ErrorRecord::new(err.kind(), err.to_string())
    }
}
