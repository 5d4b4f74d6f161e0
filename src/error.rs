use std::time::Duration;
use thiserror::Error;

use crate::auth::AuthState;
use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("a rewrite request is already in flight")]
    Busy,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Replace a "please wait" rejection with the sign-in failure behind it.
    pub fn with_auth_state(self, auth: &AuthState) -> Self {
        match (self, auth) {
            (Error::Validation(ValidationError::NoIdentity), AuthState::Failed(reason)) => {
                Error::Credential(CredentialError::Unavailable(reason.clone()))
            }
            (err, _) => err,
        }
    }

    /// Returns a user-friendly suggestion for how to resolve this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::Validation(ValidationError::NoIdentity) => {
                Some("Sign-in is still pending, retry in a moment or pass --token")
            }
            Error::Credential(CredentialError::NotAuthenticated) => {
                Some("Set auth.api_key for anonymous sign-in or pass --token")
            }
            Error::Credential(CredentialError::RefreshFailed(_)) => {
                Some("The session expired and could not be renewed, run the command again")
            }
            Error::Credential(
                CredentialError::SignUpFailed(_) | CredentialError::Unavailable(_),
            ) => {
                Some("Check auth.api_key and your internet connection")
            }
            Error::Transport(TransportError::Status { status: 401, .. }) => {
                Some("The server rejected the credential, check api.authorization_scheme")
            }
            Error::Transport(TransportError::Connect(_)) => {
                Some("Check api.base_url and that the rewrite service is running")
            }
            Error::Transport(TransportError::Timeout(_)) => {
                Some("Check your internet connection or raise api.timeout_secs")
            }
            Error::Busy => Some("Wait for the current rewrite to finish"),
            Error::Config(ConfigError::InvalidValue { field, .. }) if field == "auth.token" => {
                Some("Pass --token or switch to auth.mode = \"anonymous\"")
            }
            Error::Config(_) => Some("Run 'dashrewrite config' to see the config file location"),
            _ => None,
        }
    }
}

/// Precondition failures. Recovered locally, no network I/O is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please wait for authentication to complete")]
    NoIdentity,

    #[error("Please enter some text to rewrite")]
    EmptyText,

    #[error("Text exceeds {max} character limit")]
    TooLong { max: usize },

    #[error("Text must be longer than {min} characters")]
    TooShort { min: usize },
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("anonymous sign-in failed: {0}")]
    SignUpFailed(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// Sign-in settled as failed; carries the recorded reason.
    #[error("{0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// Non-2xx response; `message` is the body text or the status line.
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("http error: {0}")]
    Connect(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Response body is empty")]
    MissingBody,

    #[error("stream read failed: {0}")]
    Read(String),
}

pub type Result<T> = std::result::Result<T, Error>;
