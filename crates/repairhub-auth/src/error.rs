//! Authentication error types.

use repairhub_core::error::HubError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("credential is not confirmed")]
    CredentialUnconfirmed,

    #[error("missing bearer credential")]
    MissingCredential,

    #[error("identity no longer exists")]
    IdentityRevoked,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl From<AuthError> for HubError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials
            | AuthError::CredentialUnconfirmed
            | AuthError::MissingCredential
            | AuthError::IdentityRevoked
            | AuthError::TokenExpired
            | AuthError::TokenInvalid(_) => HubError::Unauthenticated {
                reason: err.to_string(),
            },
            AuthError::Crypto(msg) => HubError::Internal(msg),
        }
    }
}
