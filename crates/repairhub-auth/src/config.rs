//! Authentication configuration.

use serde::Deserialize;

/// Configuration for token handling, password policy and provisioning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// PEM-encoded Ed25519 private key for JWT signing.
    pub jwt_private_key_pem: String,
    /// PEM-encoded Ed25519 public key for JWT verification.
    pub jwt_public_key_pem: String,
    /// Access token lifetime in seconds (default: 3600 = 1 hour).
    pub access_token_lifetime_secs: u64,
    /// JWT issuer (`iss` claim).
    pub jwt_issuer: String,
    /// Optional pepper prepended to passwords before Argon2id verification.
    pub pepper: Option<String>,
    /// Minimum password length for create and reset.
    pub min_password_length: usize,
    /// A profile row younger than this is treated as part of the same
    /// creation rather than a stale collision.
    pub freshness_window_secs: u64,
    /// Embed `user_role`/`user_active` claims at sign-in so the gate can
    /// skip the profile lookup.
    pub embed_profile_claims: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_private_key_pem: String::new(),
            jwt_public_key_pem: String::new(),
            access_token_lifetime_secs: 3600,
            jwt_issuer: "repairhub".into(),
            pepper: None,
            min_password_length: 8,
            freshness_window_secs: 60,
            embed_profile_claims: true,
        }
    }
}
