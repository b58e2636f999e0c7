//! Identity domain model (owned by the Directory).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::wire_enum;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    Unconfirmed,
    Confirmed,
}

wire_enum!(CredentialState, "credential state", {
    Unconfirmed => "unconfirmed",
    Confirmed => "confirmed",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub credential_state: CredentialState,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIdentity {
    pub email: String,
    /// Raw password (hashed with Argon2id before storage).
    pub password: String,
    /// Created identities are confirmed immediately when set.
    pub confirmed: bool,
    pub metadata: Option<serde_json::Value>,
}
