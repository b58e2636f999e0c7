//! SurrealDB implementation of the credential [`Directory`].
//!
//! Password hashing uses Argon2id with OWASP-recommended parameters
//! (memory: 19 MiB, iterations: 2, parallelism: 1). Salt is randomly
//! generated per hash. An optional pepper (server-side secret) can be
//! provided at construction time.
//!
//! Every failure leaving this module is attributed to
//! [`UpstreamSystem::Directory`].

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use chrono::{DateTime, Utc};
use repairhub_core::error::{HubError, HubResult, UpstreamSystem};
use repairhub_core::models::identity::{CreateIdentity, CredentialState, Identity};
use repairhub_core::repository::Directory;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use super::{IdRow, parse_uuid, parse_wire};
use crate::error::{DbError, classify};

#[derive(Debug, SurrealValue)]
struct IdentityRow {
    record_id: String,
    email: String,
    password_hash: String,
    credential_state: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl IdentityRow {
    fn try_into_identity(self) -> Result<Identity, DbError> {
        Ok(Identity {
            id: parse_uuid("identity", &self.record_id)?,
            email: self.email,
            password_hash: self.password_hash,
            credential_state: parse_wire(&self.credential_state)?,
            metadata: self.metadata,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Hash a password with Argon2id using OWASP-recommended parameters.
///
/// If a pepper is provided, it is prepended to the password before
/// hashing.
pub fn hash_password(password: &str, pepper: Option<&str>) -> Result<String, DbError> {
    // OWASP ASVS recommended: m=19456 (19 MiB), t=2, p=1
    let params = argon2::Params::new(19456, 2, 1, None)
        .map_err(|e| DbError::Query(format!("argon2 params error: {e}")))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let peppered = pepper.map(|p| format!("{p}{password}"));
    let input = peppered.as_deref().unwrap_or(password).as_bytes();

    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let hash = argon2
        .hash_password(input, &salt)
        .map_err(|e| DbError::Query(format!("password hash error: {e}")))?;

    Ok(hash.to_string())
}

/// Verify a password against an Argon2id hash.
///
/// Public for use by the auth layer.
pub fn verify_password(password: &str, hash: &str, pepper: Option<&str>) -> Result<bool, DbError> {
    use argon2::PasswordVerifier;

    let peppered = pepper.map(|p| format!("{p}{password}"));
    let input = peppered.as_deref().unwrap_or(password).as_bytes();

    let parsed_hash = argon2::PasswordHash::new(hash)
        .map_err(|e| DbError::Decode(format!("invalid hash format: {e}")))?;

    match Argon2::default().verify_password(input, &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(DbError::Query(format!("verify error: {e}"))),
    }
}

fn directory_failure(err: HubError) -> HubError {
    err.attribute_to(UpstreamSystem::Directory)
}

/// Identities live in the `identity` table; the matching `profile` row
/// shares the record key.
#[derive(Clone)]
pub struct SurrealDirectory<C: Connection> {
    db: Surreal<C>,
    pepper: Option<String>,
}

impl<C: Connection> SurrealDirectory<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db, pepper: None }
    }

    pub fn with_pepper(db: Surreal<C>, pepper: String) -> Self {
        Self {
            db,
            pepper: Some(pepper),
        }
    }

    async fn select_one(&self, clause: &str, key: &str, value: String) -> HubResult<Identity> {
        let query = format!("SELECT meta::id(id) AS record_id, * FROM {clause}");
        let mut result = self
            .db
            .query(&query)
            .bind((key.to_string(), value.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<IdentityRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "identity".into(),
            id: value,
        })?;
        Ok(row.try_into_identity()?)
    }

    async fn insert(&self, input: CreateIdentity) -> HubResult<Identity> {
        let id = Uuid::new_v4();
        let password_hash = hash_password(&input.password, self.pepper.as_deref())?;
        let state = if input.confirmed {
            CredentialState::Confirmed
        } else {
            CredentialState::Unconfirmed
        };
        let metadata = input
            .metadata
            .unwrap_or(serde_json::Value::Object(Default::default()));

        let result = self
            .db
            .query(
                "CREATE type::record('identity', $id) SET \
                 email = $email, password_hash = $password_hash, \
                 credential_state = $credential_state, metadata = $metadata",
            )
            .bind(("id", id.to_string()))
            .bind(("email", input.email))
            .bind(("password_hash", password_hash))
            .bind(("credential_state", state.as_str().to_string()))
            .bind(("metadata", metadata))
            .await
            .map_err(DbError::from)?;
        result.check().map_err(|e| classify(e.to_string()))?;

        debug!(identity_id = %id, "identity created");
        self.select_one("type::record('identity', $id)", "id", id.to_string())
            .await
    }

    async fn remove(&self, id: Uuid) -> HubResult<()> {
        // Surfaces NotFound before touching anything.
        self.select_one("type::record('identity', $id)", "id", id.to_string())
            .await?;

        let result = self
            .db
            .query(
                "BEGIN TRANSACTION; \
                 DELETE type::record('profile', $id); \
                 DELETE type::record('identity', $id); \
                 COMMIT TRANSACTION;",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        result.check().map_err(|e| classify(e.to_string()))?;

        debug!(identity_id = %id, "identity and profile deleted");
        Ok(())
    }

    async fn replace_credential(&self, id: Uuid, new_password: &str) -> HubResult<()> {
        let password_hash = hash_password(new_password, self.pepper.as_deref())?;
        let result = self
            .db
            .query(
                "UPDATE type::record('identity', $id) SET \
                 password_hash = $password_hash, \
                 credential_state = 'confirmed', \
                 updated_at = time::now() \
                 RETURN meta::id(id) AS record_id",
            )
            .bind(("id", id.to_string()))
            .bind(("password_hash", password_hash))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(|e| classify(e.to_string()))?;

        let updated: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        if updated.is_empty() {
            return Err(HubError::not_found("identity", id));
        }
        Ok(())
    }
}

impl<C: Connection> Directory for SurrealDirectory<C> {
    async fn create_identity(&self, input: CreateIdentity) -> HubResult<Identity> {
        self.insert(input).await.map_err(directory_failure)
    }

    async fn get_identity(&self, id: Uuid) -> HubResult<Identity> {
        self.select_one("type::record('identity', $id)", "id", id.to_string())
            .await
            .map_err(directory_failure)
    }

    async fn find_by_email(&self, email: &str) -> HubResult<Identity> {
        self.select_one("identity WHERE email = $email", "email", email.to_string())
            .await
            .map_err(directory_failure)
    }

    async fn delete_identity(&self, id: Uuid) -> HubResult<()> {
        self.remove(id).await.map_err(directory_failure)
    }

    async fn update_credential(&self, id: Uuid, new_password: &str) -> HubResult<()> {
        self.replace_credential(id, new_password)
            .await
            .map_err(directory_failure)
    }
}
