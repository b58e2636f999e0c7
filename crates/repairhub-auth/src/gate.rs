//! The authorization gate: bearer token in, verified caller out.
//!
//! Resolution order:
//! 1. Verify the token signature, issuer and expiry, then confirm with
//!    the Directory that the identity still exists and its credential is
//!    confirmed (`Unauthenticated`).
//! 2. Take role and active flag from the token claims when both are
//!    present; otherwise read the caller's profile (one lookup).
//! 3. Reject deactivated callers (`Forbidden(inactive)`).
//! 4. Reject callers whose role is not allowed (`Forbidden(role)`).
//!
//! The gate performs no writes.

use repairhub_core::error::{ForbiddenReason, HubError, HubResult};
use repairhub_core::models::profile::Role;
use repairhub_core::models::identity::CredentialState;
use repairhub_core::repository::{Directory, ProfileStore};
use tracing::debug;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::token;

/// Where the caller's role and active flag came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Claims,
    ProfileLookup,
}

/// A verified, active caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub identity_id: Uuid,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub resolved_via: Resolution,
}

impl Caller {
    /// Fail with `Forbidden(role)` unless the caller holds one of `allowed`.
    pub fn require(&self, allowed: &[Role]) -> HubResult<()> {
        if allowed.contains(&self.role) {
            return Ok(());
        }
        let names: Vec<&str> = allowed.iter().map(Role::as_str).collect();
        Err(HubError::Forbidden {
            reason: ForbiddenReason::Role,
            message: format!(
                "role {} is not permitted here (requires {})",
                self.role,
                names.join(" or ")
            ),
        })
    }
}

pub struct AuthorizationGate<D: Directory, P: ProfileStore> {
    directory: D,
    profiles: P,
    config: AuthConfig,
}

impl<D: Directory, P: ProfileStore> AuthorizationGate<D, P> {
    pub fn new(directory: D, profiles: P, config: AuthConfig) -> Self {
        Self {
            directory,
            profiles,
            config,
        }
    }

    /// Steps 1 to 3: verify the token and resolve an active caller.
    pub async fn authenticate(&self, bearer: &str) -> HubResult<Caller> {
        let raw = bearer.strip_prefix("Bearer ").unwrap_or(bearer).trim();
        if raw.is_empty() {
            return Err(AuthError::MissingCredential.into());
        }

        let claims = token::decode_access_token(raw, &self.config).inspect_err(|e| {
            debug!(token = %token::token_fingerprint(raw), error = %e, "token rejected");
        })?;
        let identity_id = claims.identity_id()?;

        // Tokens outlive admin changes; the Directory is the authority on
        // whether the identity still exists.
        let identity = match self.directory.get_identity(identity_id).await {
            Ok(identity) => identity,
            Err(HubError::NotFound { .. }) => {
                debug!(identity_id = %identity_id, "token for a deleted identity");
                return Err(AuthError::IdentityRevoked.into());
            }
            Err(e) => return Err(e),
        };
        if identity.credential_state != CredentialState::Confirmed {
            return Err(AuthError::CredentialUnconfirmed.into());
        }

        let (role, is_active, resolved_via) = match claims.profile_claims() {
            Some((role, active)) => (role, active, Resolution::Claims),
            None => {
                let profile = self.profiles.get(identity_id).await?.ok_or_else(|| {
                    HubError::Forbidden {
                        reason: ForbiddenReason::Role,
                        message: format!("identity {identity_id} has no profile"),
                    }
                })?;
                (profile.role, profile.is_active, Resolution::ProfileLookup)
            }
        };

        if !is_active {
            return Err(HubError::Forbidden {
                reason: ForbiddenReason::Inactive,
                message: format!("identity {identity_id} is deactivated"),
            });
        }

        Ok(Caller {
            identity_id,
            email: identity.email,
            role,
            is_active,
            resolved_via,
        })
    }

    /// All four steps: an active caller holding one of `allowed`.
    pub async fn authorize(&self, bearer: &str, allowed: &[Role]) -> HubResult<Caller> {
        let caller = self.authenticate(bearer).await?;
        caller.require(allowed)?;
        Ok(caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(role: Role) -> Caller {
        Caller {
            identity_id: Uuid::new_v4(),
            email: "c@example.com".into(),
            role,
            is_active: true,
            resolved_via: Resolution::Claims,
        }
    }

    #[test]
    fn require_accepts_listed_roles() {
        assert!(caller(Role::Lab).require(&[Role::Lab, Role::Store]).is_ok());
        assert!(caller(Role::Admin).require(&[Role::Admin]).is_ok());
    }

    #[test]
    fn require_rejects_other_roles() {
        let err = caller(Role::Store).require(&[Role::Admin]).unwrap_err();
        assert_eq!(
            err.kind(),
            repairhub_core::ErrorKind::Forbidden(ForbiddenReason::Role)
        );
        assert!(err.to_string().contains("requires admin"));
    }
}
