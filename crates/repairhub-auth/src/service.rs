//! Sign-in: verify the Directory credential and issue an access token.

use repairhub_core::error::{ForbiddenReason, HubError, HubResult};
use repairhub_core::models::identity::CredentialState;
use repairhub_core::models::profile::Role;
use repairhub_core::repository::{Directory, ProfileStore};
use tracing::info;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::password;
use crate::token;

/// Successful sign-in result.
#[derive(Debug)]
pub struct SignInOutput {
    /// Signed JWT access token.
    pub access_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    pub identity_id: Uuid,
    /// `None` when the identity has no profile yet.
    pub role: Option<Role>,
}

/// Authentication service.
///
/// Generic over the collaborator traits so that the auth layer has no
/// dependency on the database crate.
pub struct AuthService<D: Directory, P: ProfileStore> {
    directory: D,
    profiles: P,
    config: AuthConfig,
}

impl<D: Directory, P: ProfileStore> AuthService<D, P> {
    pub fn new(directory: D, profiles: P, config: AuthConfig) -> Self {
        Self {
            directory,
            profiles,
            config,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Authenticate with email + password and issue an access token.
    ///
    /// The token carries role/active claims when the profile exists and
    /// claim embedding is enabled.
    pub async fn sign_in(&self, email: &str, password: &str) -> HubResult<SignInOutput> {
        // 1. Look up the identity; unknown emails look like bad passwords.
        let email = email.trim().to_lowercase();
        let identity = match self.directory.find_by_email(&email).await {
            Ok(identity) => identity,
            Err(HubError::NotFound { .. }) => return Err(AuthError::InvalidCredentials.into()),
            Err(e) => return Err(e),
        };

        // 2. Verify password.
        let valid = password::verify_password(
            password,
            &identity.password_hash,
            self.config.pepper.as_deref(),
        )?;
        if !valid {
            return Err(AuthError::InvalidCredentials.into());
        }
        if identity.credential_state != CredentialState::Confirmed {
            return Err(AuthError::CredentialUnconfirmed.into());
        }

        // 3. Deactivated users cannot obtain a token.
        let profile = self.profiles.get(identity.id).await?;
        if profile.as_ref().is_some_and(|p| !p.is_active) {
            return Err(HubError::Forbidden {
                reason: ForbiddenReason::Inactive,
                message: format!("identity {} is deactivated", identity.id),
            });
        }

        // 4. Issue the token.
        let claims = profile
            .as_ref()
            .filter(|_| self.config.embed_profile_claims)
            .map(|p| (p.role, p.is_active));
        let access_token =
            token::issue_access_token(identity.id, &identity.email, claims, &self.config)?;

        info!(identity_id = %identity.id, with_claims = claims.is_some(), "signed in");
        Ok(SignInOutput {
            access_token,
            expires_in: self.config.access_token_lifetime_secs,
            identity_id: identity.id,
            role: profile.map(|p| p.role),
        })
    }
}
