//! RepairHub Auth: access tokens, the authorization gate, and the
//! identity provisioning saga that keeps the Directory and the
//! ProfileStore paired.

pub mod collision;
pub mod config;
pub mod error;
pub mod gate;
pub mod password;
pub mod saga;
pub mod service;
pub mod token;

pub use collision::{CollisionGuard, CollisionVerdict};
pub use config::AuthConfig;
pub use error::AuthError;
pub use gate::{AuthorizationGate, Caller, Resolution};
pub use saga::{NewUser, ProvisioningSaga};
pub use service::{AuthService, SignInOutput};
pub use token::AccessTokenClaims;
