//! Error types for the RepairHub system.
//!
//! Every failure carries a stable [`ErrorKind`] code (via
//! [`HubError::kind`]) and a human-readable message (via `Display`).

use std::fmt;

use thiserror::Error;

/// Why a verified caller was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenReason {
    /// The caller's profile is deactivated.
    Inactive,
    /// The caller's role is not in the operation's allowed set.
    Role,
}

impl fmt::Display for ForbiddenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => f.write_str("inactive"),
            Self::Role => f.write_str("role"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// A stale profile row already occupies a freshly issued identity id.
    IdCollision,
    /// The device's warranty has already been activated.
    AlreadyActive,
    /// The replacement request already carries a terminal decision.
    AlreadyResolved,
    /// A unique attribute (e.g. IMEI, email) is already taken.
    Duplicate,
    /// The row is still referenced and cannot be removed.
    InUse,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdCollision => f.write_str("id_collision"),
            Self::AlreadyActive => f.write_str("already_active"),
            Self::AlreadyResolved => f.write_str("already_resolved"),
            Self::Duplicate => f.write_str("duplicate"),
            Self::InUse => f.write_str("in_use"),
        }
    }
}

/// The external collaborator that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamSystem {
    Directory,
    ProfileStore,
}

impl fmt::Display for UpstreamSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory => f.write_str("directory"),
            Self::ProfileStore => f.write_str("profile_store"),
        }
    }
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("Unauthenticated: {reason}")]
    Unauthenticated { reason: String },

    #[error("Forbidden ({reason}): {message}")]
    Forbidden {
        reason: ForbiddenReason,
        message: String,
    },

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Conflict ({kind}): {message}")]
    Conflict { kind: ConflictKind, message: String },

    #[error("Upstream failure ({system}): {message}")]
    Upstream {
        system: UpstreamSystem,
        message: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type HubResult<T> = Result<T, HubError>;

/// Stable, machine-readable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden(ForbiddenReason),
    NotFound,
    Validation,
    Conflict(ConflictKind),
    Upstream(UpstreamSystem),
    Internal,
}

impl ErrorKind {
    pub fn code(&self) -> String {
        match self {
            Self::Unauthenticated => "unauthenticated".into(),
            Self::Forbidden(reason) => format!("forbidden.{reason}"),
            Self::NotFound => "not_found".into(),
            Self::Validation => "validation".into(),
            Self::Conflict(kind) => format!("conflict.{kind}"),
            Self::Upstream(system) => format!("upstream_failure.{system}"),
            Self::Internal => "internal".into(),
        }
    }
}

impl HubError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated { .. } => ErrorKind::Unauthenticated,
            Self::Forbidden { reason, .. } => ErrorKind::Forbidden(*reason),
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Conflict { kind, .. } => ErrorKind::Conflict(*kind),
            Self::Upstream { system, .. } => ErrorKind::Upstream(*system),
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn not_found(entity: &str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(kind: ConflictKind, message: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            message: message.into(),
        }
    }

    pub fn upstream(system: UpstreamSystem, message: impl Into<String>) -> Self {
        Self::Upstream {
            system,
            message: message.into(),
        }
    }

    /// Re-tag a storage failure as coming from `system`. Other kinds
    /// pass through untouched.
    pub fn attribute_to(self, system: UpstreamSystem) -> Self {
        match self {
            Self::Upstream { message, .. } => Self::Upstream { system, message },
            other => other,
        }
    }
}
