//! Profile domain model (owned by the ProfileStore).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::wire_enum;

/// Caller role. Fixed at profile creation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Store,
    Lab,
}

wire_enum!(Role, "role", {
    Admin => "admin",
    Store => "store",
    Lab => "lab",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    /// Same value as the Directory identity id.
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Full-row write keyed by `id`, overwriting any existing row.
///
/// `created_at` of an existing row is preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub is_active: bool,
}

/// Partial update. The role is deliberately absent: it has no
/// post-creation transition.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateProfile {
    pub full_name: Option<String>,
    /// `Some(Some(val))` = set, `Some(None)` = clear, `None` = no change.
    pub phone: Option<Option<String>>,
    pub is_active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_known_values() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("store".parse::<Role>().unwrap(), Role::Store);
        assert_eq!("lab".parse::<Role>().unwrap(), Role::Lab);
    }

    #[test]
    fn role_rejects_unknown_values() {
        let err = "superuser".parse::<Role>().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
        assert!(err.to_string().contains("superuser"));
    }

    #[test]
    fn role_serializes_as_wire_string() {
        let json = serde_json::to_string(&Role::Lab).unwrap();
        assert_eq!(json, "\"lab\"");
    }
}
