//! Replacement request domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::wire_enum;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

wire_enum!(RequestStatus, "request status", {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

/// An admin's terminal decision on a pending request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

wire_enum!(Decision, "decision", {
    Approved => "approved",
    Rejected => "rejected",
});

impl From<Decision> for RequestStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => RequestStatus::Approved,
            Decision::Rejected => RequestStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplacementRequest {
    pub id: Uuid,
    pub device_id: Uuid,
    pub repair_id: Option<Uuid>,
    pub warranty_id: Option<Uuid>,
    pub requester_id: Uuid,
    pub reason: String,
    pub status: RequestStatus,
    pub admin_notes: Option<String>,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Atomic request write. When `repair_id` is set the repair moves to
/// `replacement_requested` in the same operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReplacementRequest {
    pub device_id: Uuid,
    pub repair_id: Option<Uuid>,
    pub warranty_id: Option<Uuid>,
    pub requester_id: Uuid,
    pub reason: String,
}

/// Atomic resolution write. Only applies to a `pending` request.
///
/// On approval `replace_device` / `deactivate_warranty` are applied in
/// the same operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveReplacement {
    pub request_id: Uuid,
    pub decision: Decision,
    pub admin_notes: Option<String>,
    pub resolved_by: Uuid,
    pub resolved_at: DateTime<Utc>,
    pub replace_device: Option<Uuid>,
    pub deactivate_warranty: Option<Uuid>,
}
