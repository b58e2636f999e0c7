//! Repair domain model and its transition table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::wire_enum;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RepairStatus {
    Received,
    InProgress,
    Completed,
    ReplacementRequested,
    Cancelled,
}

wire_enum!(RepairStatus, "repair status", {
    Received => "received",
    InProgress => "in_progress",
    Completed => "completed",
    ReplacementRequested => "replacement_requested",
    Cancelled => "cancelled",
});

impl RepairStatus {
    /// Whether `self -> target` is a legal forward transition.
    ///
    /// Re-applying the current state is not a transition; callers treat
    /// it as a no-op before consulting this table.
    pub fn can_advance_to(&self, target: RepairStatus) -> bool {
        use RepairStatus::{Cancelled, Completed, InProgress, Received, ReplacementRequested};
        matches!(
            (self, target),
            (Received, InProgress)
                | (InProgress, Completed)
                | (Received | InProgress, ReplacementRequested)
                | (Received | InProgress, Cancelled)
        )
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Received | Self::InProgress)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FaultType {
    Screen,
    ChargingPort,
    Flash,
    Speaker,
    Board,
    Other,
}

wire_enum!(FaultType, "fault type", {
    Screen => "screen",
    ChargingPort => "charging_port",
    Flash => "flash",
    Speaker => "speaker",
    Board => "board",
    Other => "other",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Repair {
    pub id: Uuid,
    pub device_id: Uuid,
    pub lab_id: Option<Uuid>,
    pub warranty_id: Option<Uuid>,
    pub fault_type: FaultType,
    pub fault_description: Option<String>,
    /// Catalog entry the lab classified the work as; prices the repair.
    pub repair_type_id: Option<Uuid>,
    pub status: RepairStatus,
    pub cost: Option<f64>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRepair {
    pub device_id: Uuid,
    pub lab_id: Option<Uuid>,
    pub warranty_id: Option<Uuid>,
    pub fault_type: FaultType,
    pub fault_description: Option<String>,
}

/// Status write for an existing repair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairStatusChange {
    pub status: RepairStatus,
    pub cost: Option<f64>,
    pub completed_at: Option<DateTime<Utc>>,
}
