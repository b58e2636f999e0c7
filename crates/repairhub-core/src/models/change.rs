//! Change-feed events emitted on every lifecycle mutation.

use serde::{Deserialize, Serialize};

use super::wire_enum;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleTable {
    Devices,
    Warranties,
    Repairs,
    ReplacementRequests,
    RepairTypes,
    LabRepairPrices,
    LabPayments,
}

wire_enum!(LifecycleTable, "table", {
    Devices => "devices",
    Warranties => "warranties",
    Repairs => "repairs",
    ReplacementRequests => "replacement_requests",
    RepairTypes => "repair_types",
    LabRepairPrices => "lab_repair_prices",
    LabPayments => "lab_payments",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChangeEvent {
    pub table: LifecycleTable,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn insert(table: LifecycleTable) -> Self {
        Self {
            table,
            kind: ChangeKind::Insert,
        }
    }

    pub fn update(table: LifecycleTable) -> Self {
        Self {
            table,
            kind: ChangeKind::Update,
        }
    }
}
