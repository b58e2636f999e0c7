//! Repair-type catalog and per-lab repair prices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{HubError, HubResult};

/// A kind of repair labs are paid for, e.g. "screen replacement".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepairType {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Inactive types stay on existing repairs but cannot be assigned.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRepairType {
    pub name: String,
    pub description: Option<String>,
}

impl CreateRepairType {
    pub fn validate(&self) -> HubResult<()> {
        validate_type_name(&self.name)
    }
}

/// Partial update. `description: Some(None)` clears the description.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRepairType {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub is_active: Option<bool>,
}

impl UpdateRepairType {
    pub fn validate(&self) -> HubResult<()> {
        match &self.name {
            Some(name) => validate_type_name(name),
            None => Ok(()),
        }
    }
}

fn validate_type_name(name: &str) -> HubResult<()> {
    if name.trim().is_empty() {
        return Err(HubError::validation("repair type name is required"));
    }
    Ok(())
}

/// What a lab is paid for one completed repair of a given type. At most
/// one row exists per (lab, repair type).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabRepairPrice {
    pub id: Uuid,
    pub lab_id: Uuid,
    pub repair_type_id: Uuid,
    pub price: f64,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert or overwrite the price on (`lab_id`, `repair_type_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLabRepairPrice {
    pub lab_id: Uuid,
    pub repair_type_id: Uuid,
    pub price: f64,
    pub is_active: bool,
    pub notes: Option<String>,
}

impl SetLabRepairPrice {
    pub fn validate(&self) -> HubResult<()> {
        validate_amount(self.price, "price")
    }
}

/// A money amount must be finite and non-negative.
pub fn validate_amount(amount: f64, what: &str) -> HubResult<()> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(HubError::validation(format!(
            "{what} must be a non-negative amount"
        )));
    }
    Ok(())
}
