//! Payments to labs and the balance derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{HubError, HubResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabPayment {
    pub id: Uuid,
    pub lab_id: Uuid,
    pub amount: f64,
    pub payment_date: DateTime<Utc>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLabPayment {
    pub lab_id: Uuid,
    pub amount: f64,
    pub payment_date: DateTime<Utc>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_by: Uuid,
}

impl CreateLabPayment {
    pub fn validate(&self) -> HubResult<()> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(HubError::validation("payment amount must be positive"));
        }
        Ok(())
    }
}

/// Sum and count of a set of money rows.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct LabTotals {
    pub total: f64,
    pub count: u64,
}

/// What a lab has earned from completed repairs against what it has
/// been paid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabBalance {
    pub lab_id: Uuid,
    pub lab_name: String,
    pub lab_email: String,
    pub total_earned: f64,
    pub total_paid: f64,
    /// `total_earned - total_paid`; positive means the lab is owed money.
    pub balance: f64,
    pub repairs_count: u64,
    pub payments_count: u64,
}

impl LabBalance {
    pub fn new(
        lab_id: Uuid,
        lab_name: String,
        lab_email: String,
        earned: LabTotals,
        paid: LabTotals,
    ) -> Self {
        Self {
            lab_id,
            lab_name,
            lab_email,
            total_earned: earned.total,
            total_paid: paid.total,
            balance: earned.total - paid.total,
            repairs_count: earned.count,
            payments_count: paid.count,
        }
    }
}
