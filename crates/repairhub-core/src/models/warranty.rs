//! Warranty domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{HubError, HubResult};

/// End customer named on a warranty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Customer {
    pub name: String,
    pub phone: String,
}

impl Customer {
    pub fn validate(&self) -> HubResult<()> {
        if self.name.trim().is_empty() {
            return Err(HubError::validation("customer name is required"));
        }
        if self.phone.trim().is_empty() {
            return Err(HubError::validation("customer phone is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Warranty {
    pub id: Uuid,
    pub device_id: Uuid,
    pub store_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_phone: String,
    pub activation_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    /// At most one warranty per device is active at a time.
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Warranty {
    pub fn has_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date <= now
    }
}

/// Atomic activation write: inserts the warranty and moves the device
/// from `new` to `active` in one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateWarranty {
    pub device_id: Uuid,
    pub store_id: Option<Uuid>,
    pub customer: Customer,
    pub activation_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub notes: Option<String>,
}
