//! Device domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::wire_enum;
use crate::error::{HubError, HubResult};

/// Warranty state of a device. Always derived from the device's
/// warranty / replacement rows; written only by lifecycle transitions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WarrantyStatus {
    New,
    Active,
    Expired,
    Replaced,
}

wire_enum!(WarrantyStatus, "warranty status", {
    New => "new",
    Active => "active",
    Expired => "expired",
    Replaced => "replaced",
});

impl WarrantyStatus {
    /// Whether a repair may be opened against a device in this state.
    pub fn accepts_repairs(&self) -> bool {
        matches!(self, Self::Active | Self::Expired)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub id: Uuid,
    pub imei: String,
    pub imei2: Option<String>,
    pub model: String,
    pub warranty_status: WarrantyStatus,
    pub warranty_months: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDevice {
    pub imei: String,
    pub imei2: Option<String>,
    pub model: String,
    pub warranty_months: u32,
}

impl CreateDevice {
    pub fn validate(&self) -> HubResult<()> {
        validate_imei(&self.imei)?;
        if let Some(imei2) = &self.imei2 {
            validate_imei(imei2)?;
            if imei2 == &self.imei {
                return Err(HubError::validation("imei2 must differ from imei"));
            }
        }
        if self.model.trim().is_empty() {
            return Err(HubError::validation("device model is required"));
        }
        if self.warranty_months == 0 {
            return Err(HubError::validation(
                "warranty_months must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Check that `imei` is 15 ASCII digits with a valid Luhn check digit.
pub fn validate_imei(imei: &str) -> HubResult<()> {
    if imei.len() != 15 || !imei.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HubError::validation(format!(
            "IMEI must be exactly 15 digits, got '{imei}'"
        )));
    }

    let sum: u32 = imei
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();

    if sum % 10 != 0 {
        return Err(HubError::validation(format!(
            "IMEI '{imei}' fails the Luhn check"
        )));
    }
    Ok(())
}
