//! SurrealDB repository implementations.
//!
//! Row structs mirror the SCHEMAFULL tables. UUIDs and enum values are
//! stored as strings and parsed back on the way out; a value that fails
//! to parse surfaces as [`DbError::Decode`].

mod audit;
mod device;
mod directory;
mod payment;
mod pricing;
mod profile;
mod repair;
mod replacement;
mod warranty;

use std::fmt::Display;
use std::str::FromStr;

use repairhub_core::models::payment::LabTotals;
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

pub use audit::SurrealAuditLogRepository;
pub use device::SurrealDeviceRepository;
pub use directory::{SurrealDirectory, hash_password, verify_password};
pub use payment::SurrealLabPaymentRepository;
pub use pricing::{SurrealLabPriceRepository, SurrealRepairTypeRepository};
pub use profile::SurrealProfileStore;
pub use repair::SurrealRepairRepository;
pub use replacement::SurrealReplacementRepository;
pub use warranty::SurrealWarrantyRepository;

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// Row struct for `math::sum(..) AS total, count() AS count` aggregates.
#[derive(Debug, SurrealValue)]
struct SumRow {
    total: f64,
    count: u64,
}

impl SumRow {
    fn into_totals(self) -> LabTotals {
        LabTotals {
            total: self.total,
            count: self.count,
        }
    }
}

/// Row struct for `RETURN meta::id(id) AS record_id` projections.
#[derive(Debug, SurrealValue)]
struct IdRow {
    #[allow(dead_code)]
    record_id: String,
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::Decode(format!("invalid {field} UUID: {e}")))
}

fn parse_opt_uuid(field: &str, value: Option<String>) -> Result<Option<Uuid>, DbError> {
    value.map(|v| parse_uuid(field, &v)).transpose()
}

fn parse_wire<T>(value: &str) -> Result<T, DbError>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse().map_err(|e: T::Err| DbError::Decode(e.to_string()))
}

fn first_total(rows: Vec<CountRow>) -> u64 {
    rows.first().map(|r| r.total).unwrap_or(0)
}
