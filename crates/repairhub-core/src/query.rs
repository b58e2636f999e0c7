//! Filter and pagination contract for role-scoped reads.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::device::WarrantyStatus;
use crate::models::profile::Role;
use crate::models::repair::RepairStatus;
use crate::models::replacement::RequestStatus;

/// Pagination parameters for list queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Pagination {
    pub const MAX_LIMIT: u64 = 200;

    /// 1-based page number to offset/limit, clamping the page size.
    pub fn page(page: u64, page_size: u64) -> Self {
        let limit = page_size.clamp(1, Self::MAX_LIMIT);
        Self {
            offset: page.saturating_sub(1) * limit,
            limit,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

impl<T> PaginatedResult<T> {
    /// Slice an already-filtered, already-ordered collection.
    pub fn from_vec(all: Vec<T>, pagination: Pagination) -> Self {
        let total = all.len() as u64;
        let items = all
            .into_iter()
            .skip(usize::try_from(pagination.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(pagination.limit).unwrap_or(usize::MAX))
            .collect();
        Self {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        }
    }
}

/// Row visibility applied to a read.
///
/// Admins see every row; store and lab callers see only rows they own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowScope {
    All,
    OwnedBy(Uuid),
}

impl RowScope {
    pub fn for_caller(caller_id: Uuid, role: Role) -> Self {
        match role {
            Role::Admin => Self::All,
            Role::Store | Role::Lab => Self::OwnedBy(caller_id),
        }
    }

    pub fn owner(&self) -> Option<Uuid> {
        match self {
            Self::All => None,
            Self::OwnedBy(id) => Some(*id),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceFilter {
    pub status: Option<WarrantyStatus>,
    /// Substring match on either IMEI.
    pub imei: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarrantyFilter {
    pub device_id: Option<Uuid>,
    pub active_only: bool,
    /// Substring match on customer name or phone.
    pub customer: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepairFilter {
    pub device_id: Option<Uuid>,
    pub status: Option<RepairStatus>,
    pub repair_type_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplacementFilter {
    pub device_id: Option<Uuid>,
    pub status: Option<RequestStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileFilter {
    pub role: Option<Role>,
    pub active: Option<bool>,
}
