//! RepairHub Core: domain models, error taxonomy and the collaborator
//! traits shared by every other crate.

pub mod error;
pub mod models;
pub mod query;
pub mod repository;

pub use error::{ConflictKind, ErrorKind, ForbiddenReason, HubError, HubResult, UpstreamSystem};
