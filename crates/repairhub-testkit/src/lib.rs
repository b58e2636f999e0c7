//! RepairHub Testkit: in-memory implementations of every collaborator
//! trait, for exercising the auth and lifecycle layers without a database.
//!
//! Each fake is a cheap `Clone` handle over shared state so a test can
//! hand one copy to the code under test and keep another for inspection.
//! [`Faults`] lets a test make any named operation fail with an upstream
//! error, once or until cleared; every fake counts its calls.

mod audit;
mod directory;
mod faults;
pub mod keys;
mod lifecycle;
mod profiles;

pub use audit::FakeAuditLog;
pub use directory::FakeDirectory;
pub use faults::{CallLog, Faults};
pub use lifecycle::InMemoryLifecycle;
pub use profiles::FakeProfileStore;
