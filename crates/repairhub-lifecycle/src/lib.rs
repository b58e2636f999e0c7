//! RepairHub Lifecycle: the state machines governing devices,
//! warranties, repairs and replacement requests, the lab ledger of
//! repair prices and payments, the role-scoped read gateway, and the
//! change feed that dashboards subscribe to.

pub mod config;
pub mod engine;
pub mod feed;
pub mod ledger;
pub mod query;
pub mod stores;

pub use config::LifecycleConfig;
pub use engine::{
    ActivateWarrantyInput, LifecycleEngine, OpenRepairInput, ReplacementOutcome, SYSTEM_ACTOR,
};
pub use feed::{ChangeFeed, DebounceTimer, DebouncedSubscription, Refresh};
pub use ledger::{LabLedger, RecordPaymentInput};
pub use query::QueryGateway;
pub use stores::{LifecycleStores, SharedStores, Stores};
