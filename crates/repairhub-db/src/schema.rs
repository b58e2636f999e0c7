//! Schema definitions and migration runner for SurrealDB.
//!
//! All tables are SCHEMAFULL. UUIDs are stored as strings; enums are
//! stored as their wire strings with ASSERT constraints mirroring the
//! closed Rust enums.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "identity_and_profile",
        sql: SCHEMA_V1,
    },
    Migration {
        version: 2,
        name: "lifecycle_tables",
        sql: SCHEMA_V2,
    },
    Migration {
        version: 3,
        name: "pricing_and_payments",
        sql: SCHEMA_V3,
    },
];

// -----------------------------------------------------------------------
// v1: identities (Directory) and profiles (ProfileStore)
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Identities (credential directory)
-- =======================================================================
DEFINE TABLE identity SCHEMAFULL;
DEFINE FIELD email ON TABLE identity TYPE string;
DEFINE FIELD password_hash ON TABLE identity TYPE string;
DEFINE FIELD credential_state ON TABLE identity TYPE string \
    ASSERT $value IN ['unconfirmed', 'confirmed'];
DEFINE FIELD metadata ON TABLE identity TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD created_at ON TABLE identity TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE identity TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_identity_email ON TABLE identity COLUMNS email UNIQUE;

-- =======================================================================
-- Profiles (keyed by identity id)
-- =======================================================================
DEFINE TABLE profile SCHEMAFULL;
DEFINE FIELD email ON TABLE profile TYPE string;
DEFINE FIELD full_name ON TABLE profile TYPE string;
DEFINE FIELD phone ON TABLE profile TYPE option<string>;
DEFINE FIELD role ON TABLE profile TYPE string \
    ASSERT $value IN ['admin', 'store', 'lab'];
DEFINE FIELD is_active ON TABLE profile TYPE bool DEFAULT true;
DEFINE FIELD created_at ON TABLE profile TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE profile TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_profile_role ON TABLE profile COLUMNS role;
";

// -----------------------------------------------------------------------
// v2: lifecycle tables and audit log
// -----------------------------------------------------------------------

const SCHEMA_V2: &str = "\
-- =======================================================================
-- Devices
-- =======================================================================
DEFINE TABLE device SCHEMAFULL;
DEFINE FIELD imei ON TABLE device TYPE string;
DEFINE FIELD imei2 ON TABLE device TYPE option<string>;
DEFINE FIELD model ON TABLE device TYPE string;
DEFINE FIELD warranty_status ON TABLE device TYPE string \
    ASSERT $value IN ['new', 'active', 'expired', 'replaced'];
DEFINE FIELD warranty_months ON TABLE device TYPE int;
DEFINE FIELD created_at ON TABLE device TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE device TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_device_imei ON TABLE device COLUMNS imei UNIQUE;
DEFINE INDEX idx_device_status ON TABLE device COLUMNS warranty_status;

-- =======================================================================
-- Warranties
-- =======================================================================
DEFINE TABLE warranty SCHEMAFULL;
DEFINE FIELD device_id ON TABLE warranty TYPE string;
DEFINE FIELD store_id ON TABLE warranty TYPE option<string>;
DEFINE FIELD customer_name ON TABLE warranty TYPE string;
DEFINE FIELD customer_phone ON TABLE warranty TYPE string;
DEFINE FIELD activation_date ON TABLE warranty TYPE datetime;
DEFINE FIELD expiry_date ON TABLE warranty TYPE datetime;
DEFINE FIELD is_active ON TABLE warranty TYPE bool DEFAULT true;
DEFINE FIELD notes ON TABLE warranty TYPE option<string>;
DEFINE FIELD created_at ON TABLE warranty TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE warranty TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_warranty_device ON TABLE warranty COLUMNS device_id;
DEFINE INDEX idx_warranty_store ON TABLE warranty COLUMNS store_id;

-- =======================================================================
-- Repairs
-- =======================================================================
DEFINE TABLE repair SCHEMAFULL;
DEFINE FIELD device_id ON TABLE repair TYPE string;
DEFINE FIELD lab_id ON TABLE repair TYPE option<string>;
DEFINE FIELD warranty_id ON TABLE repair TYPE option<string>;
DEFINE FIELD fault_type ON TABLE repair TYPE string \
    ASSERT $value IN ['screen', 'charging_port', 'flash', 'speaker', \
    'board', 'other'];
DEFINE FIELD fault_description ON TABLE repair TYPE option<string>;
DEFINE FIELD status ON TABLE repair TYPE string \
    ASSERT $value IN ['received', 'in_progress', 'completed', \
    'replacement_requested', 'cancelled'];
DEFINE FIELD cost ON TABLE repair TYPE option<float>;
DEFINE FIELD completed_at ON TABLE repair TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE repair TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE repair TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_repair_device ON TABLE repair COLUMNS device_id;
DEFINE INDEX idx_repair_lab ON TABLE repair COLUMNS lab_id;

-- =======================================================================
-- Replacement requests
-- =======================================================================
DEFINE TABLE replacement_request SCHEMAFULL;
DEFINE FIELD device_id ON TABLE replacement_request TYPE string;
DEFINE FIELD repair_id ON TABLE replacement_request TYPE option<string>;
DEFINE FIELD warranty_id ON TABLE replacement_request \
    TYPE option<string>;
DEFINE FIELD requester_id ON TABLE replacement_request TYPE string;
DEFINE FIELD reason ON TABLE replacement_request TYPE string;
DEFINE FIELD status ON TABLE replacement_request TYPE string \
    ASSERT $value IN ['pending', 'approved', 'rejected'];
DEFINE FIELD admin_notes ON TABLE replacement_request \
    TYPE option<string>;
DEFINE FIELD resolved_by ON TABLE replacement_request \
    TYPE option<string>;
DEFINE FIELD resolved_at ON TABLE replacement_request \
    TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE replacement_request TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE replacement_request TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_replacement_repair ON TABLE replacement_request \
    COLUMNS repair_id;
DEFINE INDEX idx_replacement_requester ON TABLE replacement_request \
    COLUMNS requester_id;

-- =======================================================================
-- Audit Log (append-only)
-- =======================================================================
DEFINE TABLE audit_log SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD actor_id ON TABLE audit_log TYPE string;
DEFINE FIELD action ON TABLE audit_log TYPE string;
DEFINE FIELD entity_type ON TABLE audit_log TYPE string;
DEFINE FIELD entity_id ON TABLE audit_log TYPE string;
DEFINE FIELD metadata ON TABLE audit_log TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD timestamp ON TABLE audit_log TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_audit_entity ON TABLE audit_log \
    COLUMNS entity_type, entity_id;
";

// -----------------------------------------------------------------------
// v3: repair-type catalog, lab prices and lab payments
// -----------------------------------------------------------------------

const SCHEMA_V3: &str = "\
-- =======================================================================
-- Repair types
-- =======================================================================
DEFINE TABLE repair_type SCHEMAFULL;
DEFINE FIELD name ON TABLE repair_type TYPE string;
DEFINE FIELD description ON TABLE repair_type TYPE option<string>;
DEFINE FIELD is_active ON TABLE repair_type TYPE bool DEFAULT true;
DEFINE FIELD created_at ON TABLE repair_type TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE repair_type TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_repair_type_name ON TABLE repair_type COLUMNS name UNIQUE;

DEFINE FIELD repair_type_id ON TABLE repair TYPE option<string>;
DEFINE INDEX idx_repair_type ON TABLE repair COLUMNS repair_type_id;

-- =======================================================================
-- Lab repair prices (one per lab and repair type)
-- =======================================================================
DEFINE TABLE lab_repair_price SCHEMAFULL;
DEFINE FIELD lab_id ON TABLE lab_repair_price TYPE string;
DEFINE FIELD repair_type_id ON TABLE lab_repair_price TYPE string;
DEFINE FIELD price ON TABLE lab_repair_price TYPE float \
    ASSERT $value >= 0;
DEFINE FIELD is_active ON TABLE lab_repair_price TYPE bool DEFAULT true;
DEFINE FIELD notes ON TABLE lab_repair_price TYPE option<string>;
DEFINE FIELD created_at ON TABLE lab_repair_price TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE lab_repair_price TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_lab_price_pair ON TABLE lab_repair_price \
    COLUMNS lab_id, repair_type_id UNIQUE;

-- =======================================================================
-- Lab payments (append-only)
-- =======================================================================
DEFINE TABLE lab_payment SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD lab_id ON TABLE lab_payment TYPE string;
DEFINE FIELD amount ON TABLE lab_payment TYPE float ASSERT $value > 0;
DEFINE FIELD payment_date ON TABLE lab_payment TYPE datetime;
DEFINE FIELD reference ON TABLE lab_payment TYPE option<string>;
DEFINE FIELD notes ON TABLE lab_payment TYPE option<string>;
DEFINE FIELD created_by ON TABLE lab_payment TYPE string;
DEFINE FIELD created_at ON TABLE lab_payment TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_lab_payment_lab ON TABLE lab_payment COLUMNS lab_id;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Apply every migration newer than the highest recorded version.
///
/// The `_migration` tracking table is created on first run.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS
        .iter()
        .filter(|m| m.version > current_version)
    {
        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        db.query(migration.sql).await?.check().map_err(|e| {
            DbError::Migration(format!(
                "v{} '{}' failed: {e}",
                migration.version, migration.name,
            ))
        })?;

        db.query("CREATE _migration SET version = $version, name = $name")
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "failed to record v{}: {e}",
                    migration.version,
                ))
            })?;
    }

    Ok(())
}

/// Returns the identity/profile DDL.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }

    #[test]
    fn enum_assertions_cover_every_variant() {
        use repairhub_core::models::{
            device::WarrantyStatus, profile::Role, repair::FaultType, repair::RepairStatus,
            replacement::RequestStatus,
        };
        let ddl = format!("{SCHEMA_V1}{SCHEMA_V2}");
        let wires = Role::ALL
            .iter()
            .map(Role::as_str)
            .chain(WarrantyStatus::ALL.iter().map(WarrantyStatus::as_str))
            .chain(RepairStatus::ALL.iter().map(RepairStatus::as_str))
            .chain(FaultType::ALL.iter().map(FaultType::as_str))
            .chain(RequestStatus::ALL.iter().map(RequestStatus::as_str));
        for wire in wires {
            assert!(ddl.contains(&format!("'{wire}'")), "missing '{wire}'");
        }
    }
}
