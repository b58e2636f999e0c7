//! Integration tests for schema initialization using in-memory SurrealDB.

use surrealdb::Surreal;
use surrealdb::engine::local::Mem;

#[tokio::test]
async fn schema_migration_applies_successfully() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    repairhub_db::run_migrations(&db).await.unwrap();

    let mut result = db.query("INFO FOR DB").await.unwrap();
    let info: Option<surrealdb_types::Value> = result.take(0).unwrap();
    let info = info.expect("INFO FOR DB should return a value");
    let info_str = format!("{:?}", info);

    for table in [
        "identity",
        "profile",
        "device",
        "warranty",
        "repair",
        "replacement_request",
        "audit_log",
        "repair_type",
        "lab_repair_price",
        "lab_payment",
        "_migration",
    ] {
        assert!(info_str.contains(table), "missing {table} table");
    }
}

#[tokio::test]
async fn migration_is_idempotent() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();

    repairhub_db::run_migrations(&db).await.unwrap();
    repairhub_db::run_migrations(&db).await.unwrap();

    let mut result = db.query("SELECT * FROM _migration").await.unwrap();
    let records: Vec<surrealdb_types::Value> = result.take(0).unwrap();
    assert_eq!(records.len(), 3, "expected one record per migration");
}

#[tokio::test]
async fn status_fields_reject_unknown_values() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    repairhub_db::run_migrations(&db).await.unwrap();

    let result = db
        .query(
            "CREATE device:bad SET imei = '490154203237518', model = 'X', \
             warranty_status = 'refurbished', warranty_months = 12",
        )
        .await
        .unwrap();
    assert!(result.check().is_err(), "unknown warranty_status accepted");

    let result = db
        .query(
            "CREATE profile:bad SET email = 'a@b.c', full_name = 'A', \
             role = 'superuser', is_active = true",
        )
        .await
        .unwrap();
    assert!(result.check().is_err(), "unknown role accepted");
}

#[tokio::test]
async fn money_fields_reject_negative_amounts() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    repairhub_db::run_migrations(&db).await.unwrap();

    let result = db
        .query(
            "CREATE lab_repair_price:bad SET lab_id = 'l', repair_type_id = 't', \
             price = -5.0, is_active = true",
        )
        .await
        .unwrap();
    assert!(result.check().is_err(), "negative price accepted");

    let result = db
        .query(
            "CREATE lab_payment:bad SET lab_id = 'l', amount = 0.0, \
             payment_date = time::now(), created_by = 'a'",
        )
        .await
        .unwrap();
    assert!(result.check().is_err(), "zero payment accepted");
}

#[test]
fn schema_v1_defines_identity_and_profile() {
    let ddl = repairhub_db::schema_v1();
    assert!(ddl.contains("DEFINE TABLE identity SCHEMAFULL"));
    assert!(ddl.contains("DEFINE TABLE profile SCHEMAFULL"));
    assert!(ddl.contains("idx_identity_email"));
}
