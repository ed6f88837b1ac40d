//! End-to-end smoke tests against a live PostgreSQL database.
//!
//! Run with `--features db-tests` and `VERITY_DB_*` pointing at a scratch
//! database.

use verity_api::{ApiResult, DbClient, DbConfig};
use verity_core::*;
use verity_test_utils::*;

fn test_db() -> ApiResult<DbClient> {
    let config = DbConfig::from_env();
    DbClient::from_config(&config)
}

fn unique_number(tag: &str) -> String {
    format!("SMOKE-{}-{}", tag, uuid::Uuid::now_v7().simple())
}

#[tokio::test]
#[cfg(feature = "db-tests")]
async fn smoke_test_diploma_lifecycle() -> ApiResult<()> {
    let db = test_db()?;
    db.run_migrations().await?;

    let number = unique_number("life");
    let record = fixtures::sample_record(&number, &format!("VB-{}", uuid::Uuid::now_v7().simple()));
    db.diploma_insert(&record).await?;

    assert!(db.diploma_document_number_exists(&number).await?);
    let found = db.diploma_find_by_number(&number).await?;
    assert_eq!(found.map(|r| r.id), Some(record.id));

    let combo = ComboQuery {
        student_code: record.fields.student_code.clone(),
        full_name: Some(record.fields.full_name.to_uppercase()),
        birth_date: None,
    };
    assert!(db.diploma_find_by_combo(&combo).await?.is_some());

    db.diploma_soft_delete(record.id, "smoke", chrono::Utc::now())
        .await?;
    assert!(db.diploma_find_by_number(&number).await?.is_none());
    // Soft-deleted numbers stay reserved.
    assert!(db.diploma_document_number_exists(&number).await?);

    Ok(())
}

#[tokio::test]
#[cfg(feature = "db-tests")]
async fn smoke_test_search_log_window() -> ApiResult<()> {
    let db = test_db()?;
    db.run_migrations().await?;

    let client = format!("198.51.100.{}", uuid::Uuid::now_v7().as_u128() % 250);
    let before = chrono::Utc::now() - chrono::Duration::seconds(1);
    let baseline = db.search_log_count_since(&client, before).await?;

    let entry = SearchLogEntry::new(client.clone(), chrono::Utc::now())
        .with_document_number(Some("SMOKE-LOG"));
    db.search_log_append(&entry).await?;

    assert_eq!(db.search_log_count_since(&client, before).await?, baseline + 1);
    db.ping().await?;
    Ok(())
}
