use std::env;

use anyhow::Result;
use erpsync_core::db::PgWarehouse;
use erpsync_core::schema::PEOPLE;
use erpsync_core::sink::{ReplaceBatch, ReplaceScope, SinkCause, UpsertBatch, Warehouse};
use erpsync_core::types::Record;

fn person(document: &str, name: &str) -> Record {
    Record::new()
        .with("document_number", document)
        .with("full_name", name)
}

fn by_id(mut rows: Vec<Record>) -> Vec<Record> {
    rows.sort_by_key(|row| row.int("id_person"));
    rows
}

async fn warehouse() -> Result<Option<PgWarehouse>> {
    let database_url = match env::var("ERPSYNC_TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping Postgres sink test because ERPSYNC_TEST_DATABASE_URL is not set");
            return Ok(None);
        }
    };

    let warehouse = PgWarehouse::connect(&database_url).await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS dim_people (
            id_person BIGSERIAL PRIMARY KEY,
            document_number TEXT NOT NULL UNIQUE,
            full_name TEXT
        )",
    )
    .execute(warehouse.pool())
    .await?;
    Ok(Some(warehouse))
}

async fn truncate(warehouse: &PgWarehouse) -> Result<()> {
    sqlx::query("TRUNCATE TABLE dim_people RESTART IDENTITY")
        .execute(warehouse.pool())
        .await?;
    Ok(())
}

// One test so the steps never race on the shared table.
#[tokio::test]
async fn postgres_sink_batches() -> Result<()> {
    let Some(warehouse) = warehouse().await? else {
        return Ok(());
    };

    truncate(&warehouse).await?;
    merge_upsert_is_idempotent_and_keeps_surrogates(&warehouse).await?;
    truncate(&warehouse).await?;
    a_failed_replace_rolls_back_its_delete(&warehouse).await?;

    warehouse.close().await;
    Ok(())
}

async fn merge_upsert_is_idempotent_and_keeps_surrogates(warehouse: &PgWarehouse) -> Result<()> {
    let batch = UpsertBatch::new(
        &PEOPLE,
        "people",
        vec![person("1010", "Ana"), person("2020", "Luis")],
        1,
    );
    let first = warehouse.merge_upsert(&batch).await?;
    assert_eq!(first.inserted, 2);

    let before = by_id(warehouse.snapshot(&PEOPLE).await?);
    let second = warehouse.merge_upsert(&batch).await?;
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 2);

    let after = by_id(warehouse.snapshot(&PEOPLE).await?);
    assert_eq!(before, after);

    let renamed = UpsertBatch::new(&PEOPLE, "people", vec![person("1010", "Ana Gomez")], 10);
    warehouse.merge_upsert(&renamed).await?;
    let rows = warehouse.snapshot(&PEOPLE).await?;
    let ana = rows
        .iter()
        .find(|row| row.text("document_number").as_deref() == Some("1010"))
        .unwrap();
    assert_eq!(ana.text("full_name").as_deref(), Some("Ana Gomez"));
    assert_eq!(ana.int("id_person"), Some(1));
    Ok(())
}

async fn a_failed_replace_rolls_back_its_delete(warehouse: &PgWarehouse) -> Result<()> {
    warehouse
        .merge_upsert(&UpsertBatch::new(&PEOPLE, "seed", vec![person("1010", "Ana")], 10))
        .await?;

    // The repeated document violates the unique constraint after the delete.
    let batch = ReplaceBatch::new(
        &PEOPLE,
        "people:replace",
        ReplaceScope::entire_table(),
        vec![person("3030", "Eva"), person("3030", "Eva")],
        10,
    );
    let failure = warehouse.replace(&batch).await.unwrap_err();
    assert_eq!(failure.batch.table, "dim_people");
    assert_eq!(failure.batch.label, "people:replace");
    assert_eq!(failure.batch.rows, 2);
    assert!(matches!(failure.cause, SinkCause::Database(_)));

    let rows = warehouse.snapshot(&PEOPLE).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].text("document_number").as_deref(), Some("1010"));
    Ok(())
}
