//! Postgres store round-trip. Runs only when `DATABASE_URL` points at a
//! scratch database; otherwise it returns early.

use gregor_submission::domain::model::LookupTable;
use gregor_submission::storage::{RowWrite, StoreError};
use gregor_submission::{PgRecordStore, RecordStore, TableKind};
use serde_json::json;
use std::env;

async fn store() -> Option<PgRecordStore> {
    dotenv::dotenv().ok();
    let url = env::var("DATABASE_URL").ok()?;
    let store = PgRecordStore::connect(&url, 2).await.ok()?;
    sqlx::query("DELETE FROM submission_records WHERE record_id LIKE 'pgtest-%'")
        .execute(store.pool())
        .await
        .ok()?;
    sqlx::query("DELETE FROM lookup_entities WHERE natural_key LIKE 'pgtest-%'")
        .execute(store.pool())
        .await
        .ok()?;
    Some(store)
}

#[tokio::test]
async fn test_pg_records_lookups_and_constraints() -> Result<(), Box<dyn std::error::Error>> {
    let Some(store) = store().await else {
        println!("DATABASE_URL not set; skipping Postgres store test");
        return Ok(());
    };
    store.ping().await?;

    let participant = json!({"participant_id": "pgtest-P1"}).as_object().cloned().unwrap();
    let phenotype = json!({"phenotype_id": "pgtest-PH1", "participant_id": "pgtest-P1"})
        .as_object()
        .cloned()
        .unwrap();
    store
        .save_all(&[
            RowWrite::new(TableKind::Participant, "pgtest-P1", participant.clone()),
            RowWrite::new(TableKind::Phenotype, "pgtest-PH1", phenotype),
        ])
        .await?;
    assert_eq!(store.get(TableKind::Participant, "pgtest-P1").await?, Some(participant));

    let orphan = json!({"phenotype_id": "pgtest-PH2", "participant_id": "pgtest-P404"})
        .as_object()
        .cloned()
        .unwrap();
    match store
        .save_all(&[RowWrite::new(TableKind::Phenotype, "pgtest-PH2", orphan)])
        .await
    {
        Err(StoreError::Constraint(errors)) => assert_eq!(errors[0].field, "Participant_Id"),
        other => panic!("expected constraint failure, got {other:?}"),
    }
    assert!(store.get(TableKind::Phenotype, "pgtest-PH2").await?.is_none());

    for _ in 0..2 {
        store.get_or_create_lookup(LookupTable::TwinId, "pgtest-T1").await?;
    }
    let twins: Vec<String> = store
        .lookup_keys(LookupTable::TwinId)
        .await?
        .into_iter()
        .filter(|k| k.starts_with("pgtest-"))
        .collect();
    assert_eq!(twins, vec!["pgtest-T1"]);

    let analyte = json!({"analyte_id": "pgtest-A1", "participant_id": "pgtest-P1"})
        .as_object()
        .cloned()
        .unwrap();
    store
        .save_all(&[RowWrite::new(TableKind::Analyte, "pgtest-A1", analyte)])
        .await?;

    // The participant takes its phenotype and analyte with it.
    let deleted = store
        .delete_all(&[(TableKind::Participant, "pgtest-P1".to_string())])
        .await?;
    assert_eq!(deleted, 3);
    assert!(store.get(TableKind::Phenotype, "pgtest-PH1").await?.is_none());
    assert!(store.get(TableKind::Analyte, "pgtest-A1").await?.is_none());
    Ok(())
}
