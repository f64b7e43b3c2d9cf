use anyhow::Result;
use campus_iam::store::{
    memory::{Fault, Operation},
    strip_system_fields, Collection, MemoryStore, PartitionPath, ResilientStore, StoreError,
    StoreOptions,
};
use serde_json::{json, Map, Value};
use std::{sync::Arc, time::Duration};

fn fixture() -> (Arc<MemoryStore>, ResilientStore) {
    let memory = Arc::new(MemoryStore::new());
    let store = ResilientStore::new(
        memory.clone(),
        StoreOptions::new().with_retry_delay(Duration::from_millis(1)),
    );
    (memory, store)
}

fn document(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("expected an object, got {other}"),
    }
}

#[tokio::test]
async fn lost_ack_then_conflict_is_idempotent() -> Result<()> {
    let (memory, store) = fixture();
    let users = Collection::by_id("users");
    let doc = document(json!({
        "id": "user:ana@taxco",
        "username": "ana",
        "campus": "taxco",
        "failed_attempts": 0,
    }))?;

    let mut results = Vec::new();
    for _ in 0..2 {
        memory.inject(
            Operation::Upsert,
            Fault::ApplyThenFail(StoreError::Throttled),
        );
        memory.inject(Operation::Upsert, Fault::Fail(StoreError::Conflict));
        let mut stored = store.upsert(&users, doc.clone(), "user:ana@taxco").await?;
        strip_system_fields(&mut stored);
        results.push(stored);
    }

    assert_eq!(results[0], results[1]);
    assert_eq!(results[0], doc);
    assert_eq!(memory.len("users"), 1);
    assert_eq!(memory.calls(Operation::Upsert), 4);
    Ok(())
}

#[tokio::test]
async fn second_throttle_is_surfaced() -> Result<()> {
    let (memory, store) = fixture();
    let users = Collection::by_id("users");
    memory.inject(Operation::Read, Fault::Fail(StoreError::Throttled));
    memory.inject(Operation::Read, Fault::Fail(StoreError::Throttled));

    let result = store.get_by_id(&users, "user:nobody@taxco").await;
    assert!(matches!(result, Err(StoreError::Throttled)));
    assert_eq!(memory.calls(Operation::Read), 2);
    Ok(())
}

#[tokio::test]
async fn partition_is_inferred_from_fallback_field() -> Result<()> {
    let (_memory, store) = fixture();
    let appointments = Collection::new("appointments", PartitionPath::Field("student_id".into()))
        .with_fallback_key("matricula");

    let stored = store
        .upsert_inferred(
            &appointments,
            document(json!({"matricula": "A-1024", "service": "dentistry"}))?,
        )
        .await?;

    assert_eq!(stored.get("student_id"), Some(&json!("A-1024")));
    let id = stored
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default();
    assert!(id.starts_with("appointment:"));

    let missing = store
        .upsert_inferred(&appointments, document(json!({"service": "dentistry"}))?)
        .await;
    assert!(matches!(missing, Err(StoreError::InvalidDocument(_))));
    Ok(())
}
