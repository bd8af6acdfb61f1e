//! Failure injection tests for the resilience layer.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use grc_resilience::config::parse_config;
use grc_resilience::error::{ConcurrentModificationError, OperationError, ResilienceError};
use grc_resilience::resilience::CircuitState;
use grc_resilience::transactions::{SagaError, SagaState};
use grc_resilience::ResilienceContext;

mod common;

use common::{HttpCallError, MemoryStore, VersionedTable};

fn context(raw: &str) -> ResilienceContext {
    ResilienceContext::new(parse_config(raw).unwrap())
}

#[tokio::test]
async fn test_http_dependency_recovers_after_503s() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let addr = common::start_programmable_backend(move || {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                (503, "Service Unavailable".into())
            } else {
                (200, "ok".into())
            }
        }
    })
    .await;

    let context = context(
        r#"
        [retry]
        max_attempts = 3
        initial_delay_ms = 10
        max_delay_ms = 50
        "#,
    );
    let client = common::http_client();
    let url = format!("http://{addr}/controls");

    let status = context
        .executor("controls_api")
        .execute(|| async {
            let response = client.get(&url).send().await?.error_for_status()?;
            Ok::<_, HttpCallError>(response.status().as_u16())
        })
        .await
        .expect("should succeed after retries");

    assert_eq!(status, 200);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let stats = context.executor("controls_api").stats();
    assert_eq!(stats.state, CircuitState::Closed);
    assert_eq!(stats.failure_count, 0);
}

#[tokio::test]
async fn test_breaker_isolates_failing_http_dependency() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let addr = common::start_programmable_backend(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            (500, "boom".into())
        }
    })
    .await;

    let context = context(
        r#"
        [circuit_breaker.overrides.evidence_api]
        failure_threshold = 3
        open_duration_ms = 60000
        "#,
    );
    let client = common::http_client();
    let url = format!("http://{addr}/evidence");
    let executor = context.executor("evidence_api");

    for _ in 0..3 {
        let result = executor
            .execute(|| async {
                client.get(&url).send().await?.error_for_status()?;
                Ok::<_, HttpCallError>(())
            })
            .await;
        assert!(matches!(result, Err(HttpCallError::Http(_))));
    }
    assert_eq!(executor.stats().state, CircuitState::Open);

    let result = executor
        .execute(|| async {
            client.get(&url).send().await?.error_for_status()?;
            Ok::<_, HttpCallError>(())
        })
        .await;

    assert!(matches!(result, Err(HttpCallError::CircuitOpen(_))));
    // 500 is not transient: one request per call, none once open.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // Other dependencies are unaffected.
    assert_eq!(context.executor("ledger").stats().state, CircuitState::Closed);
}

#[tokio::test]
async fn test_saga_rolls_back_provisioning() {
    let context = ResilienceContext::new(Default::default());
    let created = Arc::new(Mutex::new(Vec::<String>::new()));

    let (c1, u1) = (created.clone(), created.clone());
    let (c2, u2) = (created.clone(), created.clone());
    let u3 = created.clone();
    let mut saga = context
        .saga::<String, OperationError>("provision_tenant")
        .add_step(
            "create_tenant",
            move || async move {
                c1.lock().unwrap().push("tenant".into());
                Ok("tenant-1".to_string())
            },
            move || async move {
                u1.lock().unwrap().retain(|r| r != "tenant");
                Ok(())
            },
        )
        .add_step(
            "create_policy_set",
            move || async move {
                c2.lock().unwrap().push("policies".into());
                Ok("policies-1".to_string())
            },
            move || async move {
                u2.lock().unwrap().retain(|r| r != "policies");
                Ok(())
            },
        )
        .add_step(
            "notify_auditor",
            || async { Err(OperationError::with_code("503", "mail relay unavailable")) },
            move || async move {
                u3.lock().unwrap().push("notification recalled".into());
                Ok(())
            },
        );

    let err = saga.run().await.unwrap_err();

    match err {
        SagaError::StepFailed { step, source } => {
            assert_eq!(step, "notify_auditor");
            assert_eq!(source.message, "mail relay unavailable");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(saga.state(), SagaState::Compensated);
    assert_eq!(saga.executed_count(), 2);
    assert!(created.lock().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_idempotent_assessment_creation_under_concurrency() {
    let context = ResilienceContext::new(Default::default());
    let inserts = Arc::new(AtomicU32::new(0));
    let mut handles = Vec::new();

    for _ in 0..10 {
        let context = context.clone();
        let inserts = inserts.clone();
        handles.push(tokio::spawn(async move {
            context
                .idempotency()
                .execute("create-assessment:req-77", || async move {
                    let id = inserts.fetch_add(1, Ordering::SeqCst) + 1;
                    tokio::time::sleep(Duration::from_millis(25)).await;
                    Ok::<_, ResilienceError>(serde_json::json!({ "assessment_id": id }))
                })
                .await
        }));
    }

    for handle in handles {
        let value = handle.await.unwrap().unwrap();
        assert_eq!(value, serde_json::json!({ "assessment_id": 1 }));
    }
    assert_eq!(inserts.load(Ordering::SeqCst), 1);
    assert_eq!(context.snapshot().idempotency_entries, 1);
}

#[tokio::test]
async fn test_batch_import_commits_in_chunks() {
    let context = ResilienceContext::new(Default::default());
    let store = Arc::new(MemoryStore::default());
    let mut processor = context.batch_processor(store.clone());

    for i in 0..250 {
        processor.add(move |tx: Option<&mut Vec<String>>| {
            Box::pin(async move {
                if let Some(tx) = tx {
                    tx.push(format!("finding-{i}"));
                }
                Ok::<(), OperationError>(())
            })
        });
    }

    let report = processor.execute(true).await.unwrap();

    assert_eq!(report.chunks, vec![100, 100, 50]);
    assert_eq!(store.transaction_sizes(), vec![100, 100, 50]);
    let rows = store.rows();
    assert_eq!(rows.first().map(String::as_str), Some("finding-0"));
    assert_eq!(rows.last().map(String::as_str), Some("finding-249"));
}

#[tokio::test]
async fn test_batch_failure_keeps_earlier_chunks() {
    let context = context("[batch]\nbatch_size = 10\n");
    let store = Arc::new(MemoryStore::default());
    let mut processor = context.batch_processor(store.clone());

    for i in 0..30 {
        processor.add(move |tx: Option<&mut Vec<String>>| {
            Box::pin(async move {
                if i == 15 {
                    return Err(OperationError::new("duplicate finding"));
                }
                if let Some(tx) = tx {
                    tx.push(format!("finding-{i}"));
                }
                Ok(())
            })
        });
    }

    let err = processor.execute(true).await.unwrap_err();

    assert_eq!(err.chunk_index, 1);
    assert_eq!((err.committed, err.discarded, err.pending), (10, 10, 10));
    assert_eq!(store.transaction_sizes(), vec![10]);
    assert_eq!(store.rollbacks.load(Ordering::SeqCst), 1);
    assert_eq!(processor.len(), 10);
}

#[tokio::test]
async fn test_batch_without_transaction_reports_applied_rows() {
    let context = context("[batch]\nbatch_size = 10\n");
    let store = Arc::new(MemoryStore::default());
    let applied = Arc::new(Mutex::new(Vec::<String>::new()));
    let mut processor = context.batch_processor(store.clone());

    for i in 0..5 {
        let applied = applied.clone();
        processor.add(move |_tx: Option<&mut Vec<String>>| {
            Box::pin(async move {
                if i == 3 {
                    return Err(OperationError::new("duplicate finding"));
                }
                applied.lock().unwrap().push(format!("finding-{i}"));
                Ok(())
            })
        });
    }

    let err = processor.execute(false).await.unwrap_err();

    assert_eq!((err.committed, err.discarded, err.pending), (3, 1, 1));
    assert_eq!(*applied.lock().unwrap(), vec!["finding-0", "finding-1", "finding-2"]);
    assert!(store.transaction_sizes().is_empty());
    assert_eq!(processor.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_optimistic_update_survives_competing_writers() {
    let context = ResilienceContext::new(Default::default());
    let table = VersionedTable::default();
    table.insert("ctrl-9", "draft");
    let competing_writes = AtomicU32::new(0);

    let updated = context
        .optimistic_lock()
        .execute(
            "ctrl-9",
            || async { table.read("ctrl-9").await.map_err(ResilienceError::from) },
            |current| {
                let table = &table;
                let competing_writes = &competing_writes;
                async move {
                    if competing_writes.fetch_add(1, Ordering::SeqCst) < 2 {
                        table.touch("ctrl-9");
                    }
                    table
                        .update(&current.id, current.version, "approved")
                        .await
                        .map_err(ResilienceError::from)
                }
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.status, "approved");
    assert_eq!(table.reads.load(Ordering::SeqCst), 3);
    assert_eq!(table.get("ctrl-9").map(|r| r.version), Some(4));
}

#[tokio::test(start_paused = true)]
async fn test_optimistic_update_gives_up_with_conflict_status() {
    let context = ResilienceContext::new(Default::default());
    let table = VersionedTable::default();
    table.insert("ctrl-1", "draft");

    let err = context
        .optimistic_lock()
        .execute(
            "ctrl-1",
            || async { table.read("ctrl-1").await.map_err(ResilienceError::from) },
            |current| {
                let table = &table;
                async move {
                    table.touch("ctrl-1");
                    table
                        .update(&current.id, current.version, "approved")
                        .await
                        .map_err(ResilienceError::from)
                }
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ResilienceError::ConcurrentModification(ConcurrentModificationError { attempts: 3 })
    ));
    assert_eq!(err.status_code(), 409);
}
