mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::http::StatusCode;
use casefile::audit::{AuditScheduler, IntegrityAuditor, IntegrityLog};
use casefile::config::AuditConfig;
use casefile::models::DocumentStatus;
use casefile::storage::ObjectStorage;
use casefile::store::DocumentStore;
use common::{body_json, log_lines, TestApp};
use serde_json::{json, Value};

fn doc_ids(records: &[Value]) -> Vec<String> {
    records
        .iter()
        .map(|record| record["doc_id"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn batches_visit_least_recently_audited_first() -> Result<()> {
    let app = TestApp::with_env(&[("INTEGRITY_BATCH", "2")]).await?;
    let mut ids = Vec::new();
    for title in ["First", "Second", "Third"] {
        let body = app.register_text("M-1", title, title).await?;
        ids.push(body["doc_id"].as_str().unwrap().to_string());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let first = app.state.auditor.run_batch().await?;
    assert_eq!(first.checked, 2);
    let after_first = log_lines(&app.integrity_log()).await;
    assert_eq!(doc_ids(&after_first).len(), 2);
    assert!(!doc_ids(&after_first).contains(&ids[2]));

    let second = app.state.auditor.run_batch().await?;
    assert_eq!(second.checked, 2);
    assert_eq!(second.mismatched, 0);
    let after_second = log_lines(&app.integrity_log()).await;
    let second_batch = doc_ids(&after_second[2..]);
    assert!(second_batch.contains(&ids[2]), "never-audited document goes first");
    Ok(())
}

#[tokio::test]
async fn allow_list_skips_drafts_and_archive_by_default() -> Result<()> {
    let app = TestApp::new().await?;
    let kept = app.register_text("M-1", "Kept", "kept").await?;
    let archived = app.register_text("M-1", "Archived", "old").await?;
    let archived_id = archived["doc_id"].as_str().unwrap();
    app.patch_json(
        &format!("/api/docs/{archived_id}"),
        &json!({ "status": "archive" }),
    )
    .await?;
    let draft = app
        .register(
            &[
                ("matter_id", "M-1"),
                ("class", "intake"),
                ("title", "Draft"),
                ("origin", "intake"),
            ],
            "draft.txt",
            "text/plain",
            b"draft",
        )
        .await?;
    assert_eq!(draft.status(), StatusCode::CREATED);

    let summary = app.state.auditor.run_batch().await?;
    assert_eq!(summary.checked, 1);
    let records = log_lines(&app.integrity_log()).await;
    assert_eq!(doc_ids(&records), vec![kept["doc_id"].as_str().unwrap().to_string()]);
    Ok(())
}

#[tokio::test]
async fn archive_can_be_opted_into_the_audit() -> Result<()> {
    let app = TestApp::with_env(&[("INTEGRITY_INCLUDE_STATUSES", "archive")]).await?;
    let body = app.register_text("M-1", "Old", "old").await?;
    let doc_id = body["doc_id"].as_str().unwrap();
    app.patch_json(&format!("/api/docs/{doc_id}"), &json!({ "status": "archive" }))
        .await?;

    let summary = app.state.auditor.run_batch().await?;
    assert_eq!(summary.checked, 1);
    let records = log_lines(&app.integrity_log()).await;
    assert_eq!(records[0]["status"], "archive");
    Ok(())
}

#[tokio::test]
async fn missing_object_is_recorded_not_fatal() -> Result<()> {
    let app = TestApp::new().await?;
    let gone = app.register_text("M-1", "Gone", "gone").await?;
    let fine = app.register_text("M-1", "Fine", "fine").await?;
    app.storage()
        .remove(gone["storage_ref"].as_str().unwrap())
        .await;

    let summary = app.state.auditor.run_batch().await?;
    assert_eq!(summary.checked, 2);
    assert_eq!(summary.mismatched, 1);
    assert_eq!(summary.errored, 1);

    let records = log_lines(&app.integrity_log()).await;
    let gone_record = records
        .iter()
        .find(|record| record["doc_id"] == gone["doc_id"])
        .unwrap();
    assert_eq!(gone_record["match"], false);
    assert!(gone_record["sha256_current"].is_null());
    assert!(gone_record["error"].is_string());
    let fine_record = records
        .iter()
        .find(|record| record["doc_id"] == fine["doc_id"])
        .unwrap();
    assert_eq!(fine_record["match"], true);
    Ok(())
}

#[tokio::test]
async fn report_lists_latest_record_per_document() -> Result<()> {
    let app = TestApp::new().await?;
    let one = app.register_text("M-1", "One", "one").await?;
    let two = app.register_text("M-2", "Two", "two").await?;
    let one_id = one["doc_id"].as_str().unwrap();
    let two_id = two["doc_id"].as_str().unwrap();

    app.state.auditor.run_batch().await?;
    app.storage()
        .tamper(one["storage_ref"].as_str().unwrap(), b"changed")
        .await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    app.state.auditor.run_batch().await?;
    assert_eq!(log_lines(&app.integrity_log()).await.len(), 4);

    let response = app.get("/api/reports/integrity", &[]).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response.into_body()).await?;
    let report = report.as_array().unwrap();
    assert_eq!(report.len(), 2);
    let latest_one = report.iter().find(|r| r["doc_id"] == one_id).unwrap();
    assert_eq!(latest_one["match"], false);

    let failed = body_json(
        app.get("/api/reports/integrity?only_failed=true", &[])
            .await?
            .into_body(),
    )
    .await?;
    assert_eq!(doc_ids(failed.as_array().unwrap()), vec![one_id.to_string()]);

    let by_matter = body_json(
        app.get("/api/reports/integrity?matter_id=M-2&limit=10", &[])
            .await?
            .into_body(),
    )
    .await?;
    assert_eq!(doc_ids(by_matter.as_array().unwrap()), vec![two_id.to_string()]);

    let limited = body_json(
        app.get("/api/reports/integrity?limit=1", &[])
            .await?
            .into_body(),
    )
    .await?;
    assert_eq!(limited.as_array().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn scheduler_ticks_until_shut_down() -> Result<()> {
    let app = TestApp::new().await?;
    app.register_text("M-1", "Ticked", "tick").await?;

    let store: Arc<dyn DocumentStore> = app.store();
    let storage: Arc<dyn ObjectStorage> = app.storage();
    let log_path = app.integrity_log();
    let auditor = Arc::new(IntegrityAuditor::new(
        store,
        storage,
        Arc::new(IntegrityLog::new(log_path.clone())),
        AuditConfig {
            interval: Duration::from_millis(40),
            statuses: vec![DocumentStatus::Registered],
            ..AuditConfig::default()
        },
        Duration::from_secs(5),
    ));

    let handle = AuditScheduler::start(auditor);
    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.shutdown().await;

    let ticks = log_lines(&log_path).await.len();
    assert!(ticks >= 2, "expected repeated ticks, saw {ticks}");
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(log_lines(&log_path).await.len(), ticks);
    Ok(())
}

#[tokio::test]
async fn unrecorded_checks_are_not_stamped() -> Result<()> {
    let app = TestApp::new().await?;
    let body = app.register_text("M-1", "Unlogged", "unlogged").await?;
    let doc_id = body["doc_id"].as_str().unwrap();

    // A directory cannot be opened for appending.
    let unwritable = app.integrity_log().parent().unwrap().to_path_buf();
    let store: Arc<dyn DocumentStore> = app.store();
    let storage: Arc<dyn ObjectStorage> = app.storage();
    let auditor = IntegrityAuditor::new(
        store,
        storage,
        Arc::new(IntegrityLog::new(unwritable)),
        AuditConfig {
            statuses: vec![DocumentStatus::Registered],
            ..AuditConfig::default()
        },
        Duration::from_secs(5),
    );

    let summary = auditor.run_batch().await?;
    assert_eq!(summary.checked, 1);
    let document = app.store().document(doc_id).await.unwrap();
    assert!(document.last_audited_at.is_none());

    app.state.auditor.run_batch().await?;
    let document = app.store().document(doc_id).await.unwrap();
    assert!(document.last_audited_at.is_some());
    Ok(())
}
