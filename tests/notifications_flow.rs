mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use axum::http::StatusCode;
use casefile::notify::{ChannelError, NotificationChannel, NotificationEvent};
use common::{body_json, wait_for_lines, TestApp, TestOptions};
use serde_json::{json, Value};
use tokio::sync::Mutex;

#[derive(Clone, Copy)]
enum Behaviour {
    Deliver,
    Reject,
    Hang,
}

struct RecordingChannel {
    name: &'static str,
    behaviour: Behaviour,
    calls: AtomicUsize,
    seen: Mutex<Vec<NotificationEvent>>,
}

impl RecordingChannel {
    fn new(name: &'static str, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            name,
            behaviour,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send(&self, event: &NotificationEvent) -> Result<(), ChannelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().await.push(event.clone());
        match self.behaviour {
            Behaviour::Deliver => Ok(()),
            Behaviour::Reject => Err(ChannelError::Rejected {
                status: 403,
                body: "forbidden".into(),
            }),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            }
        }
    }
}

async fn app_with(channels: Vec<Arc<dyn NotificationChannel>>, timeout_secs: &str) -> Result<TestApp> {
    TestApp::with_options(TestOptions {
        env: vec![("CHANNEL_TIMEOUT_SECS", timeout_secs.to_string())],
        channels,
        ..TestOptions::default()
    })
    .await
}

fn events(lines: &[Value]) -> Vec<&str> {
    lines
        .iter()
        .filter_map(|line| line["event"].as_str())
        .collect()
}

#[tokio::test]
async fn failing_channel_does_not_block_the_other() -> Result<()> {
    let email = RecordingChannel::new("email", Behaviour::Deliver);
    let chat = RecordingChannel::new("chat", Behaviour::Reject);
    let app = app_with(
        vec![
            email.clone() as Arc<dyn NotificationChannel>,
            chat.clone() as Arc<dyn NotificationChannel>,
        ],
        "5",
    )
    .await?;

    let body = app.register_text("M-4", "Affidavit", "sworn").await?;
    let lines = wait_for_lines(&app.notification_log(), 3).await;

    let names = events(&lines);
    assert_eq!(names[0], "doc_registered", "event line precedes outcomes");
    assert!(names.contains(&"email_sent"));
    assert!(names.contains(&"chat_error"));
    let chat_line = lines.iter().find(|l| l["event"] == "chat_error").unwrap();
    assert_eq!(chat_line["doc_id"], body["doc_id"]);
    assert!(chat_line["error"].as_str().unwrap().contains("403"));

    let seen = email.seen.lock().await;
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0].subject(),
        format!("[casefile] Registered {}", body["doc_id"].as_str().unwrap())
    );
    Ok(())
}

#[tokio::test]
async fn hung_channel_does_not_delay_the_request() -> Result<()> {
    let chat = RecordingChannel::new("chat", Behaviour::Hang);
    let app = app_with(vec![chat.clone() as Arc<dyn NotificationChannel>], "1").await?;

    let started = Instant::now();
    let body = app.register_text("M-4", "Exhibit", "photo").await?;
    assert!(started.elapsed() < Duration::from_millis(900));
    assert!(body["doc_id"].is_string());

    let lines = wait_for_lines(&app.notification_log(), 2).await;
    assert_eq!(events(&lines), vec!["doc_registered", "chat_error"]);
    assert!(lines[1]["error"].as_str().unwrap().contains("timed out"));
    Ok(())
}

#[tokio::test]
async fn delivery_carries_the_message() -> Result<()> {
    let email = RecordingChannel::new("email", Behaviour::Deliver);
    let app = app_with(vec![email.clone() as Arc<dyn NotificationChannel>], "5").await?;
    let body = app.register_text("M-4", "Opinion", "result").await?;
    let doc_id = body["doc_id"].as_str().unwrap();
    wait_for_lines(&app.notification_log(), 2).await;

    let response = app
        .post_json(
            &format!("/api/docs/{doc_id}/deliver"),
            &json!({ "message": "Final opinion attached" }),
            &[],
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let delivered = body_json(response.into_body()).await?;
    assert_eq!(delivered["ok"], true);
    assert_eq!(
        delivered["permalink"],
        format!("https://id.example.test/doc/{doc_id}")
    );

    let lines = wait_for_lines(&app.notification_log(), 4).await;
    let event = lines
        .iter()
        .find(|l| l["event"] == "result_delivered")
        .unwrap();
    assert_eq!(event["message"], "Final opinion attached");
    assert!(events(&lines).iter().filter(|e| **e == "email_sent").count() == 2);

    let document = app.store().document(doc_id).await.unwrap();
    assert_eq!(document.status.as_str(), "registered");
    Ok(())
}

#[tokio::test]
async fn relocation_stays_out_of_channels() -> Result<()> {
    let email = RecordingChannel::new("email", Behaviour::Deliver);
    let app = app_with(vec![email.clone() as Arc<dyn NotificationChannel>], "5").await?;
    let body = app.register_text("M-4", "Memo", "memo").await?;
    let doc_id = body["doc_id"].as_str().unwrap();
    wait_for_lines(&app.notification_log(), 2).await;

    app.patch_json(
        &format!("/api/docs/{doc_id}"),
        &json!({ "storage": "glacier", "storage_ref": "vault/memo.txt" }),
    )
    .await?;

    let lines = wait_for_lines(&app.notification_log(), 3).await;
    assert_eq!(
        events(&lines),
        vec!["doc_registered", "email_sent", "storage_relocated"]
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(email.calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn without_channels_each_event_is_one_line() -> Result<()> {
    let app = TestApp::new().await?;
    let body = app.register_text("M-4", "Letter", "dear sir").await?;
    let doc_id = body["doc_id"].as_str().unwrap();
    let response = app
        .post_json(&format!("/api/docs/{doc_id}/deliver"), &json!({}), &[])
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let lines = common::log_lines(&app.notification_log()).await;
    assert_eq!(events(&lines), vec!["doc_registered", "result_delivered"]);
    assert!(lines[1].get("message").is_none());
    Ok(())
}
