use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::Client;
use serde_json::json;
use uuid::Uuid;

use super::{ChannelError, NotificationChannel, NotificationEvent};
use crate::config::MatrixConfig;

pub struct MatrixChannel {
    client: Client,
    homeserver: String,
    access_token: String,
    room_id: String,
}

impl MatrixChannel {
    pub fn new(config: &MatrixConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build chat HTTP client")?;
        Ok(Self {
            client,
            homeserver: config.homeserver.clone(),
            access_token: config.access_token.clone(),
            room_id: config.room_id.clone(),
        })
    }

    fn send_url(&self) -> String {
        format!(
            "{}/_matrix/client/v3/rooms/{}/send/m.room.message/{}",
            self.homeserver,
            utf8_percent_encode(&self.room_id, NON_ALPHANUMERIC),
            Uuid::new_v4().simple()
        )
    }
}

#[async_trait]
impl NotificationChannel for MatrixChannel {
    fn name(&self) -> &'static str {
        "chat"
    }

    async fn send(&self, event: &NotificationEvent) -> Result<(), ChannelError> {
        let payload = json!({
            "msgtype": "m.text",
            "body": event.plain_text(),
            "format": "org.matrix.custom.html",
            "formatted_body": render_html(event),
        });

        let response = self
            .client
            .put(self.send_url())
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ChannelError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ChannelError::Rejected {
            status: status.as_u16(),
            body: body.chars().take(300).collect(),
        })
    }
}

fn render_html(event: &NotificationEvent) -> String {
    let mut html = format!(
        "<b>{}</b><br>Matter: {}<br>Title: {}<br>DocID: <code>{}</code><br><a href=\"{}\">{}</a>",
        escape(&event.subject()),
        escape(&event.matter_id),
        escape(&event.title),
        escape(&event.doc_id),
        escape(&event.permalink),
        escape(&event.permalink),
    );
    if let Some(message) = event.extra.get("message").and_then(|v| v.as_str()) {
        html.push_str(&format!("<br><i>{}</i>", escape(message)));
    }
    html
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;
    use crate::notify::EventKind;

    #[test]
    fn escapes_markup_in_titles() {
        let event = NotificationEvent {
            event: EventKind::DocRegistered,
            doc_id: "D-1".into(),
            matter_id: "M-1".into(),
            title: "<script>x</script> & co".into(),
            permalink: "http://localhost:8000/doc/D-1".into(),
            ts: Utc::now(),
            extra: BTreeMap::new(),
        };
        let html = render_html(&event);
        assert!(html.contains("&lt;script&gt;x&lt;/script&gt; &amp; co"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn encodes_room_id_in_path() {
        let channel = MatrixChannel::new(
            &MatrixConfig {
                homeserver: "https://matrix.example.org".into(),
                access_token: "t".into(),
                room_id: "!abc:example.org".into(),
            },
            Duration::from_secs(5),
        )
        .unwrap();
        let url = channel.send_url();
        assert!(url.starts_with(
            "https://matrix.example.org/_matrix/client/v3/rooms/%21abc%3Aexample%2Eorg/send/m.room.message/"
        ));
    }
}
