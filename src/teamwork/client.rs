use super::{FileContext, MessageContext, SourceSystem};
use crate::events::fields::{int_field, object, str_field};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 15;
/// Teamwork accepts the API key as the basic-auth user with any password.
const API_KEY_PASSWORD: &str = "x";

#[derive(Clone)]
pub struct TeamworkClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl TeamworkClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            anyhow::bail!("Teamwork base URL is empty");
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Teamwork HTTP client")?;
        Ok(Self {
            client,
            base_url,
            api_key: api_key
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key.as_deref() {
            Some(key) => request.basic_auth(key, Some(API_KEY_PASSWORD)),
            None => request,
        }
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .authed(self.client.get(&url))
            .send()
            .await
            .with_context(|| format!("Teamwork GET {path} failed"))?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Teamwork GET {path} returned {status}: {}", body.trim());
        }
        resp.json::<serde_json::Value>()
            .await
            .with_context(|| format!("Teamwork GET {path} returned invalid JSON"))
    }

    async fn post_json(&self, path: &str, payload: &serde_json::Value) -> Result<()> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .authed(self.client.post(&url))
            .json(payload)
            .send()
            .await
            .with_context(|| format!("Teamwork POST {path} failed"))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Teamwork POST {path} returned {status}: {}", body.trim());
        }
        Ok(())
    }
}

#[async_trait]
impl SourceSystem for TeamworkClient {
    fn name(&self) -> &str {
        "teamwork"
    }

    async fn fetch_message(&self, message_id: i64) -> Result<MessageContext> {
        let body = self.get_json(&format!("/messages/{message_id}.json")).await?;
        let post = object(&body, &["post", "message", "messages"]).unwrap_or(&body);
        Ok(MessageContext {
            project_id: int_field(post, &["project-id", "projectId"]),
            category_name: str_field(post, &["category-name", "categoryName"]),
            subject: str_field(post, &["title", "subject"]),
        })
    }

    async fn fetch_file(&self, file_id: i64) -> Result<FileContext> {
        let body = self.get_json(&format!("/files/{file_id}.json")).await?;
        let file = object(&body, &["file"]).unwrap_or(&body);
        Ok(FileContext {
            name: str_field(file, &["originalName", "original-name", "name"]),
            description: str_field(file, &["description"]),
            project_id: int_field(file, &["project-id", "projectId"]),
        })
    }

    async fn post_message_reply(&self, message_id: i64, body: &str) -> Result<()> {
        let payload = serde_json::json!({
            "messagepost": {
                "body": body,
            }
        });
        self.post_json(&format!("/messages/{message_id}/messagePosts.json"), &payload)
            .await
    }

    async fn post_task_comment(&self, task_id: i64, body: &str) -> Result<()> {
        let payload = serde_json::json!({
            "comment": {
                "body": body,
                "notify": "",
                "isprivate": false,
                "content-type": "TEXT",
            }
        });
        self.post_json(&format!("/tasks/{task_id}/comments.json"), &payload)
            .await
    }
}
