//! Client for the LLM-backed action API.
//!
//! The service takes the cleaned message text plus fixed project metadata and
//! answers `201 Created` with `{"message": "..."}`. Anything else is a failure.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_ACTION_PATH: &str = "/pf/geminia/accion";
pub const DEFAULT_PROJECT_ID: i64 = 506_482;
pub const DEFAULT_PROJECT_NAME: &str = "TI TEAM";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRequest {
    #[serde(rename = "id_project")]
    pub project_id: i64,
    #[serde(rename = "nombre_proyecto")]
    pub project_name: String,
    #[serde(rename = "id_usuario")]
    pub user_id: Option<i64>,
    #[serde(rename = "nombre_usuario")]
    pub user_name: String,
    pub message: String,
    pub status: &'static str,
}

impl ActionRequest {
    pub fn ready(
        project_id: i64,
        project_name: &str,
        user_id: Option<i64>,
        user_name: Option<&str>,
        message: &str,
    ) -> Self {
        Self {
            project_id,
            project_name: project_name.to_string(),
            user_id,
            user_name: user_name.unwrap_or_default().to_string(),
            message: message.to_string(),
            status: "ready",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ActionResponse {
    message: Option<String>,
}

#[async_trait]
pub trait ActionRelay: Send + Sync {
    fn name(&self) -> &str;

    /// Forward a request and return the model's answer, if it produced one.
    async fn relay(&self, request: &ActionRequest) -> Result<Option<String>>;
}

pub struct HttpActionRelay {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpActionRelay {
    pub fn new(
        base_url: &str,
        action_path: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            anyhow::bail!("action API base URL is empty");
        }
        let action_path = action_path.trim();
        let endpoint = if action_path.starts_with('/') {
            format!("{base_url}{action_path}")
        } else {
            format!("{base_url}/{action_path}")
        };
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build action API HTTP client")?;
        Ok(Self {
            client,
            endpoint,
            api_key: api_key
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ActionRelay for HttpActionRelay {
    fn name(&self) -> &str {
        "action_api"
    }

    async fn relay(&self, request: &ActionRequest) -> Result<Option<String>> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = self.api_key.as_deref() {
            builder = builder.header("X-API-Key", key);
        }
        let resp = builder
            .send()
            .await
            .context("action API request failed")?;
        let status = resp.status();
        if status != reqwest::StatusCode::CREATED {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("action API returned {status}: {}", body.trim());
        }
        let parsed: ActionResponse = resp
            .json()
            .await
            .context("action API returned invalid JSON")?;
        Ok(parsed
            .message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn relay_for(server: &MockServer) -> HttpActionRelay {
        HttpActionRelay::new(
            &server.uri(),
            DEFAULT_ACTION_PATH,
            Some("secret-key".into()),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    fn sample_request() -> ActionRequest {
        ActionRequest::ready(
            DEFAULT_PROJECT_ID,
            DEFAULT_PROJECT_NAME,
            Some(12),
            Some("Ana Ruiz"),
            "resume el presupuesto",
        )
    }

    #[test]
    fn request_uses_wire_field_names() {
        let value = serde_json::to_value(sample_request()).unwrap();
        assert_eq!(
            value,
            json!({
                "id_project": 506482,
                "nombre_proyecto": "TI TEAM",
                "id_usuario": 12,
                "nombre_usuario": "Ana Ruiz",
                "message": "resume el presupuesto",
                "status": "ready"
            })
        );
    }

    #[test]
    fn endpoint_joins_path() {
        let relay = HttpActionRelay::new(
            "https://api.example.com/",
            "pf/geminia/accion",
            None,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(relay.endpoint(), "https://api.example.com/pf/geminia/accion");
        assert!(HttpActionRelay::new("  ", DEFAULT_ACTION_PATH, None, Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn created_returns_model_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DEFAULT_ACTION_PATH))
            .and(header("X-API-Key", "secret-key"))
            .and(body_json(serde_json::to_value(sample_request()).unwrap()))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"message": "Listo."})))
            .expect(1)
            .mount(&server)
            .await;

        let answer = relay_for(&server).relay(&sample_request()).await.unwrap();
        assert_eq!(answer.as_deref(), Some("Listo."));
    }

    #[tokio::test]
    async fn ok_status_is_not_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "x"})))
            .mount(&server)
            .await;

        let err = relay_for(&server).relay(&sample_request()).await.unwrap_err();
        assert!(err.to_string().contains("200"));
    }

    #[tokio::test]
    async fn created_without_message_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"status": "queued"})))
            .mount(&server)
            .await;

        assert_eq!(relay_for(&server).relay(&sample_request()).await.unwrap(), None);
    }
}
