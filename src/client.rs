//! HTTP client for a running chat server.
//!
//! Every failure maps to a short message fit to show the person chatting.
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::chat::{ChatRequest, ChatResponse};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("cannot connect to {url}")]
    Connect { url: String },

    #[error("server returned {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl ClientError {
    fn from_reqwest(err: reqwest::Error, url: &str) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else if err.is_connect() {
            Self::Connect {
                url: url.to_string(),
            }
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }

    /// Message to show in the chat instead of a reply.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout { .. } => {
                "The request timed out. The server may be busy, please try again.".to_string()
            }
            Self::Connect { url } => {
                format!("Cannot reach the chat server at {url}. Is the backend running?")
            }
            Self::Status { status: 400, detail } => detail.clone(),
            Self::Status { status, detail } if *status >= 500 => {
                format!("The server hit an error: {detail}")
            }
            other => format!("Something went wrong: {other}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Health {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Prefer the server's `detail`; axum rejections come back as plain text.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(s),
        }) => s,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) => body.trim().to_string(),
    }
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Request(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<Health, ClientError> {
        let url = format!("{}/health", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(e, &self.base_url))?;
        Self::decode(resp, &url).await
    }

    pub async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        let url = format!("{}/chat", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(e, &self.base_url))?;
        Self::decode(resp, &url).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
        url: &str,
    ) -> Result<T, ClientError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }
        resp.json::<T>()
            .await
            .map_err(|e| ClientError::from_reqwest(e, url))
    }
}
