use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::models::Annotation;

/// Plans and carries out an automation for a confirmed suggestion.
#[async_trait]
pub trait AutomationExecutor: Send + Sync {
    /// Returns the plan text that was executed.
    async fn plan_and_execute(&self, annotation: &Annotation) -> Result<String>;
}

pub struct HttpAutomationExecutor {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct ExecuteResponse {
    plan: String,
}

impl HttpAutomationExecutor {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build executor HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/execute", base_url.trim_end_matches('/')),
            api_key,
        })
    }
}

#[async_trait]
impl AutomationExecutor for HttpAutomationExecutor {
    async fn plan_and_execute(&self, annotation: &Annotation) -> Result<String> {
        let mut request = self.client.post(&self.endpoint).json(annotation);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("execute request to {} failed", self.endpoint))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("execute API error {status}: {error_text}"));
        }

        let body: ExecuteResponse = response
            .json()
            .await
            .context("execute response was not valid JSON")?;
        Ok(body.plan)
    }
}
