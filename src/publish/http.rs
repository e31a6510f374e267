//! HTTP transport: POSTs each encoded batch to the configured endpoint.

use super::batch::Batch;
use super::transport::{classify_status, SendOutcome, Transport};
use crate::config::RegistryConfig;
use crate::error::ConfigError;
use futures::future::BoxFuture;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

const API_KEY_HEADER: &str = "X-Api-Key";
const ACCOUNT_HEADER: &str = "X-Account-Id";

pub struct HttpTransport {
    client: reqwest::Client,
    uri: String,
    api_key: Option<String>,
    account_id: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &RegistryConfig) -> Result<Self, ConfigError> {
        let uri = config
            .uri
            .clone()
            .ok_or_else(|| ConfigError::Missing {
                key: "stepmeter.uri".to_string(),
            })?;
        let client = reqwest::Client::builder()
            .timeout(config.publish_timeout)
            .build()
            .map_err(|e| ConfigError::invalid("stepmeter.uri", &uri, e.to_string()))?;

        Ok(HttpTransport {
            client,
            uri,
            api_key: config.api_key.clone(),
            account_id: config.account_id.clone(),
        })
    }
}

impl Transport for HttpTransport {
    fn send<'a>(&'a self, batch: &'a Batch, timeout: Duration) -> BoxFuture<'a, SendOutcome> {
        Box::pin(async move {
            let mut request = self
                .client
                .post(&self.uri)
                .timeout(timeout)
                .header(CONTENT_TYPE, "application/json")
                .body(batch.payload.clone());
            if let Some(key) = &self.api_key {
                request = request.header(API_KEY_HEADER, key);
            }
            if let Some(account) = &self.account_id {
                request = request.header(ACCOUNT_HEADER, account);
            }

            match request.send().await {
                Ok(response) => classify_status(response.status().as_u16()),
                Err(e) if e.is_builder() => SendOutcome::Fatal(format!("invalid request: {e}")),
                Err(e) => SendOutcome::Retryable(format!("transport error: {e}")),
            }
        })
    }
}
