//! HTTP entitlement source for a tollgate server.

use crate::error::{CacheError, CacheResult};
use crate::source::EntitlementSource;
use async_trait::async_trait;
use serde::Deserialize;
use tollgate_types::{EntitlementDecision, ErrorCode};

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorCode,
    message: String,
}

/// Revalidates through `POST {base_url}/api/v1/revalidate`.
#[derive(Debug, Clone)]
pub struct HttpEntitlementSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEntitlementSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl EntitlementSource for HttpEntitlementSource {
    async fn revalidate(&self, token: &str) -> CacheResult<EntitlementDecision> {
        let response = self
            .client
            .post(format!("{}/api/v1/revalidate", self.base_url))
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await
            .map_err(|e| CacheError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<EntitlementDecision>()
                .await
                .map_err(|e| CacheError::Transient(format!("invalid decision body: {e}")));
        }

        match response.json::<ErrorBody>().await {
            Ok(body) => Err(CacheError::from_remote(body.error, body.message)),
            Err(_) => Err(CacheError::Transient(format!("server returned {status}"))),
        }
    }
}
