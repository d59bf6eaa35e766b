//! reqwest implementation of `PortalApi`.

use async_trait::async_trait;
use portal_types::{
    IdentifiersResponse, IdentifiersSearchRequest, NoteRequest, RequestIdResponse,
    UilResponse, UilSearchRequest,
};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use super::PortalApi;
use crate::config::PortalConfig;
use crate::error::{PortalError, Result};

/// Longest error body kept in `HttpStatus` errors.
const MAX_ERROR_BODY: usize = 200;

pub struct HttpPortalApi {
    http: Client,
    config: PortalConfig,
    identifiers_url: Url,
    uil_url: Url,
    note_url: Url,
}

impl HttpPortalApi {
    pub fn new(config: &PortalConfig) -> Result<Self> {
        config.validate()?;
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| PortalError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            identifiers_url: config.endpoint_url(&config.endpoints.identifiers)?,
            uil_url: config.endpoint_url(&config.endpoints.uil)?,
            note_url: config.endpoint_url(&config.endpoints.note)?,
            config: config.clone(),
        })
    }

    async fn post_json<B, T>(&self, operation: &str, url: &Url, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| PortalError::transport(operation, e))?;
        let response = check_status(operation, response).await?;
        response
            .json()
            .await
            .map_err(|e| PortalError::transport(operation, e))
    }

    async fn poll_json<T: DeserializeOwned>(&self, operation: &str, url: &Url, request_id: &str) -> Result<T> {
        let response = self
            .http
            .get(url.clone())
            .query(&[("requestId", request_id)])
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| PortalError::transport(operation, e))?;
        let response = check_status(operation, response).await?;
        response
            .json()
            .await
            .map_err(|e| PortalError::transport(operation, e))
    }
}

async fn check_status(operation: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PortalError::HttpStatus {
        operation: operation.to_string(),
        status: status.as_u16(),
        body: body.chars().take(MAX_ERROR_BODY).collect(),
    })
}

#[async_trait]
impl PortalApi for HttpPortalApi {
    async fn post_identifiers(&self, request: &IdentifiersSearchRequest) -> Result<RequestIdResponse> {
        tracing::debug!(identifier = %request.identifier, gates = request.efti_gate_indicator.len(), "POST identifiers");
        self.post_json("submit identifiers", &self.identifiers_url, request)
            .await
    }

    async fn get_identifiers(&self, request_id: &str) -> Result<IdentifiersResponse> {
        self.poll_json("poll identifiers", &self.identifiers_url, request_id)
            .await
    }

    async fn post_uil(&self, request: &UilSearchRequest) -> Result<RequestIdResponse> {
        tracing::debug!(dataset_id = %request.dataset_id, gate_id = %request.gate_id, "POST uil");
        self.post_json("submit uil", &self.uil_url, request).await
    }

    async fn get_uil(&self, request_id: &str) -> Result<UilResponse> {
        self.poll_json("poll uil", &self.uil_url, request_id).await
    }

    async fn post_note(&self, note: &NoteRequest) -> Result<serde_json::Value> {
        let operation = "post note";
        let response = self
            .http
            .post(self.note_url.clone())
            .json(note)
            .send()
            .await
            .map_err(|e| PortalError::transport(operation, e))?;
        let body = check_status(operation, response)
            .await?
            .text()
            .await
            .map_err(|e| PortalError::transport(operation, e))?;

        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)))
    }

    async fn fetch_asset(&self, path: &str) -> Result<String> {
        let operation = "fetch asset";
        let url = self.config.endpoint_url(path)?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| PortalError::transport(operation, e))?;
        check_status(operation, response)
            .await?
            .text()
            .await
            .map_err(|e| PortalError::transport(operation, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_resolve_against_base_path() {
        let config = PortalConfig::default().with_base_url("http://gate.local:8880/api/");
        let api = HttpPortalApi::new(&config).unwrap();
        assert_eq!(api.identifiers_url.as_str(), "http://gate.local:8880/api/identifiers");
        assert_eq!(api.uil_url.as_str(), "http://gate.local:8880/api/uil");
        assert_eq!(api.note_url.as_str(), "http://gate.local:8880/api/note");
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let config = PortalConfig::default().with_base_url("not a url");
        assert!(matches!(HttpPortalApi::new(&config), Err(PortalError::Config(_))));
    }

    #[tokio::test]
    async fn unreachable_gate_is_a_transport_error() {
        // port 9 (discard) on loopback is expected to refuse connections
        let config = PortalConfig::default().with_base_url("http://127.0.0.1:9");
        let api = HttpPortalApi::new(&config).unwrap();
        let err = api.get_uil("R1").await.unwrap_err();
        assert!(err.is_transport(), "{err}");
    }
}
