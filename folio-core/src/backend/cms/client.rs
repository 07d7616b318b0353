//! Thin JSON-over-HTTP client shared by the CMS adapters

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, ServiceError};

const USER_AGENT: &str = concat!("folio/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client bound to one CMS base URL
///
/// Paths passed to the request methods are appended to the base URL. Logs
/// only ever carry the path, never the full URL or the auth header.
#[derive(Clone)]
pub struct CmsHttp {
    client: Client,
    base_url: String,
}

impl CmsHttp {
    /// Builds a client; a non-empty `bearer_token` is sent as
    /// `Authorization: Bearer ...` on every request
    pub fn new(base_url: &str, bearer_token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if !bearer_token.trim().is_empty() {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", bearer_token.trim()))
                .map_err(|_| {
                    ServiceError::Configuration("apiKey contains invalid characters".to_string())
                })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| ServiceError::Configuration(format!("failed to build HTTP client: {}", e.without_url())))?;

        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
    }

    /// GET returning the decoded body, or `None` on HTTP 404
    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Option<Value>> {
        debug!(path = %path, "CMS GET");
        let response = self.request(Method::GET, path).query(query).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(path, response).await?;
        Ok(Some(response.json().await?))
    }

    /// Sends a JSON body and returns the decoded response (`Null` when empty)
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: &Value,
        headers: &[(&str, String)],
    ) -> Result<Value> {
        debug!(method = %method, path = %path, "CMS request");
        let mut request = self.request(method, path);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }
        let response = request.json(body).send().await?;
        let response = check_status(path, response).await?;

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// DELETE; returns false on HTTP 404
    pub async fn delete(&self, path: &str, headers: &[(&str, String)]) -> Result<bool> {
        debug!(path = %path, "CMS DELETE");
        let mut request = self.request(Method::DELETE, path);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }
        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(path, response).await?;
        Ok(true)
    }
}

async fn check_status(path: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    Err(ServiceError::Unreachable(format!(
        "{} returned HTTP {}: {}",
        path, status, snippet
    )))
}
