//! Authenticated HTTP client for the hosted backend
//!
//! Wraps reqwest::Client with the `apikey` header every request needs and a
//! bearer token (the user's access token, or the anon key when signed out).

use serde_json::Value;
use url::Url;

use super::BackendError;
use crate::config::AppConfig;

const AUTH_PATH: &str = "/auth/v1";
const REST_PATH: &str = "/rest/v1";

#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_base_url(&config.backend_url, &config.anon_key)
    }

    pub fn with_base_url(base_url: &str, anon_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }

    /// Auth service URL for `path` (e.g. `/token`), with optional query pairs.
    pub fn auth_url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, BackendError> {
        self.build_url(AUTH_PATH, path, query)
    }

    /// REST URL for a table, with optional query pairs.
    pub fn rest_url(&self, table: &str, query: &[(&str, &str)]) -> Result<Url, BackendError> {
        self.build_url(REST_PATH, &format!("/{}", table), query)
    }

    fn build_url(&self, prefix: &str, path: &str, query: &[(&str, &str)]) -> Result<Url, BackendError> {
        let mut url = Url::parse(&format!("{}{}{}", self.base_url, prefix, path))
            .map_err(|e| BackendError::new(format!("Invalid backend URL {:?}: {}", self.base_url, e)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// GET against the auth service.
    pub async fn auth_get(&self, url: Url, bearer: Option<&str>) -> Result<reqwest::Response, BackendError> {
        tracing::debug!("Auth GET {}", url.path());
        let req = self.http.get(url.clone());
        self.send(req, &url, bearer).await
    }

    /// POST a JSON body to the auth service.
    pub async fn auth_post(
        &self,
        url: Url,
        body: &Value,
        bearer: Option<&str>,
    ) -> Result<reqwest::Response, BackendError> {
        tracing::debug!("Auth POST {}", url.path());
        let req = self.http.post(url.clone()).json(body);
        self.send(req, &url, bearer).await
    }

    /// GET rows from the REST API.
    pub async fn rest_get(&self, url: Url, bearer: &str) -> Result<reqwest::Response, BackendError> {
        tracing::debug!("REST GET {}", url.path());
        let req = self.http.get(url.clone());
        self.send(req, &url, Some(bearer)).await
    }

    /// Insert rows through the REST API and return the inserted representation.
    pub async fn rest_insert(
        &self,
        url: Url,
        body: &Value,
        bearer: &str,
    ) -> Result<reqwest::Response, BackendError> {
        tracing::debug!("REST POST {}", url.path());
        let req = self
            .http
            .post(url.clone())
            .header("Prefer", "return=representation")
            .json(body);
        self.send(req, &url, Some(bearer)).await
    }

    async fn send(
        &self,
        req: reqwest::RequestBuilder,
        url: &Url,
        bearer: Option<&str>,
    ) -> Result<reqwest::Response, BackendError> {
        let resp = req
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer.unwrap_or(&self.anon_key))
            .send()
            .await
            .map_err(|e| BackendError::new(format!("Request to {} failed: {}", url.path(), e)))?;

        check_response(resp).await
    }
}

/// Check HTTP response status code and turn failures into a `BackendError`.
async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(BackendError::with_status(
        status.as_u16(),
        error_message(&body).unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
    ))
}

/// Pull a human-readable message out of an error body.
///
/// The auth service and the REST layer disagree on field names, so try
/// each in turn before falling back to the raw body.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Ok(json) = serde_json::from_str::<Value>(trimmed) else {
        return Some(trimmed.to_string());
    };
    ["msg", "message", "error_description", "error"]
        .iter()
        .find_map(|k| json.get(*k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(String::from)
        .or_else(|| Some(trimmed.to_string()))
}
