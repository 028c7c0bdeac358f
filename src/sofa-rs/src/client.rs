use crate::agent::{HttpAgent, ReqwestAgent};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use sofa_core::{ClientConfig, Headers, Method, Query, Request, Response, Result};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Request payload
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    Json(Value),
    Bytes(Vec<u8>),
}

/// Database REST API client
pub struct Client {
    config: ClientConfig,
    agent: Arc<dyn HttpAgent>,
}

impl Client {
    /// Create a new client connected to the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_config(ClientConfig::new(base_url))
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let agent = Arc::new(ReqwestAgent::new(&config));
        Self { config, agent }
    }

    /// Use a custom transport
    pub fn with_agent(config: ClientConfig, agent: Arc<dyn HttpAgent>) -> Self {
        Self { config, agent }
    }

    pub fn base_url(&self) -> &str {
        self.config.base_url()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn agent(&self) -> &Arc<dyn HttpAgent> {
        &self.agent
    }

    /// Full URI for `path`, with the query appended when non-empty.
    pub fn uri(&self, path: &str, query: Option<&Query>) -> String {
        let mut uri = format!("{}/{}", self.base_url(), path.trim_start_matches('/'));
        if let Some(query) = query {
            let query = query.as_query_string();
            if !query.is_empty() {
                uri.push(if uri.contains('?') { '&' } else { '?' });
                uri.push_str(&query);
            }
        }
        uri
    }

    fn default_headers(&self, body: &Body) -> Headers {
        let mut headers = Headers::new();
        headers
            .set("Accept", "application/json")
            .set("User-Agent", self.config.user_agent.as_str());

        if let Some(username) = &self.config.username {
            let password = self.config.password.as_deref().unwrap_or_default();
            let credentials = STANDARD.encode(format!("{}:{}", username, password));
            headers.set("Authorization", format!("Basic {}", credentials));
        }

        if matches!(body, Body::Json(_)) {
            headers.set("Content-Type", "application/json");
        }
        headers
    }

    /// Send one request; HTTP error statuses come back as normal responses.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: Option<&Query>,
        body: Body,
        headers: Headers,
    ) -> Result<Response> {
        let mut all_headers = self.default_headers(&body);
        all_headers.merge(&headers);

        let payload = match body {
            Body::Empty => Vec::new(),
            Body::Json(value) => serde_json::to_vec(&value)?,
            Body::Bytes(bytes) => bytes,
        };

        let request = Request::new(method, self.uri(path, query))
            .with_headers(all_headers)
            .with_body(payload);

        debug!("{} {}", request.method(), request.uri());
        let raw = self.agent.run(&request).await?;
        let response = Response::from_raw(raw);
        debug!(
            "{} {} -> {}",
            request.method(),
            request.uri(),
            response.status_code()
        );

        Ok(response)
    }

    pub async fn head(&self, path: &str, query: Option<&Query>, headers: Headers) -> Result<Response> {
        self.request(Method::Head, path, query, Body::Empty, headers).await
    }

    pub async fn get(&self, path: &str, query: Option<&Query>, headers: Headers) -> Result<Response> {
        self.request(Method::Get, path, query, Body::Empty, headers).await
    }

    pub async fn post(
        &self,
        path: &str,
        query: Option<&Query>,
        body: Body,
        headers: Headers,
    ) -> Result<Response> {
        self.request(Method::Post, path, query, body, headers).await
    }

    pub async fn put(
        &self,
        path: &str,
        query: Option<&Query>,
        body: Body,
        headers: Headers,
    ) -> Result<Response> {
        self.request(Method::Put, path, query, body, headers).await
    }

    pub async fn delete(
        &self,
        path: &str,
        query: Option<&Query>,
        headers: Headers,
    ) -> Result<Response> {
        self.request(Method::Delete, path, query, Body::Empty, headers).await
    }

    pub async fn copy(&self, path: &str, query: Option<&Query>, headers: Headers) -> Result<Response> {
        self.request(Method::Copy, path, query, Body::Empty, headers).await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url())
            .finish()
    }
}
