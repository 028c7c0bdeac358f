use reqwest::redirect::Policy;
use sofa_core::{ClientConfig, Error, HttpVersion, Method, RawResponse, Request, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

/// Issues one HTTP request and hands back the raw exchange.
///
/// Implementations report connection-level failures as
/// [`Error::Transport`]. HTTP error statuses are successful exchanges.
#[async_trait::async_trait]
pub trait HttpAgent: Send + Sync {
    async fn run(&self, request: &Request) -> Result<RawResponse>;
}

/// Agent backed by `reqwest`.
///
/// Every call opens its own transport handle, configured for the request's
/// method, and releases it before returning on every path.
pub struct ReqwestAgent {
    connect_timeout: Duration,
    version: HttpVersion,
    open_handles: Arc<AtomicUsize>,
}

impl ReqwestAgent {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.timeout_secs),
            version: config.http_version,
            open_handles: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Handles currently held by in-flight calls
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    async fn execute(&self, handle: &TransportHandle, request: &Request) -> Result<RawResponse> {
        let client = handle
            .client()
            .ok_or_else(|| Error::Transport {
                code: 2,
                text: "transport handle already released".to_string(),
            })?;

        let method = reqwest::Method::from_bytes(request.method().as_str().as_bytes())
            .map_err(|e| Error::Transport {
                code: 3,
                text: e.to_string(),
            })?;

        let version = match self.version {
            HttpVersion::Http10 => reqwest::Version::HTTP_10,
            HttpVersion::Http11 => reqwest::Version::HTTP_11,
        };

        let mut builder = client.request(method, request.uri()).version(version);
        for (name, value) in request.headers().present() {
            // Never ask for 100-continue
            if name.eq_ignore_ascii_case("expect") {
                continue;
            }
            builder = builder.header(name, value);
        }

        match request.method() {
            Method::Head | Method::Get => {}
            _ => builder = builder.body(request.body().to_vec()),
        }

        let outgoing = builder.build().map_err(transport_error)?;
        let request_headers = header_pairs(outgoing.headers());

        let response = client.execute(outgoing).await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let headers = header_pairs(response.headers());

        let body = if request.method() == Method::Head {
            Vec::new()
        } else {
            response.bytes().await.map_err(transport_error)?.to_vec()
        };

        Ok(RawResponse {
            status,
            headers,
            body,
            request_headers,
        })
    }
}

impl Default for ReqwestAgent {
    fn default() -> Self {
        Self::new(&ClientConfig::default())
    }
}

#[async_trait::async_trait]
impl HttpAgent for ReqwestAgent {
    async fn run(&self, request: &Request) -> Result<RawResponse> {
        let mut handle = TransportHandle::open(self, request.method())?;
        let result = self.execute(&handle, request).await;
        handle.clean();

        if let Err(Error::Transport { code, text }) = &result {
            warn!(
                "{} {} failed at transport level ({}): {}",
                request.method(),
                request.uri(),
                code,
                text
            );
        }
        result
    }
}

/// Per-call transport resource. Released by `clean` or on drop.
///
/// Each handle builds its own `reqwest::Client`, TLS roots included, so no
/// connection or redirect state leaks between calls. That setup cost is paid
/// on every request; callers needing pooled connections should supply their
/// own [`HttpAgent`].
pub(crate) struct TransportHandle {
    client: Option<reqwest::Client>,
    open_handles: Arc<AtomicUsize>,
}

impl TransportHandle {
    fn open(agent: &ReqwestAgent, method: Method) -> Result<Self> {
        // Only HEAD follows redirects
        let policy = if method == Method::Head {
            Policy::limited(10)
        } else {
            Policy::none()
        };

        let client = reqwest::Client::builder()
            .connect_timeout(agent.connect_timeout)
            .redirect(policy)
            .build()
            .map_err(transport_error)?;

        agent.open_handles.fetch_add(1, Ordering::SeqCst);
        trace!("transport handle opened for {}", method);

        Ok(Self {
            client: Some(client),
            open_handles: agent.open_handles.clone(),
        })
    }

    fn client(&self) -> Option<&reqwest::Client> {
        self.client.as_ref()
    }

    /// Release the handle. Safe to call more than once.
    pub(crate) fn clean(&mut self) {
        if self.client.take().is_some() {
            self.open_handles.fetch_sub(1, Ordering::SeqCst);
            trace!("transport handle released");
        }
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.clean();
    }
}

fn header_pairs(headers: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Map a reqwest failure onto cURL-style error numbers.
fn transport_error(err: reqwest::Error) -> Error {
    let code = if err.is_builder() {
        3
    } else if err.is_timeout() {
        28
    } else if err.is_connect() {
        7
    } else if err.is_redirect() {
        47
    } else if err.is_body() || err.is_decode() {
        56
    } else {
        2
    };

    let mut text = err.to_string();
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }

    Error::Transport { code, text }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use sofa_core::Headers;

    #[test]
    fn test_handle_clean_is_idempotent() {
        let agent = ReqwestAgent::default();
        let mut handle = TransportHandle::open(&agent, Method::Get).unwrap();
        assert_eq!(agent.open_handles(), 1);

        handle.clean();
        handle.clean();
        assert_eq!(agent.open_handles(), 0);
        assert!(handle.client().is_none());

        drop(handle);
        assert_eq!(agent.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_reports_code_and_text() {
        let agent = ReqwestAgent::default();
        // Nothing listens on port 1
        let request = Request::new(Method::Get, "http://127.0.0.1:1/db/doc1");

        let err = agent.run(&request).await.unwrap_err();
        match err {
            Error::Transport { code, text } => {
                assert_ne!(code, 0);
                assert!(!text.is_empty());
            }
            other => panic!("expected transport error, got {:?}", other),
        }
        assert_eq!(agent.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_malformed_uri_is_transport_failure() {
        let agent = ReqwestAgent::default();
        let request = Request::new(Method::Get, "not a uri");

        let err = agent.run(&request).await.unwrap_err();
        assert!(matches!(err, Error::Transport { code: 3, .. }));
        assert_eq!(agent.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_omitted_and_expect_headers_not_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/db/doc1/file.txt")
            .match_header("expect", Matcher::Missing)
            .match_header("x-dropped", Matcher::Missing)
            .match_header("if-match", "1-abc")
            .match_body("hello")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"rev":"2-def"}"#)
            .create_async()
            .await;

        let mut headers = Headers::new();
        headers
            .set("If-Match", "1-abc")
            .set("Expect", "100-continue")
            .set("X-Dropped", "yes")
            .omit("X-Dropped");
        let request = Request::new(Method::Put, format!("{}/db/doc1/file.txt", server.url()))
            .with_headers(headers)
            .with_body(b"hello".to_vec());

        let agent = ReqwestAgent::default();
        let raw = agent.run(&request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(raw.status, 201);
        assert_eq!(raw.body, br#"{"ok":true,"rev":"2-def"}"#.to_vec());
        assert!(raw
            .request_headers
            .iter()
            .any(|(n, v)| n == "if-match" && v == "1-abc"));
        assert_eq!(agent.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_http_error_status_is_not_a_failure() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("COPY", "/db/doc1")
            .match_header("destination", "doc2")
            .with_status(409)
            .with_body(r#"{"error":"conflict"}"#)
            .create_async()
            .await;

        let mut headers = Headers::new();
        headers.set("Destination", "doc2");
        let request =
            Request::new(Method::Copy, format!("{}/db/doc1", server.url())).with_headers(headers);

        let raw = ReqwestAgent::default().run(&request).await.unwrap();
        mock.assert_async().await;
        assert_eq!(raw.status, 409);
    }

    #[tokio::test]
    async fn test_head_has_no_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("HEAD", "/db/doc1")
            .with_status(200)
            .with_header("etag", "\"1-abc\"")
            .create_async()
            .await;

        let request = Request::new(Method::Head, format!("{}/db/doc1", server.url()));
        let raw = ReqwestAgent::default().run(&request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(raw.status, 200);
        assert!(raw.body.is_empty());
        assert!(raw
            .headers
            .iter()
            .any(|(n, v)| n == "etag" && v == "\"1-abc\""));
    }

    #[tokio::test]
    async fn test_only_head_follows_redirects() {
        let mut server = mockito::Server::new_async().await;
        let target = format!("{}/db/new", server.url());
        let head_moved = server
            .mock("HEAD", "/db/old")
            .with_status(301)
            .with_header("location", &target)
            .create_async()
            .await;
        let head_target = server
            .mock("HEAD", "/db/new")
            .with_status(200)
            .create_async()
            .await;
        let get_moved = server
            .mock("GET", "/db/old")
            .with_status(301)
            .with_header("location", &target)
            .create_async()
            .await;
        let get_target = server
            .mock("GET", "/db/new")
            .with_status(200)
            .expect(0)
            .create_async()
            .await;

        let agent = ReqwestAgent::default();
        let old = format!("{}/db/old", server.url());

        let raw = agent.run(&Request::new(Method::Head, old.clone())).await.unwrap();
        assert_eq!(raw.status, 200);
        head_moved.assert_async().await;
        head_target.assert_async().await;

        let raw = agent.run(&Request::new(Method::Get, old)).await.unwrap();
        assert_eq!(raw.status, 301);
        get_moved.assert_async().await;
        get_target.assert_async().await;
    }
}
