//! Request builder and send lifecycle

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderName, HeaderValue, Method};
use http_body_util::{BodyExt, Full};
use serde::Serialize;
use tracing::{debug, error};

use crate::config;
use crate::error::{Error, Result};
use crate::response::Response;
use crate::transport::{self, Target};

/// Fluent builder for one outbound exchange.
///
/// Configuration calls chain and the terminal [`send`](Self::send)
/// consumes the builder, so a `Request` describes exactly one exchange
/// over exactly one fresh connection:
///
/// ```ignore
/// let resp = Request::new()
///     .tcp("http://127.0.0.1:9700")?
///     .get("/status")
///     .send()
///     .await?;
/// ```
///
/// Calling both [`tcp`](Self::tcp) and [`unix_socket`](Self::unix_socket)
/// is allowed; the last call wins.
#[derive(Debug, Default)]
pub struct Request {
    target: Option<Target>,
    skip_verify: bool,
    timeout: Option<Duration>,
    method: Option<Method>,
    path: Option<String>,
    headers: Vec<(String, String)>,
    body: Option<String>,
    deferred: Option<Error>,
}

impl Request {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Target a TCP endpoint given as `scheme://host[:port]`.
    ///
    /// `https` turns TLS on; when no port is given, the scheme default
    /// (443 for TLS, 80 for plain) applies. Only the final
    /// colon-separated segment of the authority is treated as a port
    /// candidate, so bare IPv6 hosts keep their colons.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the scheme separator is missing,
    /// the scheme is not `http`/`https`, or the host segment is empty.
    pub fn tcp(mut self, target: &str) -> Result<Self> {
        self.target = Some(parse_tcp_target(target)?);
        Ok(self)
    }

    /// Target a Unix-domain socket by path. Overrides any earlier
    /// [`tcp`](Self::tcp) call.
    pub fn unix_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.target = Some(Target::Unix(path.into()));
        self
    }

    /// Bound the whole exchange, connect through end-of-stream, instead
    /// of the process-wide default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// `GET` the given path.
    pub fn get(self, path: impl Into<String>) -> Self {
        self.method_path(Method::GET, path)
    }

    /// `PUT` to the given path.
    pub fn put(self, path: impl Into<String>) -> Self {
        self.method_path(Method::PUT, path)
    }

    /// `POST` to the given path.
    pub fn post(self, path: impl Into<String>) -> Self {
        self.method_path(Method::POST, path)
    }

    /// `DELETE` the given path.
    pub fn delete(self, path: impl Into<String>) -> Self {
        self.method_path(Method::DELETE, path)
    }

    fn method_path(mut self, method: Method, path: impl Into<String>) -> Self {
        self.method = Some(method);
        self.path = Some(path.into());
        self
    }

    /// Set a header. Keys are case-sensitive and unique; setting the same
    /// key again overwrites the value in place.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.headers.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.headers.push((key, value));
        }
        self
    }

    /// Control TLS peer verification. `secure(false)` disables
    /// certificate validation for this exchange only; verification is on
    /// by default.
    pub fn secure(mut self, enabled: bool) -> Self {
        self.skip_verify = !enabled;
        self
    }

    /// Set a raw string body. Headers are left untouched.
    pub fn body(mut self, text: impl Into<String>) -> Self {
        self.body = Some(text.into());
        self
    }

    /// Set a JSON body, forcing `Content-Type: application/json`.
    ///
    /// A serialization failure is not raised here; it surfaces from
    /// [`send`](Self::send) as [`Error::Request`].
    pub fn json<T: Serialize + ?Sized>(self, payload: &T) -> Self {
        match serde_json::to_string(payload) {
            Ok(text) => self.header("Content-Type", "application/json").body(text),
            Err(e) => {
                let mut this = self;
                this.deferred = Some(Error::Request(format!("serialize JSON body: {e}")));
                this
            }
        }
    }

    /// Execute the exchange.
    ///
    /// Dials the configured target, writes the request (body before
    /// end-of-request), and buffers the response until end-of-stream.
    /// The whole exchange is bounded by the request timeout, or the
    /// process-wide default when none was set. The connection is torn
    /// down on every exit path, including timeout.
    ///
    /// # Errors
    ///
    /// All failures are delivered through the returned future, never as
    /// a panic: [`Error::Request`] for assembly problems,
    /// [`Error::Client`] for transport failures, [`Error::Timeout`] when
    /// the window elapses. Each failure is logged once at the point of
    /// detection.
    pub async fn send(self) -> Result<Response> {
        let window = self.timeout.unwrap_or_else(config::default_timeout);

        let (target, skip_verify, wire) = match self.assemble() {
            Ok(parts) => parts,
            Err(err) => {
                error!("failed to assemble request: {err}");
                return Err(err);
            }
        };

        debug!("sending {} {} to {}", wire.method(), wire.uri(), target);

        match tokio::time::timeout(window, run_exchange(&target, skip_verify, wire)).await {
            Ok(Ok(response)) => {
                debug!("received response with status {}", response.status());
                Ok(response)
            }
            Ok(Err(err)) => {
                error!("exchange with {target} failed: {err}");
                Err(err)
            }
            Err(_) => {
                error!("exchange with {target} timed out after {window:?}");
                Err(Error::Timeout(window))
            }
        }
    }

    fn assemble(self) -> Result<(Target, bool, http::Request<Full<Bytes>>)> {
        if let Some(err) = self.deferred {
            return Err(err);
        }
        let target = self
            .target
            .ok_or_else(|| Error::Request("no connection target configured".to_string()))?;
        let method = self
            .method
            .ok_or_else(|| Error::Request("no method set".to_string()))?;
        let path = self
            .path
            .ok_or_else(|| Error::Request("no path set".to_string()))?;

        let mut builder = http::Request::builder().method(method).uri(path);

        let caller_set_host = self
            .headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("host"));
        if !caller_set_host {
            builder = builder.header(http::header::HOST, target.host_header());
        }

        for (key, value) in &self.headers {
            let name: HeaderName = key
                .parse()
                .map_err(|e| Error::Request(format!("invalid header name {key:?}: {e}")))?;
            let value: HeaderValue = value
                .parse()
                .map_err(|e| Error::Request(format!("invalid header value for {key:?}: {e}")))?;
            builder = builder.header(name, value);
        }

        let body = Full::new(Bytes::from(self.body.unwrap_or_default()));
        let wire = builder
            .body(body)
            .map_err(|e| Error::Request(format!("build request: {e}")))?;

        Ok((target, self.skip_verify, wire))
    }
}

async fn run_exchange(
    target: &Target,
    skip_verify: bool,
    wire: http::Request<Full<Bytes>>,
) -> Result<Response> {
    let (head, _guard) = transport::exchange(target, skip_verify, wire).await?;
    let (parts, mut incoming) = head.into_parts();

    let mut raw_headers = Vec::with_capacity(parts.headers.len());
    for (name, value) in parts.headers.iter() {
        raw_headers.push((
            name.as_str().to_string(),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        ));
    }

    // Chunks arrive in delivery order; end-of-stream finalizes the body.
    let mut body = String::new();
    while let Some(frame) = incoming.frame().await {
        let frame = frame.map_err(|e| Error::Client(format!("read response body: {e}")))?;
        if let Some(chunk) = frame.data_ref() {
            body.push_str(&String::from_utf8_lossy(chunk));
        }
    }

    Ok(Response::new(
        parts.status.as_u16(),
        parts
            .status
            .canonical_reason()
            .unwrap_or_default()
            .to_string(),
        raw_headers,
        body,
    ))
}

fn parse_tcp_target(target: &str) -> Result<Target> {
    let (scheme, rest) = target
        .split_once("://")
        .ok_or_else(|| Error::Config(format!("missing scheme in {target:?}")))?;

    let tls = match scheme {
        "http" => false,
        "https" => true,
        "" => return Err(Error::Config(format!("missing scheme in {target:?}"))),
        other => return Err(Error::Config(format!("unsupported scheme {other:?}"))),
    };
    let default_port = if tls { 443 } else { 80 };

    // Only the final colon-separated segment may name a port; everything
    // before it is the hostname, so bare IPv6 hosts keep their colons.
    let (host, port) = match rest.rsplit_once(':') {
        Some((head, tail)) => match tail.parse::<u16>() {
            Ok(port) => (head.to_string(), port),
            Err(_) => (rest.to_string(), default_port),
        },
        None => (rest.to_string(), default_port),
    };

    if host.is_empty() {
        return Err(Error::Config(format!("missing host in {target:?}")));
    }

    Ok(Target::Tcp { host, port, tls })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("http://127.0.0.1:9700", "127.0.0.1", 9700, false)]
    #[case("http://example.com", "example.com", 80, false)]
    #[case("https://example.com", "example.com", 443, true)]
    #[case("https://example.com:8443", "example.com", 8443, true)]
    #[case("http://fe80::42:8080", "fe80::42", 8080, false)]
    #[case("https://control.internal:443", "control.internal", 443, true)]
    fn tcp_target_parsing(
        #[case] input: &str,
        #[case] host: &str,
        #[case] port: u16,
        #[case] tls: bool,
    ) {
        let target = parse_tcp_target(input).unwrap();
        assert_eq!(
            target,
            Target::Tcp {
                host: host.to_string(),
                port,
                tls,
            }
        );
    }

    #[rstest]
    #[case("localhost:9700")]
    #[case("://localhost")]
    #[case("ftp://localhost")]
    #[case("http://")]
    #[case("http://:9700")]
    fn malformed_tcp_targets_are_config_errors(#[case] input: &str) {
        let err = parse_tcp_target(input).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");
    }

    #[test]
    fn setting_a_header_twice_keeps_the_latest_value_in_place() {
        let req = Request::new()
            .header("Auth-Key", "first")
            .header("X-Other", "x")
            .header("Auth-Key", "second");

        assert_eq!(
            req.headers,
            vec![
                ("Auth-Key".to_string(), "second".to_string()),
                ("X-Other".to_string(), "x".to_string()),
            ]
        );
    }

    #[test]
    fn last_transport_call_wins() {
        let req = Request::new()
            .tcp("http://localhost:9700")
            .unwrap()
            .unix_socket("/run/tether.sock");
        assert_eq!(req.target, Some(Target::Unix(PathBuf::from("/run/tether.sock"))));

        let req = Request::new()
            .unix_socket("/run/tether.sock")
            .tcp("http://localhost:9700")
            .unwrap();
        assert!(matches!(req.target, Some(Target::Tcp { .. })));
    }

    #[test]
    fn raw_body_leaves_headers_alone() {
        let req = Request::new().post("/items").body("plain text");

        assert_eq!(req.body.as_deref(), Some("plain text"));
        assert!(req.headers.is_empty());
    }

    #[test]
    fn json_body_forces_content_type() {
        let req = Request::new()
            .post("/items")
            .json(&serde_json::json!({"name": "a"}));

        assert_eq!(req.body.as_deref(), Some(r#"{"name":"a"}"#));
        assert_eq!(
            req.headers,
            vec![("Content-Type".to_string(), "application/json".to_string())]
        );
    }

    #[tokio::test]
    async fn json_serialization_failure_surfaces_from_send() {
        // Map keys must be strings in JSON; byte-vector keys cannot be
        // serialized, which is exactly the deferred failure path.
        let payload = std::collections::HashMap::from([(vec![1u8, 2], "x")]);
        let err = Request::new()
            .tcp("http://localhost:9700")
            .unwrap()
            .post("/items")
            .json(&payload)
            .send()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Request(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn send_without_target_is_a_request_error() {
        let err = Request::new().get("/status").send().await.unwrap_err();
        assert!(matches!(err, Error::Request(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn send_without_method_is_a_request_error() {
        let err = Request::new()
            .tcp("http://localhost:9700")
            .unwrap()
            .send()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Request(_)), "got {err:?}");
    }

    #[test]
    fn secure_toggles_verification() {
        let req = Request::new();
        assert!(!req.skip_verify);

        let req = req.secure(false);
        assert!(req.skip_verify);

        let req = req.secure(true);
        assert!(!req.skip_verify);
    }

    #[test]
    fn timeout_overrides_the_default() {
        let req = Request::new().timeout(Duration::from_secs(3));
        assert_eq!(req.timeout, Some(Duration::from_secs(3)));
    }
}
