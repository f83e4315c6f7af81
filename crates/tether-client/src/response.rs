//! Completed-exchange wrapper

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// One completed HTTP exchange.
///
/// Produced by [`Request::send`](crate::Request::send) once the transport
/// has delivered the full response. Immutable afterwards, except for the
/// header lookup index which is built lazily on first use.
#[derive(Debug)]
pub struct Response {
    status: u16,
    status_message: String,
    raw_headers: Vec<(String, String)>,
    body: String,
    header_index: OnceLock<HashMap<String, String>>,
}

impl Response {
    pub(crate) fn new(
        status: u16,
        status_message: String,
        raw_headers: Vec<(String, String)>,
        body: String,
    ) -> Self {
        Self {
            status,
            status_message,
            raw_headers,
            body,
            header_index: OnceLock::new(),
        }
    }

    /// HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Reason phrase for the status code, empty when the code has none.
    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    /// Whether the status code is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Header pairs exactly as delivered by the transport, order and
    /// duplicates preserved.
    pub fn raw_headers(&self) -> &[(String, String)] {
        &self.raw_headers
    }

    /// Look up a header value by exact name.
    ///
    /// The index is built once, on first call, from the raw pair list and
    /// cached. Names are matched case-sensitively against what the
    /// transport delivered; when a name repeats, the last occurrence wins.
    /// Absent names yield `None`, never an error.
    pub fn header(&self, name: &str) -> Option<&str> {
        let index = self.header_index.get_or_init(|| {
            let mut index = HashMap::with_capacity(self.raw_headers.len());
            for (name, value) in &self.raw_headers {
                index.insert(name.clone(), value.clone());
            }
            index
        });
        index.get(name).map(String::as_str)
    }

    /// Accumulated body text, verbatim.
    pub fn text(&self) -> &str {
        &self.body
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Read`] when the body is not valid JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(Error::Read)
    }

    /// Decode the body as JSON, yielding `None` on any parse failure.
    ///
    /// For callers that tolerate empty or non-JSON bodies.
    pub fn json_opt<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_str(&self.body).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn response_with(raw_headers: Vec<(String, String)>, body: &str) -> Response {
        Response::new(200, "OK".to_string(), raw_headers, body.to_string())
    }

    fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn header_lookup_is_case_sensitive() {
        let resp = response_with(pairs(&[("Content-Type", "application/json")]), "");

        assert_eq!(resp.header("Content-Type"), Some("application/json"));
        assert_eq!(resp.header("content-type"), None);
        assert_eq!(resp.header("X-Missing"), None);
    }

    #[test]
    fn duplicate_header_names_keep_last_occurrence() {
        let resp = response_with(
            pairs(&[("Set-Cookie", "a=1"), ("X-Other", "x"), ("Set-Cookie", "b=2")]),
            "",
        );

        assert_eq!(resp.header("Set-Cookie"), Some("b=2"));
        // The raw list still carries both occurrences in order.
        assert_eq!(resp.raw_headers().len(), 3);
        assert_eq!(resp.raw_headers()[0], ("Set-Cookie".to_string(), "a=1".to_string()));
        assert_eq!(resp.raw_headers()[2], ("Set-Cookie".to_string(), "b=2".to_string()));
    }

    #[test]
    fn repeated_lookups_reuse_the_index() {
        let resp = response_with(pairs(&[("a", "1"), ("b", "2")]), "");

        assert_eq!(resp.header("a"), Some("1"));
        assert_eq!(resp.header("a"), Some("1"));
        assert_eq!(resp.header("b"), Some("2"));
    }

    #[test]
    fn strict_json_fails_on_garbage() {
        let resp = response_with(vec![], "not json");

        assert_eq!(resp.text(), "not json");
        let err = resp.json::<Value>().unwrap_err();
        assert!(matches!(err, Error::Read(_)));
    }

    #[test]
    fn passive_json_yields_none_on_garbage() {
        let resp = response_with(vec![], "not json");

        assert_eq!(resp.json_opt::<Value>(), None);
    }

    #[test]
    fn json_decodes_buffered_body() {
        let resp = response_with(vec![], r#"{"ok":true,"count":3}"#);

        let value: Value = resp.json().unwrap();
        assert_eq!(value, json!({"ok": true, "count": 3}));
        assert_eq!(resp.json_opt::<Value>(), Some(json!({"ok": true, "count": 3})));
    }

    #[test]
    fn status_helpers() {
        let resp = Response::new(404, "Not Found".to_string(), vec![], String::new());

        assert_eq!(resp.status(), 404);
        assert_eq!(resp.status_message(), "Not Found");
        assert!(!resp.is_success());
        assert!(response_with(vec![], "").is_success());
    }
}
