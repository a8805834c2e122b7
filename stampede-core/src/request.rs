use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use stampede_http::{HttpResponse, HttpTransportErrorKind};

use crate::scenario::{ScenarioError, ScenarioResult};

/// Terminal transport failure of one call: no HTTP status was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: HttpTransportErrorKind,
    pub message: String,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Outcome of one HTTP call as seen by the scenario. Any status, including 5xx, is a
/// transport success; judging it is left to checks.
#[derive(Debug, Clone)]
pub struct RequestResult {
    pub name: String,
    pub method: http::Method,
    pub url: String,
    /// `None` when the call failed before a response arrived.
    pub status: Option<u16>,
    pub latency: Duration,
    pub body: Bytes,
    pub headers: Vec<(String, String)>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub error: Option<TransportError>,
}

impl RequestResult {
    pub(crate) fn from_response(
        name: String,
        method: http::Method,
        url: String,
        latency: Duration,
        res: HttpResponse,
    ) -> Self {
        Self {
            name,
            method,
            url,
            status: Some(res.status),
            latency,
            body: res.body,
            headers: res.headers,
            bytes_sent: res.bytes_sent,
            bytes_received: res.bytes_received,
            error: None,
        }
    }

    pub(crate) fn from_error(
        name: String,
        method: http::Method,
        url: String,
        latency: Duration,
        err: &stampede_http::Error,
    ) -> Self {
        Self {
            name,
            method,
            url,
            status: None,
            latency,
            body: Bytes::new(),
            headers: Vec::new(),
            bytes_sent: 0,
            bytes_received: 0,
            error: Some(TransportError {
                kind: err.transport_error_kind(),
                message: err.to_string(),
            }),
        }
    }

    pub fn is_transport_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn status_is(&self, code: u16) -> bool {
        self.status == Some(code)
    }

    /// What `http_req_failed` counts as a failure.
    pub fn is_failed(&self) -> bool {
        !matches!(self.status, Some(200..=399))
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }

    pub fn body_bytes(&self) -> usize {
        self.body.len()
    }

    pub fn body_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json<T: DeserializeOwned>(&self) -> ScenarioResult<T> {
        serde_json::from_slice(&self.body).map_err(ScenarioError::from)
    }

    /// Looks up an RFC 6901 pointer (e.g. `/id`) in a JSON body. `None` if the body is not
    /// JSON or the pointer does not resolve.
    pub fn json_value(&self, pointer: &str) -> Option<serde_json::Value> {
        let doc: serde_json::Value = serde_json::from_slice(&self.body).ok()?;
        doc.pointer(pointer).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_result(status: u16, body: &'static str) -> RequestResult {
        RequestResult::from_response(
            "orders".to_string(),
            http::Method::POST,
            "http://localhost/api/orders".to_string(),
            Duration::from_millis(12),
            HttpResponse {
                status,
                body: Bytes::from_static(body.as_bytes()),
                headers: vec![("content-type".to_string(), "application/json".to_string())],
                bytes_sent: 10,
                bytes_received: 20,
            },
        )
    }

    #[test]
    fn failure_classification_follows_status() {
        assert!(!ok_result(201, "{}").is_failed());
        assert!(!ok_result(302, "{}").is_failed());
        assert!(ok_result(404, "{}").is_failed());
        assert!(ok_result(500, "{}").is_failed());
    }

    #[test]
    fn transport_errors_have_no_status() {
        let err = stampede_http::Error::Timeout(Duration::from_secs(1));
        let res = RequestResult::from_error(
            "health".to_string(),
            http::Method::GET,
            "http://localhost/".to_string(),
            Duration::from_secs(1),
            &err,
        );
        assert!(res.is_transport_error());
        assert!(res.is_failed());
        assert_eq!(res.status, None);
        assert_eq!(
            res.error.as_ref().map(|e| e.kind),
            Some(HttpTransportErrorKind::Timeout)
        );
    }

    #[test]
    fn json_helpers_read_the_body() {
        let res = ok_result(201, r#"{"id":42,"status":"CREATED"}"#);
        assert_eq!(res.json_value("/id").and_then(|v| v.as_u64()), Some(42));
        assert!(res.json_value("/missing").is_none());
        let doc: serde_json::Value = res.json().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(doc["status"], "CREATED");
        assert_eq!(res.header("Content-Type"), Some("application/json"));
        assert!((res.latency_ms() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_json_is_a_scenario_error() {
        let res = ok_result(200, "not json");
        let err = match res.json::<serde_json::Value>() {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert_eq!(err.kind(), "json");
    }
}
