use std::time::Duration;

use bytes::Bytes;

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Overrides the client's request timeout for this call.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: http::Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(http::Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(http::Method::POST, url).with_body(body)
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
    /// Lower-cased header names. Repeated headers are joined with ", ".
    pub headers: Vec<(String, String)>,
    /// Estimated HTTP/1.1 bytes on the wire for the request.
    pub bytes_sent: u64,
    /// Estimated HTTP/1.1 bytes on the wire for the response head and body.
    pub bytes_received: u64,
}

impl HttpResponse {
    pub fn body_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let req = HttpRequest::post("http://localhost/api/orders", "{}")
            .with_header("Content-Type", "application/json")
            .with_timeout(Duration::from_secs(2));
        assert_eq!(req.method, http::Method::POST);
        assert_eq!(req.body.as_ref(), b"{}");
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn header_lookup_ignores_case() {
        let res = HttpResponse {
            status: 200,
            body: Bytes::from_static(b"ok"),
            headers: vec![("content-type".to_string(), "text/plain".to_string())],
            bytes_sent: 0,
            bytes_received: 0,
        };
        assert_eq!(res.header("Content-Type"), Some("text/plain"));
        assert_eq!(res.body_utf8(), Some("ok"));
    }
}
