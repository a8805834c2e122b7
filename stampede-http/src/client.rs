use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::collections::BTreeMap;
use std::time::Duration;

use super::estimate::{has_header, host_header_value, request_bytes, response_head_bytes};
use super::{Error, HttpRequest, HttpResponse, Result};

/// OS-level TCP connect timeouts run to tens of seconds; unreachable targets should fail fast.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Pooled HTTP/1.1 client shared by every virtual user of a run.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    request_timeout: Duration,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_connect_timeout(Some(connect_timeout));

        let https_connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let inner = Client::builder(TokioExecutor::new()).build(https_connector);

        Self {
            inner,
            request_timeout,
        }
    }

    /// Sends `req` and reads the full response body.
    ///
    /// The timeout (per-request override or the client default) bounds the whole exchange,
    /// connect and body read included. Any HTTP status is a successful result.
    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        let timeout = req.timeout.unwrap_or(self.request_timeout);
        match tokio::time::timeout(timeout, self.exchange(req)).await {
            Ok(res) => res,
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }

    async fn exchange(&self, req: HttpRequest) -> Result<HttpResponse> {
        let parsed = url::Url::parse(&req.url).map_err(|_| Error::InvalidUrl(req.url.clone()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::UnsupportedScheme(req.url));
        }

        let bytes_sent = request_bytes(&req.method, &parsed, &req.headers, req.body.len());

        let uri: hyper::Uri = parsed
            .as_str()
            .parse()
            .map_err(|_| Error::InvalidUrl(req.url.clone()))?;

        let mut builder = Request::builder().method(req.method).uri(uri);

        // Host and Content-Length are sent explicitly so the byte estimate matches the wire.
        if !has_header(&req.headers, "host")
            && let Some(host) = host_header_value(&parsed)
        {
            builder = builder.header(http::header::HOST, host);
        }
        if !req.body.is_empty() && !has_header(&req.headers, "content-length") {
            builder = builder.header(http::header::CONTENT_LENGTH, req.body.len());
        }

        for (k, v) in &req.headers {
            let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
            let value = http::header::HeaderValue::from_str(v)?;
            builder = builder.header(name, value);
        }

        let request = builder.body(Full::new(req.body))?;
        let (parts, body) = self.inner.request(request).await?.into_parts();

        let mut merged: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in parts.headers.iter() {
            let v = String::from_utf8_lossy(value.as_bytes());
            merged
                .entry(name.as_str().to_ascii_lowercase())
                .and_modify(|cur| {
                    cur.push_str(", ");
                    cur.push_str(&v);
                })
                .or_insert_with(|| v.to_string());
        }

        let head_bytes = response_head_bytes(parts.version, parts.status, &parts.headers);
        let body = body.collect().await?.to_bytes();

        Ok(HttpResponse {
            status: parts.status.as_u16(),
            bytes_received: head_bytes.saturating_add(body.len() as u64),
            body,
            headers: merged.into_iter().collect(),
            bytes_sent,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::HttpTransportErrorKind;
    use stampede_testserver::TestServer;
    use std::time::Instant;

    #[tokio::test]
    async fn unreachable_host_fails_fast_with_connect_timeout() {
        let client = HttpClient::new(Duration::from_millis(200), DEFAULT_REQUEST_TIMEOUT);
        let req = HttpRequest::get("http://192.0.2.1:81/");

        let started = Instant::now();
        let _err = client.request(req).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(
            elapsed < Duration::from_secs(2),
            "expected fast failure, elapsed={elapsed:?}"
        );
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_error() {
        // Bind and drop to obtain a local port with no listener.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpClient::default();
        let err = client.request(HttpRequest::get(format!("http://{addr}/"))).await.unwrap_err();
        assert_eq!(err.transport_error_kind(), HttpTransportErrorKind::Connect);
    }

    #[tokio::test]
    async fn non_2xx_status_is_not_an_error() {
        let server = TestServer::start().await.unwrap();
        let client = HttpClient::default();

        let res = client
            .request(HttpRequest::get(server.urls().status(503)))
            .await.unwrap();
        assert_eq!(res.status, 503);
        assert!(res.bytes_received > 0);
        assert!(res.bytes_sent > 0);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn per_request_timeout_covers_slow_responses() {
        let server = TestServer::start().await.unwrap();
        let client = HttpClient::default();

        let req = HttpRequest::get(server.urls().hang.clone())
            .with_timeout(Duration::from_millis(100));
        let started = Instant::now();
        let err = client.request(req).await.unwrap_err();

        assert_eq!(err.transport_error_kind(), HttpTransportErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(5));

        server.shutdown().await;
    }

    #[tokio::test]
    async fn unsupported_scheme_is_rejected() {
        let client = HttpClient::default();
        let err = client
            .request(HttpRequest::get("ftp://localhost/file"))
            .await.unwrap_err();
        assert_eq!(
            err.transport_error_kind(),
            HttpTransportErrorKind::UnsupportedScheme
        );
    }
}
