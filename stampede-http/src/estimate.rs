//! HTTP/1.1 wire-size estimates backing the `data_sent` / `data_received` metrics.
//!
//! The client does not expose socket byte counts, so sizes are derived from the framing:
//! start line, headers, blank line and body. Reason phrases are ignored.

/// `name: value\r\n`
fn header_line(name_len: usize, value_len: usize) -> u64 {
    (name_len + 2 + value_len + 2) as u64
}

pub(crate) fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

/// `Host` value the client sends for `url` (port omitted when it is the scheme default).
pub(crate) fn host_header_value(url: &url::Url) -> Option<String> {
    let host = url.host_str()?;
    match url.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host.to_string()),
    }
}

/// Request size including the implicit `Host` and `Content-Length` headers the client adds.
pub(crate) fn request_bytes(
    method: &http::Method,
    url: &url::Url,
    headers: &[(String, String)],
    body_len: usize,
) -> u64 {
    let path = match url.query() {
        Some(q) => url.path().len() + 1 + q.len(),
        None => url.path().len(),
    };
    // METHOD SP path SP HTTP/1.1 CRLF
    let mut bytes = (method.as_str().len() + 1 + path + 1 + "HTTP/1.1".len() + 2) as u64;

    bytes += headers
        .iter()
        .map(|(k, v)| header_line(k.len(), v.len()))
        .sum::<u64>();

    if !has_header(headers, "host")
        && let Some(host) = host_header_value(url)
    {
        bytes += header_line("host".len(), host.len());
    }
    if body_len != 0 && !has_header(headers, "content-length") {
        bytes += header_line("content-length".len(), body_len.to_string().len());
    }

    bytes + 2 + body_len as u64
}

pub(crate) fn response_head_bytes(
    version: http::Version,
    status: http::StatusCode,
    headers: &http::HeaderMap,
) -> u64 {
    let version_len = match version {
        http::Version::HTTP_2 | http::Version::HTTP_3 => "HTTP/2".len(),
        _ => "HTTP/1.1".len(),
    };
    // VERSION SP 200 CRLF
    let status_line = (version_len + 1 + status.as_str().len() + 2) as u64;

    let header_bytes: u64 = headers
        .iter()
        .map(|(name, value)| header_line(name.as_str().len(), value.len()))
        .sum();

    status_line + header_bytes + 2
}
