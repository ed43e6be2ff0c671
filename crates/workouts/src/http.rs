//! Blocking HTTP transport
//!
//! Uses synchronous HTTP (ureq) to be executor-agnostic. Status codes are
//! returned as data rather than raised, because the fetcher branches on
//! 304/401 and must keep the body of error responses.

use std::time::Duration;

use crate::error::{Error, Result, TransportErrorKind};

/// Minimal view of an HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub etag: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            etag: None,
            body: body.into(),
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Body as text for error reporting
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Network seam between the engine and the remote API
pub trait HttpTransport: Send + Sync {
    /// GET `url` with the given extra headers
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse>;

    /// POST an `application/x-www-form-urlencoded` body
    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse>;
}

/// ureq-backed transport with a bounded per-call timeout
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

    pub fn new(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}

impl HttpTransport for UreqTransport {
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse> {
        let mut request = self.agent.get(url).header("Accept", "application/json");
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request.call().map_err(transport_error)?;
        read_response(response)
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse> {
        let response = self
            .agent
            .post(url)
            .header("Accept", "application/json")
            .send_form(form.iter().copied())
            .map_err(transport_error)?;
        read_response(response)
    }
}

fn read_response(mut response: ureq::http::Response<ureq::Body>) -> Result<HttpResponse> {
    let status = response.status().as_u16();
    let etag = response
        .headers()
        .get("etag")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = response.body_mut().read_to_vec().map_err(transport_error)?;
    Ok(HttpResponse { status, etag, body })
}

fn transport_error(err: ureq::Error) -> Error {
    let kind = match &err {
        ureq::Error::Timeout(_) => TransportErrorKind::Timeout,
        ureq::Error::HostNotFound => TransportErrorKind::Dns,
        ureq::Error::ConnectionFailed => TransportErrorKind::Connection,
        ureq::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
            TransportErrorKind::Timeout
        }
        ureq::Error::Io(_) => TransportErrorKind::Connection,
        _ => TransportErrorKind::Other,
    };
    Error::Transport {
        kind,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_status_helpers() {
        assert!(HttpResponse::new(200, "[]").is_success());
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(304, "").is_success());
        assert!(HttpResponse::new(304, "").is_not_modified());
        assert!(HttpResponse::new(401, "").is_unauthorized());
    }

    #[test]
    fn test_body_text_is_lossy() {
        let response = HttpResponse::new(500, vec![b'o', b'k', 0xff]);
        assert_eq!(response.body_text(), "ok\u{fffd}");
    }

    #[test]
    fn test_connection_refused_is_transient() {
        // Port 9 (discard) on localhost is closed on typical test machines
        let transport = UreqTransport::new(Duration::from_secs(2));
        let err = transport.get("http://127.0.0.1:9/", &[]).unwrap_err();
        match err {
            Error::Transport { kind, .. } => assert!(kind.is_transient()),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
