//! Origin validation for the HTTP transport.
//!
//! Browsers attach an `Origin` header to cross-site requests. Only pages
//! served from the local machine may talk to the server; requests without
//! an `Origin` (CLI clients, server-to-server) pass through.

use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use reqwest::Url;
use tracing::warn;

use super::{ErrorBody, RequestId};

/// Hosts an `Origin` may name.
pub const ALLOWED_ORIGIN_HOSTS: [&str; 4] = ["localhost", "127.0.0.1", "0.0.0.0", "[::1]"];

/// Whether `origin` names a local host.
pub fn is_allowed_origin(origin: &str) -> bool {
    match Url::parse(origin) {
        Ok(url) => url
            .host_str()
            .is_some_and(|host| ALLOWED_ORIGIN_HOSTS.contains(&host)),
        Err(_) => false,
    }
}

/// Reject requests whose `Origin` is not local with 403.
pub async fn validate_origin(request: Request, next: Next) -> Response {
    if let Some(origin) = request.headers().get(header::ORIGIN) {
        let allowed = origin.to_str().map(is_allowed_origin).unwrap_or(false);
        if !allowed {
            let request_id = request
                .extensions()
                .get::<RequestId>()
                .cloned()
                .unwrap_or_else(RequestId::generate);
            warn!(request_id = %request_id, origin = ?origin, "Rejected request with invalid origin");
            return ErrorBody::new("Invalid origin", &request_id).into_response(StatusCode::FORBIDDEN);
        }
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_origins_allowed() {
        assert!(is_allowed_origin("http://localhost:3000"));
        assert!(is_allowed_origin("http://127.0.0.1"));
        assert!(is_allowed_origin("https://0.0.0.0:8443"));
        assert!(is_allowed_origin("http://[::1]:3000"));
    }

    #[test]
    fn test_remote_origins_rejected() {
        assert!(!is_allowed_origin("https://evil.example.com"));
        assert!(!is_allowed_origin("http://localhost.evil.com"));
        assert!(!is_allowed_origin("http://evil.com/?localhost"));
        assert!(!is_allowed_origin("null"));
        assert!(!is_allowed_origin(""));
    }
}
