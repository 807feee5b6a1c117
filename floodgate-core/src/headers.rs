//! Rate-limit header constants and raw HTTP helpers.
//!
//! The proxy relays opaque bytes; the only HTTP it speaks is the minimum
//! needed to annotate responses with rate-limit metadata and to synthesize
//! rejection and failure responses. Injection is byte-level string surgery
//! on the first header block, not a protocol parse: the payload is assumed
//! to be a single HTTP-like message that fits in one buffer read.

use crate::types::RateLimitQuota;

/// Requests the client may still issue before being limited.
pub const X_RATELIMIT_REMAINING: &str = "X-Ratelimit-Remaining";

/// Total quota (bucket capacity or queue size).
pub const X_RATELIMIT_LIMIT: &str = "X-Ratelimit-Limit";

/// Seconds after which the client should retry.
pub const X_RATELIMIT_RETRY_AFTER: &str = "X-Ratelimit-Retry-After";

/// Blank line separating the header block from the body.
const HEADER_BODY_DELIMITER: &[u8] = b"\r\n\r\n";

/// Renders the three rate-limit headers as CRLF-separated lines, without a
/// trailing line break.
fn rate_limit_header_lines(quota: &RateLimitQuota) -> String {
    format!(
        "{X_RATELIMIT_REMAINING}: {}\r\n{X_RATELIMIT_LIMIT}: {}\r\n{X_RATELIMIT_RETRY_AFTER}: {}",
        quota.remaining, quota.limit, quota.retry_after_secs
    )
}

/// Appends the rate-limit headers to the first header block of a raw
/// response payload.
///
/// The payload is split on the first `\r\n\r\n`; everything before it is
/// treated as the header block. A payload without the delimiter is treated
/// as a bare header block and the headers are appended at its end.
///
/// # Example
///
/// ```
/// use floodgate_core::headers::inject_rate_limit_headers;
/// use floodgate_core::types::RateLimitQuota;
///
/// let quota = RateLimitQuota { remaining: 4, limit: 5, retry_after_secs: 1 };
/// let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
/// let annotated = inject_rate_limit_headers(raw, &quota);
/// let text = String::from_utf8(annotated).unwrap();
/// assert!(text.contains("X-Ratelimit-Remaining: 4"));
/// assert!(text.ends_with("\r\n\r\nok"));
/// ```
pub fn inject_rate_limit_headers(raw: &[u8], quota: &RateLimitQuota) -> Vec<u8> {
    let lines = rate_limit_header_lines(quota);
    let mut annotated = Vec::with_capacity(raw.len() + lines.len() + 2);
    match find_delimiter(raw) {
        Some(pos) => {
            annotated.extend_from_slice(&raw[..pos]);
            annotated.extend_from_slice(b"\r\n");
            annotated.extend_from_slice(lines.as_bytes());
            annotated.extend_from_slice(&raw[pos..]);
        }
        None => {
            annotated.extend_from_slice(raw);
            annotated.extend_from_slice(b"\r\n");
            annotated.extend_from_slice(lines.as_bytes());
        }
    }
    annotated
}

/// Minimal `429 Too Many Requests` response sent when a client exceeds its
/// quota.
pub fn too_many_requests_response(quota: &RateLimitQuota) -> Vec<u8> {
    let body = "Too many requests. Please retry later.\n";
    render_response("429 Too Many Requests", body, quota)
}

/// Synthesized `503 Service Unavailable` response sent when the backend
/// refuses the connection.
pub fn backend_unavailable_response(quota: &RateLimitQuota, backend_addr: &str) -> Vec<u8> {
    let body = format!(
        "Connection was refused. Make sure the forward server is running on {backend_addr}\n"
    );
    render_response("503 Service Unavailable", &body, quota)
}

fn render_response(status_line: &str, body: &str, quota: &RateLimitQuota) -> Vec<u8> {
    format!(
        "HTTP/1.1 {status_line}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         {}\r\n\r\n{body}",
        body.len(),
        rate_limit_header_lines(quota),
    )
    .into_bytes()
}

fn find_delimiter(raw: &[u8]) -> Option<usize> {
    raw.windows(HEADER_BODY_DELIMITER.len())
        .position(|window| window == HEADER_BODY_DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota() -> RateLimitQuota {
        RateLimitQuota {
            remaining: 3,
            limit: 5,
            retry_after_secs: 2,
        }
    }

    #[test]
    fn test_inject_before_body() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nhello";
        let annotated = String::from_utf8(inject_rate_limit_headers(raw, &quota())).unwrap();
        assert_eq!(
            annotated,
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\
             X-Ratelimit-Remaining: 3\r\nX-Ratelimit-Limit: 5\r\nX-Ratelimit-Retry-After: 2\
             \r\n\r\nhello"
        );
    }

    #[test]
    fn test_inject_without_delimiter_appends() {
        let raw = b"HTTP/1.1 204 No Content";
        let annotated = String::from_utf8(inject_rate_limit_headers(raw, &quota())).unwrap();
        assert!(annotated.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(annotated.ends_with("X-Ratelimit-Retry-After: 2"));
    }

    #[test]
    fn test_inject_only_touches_first_block() {
        // A body that itself contains a blank line must stay untouched.
        let raw = b"HTTP/1.1 200 OK\r\n\r\nfirst\r\n\r\nsecond";
        let annotated = inject_rate_limit_headers(raw, &quota());
        let text = String::from_utf8(annotated).unwrap();
        assert!(text.ends_with("\r\n\r\nfirst\r\n\r\nsecond"));
        assert_eq!(text.matches("X-Ratelimit-Limit").count(), 1);
    }

    #[test]
    fn test_inject_preserves_non_utf8_body() {
        let mut raw = b"HTTP/1.1 200 OK\r\n\r\n".to_vec();
        raw.extend_from_slice(&[0xff, 0xfe, 0x00]);
        let annotated = inject_rate_limit_headers(&raw, &quota());
        assert!(annotated.ends_with(&[0xff, 0xfe, 0x00]));
    }

    #[test]
    fn test_too_many_requests_shape() {
        let raw = too_many_requests_response(&quota());
        let text = String::from_utf8(raw).unwrap();
        assert!(text.starts_with("HTTP/1.1 429 Too Many Requests\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.contains("X-Ratelimit-Remaining: 3\r\n"));
        assert!(text.contains("X-Ratelimit-Limit: 5\r\n"));
        assert!(text.contains("X-Ratelimit-Retry-After: 2\r\n"));

        // Content-Length must match the body after the blank line.
        let (head, body) = text.split_once("\r\n\r\n").unwrap();
        let declared: usize = head
            .lines()
            .find_map(|line| line.strip_prefix("Content-Length: "))
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(declared, body.len());
    }

    #[test]
    fn test_backend_unavailable_names_backend() {
        let raw = backend_unavailable_response(&quota(), "127.0.0.1:8080");
        let text = String::from_utf8(raw).unwrap();
        assert!(text.starts_with("HTTP/1.1 503 Service Unavailable\r\n"));
        assert!(text.contains("127.0.0.1:8080"));
        assert!(text.contains("X-Ratelimit-Limit: 5\r\n"));
    }
}
