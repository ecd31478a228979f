//! Client IP extraction for hits arriving through one or more proxies
//!
//! The result is not validated as an IP address: the beacon endpoint takes
//! the header at face value and leaves malformed values to downstream
//! consumers.

use axum::http::HeaderMap;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Extract the client IP from the `X-Forwarded-For` header, falling back
/// to the connection address.
///
/// A header that isn't valid visible ASCII is treated as absent.
pub fn extract_client_ip(headers: &HeaderMap, connection_addr: &str) -> String {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|h| h.to_str().ok());

    resolve_client_ip(connection_addr, forwarded)
}

/// Pick the client IP from a raw `X-Forwarded-For` value.
///
/// - absent or empty header: the connection address, verbatim
/// - `"a, b, c"`: the last entry (`c`), the nearest proxy
/// - no `", "` separator: the whole header value, untrimmed
pub fn resolve_client_ip(connection_addr: &str, forwarded_for: Option<&str>) -> String {
    let Some(forwarded) = forwarded_for.filter(|v| !v.is_empty()) else {
        return connection_addr.to_string();
    };

    match forwarded.rsplit_once(", ") {
        Some((_, last)) => last.to_string(),
        None => forwarded.to_string(),
    }
}
