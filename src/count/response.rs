//! The fixed tracking-pixel response
//!
//! Every outcome of a `/count` request, success or not, answers with the
//! same 43-byte GIF so the embedding page never shows a broken image.
//! Only the status code and the `X-Beacon` diagnostic header vary.

use axum::{
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

/// 1x1 transparent GIF; the smallest image encoding (a PNG is 116 bytes).
pub const PIXEL: [u8; 43] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x01, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x0a, 0x00, 0x01, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x4c, 0x01, 0x00, 0x3b,
];

pub const DIAGNOSTIC_HEADER: &str = "x-beacon";

/// Build the pixel response with `status` and an optional diagnostic.
pub fn pixel(status: StatusCode, diagnostic: Option<&str>) -> Response {
    let mut response = (status, PIXEL.as_slice()).into_response();
    let headers = response.headers_mut();

    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/gif"));
    headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("cross-origin"),
    );
    // One request per connection; HTTP/2 turns this into GOAWAY
    headers.insert(header::CONNECTION, HeaderValue::from_static("close"));

    if let Some(msg) = diagnostic {
        headers.insert(HeaderName::from_static(DIAGNOSTIC_HEADER), header_value(msg));
    }

    response
}

/// Header values must be visible ASCII; anything else is replaced so a
/// diagnostic quoting client input can always be sent.
fn header_value(msg: &str) -> HeaderValue {
    let sanitized: String = msg
        .chars()
        .map(|c| if c == ' ' || c.is_ascii_graphic() { c } else { '?' })
        .collect();

    HeaderValue::from_str(&sanitized).unwrap_or_else(|_| HeaderValue::from_static("?"))
}
