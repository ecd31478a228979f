//! Rejections on the pixel endpoint
//!
//! All of these are request-scoped: they end up as the normal pixel
//! response with a non-2xx status and the reason in `X-Beacon`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::response::pixel;
use crate::models::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum HitError {
    /// Query string or JSON body could not be decoded
    #[error("error decoding parameters: {0}")]
    BodyDecode(String),

    /// Client bot code in the reserved 1..=149 range
    #[error("wrong value: b={0}")]
    InvalidBotCode(i64),

    #[error("ignored because path is longer than 2048 bytes ({0} bytes)")]
    OversizedPath(usize),

    #[error("not valid: {0}")]
    Validation(#[from] ValidationError),

    /// No site is configured for the request host
    #[error("no site at this domain")]
    UnknownSite,

    #[error("error looking up site")]
    SiteLookup(#[source] anyhow::Error),
}

impl HitError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BodyDecode(_) | Self::InvalidBotCode(_) | Self::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::OversizedPath(_) => StatusCode::URI_TOO_LONG,
            Self::UnknownSite => StatusCode::NOT_FOUND,
            Self::SiteLookup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HitError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::SiteLookup(err) => tracing::error!(error = %err, "site lookup failed"),
            _ => tracing::debug!(status = status.as_u16(), reason = %self, "hit rejected"),
        }

        pixel(status, Some(&self.to_string()))
    }
}
