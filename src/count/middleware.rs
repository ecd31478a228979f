use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::error::HitError;
use super::handlers::CountState;

/// Bind the request to the site configured for its host.
///
/// The site is inserted as an `Arc<Site>` extension; requests for unknown
/// hosts still get the pixel, with a 404.
pub async fn resolve_site(
    State(state): State<Arc<CountState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(host) = request_host(request.headers(), request.uri()) else {
        return HitError::UnknownSite.into_response();
    };

    let site = match state.storage.get_site_by_host(&host).await {
        Ok(Some(site)) => site,
        Ok(None) => return HitError::UnknownSite.into_response(),
        Err(err) => return HitError::SiteLookup(err).into_response(),
    };

    request.extensions_mut().insert(Arc::new(site));
    next.run(request).await
}

/// Lowercased host without port, from `Host` or the request URI (HTTP/2)
pub fn request_host(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let raw = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| uri.host())?;

    let host = if let Some(rest) = raw.strip_prefix('[') {
        // [v6]:port
        rest.split(']').next().unwrap_or(rest)
    } else {
        raw.rsplit_once(':').map_or(raw, |(host, _)| host)
    };

    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}
