use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, ConnectInfo, State},
    http::{header::HeaderMap, Uri},
    response::{IntoResponse, Response},
    Extension,
};
use std::net::SocketAddr;
use std::sync::Arc;

use super::error::HitError;
use super::pipeline::{BeaconRequest, Pipeline};
use crate::models::Site;
use crate::storage::Storage;

pub struct CountState {
    pub storage: Arc<dyn Storage>,
    pub pipeline: Pipeline,
}

/// Record a hit; GET and POST are handled the same way
pub async fn count(
    State(state): State<Arc<CountState>>,
    Extension(site): Extension<Arc<Site>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => return HitError::BodyDecode(rejection.body_text()).into_response(),
    };

    let connection_addr = addr.ip().to_string();
    let request = BeaconRequest {
        connection_addr: &connection_addr,
        headers: &headers,
        uri: &uri,
        body: &body,
    };

    match state.pipeline.process(&site, &request) {
        Ok(outcome) => outcome.into_response(),
        Err(err) => err.into_response(),
    }
}
