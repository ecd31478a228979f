//! The `/count` pixel endpoint

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod pipeline;
pub mod response;
pub mod routes;

pub use error::HitError;
pub use pipeline::{BeaconRequest, Outcome, Pipeline};
pub use response::{DIAGNOSTIC_HEADER, PIXEL};
pub use routes::create_count_router;
