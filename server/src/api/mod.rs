mod banks;
pub mod device;
mod error;
mod tag;

use std::sync::Arc;

use axum::Router;

use crate::AppState;

pub use error::ApiError;

/// Build the API router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/banks", banks::router())
        .nest("/device", device::router())
        .nest("/tag", tag::router())
}
