//! HTTP surface: index page, health check and the record endpoints.

pub mod auth;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::business::RecordBusiness;
use crate::context::Collaborators;

pub use auth::JwtVerifier;
pub use error::{ErrorResponse, WebError};

#[derive(Clone)]
pub struct AppState {
    pub business: RecordBusiness,
    pub verifier: Option<Arc<JwtVerifier>>,
    pub collaborators: Option<Arc<Collaborators>>,
}

impl AppState {
    pub fn new(business: RecordBusiness) -> Self {
        Self {
            business,
            verifier: None,
            collaborators: None,
        }
    }

    pub fn with_verifier(mut self, verifier: JwtVerifier) -> Self {
        self.verifier = Some(Arc::new(verifier));
        self
    }

    pub fn with_collaborators(mut self, collaborators: Arc<Collaborators>) -> Self {
        self.collaborators = Some(collaborators);
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/healthz", get(handlers::healthz))
        .route("/api/v1/records", post(handlers::create_record))
        .route("/api/v1/records/:id", get(handlers::get_record))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::request_context,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
