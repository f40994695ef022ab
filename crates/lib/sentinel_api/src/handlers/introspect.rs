//! Token introspection for trusted backends.

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::models::{IntrospectRequest, IntrospectResponse};

/// `POST /internal/introspect`: `{ active, claims? }` and never a reason.
pub async fn introspect_handler(
    State(state): State<AppState>,
    Json(body): Json<IntrospectRequest>,
) -> Json<IntrospectResponse> {
    Json(state.auth.tokens().introspect(&body.token).await)
}
