use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::response::json_error;
use crate::state::AppState;

/// Verifies the caller's token and stashes the resolved user in request
/// extensions for the handler.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = crate::auth::extract_token(req.headers());
    let Some(token) = token else {
        return json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "missing auth token")
            .into_response();
    };

    let Some(db) = state.db() else {
        return json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "database unavailable",
        )
        .into_response();
    };

    match crate::auth::verify_request_token(db.as_ref(), &token).await {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(_err) => json_error(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "authentication failed, please sign in again",
        )
        .into_response(),
    }
}

/// Same as `require_auth` but lets unauthenticated requests through without
/// a user extension. Public read endpoints use this so they can personalize
/// when a token happens to be present.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = crate::auth::extract_token(req.headers());
    let Some(token) = token else {
        return next.run(req).await;
    };

    let Some(db) = state.db() else {
        return next.run(req).await;
    };

    if let Ok(user) = crate::auth::verify_request_token(db.as_ref(), &token).await {
        req.extensions_mut().insert(user);
    }

    next.run(req).await
}
