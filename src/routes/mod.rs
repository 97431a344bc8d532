mod analytics;
mod auth;
mod courses;
mod enrollments;
mod forum;
mod health;
mod news;
mod progress;
mod quizzes;
mod users;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::db::Database;
use crate::middleware::auth::{optional_auth, require_auth};
use crate::middleware::rate_limit::{api_rate_limit_middleware, auth_rate_limit_middleware};
use crate::response::{json_error, AppError};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let authed = |router: Router<AppState>| {
        router.layer(middleware::from_fn_with_state(state.clone(), require_auth))
    };
    let maybe_authed = |router: Router<AppState>| {
        router.layer(middleware::from_fn_with_state(state.clone(), optional_auth))
    };

    let mut app = Router::new()
        .nest("/api/auth", auth::router())
        .nest("/api/users", authed(users::router()))
        .nest("/api/courses", maybe_authed(courses::router()))
        .nest("/api/enrollments", authed(enrollments::router()))
        .nest("/api/progress", authed(progress::router()))
        .nest("/api/quizzes", authed(quizzes::router()))
        .nest("/api/forum", authed(forum::router()))
        .nest("/api/news", maybe_authed(news::router()))
        .nest("/api/analytics", authed(analytics::router()));

    app = app.nest("/health", health::router());
    app = app.nest("/api/health", health::router());

    app.layer(middleware::from_fn(auth_rate_limit_middleware))
        .layer(middleware::from_fn(api_rate_limit_middleware))
        .fallback(fallback_handler)
        .with_state(state)
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "route does not exist").into_response()
}

pub(crate) fn require_db(state: &AppState) -> Result<Arc<Database>, AppError> {
    state.db().ok_or_else(|| {
        json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "database unavailable",
        )
    })
}
