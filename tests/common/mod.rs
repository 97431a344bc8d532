use axum::Router;

pub async fn create_test_app() -> Router {
    std::env::set_var("APP_ENV", "test");
    std::env::set_var("DATABASE_URL", "");
    std::env::set_var("JWT_SECRET", "test-secret");

    openlearn_backend::create_app().await
}
