// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, catalog, results, session},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, student, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (store, config, live sessions).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let student_routes = Router::new()
        .route("/topics", get(catalog::list_topics))
        .route("/tests", get(catalog::list_active_tests))
        .route("/tests/{id}", get(catalog::get_test))
        .route("/sessions", post(session::create_session))
        .route(
            "/sessions/{id}",
            get(session::get_session).delete(session::abandon),
        )
        .route("/sessions/{id}/start", post(session::start_session))
        .route("/sessions/{id}/answer", post(session::answer))
        .route("/sessions/{id}/review", post(session::toggle_review))
        .route("/sessions/{id}/goto", post(session::go_to))
        .route("/sessions/{id}/next", post(session::next))
        .route("/results", get(results::my_results))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route(
            "/questions",
            get(admin::list_questions).post(admin::create_question),
        )
        .route("/questions/bulk", post(admin::bulk_create_questions))
        .route(
            "/questions/{id}",
            put(admin::update_question).delete(admin::delete_question),
        )
        .route(
            "/scheduled-tests",
            get(admin::list_scheduled_tests).post(admin::create_scheduled_test),
        )
        .route(
            "/scheduled-tests/{id}",
            put(admin::update_scheduled_test).delete(admin::delete_scheduled_test),
        )
        .route("/results", get(admin::list_results))
        .route("/users", get(admin::list_users))
        .route("/users/{id}", delete(admin::delete_user))
        .route("/stats", get(admin::stats))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let api = Router::new()
        .nest("/auth", auth_routes)
        .nest("/admin", admin_routes)
        .merge(student_routes);

    Router::new()
        .nest("/api", api)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
