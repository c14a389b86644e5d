use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    AppState, borrow_book, create_book, create_member, delete_book, delete_member, get_book,
    get_member, health_check, list_books, list_borrows, list_members, readiness_check, return_book,
    update_book, update_member,
};

/// Creates the API router with all library endpoints under `/api/library`
///
/// Circulation endpoints:
/// - POST /borrow - Borrow a book
/// - POST /return - Return a book
/// - GET  /borrow - List the borrow ledger
///
/// Directory endpoints:
/// - POST /book, GET /book
/// - GET /book/:code, PUT /book/:code, DELETE /book/:code
/// - POST /member, GET /member
/// - GET /member/:code, PUT /member/:code, DELETE /member/:code
///
/// Health:
/// - GET /health - Liveness
/// - GET /ready - Store reachable
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let library = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/book", post(create_book).get(list_books))
        .route(
            "/book/:code",
            get(get_book).put(update_book).delete(delete_book),
        )
        .route("/member", post(create_member).get(list_members))
        .route(
            "/member/:code",
            get(get_member).put(update_member).delete(delete_member),
        )
        .route("/borrow", post(borrow_book).get(list_borrows))
        .route("/return", post(return_book));

    Router::new()
        .nest("/api/library", library)
        // Add tracing middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Add application state
        .with_state(state)
}
