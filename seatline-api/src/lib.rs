use axum::{
    http::Method,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod error;
pub mod middleware;
pub mod reservations;
pub mod routes;
pub mod state;
pub mod trips;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let passenger_routes = Router::new()
        .merge(reservations::routes())
        .merge(routes::routes())
        .merge(trips::routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::user_auth_middleware,
        ));

    let admin_routes = admin::routes().route_layer(axum::middleware::from_fn_with_state(
        state.clone(),
        middleware::admin_auth_middleware,
    ));

    Router::new()
        .route("/health", get(health))
        .merge(passenger_routes)
        .merge(admin_routes)
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::rate_limit_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
