use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod flow;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;

pub use config::Config;
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; \
             script-src 'self' 'unsafe-inline'; \
             style-src 'self' 'unsafe-inline'; \
             img-src 'self' data: https:; \
             connect-src 'self'",
        ),
    );
    response
}

pub fn create_router(app_state: std::sync::Arc<services::AppState>) -> Router {
    // CORS for the filling frontend, which is served from its own origin
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any); // TODO: restrict to the frontend origin in production

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/public", public_routes(app_state.clone()).layer(cors))
        // Review surface (requires admin JWT)
        .nest(
            "/admin/submissions",
            admin_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .with_state(app_state)
        .layer(middleware::from_fn(csp_middleware)) // Apply CSP to all responses
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn public_routes(
    app_state: std::sync::Arc<services::AppState>,
) -> Router<std::sync::Arc<services::AppState>> {
    // The submit route carries the per-IP daily quota; reads are uncapped
    let submit_route = Router::new()
        .route(
            "/surveys/{code}/submit",
            post(handlers::public::submit_survey),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::rate_limit::submit_rate_limit_middleware,
        ));

    Router::new()
        .route("/surveys/{code}", get(handlers::public::get_survey))
        .route(
            "/security-config",
            get(handlers::public::get_security_config),
        )
        .route(
            "/submissions/status",
            get(handlers::public::query_status),
        )
        .merge(submit_route)
}

fn admin_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route("/", get(handlers::admin::list_submissions))
        .route("/stats/overview", get(handlers::admin::stats_overview))
        .route("/{id}", get(handlers::admin::get_submission))
        .route("/{id}/review", patch(handlers::admin::review_submission))
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ))
}
