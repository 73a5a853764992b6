use axum::{
    extract::Request,
    http::{header, header::InvalidHeaderValue, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_scalar::Scalar;

use crate::{handlers, middleware, openapi::ApiDoc, AppState};

pub fn build_router(state: Arc<AppState>) -> Result<Router, InvalidHeaderValue> {
    let cors = CorsLayer::new()
        .allow_origin(state.config.cors_origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            HeaderName::from_static("x-request-id"),
        ])
        .allow_credentials(true);

    // Session issuance is reserved for the identity bridge
    let session_routes = Router::new()
        .route("/session", post(handlers::auth_handler::open_session))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_service_key,
        ));

    let auth_routes = Router::new()
        .route("/me", get(handlers::auth_handler::get_me))
        .route("/logout", post(handlers::auth_handler::logout))
        .merge(session_routes);

    let user_routes = Router::new()
        .route(
            "/",
            get(handlers::users_handler::get_users).post(handlers::users_handler::create_user),
        )
        .route("/{id}", get(handlers::users_handler::get_user));

    let accommodation_routes = Router::new()
        .route(
            "/",
            get(handlers::accommodations_handler::get_accommodations)
                .post(handlers::accommodations_handler::create_accommodation),
        )
        .route("/{id}", get(handlers::accommodations_handler::get_accommodation))
        .route("/{id}/commands", post(handlers::accommodations_handler::apply_command))
        .route("/{id}/events", get(handlers::accommodations_handler::get_accommodation_events));

    let admission_routes = Router::new()
        .route("/", get(handlers::admissions_handler::get_admissions))
        .route("/{id}", get(handlers::admissions_handler::get_admission))
        .route("/{id}/charges", get(handlers::admissions_handler::get_admission_charges))
        .route("/{id}/invoice", post(handlers::admissions_handler::create_admission_invoice))
        .route(
            "/{id}/discharge",
            get(handlers::discharge_handler::get_discharge_status)
                .post(handlers::discharge_handler::initiate_discharge),
        )
        .route("/{id}/discharge/{step}", post(handlers::discharge_handler::clear_step));

    let patient_record_routes = Router::new()
        .route(
            "/{id}/prescriptions",
            get(handlers::prescriptions_handler::get_patient_prescriptions),
        )
        .route("/{id}/lab-results", get(handlers::lab_results_handler::get_patient_lab_results))
        .route("/{id}/bills", get(handlers::bills_handler::get_patient_bills));

    let bill_routes = Router::new()
        .route("/", post(handlers::bills_handler::create_bill))
        .route("/{id}/pay", post(handlers::bills_handler::pay_bill));

    let message_routes = Router::new()
        .route(
            "/",
            get(handlers::messages_handler::get_inbox).post(handlers::messages_handler::send_message),
        )
        .route("/{id}/read", post(handlers::messages_handler::mark_read));

    let router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .nest("/api/auth", auth_routes)
        .nest("/api/users", user_routes)
        .nest("/api/accommodations", accommodation_routes)
        .nest("/api/admissions", admission_routes)
        .nest("/api/patients", patient_record_routes)
        .route("/api/prescriptions", post(handlers::prescriptions_handler::create_prescription))
        .route("/api/lab-results", post(handlers::lab_results_handler::create_lab_result))
        .nest("/api/bills", bill_routes)
        .nest("/api/messages", message_routes)
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .route("/docs", get(api_reference))
        .layer(axum_middleware::from_fn(middleware::metrics_middleware))
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
            )
        }))
        .layer(cors)
        .with_state(state);

    Ok(router)
}

async fn api_reference() -> Html<String> {
    Html(Scalar::new(ApiDoc::openapi()).to_html())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::SessionStore, config::AppConfig, handlers::metrics::detached_metrics_state};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        let config = AppConfig {
            // Never connected: these tests stop before any query runs
            database_url: "postgres://localhost/hms_router_test".to_string(),
            session_secret: "0123456789abcdef0123456789abcdef".to_string(),
            service_api_key: "bridge-key".to_string(),
            session_idle_timeout: Duration::from_secs(60),
            session_max_age: Duration::from_secs(3600),
            bind_addr: "127.0.0.1:0".to_string(),
            cors_origin: "http://localhost:3000".to_string(),
        };

        let db = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();

        Arc::new(AppState {
            db,
            sessions: SessionStore::new(config.session_idle_timeout),
            config,
            metrics: Arc::new(detached_metrics_state()),
        })
    }

    #[tokio::test]
    async fn test_missing_bearer_is_unauthorized() {
        let app = build_router(test_state()).unwrap();

        let response = app
            .oneshot(Request::builder().uri("/api/auth/me").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_session_requires_service_key() {
        let app = build_router(test_state()).unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/session")
                    .header("content-type", "application/json")
                    .header("X-Service-Key", "wrong-key")
                    .body(Body::from(r#"{"display_id":"U0001"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_closed_session_token_rejected() {
        let state = test_state();
        let app = build_router(state.clone()).unwrap();

        // A correctly signed token whose session was never opened
        let user = crate::models::User {
            id: 3,
            display_id: "S0001".to_string(),
            role: crate::models::Role::Staff,
            full_name: "Ward Clerk".to_string(),
            email: None,
            is_active: true,
            created_at: chrono::Utc::now(),
        };
        let (token, _) = crate::auth::issue_token(
            &user,
            uuid::Uuid::new_v4(),
            &state.config.session_secret,
            state.config.session_max_age,
        )
        .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/accommodations")
                    .header("Authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_openapi_document_served() {
        let app = build_router(test_state()).unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api-docs/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_incoming_request_id_is_echoed() {
        let app = build_router(test_state()).unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/auth/me")
                    .header("X-Request-ID", "ward-7-trace")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()["x-request-id"], "ward-7-trace");
    }

    #[tokio::test]
    async fn test_api_reference_page_served() {
        let app = build_router(test_state()).unwrap();

        let response = app
            .oneshot(Request::builder().uri("/docs").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/html"));
    }

    #[tokio::test]
    async fn test_bad_cors_origin_is_an_error() {
        let state = test_state();
        let mut config = state.config.clone();
        config.cors_origin = "bad\norigin".to_string();
        let state = Arc::new(AppState {
            db: state.db.clone(),
            sessions: state.sessions.clone(),
            config,
            metrics: state.metrics.clone(),
        });

        assert!(build_router(state).is_err());
    }
}
