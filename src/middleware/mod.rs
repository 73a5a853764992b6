pub mod metrics;
pub mod request_id;
pub mod service_auth;

pub use metrics::metrics_middleware;
pub use request_id::request_id_middleware;
pub use service_auth::require_service_key;
