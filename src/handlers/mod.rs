pub mod accommodations_handler;
pub mod admissions_handler;
pub mod auth_handler;
pub mod bills_handler;
pub mod discharge_handler;
pub mod health;
pub mod lab_results_handler;
pub mod messages_handler;
pub mod metrics;
pub mod prescriptions_handler;
pub mod users_handler;

pub use health::health_check;
pub use metrics::{metrics_handler, setup_metrics_recorder, MetricsState};
