mod health;
mod metrics;
mod send_chart;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use send_chart::{API_KEY_HEADER, send_chart_handler};

use crate::error::RelayError;

// any route that is not registered
pub async fn not_found_handler() -> RelayError {
    RelayError::NotFound
}
