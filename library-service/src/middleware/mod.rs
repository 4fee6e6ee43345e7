pub mod auth;
pub mod metrics;
pub mod rate_limit;

pub use auth::{authenticate_middleware, Permitted};
pub use metrics::http_metrics_middleware;
pub use rate_limit::rate_limit_middleware;
