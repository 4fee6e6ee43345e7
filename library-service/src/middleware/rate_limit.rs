use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use service_core::middleware::rate_limit::client_ip;

use crate::services::metrics::RATE_LIMITED_TOTAL;
use crate::services::ServiceError;
use crate::startup::AppState;

/// Admit or reject the request against the caller's bucket. Requests whose
/// client address cannot be determined are let through.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.limiter.settings().enabled {
        return Ok(next.run(req).await);
    }

    let Some(ip) = client_ip(&req) else {
        tracing::warn!(uri = %req.uri(), "Client address unknown, skipping rate limit");
        return Ok(next.run(req).await);
    };

    if let Err(wait) = state.limiter.check(&ip.to_string()) {
        let route = req
            .extensions()
            .get::<MatchedPath>()
            .map(|path| path.as_str().to_string())
            .unwrap_or_else(|| "unmatched".to_string());

        tracing::warn!(client_ip = %ip, route = %route, "Rate limit exceeded");
        RATE_LIMITED_TOTAL.with_label_values(&[&route]).inc();

        let retry_after_secs = Some(wait.as_secs_f64().ceil().max(1.0) as u64);
        return Err(ServiceError::RateLimited { retry_after_secs }.into());
    }

    Ok(next.run(req).await)
}
