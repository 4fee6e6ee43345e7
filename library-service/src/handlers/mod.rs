pub mod cards;
pub mod events;
pub mod health;
pub mod tokens;
pub mod users;

use crate::services::ServiceError;

/// Route ids are positive integers; anything else is simply not found.
pub(crate) fn parse_id(raw: &str) -> Result<i64, ServiceError> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(ServiceError::NotFound),
    }
}
