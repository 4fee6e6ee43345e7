use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use service_core::error::AppError;
use std::borrow::Cow;
use validator::{Validate, ValidationError};

/// JSON body that has passed its `Validate` rules. Parse failures are 400,
/// rule violations 422.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e: JsonRejection| AppError::BadRequest(anyhow::anyhow!(e.body_text())))?;

        value.validate()?;

        Ok(ValidatedJson(value))
    }
}

fn failure(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

pub fn no_empty_blocks(blocks: &[String]) -> Result<(), ValidationError> {
    if blocks.iter().any(|block| block.trim().is_empty()) {
        return Err(failure("empty_block", "must not contain empty text blocks"));
    }
    Ok(())
}

pub fn not_in_past(date: &NaiveDate) -> Result<(), ValidationError> {
    if *date < Utc::now().date_naive() {
        return Err(failure("past_date", "must not be in the past"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    #[test]
    fn test_blank_blocks_rejected() {
        assert!(no_empty_blocks(&["intro".to_string(), "body".to_string()]).is_ok());
        let err = no_empty_blocks(&["intro".to_string(), "  ".to_string()]).unwrap_err();
        assert_eq!(err.message.unwrap(), "must not contain empty text blocks");
    }

    #[test]
    fn test_today_is_not_in_the_past() {
        let today = Utc::now().date_naive();
        assert!(not_in_past(&today).is_ok());
        assert!(not_in_past(&(today + Days::new(30))).is_ok());
        assert!(not_in_past(&(today - Days::new(1))).is_err());
    }
}
