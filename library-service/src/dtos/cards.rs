use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCardRequest {
    #[validate(length(min = 1, max = 200, message = "must be provided and not more than 200 bytes long"))]
    pub title: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCardRequest {
    #[validate(length(min = 1, max = 200, message = "must be provided and not more than 200 bytes long"))]
    pub title: Option<String>,

    pub version: Option<i32>,
}
