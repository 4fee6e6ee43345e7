use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterUserRequest {
    #[validate(length(min = 1, max = 500, message = "must be provided and not more than 500 bytes long"))]
    pub name: String,

    #[validate(email(message = "must be a valid email address"))]
    pub email: String,

    #[validate(length(min = 8, max = 72, message = "must be between 8 and 72 bytes long"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ActivateUserRequest {
    #[validate(length(min = 1, message = "must be provided"))]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ActivationTokenRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AuthenticationTokenRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,

    #[validate(length(min = 1, message = "must be provided"))]
    pub password: String,
}
