pub mod cards;
pub mod events;
pub mod users;

pub use cards::{CreateCardRequest, UpdateCardRequest};
pub use events::{CreateEventRequest, EventInput, ListEventsParams, UpdateEventRequest};
pub use users::{
    ActivateUserRequest, AuthenticationTokenRequest, ActivationTokenRequest, RegisterUserRequest,
};
