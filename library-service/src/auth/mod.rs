pub mod authenticator;
pub mod authorizer;
pub mod identity;
pub mod token;

pub use authenticator::Authenticator;
pub use authorizer::Authorizer;
pub use identity::Identity;
pub use token::{IssuedToken, TokenCodec, TokenHash};
