pub mod password;
pub mod validation;

pub use password::{hash_password, password_matches, Password};
pub use validation::ValidatedJson;
