pub mod concurrency;
pub mod email;
pub mod error;
pub mod metrics;

pub use concurrency::ConcurrencyGuard;
pub use email::{deliver_in_background, LogMailer, Mailer, MemoryMailer};
pub use error::ServiceError;
