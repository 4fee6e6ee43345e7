pub mod card;
pub mod event;
pub mod filters;
pub mod permission;
pub mod token;
pub mod user;

pub use card::{Card, CardRecord};
pub use event::{Event, NewEvent};
pub use filters::{EventQuery, Filters, Metadata, SortDirection};
pub use permission::{Capability, Permissions};
pub use token::{TokenRecord, TokenScope};
pub use user::{NewUser, User};
