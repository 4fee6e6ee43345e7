//! Capability codes and per-user permission sets.

use std::collections::HashSet;

pub const EVENTS_READ: &str = "events:read";
pub const EVENTS_WRITE: &str = "events:write";
pub const CARDS_READ: &str = "cards:read";
pub const CARDS_WRITE: &str = "cards:write";

/// Granted to every newly registered user.
pub const DEFAULT_GRANTS: &[&str] = &[EVENTS_READ, CARDS_READ];

/// A capability a route can demand, expressed as a type so the requirement
/// is part of the handler signature.
pub trait Capability: Send + Sync + 'static {
    const CODE: &'static str;
}

pub struct EventsRead;
pub struct EventsWrite;
pub struct CardsRead;
pub struct CardsWrite;

impl Capability for EventsRead {
    const CODE: &'static str = EVENTS_READ;
}

impl Capability for EventsWrite {
    const CODE: &'static str = EVENTS_WRITE;
}

impl Capability for CardsRead {
    const CODE: &'static str = CARDS_READ;
}

impl Capability for CardsWrite {
    const CODE: &'static str = CARDS_WRITE;
}

/// Unordered set of capability codes held by a user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(HashSet<String>);

impl Permissions {
    pub fn includes(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
