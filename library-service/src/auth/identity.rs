use crate::models::User;

/// Who is making a request. `Anonymous` has no backing record and can never
/// be activated or hold a permission.
#[derive(Debug, Clone)]
pub enum Identity {
    Anonymous,
    User(User),
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::User(user) => Some(user),
        }
    }

    pub fn is_activated(&self) -> bool {
        self.user().is_some_and(|user| user.activated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_anonymous_is_never_activated() {
        let identity = Identity::Anonymous;
        assert!(identity.is_anonymous());
        assert!(identity.user().is_none());
        assert!(!identity.is_activated());
    }

    #[test]
    fn test_user_identity() {
        let identity = Identity::User(User {
            id: 1,
            created_at: Utc::now(),
            name: "Grace".into(),
            email: "grace@example.com".into(),
            password_hash: String::new(),
            activated: true,
            version: 1,
        });
        assert!(!identity.is_anonymous());
        assert!(identity.is_activated());
        assert_eq!(identity.user().map(|u| u.id), Some(1));
    }
}
