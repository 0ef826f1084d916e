use crate::domain::{User, UserId};

/// Identity every ledger call acts on behalf of.
///
/// There is no global "current user": callers obtain a session from
/// [`LedgerService::open_session`](super::LedgerService::open_session) and
/// pass it explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user_id: UserId,
    display_name: String,
}

impl Session {
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

impl From<&User> for Session {
    fn from(user: &User) -> Self {
        Self::new(user.id, user.full_name.clone())
    }
}
