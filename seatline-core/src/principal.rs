use serde::{Deserialize, Serialize};
use seatline_shared::UserId;

/// Role claim issued by the authentication provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn user(user_id: impl Into<UserId>) -> Self {
        Self { user_id: user_id.into(), role: Role::User }
    }

    pub fn admin(user_id: impl Into<UserId>) -> Self {
        Self { user_id: user_id.into(), role: Role::Admin }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins act on anyone's records, users only on their own.
    pub fn may_act_for(&self, owner: &UserId) -> bool {
        self.is_admin() || &self.user_id == owner
    }
}
