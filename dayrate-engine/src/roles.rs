use std::collections::HashSet;

use dayrate_core::UserId;

/// Admin-role lookup supplied by the surrounding identity system.
pub trait RoleDirectory: Send + Sync {
    fn is_admin(&self, user: &UserId) -> bool;
}

/// Fixed admin list, typically taken from configuration.
#[derive(Clone, Debug, Default)]
pub struct StaticRoles {
    admins: HashSet<UserId>,
}

impl StaticRoles {
    pub fn new(admins: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }
}

impl RoleDirectory for StaticRoles {
    fn is_admin(&self, user: &UserId) -> bool {
        self.admins.contains(user)
    }
}
