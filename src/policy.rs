use crate::catalog::{GroupRecord, ImageRecord};
use crate::domain::{GroupPermissions, UserId};

/// Authorization check consulted before any binary is removed or renamed.
pub trait DeletePolicy: Send + Sync {
    fn can_delete(&self, image: &ImageRecord, group: Option<&GroupRecord>) -> bool;
}

/// Permissions of the user a command runs on behalf of.
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub user: UserId,
    pub admin: bool,
}

impl SessionPolicy {
    pub fn new(user: UserId, admin: bool) -> Self {
        Self { user, admin }
    }
}

impl DeletePolicy for SessionPolicy {
    fn can_delete(&self, image: &ImageRecord, group: Option<&GroupRecord>) -> bool {
        if self.admin || image.owner == self.user {
            return true;
        }
        let Some(group) = group else {
            return false;
        };
        if group.leaders.contains(&self.user) {
            return true;
        }
        group.permissions == GroupPermissions::ReadWrite && group.members.contains(&self.user)
    }
}
