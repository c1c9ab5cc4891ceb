//! Capability checks and the manual-send boundary.
//!
//! Ownership grants everything on one's own objects. Managers see
//! everything, may disable or trigger any mailing, edit any message or
//! recipient, and block users.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::db::{mailing_repo, user_repo, Database, DatabaseError};
use crate::dispatch::Dispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Permission {
    ViewAllMailings,
    DisableMailings,
    ViewAllRecipients,
    ViewAllMessages,
    ViewAllUsers,
    BlockUser,
}

impl Permission {
    pub const ALL: [Permission; 6] = [
        Permission::ViewAllMailings,
        Permission::DisableMailings,
        Permission::ViewAllRecipients,
        Permission::ViewAllMessages,
        Permission::ViewAllUsers,
        Permission::BlockUser,
    ];

    /// Stable name stored in `user_permissions.codename`.
    pub fn codename(&self) -> &'static str {
        match self {
            Permission::ViewAllMailings => "can_view_all_mailings",
            Permission::DisableMailings => "can_disable_mailings",
            Permission::ViewAllRecipients => "can_view_all_recipients",
            Permission::ViewAllMessages => "can_view_all_messages",
            Permission::ViewAllUsers => "can_view_all_users",
            Permission::BlockUser => "can_block_user",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.codename())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown permission '{0}'")]
pub struct UnknownPermission(pub String);

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.codename() == s)
            .ok_or_else(|| UnknownPermission(s.to_string()))
    }
}

/// What the manager group is granted.
pub const MANAGER_PERMISSIONS: [Permission; 6] = Permission::ALL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Change,
    Delete,
    Send,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Mailing,
    Message,
    Recipient,
    Attempt,
    User,
}

impl ResourceKind {
    fn view_all(self) -> Permission {
        match self {
            ResourceKind::Mailing | ResourceKind::Attempt => Permission::ViewAllMailings,
            ResourceKind::Message => Permission::ViewAllMessages,
            ResourceKind::Recipient => Permission::ViewAllRecipients,
            ResourceKind::User => Permission::ViewAllUsers,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }

    fn from_bool(allowed: bool) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

/// The acting user as far as authorization is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub user_id: i64,
    pub is_superuser: bool,
    pub is_active: bool,
    pub permissions: BTreeSet<Permission>,
}

impl Subject {
    /// Loads a user and their permissions. Unknown codenames are ignored.
    pub fn load(db: &Database, user_id: i64) -> Result<Option<Subject>, DatabaseError> {
        let Some(user) = user_repo::find_by_id(db, user_id)? else {
            return Ok(None);
        };
        let permissions = user_repo::permissions_for(db, user.id)?
            .iter()
            .filter_map(|codename| codename.parse().ok())
            .collect();
        Ok(Some(Subject {
            user_id: user.id,
            is_superuser: user.is_superuser,
            is_active: user.is_active,
            permissions,
        }))
    }

    pub fn has(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

/// Decides whether `subject` may perform `action` on a resource of `kind`
/// owned by `owner_id`.
pub fn check(
    subject: &Subject,
    action: Action,
    kind: ResourceKind,
    owner_id: Option<i64>,
) -> Decision {
    if !subject.is_active {
        return Decision::Deny;
    }
    if subject.is_superuser {
        return Decision::Allow;
    }

    let is_owner = owner_id == Some(subject.user_id);
    let allowed = match (action, kind) {
        (Action::Send, ResourceKind::Mailing) => {
            is_owner || subject.has(Permission::DisableMailings)
        }
        (Action::Send, _) => false,
        (Action::View, kind) => is_owner || subject.has(kind.view_all()),
        (Action::Change | Action::Delete, ResourceKind::Mailing) => {
            is_owner || subject.has(Permission::DisableMailings)
        }
        (Action::Change | Action::Delete, ResourceKind::User) => {
            is_owner || subject.has(Permission::BlockUser)
        }
        (Action::Change | Action::Delete, kind) => is_owner || subject.has(kind.view_all()),
    };
    Decision::from_bool(allowed)
}

/// Adds the manager grant to a user. Idempotent.
pub fn grant_manager(db: &Database, user_id: i64) -> Result<(), DatabaseError> {
    if user_repo::find_by_id(db, user_id)?.is_none() {
        return Err(DatabaseError::NotFound {
            entity: "user",
            id: user_id,
        });
    }
    for permission in MANAGER_PERMISSIONS {
        user_repo::grant_permission(db, user_id, permission.codename())?;
    }
    info!(user_id, "Granted manager permissions");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A one-line message for the person who asked for the action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.level == NoticeLevel::Success
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

pub const MAILING_NOT_FOUND: &str = "Mailing not found";
pub const MANUAL_SEND_OK: &str = "Mailing sent manually.";

/// Manual "send now" on behalf of `subject`.
///
/// A mailing the subject may not send is reported exactly like a missing
/// one. Nothing here panics or returns an error; every outcome is a notice.
pub fn manual_send(dispatcher: &Dispatcher, subject: &Subject, mailing_id: i64) -> Notice {
    let mailing = match mailing_repo::find_by_id(dispatcher.db(), mailing_id) {
        Ok(Some(mailing)) => mailing,
        Ok(None) => return Notice::error(MAILING_NOT_FOUND),
        Err(e) => {
            error!(mailing_id, error = %e, "Manual send lookup failed");
            return Notice::error(format!("Manual send failed: {}", e));
        }
    };

    if !check(subject, Action::Send, ResourceKind::Mailing, mailing.owner_id).is_allowed() {
        warn!(
            mailing_id,
            user_id = subject.user_id,
            "Manual send denied"
        );
        return Notice::error(MAILING_NOT_FOUND);
    }

    match dispatcher.send_now(mailing_id) {
        Ok(report) => {
            info!(
                mailing_id,
                user_id = subject.user_id,
                attempted = report.attempted,
                failed = report.failed,
                "Manual send finished"
            );
            Notice::success(MANUAL_SEND_OK)
        }
        Err(e) => {
            error!(mailing_id, error = %e, "Manual send failed");
            Notice::error(format!("Manual send failed: {}", e))
        }
    }
}
