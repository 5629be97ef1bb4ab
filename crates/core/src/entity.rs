use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Chat,
    User,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Chat => "chat",
            EntityKind::User => "user",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat or user confirmed by the transport or the persisted directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityReference {
    pub platform_id: i64,
    pub display_name: String,
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_member: Option<bool>,
}

impl EntityReference {
    pub fn chat(platform_id: i64, title: &str) -> Self {
        Self {
            platform_id,
            display_name: title.to_string(),
            kind: EntityKind::Chat,
            handle: None,
            is_member: None,
        }
    }

    pub fn user(platform_id: i64, name: &str) -> Self {
        Self {
            platform_id,
            display_name: name.to_string(),
            kind: EntityKind::User,
            handle: None,
            is_member: None,
        }
    }

    pub fn with_handle(mut self, handle: Option<String>) -> Self {
        self.handle = handle.map(|h| h.trim_start_matches('@').to_string());
        self
    }

    pub fn with_membership(mut self, is_member: bool) -> Self {
        self.is_member = Some(is_member);
        self
    }

    /// `@handle` when one is known, otherwise the display name.
    pub fn mention(&self) -> String {
        match &self.handle {
            Some(h) => format!("@{}", h),
            None => self.display_name.clone(),
        }
    }
}

/// Role of the user who triggered the current run, as seen in the source chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    #[default]
    Member,
    Admin,
    Owner,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::Member => "member",
            ChatRole::Admin => "admin",
            ChatRole::Owner => "owner",
        }
    }

    /// True when this role is at least `required`.
    pub fn satisfies(&self, required: ChatRole) -> bool {
        *self >= required
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(ChatRole::Owner.satisfies(ChatRole::Owner));
        assert!(ChatRole::Owner.satisfies(ChatRole::Admin));
        assert!(!ChatRole::Admin.satisfies(ChatRole::Owner));
        assert!(ChatRole::Member.satisfies(ChatRole::Member));
    }

    #[test]
    fn test_handle_normalized() {
        let e = EntityReference::user(7, "Ann").with_handle(Some("@ann".to_string()));
        assert_eq!(e.handle.as_deref(), Some("ann"));
        assert_eq!(e.mention(), "@ann");
    }
}
