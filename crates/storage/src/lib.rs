//! Durable state: known chats and users, message log, group/user profiles, reminders and the
//! custom emoji catalog.
//!
//! [`Directory`] is the read side the resolver and the DM gate depend on; [`Store`] adds the
//! writes operations perform. Timestamps are unix seconds.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use hono_core::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownChat {
    pub id: i64,
    pub title: String,
    pub handles: Vec<String>,
    pub last_activity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownUser {
    pub id: i64,
    pub display_name: String,
    pub handle: Option<String>,
    pub last_seen: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: i64,
    pub title: String,
    pub handle: Option<String>,
    pub rules: Option<String>,
    pub staff: Option<String>,
    pub joined_at: i64,
    pub last_activity: i64,
}

/// Free-form notes the agent keeps about a group. Also used as a patch: only `Some` fields
/// overwrite on update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupProfile {
    pub atmosphere: Option<String>,
    pub topics: Option<String>,
    pub style: Option<String>,
    pub key_members: Option<String>,
    pub notes: Option<String>,
}

impl GroupProfile {
    pub fn is_empty(&self) -> bool {
        self.atmosphere.is_none()
            && self.topics.is_none()
            && self.style.is_none()
            && self.key_members.is_none()
            && self.notes.is_none()
    }

    pub fn merge(&mut self, patch: &GroupProfile) {
        fn set(slot: &mut Option<String>, value: &Option<String>) {
            if value.is_some() {
                *slot = value.clone();
            }
        }
        set(&mut self.atmosphere, &patch.atmosphere);
        set(&mut self.topics, &patch.topics);
        set(&mut self.style, &patch.style);
        set(&mut self.key_members, &patch.key_members);
        set(&mut self.notes, &patch.notes);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub sender_id: Option<i64>,
    pub sender_name: String,
    pub text: String,
    pub date: i64,
    #[serde(default)]
    pub outgoing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactCategory {
    Fact,
    Interest,
    Date,
    Opinion,
}

impl FactCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactCategory::Fact => "fact",
            FactCategory::Interest => "interest",
            FactCategory::Date => "date",
            FactCategory::Opinion => "opinion",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "fact" => Some(FactCategory::Fact),
            "interest" => Some(FactCategory::Interest),
            "date" => Some(FactCategory::Date),
            "opinion" => Some(FactCategory::Opinion),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFact {
    pub category: FactCategory,
    pub text: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub display_name: String,
    pub handle: Option<String>,
    pub last_seen: i64,
    pub facts: Vec<UserFact>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReminder {
    pub chat_id: i64,
    pub text: String,
    pub due_at: i64,
    /// Free-form addressee: a user id, `@handle` or `group:<title>`.
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: i64,
    pub chat_id: i64,
    pub text: String,
    pub due_at: i64,
    pub target: Option<String>,
    pub sent: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmojiEntry {
    pub document_id: i64,
    pub glyph: String,
    pub description: String,
}

#[async_trait]
pub trait Directory: Send + Sync {
    /// Most recently active first.
    async fn list_known_chats(&self) -> Result<Vec<KnownChat>>;
    async fn list_known_users(&self) -> Result<Vec<KnownUser>>;
    async fn user_last_seen(&self, user_id: i64) -> Result<Option<i64>>;
}

#[async_trait]
pub trait Store: Directory {
    fn as_directory(&self) -> &dyn Directory;

    async fn upsert_group(&self, id: i64, title: &str, handle: Option<&str>) -> Result<()>;
    async fn group(&self, id: i64) -> Result<Option<GroupRecord>>;
    async fn set_group_rules(&self, id: i64, rules: &str) -> Result<()>;
    async fn set_group_staff(&self, id: i64, staff: &str) -> Result<()>;
    async fn touch_group(&self, id: i64, at: i64) -> Result<()>;
    async fn group_profile(&self, id: i64) -> Result<Option<GroupProfile>>;
    async fn update_group_profile(&self, id: i64, patch: &GroupProfile) -> Result<()>;

    async fn record_message(&self, message: &StoredMessage) -> Result<()>;
    /// Oldest first.
    async fn recent_messages(&self, chat_id: i64, limit: usize) -> Result<Vec<StoredMessage>>;
    /// Case-insensitive substring match, newest first.
    async fn search_messages(&self, chat_id: i64, query: &str, limit: usize) -> Result<Vec<StoredMessage>>;

    async fn touch_user(&self, id: i64, handle: Option<&str>, display_name: &str, at: i64) -> Result<()>;
    async fn user_profile(&self, id: i64) -> Result<Option<UserProfile>>;
    async fn add_user_fact(&self, id: i64, category: FactCategory, text: &str) -> Result<()>;

    async fn add_reminder(&self, reminder: &NewReminder) -> Result<i64>;
    async fn due_reminders(&self, now: i64) -> Result<Vec<Reminder>>;
    async fn mark_reminder_sent(&self, id: i64) -> Result<()>;
    async fn list_reminders(&self) -> Result<Vec<Reminder>>;

    async fn add_emoji(&self, glyph: &str, document_id: i64, description: &str) -> Result<()>;
    /// Insertion order; the tag number of an entry is its 1-based position.
    async fn emoji_catalog(&self) -> Result<Vec<EmojiEntry>>;
    async fn remove_emoji(&self, document_id: i64) -> Result<bool>;
}

pub(crate) fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
