//! Contract for the platform client.
//!
//! The login/delivery client lives outside this repository; everything the agent core
//! needs from it goes through [`Transport`]. Each method either succeeds with a platform
//! value or fails with a typed [`TransportError`].

use async_trait::async_trait;
use hono_core::{ActionError, EntityReference};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::markup::{FormattedText, FormattingSpan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerKind {
    User,
    Group,
    Channel,
}

/// A user, group or channel as reported by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    pub id: i64,
    pub kind: PeerKind,
    /// Chat title, or the user's full name.
    pub title: String,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
}

impl Peer {
    pub fn user(id: i64, name: &str, handle: Option<&str>) -> Self {
        Self {
            id,
            kind: PeerKind::User,
            title: name.to_string(),
            handle: handle.map(|h| h.trim_start_matches('@').to_string()),
            is_bot: false,
        }
    }

    pub fn group(id: i64, title: &str, handle: Option<&str>) -> Self {
        Self {
            id,
            kind: PeerKind::Group,
            title: title.to_string(),
            handle: handle.map(|h| h.trim_start_matches('@').to_string()),
            is_bot: false,
        }
    }

    pub fn bot(mut self) -> Self {
        self.is_bot = true;
        self
    }

    pub fn is_chat(&self) -> bool {
        matches!(self.kind, PeerKind::Group | PeerKind::Channel)
    }

    pub fn to_entity(&self) -> EntityReference {
        let base = if self.is_chat() {
            EntityReference::chat(self.id, &self.title)
        } else {
            EntityReference::user(self.id, &self.title)
        };
        base.with_handle(self.handle.clone())
    }
}

/// Result of checking an invite hash without joining.
#[derive(Debug, Clone, PartialEq)]
pub struct InvitePreview {
    pub title: String,
    pub members: Option<u64>,
    pub is_channel: bool,
    /// Present when the account is already in the chat.
    pub chat: Option<Peer>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    Joined(Peer),
    AlreadyMember(Peer),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatDetails {
    pub peer: Peer,
    pub members: Option<u64>,
    pub is_channel: bool,
    pub about: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FullUser {
    pub peer: Peer,
    pub first_name: String,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub is_contact: bool,
    /// Business account that charges for or gates incoming messages.
    pub business_intro: bool,
    pub is_premium: bool,
    pub common_chats_count: u32,
    pub online_status: Option<String>,
}

impl FullUser {
    pub fn new(peer: Peer) -> Self {
        let first_name = peer.title.clone();
        Self {
            peer,
            first_name,
            last_name: None,
            bio: None,
            is_contact: false,
            business_intro: false,
            is_premium: false,
            common_chats_count: 0,
            online_status: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Button {
    pub text: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformMessage {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: Option<i64>,
    pub sender_name: String,
    #[serde(default)]
    pub sender_is_bot: bool,
    pub text: String,
    /// Unix seconds.
    pub date: i64,
    #[serde(default)]
    pub outgoing: bool,
    /// Inline keyboard flattened row by row.
    #[serde(default)]
    pub buttons: Vec<Button>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutgoingMessage {
    pub text: String,
    pub spans: Vec<FormattingSpan>,
    pub reply_to: Option<i64>,
}

impl OutgoingMessage {
    pub fn plain(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn formatted(formatted: FormattedText) -> Self {
        Self {
            text: formatted.text,
            spans: formatted.spans,
            reply_to: None,
        }
    }

    pub fn reply_to(mut self, message_id: i64) -> Self {
        self.reply_to = Some(message_id);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentMessage {
    pub id: i64,
    pub chat_id: i64,
    pub date: i64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("flood wait: retry after {seconds}s")]
    FloodWait { seconds: u64 },

    #[error("account is limited from messaging new peers")]
    PeerFlood,

    #[error("the user's privacy settings forbid this")]
    PrivacyRestricted,

    #[error("the user has blocked this account")]
    UserBlocked,

    #[error("admin rights are required")]
    AdminRequired,

    #[error("chat is private or inaccessible")]
    ChannelPrivate,

    #[error("writing to this chat is forbidden")]
    WriteForbidden,

    #[error("username is not occupied: {0}")]
    UsernameNotOccupied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invite link has expired")]
    InviteExpired,

    #[error("invite link is invalid")]
    InviteInvalid,

    #[error("already a participant")]
    AlreadyParticipant,

    #[error("message id is invalid or deleted")]
    MessageIdInvalid,

    #[error("reaction is not allowed here")]
    ReactionInvalid,

    #[error("account is deactivated")]
    UserDeactivated,

    #[error("{0}")]
    Other(String),
}

impl From<TransportError> for ActionError {
    fn from(e: TransportError) -> Self {
        use hono_core::ErrorKind;

        let message = e.to_string();
        match e {
            TransportError::FloodWait { seconds } => {
                ActionError::rate_limited(message, Some(Duration::from_secs(seconds)))
            }
            TransportError::PeerFlood => ActionError::rate_limited(message, None),
            TransportError::PrivacyRestricted
            | TransportError::UserBlocked
            | TransportError::AdminRequired
            | TransportError::ChannelPrivate
            | TransportError::WriteForbidden => ActionError::new(ErrorKind::PermissionDenied, message),
            TransportError::UsernameNotOccupied(_) | TransportError::NotFound(_) => {
                ActionError::not_found(message)
            }
            TransportError::InviteExpired
            | TransportError::InviteInvalid
            | TransportError::MessageIdInvalid
            | TransportError::UserDeactivated => ActionError::new(ErrorKind::StaleReference, message),
            TransportError::ReactionInvalid => ActionError::invalid(message),
            TransportError::AlreadyParticipant | TransportError::Other(_) => {
                ActionError::internal(message)
            }
        }
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn lookup_handle(&self, handle: &str) -> TransportResult<Peer>;
    async fn lookup_id(&self, id: i64) -> TransportResult<Peer>;

    async fn check_invite(&self, hash: &str) -> TransportResult<InvitePreview>;
    /// Fails with [`TransportError::AlreadyParticipant`] when already in the chat.
    async fn import_invite(&self, hash: &str) -> TransportResult<Peer>;
    async fn join_chat(&self, chat_id: i64) -> TransportResult<JoinOutcome>;
    async fn leave_chat(&self, chat_id: i64) -> TransportResult<()>;
    async fn chat_details(&self, chat_id: i64) -> TransportResult<ChatDetails>;
    async fn list_dialogs(&self, limit: usize) -> TransportResult<Vec<Peer>>;

    async fn send_message(&self, chat_id: i64, message: OutgoingMessage) -> TransportResult<SentMessage>;
    /// Newest first.
    async fn recent_messages(&self, chat_id: i64, limit: usize) -> TransportResult<Vec<PlatformMessage>>;
    /// Messages with id greater than `after_id`, oldest first.
    async fn messages_after(&self, chat_id: i64, after_id: i64, limit: usize) -> TransportResult<Vec<PlatformMessage>>;
    async fn pinned_messages(&self, chat_id: i64, limit: usize) -> TransportResult<Vec<PlatformMessage>>;
    /// Messages sent by this account, newest first.
    async fn own_messages(&self, chat_id: i64, limit: usize) -> TransportResult<Vec<PlatformMessage>>;
    async fn send_reaction(&self, chat_id: i64, message_id: i64, document_id: i64) -> TransportResult<()>;
    async fn delete_messages(&self, chat_id: i64, message_ids: &[i64]) -> TransportResult<()>;
    async fn forward_message(&self, from_chat: i64, message_id: i64, to_chat: i64) -> TransportResult<()>;
    /// Presses the button at `index` of the flattened keyboard; returns the callback answer.
    async fn click_button(&self, chat_id: i64, message_id: i64, index: usize) -> TransportResult<Option<String>>;

    async fn full_user(&self, user_id: i64) -> TransportResult<FullUser>;
    async fn has_dm_history(&self, user_id: i64) -> TransportResult<bool>;
    async fn add_contact(&self, user_id: i64, first_name: &str) -> TransportResult<()>;
    async fn search_participants(&self, chat_id: i64, query: &str, limit: usize) -> TransportResult<Vec<Peer>>;
    async fn common_chats(&self, user_id: i64, limit: usize) -> TransportResult<Vec<Peer>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use hono_core::ErrorKind;

    #[test]
    fn test_flood_wait_maps_to_rate_limited() {
        let e: ActionError = TransportError::FloodWait { seconds: 7 }.into();
        assert_eq!(e.kind, ErrorKind::RateLimited);
        assert_eq!(e.retry_after, Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_taxonomy_mapping() {
        let kind = |e: TransportError| ActionError::from(e).kind;
        assert_eq!(kind(TransportError::PrivacyRestricted), ErrorKind::PermissionDenied);
        assert_eq!(kind(TransportError::ChannelPrivate), ErrorKind::PermissionDenied);
        assert_eq!(kind(TransportError::UsernameNotOccupied("x".into())), ErrorKind::NotFound);
        assert_eq!(kind(TransportError::InviteExpired), ErrorKind::StaleReference);
        assert_eq!(kind(TransportError::MessageIdInvalid), ErrorKind::StaleReference);
        assert_eq!(kind(TransportError::ReactionInvalid), ErrorKind::InvalidArguments);
        assert_eq!(kind(TransportError::Other("boom".into())), ErrorKind::InternalError);
    }

    #[test]
    fn test_peer_to_entity() {
        let chat = Peer::group(-100, "Test", Some("@test_chat")).to_entity();
        assert_eq!(chat.kind, hono_core::EntityKind::Chat);
        assert_eq!(chat.handle.as_deref(), Some("test_chat"));
        let user = Peer::user(5, "Ann", None).to_entity();
        assert_eq!(user.kind, hono_core::EntityKind::User);
    }
}
