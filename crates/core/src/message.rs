use serde::{Deserialize, Serialize};

use crate::entity::ChatRole;

/// A message delivered by the platform client that may trigger an agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub chat_id: i64,
    #[serde(default)]
    pub chat_title: Option<String>,
    #[serde(default)]
    pub is_private: bool,
    pub message_id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    #[serde(default)]
    pub sender_handle: Option<String>,
    #[serde(default)]
    pub sender_role: ChatRole,
    pub text: String,
    #[serde(default)]
    pub reply_to: Option<i64>,
    /// Unix seconds.
    pub timestamp: i64,
}

impl InboundEvent {
    pub fn new(chat_id: i64, message_id: i64, sender_id: i64, sender_name: &str, text: &str) -> Self {
        Self {
            chat_id,
            chat_title: None,
            is_private: false,
            message_id,
            sender_id,
            sender_name: sender_name.to_string(),
            sender_handle: None,
            sender_role: ChatRole::Member,
            text: text.to_string(),
            reply_to: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn private(mut self) -> Self {
        self.is_private = true;
        self
    }

    pub fn with_role(mut self, role: ChatRole) -> Self {
        self.sender_role = role;
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.chat_title = Some(title.to_string());
        self
    }

    /// Name shown to the model for this sender.
    pub fn author_label(&self) -> String {
        match &self.sender_handle {
            Some(h) => format!("{} (@{})", self.sender_name, h.trim_start_matches('@')),
            None => self.sender_name.clone(),
        }
    }
}
