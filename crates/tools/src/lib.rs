pub mod dispatcher;
pub mod dm;
pub mod dm_gate;
pub mod groups;
pub mod messages;
pub mod personal;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod users;

use async_trait::async_trait;
use hono_channels::{render, EmojiMap, OutgoingMessage, Transport};
use hono_core::config::ToolsConfig;
use hono_core::{ActionError, ChatRole, EntityKind, EntityReference};
use hono_storage::Store;
use serde_json::Value;
use std::sync::Arc;

pub use dispatcher::Dispatcher;
pub use dm_gate::{DmEligibility, DmGate, DmReason};
pub use groups::PinnedCache;
pub use registry::ToolRegistry;
pub use resolver::{
    parse_reference, MatchStrategy, RecencyCache, Reference, Resolution, ResolutionSource, Resolver,
    SubstringTokenStrategy,
};

pub type ToolResult = std::result::Result<Value, ActionError>;

/// Words that mean "the chat this conversation is happening in".
const CURRENT_CHAT: &[&str] = &["current", "текущая", "here", "здесь", "тут"];

/// Everything an operation may touch for one agent run. Cheap to clone: collaborators and
/// process-wide caches are shared behind `Arc`.
#[derive(Clone)]
pub struct ToolContext {
    pub active_chat: Option<i64>,
    /// Message that triggered the run.
    pub active_message: Option<i64>,
    pub sender_id: Option<i64>,
    pub sender_role: ChatRole,
    pub owner_id: Option<i64>,
    pub transport: Arc<dyn Transport>,
    pub store: Arc<dyn Store>,
    pub resolver: Arc<Resolver>,
    pub dm_gate: Arc<DmGate>,
    pub emoji: Arc<EmojiMap>,
    pub pinned_cache: Arc<PinnedCache>,
    pub config: ToolsConfig,
    pub context_messages: usize,
}

impl ToolContext {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn Store>) -> Self {
        let config = ToolsConfig::default();
        Self {
            active_chat: None,
            active_message: None,
            sender_id: None,
            sender_role: ChatRole::Member,
            owner_id: None,
            transport,
            store,
            resolver: Arc::new(Resolver::default()),
            dm_gate: Arc::new(DmGate::new()),
            emoji: Arc::new(EmojiMap::new()),
            pinned_cache: Arc::new(PinnedCache::new(config.pinned_cache_secs)),
            config,
            context_messages: 15,
        }
    }

    pub fn in_chat(mut self, chat_id: i64, message_id: Option<i64>) -> Self {
        self.active_chat = Some(chat_id);
        self.active_message = message_id;
        self
    }

    pub fn with_sender(mut self, sender_id: i64, role: ChatRole) -> Self {
        self.sender_id = Some(sender_id);
        self.sender_role = role;
        self
    }

    pub fn with_owner(mut self, owner_id: Option<i64>) -> Self {
        self.owner_id = owner_id;
        self
    }

    pub fn with_emoji(mut self, emoji: EmojiMap) -> Self {
        self.emoji = Arc::new(emoji);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_dm_gate(mut self, dm_gate: Arc<DmGate>) -> Self {
        self.dm_gate = dm_gate;
        self
    }

    pub fn with_pinned_cache(mut self, cache: Arc<PinnedCache>) -> Self {
        self.pinned_cache = cache;
        self
    }

    pub fn with_config(mut self, config: ToolsConfig, context_messages: usize) -> Self {
        if config.pinned_cache_secs != self.config.pinned_cache_secs {
            self.pinned_cache = Arc::new(PinnedCache::new(config.pinned_cache_secs));
        }
        self.config = config;
        self.context_messages = context_messages;
        self
    }

    pub fn require_chat(&self) -> Result<i64, ActionError> {
        self.active_chat
            .ok_or_else(|| ActionError::invalid("not in a chat"))
    }

    pub async fn resolve(&self, reference: &str, kind: EntityKind) -> Result<Resolution, ActionError> {
        self.resolver
            .resolve(reference, kind, self.store.as_directory(), self.transport.as_ref())
            .await
    }

    /// Resolves a chat reference; an absent reference or one of [`CURRENT_CHAT`] means the
    /// active chat.
    pub async fn target_chat(&self, reference: Option<&str>) -> Result<EntityReference, ActionError> {
        match reference.map(str::trim).filter(|r| !r.is_empty()) {
            Some(r) if !CURRENT_CHAT.contains(&r.to_lowercase().as_str()) => {
                Ok(self.resolve(r, EntityKind::Chat).await?.entity)
            }
            _ => self.active_chat_entity().await,
        }
    }

    pub async fn active_chat_entity(&self) -> Result<EntityReference, ActionError> {
        let chat_id = self.require_chat()?;
        let title = self
            .store
            .group(chat_id)
            .await?
            .map(|g| g.title)
            .unwrap_or_default();
        Ok(EntityReference::chat(chat_id, &title).with_membership(true))
    }

    /// Renders model markup with the emoji catalog into an outgoing message. Models sometimes
    /// write newlines as a literal `\n`; those become real line breaks first.
    pub fn formatted(&self, text: &str) -> OutgoingMessage {
        let text = text.replace("\\n", "\n");
        OutgoingMessage::formatted(render(&text, &self.emoji))
    }
}

pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;

    /// Role the invoking user must hold, checked before any resolution or platform call.
    fn required_role(&self) -> Option<ChatRole> {
        None
    }

    fn validate(&self, params: &Value) -> Result<(), ActionError> {
        schema::validate_args(&self.schema().parameters, params)
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult;
}

/// Trimmed, non-empty string argument.
pub fn arg_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, ActionError> {
    arg_str(params, key).ok_or_else(|| ActionError::invalid(format!("missing required argument: {}", key)))
}

/// Integer argument; models sometimes quote numbers, so numeric strings are accepted too.
pub fn arg_i64(params: &Value, key: &str) -> Option<i64> {
    match params.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `@handle` or a numeric id; the only user references some operations accept.
pub fn require_user_ref<'a>(params: &'a Value, key: &str) -> Result<&'a str, ActionError> {
    let raw = require_str(params, key)?;
    let digits = raw.trim_start_matches('-');
    let numeric = !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit());
    if raw.starts_with('@') || numeric {
        Ok(raw)
    } else {
        Err(ActionError::invalid(format!("{} must be @username or a numeric id", key)))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use hono_channels::testing::FakeTransport;
    use hono_storage::InMemoryStore;

    pub struct Harness {
        pub transport: Arc<FakeTransport>,
        pub store: Arc<InMemoryStore>,
        pub ctx: ToolContext,
    }

    pub fn harness(transport: FakeTransport, store: InMemoryStore) -> Harness {
        let transport = Arc::new(transport);
        let store = Arc::new(store);
        let mut config = ToolsConfig::default();
        config.bot_reply_poll_secs = 0;
        config.bot_reply_timeout_secs = 1;
        let ctx = ToolContext::new(transport.clone(), store.clone()).with_config(config, 15);
        Harness { transport, store, ctx }
    }
}
