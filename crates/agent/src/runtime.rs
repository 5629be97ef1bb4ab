use hono_channels::{EmojiMap, OutboundLimiter, OutgoingMessage, SentMessage, Transport};
use hono_core::{Config, Error, InboundEvent, Result};
use hono_providers::{create_provider, Provider};
use hono_storage::{Reminder, Store, StoredMessage};
use hono_tools::{Dispatcher, DmGate, DmReason, PinnedCache, Resolver, ToolContext, ToolRegistry};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::agent_loop::AgentLoop;
use crate::chat_lock::ChatLocks;
use crate::context::{ChatSnapshot, ContextBuilder};

/// Sender name recorded for the agent's own messages.
const SELF_NAME: &str = "me";

/// Turns inbound events into replies. Holds the process-wide caches (recency cache, known-writable
/// set, pinned-message cache) shared by every run.
pub struct AgentRuntime {
    config: Config,
    agent: AgentLoop,
    context: ContextBuilder,
    transport: Arc<dyn Transport>,
    store: Arc<dyn Store>,
    resolver: Arc<Resolver>,
    dm_gate: Arc<DmGate>,
    pinned_cache: Arc<PinnedCache>,
    limiter: OutboundLimiter,
    locks: ChatLocks,
}

impl AgentRuntime {
    pub fn new(
        config: Config,
        provider: Arc<dyn Provider>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn Store>,
    ) -> Self {
        let agent = AgentLoop::new(provider, Dispatcher::new(ToolRegistry::with_defaults()), &config.agent)
            .with_rate_limit_cap(Duration::from_secs(config.tools.max_rate_limit_wait_secs));
        Self {
            context: ContextBuilder::new(&config.agent.system_prompt),
            resolver: Arc::new(Resolver::new(config.resolver.match_threshold)),
            dm_gate: Arc::new(DmGate::new()),
            pinned_cache: Arc::new(PinnedCache::new(config.tools.pinned_cache_secs)),
            limiter: OutboundLimiter::default(),
            locks: ChatLocks::new(),
            agent,
            config,
            transport,
            store,
        }
    }

    /// Builds the model providers from `config`, including the follow-up model when one is set.
    pub fn from_config(config: Config, transport: Arc<dyn Transport>, store: Arc<dyn Store>) -> Result<Self> {
        let provider = create_provider(&config, &config.agent.model)?;
        let followup = match config.agent.followup_model.as_deref() {
            Some(model) if model != config.agent.model => Some(create_provider(&config, model)?),
            _ => None,
        };
        let mut runtime = Self::new(config, provider, transport, store);
        if let Some(f) = followup {
            runtime.agent = runtime.agent.with_followup(f);
        }
        Ok(runtime)
    }

    pub fn with_limiter(mut self, limiter: OutboundLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn dm_gate(&self) -> &DmGate {
        &self.dm_gate
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    async fn record_inbound(&self, event: &InboundEvent) -> Result<()> {
        self.store
            .record_message(&StoredMessage {
                chat_id: event.chat_id,
                message_id: event.message_id,
                sender_id: Some(event.sender_id),
                sender_name: event.sender_name.clone(),
                text: event.text.clone(),
                date: event.timestamp,
                outgoing: false,
            })
            .await?;
        self.store
            .touch_user(event.sender_id, event.sender_handle.as_deref(), &event.sender_name, event.timestamp)
            .await?;

        if event.is_private {
            self.dm_gate.mark_writable(event.sender_id, DmReason::WroteBefore);
        } else {
            if let Some(title) = &event.chat_title {
                self.store.upsert_group(event.chat_id, title, None).await?;
            }
            self.store.touch_group(event.chat_id, event.timestamp).await?;
        }
        Ok(())
    }

    async fn snapshot(&self, event: &InboundEvent) -> Result<ChatSnapshot> {
        let (group, profile) = if event.is_private {
            (None, None)
        } else {
            (
                self.store.group(event.chat_id).await?,
                self.store.group_profile(event.chat_id).await?,
            )
        };
        Ok(ChatSnapshot {
            group,
            profile,
            history: self
                .store
                .recent_messages(event.chat_id, self.config.agent.context_messages + 1)
                .await?,
            emoji: self.store.emoji_catalog().await?,
        })
    }

    fn tool_context(&self, event: &InboundEvent, emoji: EmojiMap) -> ToolContext {
        ToolContext::new(self.transport.clone(), self.store.clone())
            .with_config(self.config.tools.clone(), self.config.agent.context_messages)
            .with_resolver(self.resolver.clone())
            .with_dm_gate(self.dm_gate.clone())
            .with_pinned_cache(self.pinned_cache.clone())
            .with_emoji(emoji)
            .with_owner(self.config.agent.owner_id)
            .in_chat(event.chat_id, Some(event.message_id))
            .with_sender(event.sender_id, event.sender_role)
    }

    /// Handles one inbound message end to end. Events for the same chat are processed one at a
    /// time in arrival order. Returns the sent reply, or `None` when the model had nothing to say.
    pub async fn handle_event(&self, event: InboundEvent) -> Result<Option<SentMessage>> {
        let _guard = self.locks.lock(event.chat_id).await;
        let started = Instant::now();
        info!(chat_id = event.chat_id, message_id = event.message_id, sender_id = event.sender_id, "Handling inbound event");

        self.record_inbound(&event).await?;
        let snapshot = self.snapshot(&event).await?;
        let emoji = EmojiMap::from_catalog(snapshot.emoji.iter().map(|e| (e.document_id, e.glyph.clone())));
        let ctx = self.tool_context(&event, emoji);
        let mut state = self.context.build_state(&event, &snapshot);

        let outcome = self.agent.run(&mut state, &ctx).await?;
        if outcome.text.trim().is_empty() {
            debug!(chat_id = event.chat_id, rounds = outcome.rounds, "Model produced no reply");
            return Ok(None);
        }

        self.limiter.acquire().await;
        let message = ctx.formatted(outcome.text.trim()).reply_to(event.message_id);
        let text = message.text.clone();
        let sent = self
            .transport
            .send_message(event.chat_id, message)
            .await
            .map_err(|e| Error::Other(format!("failed to send reply: {}", e)))?;
        self.store
            .record_message(&StoredMessage {
                chat_id: event.chat_id,
                message_id: sent.id,
                sender_id: None,
                sender_name: SELF_NAME.to_string(),
                text,
                date: sent.date,
                outgoing: true,
            })
            .await?;

        info!(
            chat_id = event.chat_id,
            rounds = outcome.rounds,
            tool_calls = outcome.tool_calls,
            hit_round_limit = outcome.hit_round_limit,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Reply sent"
        );
        Ok(Some(sent))
    }

    async fn reminder_destination(&self, reminder: &Reminder) -> Option<i64> {
        if reminder.chat_id != 0 {
            return Some(reminder.chat_id);
        }
        let target = reminder.target.as_deref()?.trim();
        if let Ok(id) = target.parse::<i64>() {
            return Some(id);
        }
        if target.starts_with('@') {
            match self.transport.lookup_handle(target).await {
                Ok(peer) => return Some(peer.id),
                Err(e) => warn!(reminder_id = reminder.id, target, error = %e, "Reminder target lookup failed"),
            }
        }
        None
    }

    /// Sends every reminder due at `now` as plain text. Failed sends stay pending for the next
    /// pass; reminders with no reachable destination are dropped.
    pub async fn deliver_due_reminders(&self, now: i64) -> Result<usize> {
        let due = self.store.due_reminders(now).await?;
        let mut delivered = 0;

        for reminder in due {
            let Some(chat_id) = self.reminder_destination(&reminder).await else {
                warn!(reminder_id = reminder.id, "Reminder has no destination, dropping");
                self.store.mark_reminder_sent(reminder.id).await?;
                continue;
            };

            self.limiter.acquire().await;
            match self.transport.send_message(chat_id, OutgoingMessage::plain(&reminder.text)).await {
                Ok(_) => {
                    self.store.mark_reminder_sent(reminder.id).await?;
                    delivered += 1;
                    info!(reminder_id = reminder.id, chat_id, "Reminder delivered");
                }
                Err(e) => warn!(reminder_id = reminder.id, chat_id, error = %e, "Reminder delivery failed"),
            }
        }
        Ok(delivered)
    }
}
