use async_trait::async_trait;
use hono_channels::PlatformMessage;
use hono_core::{truncate_chars, ActionError};
use hono_storage::NewReminder;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::{arg_i64, arg_str, require_str, Tool, ToolContext, ToolResult, ToolSchema};

pub(crate) fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

pub struct GetChatContextTool;

#[async_trait]
impl Tool for GetChatContextTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_chat_context",
            description: "Recent remembered messages of a chat (the current chat by default).",
            parameters: json!({
                "type": "object",
                "properties": {
                    "group_link": {"type": "string", "description": "Chat to read; defaults to the current chat"},
                    "limit": {"type": "integer", "description": "How many messages, 5 to 30"}
                }
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let chat = ctx.target_chat(arg_str(&params, "group_link")).await?;
        let limit = arg_i64(&params, "limit")
            .unwrap_or(ctx.context_messages as i64)
            .clamp(5, 30) as usize;

        let messages = ctx.store.recent_messages(chat.platform_id, limit).await?;
        if messages.is_empty() {
            return Ok(json!({"group_id": chat.platform_id, "messages": [], "message": "No history for this chat"}));
        }
        let title = ctx.store.group(chat.platform_id).await?.map(|g| g.title);
        let items: Vec<Value> = messages
            .iter()
            .map(|m| json!({"from": m.sender_name, "text": truncate_chars(&m.text, 300)}))
            .collect();
        Ok(json!({
            "group_id": chat.platform_id,
            "group": title,
            "count": items.len(),
            "messages": items
        }))
    }
}

pub struct GetExtendedHistoryTool;

#[async_trait]
impl Tool for GetExtendedHistoryTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_extended_history",
            description: "A longer transcript of the current chat, when the default context is not enough.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "count": {"type": "integer", "description": "How many messages, 5 to 50"}
                },
                "required": ["count"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let chat_id = ctx.require_chat()?;
        let count = arg_i64(&params, "count").unwrap_or(20).clamp(5, 50) as usize;
        let messages = ctx.store.recent_messages(chat_id, count).await?;
        let history = messages
            .iter()
            .filter(|m| !m.text.is_empty())
            .map(|m| format!("[{}]: {}", m.sender_name, truncate_chars(&m.text, 200)))
            .collect::<Vec<_>>();
        Ok(json!({
            "count": history.len(),
            "history": history.join("\n")
        }))
    }
}

pub struct SearchChatHistoryTool;

#[async_trait]
impl Tool for SearchChatHistoryTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "search_chat_history",
            description: "Search remembered messages of a chat for a word or phrase.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Text to look for"},
                    "group_link": {"type": "string", "description": "Chat to search; defaults to the current chat"}
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let query = require_str(&params, "query")?;
        let chat = ctx.target_chat(arg_str(&params, "group_link")).await?;
        let hits = ctx.store.search_messages(chat.platform_id, query, 10).await?;
        if hits.is_empty() {
            return Ok(json!({"found": 0, "message": format!("Nothing matches '{}'", query)}));
        }
        let items: Vec<Value> = hits
            .iter()
            .map(|m| json!({"from": m.sender_name, "text": truncate_chars(&m.text, 200), "time": m.date}))
            .collect();
        Ok(json!({"found": items.len(), "messages": items}))
    }
}

/// Persisted message `offset` steps before the newest one (`-1` is the newest).
async fn persisted_message_id(ctx: &ToolContext, chat_id: i64, offset: i64) -> Result<Option<i64>, ActionError> {
    let back = offset.unsigned_abs() as usize;
    let context = ctx.store.recent_messages(chat_id, back + 5).await?;
    if context.len() < back {
        return Ok(None);
    }
    Ok(context.get(context.len() - back).map(|m| m.message_id))
}

pub struct SendReactionTool;

#[async_trait]
impl Tool for SendReactionTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "send_reaction",
            description: "React to a message with a custom emoji. emoji_id is a catalog tag number (as in #N) or a raw document id.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "emoji_id": {"type": "integer", "description": "Catalog tag number or document id"},
                    "message_offset": {"type": "integer", "description": "0 = the message being answered, -1 = the one before, and so on"}
                },
                "required": ["emoji_id"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let chat_id = ctx.require_chat()?;
        let emoji_id = arg_i64(&params, "emoji_id").ok_or_else(|| ActionError::invalid("emoji_id must be a number"))?;
        let offset = arg_i64(&params, "message_offset").unwrap_or(0);
        if offset > 0 {
            return Err(ActionError::invalid("message_offset must be 0 or negative"));
        }

        let document_id = u32::try_from(emoji_id)
            .ok()
            .and_then(|tag| ctx.emoji.get(tag))
            .map(|asset| asset.document_id)
            .unwrap_or(emoji_id);

        let target = if offset == 0 {
            ctx.active_message
        } else {
            persisted_message_id(&ctx, chat_id, offset).await?
        };
        let message_id = target.ok_or_else(|| ActionError::not_found("no message to react to"))?;

        ctx.transport.send_reaction(chat_id, message_id, document_id).await?;
        debug!(chat_id, message_id, document_id, "Reaction sent");
        Ok(json!({"message_id": message_id, "document_id": document_id, "reacted": true}))
    }
}

pub struct DeleteMyMessageTool;

#[async_trait]
impl Tool for DeleteMyMessageTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "delete_my_message",
            description: "Delete one of your own recent messages in the current chat.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "message_offset": {"type": "integer", "description": "-1 = your latest message, -2 = the one before"}
                }
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let chat_id = ctx.require_chat()?;
        let offset = arg_i64(&params, "message_offset").unwrap_or(-1);
        let index = offset.unsigned_abs().max(1) as usize - 1;

        let own = ctx.transport.own_messages(chat_id, 30).await?;
        if own.is_empty() {
            return Err(ActionError::not_found("no messages of mine in this chat"));
        }
        let target = own.get(index).ok_or_else(|| {
            ActionError::not_found(format!("only {} of my messages are in recent history", own.len()))
        })?;

        ctx.transport.delete_messages(chat_id, &[target.id]).await?;
        info!(chat_id, message_id = target.id, "Deleted own message");
        Ok(json!({
            "message_id": target.id,
            "deleted": truncate_chars(&target.text, 50)
        }))
    }
}

pub struct ScheduleMessageTool;

#[async_trait]
impl Tool for ScheduleMessageTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "schedule_message",
            description: "Send a message to the current chat later, after 1 to 1440 minutes.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string", "description": "What to send"},
                    "delay_minutes": {"type": "integer", "description": "Delay in minutes, 1 to 1440"}
                },
                "required": ["text", "delay_minutes"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let chat_id = ctx.require_chat()?;
        let text = require_str(&params, "text")?;
        let delay = arg_i64(&params, "delay_minutes").ok_or_else(|| ActionError::invalid("delay_minutes must be a number"))?;
        if !(1..=1440).contains(&delay) {
            return Err(ActionError::invalid("delay_minutes must be between 1 and 1440"));
        }

        let due_at = now_ts() + delay * 60;
        let id = ctx
            .store
            .add_reminder(&NewReminder {
                chat_id,
                text: truncate_chars(text, 200),
                due_at,
                target: None,
            })
            .await?;
        info!(chat_id, reminder_id = id, delay, "Message scheduled");
        Ok(json!({
            "reminder_id": id,
            "due_at": due_at,
            "scheduled_text": truncate_chars(text, 50)
        }))
    }
}

pub struct ForwardMessageTool;

#[async_trait]
impl Tool for ForwardMessageTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "forward_message",
            description: "Forward a message from the current chat to the owner, an @username or a chat id.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "to_chat": {"type": "string", "description": "\"owner\", @username or numeric chat id"},
                    "message_offset": {"type": "integer", "description": "0 = the message being answered, -1 = the one before"}
                },
                "required": ["to_chat"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let chat_id = ctx.require_chat()?;
        let to_chat = require_str(&params, "to_chat")?;
        let offset = arg_i64(&params, "message_offset").unwrap_or(0);

        let target = if to_chat.eq_ignore_ascii_case("owner") {
            ctx.owner_id.ok_or_else(|| ActionError::not_found("no owner is configured"))?
        } else if to_chat.starts_with('@') {
            ctx.transport.lookup_handle(to_chat).await?.id
        } else if let Ok(id) = to_chat.parse::<i64>() {
            id
        } else {
            return Err(ActionError::invalid("to_chat must be owner, @username or a chat id"));
        };

        let source = if offset < 0 {
            let back = offset.unsigned_abs() as usize;
            ctx.transport
                .recent_messages(chat_id, back + 1)
                .await?
                .get(back)
                .map(|m| m.id)
        } else {
            ctx.active_message
        };
        let message_id = source.ok_or_else(|| ActionError::not_found("no message to forward"))?;

        ctx.transport.forward_message(chat_id, message_id, target).await?;
        info!(from = chat_id, message_id, to = target, "Message forwarded");
        Ok(json!({"message_id": message_id, "to_chat": target, "forwarded": true}))
    }
}

pub struct ReplyToMessageTool;

#[async_trait]
impl Tool for ReplyToMessageTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "reply_to_message",
            description: "Reply to a specific earlier message, found by a piece of its text or by offset.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string", "description": "Reply text; supports the usual markup"},
                    "message_offset": {"type": "integer", "description": "-1 = latest message, down to -20"},
                    "search_text": {"type": "string", "description": "Part of the text of the message to reply to"}
                },
                "required": ["text"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let chat_id = ctx.require_chat()?;
        let text = require_str(&params, "text")?;

        let target: PlatformMessage = if let Some(needle) = arg_str(&params, "search_text") {
            let needle = needle.to_lowercase();
            ctx.transport
                .recent_messages(chat_id, 50)
                .await?
                .into_iter()
                .find(|m| !m.text.is_empty() && m.text.to_lowercase().contains(&needle))
                .ok_or_else(|| {
                    ActionError::not_found(format!("no recent message contains '{}'", truncate_chars(&needle, 30)))
                })?
        } else {
            let offset = arg_i64(&params, "message_offset")
                .filter(|o| (-20..=-1).contains(o))
                .ok_or_else(|| ActionError::invalid("give message_offset (-1..-20) or search_text"))?;
            let back = offset.unsigned_abs() as usize;
            ctx.transport
                .recent_messages(chat_id, back + 1)
                .await?
                .into_iter()
                .nth(back - 1)
                .ok_or_else(|| ActionError::not_found("that message is not in recent history"))?
        };

        let sent = ctx
            .transport
            .send_message(chat_id, ctx.formatted(text).reply_to(target.id))
            .await?;
        Ok(json!({
            "message_id": sent.id,
            "reply_to": target.id,
            "replied_to_text": truncate_chars(&target.text, 50)
        }))
    }
}

pub struct ClickButtonTool;

#[async_trait]
impl Tool for ClickButtonTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "click_button",
            description: "Press an inline button under a message, by its 1-based number or by part of its label. Link buttons return the URL instead.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "button": {"type": "string", "description": "Button number (1-based) or label text"},
                    "message_offset": {"type": "integer", "description": "0 = the message being answered, 1 = the one before"}
                },
                "required": ["button"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let chat_id = ctx.require_chat()?;
        let wanted = require_str(&params, "button")?;
        let offset = arg_i64(&params, "message_offset").unwrap_or(0).unsigned_abs() as usize;

        let recent = ctx.transport.recent_messages(chat_id, offset + 20).await?;
        let message = match ctx.active_message {
            Some(id) if offset == 0 => recent.iter().find(|m| m.id == id),
            _ => recent.get(offset),
        }
        .ok_or_else(|| ActionError::not_found("message not found"))?;

        if message.buttons.is_empty() {
            return Err(ActionError::not_found("the message has no buttons"));
        }

        let index = if wanted.chars().all(|c| c.is_ascii_digit()) {
            let n: usize = wanted.parse().unwrap_or(0);
            if n == 0 || n > message.buttons.len() {
                return Err(ActionError::invalid(format!(
                    "button #{} does not exist; there are {}",
                    wanted,
                    message.buttons.len()
                )));
            }
            n - 1
        } else {
            let needle = wanted.to_lowercase();
            message
                .buttons
                .iter()
                .position(|b| {
                    let label = b.text.to_lowercase();
                    label.contains(&needle) || needle.contains(&label)
                })
                .ok_or_else(|| {
                    let available = message
                        .buttons
                        .iter()
                        .take(5)
                        .map(|b| format!("'{}'", b.text))
                        .collect::<Vec<_>>()
                        .join(", ");
                    ActionError::not_found(format!("no button '{}'; available: {}", wanted, available))
                })?
        };

        let button = &message.buttons[index];
        if let Some(url) = &button.url {
            return Ok(json!({"action": "url", "url": url, "text": button.text}));
        }

        let answer = ctx.transport.click_button(chat_id, message.id, index).await?;
        debug!(chat_id, message_id = message.id, index, "Button clicked");
        Ok(json!({"action": "clicked", "text": button.text, "answer": answer}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::harness;
    use hono_channels::testing::{incoming, FakeTransport};
    use hono_channels::{Button, EmojiMap, OutgoingMessage, Peer, Transport};
    use hono_core::ErrorKind;
    use hono_storage::{InMemoryStore, Store, StoredMessage};

    fn stored(chat_id: i64, id: i64, from: &str, text: &str) -> StoredMessage {
        StoredMessage {
            chat_id,
            message_id: id,
            sender_id: Some(id * 10),
            sender_name: from.to_string(),
            text: text.to_string(),
            date: 1_700_000_000 + id,
            outgoing: false,
        }
    }

    fn seeded_store(chat_id: i64, n: i64) -> InMemoryStore {
        let store = InMemoryStore::new();
        store.seed_chat(chat_id, "Lounge", None, 10);
        for id in 1..=n {
            store.seed_message(stored(chat_id, id, "ann", &format!("message {}", id)));
        }
        store
    }

    #[tokio::test]
    async fn test_chat_context_clamps_limit() {
        let h = harness(FakeTransport::new(), seeded_store(-1, 40));
        let ctx = h.ctx.clone().in_chat(-1, None);
        let out = GetChatContextTool.execute(ctx.clone(), json!({"limit": 100})).await.unwrap();
        assert_eq!(out["count"], 30);
        assert_eq!(out["group"], "Lounge");
        let out = GetChatContextTool.execute(ctx, json!({"limit": 1})).await.unwrap();
        assert_eq!(out["count"], 5);
        assert_eq!(out["messages"][4]["text"], "message 40");
    }

    #[tokio::test]
    async fn test_extended_history_format() {
        let h = harness(FakeTransport::new(), seeded_store(-1, 6));
        let ctx = h.ctx.clone().in_chat(-1, None);
        let out = GetExtendedHistoryTool.execute(ctx, json!({"count": 5})).await.unwrap();
        assert_eq!(out["count"], 5);
        assert!(out["history"].as_str().unwrap().ends_with("[ann]: message 6"));
    }

    #[tokio::test]
    async fn test_search_history() {
        let store = seeded_store(-1, 3);
        store.seed_message(stored(-1, 4, "bob", "Rust meetup on Friday"));
        let h = harness(FakeTransport::new(), store);
        let ctx = h.ctx.clone().in_chat(-1, None);
        let out = SearchChatHistoryTool.execute(ctx.clone(), json!({"query": "meetup"})).await.unwrap();
        assert_eq!(out["found"], 1);
        assert_eq!(out["messages"][0]["from"], "bob");
        let out = SearchChatHistoryTool.execute(ctx, json!({"query": "nothing"})).await.unwrap();
        assert_eq!(out["found"], 0);
    }

    #[tokio::test]
    async fn test_reaction_offsets_and_catalog() {
        let h = harness(FakeTransport::new(), seeded_store(-1, 5));
        let mut emoji = EmojiMap::new();
        emoji.insert(1, 5_000_000_001, "🔥");
        let ctx = h.ctx.clone().in_chat(-1, Some(99)).with_emoji(emoji);

        SendReactionTool.execute(ctx.clone(), json!({"emoji_id": 1})).await.unwrap();
        SendReactionTool
            .execute(ctx.clone(), json!({"emoji_id": 777, "message_offset": -2}))
            .await
            .unwrap();
        assert_eq!(h.transport.reactions(), vec![(-1, 99, 5_000_000_001), (-1, 4, 777)]);

        let err = SendReactionTool
            .execute(ctx, json!({"emoji_id": 1, "message_offset": 2}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArguments);
    }

    #[tokio::test]
    async fn test_delete_my_latest_message() {
        let transport = FakeTransport::new();
        let h = harness(transport, InMemoryStore::new());
        let ctx = h.ctx.clone().in_chat(-1, None);
        let first = h.transport.send_message(-1, OutgoingMessage::plain("one")).await.unwrap();
        let second = h.transport.send_message(-1, OutgoingMessage::plain("two")).await.unwrap();

        let out = DeleteMyMessageTool.execute(ctx.clone(), json!({})).await.unwrap();
        assert_eq!(out["message_id"], second.id);
        let out = DeleteMyMessageTool.execute(ctx.clone(), json!({"message_offset": -1})).await.unwrap();
        assert_eq!(out["message_id"], first.id);
        let err = DeleteMyMessageTool.execute(ctx, json!({})).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_schedule_message_bounds() {
        let h = harness(FakeTransport::new(), InMemoryStore::new());
        let ctx = h.ctx.clone().in_chat(-1, None);
        for bad in [0, 1441] {
            let err = ScheduleMessageTool
                .execute(ctx.clone(), json!({"text": "hi", "delay_minutes": bad}))
                .await
                .unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidArguments);
        }
        assert_eq!(h.store.write_count(), 0);

        ScheduleMessageTool
            .execute(ctx, json!({"text": "good morning", "delay_minutes": 10}))
            .await
            .unwrap();
        assert_eq!(h.store.write_count(), 1);
        let reminders = h.store.list_reminders().await.unwrap();
        assert_eq!(reminders[0].chat_id, -1);
        assert_eq!(reminders[0].text, "good morning");
    }

    #[tokio::test]
    async fn test_forward_to_owner_and_handle() {
        let ann = Peer::user(7, "Ann", Some("ann"));
        let transport = FakeTransport::new()
            .with_peer(ann.clone())
            .with_message(incoming(-1, 1, &ann, "first"))
            .with_message(incoming(-1, 2, &ann, "second"));
        let h = harness(transport, InMemoryStore::new());
        let ctx = h.ctx.clone().in_chat(-1, Some(2)).with_owner(Some(42));

        ForwardMessageTool.execute(ctx.clone(), json!({"to_chat": "owner"})).await.unwrap();
        ForwardMessageTool
            .execute(ctx.clone(), json!({"to_chat": "@ann", "message_offset": -1}))
            .await
            .unwrap();
        assert_eq!(h.transport.forwarded(), vec![(-1, 2, 42), (-1, 1, 7)]);

        let err = ForwardMessageTool.execute(ctx, json!({"to_chat": "Ann"})).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArguments);
    }

    #[tokio::test]
    async fn test_reply_by_search_and_offset() {
        let ann = Peer::user(7, "Ann", None);
        let transport = FakeTransport::new()
            .with_message(incoming(-1, 1, &ann, "Who wants pizza?"))
            .with_message(incoming(-1, 2, &ann, "anyone?"));
        let h = harness(transport, InMemoryStore::new());
        let ctx = h.ctx.clone().in_chat(-1, Some(2));

        let out = ReplyToMessageTool
            .execute(ctx.clone(), json!({"text": "**me**", "search_text": "PIZZA"}))
            .await
            .unwrap();
        assert_eq!(out["reply_to"], 1);
        let sent = h.transport.sent();
        assert_eq!(sent[0].1.reply_to, Some(1));
        assert_eq!(sent[0].1.text, "me");

        let out = ReplyToMessageTool
            .execute(ctx.clone(), json!({"text": "yes", "message_offset": -2}))
            .await
            .unwrap();
        assert_eq!(out["reply_to"], 2);

        let err = ReplyToMessageTool.execute(ctx, json!({"text": "x"})).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArguments);
    }

    #[tokio::test]
    async fn test_click_button_by_index_text_and_url() {
        let bot = Peer::user(9, "Shop", None).bot();
        let mut menu = incoming(-1, 5, &bot, "Choose");
        menu.buttons = vec![
            Button { text: "Buy".into(), url: None },
            Button { text: "Site".into(), url: Some("https://example.com".into()) },
        ];
        let h = harness(FakeTransport::new().with_message(menu), InMemoryStore::new());
        let ctx = h.ctx.clone().in_chat(-1, Some(5));

        let out = ClickButtonTool.execute(ctx.clone(), json!({"button": "1"})).await.unwrap();
        assert_eq!(out["action"], "clicked");
        let out = ClickButtonTool.execute(ctx.clone(), json!({"button": "site"})).await.unwrap();
        assert_eq!(out["action"], "url");
        assert_eq!(out["url"], "https://example.com");
        assert_eq!(h.transport.clicks(), vec![(-1, 5, 0)]);

        let err = ClickButtonTool.execute(ctx.clone(), json!({"button": "3"})).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArguments);
        let err = ClickButtonTool.execute(ctx, json!({"button": "Sell"})).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
