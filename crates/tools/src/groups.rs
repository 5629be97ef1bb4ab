use async_trait::async_trait;
use hono_channels::{JoinOutcome, OutgoingMessage, Peer, TransportError};
use hono_core::{truncate_chars, ActionError, ChatRole, EntityKind};
use hono_storage::GroupProfile;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::resolver::{parse_reference, Reference, ResolutionSource};
use crate::{arg_str, require_str, Tool, ToolContext, ToolResult, ToolSchema};

fn group_link_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "group_link": {
                "type": "string",
                "description": description
            }
        },
        "required": ["group_link"]
    })
}

const GROUP_LINK_HELP: &str =
    "Group reference: t.me link, invite link, @username, numeric id, a title, or \"last\" for the most recent group";

/// Records a chat the account just joined and makes it the `"last"` chat.
async fn remember_joined(ctx: &ToolContext, peer: &Peer) -> Result<(), ActionError> {
    ctx.store
        .upsert_group(peer.id, &peer.title, peer.handle.as_deref())
        .await?;
    let entity = peer.to_entity().with_membership(true);
    ctx.resolver.touch_last(&entity);
    Ok(())
}

pub struct JoinGroupTool;

#[async_trait]
impl Tool for JoinGroupTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "join_group",
            description: "Join a group or channel. Accepts invite links, public links, @username, a known title, or \"last\". Returns already_member when the account is already in the chat.",
            parameters: group_link_schema(GROUP_LINK_HELP),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let link = require_str(&params, "group_link")?;

        if let Reference::Invite(hash) = parse_reference(link) {
            let (peer, joined) = match ctx.transport.import_invite(&hash).await {
                Ok(peer) => (peer, true),
                Err(TransportError::AlreadyParticipant) => {
                    let preview = ctx.transport.check_invite(&hash).await?;
                    let peer = preview
                        .chat
                        .ok_or_else(|| ActionError::not_found("invite does not expose the chat"))?;
                    (peer, false)
                }
                Err(e) => return Err(e.into()),
            };
            remember_joined(&ctx, &peer).await?;
            info!(group_id = peer.id, title = %peer.title, joined, "Joined via invite");
            return Ok(join_payload(peer.id, &peer.title, joined));
        }

        let resolution = ctx.resolve(link, EntityKind::Chat).await?;
        let entity = resolution.entity;
        match resolution.source {
            ResolutionSource::Recency | ResolutionSource::Directory => {
                ctx.resolver.touch_last(&entity);
                Ok(join_payload(entity.platform_id, &entity.display_name, false))
            }
            ResolutionSource::Live => {
                let (peer, joined) = match ctx.transport.join_chat(entity.platform_id).await? {
                    JoinOutcome::Joined(peer) => (peer, true),
                    JoinOutcome::AlreadyMember(peer) => (peer, false),
                };
                remember_joined(&ctx, &peer).await?;
                info!(group_id = peer.id, title = %peer.title, joined, "Joined group");
                Ok(join_payload(peer.id, &peer.title, joined))
            }
        }
    }
}

fn join_payload(group_id: i64, title: &str, joined: bool) -> Value {
    if joined {
        json!({"group_id": group_id, "group_title": title, "joined": true})
    } else {
        json!({"group_id": group_id, "group_title": title, "already_member": true})
    }
}

pub struct LeaveGroupTool;

#[async_trait]
impl Tool for LeaveGroupTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "leave_group",
            description: "Leave a group or channel the account is in.",
            parameters: group_link_schema(GROUP_LINK_HELP),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let link = require_str(&params, "group_link")?;
        let entity = ctx.resolve(link, EntityKind::Chat).await?.entity;
        ctx.transport.leave_chat(entity.platform_id).await?;
        info!(group_id = entity.platform_id, title = %entity.display_name, "Left group");
        Ok(json!({
            "group_id": entity.platform_id,
            "group_title": entity.display_name,
            "left": true
        }))
    }
}

pub struct GetGroupInfoTool;

#[async_trait]
impl Tool for GetGroupInfoTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_group_info",
            description: "Look at a group without joining it: title, member count, whether it is a channel.",
            parameters: group_link_schema(GROUP_LINK_HELP),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let link = require_str(&params, "group_link")?;

        if let Reference::Invite(hash) = parse_reference(link) {
            let preview = ctx.transport.check_invite(&hash).await?;
            return Ok(json!({
                "title": preview.title,
                "members": preview.members,
                "is_channel": preview.is_channel,
                "already_member": preview.chat.is_some()
            }));
        }

        let entity = ctx.resolve(link, EntityKind::Chat).await?.entity;
        let details = ctx.transport.chat_details(entity.platform_id).await?;
        Ok(json!({
            "group_id": details.peer.id,
            "title": details.peer.title,
            "members": details.members,
            "is_channel": details.is_channel,
            "username": details.peer.handle,
            "about": details.about
        }))
    }
}

pub struct SendMessageToGroupTool;

#[async_trait]
impl Tool for SendMessageToGroupTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "send_message_to_group",
            description: "Send a message to another group. Supports **bold**, *italic*, `code` and #N custom emoji tags.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "group_link": {"type": "string", "description": GROUP_LINK_HELP},
                    "message": {"type": "string", "description": "Message text"}
                },
                "required": ["group_link", "message"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let link = require_str(&params, "group_link")?;
        let message = require_str(&params, "message")?;
        let entity = ctx.resolve(link, EntityKind::Chat).await?.entity;
        let sent = ctx
            .transport
            .send_message(entity.platform_id, ctx.formatted(message))
            .await?;
        ctx.resolver.touch_last(&entity);
        debug!(group_id = entity.platform_id, message_id = sent.id, "Message sent to group");
        Ok(json!({
            "group_id": entity.platform_id,
            "group_title": entity.display_name,
            "message_id": sent.id
        }))
    }
}

pub struct GetGroupRulesTool;

#[async_trait]
impl Tool for GetGroupRulesTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_group_rules",
            description: "Read the saved rules of a group. Use fetch_group_rules to ask the group's bot for them.",
            parameters: group_link_schema(GROUP_LINK_HELP),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let link = require_str(&params, "group_link")?;
        let entity = ctx.resolve(link, EntityKind::Chat).await?.entity;
        let record = ctx.store.group(entity.platform_id).await?;
        match record.and_then(|g| g.rules.map(|r| (g.title, r))) {
            Some((title, rules)) => Ok(json!({
                "group_id": entity.platform_id,
                "group_title": if title.is_empty() { entity.display_name } else { title },
                "rules": rules
            })),
            None => Ok(json!({
                "group_id": entity.platform_id,
                "rules": null,
                "message": "No rules saved for this group yet"
            })),
        }
    }
}

pub struct GetGroupStaffTool;

#[async_trait]
impl Tool for GetGroupStaffTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_group_staff",
            description: "Read the saved staff list (admins, moderators) of a group.",
            parameters: group_link_schema(GROUP_LINK_HELP),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let link = require_str(&params, "group_link")?;
        let entity = ctx.resolve(link, EntityKind::Chat).await?.entity;
        let record = ctx.store.group(entity.platform_id).await?;
        match record.and_then(|g| g.staff.map(|s| (g.title, s))) {
            Some((title, raw)) => Ok(json!({
                "group_id": entity.platform_id,
                "group_title": if title.is_empty() { entity.display_name } else { title },
                "staff": parse_staff_text(&raw),
                "raw_staff": truncate_chars(&raw, 300)
            })),
            None => Ok(json!({
                "group_id": entity.platform_id,
                "staff": null,
                "message": "No staff list saved for this group yet"
            })),
        }
    }
}

static LEADING_EMOJI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\x{1F300}-\x{1F9FF}\x{2600}-\x{27BF}\s]+").expect("valid emoji regex"));
static LINK_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\(https?://[^)]+\)").expect("valid link regex"));
static PUBLIC_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"t\.me/\w+").expect("valid t.me regex"));

/// Folds a bot's staff listing into `role: member` lines. Short lines without a username
/// are role headers for the lines below them.
pub fn parse_staff_text(text: &str) -> String {
    let mut role: Option<String> = None;
    let mut out = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let without_emoji = LEADING_EMOJI.replace(line, "");
        let clean = LINK_SUFFIX.replace_all(&without_emoji, "");
        let clean = clean.trim();
        if clean.is_empty() {
            continue;
        }

        let has_username = line.contains('@') || PUBLIC_LINK.is_match(line);
        if !has_username && clean.chars().count() < 30 {
            role = Some(clean.trim_end_matches(':').trim().to_string());
            continue;
        }
        match &role {
            Some(r) => out.push(format!("{}: {}", r, clean)),
            None => out.push(clean.to_string()),
        }
    }

    if out.is_empty() {
        truncate_chars(text, 300)
    } else {
        out.join("\n")
    }
}

/// Sends `command` to the chat and waits for the first bot reply after it.
async fn ask_group_bot(ctx: &ToolContext, chat_id: i64, command: &str) -> Result<String, ActionError> {
    let sent = ctx
        .transport
        .send_message(chat_id, OutgoingMessage::plain(command))
        .await?;
    debug!(chat_id, command, "Sent bot command");

    let poll = Duration::from_secs(ctx.config.bot_reply_poll_secs);
    let timeout = Duration::from_secs(ctx.config.bot_reply_timeout_secs);
    let deadline = Instant::now() + timeout;
    let mut last_checked = sent.id;

    loop {
        tokio::time::sleep(poll).await;
        for msg in ctx.transport.messages_after(chat_id, last_checked, 5).await? {
            last_checked = last_checked.max(msg.id);
            if msg.sender_is_bot && !msg.outgoing && !msg.text.trim().is_empty() {
                return Ok(msg.text);
            }
        }
        if Instant::now() >= deadline {
            break;
        }
    }

    Err(ActionError::not_found(format!(
        "no bot answered {} within {}s",
        command,
        timeout.as_secs()
    )))
}

pub struct FetchGroupRulesTool;

#[async_trait]
impl Tool for FetchGroupRulesTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "fetch_group_rules",
            description: "Send /rules in a group, wait for the group's bot to answer, and save the answer as the group rules.",
            parameters: group_link_schema(GROUP_LINK_HELP),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let link = require_str(&params, "group_link")?;
        let entity = ctx.target_chat(Some(link)).await?;
        let reply = ask_group_bot(&ctx, entity.platform_id, "/rules").await?;
        let rules = truncate_chars(&reply, ctx.config.rules_max_chars);
        ctx.store.set_group_rules(entity.platform_id, &rules).await?;
        info!(group_id = entity.platform_id, chars = rules.chars().count(), "Group rules saved");
        Ok(json!({
            "group_id": entity.platform_id,
            "rules": rules,
            "saved": true
        }))
    }
}

pub struct FetchGroupStaffTool;

#[async_trait]
impl Tool for FetchGroupStaffTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "fetch_group_staff",
            description: "Send /staff in a group, wait for the group's bot to answer, and save the staff list.",
            parameters: group_link_schema(GROUP_LINK_HELP),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let link = require_str(&params, "group_link")?;
        let entity = ctx.target_chat(Some(link)).await?;
        let reply = ask_group_bot(&ctx, entity.platform_id, "/staff").await?;
        let staff = truncate_chars(&reply, ctx.config.staff_max_chars);
        ctx.store.set_group_staff(entity.platform_id, &staff).await?;
        info!(group_id = entity.platform_id, chars = staff.chars().count(), "Group staff saved");
        Ok(json!({
            "group_id": entity.platform_id,
            "staff": parse_staff_text(&staff),
            "saved": true
        }))
    }
}

pub struct UnmuteUserTool;

#[async_trait]
impl Tool for UnmuteUserTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "unmute_user",
            description: "Ask the group's moderation bot to unmute a user. Only the group owner may request this.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "username": {"type": "string", "description": "User to unmute, with or without @"},
                    "group_link": {"type": "string", "description": "Group; defaults to the current chat"}
                },
                "required": ["username"]
            }),
        }
    }

    fn required_role(&self) -> Option<ChatRole> {
        Some(ChatRole::Owner)
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let username = require_str(&params, "username")?;
        let entity = ctx.target_chat(arg_str(&params, "group_link")).await?;
        let mention = if username.starts_with('@') {
            username.to_string()
        } else {
            format!("@{}", username)
        };
        let command = format!("/unmute {}", mention);
        ctx.transport
            .send_message(entity.platform_id, OutgoingMessage::plain(&command))
            .await?;
        info!(group_id = entity.platform_id, user = %mention, "Unmute requested");
        Ok(json!({
            "group_id": entity.platform_id,
            "command": command,
            "sent": true
        }))
    }
}

pub struct GetCurrentChatInfoTool;

#[async_trait]
impl Tool for GetCurrentChatInfoTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_current_chat_info",
            description: "What is remembered about the current chat: title, rules, staff, atmosphere, topics and notes.",
            parameters: json!({"type": "object", "properties": {}}),
        }
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> ToolResult {
        let chat_id = ctx.require_chat()?;
        let record = ctx
            .store
            .group(chat_id)
            .await?
            .ok_or_else(|| ActionError::not_found("nothing is known about this chat yet"))?;
        let profile = ctx.store.group_profile(chat_id).await?.unwrap_or_default();

        let mut out = json!({
            "chat_id": chat_id,
            "title": record.title,
            "username": record.handle,
        });
        let fields = [
            ("rules", record.rules.map(|r| truncate_chars(&r, 500))),
            ("staff", record.staff.map(|s| truncate_chars(&s, 300))),
            ("atmosphere", profile.atmosphere),
            ("main_topics", profile.topics),
            ("communication_style", profile.style),
            ("key_members", profile.key_members),
            ("notes", profile.notes),
        ];
        for (key, value) in fields {
            if let Some(v) = value {
                out[key] = Value::String(v);
            }
        }
        Ok(out)
    }
}

pub struct RememberAboutGroupTool;

#[async_trait]
impl Tool for RememberAboutGroupTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "remember_about_group",
            description: "Save observations about the current chat. Give at least one field; omitted fields keep their saved value.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "atmosphere": {"type": "string", "description": "Mood of the chat"},
                    "topics": {"type": "string", "description": "Main topics"},
                    "style": {"type": "string", "description": "How people talk here"},
                    "key_members": {"type": "string", "description": "Notable members"},
                    "notes": {"type": "string", "description": "Anything else"}
                }
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let chat_id = ctx.require_chat()?;
        let field = |key: &str| arg_str(&params, key).map(str::to_string);
        let patch = GroupProfile {
            atmosphere: field("atmosphere"),
            topics: field("topics"),
            style: field("style"),
            key_members: field("key_members"),
            notes: field("notes"),
        };
        if patch.is_empty() {
            return Err(ActionError::invalid("give at least one of atmosphere, topics, style, key_members, notes"));
        }

        ctx.store.update_group_profile(chat_id, &patch).await?;

        let saved: Vec<&str> = [
            ("atmosphere", &patch.atmosphere),
            ("topics", &patch.topics),
            ("style", &patch.style),
            ("key_members", &patch.key_members),
            ("notes", &patch.notes),
        ]
        .into_iter()
        .filter(|(_, v)| v.is_some())
        .map(|(k, _)| k)
        .collect();
        Ok(json!({"chat_id": chat_id, "saved": saved}))
    }
}

/// Per-chat cache of `get_pinned_messages` payloads.
pub struct PinnedCache {
    ttl: Duration,
    entries: Mutex<HashMap<i64, (Instant, Value)>>,
}

impl PinnedCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_secs),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, chat_id: i64) -> Option<Value> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&chat_id)
            .filter(|(at, _)| at.elapsed() < self.ttl)
            .map(|(_, v)| v.clone())
    }

    pub fn put(&self, chat_id: i64, payload: Value) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(chat_id, (Instant::now(), payload));
    }
}

pub struct GetPinnedMessagesTool;

#[async_trait]
impl Tool for GetPinnedMessagesTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_pinned_messages",
            description: "Pinned messages of the current chat, usually rules or announcements.",
            parameters: json!({"type": "object", "properties": {}}),
        }
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> ToolResult {
        let chat_id = ctx.require_chat()?;
        if let Some(cached) = ctx.pinned_cache.get(chat_id) {
            return Ok(cached);
        }

        let messages = ctx.transport.pinned_messages(chat_id, 10).await?;
        let pinned: Vec<Value> = messages
            .iter()
            .map(|m| {
                let text = if m.text.is_empty() {
                    "[media]".to_string()
                } else {
                    truncate_chars(&m.text, 300)
                };
                json!({
                    "id": m.id,
                    "from": m.sender_name,
                    "text": text,
                    "date": m.date
                })
            })
            .collect();

        let payload = if pinned.is_empty() {
            json!({"pinned": [], "message": "No pinned messages"})
        } else {
            json!({"count": pinned.len(), "pinned": pinned})
        };
        ctx.pinned_cache.put(chat_id, payload.clone());

        if !messages.is_empty() {
            let summary = messages
                .iter()
                .take(3)
                .map(|m| format!("• {}", truncate_chars(&m.text, 100)))
                .collect::<Vec<_>>()
                .join("\n");
            let patch = GroupProfile {
                notes: Some(format!("Pinned: {}", truncate_chars(&summary, 300))),
                ..Default::default()
            };
            ctx.store.update_group_profile(chat_id, &patch).await?;
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::harness;
    use hono_channels::testing::{incoming, FakeTransport};
    use hono_channels::InvitePreview;
    use hono_core::ErrorKind;
    use hono_storage::{InMemoryStore, Store};

    fn bot() -> Peer {
        Peer::user(900, "GroupHelp", Some("grouphelp_bot")).bot()
    }

    #[test]
    fn test_schemas() {
        assert_eq!(JoinGroupTool.schema().name, "join_group");
        assert!(JoinGroupTool.validate(&json!({"group_link": "last"})).is_ok());
        assert!(JoinGroupTool.validate(&json!({})).is_err());
        assert!(RememberAboutGroupTool.validate(&json!({})).is_ok());
        assert_eq!(UnmuteUserTool.required_role(), Some(ChatRole::Owner));
    }

    #[test]
    fn test_parse_staff_text() {
        let raw = "\u{1F451} Owner\n@boss (https://t.me/boss)\n\u{1F525} Admins:\n@ann\n@bob";
        assert_eq!(parse_staff_text(raw), "Owner: @boss\nAdmins: @ann\nAdmins: @bob");

        let no_roles = "@ann\n@bob";
        assert_eq!(parse_staff_text(no_roles), "@ann\n@bob");

        let headers_only = "Owner\nAdmins";
        assert_eq!(parse_staff_text(headers_only), headers_only);
    }

    #[tokio::test]
    async fn test_join_via_live_lookup() {
        let transport = FakeTransport::new().with_peer(Peer::group(-100, "Rustaceans", Some("rustaceans")));
        let h = harness(transport, InMemoryStore::new());

        let out = JoinGroupTool
            .execute(h.ctx.clone(), json!({"group_link": "@rustaceans"}))
            .await
            .unwrap();
        assert_eq!(out["group_id"], -100);
        assert_eq!(out["joined"], true);
        assert_eq!(h.store.write_count(), 1);

        let last = h.ctx.resolver.cache().get(EntityKind::Chat, "last").unwrap();
        assert_eq!(last.platform_id, -100);
    }

    #[tokio::test]
    async fn test_join_invite_already_participant() {
        let member = Peer::group(-200, "Secret", None);
        let transport = FakeTransport::new().with_invite(
            "AbCd",
            InvitePreview {
                title: "Secret".into(),
                members: Some(12),
                is_channel: false,
                chat: Some(member),
            },
        );
        let h = harness(transport, InMemoryStore::new());

        let out = JoinGroupTool
            .execute(h.ctx.clone(), json!({"group_link": "https://t.me/+AbCd"}))
            .await
            .unwrap();
        assert_eq!(out["already_member"], true);
        assert_eq!(out["group_id"], -200);
        assert!(h.transport.called("check_invite"));
    }

    #[tokio::test]
    async fn test_join_unknown_handle_is_not_found() {
        let h = harness(FakeTransport::new(), InMemoryStore::new());
        let err = JoinGroupTool
            .execute(h.ctx.clone(), json!({"group_link": "@nope"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(h.store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_leave_group() {
        let store = InMemoryStore::new();
        store.seed_chat(-300, "Book Club", None, 10);
        let h = harness(FakeTransport::new(), store);
        let out = LeaveGroupTool
            .execute(h.ctx.clone(), json!({"group_link": "book club"}))
            .await
            .unwrap();
        assert_eq!(out["left"], true);
        assert_eq!(h.transport.left(), vec![-300]);
    }

    #[tokio::test]
    async fn test_send_message_to_group_renders_markup() {
        let store = InMemoryStore::new();
        store.seed_chat(-300, "Book Club", None, 10);
        let h = harness(FakeTransport::new(), store);
        SendMessageToGroupTool
            .execute(h.ctx.clone(), json!({"group_link": "Book Club", "message": "hi **all**"}))
            .await
            .unwrap();
        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, -300);
        assert_eq!(sent[0].1.text, "hi all");
        assert_eq!(sent[0].1.spans.len(), 1);
    }

    #[tokio::test]
    async fn test_rules_absent_then_fetched() {
        let store = InMemoryStore::new();
        store.seed_chat(-400, "Garden", None, 10);
        let transport = FakeTransport::new().with_bot_reply("/rules", bot(), "1. Be kind\n2. No spam");
        let h = harness(transport, store);

        let out = GetGroupRulesTool
            .execute(h.ctx.clone(), json!({"group_link": "Garden"}))
            .await
            .unwrap();
        assert!(out["rules"].is_null());

        let writes = h.store.write_count();
        let out = FetchGroupRulesTool
            .execute(h.ctx.clone(), json!({"group_link": "Garden"}))
            .await
            .unwrap();
        assert_eq!(out["rules"], "1. Be kind\n2. No spam");
        assert_eq!(h.store.write_count(), writes + 1);
        assert_eq!(h.transport.sent()[0].1.text, "/rules");

        let out = GetGroupRulesTool
            .execute(h.ctx.clone(), json!({"group_link": "Garden"}))
            .await
            .unwrap();
        assert_eq!(out["rules"], "1. Be kind\n2. No spam");
    }

    #[tokio::test]
    async fn test_fetch_staff_times_out_without_bot() {
        let store = InMemoryStore::new();
        store.seed_chat(-400, "Garden", None, 10);
        let h = harness(FakeTransport::new(), store);
        let err = FetchGroupStaffTool
            .execute(h.ctx.clone(), json!({"group_link": "Garden"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(h.store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_and_read_staff() {
        let store = InMemoryStore::new();
        store.seed_chat(-400, "Garden", None, 10);
        let transport = FakeTransport::new().with_bot_reply("/staff", bot(), "Admins\n@ann");
        let h = harness(transport, store);
        FetchGroupStaffTool
            .execute(h.ctx.clone(), json!({"group_link": "Garden"}))
            .await
            .unwrap();
        let out = GetGroupStaffTool
            .execute(h.ctx.clone(), json!({"group_link": "Garden"}))
            .await
            .unwrap();
        assert_eq!(out["staff"], "Admins: @ann");
        assert_eq!(out["raw_staff"], "Admins\n@ann");
    }

    #[tokio::test]
    async fn test_unmute_defaults_to_current_chat() {
        let h = harness(FakeTransport::new(), InMemoryStore::new());
        let ctx = h.ctx.clone().in_chat(-500, Some(1)).with_sender(1, ChatRole::Owner);
        UnmuteUserTool.execute(ctx, json!({"username": "bob"})).await.unwrap();
        let sent = h.transport.sent();
        assert_eq!(sent[0].0, -500);
        assert_eq!(sent[0].1.text, "/unmute @bob");
    }

    #[tokio::test]
    async fn test_remember_about_group_and_current_info() {
        let store = InMemoryStore::new();
        store.seed_chat(-600, "Cats", Some("cats"), 10);
        let h = harness(FakeTransport::new(), store);
        let ctx = h.ctx.clone().in_chat(-600, None);

        let err = RememberAboutGroupTool.execute(ctx.clone(), json!({})).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArguments);

        let writes = h.store.write_count();
        RememberAboutGroupTool
            .execute(ctx.clone(), json!({"atmosphere": "cozy", "topics": "cats"}))
            .await
            .unwrap();
        assert_eq!(h.store.write_count(), writes + 1);

        let info = GetCurrentChatInfoTool.execute(ctx, json!({})).await.unwrap();
        assert_eq!(info["title"], "Cats");
        assert_eq!(info["atmosphere"], "cozy");
        assert_eq!(info["main_topics"], "cats");
        assert!(info.get("rules").is_none());
    }

    #[tokio::test]
    async fn test_current_chat_required() {
        let h = harness(FakeTransport::new(), InMemoryStore::new());
        let err = GetPinnedMessagesTool.execute(h.ctx.clone(), json!({})).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArguments);
    }

    #[tokio::test]
    async fn test_pinned_messages_cached_and_noted() {
        let admin = Peer::user(3, "Admin", None);
        let transport = FakeTransport::new()
            .with_pinned(incoming(-700, 1, &admin, "Read the rules"))
            .with_pinned(incoming(-700, 2, &admin, "Meetup on Friday"));
        let h = harness(transport, InMemoryStore::new());
        let ctx = h.ctx.clone().in_chat(-700, None);

        let out = GetPinnedMessagesTool.execute(ctx.clone(), json!({})).await.unwrap();
        assert_eq!(out["count"], 2);
        let again = GetPinnedMessagesTool.execute(ctx, json!({})).await.unwrap();
        assert_eq!(again, out);
        assert_eq!(
            h.transport.calls().iter().filter(|c| *c == "pinned_messages").count(),
            1
        );

        let profile = h.store.group_profile(-700).await.unwrap().unwrap();
        assert_eq!(
            profile.notes.as_deref(),
            Some("Pinned: • Read the rules\n• Meetup on Friday")
        );
    }
}
