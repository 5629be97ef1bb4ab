use async_trait::async_trait;
use hono_channels::{Peer, PeerKind, TransportError};
use hono_core::{truncate_chars, ActionError, EntityKind, EntityReference};
use hono_storage::{FactCategory, KnownUser, UserProfile};
use serde_json::{json, Value};
use tracing::debug;

use crate::{arg_str, require_str, require_user_ref, Tool, ToolContext, ToolResult, ToolSchema};

/// Score at or above which the best match wins outright.
const CONFIDENT_MATCH: u32 = 70;

fn facts_of(profile: &UserProfile, categories: &[FactCategory]) -> Vec<String> {
    profile
        .facts
        .iter()
        .filter(|f| categories.contains(&f.category))
        .map(|f| f.text.clone())
        .collect()
}

fn profile_payload(profile: &UserProfile) -> Value {
    json!({
        "user_id": profile.id,
        "username": profile.handle,
        "name": profile.display_name,
        "last_seen": profile.last_seen,
        "facts": facts_of(profile, &[FactCategory::Fact]),
        "interests": facts_of(profile, &[FactCategory::Interest]),
        "important_dates": facts_of(profile, &[FactCategory::Date]),
        "opinions": facts_of(profile, &[FactCategory::Opinion]),
    })
}

/// Relevance of a known user to a lowercased search term. Profile facts are only consulted
/// when the name and handle give nothing.
fn score_user(search: &str, user: &KnownUser, profile: Option<&UserProfile>) -> u32 {
    let handle = user.handle.as_deref().unwrap_or("").to_lowercase();
    let name = user.display_name.to_lowercase();

    let mut score = if !handle.is_empty() && search == handle {
        100
    } else if search == name {
        90
    } else if !handle.is_empty() && handle.contains(search) {
        70
    } else if name.contains(search) {
        60
    } else if let Some(p) = profile {
        let text_of = |cats: &[FactCategory]| facts_of(p, cats).join("; ").to_lowercase();
        if text_of(&[FactCategory::Fact, FactCategory::Opinion, FactCategory::Date]).contains(search) {
            40
        } else if text_of(&[FactCategory::Interest]).contains(search) {
            30
        } else {
            0
        }
    } else {
        0
    };

    for part in name.split_whitespace() {
        if search == part {
            score = score.max(80);
        } else if part.contains(search) || search.contains(part) {
            score = score.max(50);
        }
    }
    score
}

/// Finds a persisted user by id, handle, exact name or a name fragment.
async fn find_known_user(ctx: &ToolContext, identifier: &str) -> Result<Option<KnownUser>, ActionError> {
    let ident = identifier.trim().trim_start_matches('@').trim().to_lowercase();
    if ident.is_empty() {
        return Err(ActionError::invalid("user identifier is empty"));
    }
    let users = ctx.store.list_known_users().await?;
    Ok(users.into_iter().find(|u| {
        let handle = u.handle.as_deref().unwrap_or("").to_lowercase();
        let name = u.display_name.to_lowercase();
        ident == u.id.to_string() || (!handle.is_empty() && ident == handle) || name.contains(&ident)
    }))
}

pub struct GetUserInfoTool;

#[async_trait]
impl Tool for GetUserInfoTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_user_info",
            description: "Find a person you know by name, @username, id, or something remembered about them, and return what you know.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Name, @username, id or a remembered detail"}
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let query = require_str(&params, "query")?;
        let search = query.trim_start_matches('@').to_lowercase();

        if let Ok(id) = search.parse::<i64>() {
            if let Some(profile) = ctx.store.user_profile(id).await? {
                return Ok(profile_payload(&profile));
            }
        }

        let mut matches: Vec<(u32, KnownUser)> = Vec::new();
        for user in ctx.store.list_known_users().await? {
            let mut score = score_user(&search, &user, None);
            if score == 0 {
                let profile = ctx.store.user_profile(user.id).await?;
                score = score_user(&search, &user, profile.as_ref());
            }
            if score > 0 {
                matches.push((score, user));
            }
        }
        // Stable sort keeps the directory's most-recently-seen order among equal scores.
        matches.sort_by(|a, b| b.0.cmp(&a.0));

        match matches.first() {
            Some((score, best)) if matches.len() == 1 || *score >= CONFIDENT_MATCH => {
                let profile = ctx
                    .store
                    .user_profile(best.id)
                    .await?
                    .ok_or_else(|| ActionError::not_found(format!("profile of {} is gone", best.id)))?;
                Ok(profile_payload(&profile))
            }
            Some(_) => {
                let results: Vec<String> = matches
                    .iter()
                    .take(5)
                    .map(|(_, u)| {
                        format!(
                            "@{} ({}) - ID: {}",
                            u.handle.as_deref().unwrap_or("none"),
                            u.display_name,
                            u.id
                        )
                    })
                    .collect();
                Ok(json!({
                    "multiple_matches": true,
                    "total": matches.len(),
                    "results": results
                }))
            }
            None => {
                let entity = ctx.resolve(query, EntityKind::User).await.map_err(|e| {
                    debug!(query, error = %e, "No known user and no live match");
                    ActionError::not_found(format!("nobody matches '{}'", query))
                })?;
                Ok(json!({
                    "user_id": entity.entity.platform_id,
                    "username": entity.entity.handle,
                    "name": entity.entity.display_name,
                    "known": false
                }))
            }
        }
    }
}

pub struct GetUserMemoryTool;

#[async_trait]
impl Tool for GetUserMemoryTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_user_memory",
            description: "Everything remembered about a person: facts, interests, dates, opinions.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "user_identifier": {"type": "string", "description": "@username, name or id"}
                },
                "required": ["user_identifier"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let ident = require_str(&params, "user_identifier")?;
        let user = find_known_user(&ctx, ident)
            .await?
            .ok_or_else(|| ActionError::not_found(format!("nothing remembered about {}", ident)))?;
        let profile = ctx
            .store
            .user_profile(user.id)
            .await?
            .ok_or_else(|| ActionError::not_found(format!("nothing remembered about {}", ident)))?;
        Ok(profile_payload(&profile))
    }
}

pub struct RememberThisTool;

#[async_trait]
impl Tool for RememberThisTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "remember_this",
            description: "Save a fact about a person you know.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "user_identifier": {"type": "string", "description": "@username, name or id"},
                    "fact": {"type": "string", "description": "What to remember"},
                    "category": {
                        "type": "string",
                        "enum": ["fact", "interest", "date", "opinion"],
                        "description": "Kind of fact; defaults to fact"
                    }
                },
                "required": ["user_identifier", "fact"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let ident = require_str(&params, "user_identifier")?;
        let fact = truncate_chars(require_str(&params, "fact")?, 500);
        let category = match arg_str(&params, "category") {
            Some(c) => FactCategory::parse(c).ok_or_else(|| ActionError::invalid(format!("unknown category '{}'", c)))?,
            None => FactCategory::Fact,
        };

        let user = find_known_user(&ctx, ident)
            .await?
            .ok_or_else(|| ActionError::not_found(format!("I don't know who {} is", ident)))?;
        ctx.store.add_user_fact(user.id, category, &fact).await?;
        debug!(user_id = user.id, category = category.as_str(), "Fact remembered");
        Ok(json!({
            "user_id": user.id,
            "about": user.display_name,
            "remembered": fact,
            "category": category.as_str()
        }))
    }
}

fn user_payload(peer: &Peer, found_by: &str) -> Value {
    json!({
        "user_id": peer.id,
        "username": peer.handle,
        "name": peer.title,
        "is_bot": peer.is_bot,
        "found_by": found_by
    })
}

pub struct ResolveUserTool;

impl ResolveUserTool {
    async fn find(ctx: &ToolContext, query: &str) -> Result<(Peer, &'static str), ActionError> {
        let not_user = |p: &Peer| p.kind != PeerKind::User;

        if let Ok(id) = query.parse::<i64>() {
            let peer = ctx.transport.lookup_id(id).await?;
            if not_user(&peer) {
                return Err(ActionError::not_found(format!("{} is not a user", id)));
            }
            return Ok((peer, "id"));
        }

        if query.starts_with('@') {
            match ctx.transport.lookup_handle(query).await {
                Ok(peer) if !not_user(&peer) => return Ok((peer, "username")),
                Ok(_) => return Err(ActionError::not_found(format!("{} is not a user", query))),
                Err(e @ TransportError::UsernameNotOccupied(_)) => return Err(e.into()),
                Err(e @ TransportError::FloodWait { .. }) => return Err(e.into()),
                Err(e) => debug!(query, error = %e, "Handle lookup failed"),
            }
        }

        let needle = query.trim_start_matches('@').to_lowercase();
        if let Some(chat_id) = ctx.active_chat {
            let context = ctx.store.recent_messages(chat_id, 100).await?;
            let author = context
                .iter()
                .rev()
                .filter(|m| m.sender_name.to_lowercase().contains(&needle))
                .find_map(|m| m.sender_id);
            if let Some(id) = author {
                if let Ok(peer) = ctx.transport.lookup_id(id).await {
                    return Ok((peer, "context_search"));
                }
            }

            match ctx.transport.search_participants(chat_id, &needle, 5).await {
                Ok(found) => {
                    let hit = found.into_iter().find(|p| {
                        p.title.to_lowercase().contains(&needle)
                            || p.handle.as_deref().map(|h| h.to_lowercase().contains(&needle)).unwrap_or(false)
                    });
                    if let Some(peer) = hit {
                        return Ok((peer, "participant_search"));
                    }
                }
                Err(e) => debug!(chat_id, error = %e, "Participant search failed"),
            }
        }

        match ctx.transport.lookup_handle(&format!("@{}", needle)).await {
            Ok(peer) if !not_user(&peer) => Ok((peer, "username")),
            _ => Err(ActionError::not_found(format!(
                "could not find user '{}'; try @username or an id",
                query
            ))),
        }
    }
}

#[async_trait]
impl Tool for ResolveUserTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "resolve_user",
            description: "Find a user's id and username from an id, @username, or a name seen in the current chat.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "id, @username or name"}
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let query = require_str(&params, "query")?;
        let (peer, found_by) = Self::find(&ctx, query).await?;
        let entity: EntityReference = peer.to_entity();
        ctx.resolver.remember(query, &entity);
        Ok(user_payload(&peer, found_by))
    }
}

pub struct GetCommonChatsTool;

#[async_trait]
impl Tool for GetCommonChatsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_common_chats",
            description: "Groups you share with a user.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "user": {"type": "string", "description": "@username or numeric id"}
                },
                "required": ["user"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let user = require_user_ref(&params, "user")?;
        let entity = ctx.resolve(user, EntityKind::User).await?.entity;
        let chats = ctx.transport.common_chats(entity.platform_id, 100).await?;
        let listed: Vec<Value> = chats
            .iter()
            .take(20)
            .map(|c| {
                json!({
                    "id": c.id,
                    "title": c.title,
                    "type": if c.kind == PeerKind::Channel { "channel" } else { "group" },
                    "username": c.handle.as_ref().map(|h| format!("@{}", h))
                })
            })
            .collect();
        Ok(json!({
            "user_id": entity.platform_id,
            "username": entity.handle,
            "common_chats_count": chats.len(),
            "chats": listed
        }))
    }
}

pub struct GetFullProfileTool;

#[async_trait]
impl Tool for GetFullProfileTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_full_profile",
            description: "A user's public profile: name, bio, premium status, shared chat count, online status.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "user": {"type": "string", "description": "@username or numeric id"}
                },
                "required": ["user"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let user = require_user_ref(&params, "user")?;
        let entity = ctx.resolve(user, EntityKind::User).await?.entity;
        let full = ctx.transport.full_user(entity.platform_id).await?;
        Ok(json!({
            "user_id": full.peer.id,
            "username": full.peer.handle,
            "first_name": full.first_name,
            "last_name": full.last_name.unwrap_or_default(),
            "is_bot": full.peer.is_bot,
            "is_premium": full.is_premium,
            "is_contact": full.is_contact,
            "bio": full.bio,
            "common_chats_count": full.common_chats_count,
            "online_status": full.online_status
        }))
    }
}
