//! Direct-message operations. Every send consults the [`DmGate`](crate::DmGate) first.

use async_trait::async_trait;
use hono_core::{ActionError, EntityKind, EntityReference};
use serde_json::{json, Value};
use tracing::info;

use crate::dm_gate::DmReason;
use crate::{arg_str, require_str, Tool, ToolContext, ToolResult, ToolSchema};

async fn resolve_user(ctx: &ToolContext, params: &Value) -> Result<EntityReference, ActionError> {
    let user = require_str(params, "user")?;
    Ok(ctx.resolve(user, EntityKind::User).await?.entity)
}

fn user_schema(extra: Value, required: &[&str]) -> Value {
    let mut properties = json!({
        "user": {"type": "string", "description": "@username, numeric id or a known name"}
    });
    if let (Some(props), Some(more)) = (properties.as_object_mut(), extra.as_object()) {
        props.extend(more.clone());
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

pub struct CheckCanDmTool;

#[async_trait]
impl Tool for CheckCanDmTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "check_can_dm",
            description: "Check whether you can write to a user privately without risking a spam flag.",
            parameters: user_schema(json!({}), &["user"]),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let user = resolve_user(&ctx, &params).await?;
        let verdict = ctx
            .dm_gate
            .check(user.platform_id, ctx.store.as_directory(), ctx.transport.as_ref())
            .await;
        Ok(json!({
            "user_id": user.platform_id,
            "username": user.handle,
            "can_send": verdict.can_send,
            "reason": verdict.reason.as_str()
        }))
    }
}

pub struct SendDmTool;

#[async_trait]
impl Tool for SendDmTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "send_dm",
            description: "Send a private message. Only works for people who wrote to you before or are in your contacts.",
            parameters: user_schema(
                json!({"text": {"type": "string", "description": "Message text; supports markup"}}),
                &["user", "text"],
            ),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let text = require_str(&params, "text")?;
        let user = resolve_user(&ctx, &params).await?;
        let verdict = ctx
            .dm_gate
            .check(user.platform_id, ctx.store.as_directory(), ctx.transport.as_ref())
            .await;
        if !verdict.can_send {
            return Err(ActionError::not_writable(format!(
                "can't write to {} first ({}); add them as a contact or wait for them to write",
                user.mention(),
                verdict.reason.as_str()
            )));
        }

        let sent = ctx.transport.send_message(user.platform_id, ctx.formatted(text)).await?;
        info!(user_id = user.platform_id, message_id = sent.id, "DM sent");
        Ok(json!({
            "user_id": user.platform_id,
            "message_id": sent.id,
            "sent": true
        }))
    }
}

pub struct AddContactTool;

#[async_trait]
impl Tool for AddContactTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "add_contact",
            description: "Add a user to your contacts, which also allows writing to them privately.",
            parameters: user_schema(
                json!({"first_name": {"type": "string", "description": "Name to save the contact under"}}),
                &["user"],
            ),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let user = resolve_user(&ctx, &params).await?;
        let first_name = arg_str(&params, "first_name")
            .map(str::to_string)
            .or_else(|| Some(user.display_name.clone()).filter(|n| !n.is_empty()))
            .unwrap_or_else(|| "Contact".to_string());

        ctx.transport.add_contact(user.platform_id, &first_name).await?;
        ctx.dm_gate.mark_writable(user.platform_id, DmReason::IsContact);
        Ok(json!({
            "user_id": user.platform_id,
            "first_name": first_name,
            "added": true
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::harness;
    use hono_channels::testing::FakeTransport;
    use hono_channels::Peer;
    use hono_core::ErrorKind;
    use hono_storage::InMemoryStore;

    fn bob() -> Peer {
        Peer::user(42, "Bob", Some("bob"))
    }

    #[tokio::test]
    async fn test_check_can_dm_unknown_then_history() {
        let h = harness(FakeTransport::new().with_peer(bob()), InMemoryStore::new());
        let out = CheckCanDmTool.execute(h.ctx.clone(), json!({"user": "@bob"})).await.unwrap();
        assert_eq!(out["can_send"], false);
        assert_eq!(out["reason"], "unknown");

        let h = harness(
            FakeTransport::new().with_peer(bob()).with_dm_history(42),
            InMemoryStore::new(),
        );
        let out = CheckCanDmTool.execute(h.ctx.clone(), json!({"user": "42"})).await.unwrap();
        assert_eq!(out["can_send"], true);
        assert_eq!(out["reason"], "wrote_before");
    }

    #[tokio::test]
    async fn test_send_dm_refused_without_sending() {
        let h = harness(FakeTransport::new().with_peer(bob()), InMemoryStore::new());
        let err = SendDmTool
            .execute(h.ctx.clone(), json!({"user": "@bob", "text": "hi"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotWritable);
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_add_contact_makes_user_writable() {
        let h = harness(FakeTransport::new().with_peer(bob()), InMemoryStore::new());
        let out = AddContactTool.execute(h.ctx.clone(), json!({"user": "@bob"})).await.unwrap();
        assert_eq!(out["first_name"], "Bob");
        assert!(h.ctx.dm_gate.is_writable(42));
        assert_eq!(h.transport.contacts(), vec![42]);

        let before = h.transport.call_count();
        let out = CheckCanDmTool.execute(h.ctx.clone(), json!({"user": "@bob"})).await.unwrap();
        assert_eq!(out["reason"], "is_contact");
        // Resolved from the recency cache; the gate answers from its known set.
        assert_eq!(h.transport.call_count(), before);

        let out = SendDmTool
            .execute(h.ctx.clone(), json!({"user": "@bob", "text": "**hi**"}))
            .await
            .unwrap();
        assert_eq!(out["sent"], true);
        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 42);
    }
}
