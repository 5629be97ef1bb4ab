use async_trait::async_trait;
use hono_core::{truncate_chars, ActionError};
use hono_storage::NewReminder;
use serde_json::{json, Value};
use tracing::info;

use crate::messages::now_ts;
use crate::{arg_i64, arg_str, require_str, Tool, ToolContext, ToolResult, ToolSchema};

const MAX_DELAY_MINUTES: i64 = 7 * 24 * 60;

pub struct SetMyReminderTool;

#[async_trait]
impl Tool for SetMyReminderTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "set_my_reminder",
            description: "Remind yourself to do something later: write to someone, check a group, follow up.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string", "description": "What to remember to do"},
                    "delay_minutes": {"type": "integer", "description": "Minutes from now"},
                    "target": {"type": "string", "description": "Who or where: user id, @username or group:<title>"}
                },
                "required": ["text", "delay_minutes"]
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> ToolResult {
        let text = truncate_chars(require_str(&params, "text")?, 500);
        let delay = arg_i64(&params, "delay_minutes").unwrap_or(0);
        if !(1..=MAX_DELAY_MINUTES).contains(&delay) {
            return Err(ActionError::invalid(format!(
                "delay_minutes must be between 1 and {}",
                MAX_DELAY_MINUTES
            )));
        }

        let target = arg_str(&params, "target").map(str::trim).filter(|t| !t.is_empty());
        let chat_id = match target.and_then(|t| t.parse::<i64>().ok()) {
            Some(id) => id,
            None => ctx.active_chat.unwrap_or(0),
        };

        let id = ctx
            .store
            .add_reminder(&NewReminder {
                chat_id,
                text: text.clone(),
                due_at: now_ts() + delay * 60,
                target: target.map(str::to_string),
            })
            .await?;
        info!(reminder_id = id, chat_id, delay, "Reminder set");
        Ok(json!({
            "reminder_set": true,
            "reminder_id": id,
            "in_minutes": delay,
            "text": text,
            "target": target
        }))
    }
}

pub struct ExpressThoughtTool;

#[async_trait]
impl Tool for ExpressThoughtTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "express_thought",
            description: "Note a private thought or intention. Nothing is sent.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "thought": {"type": "string", "description": "The thought"},
                    "action": {"type": "string", "description": "What you intend to do about it"}
                },
                "required": ["thought"]
            }),
        }
    }

    async fn execute(&self, _ctx: ToolContext, params: Value) -> ToolResult {
        let thought = require_str(&params, "thought")?;
        Ok(json!({
            "noted": true,
            "thought": thought,
            "action": arg_str(&params, "action").unwrap_or("noted")
        }))
    }
}
