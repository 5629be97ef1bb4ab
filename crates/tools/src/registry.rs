use hono_core::{ActionError, ErrorKind};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::dm::{AddContactTool, CheckCanDmTool, SendDmTool};
use crate::groups::{
    FetchGroupRulesTool, FetchGroupStaffTool, GetCurrentChatInfoTool, GetGroupInfoTool, GetGroupRulesTool,
    GetGroupStaffTool, GetPinnedMessagesTool, JoinGroupTool, LeaveGroupTool, RememberAboutGroupTool,
    SendMessageToGroupTool, UnmuteUserTool,
};
use crate::messages::{
    ClickButtonTool, DeleteMyMessageTool, ForwardMessageTool, GetChatContextTool, GetExtendedHistoryTool,
    ReplyToMessageTool, ScheduleMessageTool, SearchChatHistoryTool, SendReactionTool,
};
use crate::personal::{ExpressThoughtTool, SetMyReminderTool};
use crate::users::{
    GetCommonChatsTool, GetFullProfileTool, GetUserInfoTool, GetUserMemoryTool, RememberThisTool, ResolveUserTool,
};
use crate::{Tool, ToolContext, ToolResult};

#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        // Groups
        registry.register(Arc::new(JoinGroupTool));
        registry.register(Arc::new(LeaveGroupTool));
        registry.register(Arc::new(GetGroupInfoTool));
        registry.register(Arc::new(SendMessageToGroupTool));
        registry.register(Arc::new(GetGroupRulesTool));
        registry.register(Arc::new(GetGroupStaffTool));
        registry.register(Arc::new(FetchGroupRulesTool));
        registry.register(Arc::new(FetchGroupStaffTool));
        registry.register(Arc::new(UnmuteUserTool));
        registry.register(Arc::new(GetCurrentChatInfoTool));
        registry.register(Arc::new(RememberAboutGroupTool));
        registry.register(Arc::new(GetPinnedMessagesTool));

        // Messages
        registry.register(Arc::new(GetChatContextTool));
        registry.register(Arc::new(GetExtendedHistoryTool));
        registry.register(Arc::new(SearchChatHistoryTool));
        registry.register(Arc::new(SendReactionTool));
        registry.register(Arc::new(DeleteMyMessageTool));
        registry.register(Arc::new(ScheduleMessageTool));
        registry.register(Arc::new(ForwardMessageTool));
        registry.register(Arc::new(ReplyToMessageTool));
        registry.register(Arc::new(ClickButtonTool));

        // Users
        registry.register(Arc::new(GetUserInfoTool));
        registry.register(Arc::new(GetUserMemoryTool));
        registry.register(Arc::new(RememberThisTool));
        registry.register(Arc::new(ResolveUserTool));
        registry.register(Arc::new(GetCommonChatsTool));
        registry.register(Arc::new(GetFullProfileTool));

        // Direct messages
        registry.register(Arc::new(CheckCanDmTool));
        registry.register(Arc::new(SendDmTool));
        registry.register(Arc::new(AddContactTool));

        // Self
        registry.register(Arc::new(SetMyReminderTool));
        registry.register(Arc::new(ExpressThoughtTool));

        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        debug!(name = schema.name, "Registering tool");
        self.tools.insert(schema.name.to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Function-calling schemas, sorted by name so the advertised list is stable.
    pub fn get_tool_schemas(&self) -> Vec<Value> {
        let mut tools: Vec<&Arc<dyn Tool>> = self.tools.values().collect();
        tools.sort_by_key(|t| t.schema().name);
        tools
            .into_iter()
            .map(|tool| {
                let schema = tool.schema();
                json!({
                    "type": "function",
                    "function": {
                        "name": schema.name,
                        "description": schema.description,
                        "parameters": schema.parameters
                    }
                })
            })
            .collect()
    }

    /// Sorted tool names.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Looks up, validates and authorizes before running the tool. Nothing but the lookup
    /// happens for an unknown name.
    pub async fn execute(&self, name: &str, ctx: ToolContext, params: Value) -> ToolResult {
        let tool = self.get(name).ok_or_else(|| {
            ActionError::new(ErrorKind::UnknownOperation, format!("Unknown tool: {}", name))
        })?;

        if let Err(e) = tool.validate(&params) {
            warn!(tool = name, error = %e, "Tool validation failed");
            return Err(e);
        }

        if let Some(required) = tool.required_role() {
            if !ctx.sender_role.satisfies(required) {
                warn!(tool = name, role = ctx.sender_role.as_str(), required = required.as_str(), "Permission denied: insufficient role");
                return Err(ActionError::forbidden(format!(
                    "'{}' requires the {} role",
                    name,
                    required.as_str()
                )));
            }
        }

        debug!(tool = name, "Executing tool");
        tool.execute(ctx, params).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
