use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// A tool call request that serializes to the OpenAI-compatible format:
/// `{id, type: "function", function: {name, arguments}}`
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(name: &str, arguments: Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: name.to_string(),
            arguments,
        }
    }
}

impl Serialize for ToolCallRequest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("type", "function")?;
        map.serialize_entry("function", &serde_json::json!({
            "name": self.name,
            "arguments": self.arguments.to_string()
        }))?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for ToolCallRequest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let obj = value.as_object().ok_or_else(|| serde::de::Error::custom("expected object"))?;

        let id = obj
            .get("id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));

        let func = obj.get("function").and_then(|v| v.as_object()).unwrap_or(obj);
        let name = func
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let arguments = match func.get("arguments") {
            Some(Value::String(s)) => parse_arguments(s),
            Some(v) => v.clone(),
            None => Value::Object(serde_json::Map::new()),
        };

        Ok(ToolCallRequest { id, name, arguments })
    }
}

/// Tool arguments arrive as a JSON string; malformed input degrades to an empty object
/// so the dispatcher reports the missing fields instead of the loop failing.
pub fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(error = %e, raw = %raw, "Failed to parse tool call arguments as JSON, using empty object");
        Value::Object(serde_json::Map::new())
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LLMResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub finish_reason: String,
    pub usage: Value,
}

impl LLMResponse {
    pub fn text(content: &str) -> Self {
        Self {
            content: Some(content.to_string()),
            finish_reason: "stop".to_string(),
            ..Default::default()
        }
    }

    pub fn calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls: calls,
            finish_reason: "tool_calls".to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    fn with_role(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Value::String(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: &str) -> Self {
        Self::with_role("system", content)
    }

    pub fn user(content: &str) -> Self {
        Self::with_role("user", content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::with_role("assistant", content)
    }

    pub fn tool_result(tool_call_id: &str, name: &str, content: &str) -> Self {
        let mut msg = Self::with_role("tool", content);
        msg.tool_call_id = Some(tool_call_id.to_string());
        msg.name = Some(name.to_string());
        msg
    }

    pub fn text(&self) -> &str {
        self.content.as_str().unwrap_or_default()
    }
}

/// Ordered, append-only conversation handed to the model gateway.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    turns: Vec<ChatMessage>,
}

impl ConversationState {
    pub fn new(system_prompt: &str) -> Self {
        Self {
            turns: vec![ChatMessage::system(system_prompt)],
        }
    }

    pub fn push_user(&mut self, content: &str) {
        self.turns.push(ChatMessage::user(content));
    }

    /// Prior assistant output replayed as context, without tool calls.
    pub fn push_assistant_text(&mut self, content: &str) {
        self.turns.push(ChatMessage::assistant(content));
    }

    /// Records the calls the model asked for; must precede their results.
    pub fn push_tool_calls(&mut self, content: Option<&str>, calls: &[ToolCallRequest]) {
        let mut msg = ChatMessage::assistant(content.unwrap_or(""));
        msg.tool_calls = Some(calls.to_vec());
        self.turns.push(msg);
    }

    pub fn push_tool_result(&mut self, call: &ToolCallRequest, result: &Value) {
        self.turns
            .push(ChatMessage::tool_result(&call.id, &call.name, &result.to_string()));
    }

    pub fn turns(&self) -> &[ChatMessage] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_call_openai_format() {
        let call = ToolCallRequest {
            id: "call_1".to_string(),
            name: "join_group".to_string(),
            arguments: json!({"group_link": "last"}),
        };
        let v = serde_json::to_value(&call).unwrap();
        assert_eq!(v["type"], "function");
        assert_eq!(v["function"]["name"], "join_group");
        assert_eq!(v["function"]["arguments"], r#"{"group_link":"last"}"#);

        let back: ToolCallRequest = serde_json::from_value(v).unwrap();
        assert_eq!(back, call);
    }

    #[test]
    fn test_tool_call_malformed_arguments_become_empty() {
        let raw = json!({"id": "c", "function": {"name": "x", "arguments": "{not json"}});
        let call: ToolCallRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(call.arguments, json!({}));
    }

    #[test]
    fn test_tool_call_missing_id_is_generated() {
        let raw = json!({"name": "x", "arguments": {"a": 1}});
        let call: ToolCallRequest = serde_json::from_value(raw).unwrap();
        assert!(call.id.starts_with("call_"));
        assert_eq!(call.arguments["a"], 1);
    }

    #[test]
    fn test_conversation_state_appends_in_order() {
        let mut state = ConversationState::new("sys");
        state.push_user("hi");
        let call = ToolCallRequest::new("express_thought", json!({"thought": "hm"}));
        state.push_tool_calls(None, std::slice::from_ref(&call));
        state.push_tool_result(&call, &json!({"success": true}));

        let roles: Vec<&str> = state.turns().iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool"]);
        assert_eq!(state.turns()[3].tool_call_id.as_deref(), Some(call.id.as_str()));
    }
}
