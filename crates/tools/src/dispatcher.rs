//! Action Dispatcher: runs one tool call against the registry and always produces an
//! [`ActionResult`], including for panics inside an operation.

use futures::FutureExt;
use hono_core::types::ToolCallRequest;
use hono_core::{ActionError, ActionResult};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

use crate::{ToolContext, ToolRegistry};

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
}

impl Dispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn schemas(&self) -> Vec<Value> {
        self.registry.get_tool_schemas()
    }

    pub async fn dispatch(&self, call: &ToolCallRequest, ctx: &ToolContext) -> ActionResult {
        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.registry.execute(&call.name, ctx.clone(), call.arguments.clone()))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(payload)) => ActionResult::ok(payload),
            Ok(Err(e)) => {
                warn!(tool = %call.name, call_id = %call.id, kind = %e.kind, error = %e.message, "Tool call failed");
                ActionResult::failure(e)
            }
            Err(_) => {
                error!(tool = %call.name, call_id = %call.id, "Tool panicked");
                ActionResult::failure(ActionError::internal(format!("operation '{}' crashed", call.name)))
            }
        };
        debug!(
            tool = %call.name,
            success = result.success,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Tool call finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::harness;
    use crate::{Tool, ToolResult, ToolSchema};
    use async_trait::async_trait;
    use hono_channels::testing::FakeTransport;
    use hono_core::{ChatRole, ErrorKind};
    use hono_storage::InMemoryStore;
    use serde_json::json;

    struct PanickingTool;

    #[async_trait]
    impl Tool for PanickingTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "explode",
                description: "always panics",
                parameters: json!({"type": "object", "properties": {}}),
            }
        }

        async fn execute(&self, _ctx: ToolContext, _params: Value) -> ToolResult {
            panic!("boom")
        }
    }

    fn call(name: &str, args: Value) -> ToolCallRequest {
        ToolCallRequest::new(name, args)
    }

    #[tokio::test]
    async fn test_unknown_operation_has_no_side_effects() {
        let h = harness(FakeTransport::new(), InMemoryStore::new());
        let dispatcher = Dispatcher::new(ToolRegistry::with_defaults());
        let result = dispatcher.dispatch(&call("teleport", json!({"where": "moon"})), &h.ctx).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::UnknownOperation));
        assert_eq!(h.transport.call_count(), 0);
        assert_eq!(h.store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_arguments_are_rejected_before_execution() {
        let h = harness(FakeTransport::new(), InMemoryStore::new());
        let dispatcher = Dispatcher::new(ToolRegistry::with_defaults());
        let result = dispatcher.dispatch(&call("join_group", json!({})), &h.ctx).await;
        assert_eq!(result.error_kind, Some(ErrorKind::InvalidArguments));
        assert_eq!(h.transport.call_count(), 0);
        assert_eq!(h.store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_role_checked_before_resolution() {
        let h = harness(FakeTransport::new(), InMemoryStore::new());
        let ctx = h.ctx.clone().in_chat(-1, Some(1)).with_sender(5, ChatRole::Admin);
        let dispatcher = Dispatcher::new(ToolRegistry::with_defaults());
        let result = dispatcher
            .dispatch(&call("unmute_user", json!({"username": "bob", "group_link": "Some Group"})), &ctx)
            .await;
        assert_eq!(result.error_kind, Some(ErrorKind::Forbidden));
        assert_eq!(h.transport.call_count(), 0);
        assert_eq!(h.store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_error() {
        let h = harness(FakeTransport::new(), InMemoryStore::new());
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(PanickingTool));
        let result = Dispatcher::new(registry).dispatch(&call("explode", json!({})), &h.ctx).await;
        assert_eq!(result.error_kind, Some(ErrorKind::InternalError));
        assert_eq!(result.to_value()["success"], false);
    }

    #[tokio::test]
    async fn test_join_last_uses_directory_without_live_lookup() {
        let store = InMemoryStore::new();
        store.seed_chat(555, "Test", None, 1_700_000_000);
        let h = harness(FakeTransport::new(), store);
        let dispatcher = Dispatcher::new(ToolRegistry::with_defaults());

        let result = dispatcher
            .dispatch(&call("join_group", json!({"group_link": "last"})), &h.ctx)
            .await;
        assert!(result.success);
        assert_eq!(result.payload["group_id"], 555);
        assert_eq!(result.payload["already_member"], true);
        assert_eq!(h.transport.call_count(), 0);
    }
}
