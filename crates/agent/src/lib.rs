pub mod agent_loop;
pub mod chat_lock;
pub mod context;
pub mod runtime;

pub use agent_loop::{AgentLoop, LoopOutcome, ROUND_LIMIT_FALLBACK};
pub use chat_lock::ChatLocks;
pub use context::{ChatSnapshot, ContextBuilder};
pub use runtime::AgentRuntime;
