//! Agent Loop Controller: model round, sequential tool dispatch, repeat until plain text.

use hono_core::config::AgentConfig;
use hono_core::types::{ConversationState, LLMResponse};
use hono_core::{Error, Result};
use hono_providers::Provider;
use hono_tools::{Dispatcher, ToolContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reply used when the model keeps asking for tools past the round cap.
pub const ROUND_LIMIT_FALLBACK: &str = "Sorry, I got a bit lost there. Could you say that again?";

#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub text: String,
    pub rounds: u32,
    pub tool_calls: usize,
    pub hit_round_limit: bool,
}

/// Exponential backoff for retry `attempt` (1-based), doubling up to 16x the base delay.
fn retry_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.saturating_sub(1).min(4);
    Duration::from_millis(base_ms.saturating_mul(factor))
}

pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    followup: Option<Arc<dyn Provider>>,
    dispatcher: Dispatcher,
    max_rounds: u32,
    max_retries: u32,
    retry_delay_ms: u64,
    max_rate_limit_wait: Duration,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn Provider>, dispatcher: Dispatcher, config: &AgentConfig) -> Self {
        Self {
            provider,
            followup: None,
            dispatcher,
            max_rounds: config.max_rounds.max(1),
            max_retries: config.llm_max_retries,
            retry_delay_ms: config.llm_retry_delay_ms,
            max_rate_limit_wait: Duration::from_secs(60),
        }
    }

    /// Provider for every round after the first tool round.
    pub fn with_followup(mut self, provider: Arc<dyn Provider>) -> Self {
        self.followup = Some(provider);
        self
    }

    pub fn with_rate_limit_cap(mut self, cap: Duration) -> Self {
        self.max_rate_limit_wait = cap;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    async fn chat_with_retry(&self, provider: &dyn Provider, state: &ConversationState, round: u32) -> Result<LLMResponse> {
        let tools = self.dispatcher.schemas();
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = retry_delay(self.retry_delay_ms, attempt);
                warn!(attempt, max_retries = self.max_retries, delay_ms = delay.as_millis() as u64, round, "Retrying LLM call after transient error");
                tokio::time::sleep(delay).await;
            }
            match provider.chat(state.turns(), &tools).await {
                Ok(r) => {
                    if attempt > 0 {
                        info!(attempt, round, "LLM call succeeded after retry");
                    }
                    return Ok(r);
                }
                Err(e) => {
                    warn!(error = %e, attempt, max_retries = self.max_retries, round, "LLM call failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Provider("no attempts made".to_string())))
    }

    /// Runs rounds until the model answers in plain text or `max_rounds` is spent. Every tool
    /// result is appended to `state` before the next model call.
    pub async fn run(&self, state: &mut ConversationState, ctx: &ToolContext) -> Result<LoopOutcome> {
        let mut tool_calls = 0usize;

        for round in 1..=self.max_rounds {
            let provider = match (&self.followup, tool_calls > 0) {
                (Some(followup), true) => followup.as_ref(),
                _ => self.provider.as_ref(),
            };
            let response = self.chat_with_retry(provider, state, round).await?;

            info!(
                round,
                content_len = response.content.as_ref().map(|c| c.len()).unwrap_or(0),
                tool_calls_count = response.tool_calls.len(),
                finish_reason = %response.finish_reason,
                "LLM response received"
            );

            if response.tool_calls.is_empty() {
                return Ok(LoopOutcome {
                    text: response.content.unwrap_or_default(),
                    rounds: round,
                    tool_calls,
                    hit_round_limit: false,
                });
            }

            state.push_tool_calls(response.content.as_deref(), &response.tool_calls);

            let batch = response.tool_calls.len();
            for (idx, call) in response.tool_calls.iter().enumerate() {
                let result = self.dispatcher.dispatch(call, ctx).await;
                state.push_tool_result(call, &result.to_value());
                tool_calls += 1;

                if result.is_rate_limited() && idx + 1 < batch {
                    let wait = result.retry_after.unwrap_or_default().min(self.max_rate_limit_wait);
                    warn!(tool = %call.name, wait_secs = wait.as_secs(), "Rate limited, pausing before next call");
                    tokio::time::sleep(wait).await;
                }
            }
            debug!(round, batch, "Tool round complete");
        }

        warn!(max_rounds = self.max_rounds, tool_calls, "Reached max rounds");
        Ok(LoopOutcome {
            text: ROUND_LIMIT_FALLBACK.to_string(),
            rounds: self.max_rounds,
            tool_calls,
            hit_round_limit: true,
        })
    }
}
