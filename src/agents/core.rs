//! Core infrastructure shared by all agents.
//!
//! [`AgentCore`] holds the injected generation capability and the loop
//! configuration. Each agent composes one instead of carrying the fields
//! itself.

use std::sync::Arc;
use std::time::Duration;

use crate::config::EvalConfig;
use crate::llm::Generator;

/// Generation capability plus loop settings, shared by every agent.
#[derive(Clone)]
pub struct AgentCore {
    generator: Arc<dyn Generator>,
    config: EvalConfig,
}

impl AgentCore {
    /// Create a new core with the given generator and configuration.
    pub fn new(generator: Arc<dyn Generator>, config: EvalConfig) -> Self {
        Self { generator, config }
    }

    /// Get a reference to the generation capability.
    #[inline]
    pub fn generator(&self) -> &dyn Generator {
        self.generator.as_ref()
    }

    /// Get a reference to the loop configuration.
    #[inline]
    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Fixed courtesy delay before a generation call.
    pub async fn pace(&self) {
        if self.config.pacing_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.pacing_delay_ms)).await;
        }
    }
}
