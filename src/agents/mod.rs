//! Agents that make up one evaluation iteration.
//!
//! - [`PersonaGenerator`]: borrower personas with a difficulty mix
//! - [`ConversationSimulator`]: bot-vs-borrower dialogue ending on a sentinel or the turn cap
//! - [`Judge`]: two-metric scoring with itemized failures
//! - [`FailureAnalyzer`]: cross-persona failure patterns
//! - [`ScriptRewriter`]: the next script version
//!
//! All agents share the generation capability and loop settings via
//! [`AgentCore`] composition.

mod analyzer;
mod core;
mod judge;
mod personas;
mod rewriter;
mod simulator;

pub use analyzer::*;
pub use core::*;
pub use judge::*;
pub use personas::*;
pub use rewriter::*;
pub use simulator::*;
