//! # Collectbot Eval
//!
//! A self-correcting evaluation loop for debt-collection voice-bot scripts.
//! Each iteration generates synthetic borrower personas, simulates a call
//! against the current script for every persona, scores each call with an
//! LLM judge and summarizes the batch. When the average score falls short
//! of the threshold, the failures are analyzed and the script is rewritten
//! for the next iteration.
//!
//! ## Architecture
//!
//! ```text
//! CLI → Orchestrator → Agents → Generator (Groq chat completions, HTTP)
//!            ↓
//!      Artifact store (JSON files or SQLite)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use collectbot_eval::{Config, Orchestrator};
//! use collectbot_eval::llm::GroqClient;
//! use collectbot_eval::storage::{open_store, Artifacts};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let store = open_store(&config.store).await?;
//!     let client = GroqClient::new(&config.groq, config.request.clone())?;
//!     let orchestrator = Orchestrator::new(Arc::new(client), config.eval.clone(), Artifacts::new(store));
//!     let result = orchestrator.run_iteration(0, 6, 7.5).await?;
//!     println!("done = {}", result.done);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Agents that generate, simulate, judge, analyze and rewrite.
pub mod agents;
/// CLI subcommands and their execution.
pub mod cli;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Generation capability and the Groq client.
pub mod llm;
/// Iteration summaries.
pub mod metrics;
/// Iteration orchestration and the run driver.
pub mod orchestrator;
/// System prompts, sentinel markers and the seed script.
pub mod prompts;
/// Artifact persistence.
pub mod storage;
/// Data model shared by all components.
pub mod types;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use orchestrator::{Orchestrator, RunReport};
