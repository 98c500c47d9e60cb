//! Deterministic generator for integration tests.
//!
//! Dispatches on the system prompt of each request so a single instance can
//! stand in for every agent in an iteration.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use collectbot_eval::error::{LlmError, LlmResult};
use collectbot_eval::llm::{GenerationOptions, Generator, Message};
use collectbot_eval::prompts::{FAILURE_AGGREGATOR_PROMPT, JUDGE_PROMPT, PERSONA_GENERATOR_PROMPT};

/// Which agent a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Personas,
    Borrower,
    Bot,
    Judge,
    Analyzer,
    Rewriter,
}

fn classify(messages: &[Message]) -> Call {
    let system = messages.first().map(|m| m.content.as_str()).unwrap_or("");
    if system == PERSONA_GENERATOR_PROMPT {
        Call::Personas
    } else if system == JUDGE_PROMPT {
        Call::Judge
    } else if system == FAILURE_AGGREGATOR_PROMPT {
        Call::Analyzer
    } else if system.starts_with("You are playing a borrower") {
        Call::Borrower
    } else if system.starts_with("You are a prompt engineer") {
        Call::Rewriter
    } else {
        Call::Bot
    }
}

/// Scripted stand-in for the chat-completions API.
pub struct ScriptedGenerator {
    persona_count: usize,
    /// Judge call `n` scores both metrics `judge_scores[n]`; the last entry repeats.
    judge_scores: Vec<f64>,
    /// Borrower turns before the borrower agrees.
    borrower_turns_before_agreeing: usize,
    /// Judge call index that fails with an API error.
    fail_judge_at: Option<usize>,
    judge_calls: AtomicUsize,
    borrower_calls: AtomicUsize,
    rewrite_calls: AtomicUsize,
    log: Mutex<Vec<Call>>,
}

impl ScriptedGenerator {
    pub fn new(persona_count: usize, judge_scores: Vec<f64>) -> Self {
        Self {
            persona_count,
            judge_scores,
            borrower_turns_before_agreeing: 1,
            fail_judge_at: None,
            judge_calls: AtomicUsize::new(0),
            borrower_calls: AtomicUsize::new(0),
            rewrite_calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_judge_at(mut self, index: usize) -> Self {
        self.fail_judge_at = Some(index);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    fn personas(&self) -> String {
        let tiers = ["easy", "medium", "hard"];
        let personas: Vec<serde_json::Value> = (0..self.persona_count)
            .map(|i| {
                json!({
                    "id": format!("model-{}", i),
                    "name": format!("Borrower {}", i),
                    "age": 25 + i,
                    "occupation": "Teacher",
                    "loanAmount": 120000,
                    "monthsOverdue": 2 + i,
                    "financialSituation": "Salary delayed",
                    "emotionalState": "stressed",
                    "tactics": ["asks for time"],
                    "backstory": "Lives in Nagpur",
                    "difficulty": tiers[i % 3]
                })
            })
            .collect();
        format!("```json\n{}\n```", serde_json::Value::Array(personas))
    }

    fn judge(&self) -> LlmResult<String> {
        let n = self.judge_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_judge_at == Some(n) {
            return Err(LlmError::Api {
                status: 503,
                message: "judge unavailable".to_string(),
            });
        }
        let score = self.judge_scores[n.min(self.judge_scores.len() - 1)];
        Ok(json!({
            "metrics": {
                "negotiationEffectiveness": {
                    "score": score,
                    "reasoning": "Scripted",
                    "examples": ["Turn 1: opener"]
                },
                "responseRelevance": {
                    "score": score,
                    "reasoning": "Scripted",
                    "examples": []
                }
            },
            "failures": if score < 7.0 {
                json!([{
                    "turnNumber": 3,
                    "metric": "responseRelevance",
                    "description": "Ignored the delayed salary",
                    "severity": "medium",
                    "suggestedFix": "Acknowledge the delay"
                }])
            } else {
                json!([])
            }
        })
        .to_string())
    }

    fn borrower(&self, messages: &[Message]) -> String {
        self.borrower_calls.fetch_add(1, Ordering::SeqCst);
        // system + opener, then two messages per completed exchange
        let own_turns = messages.len().saturating_sub(2) / 2;
        if own_turns >= self.borrower_turns_before_agreeing {
            "Alright, I can do that. [AGREES TO PLAN]".to_string()
        } else {
            "My salary has not come this month.".to_string()
        }
    }

    fn rewrite(&self) -> String {
        let n = self.rewrite_calls.fetch_add(1, Ordering::SeqCst);
        format!(
            "REWRITTEN SCRIPT {}\nAcknowledge hardship first.\n---CHANGES---\n- Added hardship acknowledgement",
            n + 1
        )
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        messages: &[Message],
        _options: &GenerationOptions,
    ) -> LlmResult<String> {
        let call = classify(messages);
        self.log.lock().unwrap().push(call);

        match call {
            Call::Personas => Ok(self.personas()),
            Call::Borrower => Ok(self.borrower(messages)),
            Call::Bot => Ok("I understand. Could you pay half by the 15th?".to_string()),
            Call::Judge => self.judge(),
            Call::Analyzer => Ok(json!({
                "patterns": [{
                    "pattern": "Ignores hardship",
                    "frequency": "3 of 3",
                    "severity": "high",
                    "affectedPersonaTypes": ["stressed"],
                    "rootCause": "No empathy step",
                    "suggestedFix": "Acknowledge hardship before asking"
                }],
                "strengths": ["Polite"],
                "prioritizedFixes": ["Acknowledge hardship"]
            })
            .to_string()),
            Call::Rewriter => Ok(self.rewrite()),
        }
    }
}
