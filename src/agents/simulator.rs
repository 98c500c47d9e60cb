//! Turn-taking dialogue between the bot script and one simulated borrower.
//!
//! The bot opens with a fixed line, then the two sides alternate, each
//! generated from its own running history. A borrower turn carrying a
//! sentinel marker ends the call; otherwise the call ends as
//! [`Outcome::Unresolved`] once the turn cap is reached.

use std::time::Instant;
use tracing::{debug, info};

use super::AgentCore;
use crate::error::AppResult;
use crate::llm::{GenerationOptions, Message};
use crate::prompts::{borrower_simulator_prompt, call_opener, AGREEMENT_MARKER, HANG_UP_MARKER};
use crate::types::{BotScript, Conversation, ConversationTurn, Outcome, Persona, Speaker};

/// Terminal outcome signalled by a borrower turn, if any.
///
/// Matching is exact and case-sensitive. A turn carrying both markers
/// counts as a hang-up.
pub fn detect_sentinel(text: &str) -> Option<Outcome> {
    if text.contains(HANG_UP_MARKER) {
        Some(Outcome::HungUp)
    } else if text.contains(AGREEMENT_MARKER) {
        Some(Outcome::AgreementReached)
    } else {
        None
    }
}

/// Transcript plus each party's view of it.
///
/// A party sees its own turns as `assistant` and the other side's as `user`.
struct Dialogue {
    turns: Vec<ConversationTurn>,
    bot_history: Vec<Message>,
    borrower_history: Vec<Message>,
}

impl Dialogue {
    fn new(script: &BotScript, persona: &Persona) -> Self {
        Self {
            turns: Vec::new(),
            bot_history: vec![Message::system(&script.content)],
            borrower_history: vec![Message::system(borrower_simulator_prompt(persona))],
        }
    }

    fn len(&self) -> usize {
        self.turns.len()
    }

    fn next_turn_number(&self) -> u32 {
        self.turns.len() as u32 + 1
    }

    fn history(&self, speaker: Speaker) -> &[Message] {
        match speaker {
            Speaker::Bot => &self.bot_history,
            Speaker::Borrower => &self.borrower_history,
        }
    }

    fn record(&mut self, speaker: Speaker, content: String) {
        let turn_number = self.next_turn_number();
        debug_assert_eq!(Speaker::for_turn(turn_number), speaker);

        let (own, other) = match speaker {
            Speaker::Bot => (&mut self.bot_history, &mut self.borrower_history),
            Speaker::Borrower => (&mut self.borrower_history, &mut self.bot_history),
        };
        own.push(Message::assistant(&content));
        other.push(Message::user(&content));

        self.turns.push(ConversationTurn {
            role: speaker,
            content,
            turn_number,
        });
    }
}

/// Runs simulated collection calls.
pub struct ConversationSimulator {
    core: AgentCore,
}

impl ConversationSimulator {
    /// Create a new simulator
    pub fn new(core: AgentCore) -> Self {
        Self { core }
    }

    /// Simulate one call of `script` against `persona`.
    ///
    /// Any generation failure fails the whole conversation.
    pub async fn simulate(&self, script: &BotScript, persona: &Persona) -> AppResult<Conversation> {
        let start = Instant::now();
        let max_turns = self.core.config().max_turns;
        let options = GenerationOptions::with_temperature(self.core.config().temperature_conversation);

        info!(
            persona_id = %persona.id,
            name = %persona.name,
            difficulty = %persona.difficulty,
            emotional_state = %persona.emotional_state,
            script_version = script.version,
            "Starting conversation"
        );

        let mut dialogue = Dialogue::new(script, persona);
        dialogue.record(Speaker::Bot, call_opener(&persona.name));

        let outcome = loop {
            if dialogue.len() >= max_turns {
                break Outcome::Unresolved;
            }
            let reply = self.speak(Speaker::Borrower, &dialogue, &options).await?;
            let sentinel = detect_sentinel(&reply);
            dialogue.record(Speaker::Borrower, reply);
            if let Some(outcome) = sentinel {
                info!(
                    persona_id = %persona.id,
                    turn = dialogue.len(),
                    outcome = %outcome,
                    "Borrower ended the call"
                );
                break outcome;
            }

            if dialogue.len() >= max_turns {
                break Outcome::Unresolved;
            }
            let reply = self.speak(Speaker::Bot, &dialogue, &options).await?;
            dialogue.record(Speaker::Bot, reply);
        };

        let conversation = Conversation::new(&persona.id, dialogue.turns, outcome);
        info!(
            persona_id = %persona.id,
            turns = conversation.total_turns,
            outcome = %conversation.outcome,
            latency_ms = start.elapsed().as_millis(),
            "Conversation finished"
        );

        Ok(conversation)
    }

    async fn speak(
        &self,
        speaker: Speaker,
        dialogue: &Dialogue,
        options: &GenerationOptions,
    ) -> AppResult<String> {
        let turn = dialogue.next_turn_number();
        debug!(turn, speaker = speaker.label(), "Generating turn");

        self.core.pace().await;
        let reply = self
            .core
            .generator()
            .generate(dialogue.history(speaker), options)
            .await?;

        debug!(
            turn,
            speaker = speaker.label(),
            preview = %reply.chars().take(80).collect::<String>(),
            "Turn generated"
        );
        Ok(reply)
    }
}
