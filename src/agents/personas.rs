use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::AgentCore;
use crate::error::{AppError, AppResult};
use crate::llm::{generate_json, schema_mismatch, GenerationOptions, Message};
use crate::prompts::PERSONA_GENERATOR_PROMPT;
use crate::types::Persona;

/// Output budget for a persona batch.
const PERSONA_MAX_TOKENS: u32 = 4096;

/// Models return either a bare array or an object wrapping one.
#[derive(Deserialize)]
#[serde(untagged)]
enum PersonaBatch {
    List(Vec<Persona>),
    Wrapped { personas: Vec<Persona> },
}

impl PersonaBatch {
    fn into_vec(self) -> Vec<Persona> {
        match self {
            PersonaBatch::List(p) | PersonaBatch::Wrapped { personas: p } => p,
        }
    }
}

/// Produces borrower personas with a difficulty mix.
pub struct PersonaGenerator {
    core: AgentCore,
}

impl PersonaGenerator {
    /// Create a new persona generator
    pub fn new(core: AgentCore) -> Self {
        Self { core }
    }

    /// Generate `count` personas with ids `persona-0..count`.
    pub async fn generate(&self, count: usize) -> AppResult<Vec<Persona>> {
        if count == 0 {
            return Err(AppError::Precondition {
                message: "Persona count must be at least 1".to_string(),
            });
        }
        let start = Instant::now();
        let (easy, medium, hard) = self.core.config().persona_mix.apportion(count);
        info!(count, easy, medium, hard, "Generating personas");

        let messages = vec![
            Message::system(PERSONA_GENERATOR_PROMPT),
            Message::user(format!(
                "Generate exactly {} personas: {} easy, {} medium and {} hard. \
                 Give them the ids \"persona-0\", \"persona-1\" and so on.",
                count, easy, medium, hard
            )),
        ];
        let options = GenerationOptions::with_temperature(self.core.config().temperature_structured)
            .with_max_tokens(PERSONA_MAX_TOKENS);

        self.core.pace().await;
        let (batch, completion) =
            generate_json::<PersonaBatch, _>(self.core.generator(), &messages, &options).await?;
        let mut personas = batch.into_vec();

        if personas.len() > count {
            debug!(returned = personas.len(), count, "Truncating surplus personas");
            personas.truncate(count);
        } else if personas.len() < count {
            warn!(returned = personas.len(), count, "Fewer personas than requested");
        }
        if personas.is_empty() {
            return Err(schema_mismatch("persona batch is empty", &completion).into());
        }

        let personas = assign_ids(personas);
        info!(
            count = personas.len(),
            latency_ms = start.elapsed().as_millis(),
            names = %personas
                .iter()
                .map(|p| format!("{} ({})", p.name, p.difficulty))
                .collect::<Vec<_>>()
                .join(", "),
            "Personas generated"
        );

        Ok(personas)
    }
}

/// Overwrite whatever ids the model produced with `persona-<index>`.
pub fn assign_ids(personas: Vec<Persona>) -> Vec<Persona> {
    personas
        .into_iter()
        .enumerate()
        .map(|(i, p)| Persona {
            id: format!("persona-{}", i),
            ..p
        })
        .collect()
}
