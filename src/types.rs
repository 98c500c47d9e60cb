//! Data model for personas, scripts, conversations and their evaluations.
//!
//! Every artifact serializes with camelCase keys so persisted files read the
//! same regardless of which store backend wrote them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Score at or above which a single evaluation passes.
pub const PASS_SCORE: f64 = 7.0;

/// Maximum number of failure descriptions kept in an iteration summary.
pub const MAX_SUMMARY_FAILURES: usize = 10;

/// Difficulty tier of a persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Get the tier name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Synthetic borrower profile used to stress-test a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    /// `persona-<n>`, assigned by the generator.
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub age: u32,
    pub occupation: String,
    pub loan_amount: f64,
    pub months_overdue: u32,
    pub financial_situation: String,
    pub emotional_state: String,
    #[serde(default)]
    pub tactics: Vec<String>,
    #[serde(default)]
    pub backstory: String,
    pub difficulty: Difficulty,
}

/// A versioned bot system prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotScript {
    pub version: u32,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// `None` only for the seed script.
    pub parent_version: Option<u32>,
    pub changes_summary: Option<String>,
}

impl BotScript {
    /// Version 0 of the chain.
    pub fn seed(content: impl Into<String>) -> Self {
        Self {
            version: 0,
            content: content.into(),
            created_at: Utc::now(),
            parent_version: None,
            changes_summary: None,
        }
    }

    /// The next version in the chain, derived from this one.
    pub fn successor(&self, content: impl Into<String>, changes_summary: impl Into<String>) -> Self {
        Self {
            version: self.version + 1,
            content: content.into(),
            created_at: Utc::now(),
            parent_version: Some(self.version),
            changes_summary: Some(changes_summary.into()),
        }
    }
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Bot,
    Borrower,
}

impl Speaker {
    /// Speaker expected at a 1-based turn number; the bot owns odd turns.
    pub fn for_turn(turn_number: u32) -> Self {
        if turn_number % 2 == 1 {
            Speaker::Bot
        } else {
            Speaker::Borrower
        }
    }

    /// Transcript label
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::Bot => "BOT",
            Speaker::Borrower => "BORROWER",
        }
    }
}

/// One utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub role: Speaker,
    pub content: String,
    pub turn_number: u32,
}

/// Terminal outcome of a simulated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    AgreementReached,
    /// Not produced by the simulator.
    CallEnded,
    /// Not produced by the simulator.
    Escalation,
    HungUp,
    Unresolved,
}

impl Outcome {
    /// Get the outcome tag as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::AgreementReached => "agreement_reached",
            Outcome::CallEnded => "call_ended",
            Outcome::Escalation => "escalation",
            Outcome::HungUp => "hung_up",
            Outcome::Unresolved => "unresolved",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Full transcript for one (script version, persona) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub persona_id: String,
    pub turns: Vec<ConversationTurn>,
    pub outcome: Outcome,
    pub total_turns: usize,
}

impl Conversation {
    /// Build a conversation, deriving `total_turns` from the turn list.
    pub fn new(persona_id: impl Into<String>, turns: Vec<ConversationTurn>, outcome: Outcome) -> Self {
        let total_turns = turns.len();
        Self {
            persona_id: persona_id.into(),
            turns,
            outcome,
            total_turns,
        }
    }

    /// Render as `[Turn n] SPEAKER: text` lines.
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("[Turn {}] {}: {}", t.turn_number, t.role.label(), t.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Score for one rubric metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricScore {
    pub score: f64,
    pub reasoning: String,
    #[serde(default)]
    pub examples: Vec<String>,
}

/// The two rubric metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationMetrics {
    pub negotiation_effectiveness: MetricScore,
    pub response_relevance: MetricScore,
}

/// Severity tier shared by failures and failure patterns.
///
/// Written lowercase; capitalized labels from the model are accepted on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[serde(alias = "Low", alias = "LOW")]
    Low,
    #[serde(alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "High", alias = "HIGH")]
    High,
}

/// One defect instance at a specific turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailurePoint {
    pub turn_number: u32,
    pub metric: String,
    pub description: String,
    pub severity: Severity,
    pub suggested_fix: String,
}

/// Scoring of one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub persona_id: String,
    pub conversation_id: String,
    pub metrics: EvaluationMetrics,
    pub overall_score: f64,
    #[serde(default)]
    pub failures: Vec<FailurePoint>,
    pub passed: bool,
}

impl Evaluation {
    /// Build an evaluation whose overall score and pass flag derive from the metrics.
    pub fn new(
        persona_id: impl Into<String>,
        metrics: EvaluationMetrics,
        failures: Vec<FailurePoint>,
    ) -> Self {
        let persona_id = persona_id.into();
        let overall_score =
            (metrics.negotiation_effectiveness.score + metrics.response_relevance.score) / 2.0;
        Self {
            conversation_id: format!("{}-conv", persona_id),
            persona_id,
            metrics,
            overall_score,
            failures,
            passed: overall_score >= PASS_SCORE,
        }
    }
}

/// Reduction of all evaluations for one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationSummary {
    pub iteration: u32,
    pub script_version: u32,
    pub avg_negotiation_score: f64,
    pub avg_relevance_score: f64,
    pub avg_overall_score: f64,
    pub pass_rate: f64,
    pub total_personas: usize,
    pub failure_patterns: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// A failure mode recurring across personas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailurePattern {
    pub pattern: String,
    pub frequency: String,
    pub severity: Severity,
    #[serde(default)]
    pub affected_persona_types: Vec<String>,
    pub root_cause: String,
    pub suggested_fix: String,
}

/// Cross-persona failure analysis for one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureAnalysis {
    pub patterns: Vec<FailurePattern>,
    #[serde(default)]
    pub strengths: Vec<String>,
    /// Most important first.
    #[serde(default)]
    pub prioritized_fixes: Vec<String>,
}

/// Why a run stopped issuing iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    ThresholdMet,
    MaxIterations,
    Stopped,
}

/// Outcome of one orchestrated iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationResult {
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<StopReason>,
    pub summary: IterationSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_iteration: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metric(score: f64) -> MetricScore {
        MetricScore {
            score,
            reasoning: "because".to_string(),
            examples: vec!["Turn 3: offered EMI".to_string()],
        }
    }

    #[test]
    fn test_speaker_alternation() {
        assert_eq!(Speaker::for_turn(1), Speaker::Bot);
        assert_eq!(Speaker::for_turn(2), Speaker::Borrower);
        assert_eq!(Speaker::for_turn(19), Speaker::Bot);
    }

    #[test]
    fn test_outcome_serializes_snake_case() {
        assert_eq!(serde_json::to_value(Outcome::HungUp).unwrap(), json!("hung_up"));
        assert_eq!(
            serde_json::to_value(Outcome::AgreementReached).unwrap(),
            json!("agreement_reached")
        );
        assert_eq!(Outcome::CallEnded.to_string(), "call_ended");
    }

    #[test]
    fn test_severity_accepts_capitalized_labels() {
        let parsed: Vec<Severity> =
            serde_json::from_value(json!(["High", "medium", "LOW"])).unwrap();
        assert_eq!(parsed, vec![Severity::High, Severity::Medium, Severity::Low]);
        assert_eq!(serde_json::to_value(Severity::High).unwrap(), json!("high"));
        assert!(serde_json::from_value::<Severity>(json!("critical")).is_err());
    }

    #[test]
    fn test_evaluation_derives_overall_and_pass() {
        let eval = Evaluation::new(
            "persona-2",
            EvaluationMetrics {
                negotiation_effectiveness: metric(8.0),
                response_relevance: metric(6.0),
            },
            vec![],
        );
        assert_eq!(eval.overall_score, 7.0);
        assert!(eval.passed);
        assert_eq!(eval.conversation_id, "persona-2-conv");

        let eval = Evaluation::new(
            "persona-3",
            EvaluationMetrics {
                negotiation_effectiveness: metric(7.0),
                response_relevance: metric(6.5),
            },
            vec![],
        );
        assert_eq!(eval.overall_score, 6.75);
        assert!(!eval.passed);
    }

    #[test]
    fn test_script_successor_links_versions() {
        let seed = BotScript::seed("be polite");
        assert_eq!(seed.parent_version, None);

        let next = seed.successor("be polite and firm", "- firmer");
        assert_eq!(next.version, 1);
        assert_eq!(next.parent_version, Some(0));
        assert_eq!(next.changes_summary.as_deref(), Some("- firmer"));
    }

    #[test]
    fn test_persona_deserializes_camel_case_without_id() {
        let persona: Persona = serde_json::from_value(json!({
            "name": "Ravi Kumar",
            "age": 34,
            "occupation": "Auto driver",
            "loanAmount": 85000,
            "monthsOverdue": 4,
            "financialSituation": "Lost income after accident",
            "emotionalState": "anxious",
            "tactics": ["delay"],
            "backstory": "Lives in Pune",
            "difficulty": "medium"
        }))
        .unwrap();
        assert_eq!(persona.id, "");
        assert_eq!(persona.loan_amount, 85000.0);
        assert_eq!(persona.difficulty, Difficulty::Medium);
    }

    #[test]
    fn test_conversation_transcript_and_count() {
        let conversation = Conversation::new(
            "persona-0",
            vec![
                ConversationTurn {
                    role: Speaker::Bot,
                    content: "Hello".to_string(),
                    turn_number: 1,
                },
                ConversationTurn {
                    role: Speaker::Borrower,
                    content: "Who is this?".to_string(),
                    turn_number: 2,
                },
            ],
            Outcome::Unresolved,
        );
        assert_eq!(conversation.total_turns, 2);
        assert_eq!(
            conversation.transcript(),
            "[Turn 1] BOT: Hello\n[Turn 2] BORROWER: Who is this?"
        );
    }

    #[test]
    fn test_iteration_result_omits_absent_fields() {
        let result = IterationResult {
            done: true,
            reason: Some(StopReason::ThresholdMet),
            summary: IterationSummary {
                iteration: 0,
                script_version: 0,
                avg_negotiation_score: 8.0,
                avg_relevance_score: 8.0,
                avg_overall_score: 8.0,
                pass_rate: 100.0,
                total_personas: 3,
                failure_patterns: vec![],
                timestamp: Utc::now(),
            },
            next_iteration: None,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["reason"], "threshold_met");
        assert!(value.get("nextIteration").is_none());
        assert_eq!(value["summary"]["avgOverallScore"], 8.0);
    }
}
