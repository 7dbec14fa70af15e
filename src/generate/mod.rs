//! Question generation core
//!
//! Every strategy implements the small `Strategy` capability interface; the
//! retry loop and session aggregator are written once against it.
//!
//! Flow per skill: generate → evaluate → (fix → re-evaluate), bounded by the
//! attempt budget. Accepted questions feed the session history so later
//! skills are checked for uniqueness against them.

pub mod retry;
pub mod review;
pub mod session;
pub mod store;


use crate::error::{GenerationError, GenerationResult};
use crate::question::{QuestionHistory, QuestionRecord};
use crate::skills::SkillRequirement;
use crate::verdict::Verdict;
use async_trait::async_trait;

pub use retry::{generate_valid_question, SkillOutcome};
pub use review::{Fixer, Judge, Review};
pub use session::{SessionReport, SessionRunner, SkillReport, SkillStatus};
pub use store::SessionStore;

/// Default attempt budget per skill
pub const DEFAULT_ATTEMPTS: u32 = 2;

/// Everything a strategy needs to generate one question
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub topic: &'a str,
    pub grade: u8,
    pub skill: &'a SkillRequirement,
    /// Retrieved or caller-supplied grounding text (context strategies only)
    pub context: Option<&'a str>,
}

/// Capability interface shared by the three generation strategies
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Identifier used in output file names: `LLM`, `RAG`, `ConceptMap`
    fn name(&self) -> &'static str;

    fn needs_context(&self) -> bool;

    /// Look up grounding context for a topic. An empty result is
    /// `MissingContext`.
    async fn retrieve_context(&self, topic: &str) -> GenerationResult<String> {
        Err(GenerationError::MissingContext(topic.to_string()))
    }

    async fn generate(
        &self,
        request: &GenerationRequest<'_>,
        history: &QuestionHistory,
    ) -> GenerationResult<QuestionRecord>;

    /// Never fails outward; internal faults become the fail-closed verdict.
    async fn evaluate(&self, record: &QuestionRecord, history: &QuestionHistory) -> Verdict;

    /// Whether `evaluate` and `fix` call the model. Without a model review a
    /// rejected record cannot be fixed and `fix` is never called.
    fn reviews_with_model(&self) -> bool {
        true
    }

    /// One corrective regeneration. `None` means "could not fix".
    async fn fix(
        &self,
        record: &QuestionRecord,
        verdict: &Verdict,
        history: &QuestionHistory,
    ) -> Option<QuestionRecord>;
}
