//! Validity evaluation and corrective fixing
//!
//! `Judge` asks the model whether a question is unique against the session
//! history and whether its marked answer is right. `Fixer` makes one
//! corrective pass: a fresh question when uniqueness failed, a patch
//! otherwise. Both put a cheap structural check in front of the model call.

use crate::config::Config;
use crate::error::{GenerationError, GenerationResult};
use crate::llm::prompts::render;
use crate::llm::{extract_question, parse_verdict, Prompt, TextGenerator};
use crate::question::{QuestionHistory, QuestionRecord};
use crate::verdict::{Criterion, CriterionVerdict, Verdict};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Structural pre-check run before any judgement.
///
/// Returns `Some(verdict)` when the record can be rejected without asking
/// the model: malformed options/answer, or an exact repeat of an accepted
/// question.
pub fn precheck(record: &QuestionRecord, history: &QuestionHistory) -> Option<Verdict> {
    let issues = record.structural_issues();
    if !issues.is_empty() {
        return Some(Verdict::structurally_invalid(&issues));
    }

    let normalized = normalize_question(&record.question);
    let repeated = history
        .as_slice()
        .iter()
        .position(|q| normalize_question(q) == normalized);
    repeated.map(|index| {
        Verdict::new(
            false,
            BTreeMap::from([
                (
                    Criterion::Uniqueness,
                    CriterionVerdict::fail(format!(
                        "identical to previously accepted question {}",
                        index + 1
                    )),
                ),
                (Criterion::AnswerCorrectness, CriterionVerdict::pass()),
            ]),
        )
    })
}

fn normalize_question(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn record_json(record: &QuestionRecord) -> String {
    serde_json::to_string(record).unwrap_or_else(|_| record.question.clone())
}

pub struct Judge {
    generator: Arc<dyn TextGenerator>,
    system: String,
    template: String,
    output_format: String,
    temperature: f32,
}

impl Judge {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        system: impl Into<String>,
        template: impl Into<String>,
        output_format: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            generator,
            system: system.into(),
            template: template.into(),
            output_format: output_format.into(),
            temperature,
        }
    }

    pub fn from_config(generator: Arc<dyn TextGenerator>, config: &Config) -> Self {
        Self::new(
            generator,
            &config.prompts.system,
            &config.prompts.evaluation_prompt,
            &config.output.formats.evaluation,
            config.model.temperature.evaluation,
        )
    }

    /// Evaluate a record. Never fails: any fault yields `Verdict::fail_closed`.
    pub async fn evaluate(&self, record: &QuestionRecord, history: &QuestionHistory) -> Verdict {
        if let Some(verdict) = precheck(record, history) {
            tracing::debug!(reason = %verdict.failure_summary(), "Rejected by structural check");
            return verdict;
        }

        match self.judge(record, history).await {
            Ok(verdict) => verdict,
            Err(err) => {
                tracing::warn!("Evaluation error: {}", err);
                Verdict::fail_closed()
            }
        }
    }

    async fn judge(
        &self,
        record: &QuestionRecord,
        history: &QuestionHistory,
    ) -> GenerationResult<Verdict> {
        let question = record_json(record);
        let previous = history.to_json();
        let user = render(
            &self.template,
            &[
                ("question", question.as_str()),
                ("previous_questions", previous.as_str()),
                ("output_format_evaluation", self.output_format.as_str()),
            ],
        );

        let response = self
            .generator
            .complete(&Prompt::new(&self.system, user, self.temperature))
            .await
            .map_err(|e| GenerationError::EvaluationFault(e.to_string()))?;
        parse_verdict(&response)
    }
}

pub struct Fixer {
    generator: Arc<dyn TextGenerator>,
    system: String,
    uniqueness_template: String,
    answer_template: String,
    output_format: String,
    temperature: f32,
}

impl Fixer {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        system: impl Into<String>,
        uniqueness_template: impl Into<String>,
        answer_template: impl Into<String>,
        output_format: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            generator,
            system: system.into(),
            uniqueness_template: uniqueness_template.into(),
            answer_template: answer_template.into(),
            output_format: output_format.into(),
            temperature,
        }
    }

    pub fn from_config(generator: Arc<dyn TextGenerator>, config: &Config) -> Self {
        Self::new(
            generator,
            &config.prompts.system,
            &config.prompts.fix_uniqueness_prompt,
            &config.prompts.fix_answer_prompt,
            &config.output.formats.generation,
            config.model.temperature.generation,
        )
    }

    /// One corrective pass. Faults are logged and reported as `None`.
    pub async fn fix(
        &self,
        record: &QuestionRecord,
        verdict: &Verdict,
        history: &QuestionHistory,
    ) -> Option<QuestionRecord> {
        match self.try_fix(record, verdict, history).await {
            Ok(fixed) => Some(fixed),
            Err(err) => {
                tracing::warn!("Fix error: {}", err);
                None
            }
        }
    }

    async fn try_fix(
        &self,
        record: &QuestionRecord,
        verdict: &Verdict,
        history: &QuestionHistory,
    ) -> GenerationResult<QuestionRecord> {
        let question = record_json(record);
        let evaluation = serde_json::to_string(verdict)
            .map_err(|e| GenerationError::FixFault(e.to_string()))?;

        let user = if verdict.uniqueness_failed() {
            let previous = history.to_json();
            render(
                &self.uniqueness_template,
                &[
                    ("question", question.as_str()),
                    ("previous_questions", previous.as_str()),
                    ("evaluation", evaluation.as_str()),
                    ("skill", record.skill.as_str()),
                    ("output_format_generation", self.output_format.as_str()),
                ],
            )
        } else {
            render(
                &self.answer_template,
                &[
                    ("question", question.as_str()),
                    ("evaluation", evaluation.as_str()),
                    ("skill", record.skill.as_str()),
                    ("output_format_generation", self.output_format.as_str()),
                ],
            )
        };

        let response = self
            .generator
            .complete(&Prompt::new(&self.system, user, self.temperature))
            .await
            .map_err(|e| GenerationError::FixFault(e.to_string()))?;

        extract_question(&response)
            .map(|fixed| fixed.with_defaults(&record.skill, &record.topic))
            .map_err(|e| GenerationError::FixFault(e.to_string()))
    }
}

/// How a strategy reviews its output
pub enum Review {
    /// Structural pre-check only; nothing to fix with
    Structural,
    /// LLM judge plus corrective fixer
    Llm { judge: Judge, fixer: Fixer },
}

impl Review {
    pub fn llm(generator: Arc<dyn TextGenerator>, config: &Config) -> Self {
        Review::Llm {
            judge: Judge::from_config(generator.clone(), config),
            fixer: Fixer::from_config(generator, config),
        }
    }

    pub fn uses_model(&self) -> bool {
        matches!(self, Review::Llm { .. })
    }

    pub async fn evaluate(&self, record: &QuestionRecord, history: &QuestionHistory) -> Verdict {
        match self {
            Review::Structural => precheck(record, history).unwrap_or_else(Verdict::accepted),
            Review::Llm { judge, .. } => judge.evaluate(record, history).await,
        }
    }

    pub async fn fix(
        &self,
        record: &QuestionRecord,
        verdict: &Verdict,
        history: &QuestionHistory,
    ) -> Option<QuestionRecord> {
        match self {
            Review::Structural => None,
            Review::Llm { fixer, .. } => fixer.fix(record, verdict, history).await,
        }
    }
}
