//! Session aggregation: one strategy, one topic, one grade, every skill

use super::retry::{generate_valid_question, Acceptance};
use super::store::SessionStore;
use super::{GenerationRequest, Strategy, DEFAULT_ATTEMPTS};
use crate::error::GenerationError;
use crate::question::{QuestionHistory, SessionResult};
use crate::skills::{SkillRequirement, SkillSet};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkillStatus {
    Accepted { fixed: bool },
    /// All attempts exhausted
    Rejected,
    /// Context lookup failed before any attempt
    Skipped(String),
}

#[derive(Debug, Clone)]
pub struct SkillReport {
    pub skill: String,
    pub status: SkillStatus,
    pub attempts: u32,
    pub generations: u32,
    pub evaluations: u32,
    pub fixes: u32,
    /// Evaluations went to the model rather than the structural check
    pub model_review: bool,
}

impl SkillReport {
    fn skipped(skill: &str, reason: String) -> Self {
        Self {
            skill: skill.to_string(),
            status: SkillStatus::Skipped(reason),
            attempts: 0,
            generations: 0,
            evaluations: 0,
            fixes: 0,
            model_review: false,
        }
    }

    /// Generator calls spent on this skill (generations plus fixes)
    pub fn generator_calls(&self) -> u32 {
        self.generations + self.fixes
    }

    /// Upper bound on model requests: structural evaluations are free, and
    /// the judge may also answer a pre-check failure without the model.
    pub fn model_calls(&self) -> u32 {
        if self.model_review {
            self.generator_calls() + self.evaluations
        } else {
            self.generator_calls()
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub strategy: &'static str,
    pub result: SessionResult,
    pub skills: Vec<SkillReport>,
    pub history: QuestionHistory,
    /// Where the result was written, if persistence was requested and worked
    pub saved_to: Option<PathBuf>,
}

impl SessionReport {
    pub fn accepted(&self) -> usize {
        self.result.questions.len()
    }

    pub fn fixed(&self) -> usize {
        self.skills
            .iter()
            .filter(|s| s.status == SkillStatus::Accepted { fixed: true })
            .count()
    }
}

/// Runs the retry loop for every skill in declared order, threading a
/// session-local history between skills.
pub struct SessionRunner<'a, S: Strategy + ?Sized> {
    strategy: &'a S,
    skills: &'a SkillSet,
    attempts: u32,
    store: Option<&'a SessionStore>,
}

impl<'a, S: Strategy + ?Sized> SessionRunner<'a, S> {
    pub fn new(strategy: &'a S, skills: &'a SkillSet) -> Self {
        Self {
            strategy,
            skills,
            attempts: DEFAULT_ATTEMPTS,
            store: None,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_store(mut self, store: &'a SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Generate one question per skill. `context` overrides retrieval for
    /// strategies that need grounding text.
    pub async fn run(&self, topic: &str, grade: u8, context: Option<&str>) -> SessionReport {
        let run_id = Uuid::new_v4();
        let strategy = self.strategy.name();
        tracing::info!(
            %run_id,
            strategy,
            topic,
            grade,
            skills = self.skills.len(),
            "Starting generation session"
        );

        let mut result = SessionResult::new(topic);
        let mut history = QuestionHistory::new();
        let mut reports = Vec::with_capacity(self.skills.len());

        for skill in self.skills.iter() {
            let report = self
                .run_skill(topic, grade, skill, context, &mut result, &mut history)
                .await;
            reports.push(report);
        }

        let saved_to = self.persist(strategy, &result);

        tracing::info!(
            %run_id,
            strategy,
            accepted = result.questions.len(),
            skills = reports.len(),
            "Session finished"
        );

        SessionReport {
            strategy,
            result,
            skills: reports,
            history,
            saved_to,
        }
    }

    async fn run_skill(
        &self,
        topic: &str,
        grade: u8,
        skill: &SkillRequirement,
        context: Option<&str>,
        result: &mut SessionResult,
        history: &mut QuestionHistory,
    ) -> SkillReport {
        let retrieved;
        let context = match (self.strategy.needs_context(), context) {
            (false, _) => None,
            (true, Some(supplied)) => Some(supplied),
            (true, None) => match self.strategy.retrieve_context(topic).await {
                Ok(text) if !text.trim().is_empty() => {
                    retrieved = text;
                    Some(retrieved.as_str())
                }
                Ok(_) => {
                    let err = GenerationError::MissingContext(topic.to_string());
                    tracing::warn!(skill = %skill.name, "Skipping skill: {}", err);
                    return SkillReport::skipped(&skill.name, err.to_string());
                }
                Err(err) => {
                    tracing::warn!(skill = %skill.name, kind = err.kind(), "Skipping skill: {}", err);
                    return SkillReport::skipped(&skill.name, err.to_string());
                }
            },
        };

        let request = GenerationRequest {
            topic,
            grade,
            skill,
            context,
        };
        let outcome = generate_valid_question(self.strategy, &request, history, self.attempts).await;

        let status = match (outcome.record, outcome.acceptance) {
            (Some(record), acceptance) => {
                history.push(&record.question);
                result.questions.push(record);
                SkillStatus::Accepted {
                    fixed: acceptance == Some(Acceptance::Fixed),
                }
            }
            (None, _) => SkillStatus::Rejected,
        };

        SkillReport {
            skill: skill.name.clone(),
            status,
            attempts: outcome.attempts,
            generations: outcome.generations,
            evaluations: outcome.evaluations,
            fixes: outcome.fixes,
            model_review: self.strategy.reviews_with_model(),
        }
    }

    fn persist(&self, strategy: &str, result: &SessionResult) -> Option<PathBuf> {
        let store = self.store?;
        match store.save(strategy, result) {
            Ok(path) => {
                tracing::info!(path = %path.display(), "Session saved");
                Some(path)
            }
            Err(err) => {
                tracing::error!("Failed to save session: {:#}", err);
                None
            }
        }
    }
}
