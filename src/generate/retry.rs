//! Bounded generate → evaluate → fix → re-evaluate loop for one skill
//!
//! Each attempt costs at most two generation calls (generate + fix) plus the
//! evaluations. A fixed record is re-evaluated once and never fixed again;
//! any failure inside an attempt exhausts that attempt only.

use super::{GenerationRequest, Strategy};
use crate::error::GenerationError;
use crate::question::{QuestionHistory, QuestionRecord};

/// How an accepted record got through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    FirstPass,
    Fixed,
}

/// Why an attempt ended without a record
#[derive(Debug)]
enum Exhausted {
    Generation(GenerationError),
    NoFix,
    FixRejected,
}

enum AttemptOutcome {
    Accepted(QuestionRecord, Acceptance),
    Exhausted(Exhausted),
}

/// Result of running the loop for one skill, with call counters.
/// `fixes` counts fixer calls actually made.
#[derive(Debug, Clone, Default)]
pub struct SkillOutcome {
    pub record: Option<QuestionRecord>,
    pub acceptance: Option<Acceptance>,
    pub attempts: u32,
    pub generations: u32,
    pub evaluations: u32,
    pub fixes: u32,
}

impl SkillOutcome {
    pub fn accepted(&self) -> bool {
        self.record.is_some()
    }
}

/// Run the retry loop for one skill. Returns without a record when every
/// attempt in the budget is exhausted.
pub async fn generate_valid_question<S: Strategy + ?Sized>(
    strategy: &S,
    request: &GenerationRequest<'_>,
    history: &QuestionHistory,
    max_attempts: u32,
) -> SkillOutcome {
    let mut outcome = SkillOutcome::default();

    for attempt in 1..=max_attempts {
        outcome.attempts = attempt;
        tracing::debug!(
            skill = %request.skill.name,
            "Attempt {}/{}",
            attempt,
            max_attempts
        );

        match run_attempt(strategy, request, history, &mut outcome).await {
            AttemptOutcome::Accepted(record, acceptance) => {
                tracing::info!(
                    skill = %request.skill.name,
                    attempt,
                    fixed = acceptance == Acceptance::Fixed,
                    "Question accepted"
                );
                outcome.record = Some(record);
                outcome.acceptance = Some(acceptance);
                return outcome;
            }
            AttemptOutcome::Exhausted(reason) => match reason {
                Exhausted::Generation(err) => tracing::warn!(
                    skill = %request.skill.name,
                    kind = err.kind(),
                    "Error in attempt {}: {}",
                    attempt,
                    err
                ),
                Exhausted::NoFix => tracing::info!(
                    skill = %request.skill.name,
                    "Attempt {} rejected and could not be fixed",
                    attempt
                ),
                Exhausted::FixRejected => tracing::info!(
                    skill = %request.skill.name,
                    "Attempt {} fix rejected on re-evaluation",
                    attempt
                ),
            },
        }
    }

    tracing::warn!(
        skill = %request.skill.name,
        "All {} attempts exhausted",
        max_attempts
    );
    outcome
}

async fn run_attempt<S: Strategy + ?Sized>(
    strategy: &S,
    request: &GenerationRequest<'_>,
    history: &QuestionHistory,
    counters: &mut SkillOutcome,
) -> AttemptOutcome {
    counters.generations += 1;
    let record = match strategy.generate(request, history).await {
        Ok(record) => record,
        Err(err) => return AttemptOutcome::Exhausted(Exhausted::Generation(err)),
    };

    counters.evaluations += 1;
    let verdict = strategy.evaluate(&record, history).await;
    if verdict.valid {
        return AttemptOutcome::Accepted(record, Acceptance::FirstPass);
    }
    tracing::debug!(issues = %verdict.failure_summary(), "Question rejected");

    if !strategy.reviews_with_model() {
        return AttemptOutcome::Exhausted(Exhausted::NoFix);
    }
    counters.fixes += 1;
    let Some(fixed) = strategy.fix(&record, &verdict, history).await else {
        return AttemptOutcome::Exhausted(Exhausted::NoFix);
    };

    counters.evaluations += 1;
    let second = strategy.evaluate(&fixed, history).await;
    if second.valid {
        AttemptOutcome::Accepted(fixed, Acceptance::Fixed)
    } else {
        tracing::debug!(issues = %second.failure_summary(), "Fixed question rejected");
        AttemptOutcome::Exhausted(Exhausted::FixRejected)
    }
}
