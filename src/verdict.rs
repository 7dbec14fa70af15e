//! Evaluation verdicts
//!
//! A verdict is produced and consumed inside one attempt of the retry loop
//! and is never persisted on its own.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Message recorded on every criterion of the fail-closed verdict
pub const FAILED_TO_EVALUATE: &str = "Failed to evaluate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Criterion {
    #[serde(rename = "uniqueness")]
    Uniqueness,
    #[serde(rename = "answer-correctness")]
    AnswerCorrectness,
}

impl Criterion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::Uniqueness => "uniqueness",
            Criterion::AnswerCorrectness => "answer-correctness",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionVerdict {
    pub passed: bool,
    #[serde(default)]
    pub issues: String,
}

impl CriterionVerdict {
    pub fn pass() -> Self {
        Self {
            passed: true,
            issues: String::new(),
        }
    }

    pub fn fail(issues: impl Into<String>) -> Self {
        Self {
            passed: false,
            issues: issues.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub valid: bool,
    pub criteria: BTreeMap<Criterion, CriterionVerdict>,
}

impl Verdict {
    /// Build a verdict; `valid` only holds when the judge said so and no
    /// recorded criterion failed.
    pub fn new(reported_valid: bool, criteria: BTreeMap<Criterion, CriterionVerdict>) -> Self {
        let valid = reported_valid && criteria.values().all(|c| c.passed);
        Self { valid, criteria }
    }

    /// Verdict for a record that needed no judgement
    pub fn accepted() -> Self {
        Self::new(
            true,
            BTreeMap::from([
                (Criterion::Uniqueness, CriterionVerdict::pass()),
                (Criterion::AnswerCorrectness, CriterionVerdict::pass()),
            ]),
        )
    }

    /// Conservative verdict substituted whenever evaluation itself fails
    pub fn fail_closed() -> Self {
        Self {
            valid: false,
            criteria: BTreeMap::from([
                (Criterion::Uniqueness, CriterionVerdict::fail(FAILED_TO_EVALUATE)),
                (Criterion::AnswerCorrectness, CriterionVerdict::fail(FAILED_TO_EVALUATE)),
            ]),
        }
    }

    /// Verdict for a record that failed the structural pre-check. Uniqueness
    /// was not judged and is recorded as passing so the fixer patches rather
    /// than regenerates.
    pub fn structurally_invalid(issues: &[String]) -> Self {
        Self {
            valid: false,
            criteria: BTreeMap::from([
                (Criterion::Uniqueness, CriterionVerdict::pass()),
                (
                    Criterion::AnswerCorrectness,
                    CriterionVerdict::fail(issues.join("; ")),
                ),
            ]),
        }
    }

    pub fn passed(&self, criterion: Criterion) -> bool {
        self.criteria.get(&criterion).map(|c| c.passed).unwrap_or(false)
    }

    /// A missing uniqueness entry counts as failed (fail closed).
    pub fn uniqueness_failed(&self) -> bool {
        !self.passed(Criterion::Uniqueness)
    }

    /// Failing criteria as `name: issues` lines for logs and fix prompts
    pub fn failure_summary(&self) -> String {
        self.criteria
            .iter()
            .filter(|(_, v)| !v.passed)
            .map(|(k, v)| format!("{}: {}", k.as_str(), v.issues))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
