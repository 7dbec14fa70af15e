//! Question records and session results
//!
//! A `QuestionRecord` is what the content extractor produces from generator
//! output. Once accepted into a session it is never mutated.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four option labels of a multiple-choice question
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionLabel {
    A,
    B,
    C,
    D,
}

impl OptionLabel {
    pub const ALL: [OptionLabel; 4] = [OptionLabel::A, OptionLabel::B, OptionLabel::C, OptionLabel::D];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptionLabel::A => "a",
            OptionLabel::B => "b",
            OptionLabel::C => "c",
            OptionLabel::D => "d",
        }
    }

    /// Parse a label as models tend to write it: `b`, `B`, `(b)`, `b)`, `b.`
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw
            .trim()
            .trim_start_matches('(')
            .trim_end_matches([')', '.', ':'])
            .trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "a" => Some(OptionLabel::A),
            "b" => Some(OptionLabel::B),
            "c" => Some(OptionLabel::C),
            "d" => Some(OptionLabel::D),
            _ => None,
        }
    }
}

impl fmt::Display for OptionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four answer choices (three distractors and the answer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    #[serde(alias = "A")]
    pub a: String,
    #[serde(alias = "B")]
    pub b: String,
    #[serde(alias = "C")]
    pub c: String,
    #[serde(alias = "D")]
    pub d: String,
}

impl Options {
    pub fn get(&self, label: OptionLabel) -> &str {
        match label {
            OptionLabel::A => &self.a,
            OptionLabel::B => &self.b,
            OptionLabel::C => &self.c,
            OptionLabel::D => &self.d,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (OptionLabel, &str)> {
        OptionLabel::ALL.into_iter().map(move |label| (label, self.get(label)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub question: String,
    /// Cognitive level label (Remember, Apply, ...)
    #[serde(default)]
    pub skill: String,
    pub options: Options,
    /// Should name one of the option labels; see `answer_label`
    pub correct_answer: String,
    #[serde(default)]
    pub topic: String,
}

impl QuestionRecord {
    pub fn answer_label(&self) -> Option<OptionLabel> {
        OptionLabel::parse(&self.correct_answer)
    }

    /// Fill in fields the generator is allowed to omit
    pub fn with_defaults(mut self, skill: &str, topic: &str) -> Self {
        if self.skill.trim().is_empty() {
            self.skill = skill.to_string();
        }
        if self.topic.trim().is_empty() {
            self.topic = topic.to_string();
        }
        self
    }

    /// Structural problems that make the record unusable regardless of what
    /// the judge thinks. Empty means the record is well formed.
    pub fn structural_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.question.trim().is_empty() {
            issues.push("question text is empty".to_string());
        }
        for (label, text) in self.options.iter() {
            if text.trim().is_empty() {
                issues.push(format!("option {} is empty", label));
            }
        }
        if self.answer_label().is_none() {
            issues.push(format!(
                "correct_answer '{}' does not reference one of the options a-d",
                self.correct_answer
            ));
        }
        issues
    }
}

/// Accepted question texts for one session, used for uniqueness checks.
/// Append-only.
#[derive(Debug, Clone, Default)]
pub struct QuestionHistory {
    questions: Vec<String>,
}

impl QuestionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, question: &str) {
        self.questions.push(question.to_string());
    }

    pub fn as_slice(&self) -> &[String] {
        &self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// JSON array form used inside prompts
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.questions).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Output of one (strategy, topic, grade) session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub topic: String,
    pub questions: Vec<QuestionRecord>,
}

impl SessionResult {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            questions: Vec::new(),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_record(question: &str, skill: &str) -> QuestionRecord {
    QuestionRecord {
        question: question.to_string(),
        skill: skill.to_string(),
        options: Options {
            a: "2 J".to_string(),
            b: "4 J".to_string(),
            c: "8 J".to_string(),
            d: "16 J".to_string(),
        },
        correct_answer: "b".to_string(),
        topic: "work-energy theorem".to_string(),
    }
}
