//! Failure taxonomy for the generate/evaluate/fix loop
//!
//! None of these escape a session: the retry loop turns them into exhausted
//! attempts and the session aggregator into skipped skills.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    /// Generator output did not parse into a question record
    #[error("malformed content: {0}")]
    MalformedContent(String),

    /// The judge failed internally; callers substitute the fail-closed verdict
    #[error("evaluation fault: {0}")]
    EvaluationFault(String),

    /// The fixer could not produce a corrected record
    #[error("fix fault: {0}")]
    FixFault(String),

    /// A context-requiring strategy found nothing to ground the question on
    #[error("no context found for topic '{0}'")]
    MissingContext(String),

    /// The generation capability itself failed (transport, auth, empty reply)
    #[error("generation failed: {0}")]
    Generation(#[from] anyhow::Error),
}

impl GenerationError {
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::MalformedContent(_) => "MalformedContent",
            GenerationError::EvaluationFault(_) => "EvaluationFault",
            GenerationError::FixFault(_) => "FixFault",
            GenerationError::MissingContext(_) => "MissingContext",
            GenerationError::Generation(_) => "Generation",
        }
    }
}

pub type GenerationResult<T> = Result<T, GenerationError>;
