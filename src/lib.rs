//! mcq-forge library crate
//!
//! Multiple-choice physics question generation with three strategies
//! (direct, retrieval-augmented, concept map) sharing one bounded
//! generate → evaluate → fix loop per skill.

pub mod assemble;
pub mod config;
pub mod error;
pub mod generate;
pub mod llm;
pub mod question;
pub mod retrieval;
pub mod skills;
pub mod strategies;
pub mod topic;
pub mod util;
pub mod verdict;

pub use config::Config;
pub use error::{GenerationError, GenerationResult};
pub use generate::{SessionReport, SessionRunner, SessionStore, Strategy};
pub use question::{QuestionHistory, QuestionRecord, SessionResult};
