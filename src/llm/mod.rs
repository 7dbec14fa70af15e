//! Model access: the `TextGenerator` capability, its HTTP client, prompt
//! templates and tolerant parsing of model output.

pub mod client;
pub mod parse;
pub mod prompts;

#[cfg(test)]
pub(crate) mod scripted;

pub use client::{LlmClient, Prompt, TextGenerator};
pub use parse::{extract_question, parse_verdict, strip_code_fence};
