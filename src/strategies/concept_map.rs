//! Concept-map strategy
//!
//! The requested topic is matched to a stored topic id by asking the model to
//! pick from the database's topic list. Context is a random sample of that
//! topic's subtopic rows, so each skill sees a different slice of the map.
//! Always reviewed by the LLM judge and fixer.

use super::QuestionPrompt;
use crate::config::Config;
use crate::error::{GenerationError, GenerationResult};
use crate::generate::{GenerationRequest, Review, Strategy};
use crate::llm::prompts::render;
use crate::llm::{strip_code_fence, Prompt, TextGenerator};
use crate::question::{QuestionHistory, QuestionRecord};
use crate::retrieval::{ConceptDb, TopicRow};
use crate::verdict::Verdict;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct ConceptMapStrategy {
    prompt: QuestionPrompt,
    review: Review,
    generator: Arc<dyn TextGenerator>,
    system: String,
    match_template: String,
    match_temperature: f32,
    db: ConceptDb,
    subtopic_limit: usize,
    /// topic -> matched topic id, filled on first lookup
    matched: Mutex<HashMap<String, String>>,
}

impl ConceptMapStrategy {
    pub fn from_config(generator: Arc<dyn TextGenerator>, config: &Config, db: ConceptDb) -> Self {
        Self {
            prompt: QuestionPrompt::new(generator.clone(), config, &config.prompts.conceptmap_prompt),
            review: Review::llm(generator.clone(), config),
            generator,
            system: config.prompts.system.clone(),
            match_template: config.prompts.topic_match_prompt.clone(),
            match_temperature: config.model.temperature.evaluation,
            db,
            subtopic_limit: config.concept_db.subtopic_limit.max(1),
            matched: Mutex::new(HashMap::new()),
        }
    }

    fn cached_topic_id(&self, topic: &str) -> Option<String> {
        self.matched.lock().ok()?.get(topic).cloned()
    }

    /// Resolve a free-text topic to a stored topic id
    pub async fn match_topic_id(&self, topic: &str) -> GenerationResult<String> {
        if let Some(id) = self.cached_topic_id(topic) {
            return Ok(id);
        }

        let topics = self.db.topics()?;
        if topics.is_empty() {
            return Err(GenerationError::MissingContext(topic.to_string()));
        }

        // Skip the model when the request names a stored topic outright
        let direct = topics.iter().find(|t| {
            t.topic_name.eq_ignore_ascii_case(topic.trim()) || t.topic_id.eq_ignore_ascii_case(topic.trim())
        });
        let topic_id = match direct {
            Some(row) => row.topic_id.clone(),
            None => self.ask_for_topic_id(topic, &topics).await?,
        };

        tracing::info!(topic, topic_id = %topic_id, "Matched concept-map topic");
        if let Ok(mut matched) = self.matched.lock() {
            matched.insert(topic.to_string(), topic_id.clone());
        }
        Ok(topic_id)
    }

    async fn ask_for_topic_id(&self, topic: &str, topics: &[TopicRow]) -> GenerationResult<String> {
        let listing = topics
            .iter()
            .map(|t| format!("{} | {}", t.topic_name, t.topic_id))
            .collect::<Vec<_>>()
            .join("\n");
        let user = render(
            &self.match_template,
            &[("topic_of_interest", topic), ("topics", listing.as_str())],
        );

        let reply = self
            .generator
            .complete(&Prompt::new(&self.system, user, self.match_temperature))
            .await?;

        resolve_topic_id(&reply, topics).ok_or_else(|| {
            tracing::warn!(topic, reply = %reply.trim(), "Model reply names no stored topic");
            GenerationError::MissingContext(topic.to_string())
        })
    }
}

/// Find the stored topic id a model reply refers to. Accepts a bare id, a
/// `name | id` line, or an id embedded in a sentence, and falls back to the
/// topic name when the reply gives no id.
fn resolve_topic_id(reply: &str, topics: &[TopicRow]) -> Option<String> {
    let cleaned = strip_code_fence(reply);
    let candidate = trim_reply(cleaned.rsplit('|').next().unwrap_or(cleaned));

    if let Some(row) = topics.iter().find(|t| t.topic_id.eq_ignore_ascii_case(candidate)) {
        return Some(row.topic_id.clone());
    }

    let by_id = topics.iter().find(|t| {
        Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&t.topic_id)))
            .map(|re| re.is_match(cleaned))
            .unwrap_or(false)
    });
    if let Some(row) = by_id {
        return Some(row.topic_id.clone());
    }

    let whole = trim_reply(cleaned);
    if let Some(row) = topics.iter().find(|t| t.topic_name.eq_ignore_ascii_case(whole)) {
        return Some(row.topic_id.clone());
    }

    // Longest name mentioned anywhere in the reply
    let lower = cleaned.to_lowercase();
    topics
        .iter()
        .filter(|t| !t.topic_name.trim().is_empty())
        .filter(|t| lower.contains(&t.topic_name.trim().to_lowercase()))
        .max_by_key(|t| t.topic_name.len())
        .map(|t| t.topic_id.clone())
}

fn trim_reply(text: &str) -> &str {
    text.trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.' || c == '*')
        .trim()
}

#[async_trait]
impl Strategy for ConceptMapStrategy {
    fn name(&self) -> &'static str {
        "ConceptMap"
    }

    fn needs_context(&self) -> bool {
        true
    }

    fn reviews_with_model(&self) -> bool {
        self.review.uses_model()
    }

    async fn retrieve_context(&self, topic: &str) -> GenerationResult<String> {
        let topic_id = self.match_topic_id(topic).await?;
        let context = self.db.context_for(&topic_id, self.subtopic_limit)?;
        if context.trim().is_empty() {
            return Err(GenerationError::MissingContext(topic.to_string()));
        }
        Ok(context)
    }

    async fn generate(
        &self,
        request: &GenerationRequest<'_>,
        history: &QuestionHistory,
    ) -> GenerationResult<QuestionRecord> {
        let context = request
            .context
            .ok_or_else(|| GenerationError::MissingContext(request.topic.to_string()))?;
        let question_history = history.to_json();
        self.prompt
            .generate(
                request,
                &[("context", context), ("question_history", question_history.as_str())],
            )
            .await
    }

    async fn evaluate(&self, record: &QuestionRecord, history: &QuestionHistory) -> Verdict {
        self.review.evaluate(record, history).await
    }

    async fn fix(
        &self,
        record: &QuestionRecord,
        verdict: &Verdict,
        history: &QuestionHistory,
    ) -> Option<QuestionRecord> {
        self.review.fix(record, verdict, history).await
    }
}
