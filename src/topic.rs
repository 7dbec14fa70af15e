//! Free-text request to topic name

use crate::config::Config;
use crate::llm::{strip_code_fence, Prompt, TextGenerator};
use std::sync::Arc;

pub struct TopicIdentifier {
    generator: Arc<dyn TextGenerator>,
    system: String,
    temperature: f32,
}

impl TopicIdentifier {
    pub fn from_config(generator: Arc<dyn TextGenerator>, config: &Config) -> Self {
        Self {
            generator,
            system: config.prompts.topic_identifier_prompt.clone(),
            temperature: config.model.temperature.evaluation,
        }
    }

    /// e.g. "Create 5 questions on work-energy theorem" -> "work-energy theorem"
    pub async fn identify(&self, query: &str) -> anyhow::Result<String> {
        let query = query.trim();
        if query.is_empty() {
            anyhow::bail!("Query is empty");
        }

        let reply = self
            .generator
            .complete(&Prompt::new(&self.system, query, self.temperature))
            .await?;
        let topic = clean_topic(&reply);
        if topic.is_empty() {
            anyhow::bail!("Model returned no topic for '{}'", query);
        }

        tracing::info!(query, topic = %topic, "Identified topic");
        Ok(topic)
    }
}

/// First non-empty line, without quotes, labels or trailing punctuation
fn clean_topic(reply: &str) -> String {
    let line = strip_code_fence(reply)
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    let line = match line.split_once(':') {
        Some((label, rest)) if label.trim().eq_ignore_ascii_case("topic") => rest.trim(),
        _ => line,
    };
    line.trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.' || c == '*')
        .trim()
        .to_string()
}
