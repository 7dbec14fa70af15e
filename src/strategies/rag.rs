use super::{optional_review, QuestionPrompt};
use crate::config::Config;
use crate::error::{GenerationError, GenerationResult};
use crate::generate::{GenerationRequest, Review, Strategy};
use crate::llm::TextGenerator;
use crate::question::{QuestionHistory, QuestionRecord};
use crate::retrieval::Retriever;
use crate::verdict::Verdict;
use async_trait::async_trait;
use std::sync::Arc;

/// Questions grounded in reference text retrieved for the topic
pub struct RagStrategy {
    prompt: QuestionPrompt,
    review: Review,
    retriever: Box<dyn Retriever>,
}

impl RagStrategy {
    pub fn from_config(
        generator: Arc<dyn TextGenerator>,
        config: &Config,
        retriever: Box<dyn Retriever>,
    ) -> Self {
        Self {
            prompt: QuestionPrompt::new(generator.clone(), config, &config.prompts.rag_prompt),
            review: optional_review(config.strategies.rag.review, generator, config),
            retriever,
        }
    }
}

#[async_trait]
impl Strategy for RagStrategy {
    fn name(&self) -> &'static str {
        "RAG"
    }

    fn needs_context(&self) -> bool {
        true
    }

    fn reviews_with_model(&self) -> bool {
        self.review.uses_model()
    }

    async fn retrieve_context(&self, topic: &str) -> GenerationResult<String> {
        let context = self.retriever.retrieve(topic)?;
        if context.trim().is_empty() {
            return Err(GenerationError::MissingContext(topic.to_string()));
        }
        tracing::debug!(topic, chars = context.len(), "Retrieved context");
        Ok(context)
    }

    async fn generate(
        &self,
        request: &GenerationRequest<'_>,
        _history: &QuestionHistory,
    ) -> GenerationResult<QuestionRecord> {
        let context = request
            .context
            .ok_or_else(|| GenerationError::MissingContext(request.topic.to_string()))?;
        self.prompt.generate(request, &[("context", context)]).await
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
