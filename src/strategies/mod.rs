//! The three question generation strategies
//!
//! - `direct`: the model alone (`LLM`)
//! - `rag`: grounded in retrieved reference text (`RAG`)
//! - `concept_map`: grounded in concept-map rows, history-aware (`ConceptMap`)

pub mod concept_map;
pub mod direct;
pub mod rag;

pub use concept_map::ConceptMapStrategy;
pub use direct::DirectStrategy;
pub use rag::RagStrategy;

use crate::config::Config;
use crate::error::GenerationResult;
use crate::generate::{GenerationRequest, Review, Strategy};
use crate::llm::prompts::render;
use crate::llm::{extract_question, Prompt, TextGenerator};
use crate::question::QuestionRecord;
use crate::retrieval::{ConceptDb, CorpusRetriever};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Llm,
    Rag,
    ConceptMap,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [StrategyKind::Llm, StrategyKind::Rag, StrategyKind::ConceptMap];
}

/// Build a strategy with its backing stores opened from config
pub fn build(
    kind: StrategyKind,
    generator: Arc<dyn TextGenerator>,
    config: &Config,
) -> anyhow::Result<Box<dyn Strategy>> {
    let strategy: Box<dyn Strategy> = match kind {
        StrategyKind::Llm => Box::new(DirectStrategy::from_config(generator, config)),
        StrategyKind::Rag => {
            let store = &config.vector_store;
            let retriever = CorpusRetriever::open(&store.store_path(), store.top_k)?;
            Box::new(RagStrategy::from_config(generator, config, Box::new(retriever)))
        }
        StrategyKind::ConceptMap => {
            let db = ConceptDb::open(&config.concept_db.path)?;
            Box::new(ConceptMapStrategy::from_config(generator, config, db))
        }
    };
    Ok(strategy)
}

/// Review for the direct and retrieval strategies: LLM judge when enabled,
/// structural check otherwise
fn optional_review(enabled: bool, generator: Arc<dyn TextGenerator>, config: &Config) -> Review {
    if enabled {
        Review::llm(generator, config)
    } else {
        Review::Structural
    }
}

/// Renders a generation template and parses the reply into a record
pub(crate) struct QuestionPrompt {
    generator: Arc<dyn TextGenerator>,
    system: String,
    template: String,
    output_format: String,
    temperature: f32,
}

impl QuestionPrompt {
    pub(crate) fn new(generator: Arc<dyn TextGenerator>, config: &Config, template: &str) -> Self {
        Self {
            generator,
            system: config.prompts.system.clone(),
            template: template.to_string(),
            output_format: config.output.formats.generation.clone(),
            temperature: config.model.temperature.generation,
        }
    }

    /// `extra` fills strategy-specific placeholders such as `{context}`
    pub(crate) async fn generate(
        &self,
        request: &GenerationRequest<'_>,
        extra: &[(&str, &str)],
    ) -> GenerationResult<QuestionRecord> {
        let grade = request.grade.to_string();
        let mut vars = vec![
            ("skill", request.skill.name.as_str()),
            ("skill_requirement", request.skill.requirement.as_str()),
            ("topic", request.topic),
            ("grade", grade.as_str()),
            ("output_format_generation", self.output_format.as_str()),
        ];
        vars.extend_from_slice(extra);

        let user = render(&self.template, &vars);
        let response = self
            .generator
            .complete(&Prompt::new(&self.system, user, self.temperature))
            .await?;

        Ok(extract_question(&response)?.with_defaults(&request.skill.name, request.topic))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::question::sample_record;

    pub(crate) fn question_json(question: &str) -> String {
        serde_json::to_string(&sample_record(question, "")).unwrap()
    }

    pub(crate) const VALID_VERDICT: &str = r#"{"valid":true,"uniqueness":{"passed":true,"issues":""},"answer_correctness":{"passed":true,"issues":""}}"#;
}
