use super::{optional_review, QuestionPrompt};
use crate::config::Config;
use crate::error::GenerationResult;
use crate::generate::{GenerationRequest, Review, Strategy};
use crate::llm::TextGenerator;
use crate::question::{QuestionHistory, QuestionRecord};
use crate::verdict::Verdict;
use async_trait::async_trait;
use std::sync::Arc;

/// Questions from the model's own knowledge, no grounding
pub struct DirectStrategy {
    prompt: QuestionPrompt,
    review: Review,
}

impl DirectStrategy {
    pub fn from_config(generator: Arc<dyn TextGenerator>, config: &Config) -> Self {
        Self {
            prompt: QuestionPrompt::new(generator.clone(), config, &config.prompts.llm_prompt),
            review: optional_review(config.strategies.llm.review, generator, config),
        }
    }
}

#[async_trait]
impl Strategy for DirectStrategy {
    fn name(&self) -> &'static str {
        "LLM"
    }

    fn needs_context(&self) -> bool {
        false
    }

    fn reviews_with_model(&self) -> bool {
        self.review.uses_model()
    }

    async fn generate(
        &self,
        request: &GenerationRequest<'_>,
        _history: &QuestionHistory,
    ) -> GenerationResult<QuestionRecord> {
        self.prompt.generate(request, &[]).await
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::generate::SessionRunner;
    use crate::llm::scripted::ScriptedGenerator;
    use crate::strategies::fixtures::{question_json, VALID_VERDICT};

    #[tokio::test]
    async fn test_prompt_carries_skill_topic_and_grade() {
        let generator = ScriptedGenerator::replying(&[question_json("What is work?").as_str()]);
        let config = Config::default();
        let strategy = DirectStrategy::from_config(generator.clone(), &config);
        let skills = config.skill_set().unwrap();
        let skill = skills.requirement("Apply").unwrap();
        let request = GenerationRequest {
            topic: "work-energy theorem",
            grade: 9,
            skill,
            context: None,
        };

        let record = strategy.generate(&request, &QuestionHistory::new()).await.unwrap();
        assert_eq!(record.skill, "Apply");

        let prompt = generator.last_prompt();
        assert!(prompt.user.contains("grade 9"));
        assert!(prompt.user.contains("\"work-energy theorem\""));
        assert!(prompt.user.contains(&skill.requirement));
        assert!(prompt.user.contains(r#""correct_answer""#));
        assert!(!prompt.user.contains("{skill}"));
        assert_eq!(prompt.temperature, config.model.temperature.generation);
    }

    #[tokio::test]
    async fn test_malformed_reply_is_malformed_content() {
        let generator = ScriptedGenerator::replying(&["Sure! Here is a question about work."]);
        let config = Config::default();
        let strategy = DirectStrategy::from_config(generator, &config);
        let skills = config.skill_set().unwrap();
        let request = GenerationRequest {
            topic: "work",
            grade: 9,
            skill: skills.requirement("Remember").unwrap(),
            context: None,
        };

        let err = strategy
            .generate(&request, &QuestionHistory::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::MalformedContent(_)));
    }

    #[tokio::test]
    async fn test_structural_review_uses_one_call_per_skill() {
        let config = Config::default();
        let replies: Vec<String> = config
            .skills
            .list
            .iter()
            .map(|s| question_json(&format!("Question for {}", s)))
            .collect();
        let replies: Vec<&str> = replies.iter().map(String::as_str).collect();
        let generator = ScriptedGenerator::replying(&replies);
        let strategy = DirectStrategy::from_config(generator.clone(), &config);
        let skills = config.skill_set().unwrap();

        let report = SessionRunner::new(&strategy, &skills).run("work", 9, None).await;

        assert_eq!(report.accepted(), 5);
        assert_eq!(generator.calls(), 5);
    }

    #[tokio::test]
    async fn test_review_enabled_calls_judge() {
        let mut config = Config::default();
        config.strategies.llm.review = true;
        let question = question_json("What is work?");
        let generator = ScriptedGenerator::replying(&[question.as_str(), VALID_VERDICT]);
        let strategy = DirectStrategy::from_config(generator.clone(), &config);
        let skills = config.skill_set().unwrap();
        let request = GenerationRequest {
            topic: "work",
            grade: 9,
            skill: skills.requirement("Remember").unwrap(),
            context: None,
        };

        let history = QuestionHistory::new();
        let record = strategy.generate(&request, &history).await.unwrap();
        assert!(strategy.evaluate(&record, &history).await.valid);
        assert_eq!(generator.calls(), 2);
        assert_eq!(
            generator.prompts()[1].temperature,
            config.model.temperature.evaluation
        );
    }
}
