use crate::config::Config;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A rendered prompt ready to send to a model
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>, temperature: f32) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature,
        }
    }
}

/// The generation capability: rendered prompt in, raw text out.
///
/// Output may be malformed; callers own parsing and any retry policy.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> anyhow::Result<String>;
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

/// Token usage as reported by the provider
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Rate limit backoff
const INITIAL_BACKOFF_MS: u64 = 2000; // 2 seconds
const BACKOFF_MULTIPLIER: u64 = 2; // Exponential backoff

/// Client for an OpenAI-compatible chat completions endpoint
pub struct LlmClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    rate_limit_retries: u32,
}

impl LlmClient {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let api_key = config.api_key().ok_or_else(|| {
            anyhow::anyhow!(
                "No API key configured. Set {} or store it in the system keychain.",
                config.model.api_key_env
            )
        })?;

        Ok(Self {
            http: reqwest::Client::new(),
            url: config.model.base_url.clone(),
            api_key,
            model: config.model.id.clone(),
            max_tokens: config.model.max_tokens,
            rate_limit_retries: config.retry.rate_limit_retries,
        })
    }

    async fn send(&self, request: &ChatRequest) -> anyhow::Result<String> {
        let mut last_error = String::new();
        let mut retry_count = 0;

        while retry_count <= self.rate_limit_retries {
            let response = self
                .http
                .post(&self.url)
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(request)
                .send()
                .await?;

            let status = response.status();
            let text = response.text().await?;

            if status.is_success() {
                let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
                    anyhow::anyhow!(
                        "Failed to parse chat response: {}\n{}",
                        e,
                        truncate_str(&text, 500)
                    )
                })?;

                if let Some(usage) = &parsed.usage {
                    tracing::debug!(
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        total_tokens = usage.total_tokens,
                        "LLM usage"
                    );
                }

                let content = parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .unwrap_or_default();
                if content.trim().is_empty() {
                    anyhow::bail!("Model returned an empty response");
                }
                return Ok(content);
            }

            last_error = text.clone();

            if status.as_u16() == 429 {
                if let Some(retry_after) =
                    rate_limit_delay(retry_count, self.rate_limit_retries, &text)
                {
                    retry_count += 1;
                    tracing::warn!(
                        "Rate limited. Retrying in {}s (attempt {}/{})",
                        retry_after,
                        retry_count,
                        self.rate_limit_retries
                    );
                    tokio::time::sleep(tokio::time::Duration::from_secs(retry_after)).await;
                    continue;
                }
            }

            let error_msg = match status.as_u16() {
                401 => "Invalid API key.".to_string(),
                429 if retry_count == 0 => "Rate limited by the provider.".to_string(),
                429 => format!(
                    "Rate limited after {} retries. Try again in a few minutes.",
                    retry_count
                ),
                500..=599 => format!(
                    "Provider server error ({}). The service may be temporarily unavailable.",
                    status
                ),
                _ => format!("API error {}: {}", status, truncate_str(&text, 200)),
            };
            return Err(anyhow::anyhow!("{}", error_msg));
        }

        Err(anyhow::anyhow!("{}", last_error))
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn complete(&self, prompt: &Prompt) -> anyhow::Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: prompt.system.clone(),
                },
                Message {
                    role: "user".to_string(),
                    content: prompt.user.clone(),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: prompt.temperature,
            stream: false,
        };
        self.send(&request).await
    }
}

/// Seconds to wait before the next request after a 429, or `None` once
/// `max_retries` extra requests have been spent
fn rate_limit_delay(retry_count: u32, max_retries: u32, body: &str) -> Option<u64> {
    if retry_count >= max_retries {
        return None;
    }
    Some(
        parse_retry_after(body)
            .unwrap_or((INITIAL_BACKOFF_MS * BACKOFF_MULTIPLIER.pow(retry_count)) / 1000),
    )
}

/// Extract a retry-after hint from a rate-limit response body (if present)
fn parse_retry_after(text: &str) -> Option<u64> {
    // Look for patterns like "retry after X seconds" or "wait X seconds"
    let text_lower = text.to_lowercase();
    let pos = text_lower.find("retry").or_else(|| text_lower.find("wait"))?;
    for word in text_lower[pos..].split_whitespace().skip(1).take(5) {
        if let Ok(secs) = word
            .trim_matches(|c: char| !c.is_numeric())
            .parse::<u64>()
        {
            if secs > 0 && secs < 300 {
                return Some(secs);
            }
        }
    }
    None
}

/// Truncate a string for display (Unicode-safe)
pub(crate) fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}
