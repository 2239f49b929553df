//! Scoring oracle backed by a chat-completion model.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::gate::{OracleVerdict, ScoringOracle};

const ORACLE_TEMPERATURE: f32 = 0.3;
const ORACLE_MAX_TOKENS: u32 = 600;

const SYSTEM_PROMPT: &str = "\
You qualify sales leads. Read the web content a person posted and estimate \
their buying intent for the product described, as an integer from 0 to 100. \
Score high only when the person explicitly asks for a recommendation, tool or \
solution that the product provides. Then draft a short, helpful, \
peer-to-peer outreach message (no fluff, one clear value proposition, \
include the product link once).

Respond with a single JSON object and nothing else:
{\"score\": <int 0-100>, \"rationale\": \"<one sentence>\", \"draft_message\": \"<message>\"}";

/// Oracle JSON with the field names older prompts used accepted as aliases.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    score: serde_json::Value,
    #[serde(default, alias = "reason")]
    rationale: String,
    #[serde(default, alias = "suggested_hook", alias = "message")]
    draft_message: String,
}

pub struct LlmOracle {
    llm: Arc<dyn LlmProvider>,
}

impl LlmOracle {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

pub(crate) fn build_user_prompt(text: &str, usp: &str, product_link: &str) -> String {
    format!("## Product\n{usp}\nLink: {product_link}\n\n## Content\n{text}")
}

/// Parse the model output into a verdict. Scores must be integral (or a
/// float that rounds to one) and within 0–100.
pub(crate) fn parse_verdict(provider: &str, content: &str) -> Result<OracleVerdict, LlmError> {
    let json_str = extract_json_object(content);
    let raw: RawVerdict = serde_json::from_str(&json_str)?;

    let score = match &raw.score {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| LlmError::InvalidResponse {
        provider: provider.to_string(),
        reason: format!("score is not a number: {}", raw.score),
    })?;

    if !(0..=100).contains(&score) {
        return Err(LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason: format!("score out of range: {score}"),
        });
    }

    Ok(OracleVerdict {
        score,
        rationale: raw.rationale,
        draft_message: raw.draft_message,
    })
}

/// Extract a JSON object from LLM output, handling markdown code fences
/// and surrounding prose.
pub(crate) fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

#[async_trait]
impl ScoringOracle for LlmOracle {
    async fn score(&self, text: &str, usp: &str, product_link: &str) -> Result<OracleVerdict, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_user_prompt(text, usp, product_link)),
        ])
        .with_temperature(ORACLE_TEMPERATURE)
        .with_max_tokens(ORACLE_MAX_TOKENS)
        .with_json_mode();

        let response = self.llm.complete(request).await?;
        parse_verdict(self.llm.model_name(), &response.content).inspect_err(|e| {
            tracing::warn!(
                raw_response = %response.content,
                error = %e,
                "Failed to parse oracle response"
            );
        })
    }
}
