//! Azure-OpenAI-style chat completions client used as an `Explainer`.
//!
//! The model is asked for a JSON object keyed `top1`..`topK` plus an
//! `overall_analysis`. Only rationales for staff ids that were actually
//! sent are kept; the ranking itself never comes from the model.

use crate::{
    config::{DeskConfig, LlmConfig},
    explain::{
        ExplainError, Explainer, Explanation, ExplanationRequest, NoopExplainer, Rationale,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You are an expert ticket assignment assistant. \
Analyze incidents and explain why each ranked team member fits the assignment. \
Respond with structured JSON only. Do not change the ranking you are given. \
Focus on skill matching, on-call status, shift timing, workload capacity and incident priority.";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    response_format: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// One `topN` entry in the model's reply.
#[derive(Debug, Deserialize)]
struct RankedPick {
    user_id: Value,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    reasons: Vec<String>,
    #[serde(default)]
    primary_reason: Option<String>,
}

pub struct ChatCompletionsExplainer {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
    temperature: f64,
    timeout: Duration,
}

impl ChatCompletionsExplainer {
    pub fn from_config(config: &LlmConfig) -> Result<Self, ExplainError> {
        let (Some(endpoint), Some(api_key)) = (config.endpoint.as_deref(), config.api_key.as_deref())
        else {
            return Err(ExplainError::NotConfigured);
        };
        if !config.is_configured() {
            return Err(ExplainError::NotConfigured);
        }
        let timeout = config.timeout();
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: completions_url(endpoint, &config.model, &config.api_version),
            api_key: api_key.trim().to_string(),
            temperature: config.temperature,
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Explainer for ChatCompletionsExplainer {
    fn name(&self) -> &'static str {
        "chat_completions"
    }

    fn explain(&self, request: &ExplanationRequest<'_>) -> Result<Explanation, ExplainError> {
        let body = ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(request),
                },
            ],
            temperature: self.temperature,
            response_format: json!({ "type": "json_object" }),
        };

        let resp = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        let text = resp.text().map_err(|e| self.classify(e))?;
        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| {
                    v.get("error")
                        .and_then(|e| e.get("message"))
                        .and_then(|m| m.as_str())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| text.chars().take(200).collect());
            return Err(ExplainError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| ExplainError::MalformedResponse(format!("envelope: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ExplainError::MalformedResponse("no completion content".into()))?;

        parse_completion(&content, request)
    }
}

impl ChatCompletionsExplainer {
    fn classify(&self, err: reqwest::Error) -> ExplainError {
        if err.is_timeout() {
            ExplainError::Timeout(self.timeout)
        } else {
            ExplainError::Transport(err)
        }
    }
}

pub fn completions_url(endpoint: &str, deployment: &str, api_version: &str) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        endpoint.trim().trim_end_matches('/'),
        deployment.trim(),
        api_version.trim()
    )
}

/// Pick the explainer for a config: the HTTP client when endpoint and key
/// are set, otherwise the no-op.
pub fn explainer_from_config(config: &DeskConfig) -> Box<dyn Explainer> {
    match ChatCompletionsExplainer::from_config(&config.llm) {
        Ok(explainer) => {
            log::info!("LLM explanations enabled via {}", explainer.url());
            Box::new(explainer)
        }
        Err(e) => {
            log::info!("LLM explanations disabled ({e}); using score-only ranking");
            Box::new(NoopExplainer)
        }
    }
}

/// The user prompt: incident context followed by the ranked breakdowns.
pub fn build_prompt(request: &ExplanationRequest<'_>) -> String {
    let inc = request.incident;
    let mut prompt = format!(
        "INCIDENT DETAILS:\n\
         - ID: {}\n\
         - Short Description: {}\n\
         - Category: {}\n\
         - Subcategory: {}\n\
         - Priority: {}\n\
         - Opened At: {}\n\
         \n\
         RANKED CANDIDATES (already ordered, keep this order):\n",
        inc.id,
        inc.short_description.as_deref().unwrap_or("N/A"),
        inc.category.as_deref().unwrap_or("N/A"),
        inc.subcategory,
        inc.priority,
        inc.opened_at.to_rfc3339(),
    );

    for (rank, c) in request.candidates.iter().enumerate() {
        let skills: Vec<&str> = c.staff.skills.iter().map(String::as_str).collect();
        prompt.push_str(&format!(
            "Candidate {}: {} (ID: {})\n\
             \x20 - Skills: {}\n\
             \x20 - Group: {}\n\
             \x20 - On-Call: {}\n\
             \x20 - Load: {}/{}\n\
             \x20 - Score: {:.1} (skill {:.1}, on-call {:.1}, shift {:.1}, availability {:.1})\n",
            rank + 1,
            c.staff.name,
            c.staff.id,
            skills.join(", "),
            c.staff.group.as_deref().unwrap_or("N/A"),
            if c.staff.on_call { "Yes" } else { "No" },
            c.load,
            c.staff.max_concurrent,
            c.total,
            c.breakdown.skill,
            c.breakdown.on_call,
            c.breakdown.shift,
            c.breakdown.availability,
        ));
    }

    prompt.push_str(OUTPUT_INSTRUCTIONS);
    prompt
}

const OUTPUT_INSTRUCTIONS: &str = r#"
REQUIRED OUTPUT (JSON):
{ "top1": { "user_id": "ID", "primary_reason": "skill_match", "reasons": ["..."], "explanation": "..." }, "top2": { ... }, "overall_analysis": "Brief analysis of urgency and fit" }
PRIMARY REASONS: skill_match, on_call, workload, priority, shift. Be concise but specific.
"#;

/// Pull per-candidate rationales out of the model's JSON reply.
fn parse_completion(
    content: &str,
    request: &ExplanationRequest<'_>,
) -> Result<Explanation, ExplainError> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| ExplainError::MalformedResponse(format!("content is not JSON: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| ExplainError::MalformedResponse("content is not a JSON object".into()))?;

    let sent: HashSet<&str> = request.candidates.iter().map(|c| c.staff_id()).collect();
    let mut explanation = Explanation {
        overall_analysis: object
            .get("overall_analysis")
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|s| !s.trim().is_empty()),
        ..Explanation::default()
    };

    for (key, entry) in object {
        let is_rank_key = key
            .strip_prefix("top")
            .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
        if !is_rank_key {
            continue;
        }
        let Ok(pick) = serde_json::from_value::<RankedPick>(entry.clone()) else {
            log::debug!("ignoring unreadable LLM entry {key}");
            continue;
        };
        let user_id = match &pick.user_id {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => continue,
        };
        if !sent.contains(user_id.as_str()) {
            log::debug!("ignoring LLM rationale for unknown staff id {user_id}");
            continue;
        }
        let text = pick.explanation.unwrap_or_default();
        if text.trim().is_empty() && pick.reasons.is_empty() {
            continue;
        }
        explanation.rationales.insert(
            user_id,
            Rationale {
                explanation: text,
                reasons: pick.reasons,
                primary_reason: pick.primary_reason,
            },
        );
    }

    if explanation.rationales.is_empty() {
        return Err(ExplainError::MalformedResponse(
            "no rationale for any ranked candidate".into(),
        ));
    }
    Ok(explanation)
}
