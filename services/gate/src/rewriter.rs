//! Resume rewriting through a chat-completion model
//!
//! The model is asked for a JSON object with `sections` and `markdown`. Models
//! do not always comply, so [`parse_completion`] accepts fenced JSON, falls
//! back to a fenced markdown block, and finally to the whole reply as markdown.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::OnceLock};
use tracing::{debug, warn};

use crate::models::{RewriteRequest, RewriteResponse};

const COMPLETIONS_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str = r#"You are Resume Rewriter, an expert at tailoring resumes to job descriptions.

Rewrite the provided resume to better match the job description while staying honest and accurate. Do not fabricate or exaggerate experience.

Template styles:
- classic: traditional layout, clear section headers, bullet points for achievements; sections Summary, Experience, Education, Skills
- modern: bold headers, achievement-focused bullets, may add Projects or Certifications
- minimal: plain formatting, short bullets, streamlined sections

Respond with a JSON object only, no text before or after it:
{
  "sections": {
    "summary": "...",
    "experience": "...",
    "education": "...",
    "skills": "..."
  },
  "markdown": "the complete resume in markdown"
}

Markdown rules: # for the name, ## for section headers, ### for roles, - for bullets, **bold** for companies, titles and key skills, *italic* for dates and locations, --- between major sections. Use single quotes instead of double quotes inside text."#;

/// Sections reported when the reply carried only markdown
const PLACEHOLDER_SECTIONS: [(&str, &str); 4] = [
    ("summary", "Professional summary extracted from response"),
    ("experience", "Work experience extracted from response"),
    ("education", "Education extracted from response"),
    ("skills", "Skills extracted from response"),
];

/// Rewrite collaborator
#[async_trait]
pub trait Rewriter: Send + Sync {
    async fn rewrite(&self, request: &RewriteRequest) -> Result<RewriteResponse>;
}

/// Rewriter backed by the OpenAI chat completions API
pub struct OpenAiRewriter {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiRewriter {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("build http client")?;

        Ok(Self {
            http,
            api_key,
            model,
        })
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[async_trait]
impl Rewriter for OpenAiRewriter {
    async fn rewrite(&self, request: &RewriteRequest) -> Result<RewriteResponse> {
        let prompt = format!(
            "Resume:\n{}\n\nJob Description:\n{}\n\nTemplate Style: {}",
            request.resume, request.job_description, request.template
        );

        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.7,
            max_tokens: 1500,
        };

        let response = self
            .http
            .post(COMPLETIONS_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("send completion request")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("completion API returned {status}: {text}");
        }

        let completion: ChatResponse = response
            .json()
            .await
            .context("decode completion response")?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_else(|| "{}".to_string());

        parse_completion(&content)
    }
}

#[derive(Deserialize)]
struct PartialRewrite {
    #[serde(default)]
    sections: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    markdown: Option<String>,
}

/// Flatten a section value; models sometimes answer lists or objects
fn section_text(value: serde_json::Value) -> String {
    use serde_json::Value;

    match value {
        Value::String(text) => text,
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(text) => text,
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

/// Turn a model reply into a [`RewriteResponse`]
pub fn parse_completion(content: &str) -> Result<RewriteResponse> {
    let cleaned = strip_json_fences(content.trim());

    match serde_json::from_str::<PartialRewrite>(&cleaned) {
        Ok(parsed) => {
            let sections = parsed
                .sections
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.into_iter()
                        .map(|(k, v)| (k, section_text(v)))
                        .collect::<BTreeMap<_, _>>()
                });
            let markdown = parsed.markdown.filter(|m| !m.trim().is_empty());
            match (sections, markdown) {
                (Some(sections), Some(markdown)) => Ok(RewriteResponse { sections, markdown }),
                _ => Err(anyhow!("malformed completion: missing sections or markdown")),
            }
        }
        Err(e) => {
            warn!("Completion is not JSON, falling back to markdown: {}", e);
            debug!("Raw completion: {}", content);

            let markdown = fenced_block(content)
                .unwrap_or_else(|| content.trim().to_string());
            if markdown.is_empty() {
                bail!("empty completion");
            }

            Ok(RewriteResponse {
                sections: PLACEHOLDER_SECTIONS
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                markdown,
            })
        }
    }
}

fn strip_json_fences(content: &str) -> String {
    let without_open = content.replace("```json", "");
    let trimmed = without_open.trim();
    trimmed
        .strip_suffix("```")
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

fn fenced_block(content: &str) -> Option<String> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    let regex = FENCE
        .get_or_init(|| Regex::new(r"```(?:markdown)?\n?([\s\S]*?)\n?```").ok())
        .as_ref()?;

    regex
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|block| !block.is_empty())
}
