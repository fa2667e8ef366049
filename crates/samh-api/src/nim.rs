//! Suggestion generator backed by an OpenAI-compatible chat completion
//! endpoint (NVIDIA NIM by default).

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use samh_types::api::PriorMessage;

use crate::suggestions::{SUGGESTION_COUNT, SuggestionError, SuggestionGenerator, normalize};

pub const DEFAULT_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";
pub const DEFAULT_MODEL: &str = "deepseek-ai/deepseek-r1";

const MAX_TOKENS: u32 = 100;
const PREAMBLES: [&str; 3] = ["here are", "certainly", "i'm here"];

#[derive(Debug, Clone)]
pub struct NimConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

pub struct NimSuggestionGenerator {
    http: HttpClient,
    config: NimConfig,
}

#[derive(Serialize)]
struct CompletionMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<CompletionMessage<'a>>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionContent,
}

#[derive(Deserialize)]
struct CompletionContent {
    content: Option<String>,
}

impl NimSuggestionGenerator {
    pub fn new(config: NimConfig) -> Self {
        Self {
            http: HttpClient::new(),
            config,
        }
    }

    async fn complete(&self, prompt: &str, temperature: f32, top_p: f32) -> Result<String, SuggestionError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = CompletionRequest {
            model: &self.config.model,
            messages: vec![CompletionMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
            top_p,
            max_tokens: MAX_TOKENS,
            stream: false,
        };

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SuggestionError::Upstream { status, body });
        }

        let completion: CompletionResponse = resp.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(SuggestionError::EmptyCompletion)
    }
}

#[async_trait]
impl SuggestionGenerator for NimSuggestionGenerator {
    async fn generate(
        &self,
        conversation_id: &str,
        messages: &[PriorMessage],
        force_refresh: bool,
    ) -> Result<Vec<String>, SuggestionError> {
        let prompt = build_prompt(messages);

        // A forced refresh should not hand back the same three lines again.
        let (temperature, top_p) = if force_refresh {
            let mut rng = rand::rng();
            (rng.random_range(0.7..1.0), rng.random_range(0.8..1.0))
        } else {
            (0.5, 0.7)
        };
        info!(
            "Requesting suggestions for conversation {} (temp={:.2}, top_p={:.2})",
            conversation_id, temperature, top_p
        );

        let output = tokio::time::timeout(
            self.config.timeout,
            self.complete(&prompt, temperature, top_p),
        )
        .await
        .map_err(|_| SuggestionError::Timeout(self.config.timeout))??;

        debug!("Raw completion for {}: {}", conversation_id, output.trim());
        Ok(parse_suggestions(&output))
    }
}

pub fn build_prompt(messages: &[PriorMessage]) -> String {
    let history = messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a mental health support assistant. Based on the conversation history below, \
         provide exactly {SUGGESTION_COUNT} short, empathetic response suggestions for an admin to use. \
         Each suggestion should be under 15 words and be supportive and appropriate.\n\n\
         Conversation History:\n{history}\n\n\
         Respond with ONLY {SUGGESTION_COUNT} lines, each containing one suggestion. \
         No explanations, no reasoning, just the {SUGGESTION_COUNT} suggestions."
    )
}

/// Pull suggestions out of free-form model output.
///
/// Numbered (`1. ...`) or quoted lines win; otherwise the last few usable
/// lines are taken. The result always has exactly three entries.
pub fn parse_suggestions(output: &str) -> Vec<String> {
    let output = strip_reasoning(output);
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut suggestions: Vec<String> = lines
        .iter()
        .filter_map(|line| {
            let body = match strip_numbering(line) {
                Some(rest) => rest,
                None if line.starts_with(['"', '\'']) => line,
                None => return None,
            };
            let body = strip_quotes(body);
            usable(body).then(|| body.to_string())
        })
        .collect();

    if suggestions.len() < SUGGESTION_COUNT {
        let tail = &lines[lines.len().saturating_sub(SUGGESTION_COUNT)..];
        suggestions = tail
            .iter()
            .filter(|line| usable(line) && !is_preamble(line))
            .map(|line| line.to_string())
            .collect();
    }

    normalize(suggestions)
}

/// Reasoning models may prefix the answer with a `<think>` block.
fn strip_reasoning(output: &str) -> &str {
    match output.rfind("</think>") {
        Some(end) => &output[end + "</think>".len()..],
        None => output,
    }
}

fn strip_numbering(line: &str) -> Option<&str> {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    line[digits..].strip_prefix('.').map(str::trim_start)
}

fn strip_quotes(s: &str) -> &str {
    let s = s.strip_prefix(['"', '\'']).unwrap_or(s);
    s.strip_suffix(['"', '\'']).unwrap_or(s)
}

fn usable(s: &str) -> bool {
    let len = s.chars().count();
    len > 5 && len < 100
}

fn is_preamble(line: &str) -> bool {
    let lower = line.to_lowercase();
    PREAMBLES.iter().any(|p| lower.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use samh_types::api::ChatRole;

    #[test]
    fn numbered_lines_are_cleaned() {
        let output = "Here are three ideas:\n1. \"That sounds really hard.\"\n2. I'm glad you reached out.\n3. 'Want to tell me more?'";
        assert_eq!(
            parse_suggestions(output),
            vec![
                "That sounds really hard.",
                "I'm glad you reached out.",
                "Want to tell me more?",
            ]
        );
    }

    #[test]
    fn falls_back_to_trailing_lines() {
        let output = "Certainly! Here you go\nYou are not alone in this.\nTake it one step at a time.\nI am listening.";
        assert_eq!(
            parse_suggestions(output),
            vec![
                "You are not alone in this.",
                "Take it one step at a time.",
                "I am listening.",
            ]
        );
    }

    #[test]
    fn pads_short_output() {
        let suggestions = parse_suggestions("ok");
        assert_eq!(suggestions, vec!["How can I help you today?"; 3]);
    }

    #[test]
    fn drops_reasoning_block() {
        let output = "<think>\n1. This is my private reasoning line\n</think>\n1. First reply here\n2. Second reply here\n3. Third reply here";
        assert_eq!(
            parse_suggestions(output),
            vec!["First reply here", "Second reply here", "Third reply here"]
        );
    }

    #[test]
    fn prompt_includes_history_roles() {
        let prompt = build_prompt(&[
            PriorMessage {
                id: None,
                role: ChatRole::Assistant,
                content: "I can't sleep".into(),
            },
            PriorMessage {
                id: None,
                role: ChatRole::User,
                content: "I'm sorry to hear that".into(),
            },
        ]);
        assert!(prompt.contains("assistant: I can't sleep\nuser: I'm sorry to hear that"));
        assert!(prompt.contains("exactly 3 short"));
    }
}
