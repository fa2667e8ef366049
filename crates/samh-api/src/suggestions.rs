use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::extract::State;
use tracing::{debug, info, warn};

use samh_types::api::{PriorMessage, SuggestionRequest, SuggestionResponse};

use crate::AppState;
use crate::error::ApiError;
use crate::extract::Json;

/// Every answer carries exactly this many suggestions.
pub const SUGGESTION_COUNT: usize = 3;

const CACHE_TTL: Duration = Duration::from_secs(10);
const PAD_SUGGESTION: &str = "How can I help you today?";
const FALLBACK_SUGGESTIONS: [&str; SUGGESTION_COUNT] = [
    "How are you feeling today?",
    "I'm here to listen and support you.",
    "Would you like to talk about what's on your mind?",
];

#[derive(Debug, thiserror::Error)]
pub enum SuggestionError {
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream returned no completion")]
    EmptyCompletion,
}

/// Produces reply suggestions for an admin from the conversation so far.
#[async_trait]
pub trait SuggestionGenerator: Send + Sync {
    async fn generate(
        &self,
        conversation_id: &str,
        messages: &[PriorMessage],
        force_refresh: bool,
    ) -> Result<Vec<String>, SuggestionError>;
}

/// Generator used when no LLM endpoint is configured.
pub struct StaticSuggestions;

#[async_trait]
impl SuggestionGenerator for StaticSuggestions {
    async fn generate(
        &self,
        _conversation_id: &str,
        _messages: &[PriorMessage],
        _force_refresh: bool,
    ) -> Result<Vec<String>, SuggestionError> {
        Ok(fallback_suggestions())
    }
}

pub fn fallback_suggestions() -> Vec<String> {
    FALLBACK_SUGGESTIONS.iter().map(|s| s.to_string()).collect()
}

/// Trim or pad to exactly [`SUGGESTION_COUNT`] entries.
pub fn normalize(mut suggestions: Vec<String>) -> Vec<String> {
    suggestions.truncate(SUGGESTION_COUNT);
    while suggestions.len() < SUGGESTION_COUNT {
        suggestions.push(PAD_SUGGESTION.to_string());
    }
    suggestions
}

struct CachedSuggestions {
    suggestions: Vec<String>,
    stored_at: Instant,
}

/// Short-lived cache in front of a [`SuggestionGenerator`].
///
/// Generation failures never surface to the caller; they fall back to a
/// fixed set so message delivery is never blocked on the LLM.
pub struct SuggestionService {
    generator: Arc<dyn SuggestionGenerator>,
    cache: Mutex<HashMap<String, CachedSuggestions>>,
    ttl: Duration,
}

impl SuggestionService {
    pub fn new(generator: Arc<dyn SuggestionGenerator>) -> Self {
        Self::with_ttl(generator, CACHE_TTL)
    }

    pub fn with_ttl(generator: Arc<dyn SuggestionGenerator>, ttl: Duration) -> Self {
        Self {
            generator,
            cache: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn suggest(
        &self,
        conversation_id: &str,
        messages: &[PriorMessage],
        force_refresh: bool,
    ) -> Vec<String> {
        let key = cache_key(conversation_id, messages);

        if force_refresh {
            info!("Force refresh requested for conversation {}, bypassing cache", conversation_id);
        } else if let Some(hit) = self.cached(&key) {
            debug!("Using cached suggestions for conversation {}", conversation_id);
            return hit;
        }

        match self
            .generator
            .generate(conversation_id, messages, force_refresh)
            .await
        {
            Ok(suggestions) => {
                let suggestions = normalize(suggestions);
                self.store(key, suggestions.clone());
                suggestions
            }
            Err(e) => {
                warn!(
                    "Suggestion generation failed for conversation {}: {}",
                    conversation_id, e
                );
                fallback_suggestions()
            }
        }
    }

    fn cached(&self, key: &str) -> Option<Vec<String>> {
        let cache = self.cache.lock().ok()?;
        cache
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.suggestions.clone())
    }

    fn store(&self, key: String, suggestions: Vec<String>) {
        let Ok(mut cache) = self.cache.lock() else {
            return;
        };
        let ttl = self.ttl;
        cache.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        cache.insert(
            key,
            CachedSuggestions {
                suggestions,
                stored_at: Instant::now(),
            },
        );
    }
}

fn cache_key(conversation_id: &str, messages: &[PriorMessage]) -> String {
    let last = messages
        .last()
        .and_then(|m| m.id)
        .map_or_else(|| "empty".to_string(), |id| id.to_string());
    format!("{}_{}_{}", conversation_id, messages.len(), last)
}

/// POST /chat/generate-quick-messages
pub async fn generate_quick_messages(
    State(state): State<AppState>,
    Json(req): Json<SuggestionRequest>,
) -> Result<Json<SuggestionResponse>, ApiError> {
    if req.conversation_id.trim().is_empty() {
        return Err(ApiError::bad_request("conversationId is required"));
    }

    info!(
        "Generating suggestions for conversation {} ({} messages)",
        req.conversation_id,
        req.messages.len()
    );
    let suggestions = state
        .suggestions
        .suggest(&req.conversation_id, &req.messages, req.force_refresh)
        .await;

    Ok(Json(SuggestionResponse { suggestions }))
}
