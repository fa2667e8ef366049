use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use samh_types::api::{
    CreateConversationRequest, ErrorBody, ErrorCode, IdResponse, LoginRequest, MarkReadRequest,
    MessageResponse, PriorMessage, SendMessageRequest, SetDeletedRequest, StatusResponse,
    SuggestionRequest, SuggestionResponse,
};
use samh_types::models::{AccountKind, ConversationSummary, User};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};

/// The server operations the sync layer depends on.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn list_conversations(&self, user: &str) -> Result<Vec<ConversationSummary>>;

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        current_user: &str,
    ) -> Result<Vec<MessageResponse>>;

    async fn mark_read(&self, conversation_id: Uuid, user: &str) -> Result<()>;

    async fn send_message(&self, conversation_id: Uuid, sender: &str, text: &str) -> Result<Uuid>;

    async fn create_conversation(&self, user1: &str, user2: &str) -> Result<Uuid>;

    async fn set_deleted(&self, conversation_id: Uuid, user: &str, deleted: bool) -> Result<()>;

    async fn generate_suggestions(
        &self,
        conversation_id: Uuid,
        messages: &[PriorMessage],
        force_refresh: bool,
    ) -> Result<Vec<String>>;
}

/// [`ChatApi`] over the service's REST surface.
#[derive(Clone)]
pub struct HttpChatApi {
    http: Client,
    base_url: Url,
}

impl HttpChatApi {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|_| SyncError::InvalidBaseUrl(config.base_url.clone()))?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::InvalidBaseUrl(config.base_url.clone()));
        }
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { http, base_url })
    }

    /// Record a login and return the stored account.
    pub async fn login(&self, username: &str, kind: AccountKind) -> Result<User> {
        let body = LoginRequest {
            username: username.to_string(),
            account_type: kind.as_str().to_string(),
        };
        let resp = self
            .http
            .post(self.url(&["users", "login"])?)
            .json(&body)
            .send()
            .await?;
        decode(resp).await
    }

    /// Base URL with `segments` appended, each percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn list_conversations(&self, user: &str) -> Result<Vec<ConversationSummary>> {
        let resp = self
            .http
            .get(self.url(&["conversations", user])?)
            .send()
            .await?;
        decode(resp).await
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        current_user: &str,
    ) -> Result<Vec<MessageResponse>> {
        let id = conversation_id.to_string();
        let resp = self
            .http
            .get(self.url(&["conversations", &id, "messages"])?)
            .query(&[("currentUser", current_user)])
            .send()
            .await?;
        decode(resp).await
    }

    async fn mark_read(&self, conversation_id: Uuid, user: &str) -> Result<()> {
        let id = conversation_id.to_string();
        let resp = self
            .http
            .put(self.url(&["conversations", &id, "read"])?)
            .json(&MarkReadRequest {
                user_id: user.to_string(),
            })
            .send()
            .await?;
        decode::<StatusResponse>(resp).await?;
        Ok(())
    }

    async fn send_message(&self, conversation_id: Uuid, sender: &str, text: &str) -> Result<Uuid> {
        let resp = self
            .http
            .post(self.url(&["messages"])?)
            .json(&SendMessageRequest {
                conversation_id,
                sender_username: sender.to_string(),
                text: text.to_string(),
            })
            .send()
            .await?;
        let created: IdResponse = decode(resp).await?;
        Ok(created.id)
    }

    async fn create_conversation(&self, user1: &str, user2: &str) -> Result<Uuid> {
        let resp = self
            .http
            .post(self.url(&["conversations"])?)
            .json(&CreateConversationRequest {
                user1: user1.to_string(),
                user2: user2.to_string(),
            })
            .send()
            .await?;
        let created: IdResponse = decode(resp).await?;
        Ok(created.id)
    }

    async fn set_deleted(&self, conversation_id: Uuid, user: &str, deleted: bool) -> Result<()> {
        let id = conversation_id.to_string();
        let resp = self
            .http
            .put(self.url(&["conversations", &id])?)
            .json(&SetDeletedRequest {
                is_deleted: deleted,
                user_id: user.to_string(),
            })
            .send()
            .await?;
        decode::<StatusResponse>(resp).await?;
        Ok(())
    }

    async fn generate_suggestions(
        &self,
        conversation_id: Uuid,
        messages: &[PriorMessage],
        force_refresh: bool,
    ) -> Result<Vec<String>> {
        let body = SuggestionRequest {
            conversation_id: conversation_id.to_string(),
            messages: messages.to_vec(),
            force_refresh,
        };
        let result: Result<SuggestionResponse> = async {
            let resp = self
                .http
                .post(self.url(&["chat", "generate-quick-messages"])?)
                .json(&body)
                .send()
                .await?;
            decode(resp).await
        }
        .await;

        result
            .map(|r| r.suggestions)
            .map_err(|e| SyncError::SuggestionGenerationFailure(e.to_string()))
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }

    debug!("Request to {} failed with {}", resp.url().path(), status);
    match resp.json::<ErrorBody>().await {
        Ok(body) => Err(SyncError::Rejected {
            status: status.as_u16(),
            code: body.error,
            message: body.message,
        }),
        Err(_) => Err(SyncError::Rejected {
            status: status.as_u16(),
            code: fallback_code(status),
            message: status.to_string(),
        }),
    }
}

/// Error code for responses that did not carry a JSON error body.
fn fallback_code(status: StatusCode) -> ErrorCode {
    match status {
        StatusCode::NOT_FOUND => ErrorCode::NotFound,
        StatusCode::FORBIDDEN => ErrorCode::NotParticipant,
        s if s.is_server_error() => ErrorCode::Internal,
        _ => ErrorCode::InvalidRequest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_segments_are_encoded() {
        let api = HttpChatApi::new(&SyncConfig::new("http://localhost:3001/")).unwrap();
        let url = api.url(&["conversations", "jane doe"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3001/conversations/jane%20doe");
    }

    #[test]
    fn keeps_base_path_prefix() {
        let api = HttpChatApi::new(&SyncConfig::new("http://localhost/api/chat")).unwrap();
        let url = api.url(&["messages"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost/api/chat/messages");
    }

    #[test]
    fn rejects_unusable_base_url() {
        assert!(matches!(
            HttpChatApi::new(&SyncConfig::new("not a url")),
            Err(SyncError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            HttpChatApi::new(&SyncConfig::new("mailto:someone@example.com")),
            Err(SyncError::InvalidBaseUrl(_))
        ));
    }
}
