use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use samh_types::api::{ChatRole, MessageResponse, PriorMessage};
use samh_types::models::ConversationSummary;

use crate::api::ChatApi;
use crate::capability::{SessionUser, SuggestionCapability};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::state::{ConversationChange, ConversationPatch, SessionState, SingleFlight};

/// What the UI hears about. Delivered in the order changes were observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    ConversationAdded(ConversationSummary),
    ConversationUpdated(ConversationPatch),
    ConversationRemoved(Uuid),
    MessagesArrived {
        conversation_id: Uuid,
        messages: Vec<MessageResponse>,
    },
    SuggestionsReady {
        conversation_id: Uuid,
        suggestions: Vec<String>,
    },
}

impl From<ConversationChange> for SyncEvent {
    fn from(change: ConversationChange) -> Self {
        match change {
            ConversationChange::Added(summary) => Self::ConversationAdded(summary),
            ConversationChange::Updated(patch) => Self::ConversationUpdated(patch),
            ConversationChange::Removed(id) => Self::ConversationRemoved(id),
        }
    }
}

struct Shared {
    api: Arc<dyn ChatApi>,
    user: SessionUser,
    capability: Arc<dyn SuggestionCapability>,
    state: Mutex<SessionState>,
    flights: SingleFlight,
    events: mpsc::UnboundedSender<SyncEvent>,
}

/// One signed-in user's view of the chat service, kept fresh by polling.
///
/// The list poll runs from [`start`](Self::start) until [`end`](Self::end).
/// The message poll runs only for the open conversation. Neither aborts a
/// request already on the wire; responses for a conversation that is no
/// longer open are dropped instead.
pub struct ChatSession {
    shared: Arc<Shared>,
    config: SyncConfig,
    session_token: CancellationToken,
    list_token: Option<CancellationToken>,
    conversation_token: Option<CancellationToken>,
}

impl ChatSession {
    pub fn new(
        api: Arc<dyn ChatApi>,
        user: SessionUser,
        config: SyncConfig,
        capability: Arc<dyn SuggestionCapability>,
    ) -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            api,
            user,
            capability,
            state: Mutex::new(SessionState::default()),
            flights: SingleFlight::default(),
            events,
        });
        let session = Self {
            shared,
            config,
            session_token: CancellationToken::new(),
            list_token: None,
            conversation_token: None,
        };
        (session, rx)
    }

    pub fn user(&self) -> &SessionUser {
        &self.shared.user
    }

    /// Start polling the conversation list. Calling it again is a no-op.
    pub fn start(&mut self) {
        if self.list_token.is_some() {
            return;
        }
        info!("Starting chat session for {}", self.shared.user.username);

        let token = self.session_token.child_token();
        let shared = self.shared.clone();
        spawn_poll(token.clone(), self.config.poll_interval, "conversation list", move || {
            let shared = shared.clone();
            async move { shared.poll_list().await }
        });
        self.list_token = Some(token);
    }

    /// Load a conversation's history and begin polling it.
    ///
    /// The history counts as seen: only messages that show up after this
    /// call are reported through [`SyncEvent::MessagesArrived`].
    ///
    /// The previous conversation stops counting as open before the history
    /// request goes out, so its in-flight polls are dropped. On error no
    /// conversation is open.
    pub async fn open_conversation(&mut self, conversation_id: Uuid) -> Result<Vec<MessageResponse>> {
        self.stop_conversation_poll();
        self.shared.state().set_active(None);

        let username = &self.shared.user.username;
        let history = self.shared.api.list_messages(conversation_id, username).await?;
        {
            let mut state = self.shared.state();
            state.set_active(Some(conversation_id));
            state.seed_seen(conversation_id, &history);
        }
        debug!(
            "Opened conversation {} with {} message(s)",
            conversation_id,
            history.len()
        );

        if let Err(e) = self.shared.api.mark_read(conversation_id, username).await {
            warn!("Failed to mark conversation {} read: {}", conversation_id, e);
        }

        let token = self.session_token.child_token();
        let shared = self.shared.clone();
        spawn_poll(token.clone(), self.config.poll_interval, "conversation", move || {
            let shared = shared.clone();
            async move { shared.poll_conversation(conversation_id).await }
        });
        self.conversation_token = Some(token);

        Ok(history)
    }

    pub fn close_conversation(&mut self) {
        self.stop_conversation_poll();
        self.shared.state().set_active(None);
    }

    /// Stop all polling and drop the session state.
    pub fn end(mut self) {
        info!("Ending chat session for {}", self.shared.user.username);
        self.session_token.cancel();
        self.list_token = None;
        self.conversation_token = None;
        *self.shared.state() = SessionState::default();
    }

    /// Errors are returned as-is so the caller can offer a retry.
    pub async fn send_message(&self, conversation_id: Uuid, text: &str) -> Result<Uuid> {
        self.shared
            .api
            .send_message(conversation_id, &self.shared.user.username, text)
            .await
    }

    pub async fn create_conversation(&self, contact: &str) -> Result<Uuid> {
        self.shared
            .api
            .create_conversation(&self.shared.user.username, contact)
            .await
    }

    pub async fn set_deleted(&self, conversation_id: Uuid, deleted: bool) -> Result<()> {
        self.shared
            .api
            .set_deleted(conversation_id, &self.shared.user.username, deleted)
            .await
    }

    /// Ask for a fresh set of suggestions, bypassing the server cache.
    ///
    /// Returns the suggestions now current for the conversation. `None`
    /// when the user may not request suggestions, a generation is already
    /// running, there is no history yet, or the conversation was closed
    /// meanwhile. A failed generation keeps the previous set.
    pub async fn request_suggestions(&self, conversation_id: Uuid) -> Option<Vec<String>> {
        let shared = &self.shared;
        if !shared.capability.can_request_suggestions(&shared.user) {
            debug!("{} may not request suggestions", shared.user.username);
            return None;
        }
        let Some(_flight) = shared.flights.try_acquire(conversation_id) else {
            debug!("Suggestions already in flight for {}", conversation_id);
            return None;
        };

        let history = match shared
            .api
            .list_messages(conversation_id, &shared.user.username)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                warn!("Failed to load history for suggestions: {}", e);
                return shared.current_suggestions(conversation_id);
            }
        };
        if history.is_empty() {
            return None;
        }

        let prior = prior_messages(&history, &shared.user.username);
        shared.generate(conversation_id, &prior, true).await
    }

    pub fn suggestions(&self, conversation_id: Uuid) -> Option<Vec<String>> {
        self.shared.current_suggestions(conversation_id)
    }

    pub fn conversations(&self) -> Vec<ConversationSummary> {
        self.shared.state().conversations()
    }

    pub fn active_conversation(&self) -> Option<Uuid> {
        self.shared.state().active()
    }

    /// One conversation-list poll, as run by the list poll task.
    pub async fn poll_list_once(&self) -> Result<()> {
        self.shared.poll_list().await
    }

    /// One message poll of `conversation_id`, as run by the conversation
    /// poll task.
    pub async fn poll_conversation_once(&self, conversation_id: Uuid) -> Result<()> {
        self.shared.poll_conversation(conversation_id).await
    }

    fn stop_conversation_poll(&mut self) {
        if let Some(token) = self.conversation_token.take() {
            token.cancel();
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.session_token.cancel();
    }
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SyncEvent) {
        // Nobody listening is fine; the state is still kept current.
        let _ = self.events.send(event);
    }

    fn current_suggestions(&self, conversation_id: Uuid) -> Option<Vec<String>> {
        self.state().suggestions(conversation_id).map(<[String]>::to_vec)
    }

    async fn poll_list(&self) -> Result<()> {
        let fresh = self.api.list_conversations(&self.user.username).await?;
        let changes = self.state().apply_summaries(fresh);
        for change in changes {
            self.emit(change.into());
        }
        Ok(())
    }

    async fn poll_conversation(self: &Arc<Self>, conversation_id: Uuid) -> Result<()> {
        let messages = self
            .api
            .list_messages(conversation_id, &self.user.username)
            .await?;

        let fresh = {
            let mut state = self.state();
            if !state.is_active(conversation_id) {
                debug!("Discarding stale poll for conversation {}", conversation_id);
                return Ok(());
            }
            state.record_messages(conversation_id, &messages)
        };
        if fresh.is_empty() {
            return Ok(());
        }

        debug!(
            "{} new message(s) in conversation {}",
            fresh.len(),
            conversation_id
        );
        let from_contact = fresh
            .iter()
            .any(|m| m.sender_username != self.user.username);
        self.emit(SyncEvent::MessagesArrived {
            conversation_id,
            messages: fresh,
        });

        if from_contact {
            self.trigger_suggestions(conversation_id, &messages);
        }
        self.api.mark_read(conversation_id, &self.user.username).await
    }

    /// Kick off generation in the background unless the user lacks the
    /// capability or one is already running for this conversation.
    fn trigger_suggestions(self: &Arc<Self>, conversation_id: Uuid, history: &[MessageResponse]) {
        if !self.capability.can_request_suggestions(&self.user) {
            return;
        }
        let Some(flight) = self.flights.try_acquire(conversation_id) else {
            debug!("Suggestions already in flight for {}", conversation_id);
            return;
        };

        let prior = prior_messages(history, &self.user.username);
        let shared = self.clone();
        tokio::spawn(async move {
            let _flight = flight;
            shared.generate(conversation_id, &prior, false).await;
        });
    }

    async fn generate(
        &self,
        conversation_id: Uuid,
        prior: &[PriorMessage],
        force_refresh: bool,
    ) -> Option<Vec<String>> {
        let suggestions = match self
            .api
            .generate_suggestions(conversation_id, prior, force_refresh)
            .await
        {
            Ok(suggestions) => suggestions,
            Err(e) => {
                warn!("Keeping previous suggestions for {}: {}", conversation_id, e);
                return self.current_suggestions(conversation_id);
            }
        };

        {
            let mut state = self.state();
            if !state.is_active(conversation_id) {
                debug!("Discarding suggestions for closed conversation {}", conversation_id);
                return None;
            }
            state.set_suggestions(conversation_id, suggestions.clone());
        }
        self.emit(SyncEvent::SuggestionsReady {
            conversation_id,
            suggestions: suggestions.clone(),
        });
        Some(suggestions)
    }
}

/// History as the suggestion generator sees it: the session user speaks as
/// `user`, the contact as `assistant`.
fn prior_messages(history: &[MessageResponse], username: &str) -> Vec<PriorMessage> {
    history
        .iter()
        .map(|m| PriorMessage {
            id: Some(m.id),
            role: if m.sender_username == username {
                ChatRole::User
            } else {
                ChatRole::Assistant
            },
            content: m.text.clone(),
        })
        .collect()
}

/// Tick immediately, then every `period`, until `token` is cancelled.
///
/// Cancellation is checked between ticks only, so a tick already running
/// finishes. Failures are logged and retried on the next tick.
fn spawn_poll<F, Fut>(token: CancellationToken, period: Duration, label: &'static str, mut tick: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = tick().await {
                        log_poll_failure(label, &e);
                    }
                }
            }
        }
        debug!("{} poll stopped", label);
    });
}

fn log_poll_failure(label: &str, err: &SyncError) {
    if err.is_transient() {
        debug!("{} poll failed, retrying next tick: {}", label, err);
    } else {
        warn!("{} poll failed: {}", label, err);
    }
}
