//! Per-session client state.
//!
//! A [`SessionState`] lives exactly as long as its
//! [`ChatSession`](crate::ChatSession). Seen-id sets are created the first
//! time a conversation is opened and are only dropped with the session.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use samh_types::api::MessageResponse;
use samh_types::models::ConversationSummary;

/// Fields of a known conversation that changed since the last list poll.
/// `None` means unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationPatch {
    pub id: Uuid,
    pub last_message_text: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub unread_count: Option<u32>,
    pub is_deleted: Option<bool>,
}

impl ConversationPatch {
    fn between(old: &ConversationSummary, new: &ConversationSummary) -> Option<Self> {
        let patch = Self {
            id: new.id,
            last_message_text: (old.last_message_text != new.last_message_text)
                .then(|| new.last_message_text.clone()),
            last_message_time: (old.last_message_time != new.last_message_time)
                .then_some(new.last_message_time),
            unread_count: (old.unread_count != new.unread_count).then_some(new.unread_count),
            is_deleted: (old.is_deleted != new.is_deleted).then_some(new.is_deleted),
        };
        (!patch.is_empty()).then_some(patch)
    }

    pub fn is_empty(&self) -> bool {
        self.last_message_text.is_none()
            && self.last_message_time.is_none()
            && self.unread_count.is_none()
            && self.is_deleted.is_none()
    }

    fn apply(&self, summary: &mut ConversationSummary) {
        if let Some(text) = &self.last_message_text {
            summary.last_message_text = text.clone();
        }
        if let Some(time) = self.last_message_time {
            summary.last_message_time = time;
        }
        if let Some(count) = self.unread_count {
            summary.unread_count = count;
        }
        if let Some(deleted) = self.is_deleted {
            summary.is_deleted = deleted;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationChange {
    Added(ConversationSummary),
    Updated(ConversationPatch),
    Removed(Uuid),
}

#[derive(Debug, Default)]
pub struct SessionState {
    conversations: HashMap<Uuid, ConversationSummary>,
    seen: HashMap<Uuid, HashSet<Uuid>>,
    suggestions: HashMap<Uuid, Vec<String>>,
    active: Option<Uuid>,
}

impl SessionState {
    /// Reconcile the cached list with a fresh poll and report what changed.
    ///
    /// Unchanged conversations produce nothing; conversations missing from
    /// the poll (deleted by this user) are reported as removed.
    pub fn apply_summaries(&mut self, fresh: Vec<ConversationSummary>) -> Vec<ConversationChange> {
        let mut changes = Vec::new();
        let fresh_ids: HashSet<Uuid> = fresh.iter().map(|s| s.id).collect();

        let mut removed: Vec<Uuid> = self
            .conversations
            .keys()
            .filter(|id| !fresh_ids.contains(id))
            .copied()
            .collect();
        removed.sort();
        for id in removed {
            self.conversations.remove(&id);
            changes.push(ConversationChange::Removed(id));
        }

        for summary in fresh {
            match self.conversations.get_mut(&summary.id) {
                Some(known) => {
                    if let Some(patch) = ConversationPatch::between(known, &summary) {
                        patch.apply(known);
                        changes.push(ConversationChange::Updated(patch));
                    }
                }
                None => {
                    self.conversations.insert(summary.id, summary.clone());
                    changes.push(ConversationChange::Added(summary));
                }
            }
        }
        changes
    }

    pub fn conversation(&self, id: Uuid) -> Option<&ConversationSummary> {
        self.conversations.get(&id)
    }

    /// Conversations in the order the server lists them.
    pub fn conversations(&self) -> Vec<ConversationSummary> {
        let mut list: Vec<_> = self.conversations.values().cloned().collect();
        list.sort_by(|a, b| {
            b.last_message_time
                .cmp(&a.last_message_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        list
    }

    /// Mark existing history as already handled.
    pub fn seed_seen(&mut self, conversation_id: Uuid, messages: &[MessageResponse]) {
        self.seen
            .entry(conversation_id)
            .or_default()
            .extend(messages.iter().map(|m| m.id));
    }

    /// Return the messages not seen before, recording them as seen.
    ///
    /// Recording happens here, under the state lock and before the caller
    /// does any follow-up work, so a message is handed out at most once no
    /// matter how many polls overlap.
    pub fn record_messages(
        &mut self,
        conversation_id: Uuid,
        messages: &[MessageResponse],
    ) -> Vec<MessageResponse> {
        let seen = self.seen.entry(conversation_id).or_default();
        messages
            .iter()
            .filter(|m| seen.insert(m.id))
            .cloned()
            .collect()
    }

    pub fn has_seen(&self, conversation_id: Uuid, message_id: Uuid) -> bool {
        self.seen
            .get(&conversation_id)
            .is_some_and(|s| s.contains(&message_id))
    }

    pub fn active(&self) -> Option<Uuid> {
        self.active
    }

    pub fn is_active(&self, conversation_id: Uuid) -> bool {
        self.active == Some(conversation_id)
    }

    pub fn set_active(&mut self, conversation_id: Option<Uuid>) {
        self.active = conversation_id;
    }

    pub fn suggestions(&self, conversation_id: Uuid) -> Option<&[String]> {
        self.suggestions.get(&conversation_id).map(Vec::as_slice)
    }

    pub fn set_suggestions(&mut self, conversation_id: Uuid, suggestions: Vec<String>) {
        self.suggestions.insert(conversation_id, suggestions);
    }
}

/// At most one in-flight operation per key.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl SingleFlight {
    /// Claim `key`, or `None` if someone already holds it. The claim is
    /// released when the guard drops.
    pub fn try_acquire(&self, key: Uuid) -> Option<FlightGuard> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.insert(key).then(|| FlightGuard {
            key,
            in_flight: self.in_flight.clone(),
        })
    }

    pub fn is_in_flight(&self, key: Uuid) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key)
    }
}

#[derive(Debug)]
pub struct FlightGuard {
    key: Uuid,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
