//! Client side of the chat service: a polling sync session that turns
//! repeated REST reads into a stream of [`SyncEvent`]s.

pub mod api;
pub mod capability;
pub mod config;
pub mod error;
pub mod session;
pub mod state;

pub use api::{ChatApi, HttpChatApi};
pub use capability::{AdminOnly, SessionUser, SuggestionCapability};
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use session::{ChatSession, SyncEvent};
