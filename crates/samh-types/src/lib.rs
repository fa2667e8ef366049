//! Types shared between the chat server and its polling clients.
//!
//! `models` holds the domain view of users, conversations and messages;
//! `api` holds the request/response bodies exchanged over HTTP.

pub mod api;
pub mod models;
