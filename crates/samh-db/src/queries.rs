use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;
use uuid::Uuid;

use samh_types::models::{AccountKind, User};

use crate::models::{USER_COLUMNS, user_from_row};
use crate::{ChatError, Database, Result};

/// A user counts as online when their last login is at most this old.
const ONLINE_WINDOW_MINUTES: i64 = 5;
const SEARCH_LIMIT: u32 = 10;
const MIN_SEARCH_LEN: usize = 2;

impl Database {
    // -- Users --

    /// Record a login, creating the account on first sight.
    ///
    /// The account kind given on first login sticks; later logins only bump
    /// `last_login` and `login_count`.
    pub fn record_login(&self, username: &str, account_type: &str) -> Result<User> {
        if username.trim().is_empty() {
            return Err(ChatError::InvalidRequest("username must not be empty".into()));
        }
        let kind: AccountKind = account_type.parse()?;
        let now = Utc::now().timestamp_millis();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE user_accounts SET last_login = ?1, login_count = login_count + 1
                 WHERE username = ?2",
                params![now, username],
            )?;

            if updated == 0 {
                tx.execute(
                    "INSERT INTO user_accounts (id, username, account_type, first_login, last_login, login_count)
                     VALUES (?1, ?2, ?3, ?4, ?4, 1)",
                    params![Uuid::new_v4().to_string(), username, kind.as_str(), now],
                )?;
                info!("New user created: {} ({})", username, kind);
            }

            let user = query_user(&tx, username)?
                .ok_or_else(|| ChatError::NotFound(format!("user {}", username)))?;
            tx.commit()?;
            Ok(user)
        })
    }

    pub fn get_user(&self, username: &str) -> Result<User> {
        self.with_conn(|conn| query_user(conn, username))?
            .ok_or_else(|| ChatError::NotFound(format!("user {}", username)))
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM user_accounts ORDER BY last_login DESC, username ASC"
            ))?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Substring search over usernames, most recently active first.
    pub fn search_users(&self, query: &str, exclude: Option<&str>) -> Result<Vec<User>> {
        let query = query.trim();
        if query.chars().count() < MIN_SEARCH_LEN {
            return Err(ChatError::InvalidRequest(format!(
                "search query must be at least {} characters long",
                MIN_SEARCH_LEN
            )));
        }
        let pattern = format!("%{}%", escape_like(query));

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM user_accounts
                 WHERE username LIKE ?1 ESCAPE '\\'
                   AND (?2 IS NULL OR username != ?2)
                 ORDER BY last_login DESC, username ASC
                 LIMIT ?3"
            ))?;
            let rows = stmt
                .query_map(params![pattern, exclude, SEARCH_LIMIT], user_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

pub fn is_online(user: &User, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(user.last_login) <= Duration::minutes(ONLINE_WINDOW_MINUTES)
}

fn query_user(conn: &Connection, username: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM user_accounts WHERE username = ?1"),
            [username],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
