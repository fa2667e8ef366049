//! End-to-end behaviour of the conversation manager and message store
//! against a real SQLite database.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use samh_db::{ChatError, Database};
use uuid::Uuid;

fn unread_for(db: &Database, user: &str, conversation: Uuid) -> u32 {
    db.list_conversations(user)
        .unwrap()
        .into_iter()
        .find(|s| s.id == conversation)
        .map(|s| s.unread_count)
        .expect("conversation should be listed")
}

#[test]
fn create_is_idempotent_for_either_order() {
    let db = Database::open_in_memory().unwrap();
    let first = db.create_or_get_conversation("alice", "bob").unwrap();
    let second = db.create_or_get_conversation("bob", "alice").unwrap();
    let third = db.create_or_get_conversation("alice", "bob").unwrap();
    assert_eq!(first, second);
    assert_eq!(first, third);
    assert_eq!(db.list_conversations("alice").unwrap().len(), 1);
}

#[test]
fn messages_come_back_in_append_order() {
    let db = Database::open_in_memory().unwrap();
    let id = db.create_or_get_conversation("alice", "bob").unwrap();

    let mut sent = Vec::new();
    for i in 0..20 {
        let sender = if i % 3 == 0 { "bob" } else { "alice" };
        sent.push(db.append_message(id, sender, &format!("msg {}", i)).unwrap().id);
    }

    let listed = db.list_messages(id).unwrap();
    let ids: Vec<_> = listed.iter().map(|m| m.id).collect();
    assert_eq!(ids, sent);
    assert!(listed.windows(2).all(|w| w[0].created_at <= w[1].created_at));
}

#[test]
fn unread_accounting_is_per_viewer() {
    let db = Database::open_in_memory().unwrap();
    let c = db.create_or_get_conversation("alice", "bob").unwrap();

    db.append_message(c, "alice", "hi").unwrap();
    assert!(unread_for(&db, "bob", c) >= 1);
    assert_eq!(unread_for(&db, "alice", c), 0);

    assert_eq!(db.mark_read(c, "bob").unwrap(), 1);
    assert_eq!(unread_for(&db, "bob", c), 0);
    assert_eq!(unread_for(&db, "alice", c), 0);

    // Marking again changes nothing.
    assert_eq!(db.mark_read(c, "bob").unwrap(), 0);
}

#[test]
fn soft_delete_is_independent_per_participant() {
    let db = Database::open_in_memory().unwrap();
    let c = db.create_or_get_conversation("alice", "bob").unwrap();
    db.append_message(c, "bob", "still here?").unwrap();

    let bob_before = db.list_conversations("bob").unwrap();
    db.set_deleted(c, "alice", true).unwrap();

    assert!(db.list_conversations("alice").unwrap().is_empty());
    assert_eq!(db.list_conversations("bob").unwrap(), bob_before);

    db.set_deleted(c, "alice", false).unwrap();
    let restored = db.list_conversations("alice").unwrap();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].id, c);
}

#[test]
fn summary_matches_latest_message() {
    let db = Database::open_in_memory().unwrap();
    let c = db.create_or_get_conversation("alice", "bob").unwrap();

    for (sender, text) in [("alice", "one"), ("bob", "two"), ("alice", "three")] {
        let message = db.append_message(c, sender, text).unwrap();
        for viewer in ["alice", "bob"] {
            let summary = db.list_conversations(viewer).unwrap().remove(0);
            assert_eq!(summary.last_message_text, message.text);
            assert_eq!(summary.last_message_time, message.created_at);
        }
    }
}

#[test]
fn alice_and_bob_scenario() {
    let db = Database::open_in_memory().unwrap();
    let c = db.create_or_get_conversation("alice", "bob").unwrap();

    db.append_message(c, "alice", "Hi Bob! 👋").unwrap();
    let bob_view = db.list_conversations("bob").unwrap().remove(0);
    assert_eq!(bob_view.unread_count, 1);
    assert_eq!(bob_view.last_message_text, "Hi Bob! 👋");
    assert_eq!(bob_view.contact_name, "alice");

    db.mark_read(c, "bob").unwrap();
    assert_eq!(unread_for(&db, "bob", c), 0);

    db.append_message(c, "bob", "Hey!").unwrap();
    assert_eq!(unread_for(&db, "alice", c), 1);

    // Alice hides the thread, Bob still sees everything.
    db.set_deleted(c, "alice", true).unwrap();
    assert!(db.list_conversations("alice").unwrap().is_empty());
    assert_eq!(db.list_conversations("bob").unwrap().len(), 1);
    assert_eq!(db.list_messages(c).unwrap().len(), 2);

    db.set_deleted(c, "alice", false).unwrap();
    assert_eq!(db.list_conversations("alice").unwrap().len(), 1);
    let history: Vec<_> = db
        .list_messages(c)
        .unwrap()
        .into_iter()
        .map(|m| m.text)
        .collect();
    assert_eq!(history, vec!["Hi Bob! 👋", "Hey!"]);
}

#[test]
fn conversation_list_orders_by_activity() {
    let db = Database::open_in_memory().unwrap();
    let with_bob = db.create_or_get_conversation("alice", "bob").unwrap();
    let with_carol = db.create_or_get_conversation("alice", "carol").unwrap();

    db.append_message(with_carol, "carol", "first").unwrap();
    thread::sleep(Duration::from_millis(5));
    db.append_message(with_bob, "bob", "second").unwrap();

    let order: Vec<_> = db
        .list_conversations("alice")
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(order, vec![with_bob, with_carol]);
}

#[test]
fn file_database_readers_see_committed_writes() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open(&dir.path().join("chat.db")).unwrap());
    let c = db.create_or_get_conversation("alice", "bob").unwrap();

    let writers: Vec<_> = ["alice", "bob"]
        .into_iter()
        .map(|sender| {
            let db = db.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    db.append_message(c, sender, &format!("{} {}", sender, i))
                        .unwrap();
                }
            })
        })
        .collect();

    // Poll concurrently: every observed summary must pair text and time of one message.
    for _ in 0..50 {
        for summary in db.list_conversations("alice").unwrap() {
            if summary.last_message_text.is_empty() {
                continue;
            }
            let messages = db.list_messages(c).unwrap();
            assert!(messages.iter().any(|m| m.text == summary.last_message_text
                && m.created_at == summary.last_message_time));
        }
    }

    for w in writers {
        w.join().unwrap();
    }
    assert_eq!(db.list_messages(c).unwrap().len(), 50);
    assert_eq!(unread_for(&db, "alice", c), 25);
}

#[test]
fn reopening_keeps_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chat.db");
    let c = {
        let db = Database::open(&path).unwrap();
        let c = db.create_or_get_conversation("alice", "bob").unwrap();
        db.append_message(c, "alice", "persisted").unwrap();
        c
    };

    let db = Database::open(&path).unwrap();
    assert_eq!(db.create_or_get_conversation("bob", "alice").unwrap(), c);
    assert_eq!(db.list_messages(c).unwrap()[0].text, "persisted");
    assert!(matches!(
        db.append_message(c, "mallory", "hi"),
        Err(ChatError::NotParticipant { .. })
    ));
}
