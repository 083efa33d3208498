use anyhow::anyhow;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use tracing::warn;

use parley_db::models::MessageRow;
use parley_db::Database;
use parley_types::api::{Claims, MessageResponse, SendMessageRequest};
use parley_types::models::{MessageDetail, UserProfile};

use crate::auth::AppState;
use crate::error::ApiError;

// -- Handlers --

pub async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let worker = state.clone();
    let message = tokio::task::spawn_blocking(move || fetch_message(&worker.db, &claims.sub, id))
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {e}"))??;

    Ok(Json(MessageResponse { message }))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let worker = state.clone();
    let message = tokio::task::spawn_blocking(move || post_message(&worker.db, &claims.sub, &req))
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {e}"))??;

    Ok((StatusCode::CREATED, Json(MessageResponse { message })))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let worker = state.clone();
    let message =
        tokio::task::spawn_blocking(move || acknowledge_read(&worker.db, &claims.sub, id))
            .await
            .map_err(|e| anyhow!("spawn_blocking join error: {e}"))??;

    Ok(Json(MessageResponse { message }))
}

// -- Core --

/// Fetch a message on behalf of `principal`.
///
/// Only the sender and the recipient may view a message. Anyone else gets
/// an authorization failure, not a not-found: existence is not hidden from
/// authenticated callers, access is.
pub fn fetch_message(db: &Database, principal: &str, id: i64) -> Result<MessageDetail, ApiError> {
    let row = lookup(db, id)?;

    if row.from_username != principal && row.to_username != principal {
        return Err(ApiError::Authorization(format!(
            "you are not allowed to view message {id}"
        )));
    }

    Ok(detail_from_row(row))
}

/// Create a message from `principal` to `req.to_username`.
///
/// The sender is always the authenticated principal; there is no way to
/// send as another user.
pub fn post_message(
    db: &Database,
    principal: &str,
    req: &SendMessageRequest,
) -> Result<MessageDetail, ApiError> {
    if req.to_username.is_empty() || req.body.is_empty() {
        return Err(ApiError::Validation(
            "to_username and body are required".into(),
        ));
    }

    if db.get_user_by_username(&req.to_username)?.is_none() {
        return Err(ApiError::NotFound(format!(
            "no user with username {}",
            req.to_username
        )));
    }

    let id = db.insert_message(principal, &req.to_username, &req.body, &Utc::now().to_rfc3339())?;
    let row = db
        .get_message(id)?
        .ok_or_else(|| anyhow!("message {id} vanished after insert"))?;

    Ok(detail_from_row(row))
}

/// Record that the recipient has read the message.
///
/// Only the recipient may acknowledge. The transition is one-way: a second
/// acknowledgement is a no-op that returns the message unchanged, and
/// `read_at` never moves once set.
pub fn acknowledge_read(db: &Database, principal: &str, id: i64) -> Result<MessageDetail, ApiError> {
    let row = lookup(db, id)?;

    if row.to_username != principal {
        return Err(ApiError::Authorization(format!(
            "you are not allowed to mark message {id} as read"
        )));
    }

    if row.read_at.is_none() {
        db.mark_message_read(id, &Utc::now().to_rfc3339())?;
        let row = lookup(db, id)?;
        return Ok(detail_from_row(row));
    }

    Ok(detail_from_row(row))
}

fn lookup(db: &Database, id: i64) -> Result<MessageRow, ApiError> {
    db.get_message(id)?
        .ok_or_else(|| ApiError::NotFound(format!("no message with id {id}")))
}

fn detail_from_row(row: MessageRow) -> MessageDetail {
    MessageDetail {
        id: row.id,
        body: row.body,
        sent_at: parse_timestamp(&row.sent_at, row.id),
        read_at: row.read_at.as_deref().map(|t| parse_timestamp(t, row.id)),
        from_user: UserProfile {
            username: row.from_username,
            first_name: row.from_first_name,
            last_name: row.from_last_name,
            phone: row.from_phone,
        },
        to_user: UserProfile {
            username: row.to_username,
            first_name: row.to_first_name,
            last_name: row.to_last_name,
            phone: row.to_phone,
        },
    }
}

fn parse_timestamp(raw: &str, message_id: i64) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|e| {
        warn!("corrupt timestamp '{}' on message {}: {}", raw, message_id, e);
        DateTime::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{login_user, register_user};
    use parley_types::api::{LoginRequest, RegisterRequest};

    fn send_req(to: &str, body: &str) -> SendMessageRequest {
        SendMessageRequest {
            to_username: to.into(),
            body: body.into(),
        }
    }

    /// Users inserted directly with placeholder hashes: the message core
    /// never touches credentials.
    fn db_with_users(usernames: &[&str]) -> Database {
        let db = Database::open_in_memory().unwrap();
        for (i, name) in usernames.iter().enumerate() {
            db.create_user(
                name,
                "$argon2-placeholder",
                name,
                "Tester",
                &format!("555-{i:04}"),
                "2026-01-01T00:00:00Z",
            )
            .unwrap();
        }
        db
    }

    #[test]
    fn only_participants_may_view() {
        let db = db_with_users(&["a", "b", "c"]);
        let msg = post_message(&db, "a", &send_req("b", "hello")).unwrap();

        assert!(fetch_message(&db, "a", msg.id).is_ok());
        assert!(fetch_message(&db, "b", msg.id).is_ok());
        assert!(matches!(
            fetch_message(&db, "c", msg.id).unwrap_err(),
            ApiError::Authorization(_)
        ));
    }

    #[test]
    fn fetched_message_carries_both_profiles() {
        let db = db_with_users(&["a", "b"]);
        let msg = post_message(&db, "a", &send_req("b", "hello")).unwrap();

        let fetched = fetch_message(&db, "b", msg.id).unwrap();
        assert_eq!(fetched.body, "hello");
        assert_eq!(fetched.from_user.username, "a");
        assert_eq!(fetched.to_user.username, "b");
        assert_eq!(fetched.to_user.phone, "555-0001");
        assert!(fetched.read_at.is_none());
    }

    #[test]
    fn missing_message_is_not_found_for_everyone() {
        let db = db_with_users(&["a"]);
        assert!(matches!(
            fetch_message(&db, "a", 42).unwrap_err(),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            acknowledge_read(&db, "a", 42).unwrap_err(),
            ApiError::NotFound(_)
        ));
    }

    #[test]
    fn empty_recipient_or_body_fails_validation() {
        let db = db_with_users(&["a", "b"]);
        assert!(matches!(
            post_message(&db, "a", &send_req("", "hello")).unwrap_err(),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            post_message(&db, "a", &send_req("b", "")).unwrap_err(),
            ApiError::Validation(_)
        ));
    }

    #[test]
    fn unknown_recipient_is_not_found() {
        let db = db_with_users(&["a"]);
        assert!(matches!(
            post_message(&db, "a", &send_req("ghost", "hello")).unwrap_err(),
            ApiError::NotFound(_)
        ));
    }

    #[test]
    fn only_the_recipient_may_mark_read() {
        let db = db_with_users(&["a", "b"]);
        let msg = post_message(&db, "a", &send_req("b", "hello")).unwrap();

        // The sender has no mark-read right
        assert!(matches!(
            acknowledge_read(&db, "a", msg.id).unwrap_err(),
            ApiError::Authorization(_)
        ));

        let read = acknowledge_read(&db, "b", msg.id).unwrap();
        assert!(read.read_at.is_some());
    }

    #[test]
    fn second_acknowledgement_is_a_noop() {
        let db = db_with_users(&["a", "b"]);
        let msg = post_message(&db, "a", &send_req("b", "hello")).unwrap();

        let first = acknowledge_read(&db, "b", msg.id).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = acknowledge_read(&db, "b", msg.id).unwrap();

        assert_eq!(first.read_at, second.read_at);
    }

    #[test]
    fn self_message_recipient_may_mark_read() {
        let db = db_with_users(&["a"]);
        let msg = post_message(&db, "a", &send_req("a", "note to self")).unwrap();
        assert!(acknowledge_read(&db, "a", msg.id).unwrap().read_at.is_some());
    }

    #[test]
    fn end_to_end_register_send_read() {
        let db = Database::open_in_memory().unwrap();
        let secret = "test-secret";

        for (name, first) in [("alice", "Alice"), ("bob", "Bob")] {
            register_user(
                &db,
                &RegisterRequest {
                    username: name.into(),
                    password: "correctpw".into(),
                    first_name: first.into(),
                    last_name: "Tester".into(),
                    phone: "555-0000".into(),
                },
            )
            .unwrap();
        }

        let token = login_user(
            &db,
            secret,
            &LoginRequest {
                username: "alice".into(),
                password: "correctpw".into(),
            },
        )
        .unwrap();
        let alice = crate::token::verify(secret, &token).unwrap().sub;

        let sent = post_message(&db, &alice, &send_req("bob", "hi")).unwrap();
        assert_eq!(sent.from_user.username, "alice");

        let seen_by_bob = fetch_message(&db, "bob", sent.id).unwrap();
        assert!(seen_by_bob.read_at.is_none());

        acknowledge_read(&db, "bob", sent.id).unwrap();

        let seen_by_alice = fetch_message(&db, "alice", sent.id).unwrap();
        assert!(seen_by_alice.read_at.is_some());
    }
}
