use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::AppResult;
use crate::marketplace::domain::UserId;
use crate::state::DbPool;

/// Create a new session for a user. Returns the session token.
pub fn create_session(pool: &DbPool, user_id: &UserId, hours: u64) -> AppResult<String> {
    let conn = pool.get()?;
    Ok(insert_session(&conn, user_id, hours)?)
}

/// Insert a session on an existing connection, so callers can include it in
/// their own transaction.
pub fn insert_session(conn: &Connection, user_id: &UserId, hours: u64) -> rusqlite::Result<String> {
    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, expires_at) VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![id, user_id.as_str(), token, format!("+{} hours", hours)],
    )?;

    Ok(token)
}

/// Resolve a live session token to its user.
pub fn lookup_session(pool: &DbPool, token: &str) -> AppResult<Option<UserId>> {
    let conn = pool.get()?;

    let user_id = conn
        .query_row(
            "SELECT user_id FROM sessions WHERE token = ?1 AND expires_at > datetime('now')",
            params![token],
            |row| row.get::<_, String>(0),
        )
        .optional()?;

    Ok(user_id.map(UserId))
}

/// Delete a session by token.
pub fn delete_session(pool: &DbPool, token: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
