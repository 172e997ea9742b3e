// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message log operations.

use handoff_core::{ConversationKey, HandoffError, Message};
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::queries::parse_column;

/// Insert a message on an existing connection or transaction.
pub(crate) fn insert(conn: &rusqlite::Connection, message: &Message) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO messages (user_id, channel, sender, text, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            message.user_id,
            message.channel,
            message.sender.to_string(),
            message.text,
            message.created_at,
        ],
    )?;
    Ok(())
}

/// Append a message to the log.
pub async fn append(db: &Database, message: &Message) -> Result<(), HandoffError> {
    let message = message.clone();
    db.connection()
        .call(move |conn| insert(conn, &message))
        .await
        .map_err(map_tr_err)
}

/// All messages for a conversation in insertion order.
pub async fn list_for_conversation(
    db: &Database,
    key: &ConversationKey,
) -> Result<Vec<Message>, HandoffError> {
    let key = key.clone();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, channel, sender, text, created_at
                 FROM messages WHERE user_id = ?1 AND channel = ?2 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![key.user_id, key.channel], |row| {
                Ok(Message {
                    user_id: row.get(0)?,
                    channel: row.get(1)?,
                    sender: parse_column(row, 2)?,
                    text: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
        .map_err(map_tr_err)
}
