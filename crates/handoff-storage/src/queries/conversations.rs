// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation reads and guarded writes.
//!
//! Every write runs inside an `IMMEDIATE` transaction: the row is re-read,
//! the guards are checked against it, and the new values are written before
//! the write lock is released.

use chrono::{DateTime, Utc};
use handoff_core::{
    ClosedConversation, Conversation, ConversationKey, ConversationUpdate, HandoffError,
    StageTransition,
};
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use crate::database::{map_tr_err, Database};
use crate::queries::parse_column;

const SELECT_COLUMNS: &str = "SELECT user_id, channel, open, assigned_staff, escalation_stage, \
     created_at, updated_at, escalated_at, closed_at, handled_by FROM conversations";

fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        user_id: row.get(0)?,
        channel: row.get(1)?,
        open: row.get(2)?,
        assigned_staff: row.get(3)?,
        escalation_stage: parse_column(row, 4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        escalated_at: row.get(7)?,
        closed_at: row.get(8)?,
        handled_by: row.get(9)?,
    })
}

fn select_one(
    conn: &rusqlite::Connection,
    user_id: &str,
    channel: &str,
) -> rusqlite::Result<Option<Conversation>> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE user_id = ?1 AND channel = ?2"),
        params![user_id, channel],
        from_row,
    )
    .optional()
}

fn write_row(conn: &rusqlite::Connection, conversation: &Conversation) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE conversations
         SET open = ?3, assigned_staff = ?4, escalation_stage = ?5,
             updated_at = ?6, escalated_at = ?7, closed_at = ?8, handled_by = ?9
         WHERE user_id = ?1 AND channel = ?2",
        params![
            conversation.user_id,
            conversation.channel,
            conversation.open,
            conversation.assigned_staff,
            conversation.escalation_stage.to_string(),
            conversation.updated_at,
            conversation.escalated_at,
            conversation.closed_at,
            conversation.handled_by,
        ],
    )?;
    Ok(())
}

/// Insert a fresh open conversation unless one exists; return the stored row.
pub async fn create_or_get(
    db: &Database,
    key: &ConversationKey,
    at: DateTime<Utc>,
) -> Result<(Conversation, bool), HandoffError> {
    let fresh = Conversation::new(key, at);
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO conversations
                     (user_id, channel, open, assigned_staff, escalation_stage, created_at, updated_at, escalated_at)
                 VALUES (?1, ?2, 1, NULL, ?3, ?4, ?4, NULL)",
                params![
                    fresh.user_id,
                    fresh.channel,
                    fresh.escalation_stage.to_string(),
                    fresh.created_at,
                ],
            )?;
            let stored = select_one(conn, &fresh.user_id, &fresh.channel)?
                .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            Ok((stored, inserted == 1))
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a conversation by key.
pub async fn get(db: &Database, key: &ConversationKey) -> Result<Option<Conversation>, HandoffError> {
    let key = key.clone();
    db.connection()
        .call(move |conn| select_one(conn, &key.user_id, &key.channel))
        .await
        .map_err(map_tr_err)
}

/// Apply a guarded update. Returns `false` when the row is missing or a guard fails.
pub async fn update(
    db: &Database,
    key: &ConversationKey,
    update: &ConversationUpdate,
) -> Result<bool, HandoffError> {
    let key = key.clone();
    let update = update.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(mut conversation) = select_one(&tx, &key.user_id, &key.channel)? else {
                return Ok(false);
            };
            if !conversation.apply(&update) {
                return Ok(false);
            }
            write_row(&tx, &conversation)?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)
}

/// Move the escalation stage forward and log the notice, atomically.
///
/// Fails the guard when the conversation is closed, assigned, has left
/// `transition.from`, or has been touched since the scheduler read it.
/// `updated_at` is left alone: a system notice is not activity.
pub async fn advance_stage(
    db: &Database,
    key: &ConversationKey,
    transition: &StageTransition,
) -> Result<bool, HandoffError> {
    let key = key.clone();
    let transition = transition.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let changed = tx.execute(
                "UPDATE conversations
                 SET escalation_stage = ?3, escalated_at = ?4
                 WHERE user_id = ?1 AND channel = ?2
                   AND open = 1 AND assigned_staff IS NULL AND escalation_stage = ?5
                   AND updated_at = ?6",
                params![
                    key.user_id,
                    key.channel,
                    transition.to.to_string(),
                    transition.at,
                    transition.from.to_string(),
                    transition.observed_updated_at,
                ],
            )?;
            if changed != 1 {
                return Ok(false);
            }
            crate::queries::messages::insert(&tx, &transition.notice)?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)
}

/// All open conversations, oldest activity first.
pub async fn list_open(db: &Database) -> Result<Vec<Conversation>, HandoffError> {
    db.connection()
        .call(|conn| {
            let mut stmt =
                conn.prepare(&format!("{SELECT_COLUMNS} WHERE open = 1 ORDER BY updated_at ASC"))?;
            let rows = stmt.query_map([], from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Closed conversations with message counts, most recently closed first.
pub async fn list_closed(db: &Database) -> Result<Vec<ClosedConversation>, HandoffError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.user_id, c.channel, c.handled_by, c.created_at, c.updated_at, c.closed_at,
                        (SELECT COUNT(*) FROM messages m
                          WHERE m.user_id = c.user_id AND m.channel = c.channel)
                 FROM conversations c
                 WHERE c.open = 0
                 ORDER BY COALESCE(c.closed_at, c.updated_at) DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(ClosedConversation {
                    user_id: row.get(0)?,
                    channel: row.get(1)?,
                    handled_by: row.get(2)?,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                    closed_at: row.get(5)?,
                    message_count: row.get::<_, i64>(6)?.max(0) as u64,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
        .map_err(map_tr_err)
}
