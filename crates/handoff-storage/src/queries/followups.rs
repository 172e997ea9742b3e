// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Follow-up inbox operations.

use handoff_core::{Followup, HandoffError, NewFollowup};
use rusqlite::params;

use crate::database::{map_tr_err, Database};

/// Persist a follow-up and return its row id.
pub async fn create(db: &Database, followup: &NewFollowup) -> Result<i64, HandoffError> {
    let followup = followup.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO followups (user_id, channel, contact, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    followup.user_id,
                    followup.channel,
                    followup.contact,
                    followup.message,
                    followup.created_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// List follow-ups newest first.
pub async fn list(db: &Database, unresolved_only: bool) -> Result<Vec<Followup>, HandoffError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, channel, contact, message, created_at, resolved, viewed
                 FROM followups WHERE (?1 = 0 OR resolved = 0) ORDER BY id DESC",
            )?;
            let rows = stmt.query_map(params![unresolved_only], |row| {
                Ok(Followup {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    channel: row.get(2)?,
                    contact: row.get(3)?,
                    message: row.get(4)?,
                    created_at: row.get(5)?,
                    resolved: row.get(6)?,
                    viewed: row.get(7)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a follow-up resolved. Returns `false` if no such id exists.
pub async fn resolve(db: &Database, id: i64) -> Result<bool, HandoffError> {
    db.connection()
        .call(move |conn| {
            let changed = conn.execute("UPDATE followups SET resolved = 1 WHERE id = ?1", params![id])?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a follow-up viewed. Returns `false` if no such id exists.
pub async fn mark_viewed(db: &Database, id: i64) -> Result<bool, HandoffError> {
    db.connection()
        .call(move |conn| {
            let changed = conn.execute("UPDATE followups SET viewed = 1 WHERE id = ?1", params![id])?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Count follow-ups nobody has opened.
pub async fn count_unviewed(db: &Database) -> Result<u64, HandoffError> {
    db.connection()
        .call(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM followups WHERE viewed = 0", [], |row| {
                    row.get(0)
                })?;
            Ok(count.max(0) as u64)
        })
        .await
        .map_err(map_tr_err)
}
