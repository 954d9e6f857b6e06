//! SQLite promise and promise-history rows.
//!
//! # Responsibility
//! - Insert, read and list `promises` rows in insertion order.
//! - Guard status writes with a compare-and-swap on the previous status.
//! - Append and read `promise_events` history.
//!
//! # Invariants
//! - Write paths call `Promise::validate()` before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::model::account::AccountId;
use crate::model::promise::{Promise, PromiseAction, PromiseEvent, PromiseId, PromiseStatus};
use crate::repo::account_repo::{from_db_amount, parse_uuid, to_db_amount};
use crate::repo::schema::ensure_ledger_schema;
use crate::repo::store::{RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const PROMISE_SELECT_SQL: &str = "SELECT
    id,
    promiser_id,
    promisee_id,
    description,
    stake,
    status,
    created_at,
    resolved_at
FROM promises";

const EVENT_SELECT_SQL: &str = "SELECT
    promise_id,
    sequence,
    action,
    actor_id,
    from_status,
    to_status,
    at
FROM promise_events";

/// SQLite-backed promise rows over a borrowed connection.
pub struct SqlitePromiseRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePromiseRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_ledger_schema(conn)?;
        Ok(Self { conn })
    }

    pub(crate) fn within(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn insert_promise(&self, promise: &Promise) -> RepoResult<()> {
        promise.validate()?;

        self.conn.execute(
            "INSERT INTO promises (
                id,
                promiser_id,
                promisee_id,
                description,
                stake,
                status,
                created_at,
                resolved_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                promise.id.to_string(),
                promise.promiser_id.to_string(),
                promise.promisee_id.to_string(),
                promise.description.as_str(),
                to_db_amount(promise.stake)?,
                promise.status.as_str(),
                promise.created_at,
                promise.resolved_at,
            ],
        )?;
        Ok(())
    }

    /// Writes `status` and `resolved_at` only if the row is still `expected`.
    ///
    /// # Errors
    /// - `PromiseNotFound` when the row does not exist.
    /// - `StatusConflict` when the row exists with a different status.
    pub fn update_status(&self, promise: &Promise, expected: PromiseStatus) -> RepoResult<()> {
        promise.validate()?;

        let changed = self.conn.execute(
            "UPDATE promises
             SET status = ?2,
                 resolved_at = ?3
             WHERE id = ?1
               AND status = ?4;",
            params![
                promise.id.to_string(),
                promise.status.as_str(),
                promise.resolved_at,
                expected.as_str(),
            ],
        )?;

        if changed == 0 {
            return match self.get_promise(promise.id)? {
                Some(_) => Err(RepoError::StatusConflict {
                    promise_id: promise.id,
                    expected,
                }),
                None => Err(RepoError::PromiseNotFound(promise.id)),
            };
        }
        Ok(())
    }

    pub fn get_promise(&self, id: PromiseId) -> RepoResult<Option<Promise>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PROMISE_SELECT_SQL} WHERE id = ?1;"))?;
        let row = stmt
            .query_row([id.to_string()], |row| Ok(parse_promise_row(row)))
            .optional()?;
        row.transpose()
    }

    pub fn list_for_account(&self, account_id: AccountId) -> RepoResult<Vec<Promise>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PROMISE_SELECT_SQL}
             WHERE promiser_id = ?1 OR promisee_id = ?1
             ORDER BY seq ASC;"
        ))?;
        let mut rows = stmt.query([account_id.to_string()])?;
        let mut promises = Vec::new();
        while let Some(row) = rows.next()? {
            promises.push(parse_promise_row(row)?);
        }
        Ok(promises)
    }

    pub fn list_all(&self) -> RepoResult<Vec<Promise>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PROMISE_SELECT_SQL} ORDER BY seq ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut promises = Vec::new();
        while let Some(row) = rows.next()? {
            promises.push(parse_promise_row(row)?);
        }
        Ok(promises)
    }

    pub fn append_event(&self, event: &PromiseEvent) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO promise_events (
                promise_id,
                sequence,
                action,
                actor_id,
                from_status,
                to_status,
                at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                event.promise_id.to_string(),
                event.sequence,
                event.action.as_str(),
                event.actor_id.to_string(),
                event.from_status.map(PromiseStatus::as_str),
                event.to_status.as_str(),
                event.at,
            ],
        )?;
        Ok(())
    }

    /// Sequence number the next event of `id` must carry.
    pub fn next_event_sequence(&self, id: PromiseId) -> RepoResult<u32> {
        let last: u32 = self.conn.query_row(
            "SELECT COALESCE(MAX(sequence), 0) FROM promise_events WHERE promise_id = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )?;
        Ok(last + 1)
    }

    pub fn list_events(&self, id: PromiseId) -> RepoResult<Vec<PromiseEvent>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EVENT_SELECT_SQL} WHERE promise_id = ?1 ORDER BY sequence ASC;"
        ))?;
        let mut rows = stmt.query([id.to_string()])?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(parse_event_row(row)?);
        }
        Ok(events)
    }
}

fn parse_promise_row(row: &Row<'_>) -> RepoResult<Promise> {
    let id_text: String = row.get("id")?;
    let promiser_text: String = row.get("promiser_id")?;
    let promisee_text: String = row.get("promisee_id")?;

    let promise = Promise {
        id: parse_uuid(&id_text, "promises.id")?,
        promiser_id: parse_uuid(&promiser_text, "promises.promiser_id")?,
        promisee_id: parse_uuid(&promisee_text, "promises.promisee_id")?,
        description: row.get("description")?,
        stake: from_db_amount(row.get("stake")?, "promises.stake")?,
        status: parse_status(&row.get::<_, String>("status")?, "promises.status")?,
        created_at: row.get("created_at")?,
        resolved_at: row.get("resolved_at")?,
    };
    promise.validate()?;
    Ok(promise)
}

fn parse_event_row(row: &Row<'_>) -> RepoResult<PromiseEvent> {
    let promise_text: String = row.get("promise_id")?;
    let actor_text: String = row.get("actor_id")?;
    let action_text: String = row.get("action")?;
    let action = PromiseAction::parse(&action_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid action `{action_text}` in promise_events.action"
        ))
    })?;
    let from_status = match row.get::<_, Option<String>>("from_status")? {
        Some(value) => Some(parse_status(&value, "promise_events.from_status")?),
        None => None,
    };

    Ok(PromiseEvent {
        promise_id: parse_uuid(&promise_text, "promise_events.promise_id")?,
        sequence: row.get("sequence")?,
        action,
        actor_id: parse_uuid(&actor_text, "promise_events.actor_id")?,
        from_status,
        to_status: parse_status(
            &row.get::<_, String>("to_status")?,
            "promise_events.to_status",
        )?,
        at: row.get("at")?,
    })
}

fn parse_status(value: &str, column: &'static str) -> RepoResult<PromiseStatus> {
    PromiseStatus::parse(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid status `{value}` in {column}")))
}
