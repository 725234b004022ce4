use crate::error::StoreError;
use crate::types::{AuthorizedSender, CommandAttempt, CommandStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use sms_channels::SimSlot;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Sqlite-backed store. The connection sits behind a mutex; callers run store
/// operations off any delivery-sensitive thread since they block.
pub struct SmsStore {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS authorized_senders (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    phone         TEXT NOT NULL UNIQUE,
    display_name  TEXT NOT NULL DEFAULT '',
    is_primary    INTEGER NOT NULL DEFAULT 0,
    is_enabled    INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL,
    last_used_at  TEXT,
    command_count INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS command_attempts (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_phone TEXT NOT NULL,
    raw_text     TEXT NOT NULL,
    sim          TEXT,
    target       TEXT,
    message      TEXT,
    status       TEXT NOT NULL,
    result       TEXT,
    received_at  TEXT NOT NULL,
    executed_at  TEXT,
    resulted_at  TEXT
);

CREATE INDEX IF NOT EXISTS idx_attempts_sender_received
    ON command_attempts (sender_phone, received_at);
";

impl SmsStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // --- authorized senders ---

    pub fn add_sender(
        &self,
        phone: &str,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthorizedSender, StoreError> {
        let conn = self.conn();
        let result = conn.execute(
            "INSERT INTO authorized_senders (phone, display_name, created_at) VALUES (?1, ?2, ?3)",
            params![phone, display_name, ts(now)],
        );
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::DuplicatePhone(phone.to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        let id = conn.last_insert_rowid();
        drop(conn);
        self.sender_by_id(id)?.ok_or(StoreError::SenderNotFound)
    }

    pub fn find_sender_by_phone(&self, phone: &str) -> Result<Option<AuthorizedSender>, StoreError> {
        self.conn()
            .query_row(
                "SELECT id, phone, display_name, is_primary, is_enabled, created_at, last_used_at, command_count
                 FROM authorized_senders WHERE phone = ?1",
                params![phone],
                sender_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn sender_by_id(&self, id: i64) -> Result<Option<AuthorizedSender>, StoreError> {
        self.conn()
            .query_row(
                "SELECT id, phone, display_name, is_primary, is_enabled, created_at, last_used_at, command_count
                 FROM authorized_senders WHERE id = ?1",
                params![id],
                sender_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_senders(&self) -> Result<Vec<AuthorizedSender>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, phone, display_name, is_primary, is_enabled, created_at, last_used_at, command_count
             FROM authorized_senders ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([], sender_from_row)?;
        let mut senders = Vec::new();
        for row in rows {
            senders.push(row?);
        }
        Ok(senders)
    }

    pub fn remove_sender(&self, phone: &str) -> Result<bool, StoreError> {
        let changed = self.conn().execute(
            "DELETE FROM authorized_senders WHERE phone = ?1",
            params![phone],
        )?;
        Ok(changed > 0)
    }

    /// Atomically make `id` the only primary sender. One statement flips
    /// every row, so no interleaving can leave zero or two primaries.
    pub fn set_primary(&self, id: i64) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM authorized_senders WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::SenderNotFound);
        }
        tx.execute(
            "UPDATE authorized_senders SET is_primary = (id = ?1)",
            params![id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn set_enabled(&self, phone: &str, enabled: bool) -> Result<bool, StoreError> {
        let changed = self.conn().execute(
            "UPDATE authorized_senders SET is_enabled = ?2 WHERE phone = ?1",
            params![phone, enabled],
        )?;
        Ok(changed > 0)
    }

    /// Bump the usage counter and last-used stamp after a successful
    /// execution.
    pub fn increment_usage(&self, phone: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let changed = self.conn().execute(
            "UPDATE authorized_senders
             SET command_count = command_count + 1, last_used_at = ?2
             WHERE phone = ?1",
            params![phone, ts(now)],
        )?;
        if changed == 0 {
            return Err(StoreError::SenderNotFound);
        }
        Ok(())
    }

    // --- command attempts ---

    /// Insert the attempt and fill in its row id.
    pub fn insert_attempt(&self, attempt: &mut CommandAttempt) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO command_attempts
                 (sender_phone, raw_text, sim, target, message, status, result,
                  received_at, executed_at, resulted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                attempt.sender_phone,
                attempt.raw_text,
                attempt.sim.map(SimSlot::as_str),
                attempt.target,
                attempt.message,
                attempt.status.as_str(),
                attempt.result,
                ts(attempt.received_at),
                attempt.executed_at.map(ts),
                attempt.resulted_at.map(ts),
            ],
        )?;
        attempt.id = conn.last_insert_rowid();
        Ok(())
    }

    /// Write back every mutable column of an existing attempt.
    pub fn update_attempt(&self, attempt: &CommandAttempt) -> Result<(), StoreError> {
        let changed = self.conn().execute(
            "UPDATE command_attempts
             SET sim = ?2, target = ?3, message = ?4, status = ?5, result = ?6,
                 executed_at = ?7, resulted_at = ?8
             WHERE id = ?1",
            params![
                attempt.id,
                attempt.sim.map(SimSlot::as_str),
                attempt.target,
                attempt.message,
                attempt.status.as_str(),
                attempt.result,
                attempt.executed_at.map(ts),
                attempt.resulted_at.map(ts),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::AttemptNotFound(attempt.id));
        }
        Ok(())
    }

    pub fn get_attempt(&self, id: i64) -> Result<Option<CommandAttempt>, StoreError> {
        self.conn()
            .query_row(
                "SELECT id, sender_phone, raw_text, sim, target, message, status, result,
                        received_at, executed_at, resulted_at
                 FROM command_attempts WHERE id = ?1",
                params![id],
                attempt_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Attempts from this sender received at or after `since`, regardless of
    /// their terminal outcome. This is the rate-limit window count.
    pub fn count_attempts_since(
        &self,
        phone: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM command_attempts
                 WHERE sender_phone = ?1 AND received_at >= ?2",
                params![phone, ts(since)],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    /// Same window count, minus one specific attempt. The pipeline logs an
    /// attempt before gating it; that row must not count against itself.
    pub fn count_attempts_since_excluding(
        &self,
        phone: &str,
        since: DateTime<Utc>,
        exclude_id: i64,
    ) -> Result<i64, StoreError> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM command_attempts
                 WHERE sender_phone = ?1 AND received_at >= ?2 AND id != ?3",
                params![phone, ts(since), exclude_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    pub fn count_attempts(&self) -> Result<i64, StoreError> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM command_attempts", [], |row| row.get(0))
            .map_err(Into::into)
    }

    pub fn prune_attempts_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.conn()
            .execute(
                "DELETE FROM command_attempts WHERE received_at < ?1",
                params![ts(cutoff)],
            )
            .map_err(Into::into)
    }
}

/// Fixed-width UTC timestamps so lexicographic comparison in SQL matches
/// chronological order.
fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(column: &str, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(StoreError::CorruptRow(format!("{column}: {e}"))),
            )
        })
}

fn sender_from_row(row: &Row<'_>) -> rusqlite::Result<AuthorizedSender> {
    let created_at: String = row.get(5)?;
    let last_used_at: Option<String> = row.get(6)?;
    Ok(AuthorizedSender {
        id: row.get(0)?,
        phone: row.get(1)?,
        display_name: row.get(2)?,
        is_primary: row.get(3)?,
        is_enabled: row.get(4)?,
        created_at: parse_ts("created_at", created_at)?,
        last_used_at: last_used_at
            .map(|v| parse_ts("last_used_at", v))
            .transpose()?,
        command_count: row.get(7)?,
    })
}

fn attempt_from_row(row: &Row<'_>) -> rusqlite::Result<CommandAttempt> {
    let sim: Option<String> = row.get(3)?;
    let status: String = row.get(6)?;
    let received_at: String = row.get(8)?;
    let executed_at: Option<String> = row.get(9)?;
    let resulted_at: Option<String> = row.get(10)?;
    Ok(CommandAttempt {
        id: row.get(0)?,
        sender_phone: row.get(1)?,
        raw_text: row.get(2)?,
        sim: sim.as_deref().and_then(SimSlot::parse),
        target: row.get(4)?,
        message: row.get(5)?,
        status: CommandStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                Box::new(StoreError::CorruptRow(format!("status: {status}"))),
            )
        })?,
        result: row.get(7)?,
        received_at: parse_ts("received_at", received_at)?,
        executed_at: executed_at
            .map(|v| parse_ts("executed_at", v))
            .transpose()?,
        resulted_at: resulted_at
            .map(|v| parse_ts("resulted_at", v))
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid timestamp")
    }

    fn store() -> SmsStore {
        SmsStore::open_in_memory().expect("in-memory store")
    }

    #[test]
    fn add_and_find_sender() {
        let store = store();
        let added = store
            .add_sender("+905551234567", "Ops", now())
            .expect("add sender");
        assert!(added.id > 0);
        assert!(added.is_enabled);
        assert!(!added.is_primary);
        assert_eq!(added.command_count, 0);
        assert_eq!(added.last_used_at, None);

        let found = store
            .find_sender_by_phone("+905551234567")
            .expect("lookup")
            .expect("present");
        assert_eq!(found, added);
        assert!(store.find_sender_by_phone("+15550000000").expect("lookup").is_none());
    }

    #[test]
    fn duplicate_phone_is_rejected() {
        let store = store();
        store.add_sender("+905551234567", "a", now()).expect("first add");
        let err = store
            .add_sender("+905551234567", "b", now())
            .expect_err("duplicate should fail");
        assert!(matches!(err, StoreError::DuplicatePhone(p) if p == "+905551234567"));
    }

    #[test]
    fn set_primary_leaves_exactly_one_primary() {
        let store = store();
        let a = store.add_sender("+905551234567", "a", now()).expect("add a");
        let b = store.add_sender("+905557654321", "b", now()).expect("add b");
        let c = store.add_sender("+905559999999", "c", now()).expect("add c");

        for id in [a.id, b.id, c.id, b.id] {
            store.set_primary(id).expect("set primary");
            let primaries: Vec<i64> = store
                .list_senders()
                .expect("list")
                .into_iter()
                .filter(|s| s.is_primary)
                .map(|s| s.id)
                .collect();
            assert_eq!(primaries, vec![id]);
        }
    }

    #[test]
    fn set_primary_unknown_id_fails_without_clearing() {
        let store = store();
        let a = store.add_sender("+905551234567", "a", now()).expect("add");
        store.set_primary(a.id).expect("set primary");
        let err = store.set_primary(9999).expect_err("unknown id");
        assert!(matches!(err, StoreError::SenderNotFound));
        let sender = store.sender_by_id(a.id).expect("get").expect("present");
        assert!(sender.is_primary);
    }

    #[test]
    fn increment_usage_updates_counters() {
        let store = store();
        store.add_sender("+905551234567", "a", now()).expect("add");
        store
            .increment_usage("+905551234567", now() + Duration::minutes(5))
            .expect("first increment");
        store
            .increment_usage("+905551234567", now() + Duration::minutes(6))
            .expect("second increment");

        let sender = store
            .find_sender_by_phone("+905551234567")
            .expect("lookup")
            .expect("present");
        assert_eq!(sender.command_count, 2);
        assert_eq!(sender.last_used_at, Some(now() + Duration::minutes(6)));

        let err = store
            .increment_usage("+15550000000", now())
            .expect_err("unknown phone");
        assert!(matches!(err, StoreError::SenderNotFound));
    }

    #[test]
    fn enable_disable_and_remove() {
        let store = store();
        store.add_sender("+905551234567", "a", now()).expect("add");
        assert!(store.set_enabled("+905551234567", false).expect("disable"));
        let sender = store
            .find_sender_by_phone("+905551234567")
            .expect("lookup")
            .expect("present");
        assert!(!sender.is_enabled);

        assert!(store.remove_sender("+905551234567").expect("remove"));
        assert!(!store.remove_sender("+905551234567").expect("second remove"));
    }

    #[test]
    fn attempt_round_trips_through_sqlite() {
        let store = store();
        let mut attempt = CommandAttempt::new("+905551234567", "SMS SIM1 +905557654321 hi", now());
        store.insert_attempt(&mut attempt).expect("insert");
        assert!(attempt.id > 0);

        attempt.sim = Some(SimSlot::Sim1);
        attempt.target = Some("+905557654321".to_string());
        attempt.message = Some("hi".to_string());
        attempt.status = CommandStatus::Success;
        attempt.result = Some("sent via SIM1".to_string());
        attempt.executed_at = Some(now() + Duration::seconds(1));
        attempt.resulted_at = Some(now() + Duration::seconds(2));
        store.update_attempt(&attempt).expect("update");

        let loaded = store
            .get_attempt(attempt.id)
            .expect("get")
            .expect("present");
        assert_eq!(loaded, attempt);
    }

    #[test]
    fn update_unknown_attempt_fails() {
        let store = store();
        let attempt = CommandAttempt::new("+905551234567", "SMS", now());
        let err = store.update_attempt(&attempt).expect_err("missing row");
        assert!(matches!(err, StoreError::AttemptNotFound(0)));
    }

    #[test]
    fn count_attempts_since_is_a_sliding_window() {
        let store = store();
        let base = now();
        for minutes_ago in [90, 59, 30, 5] {
            let mut attempt = CommandAttempt::new(
                "+905551234567",
                "SMS SIM1 +905557654321 hi",
                base - Duration::minutes(minutes_ago),
            );
            store.insert_attempt(&mut attempt).expect("insert");
        }
        // Another sender's rows never count.
        let mut other = CommandAttempt::new("+15550000000", "SMS", base);
        store.insert_attempt(&mut other).expect("insert other");

        let hourly = store
            .count_attempts_since("+905551234567", base - Duration::hours(1))
            .expect("hourly count");
        assert_eq!(hourly, 3);
        let daily = store
            .count_attempts_since("+905551234567", base - Duration::hours(24))
            .expect("daily count");
        assert_eq!(daily, 4);
    }

    #[test]
    fn excluding_count_skips_the_named_attempt() {
        let store = store();
        let mut first = CommandAttempt::new("+905551234567", "SMS", now());
        let mut second = CommandAttempt::new("+905551234567", "SMS", now());
        store.insert_attempt(&mut first).expect("insert first");
        store.insert_attempt(&mut second).expect("insert second");

        let count = store
            .count_attempts_since_excluding("+905551234567", now() - Duration::hours(1), second.id)
            .expect("count");
        assert_eq!(count, 1);
    }

    #[test]
    fn rejected_attempts_count_toward_the_window() {
        let store = store();
        let mut attempt = CommandAttempt::new("+905551234567", "SMS bogus", now());
        attempt.status = CommandStatus::InvalidFormat;
        store.insert_attempt(&mut attempt).expect("insert");
        let count = store
            .count_attempts_since("+905551234567", now() - Duration::hours(1))
            .expect("count");
        assert_eq!(count, 1);
    }

    #[test]
    fn prune_deletes_only_old_attempts() {
        let store = store();
        let base = now();
        let mut old = CommandAttempt::new("+905551234567", "SMS", base - Duration::days(30));
        let mut fresh = CommandAttempt::new("+905551234567", "SMS", base);
        store.insert_attempt(&mut old).expect("insert old");
        store.insert_attempt(&mut fresh).expect("insert fresh");

        let pruned = store
            .prune_attempts_before(base - Duration::days(7))
            .expect("prune");
        assert_eq!(pruned, 1);
        assert!(store.get_attempt(old.id).expect("get").is_none());
        assert!(store.get_attempt(fresh.id).expect("get").is_some());
        assert_eq!(store.count_attempts().expect("count"), 1);
    }
}
