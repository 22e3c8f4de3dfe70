//! SQLite-backed audit store. Every write is its own scoped transaction
//! (begin → body → commit, rollback on any error) so the honeypot never
//! batches inserts and stays responsive even if one write fails — per
//! spec §4.6/§9.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::models::{AttackCommand, AttackSession};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS attacksession (
    id TEXT PRIMARY KEY,
    start_time TEXT NOT NULL,
    source_ip TEXT NOT NULL,
    source_port INTEGER NOT NULL,
    end_time TEXT
);
CREATE TABLE IF NOT EXISTS attackcommand (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    time TEXT NOT NULL,
    command TEXT NOT NULL,
    host TEXT NOT NULL,
    output TEXT NOT NULL,
    session_id TEXT NOT NULL REFERENCES attacksession(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_attackcommand_session_time ON attackcommand(session_id, time);
";

pub struct AuditStore {
    conn: Mutex<Connection>,
}

fn parse_rfc3339(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| rusqlite::Error::InvalidColumnType(0, "time".to_string(), rusqlite::types::Type::Text))
}

impl AuditStore {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(AuditStore { conn: Mutex::new(conn) })
    }

    fn with_transaction<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction) -> rusqlite::Result<T>,
    ) -> rusqlite::Result<T> {
        let mut conn = self.conn.lock().expect("audit store mutex poisoned");
        let tx = conn.transaction()?;
        let result = f(&tx);
        match result {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                let _ = tx.rollback();
                Err(err)
            }
        }
    }

    pub fn insert_session(&self, session: &AttackSession) -> rusqlite::Result<()> {
        self.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO attacksession (id, start_time, source_ip, source_port, end_time)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    session.id,
                    session.start_time.to_rfc3339(),
                    session.source_ip,
                    session.source_port,
                    session.end_time.map(|t| t.to_rfc3339()),
                ],
            )?;
            Ok(())
        })
    }

    /// Each command insert is its own transaction; the contract is
    /// at-least-once durability, never batching (spec §9).
    pub fn record_command(
        &self,
        session_id: &str,
        command: &str,
        host: &str,
        output: &str,
    ) -> rusqlite::Result<()> {
        let now = Utc::now();
        self.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO attackcommand (time, command, host, output, session_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![now.to_rfc3339(), command, host, output, session_id],
            )?;
            Ok(())
        })
    }

    pub fn finalize_session(&self, session_id: &str, end_time: DateTime<Utc>) -> rusqlite::Result<()> {
        self.with_transaction(|tx| {
            tx.execute(
                "UPDATE attacksession SET end_time = ?1 WHERE id = ?2",
                params![end_time.to_rfc3339(), session_id],
            )?;
            Ok(())
        })
    }

    pub fn session_end_time(&self, session_id: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().expect("audit store mutex poisoned");
        conn.query_row(
            "SELECT end_time FROM attacksession WHERE id = ?1",
            params![session_id],
            |row| {
                let raw: Option<String> = row.get(0)?;
                Ok(raw)
            },
        )?
        .map(|s| parse_rfc3339(&s))
        .transpose()
    }

    /// Commands for one session, ordered by time — spec §3/§8 invariant
    /// 4 requires this ordering to hold for every session.
    pub fn commands_for_session(&self, session_id: &str) -> rusqlite::Result<Vec<AttackCommand>> {
        let conn = self.conn.lock().expect("audit store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, time, command, host, output, session_id
             FROM attackcommand WHERE session_id = ?1 ORDER BY time ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            let time_str: String = row.get(1)?;
            Ok(AttackCommand {
                id: row.get(0)?,
                time: parse_rfc3339(&time_str)?,
                command: row.get(2)?,
                host: row.get(3)?,
                output: row.get(4)?,
                session_id: row.get(5)?,
            })
        })?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, AuditStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = AuditStore::open(&tmp.path().join("audit.db")).unwrap();
        (tmp, store)
    }

    #[test]
    fn insert_and_finalize_session() {
        let (_tmp, store) = store();
        let session = AttackSession {
            id: "s1".to_string(),
            start_time: Utc::now(),
            source_ip: "1.2.3.4".to_string(),
            source_port: 5555,
            end_time: None,
        };
        store.insert_session(&session).unwrap();
        store.finalize_session("s1", Utc::now()).unwrap();
    }

    #[test]
    fn commands_ordered_by_time() {
        let (_tmp, store) = store();
        let session = AttackSession {
            id: "s1".to_string(),
            start_time: Utc::now(),
            source_ip: "1.2.3.4".to_string(),
            source_port: 5555,
            end_time: None,
        };
        store.insert_session(&session).unwrap();
        store.record_command("s1", "pwd", "test02", "/").unwrap();
        store.record_command("s1", "ls", "test02", "a b c").unwrap();

        let commands = store.commands_for_session("s1").unwrap();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].command, "pwd");
        assert_eq!(commands[1].command, "ls");
        assert!(commands[0].time <= commands[1].time);
    }

    #[test]
    fn cascade_deletes_commands_with_session() {
        let (_tmp, store) = store();
        let session = AttackSession {
            id: "s1".to_string(),
            start_time: Utc::now(),
            source_ip: "1.2.3.4".to_string(),
            source_port: 5555,
            end_time: None,
        };
        store.insert_session(&session).unwrap();
        store.record_command("s1", "pwd", "test02", "/").unwrap();

        store
            .with_transaction(|tx| tx.execute("DELETE FROM attacksession WHERE id = ?1", params!["s1"]))
            .unwrap();

        assert!(store.commands_for_session("s1").unwrap().is_empty());
    }
}
