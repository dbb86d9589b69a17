// SQLite persistence layer for sessions, participants and assignments.

use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use chrono::{DateTime, Utc};
use rand::Rng;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::{debug, info, warn};

use crate::draw::DrawEngine;
use crate::error::{Result, SantaError, MIN_PARTICIPANTS};
use crate::model::{
    is_storable_name, normalize_wishes, Assignment, GiftTarget, Participant, Session, UserId,
    CODE_ALPHABET, CODE_LEN, NAME_MAX_LEN,
};

const SESSION_COLUMNS: &str = "s.id, s.code, s.organizer_id, s.created_at, s.is_drawn";
const PARTICIPANT_COLUMNS: &str = "p.id, p.session_id, p.user_id, p.name, p.wishes, p.joined_at";

/// SQLite-backed store owning all persisted game state.
///
/// The connection sits behind a mutex held for the whole of each operation,
/// so operations touching the same session never interleave. Multi-step
/// writes additionally run in `BEGIN IMMEDIATE` transactions and either land
/// completely or not at all.
pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                code         TEXT NOT NULL UNIQUE,
                organizer_id INTEGER NOT NULL,
                created_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                is_drawn     INTEGER NOT NULL DEFAULT 0
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_active_organizer
                ON sessions(organizer_id) WHERE is_drawn = 0;

            CREATE TABLE IF NOT EXISTS participants (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                user_id    INTEGER NOT NULL,
                name       TEXT NOT NULL,
                wishes     TEXT NOT NULL DEFAULT '',
                joined_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                UNIQUE(session_id, user_id)
            );

            CREATE INDEX IF NOT EXISTS idx_participants_user ON participants(user_id);

            CREATE TABLE IF NOT EXISTS assignments (
                id                      INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id              INTEGER NOT NULL
                                        REFERENCES sessions(id) ON DELETE CASCADE,
                giver_participant_id    INTEGER NOT NULL
                                        REFERENCES participants(id) ON DELETE CASCADE,
                receiver_participant_id INTEGER NOT NULL
                                        REFERENCES participants(id) ON DELETE CASCADE,
                UNIQUE(session_id, giver_participant_id),
                UNIQUE(session_id, receiver_participant_id),
                CHECK(giver_participant_id <> receiver_participant_id)
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// A poisoned lock is recovered: any transaction open at the time of the
    /// panic was rolled back when it was dropped.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Codes
    // ------------------------------------------------------------------

    /// Generate a code not used by any stored session.
    pub fn generate_code(&self) -> Result<String> {
        self.generate_code_with(&mut rand::thread_rng())
    }

    /// Like [`generate_code`](Self::generate_code) with a caller-supplied RNG.
    pub fn generate_code_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<String> {
        let conn = self.conn();
        Ok(unused_code(&conn, rng)?)
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Create a session for `organizer_id` and return its code.
    ///
    /// Destructive: an undrawn session the organizer already owns is deleted
    /// together with its participants before the new one is inserted.
    pub fn create_session(&self, organizer_id: UserId) -> Result<String> {
        self.create_session_with(organizer_id, &mut rand::thread_rng())
    }

    /// Like [`create_session`](Self::create_session) with a caller-supplied RNG.
    pub fn create_session_with<R: Rng + ?Sized>(
        &self,
        organizer_id: UserId,
        rng: &mut R,
    ) -> Result<String> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Generated while the old session still exists, so the replacement
        // can never reuse the code it replaces.
        let code = unused_code(&tx, rng)?;

        let replaced: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, code FROM sessions WHERE organizer_id = ?1 AND is_drawn = 0",
                params![organizer_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((old_id, old_code)) = &replaced {
            tx.execute("DELETE FROM sessions WHERE id = ?1", params![old_id])?;
            info!(
                organizer_id,
                old_code = %old_code,
                "deleted undrawn session replaced by a new one"
            );
        }

        tx.execute(
            "INSERT INTO sessions (code, organizer_id) VALUES (?1, ?2)",
            params![code, organizer_id],
        )?;
        tx.commit()?;

        info!(organizer_id, code = %code, "session created");
        Ok(code)
    }

    pub fn get_session_by_code(&self, code: &str) -> Result<Option<Session>> {
        let conn = self.conn();
        Ok(session_by_code(&conn, code)?)
    }

    /// The user's own undrawn session if they organize one, otherwise the
    /// session they most recently joined as a participant.
    pub fn get_active_or_latest_session(&self, user_id: UserId) -> Result<Option<Session>> {
        let conn = self.conn();

        let own = conn
            .query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions s
                     WHERE s.organizer_id = ?1 AND s.is_drawn = 0"
                ),
                params![user_id],
                session_from_row,
            )
            .optional()?;
        if own.is_some() {
            return Ok(own);
        }

        let joined = conn
            .query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM participants p
                     JOIN sessions s ON s.id = p.session_id
                     WHERE p.user_id = ?1
                     ORDER BY p.joined_at DESC, p.id DESC
                     LIMIT 1"
                ),
                params![user_id],
                session_from_row,
            )
            .optional()?;
        Ok(joined)
    }

    // ------------------------------------------------------------------
    // Participants
    // ------------------------------------------------------------------

    /// Enroll `user_id` in the session identified by `code`.
    ///
    /// The name is trimmed and must be 1..=50 characters (the join
    /// conversation asks for at least two). Wishes of `-` are stored as empty.
    /// Fails with `SessionNotFound`, `AlreadyDrawn`, `DuplicateParticipant` or
    /// `InvalidInput` without writing anything.
    pub fn add_participant(
        &self,
        code: &str,
        user_id: UserId,
        name: &str,
        wishes: &str,
    ) -> Result<Participant> {
        let name = name.trim();
        if !is_storable_name(name) {
            return Err(SantaError::InvalidInput {
                field: "name",
                message: format!("must be 1 to {NAME_MAX_LEN} characters long"),
            });
        }
        let wishes = normalize_wishes(wishes);

        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let session = session_by_code(&tx, code)?.ok_or(SantaError::SessionNotFound)?;
        if session.is_drawn {
            warn!(code, user_id, "join rejected, session already drawn");
            return Err(SantaError::AlreadyDrawn);
        }

        let inserted = tx.query_row(
            "INSERT INTO participants (session_id, user_id, name, wishes)
             VALUES (?1, ?2, ?3, ?4)
             RETURNING id, joined_at",
            params![session.id, user_id, name, wishes],
            |row| Ok((row.get::<_, i64>(0)?, parse_timestamp(row, 1)?)),
        );
        let (id, joined_at) = match inserted {
            Ok(v) => v,
            Err(e) if is_unique_violation(&e) => {
                debug!(code, user_id, "join rejected, user already in session");
                return Err(SantaError::DuplicateParticipant);
            }
            Err(e) => return Err(e.into()),
        };
        tx.commit()?;

        info!(code, user_id, participant_id = id, "participant joined");
        Ok(Participant {
            id,
            session_id: session.id,
            user_id,
            name: name.to_string(),
            wishes,
            joined_at,
        })
    }

    /// Participants of a session in join order. Empty if the code is unknown.
    pub fn list_participants(&self, code: &str) -> Result<Vec<Participant>> {
        let conn = self.conn();
        Ok(participants_by_code(&conn, code)?)
    }

    // ------------------------------------------------------------------
    // Draw
    // ------------------------------------------------------------------

    /// Run the draw for `code`: derange the participants (in join order),
    /// store one assignment per giver and mark the session drawn, all in a
    /// single transaction.
    pub fn perform_draw<R: Rng + ?Sized>(
        &self,
        code: &str,
        engine: &DrawEngine,
        rng: &mut R,
    ) -> Result<Vec<Assignment>> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let session = session_by_code(&tx, code)?.ok_or(SantaError::SessionNotFound)?;
        if session.is_drawn {
            warn!(code, "draw rejected, session already drawn");
            return Err(SantaError::AlreadyDrawn);
        }

        let givers: Vec<i64> = participants_by_code(&tx, code)?
            .into_iter()
            .map(|p| p.id)
            .collect();
        if givers.len() < MIN_PARTICIPANTS {
            warn!(code, count = givers.len(), "draw rejected, not enough participants");
            return Err(SantaError::InsufficientParticipants {
                count: givers.len(),
            });
        }

        let receivers = engine.derange(&givers, rng)?;

        let mut assignments = Vec::with_capacity(givers.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO assignments (session_id, giver_participant_id, receiver_participant_id)
                 VALUES (?1, ?2, ?3)
                 RETURNING id",
            )?;
            for (&giver, &receiver) in givers.iter().zip(&receivers) {
                let id: i64 =
                    stmt.query_row(params![session.id, giver, receiver], |row| row.get(0))?;
                assignments.push(Assignment {
                    id,
                    session_id: session.id,
                    giver_participant_id: giver,
                    receiver_participant_id: receiver,
                });
            }
        }

        let flipped = tx.execute(
            "UPDATE sessions SET is_drawn = 1 WHERE id = ?1 AND is_drawn = 0",
            params![session.id],
        )?;
        if flipped != 1 {
            return Err(SantaError::AlreadyDrawn);
        }
        tx.commit()?;

        info!(code, participants = givers.len(), "draw completed");
        Ok(assignments)
    }

    /// Assignments of a session ordered by insertion. Empty if the code is
    /// unknown or the session has not been drawn.
    pub fn list_assignments(&self, code: &str) -> Result<Vec<Assignment>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT a.id, a.session_id, a.giver_participant_id, a.receiver_participant_id
             FROM assignments a
             JOIN sessions s ON s.id = a.session_id
             WHERE s.code = ?1
             ORDER BY a.id",
        )?;
        let rows = stmt
            .query_map(params![code], |row| {
                Ok(Assignment {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    giver_participant_id: row.get(2)?,
                    receiver_participant_id: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// The receiver assigned to the participant with `user_id` in `code`.
    pub fn get_assignment_for(&self, user_id: UserId, code: &str) -> Result<Option<GiftTarget>> {
        let conn = self.conn();
        let target = conn
            .query_row(
                "SELECT r.name, r.wishes
                 FROM assignments a
                 JOIN sessions s     ON s.id = a.session_id
                 JOIN participants g ON g.id = a.giver_participant_id
                 JOIN participants r ON r.id = a.receiver_participant_id
                 WHERE s.code = ?1 AND g.user_id = ?2",
                params![code, user_id],
                |row| {
                    Ok(GiftTarget {
                        receiver_name: row.get(0)?,
                        receiver_wishes: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(target)
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn unused_code<R: Rng + ?Sized>(conn: &Connection, rng: &mut R) -> rusqlite::Result<String> {
    loop {
        let candidate: String = (0..CODE_LEN)
            .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
            .collect();
        let taken: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sessions WHERE code = ?1)",
            params![candidate],
            |row| row.get(0),
        )?;
        if !taken {
            return Ok(candidate);
        }
        debug!(code = %candidate, "generated code collides, retrying");
    }
}

fn session_by_code(conn: &Connection, code: &str) -> rusqlite::Result<Option<Session>> {
    conn.query_row(
        &format!("SELECT {SESSION_COLUMNS} FROM sessions s WHERE s.code = ?1"),
        params![code],
        session_from_row,
    )
    .optional()
}

fn participants_by_code(conn: &Connection, code: &str) -> rusqlite::Result<Vec<Participant>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PARTICIPANT_COLUMNS} FROM participants p
         JOIN sessions s ON s.id = p.session_id
         WHERE s.code = ?1
         ORDER BY p.joined_at, p.id"
    ))?;
    let rows = stmt
        .query_map(params![code], participant_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        code: row.get(1)?,
        organizer_id: row.get(2)?,
        created_at: parse_timestamp(row, 3)?,
        is_drawn: row.get(4)?,
    })
}

fn participant_from_row(row: &Row<'_>) -> rusqlite::Result<Participant> {
    Ok(Participant {
        id: row.get(0)?,
        session_id: row.get(1)?,
        user_id: row.get(2)?,
        name: row.get(3)?,
        wishes: row.get(4)?,
        joined_at: parse_timestamp(row, 5)?,
    })
}

/// Timestamps are written by SQLite as `%Y-%m-%dT%H:%M:%fZ`, which is RFC 3339.
fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;
    use std::sync::Arc;

    /// Helper: create a fresh in-memory store for each test.
    fn test_store() -> SessionStore {
        SessionStore::open(":memory:").expect("in-memory database should open")
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(2024)
    }

    /// Helper: a session with `n` participants (user ids 100, 101, ...).
    fn session_with(store: &SessionStore, n: i64) -> String {
        let code = store.create_session(1).unwrap();
        for i in 0..n {
            store
                .add_participant(&code, 100 + i, &format!("Player {i}"), "-")
                .unwrap();
        }
        code
    }

    fn count(store: &SessionStore, table: &str) -> i64 {
        store
            .conn()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    // ------------------------------------------------------------------
    // Schema / open
    // ------------------------------------------------------------------

    #[test]
    fn open_creates_tables() {
        let store = test_store();
        let conn = store.conn();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"sessions".to_string()));
        assert!(tables.contains(&"participants".to_string()));
        assert!(tables.contains(&"assignments".to_string()));
    }

    #[test]
    fn open_fails_for_unwritable_path() {
        let result = SessionStore::open("/nonexistent-dir/santa/db.sqlite");
        assert!(result.is_err());
    }

    // ------------------------------------------------------------------
    // Codes
    // ------------------------------------------------------------------

    #[test]
    fn generated_codes_have_expected_shape() {
        let store = test_store();
        for _ in 0..50 {
            let code = store.generate_code().unwrap();
            assert!(crate::model::is_valid_code(&code), "bad code {code}");
        }
    }

    #[test]
    fn generate_code_retries_on_collision() {
        let store = test_store();

        // The same seed produces the same first candidate; store it so the
        // second generator must skip it.
        let first = store.generate_code_with(&mut StdRng::seed_from_u64(9)).unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO sessions (code, organizer_id, is_drawn) VALUES (?1, 5, 1)",
                params![first],
            )
            .unwrap();

        let second = store.generate_code_with(&mut StdRng::seed_from_u64(9)).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn created_codes_are_unique() {
        let store = test_store();
        let mut seen = HashSet::new();
        for organizer in 0..200 {
            let code = store.create_session(organizer).unwrap();
            assert!(seen.insert(code), "duplicate code generated");
        }
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    #[test]
    fn create_session_is_retrievable_by_code() {
        let store = test_store();
        let code = store.create_session(1).unwrap();
        let session = store.get_session_by_code(&code).unwrap().unwrap();
        assert_eq!(session.code, code);
        assert_eq!(session.organizer_id, 1);
        assert!(!session.is_drawn);
    }

    #[test]
    fn unknown_code_is_none() {
        let store = test_store();
        assert!(store.get_session_by_code("ZZZZZZ").unwrap().is_none());
    }

    #[test]
    fn recreate_replaces_undrawn_session_and_its_participants() {
        let store = test_store();
        let old = session_with(&store, 2);

        let new = store.create_session(1).unwrap();
        assert_ne!(old, new);
        assert!(store.get_session_by_code(&old).unwrap().is_none());
        assert!(store.list_participants(&new).unwrap().is_empty());
        assert_eq!(count(&store, "participants"), 0);
        assert_eq!(count(&store, "sessions"), 1);
    }

    #[test]
    fn recreate_keeps_drawn_sessions() {
        let store = test_store();
        let drawn = session_with(&store, 3);
        store
            .perform_draw(&drawn, &DrawEngine::default(), &mut rng())
            .unwrap();

        let fresh = store.create_session(1).unwrap();
        assert!(store.get_session_by_code(&drawn).unwrap().unwrap().is_drawn);
        assert!(!store.get_session_by_code(&fresh).unwrap().unwrap().is_drawn);
        assert_eq!(store.list_assignments(&drawn).unwrap().len(), 3);
    }

    #[test]
    fn one_undrawn_session_per_organizer_is_enforced_by_schema() {
        let store = test_store();
        store.create_session(1).unwrap();
        let result = store.conn().execute(
            "INSERT INTO sessions (code, organizer_id) VALUES ('AAAAAA', 1)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn sessions_of_different_organizers_are_independent() {
        let store = test_store();
        let a = store.create_session(1).unwrap();
        let b = store.create_session(2).unwrap();
        assert!(store.get_session_by_code(&a).unwrap().is_some());
        assert!(store.get_session_by_code(&b).unwrap().is_some());
    }

    #[test]
    fn active_or_latest_prefers_own_undrawn_session() {
        let store = test_store();
        let other = store.create_session(2).unwrap();
        store.add_participant(&other, 1, "Org", "").unwrap();
        let own = store.create_session(1).unwrap();

        let session = store.get_active_or_latest_session(1).unwrap().unwrap();
        assert_eq!(session.code, own);
    }

    #[test]
    fn active_or_latest_falls_back_to_latest_join() {
        let store = test_store();
        let first = store.create_session(2).unwrap();
        let second = store.create_session(3).unwrap();
        store.add_participant(&first, 10, "Ann", "").unwrap();
        store.add_participant(&second, 10, "Ann", "").unwrap();

        let session = store.get_active_or_latest_session(10).unwrap().unwrap();
        assert_eq!(session.code, second);
        assert!(store.get_active_or_latest_session(99).unwrap().is_none());
    }

    // ------------------------------------------------------------------
    // Participants
    // ------------------------------------------------------------------

    #[test]
    fn add_participant_persists_and_normalizes() {
        let store = test_store();
        let code = store.create_session(1).unwrap();
        let p = store.add_participant(&code, 10, "  Alice ", "-").unwrap();
        assert_eq!(p.name, "Alice");
        assert_eq!(p.wishes, "");

        let listed = store.list_participants(&code).unwrap();
        assert_eq!(listed, vec![p]);
    }

    #[test]
    fn add_participant_rejects_duplicates() {
        let store = test_store();
        let code = store.create_session(1).unwrap();
        store.add_participant(&code, 10, "Alice", "books").unwrap();
        let err = store.add_participant(&code, 10, "Alice again", "").unwrap_err();
        assert!(matches!(err, SantaError::DuplicateParticipant));
        assert_eq!(store.list_participants(&code).unwrap().len(), 1);
    }

    #[test]
    fn add_participant_unknown_code() {
        let store = test_store();
        let err = store.add_participant("NOPE00", 10, "Alice", "").unwrap_err();
        assert!(matches!(err, SantaError::SessionNotFound));
    }

    #[test]
    fn add_participant_rejects_bad_names() {
        let store = test_store();
        let code = store.create_session(1).unwrap();
        let too_long = "x".repeat(51);
        for name in ["", "   ", too_long.as_str()] {
            let err = store.add_participant(&code, 10, name, "").unwrap_err();
            assert!(matches!(err, SantaError::InvalidInput { field: "name", .. }));
        }
        assert!(store.list_participants(&code).unwrap().is_empty());
    }

    #[test]
    fn add_participant_after_draw_fails_without_writing() {
        let store = test_store();
        let code = session_with(&store, 3);
        store
            .perform_draw(&code, &DrawEngine::default(), &mut rng())
            .unwrap();

        let err = store.add_participant(&code, 999, "Late", "").unwrap_err();
        assert!(matches!(err, SantaError::AlreadyDrawn));
        assert_eq!(store.list_participants(&code).unwrap().len(), 3);
    }

    #[test]
    fn list_participants_in_join_order() {
        let store = test_store();
        let code = session_with(&store, 5);
        let names: Vec<String> = store
            .list_participants(&code)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(
            names,
            vec!["Player 0", "Player 1", "Player 2", "Player 3", "Player 4"]
        );
        assert!(store.list_participants("ZZZZZZ").unwrap().is_empty());
    }

    #[test]
    fn organizer_may_join_own_session() {
        let store = test_store();
        let code = store.create_session(1).unwrap();
        store.add_participant(&code, 1, "Organizer", "").unwrap();
        assert_eq!(store.list_participants(&code).unwrap()[0].user_id, 1);
    }

    // ------------------------------------------------------------------
    // Draw
    // ------------------------------------------------------------------

    #[test]
    fn draw_produces_derangement_and_flips_flag() {
        let store = test_store();
        let code = session_with(&store, 6);
        let assignments = store
            .perform_draw(&code, &DrawEngine::default(), &mut rng())
            .unwrap();

        let ids: HashSet<i64> = store
            .list_participants(&code)
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        let givers: HashSet<i64> = assignments.iter().map(|a| a.giver_participant_id).collect();
        let receivers: HashSet<i64> = assignments
            .iter()
            .map(|a| a.receiver_participant_id)
            .collect();
        assert_eq!(assignments.len(), 6);
        assert_eq!(givers, ids);
        assert_eq!(receivers, ids);
        assert!(assignments
            .iter()
            .all(|a| a.giver_participant_id != a.receiver_participant_id));

        assert!(store.get_session_by_code(&code).unwrap().unwrap().is_drawn);
        assert_eq!(store.list_assignments(&code).unwrap(), assignments);
    }

    #[test]
    fn draw_requires_three_participants() {
        let store = test_store();
        let code = session_with(&store, 2);
        let err = store
            .perform_draw(&code, &DrawEngine::default(), &mut rng())
            .unwrap_err();
        assert!(matches!(err, SantaError::InsufficientParticipants { count: 2 }));
        assert!(!store.get_session_by_code(&code).unwrap().unwrap().is_drawn);
        assert_eq!(count(&store, "assignments"), 0);
    }

    #[test]
    fn draw_unknown_code() {
        let store = test_store();
        let err = store
            .perform_draw("ZZZZZZ", &DrawEngine::default(), &mut rng())
            .unwrap_err();
        assert!(matches!(err, SantaError::SessionNotFound));
    }

    #[test]
    fn second_draw_fails_and_leaves_assignments_unchanged() {
        let store = test_store();
        let code = session_with(&store, 4);
        let engine = DrawEngine::default();
        store.perform_draw(&code, &engine, &mut rng()).unwrap();
        let before = store.list_assignments(&code).unwrap();

        let err = store
            .perform_draw(&code, &engine, &mut StdRng::seed_from_u64(1))
            .unwrap_err();
        assert!(matches!(err, SantaError::AlreadyDrawn));
        assert_eq!(store.list_assignments(&code).unwrap(), before);
    }

    #[test]
    fn concurrent_draws_land_exactly_one_batch() {
        let store = Arc::new(test_store());
        let code = session_with(&store, 5);

        let handles: Vec<_> = (0..8)
            .map(|seed| {
                let store = Arc::clone(&store);
                let code = code.clone();
                std::thread::spawn(move || {
                    let mut rng = StdRng::seed_from_u64(seed);
                    store
                        .perform_draw(&code, &DrawEngine::default(), &mut rng)
                        .is_ok()
                })
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(store.list_assignments(&code).unwrap().len(), 5);
    }

    #[test]
    fn assignment_lookup_by_user() {
        let store = test_store();
        let code = store.create_session(1).unwrap();
        store.add_participant(&code, 10, "Ann", "-").unwrap();
        store.add_participant(&code, 11, "Bob", "books").unwrap();
        store.add_participant(&code, 12, "Cat", "socks").unwrap();

        assert!(store.get_assignment_for(10, &code).unwrap().is_none());
        store
            .perform_draw(&code, &DrawEngine::default(), &mut rng())
            .unwrap();

        let mut receivers = HashSet::new();
        for (user, own_name) in [(10, "Ann"), (11, "Bob"), (12, "Cat")] {
            let target = store.get_assignment_for(user, &code).unwrap().unwrap();
            assert_ne!(target.receiver_name, own_name);
            receivers.insert(target.receiver_name);
        }
        assert_eq!(receivers.len(), 3);
        assert!(store.get_assignment_for(99, &code).unwrap().is_none());
    }

    #[test]
    fn rotation_fallback_is_persisted_like_any_draw() {
        let store = test_store();
        let code = session_with(&store, 3);
        let assignments = store
            .perform_draw(&code, &DrawEngine::new(0), &mut rng())
            .unwrap();
        let ids: Vec<i64> = store
            .list_participants(&code)
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        let pairs: Vec<(i64, i64)> = assignments
            .iter()
            .map(|a| (a.giver_participant_id, a.receiver_participant_id))
            .collect();
        assert_eq!(pairs, vec![(ids[0], ids[1]), (ids[1], ids[2]), (ids[2], ids[0])]);
    }
}
