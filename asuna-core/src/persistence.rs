//! SQLite persistence for the companion character.
//!
//! Three append/query tables back a session:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS memory_fragment_log (
//!     id           INTEGER PRIMARY KEY AUTOINCREMENT,
//!     fragment_id  TEXT NOT NULL,
//!     stage        TEXT NOT NULL,
//!     trigger_text TEXT NOT NULL,
//!     content      TEXT NOT NULL,
//!     timestamp    TEXT NOT NULL
//! );
//! CREATE TABLE IF NOT EXISTS user_profile (
//!     user_id           TEXT PRIMARY KEY,
//!     interaction_count INTEGER NOT NULL,
//!     care_count        INTEGER NOT NULL,
//!     tasks_completed   INTEGER NOT NULL,
//!     care_actions      TEXT NOT NULL,   -- JSON array
//!     shared_memories   TEXT NOT NULL,   -- JSON array
//!     preferences       TEXT NOT NULL,   -- JSON object
//!     started_at        TEXT NOT NULL,
//!     last_interaction  TEXT NOT NULL
//! );
//! CREATE TABLE IF NOT EXISTS stage_transition_log (...);
//! ```
//!
//! The session talks to the store through [`MemoryStore`], so tests and
//! embedders can swap the engine out.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PersistenceConfig;
use crate::error::{AsunaError, Result};
use crate::ledger::{RecoveredFragment, UnlockRecord};
use crate::stage::StageTransition;
use crate::types::{FragmentId, InteractionCounters, Stage};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS memory_fragment_log (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        fragment_id  TEXT NOT NULL,
        stage        TEXT NOT NULL,
        trigger_text TEXT NOT NULL,
        content      TEXT NOT NULL,
        timestamp    TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_fragment_log_id ON memory_fragment_log (fragment_id);
    CREATE TABLE IF NOT EXISTS user_profile (
        user_id           TEXT PRIMARY KEY,
        interaction_count INTEGER NOT NULL,
        care_count        INTEGER NOT NULL,
        tasks_completed   INTEGER NOT NULL,
        care_actions      TEXT NOT NULL,
        shared_memories   TEXT NOT NULL,
        preferences       TEXT NOT NULL,
        started_at        TEXT NOT NULL,
        last_interaction  TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS stage_transition_log (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        from_stage        TEXT NOT NULL,
        to_stage          TEXT NOT NULL,
        interaction_count INTEGER NOT NULL,
        care_count        INTEGER NOT NULL,
        tasks_completed   INTEGER NOT NULL,
        timestamp         TEXT NOT NULL
    );
";

// ---------------------------------------------------------------------------
// Stored records
// ---------------------------------------------------------------------------

/// A detail the user added to a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedMemory {
    /// Fragment the detail belongs to.
    pub fragment_id: FragmentId,
    /// The user's text.
    pub text: String,
}

/// Long-lived per-user state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Profile key.
    pub user_id: String,
    /// Interaction counters.
    pub counters: InteractionCounters,
    /// Most recent reassurance utterances.
    pub care_actions: Vec<String>,
    /// User-supplied fragment details.
    pub shared_memories: Vec<SharedMemory>,
    /// Free-form preferences.
    pub preferences: BTreeMap<String, String>,
    /// When the relationship began; the stage clock counts from here.
    pub started_at: DateTime<Utc>,
    /// Last user utterance.
    pub last_interaction: DateTime<Utc>,
}

impl UserProfile {
    /// A fresh profile starting at `now`.
    #[must_use]
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            counters: InteractionCounters::default(),
            care_actions: Vec::new(),
            shared_memories: Vec::new(),
            preferences: BTreeMap::new(),
            started_at: now,
            last_interaction: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Store seam
// ---------------------------------------------------------------------------

/// Append/query access the session needs from a durable store.
pub trait MemoryStore: Send {
    /// Append a fragment-unlock audit record.
    ///
    /// # Errors
    /// Store-specific failure.
    fn append_unlock(&self, record: &UnlockRecord) -> Result<()>;

    /// Append a stage transition.
    ///
    /// # Errors
    /// Store-specific failure.
    fn append_transition(&self, transition: &StageTransition) -> Result<()>;

    /// Upsert a profile.
    ///
    /// # Errors
    /// Store-specific failure.
    fn save_profile(&self, profile: &UserProfile) -> Result<()>;

    /// Load a profile by user id.
    ///
    /// # Errors
    /// Store-specific failure.
    fn load_profile(&self, user_id: &str) -> Result<Option<UserProfile>>;

    /// Every fragment ever unlocked, with its first unlock time, oldest
    /// first.
    ///
    /// # Errors
    /// Store-specific failure.
    fn unlocked_fragments(&self) -> Result<Vec<RecoveredFragment>>;

    /// Most recent unlock records, newest first.
    ///
    /// # Errors
    /// Store-specific failure.
    fn unlock_log(&self, limit: usize) -> Result<Vec<UnlockRecord>>;
}

// ---------------------------------------------------------------------------
// PersistenceEngine
// ---------------------------------------------------------------------------

/// Handle to an open SQLite database.
///
/// # Usage
///
/// ```no_run
/// # use asuna_core::persistence::{PersistenceEngine, MemoryStore, UserProfile};
/// # use asuna_core::config::PersistenceConfig;
/// let engine = PersistenceEngine::open("asuna_memory.db", &PersistenceConfig::default())?;
/// engine.save_profile(&UserProfile::new("companion", chrono::Utc::now()))?;
/// let loaded = engine.load_profile("companion")?;
/// # Ok::<(), asuna_core::error::AsunaError>(())
/// ```
pub struct PersistenceEngine {
    conn: Connection,
    db_path: PathBuf,
}

impl std::fmt::Debug for PersistenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceEngine")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl PersistenceEngine {
    /// Open (or create) an SQLite database at `path`.
    ///
    /// The schema is created if it does not exist. WAL mode is enabled
    /// when `config.wal_mode` is `true`.
    ///
    /// # Errors
    ///
    /// Returns [`AsunaError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "Asuna persistence engine opened"
        );

        Ok(Self { conn, db_path })
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`AsunaError::Database`] on SQLite failures.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Number of stage transitions recorded.
    ///
    /// # Errors
    ///
    /// Returns [`AsunaError::Database`] on SQLite failures.
    pub fn transition_count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM stage_transition_log", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    /// Stage transitions, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`AsunaError::Database`] or [`AsunaError::Serialization`].
    pub fn transitions(&self) -> Result<Vec<StageTransition>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT from_stage, to_stage, interaction_count, care_count, tasks_completed, timestamp
             FROM stage_transition_log ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, u32>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (from, to, interactions, care, tasks, ts) = row?;
            out.push(StageTransition {
                from: parse_stage(&from)?,
                to: parse_stage(&to)?,
                at: parse_time(&ts)?,
                counters: InteractionCounters {
                    interaction_count: interactions,
                    care_count: care,
                    tasks_completed: tasks,
                },
            });
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Backup
    // ------------------------------------------------------------------

    /// Create a backup of the database to `dest_path` using SQLite's
    /// online-backup API.
    ///
    /// # Errors
    ///
    /// Returns [`AsunaError::Database`] on SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let start = Instant::now();
        let mut dest = Connection::open(dest_path.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&self.conn, &mut dest)?;

        // 256 pages per step, 50ms between steps.
        backup.run_to_completion(256, std::time::Duration::from_millis(50), None)?;

        info!(
            dest = %dest_path.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Database backup completed"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Utility
    // ------------------------------------------------------------------

    /// Return the path to the database file (or `:memory:`).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run an integrity check on the database.
    ///
    /// Returns `Ok(true)` if the database passes the check.
    ///
    /// # Errors
    ///
    /// Returns [`AsunaError::Database`] if the check query itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }
}

impl MemoryStore for PersistenceEngine {
    fn append_unlock(&self, record: &UnlockRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO memory_fragment_log (fragment_id, stage, trigger_text, content, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.fragment_id.as_str(),
                record.stage.as_str(),
                record.trigger_text,
                record.content,
                record.at.to_rfc3339(),
            ],
        )?;
        debug!(fragment = %record.fragment_id, "Unlock persisted");
        Ok(())
    }

    fn append_transition(&self, transition: &StageTransition) -> Result<()> {
        self.conn.execute(
            "INSERT INTO stage_transition_log
                (from_stage, to_stage, interaction_count, care_count, tasks_completed, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                transition.from.as_str(),
                transition.to.as_str(),
                transition.counters.interaction_count,
                transition.counters.care_count,
                transition.counters.tasks_completed,
                transition.at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        let start = Instant::now();
        let care = to_json(&profile.care_actions)?;
        let shared = to_json(&profile.shared_memories)?;
        let prefs = to_json(&profile.preferences)?;

        self.conn.execute(
            "INSERT INTO user_profile
                (user_id, interaction_count, care_count, tasks_completed,
                 care_actions, shared_memories, preferences, started_at, last_interaction)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(user_id) DO UPDATE SET
                interaction_count = excluded.interaction_count,
                care_count        = excluded.care_count,
                tasks_completed   = excluded.tasks_completed,
                care_actions      = excluded.care_actions,
                shared_memories   = excluded.shared_memories,
                preferences       = excluded.preferences,
                started_at        = excluded.started_at,
                last_interaction  = excluded.last_interaction",
            params![
                profile.user_id,
                profile.counters.interaction_count,
                profile.counters.care_count,
                profile.counters.tasks_completed,
                care,
                shared,
                prefs,
                profile.started_at.to_rfc3339(),
                profile.last_interaction.to_rfc3339(),
            ],
        )?;

        debug!(
            user = %profile.user_id,
            interactions = profile.counters.interaction_count,
            elapsed_us = start.elapsed().as_micros(),
            "Saved user profile"
        );
        Ok(())
    }

    fn load_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT interaction_count, care_count, tasks_completed,
                    care_actions, shared_memories, preferences, started_at, last_interaction
             FROM user_profile WHERE user_id = ?1",
        )?;

        let row = stmt
            .query_row(params![user_id], |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })
            .optional()?;

        let Some((interactions, care, tasks, care_json, shared_json, prefs_json, started, last)) =
            row
        else {
            return Ok(None);
        };

        Ok(Some(UserProfile {
            user_id: user_id.to_string(),
            counters: InteractionCounters {
                interaction_count: interactions,
                care_count: care,
                tasks_completed: tasks,
            },
            care_actions: from_json(&care_json)?,
            shared_memories: from_json(&shared_json)?,
            preferences: from_json(&prefs_json)?,
            started_at: parse_time(&started)?,
            last_interaction: parse_time(&last)?,
        }))
    }

    fn unlocked_fragments(&self) -> Result<Vec<RecoveredFragment>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT fragment_id, timestamp FROM memory_fragment_log
             WHERE id IN (SELECT MIN(id) FROM memory_fragment_log GROUP BY fragment_id)
             ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, ts) = row?;
            out.push(RecoveredFragment {
                fragment_id: FragmentId(id),
                unlocked_at: parse_time(&ts)?,
            });
        }
        Ok(out)
    }

    fn unlock_log(&self, limit: usize) -> Result<Vec<UnlockRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare_cached(
            "SELECT fragment_id, stage, trigger_text, content, timestamp
             FROM memory_fragment_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, stage, trigger_text, content, ts) = row?;
            out.push(UnlockRecord {
                fragment_id: FragmentId(id),
                stage: parse_stage(&stage)?,
                trigger_text,
                content,
                at: parse_time(&ts)?,
            });
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| AsunaError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T> {
    serde_json::from_str(s).map_err(|e| AsunaError::Serialization(e.to_string()))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AsunaError::Serialization(format!("bad timestamp '{s}': {e}")))
}

fn parse_stage(s: &str) -> Result<Stage> {
    s.parse().map_err(AsunaError::Serialization)
}

/// Extension trait that adds an `.optional()` combinator to `rusqlite::Result`.
///
/// Converts `Err(QueryReturnedNoRows)` into `Ok(None)`.
trait OptionalExt<T> {
    /// Convert `QueryReturnedNoRows` into `Ok(None)`.
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
