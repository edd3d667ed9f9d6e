use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use crate::detection::domain::face_encoder::Embedding;
use crate::identity::domain::identity::{Identity, IdentityMatch, IdentityRecord};
use crate::identity::domain::identity_matcher::{IdentityMatcher, IdentityStoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    roll_no TEXT NOT NULL UNIQUE,
    embedding BLOB NOT NULL,
    snapshot_ref TEXT
);
";

/// Identity store on a single SQLite connection.
///
/// Every operation runs under the connection mutex, so a match reads either
/// the table before an enrollment or after it.
pub struct SqliteIdentityStore {
    conn: Mutex<Connection>,
    tolerance: f64,
}

impl SqliteIdentityStore {
    pub fn open(path: &Path, tolerance: f64) -> Result<Self, IdentityStoreError> {
        Self::with_connection(Connection::open(path)?, tolerance)
    }

    pub fn open_in_memory(tolerance: f64) -> Result<Self, IdentityStoreError> {
        Self::with_connection(Connection::open_in_memory()?, tolerance)
    }

    fn with_connection(conn: Connection, tolerance: f64) -> Result<Self, IdentityStoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            tolerance,
        })
    }

    /// Deletes records whose snapshot file no longer exists.
    /// Returns the roll numbers removed.
    pub fn remove_missing_snapshots(&self) -> Result<Vec<String>, IdentityStoreError> {
        let conn = self.lock()?;
        let missing: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT roll_no, snapshot_ref FROM identities WHERE snapshot_ref IS NOT NULL")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut missing = Vec::new();
            for row in rows {
                let (roll_no, snapshot_ref) = row?;
                if !Path::new(&snapshot_ref).exists() {
                    missing.push(roll_no);
                }
            }
            missing
        };

        for roll_no in &missing {
            conn.execute("DELETE FROM identities WHERE roll_no = ?1", params![roll_no])?;
            log::info!("Removed identity {roll_no}: snapshot file is missing");
        }
        Ok(missing)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, IdentityStoreError> {
        self.conn.lock().map_err(|_| IdentityStoreError::LockPoisoned)
    }
}

impl IdentityMatcher for SqliteIdentityStore {
    fn find_match(&self, embedding: &Embedding) -> Result<Option<IdentityMatch>, IdentityStoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name, roll_no, embedding FROM identities")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
            ))
        })?;

        let mut best: Option<(f64, IdentityMatch)> = None;
        for row in rows {
            let (name, roll_no, blob) = row?;
            let Some(stored) = Embedding::from_le_bytes(&blob) else {
                log::warn!("Skipping identity: {}", IdentityStoreError::CorruptEmbedding(roll_no));
                continue;
            };
            let distance = embedding.distance(&stored);
            if distance > self.tolerance {
                continue;
            }
            if best.as_ref().map_or(true, |(d, _)| distance < *d) {
                best = Some((distance, IdentityMatch { name, roll_no }));
            }
        }
        Ok(best.map(|(_, m)| m))
    }

    fn enroll(&self, identity: Identity) -> Result<(), IdentityStoreError> {
        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO identities (name, roll_no, embedding, snapshot_ref) VALUES (?1, ?2, ?3, ?4)",
            params![
                identity.name,
                identity.roll_no,
                identity.embedding.to_le_bytes(),
                identity.snapshot_ref,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(IdentityStoreError::DuplicateId(identity.roll_no))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, roll_no: &str) -> Result<bool, IdentityStoreError> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM identities WHERE roll_no = ?1", params![roll_no])?;
        Ok(removed > 0)
    }

    fn contains(&self, roll_no: &str) -> Result<bool, IdentityStoreError> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM identities WHERE roll_no = ?1",
                params![roll_no],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn record(&self, roll_no: &str) -> Result<Option<IdentityRecord>, IdentityStoreError> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT name, roll_no, snapshot_ref FROM identities WHERE roll_no = ?1",
                params![roll_no],
                |row| {
                    Ok(IdentityRecord {
                        name: row.get(0)?,
                        roll_no: row.get(1)?,
                        snapshot_ref: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn attach_snapshot(&self, roll_no: &str, snapshot_ref: &str) -> Result<bool, IdentityStoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE identities SET snapshot_ref = ?1 WHERE roll_no = ?2 AND snapshot_ref IS NULL",
            params![snapshot_ref, roll_no],
        )?;
        Ok(changed > 0)
    }

    fn list(&self) -> Result<Vec<IdentityRecord>, IdentityStoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT name, roll_no, snapshot_ref FROM identities ORDER BY name, roll_no")?;
        let rows = stmt.query_map([], |row| {
            Ok(IdentityRecord {
                name: row.get(0)?,
                roll_no: row.get(1)?,
                snapshot_ref: row.get(2)?,
            })
        })?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn count(&self) -> Result<usize, IdentityStoreError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}
