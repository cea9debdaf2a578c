use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, TransactionBehavior};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::init_db;
use crate::error::{KeyError, Result};
use crate::types::ExtensionKey;

/// Persistence seam for extension keys.
pub trait KeyStore: Send + Sync {
    /// Deactivate every key of the owner and store `token` as the only
    /// active one, atomically.
    fn rotate(&self, owner_id: &str, author_id: &str, token: &str) -> Result<ExtensionKey>;

    fn active(&self, owner_id: &str) -> Result<Option<ExtensionKey>>;

    /// Every key ever issued to the owner, oldest first.
    fn history(&self, owner_id: &str) -> Result<Vec<ExtensionKey>>;
}

pub struct SqliteKeyStore {
    db: Mutex<Connection>,
}

impl SqliteKeyStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }
}

const KEY_SELECT_SQL: &str =
    "SELECT id, owner_id, author_id, token, issued_at, is_active FROM extension_keys";

impl KeyStore for SqliteKeyStore {
    #[instrument(skip(self, token))]
    fn rotate(&self, owner_id: &str, author_id: &str, token: &str) -> Result<ExtensionKey> {
        let key = new_key(owner_id, author_id, token);
        let mut db = self.db.lock().unwrap();
        // IMMEDIATE takes the write lock up front so concurrent rotations
        // from other connections serialize instead of failing at commit.
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let retired = tx.execute(
            "UPDATE extension_keys SET is_active = 0 WHERE owner_id = ?1 AND is_active = 1",
            params![owner_id],
        )?;
        tx.execute(
            "INSERT INTO extension_keys (id, owner_id, author_id, token, issued_at, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, 1)",
            params![
                key.id,
                key.owner_id,
                key.author_id,
                key.token,
                key.issued_at.to_rfc3339_opts(SecondsFormat::Micros, true)
            ],
        )?;
        tx.commit()?;
        info!(key_id = %key.id, retired, "extension key rotated");
        Ok(key)
    }

    fn active(&self, owner_id: &str) -> Result<Option<ExtensionKey>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            &format!("{KEY_SELECT_SQL} WHERE owner_id = ?1 AND is_active = 1"),
            params![owner_id],
            row_to_key,
        ) {
            Ok(k) => Ok(Some(k)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(KeyError::Database(e)),
        }
    }

    fn history(&self, owner_id: &str) -> Result<Vec<ExtensionKey>> {
        let db = self.db.lock().unwrap();
        let mut stmt =
            db.prepare(&format!("{KEY_SELECT_SQL} WHERE owner_id = ?1 ORDER BY issued_at, id"))?;
        let rows = stmt
            .query_map(params![owner_id], row_to_key)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn new_key(owner_id: &str, author_id: &str, token: &str) -> ExtensionKey {
    ExtensionKey {
        id: Uuid::now_v7().to_string(),
        owner_id: owner_id.to_string(),
        author_id: author_id.to_string(),
        token: token.to_string(),
        issued_at: Utc::now().trunc_subsecs(6),
        is_active: true,
    }
}

fn row_to_key(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExtensionKey> {
    let issued_raw: String = row.get(4)?;
    let issued_at = DateTime::parse_from_rfc3339(&issued_raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;
    Ok(ExtensionKey {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        author_id: row.get(2)?,
        token: row.get(3)?,
        issued_at,
        is_active: row.get::<_, i32>(5)? != 0,
    })
}

/// In-process key store with the same single-active-key rule.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: Mutex<HashMap<String, Vec<ExtensionKey>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn rotate(&self, owner_id: &str, author_id: &str, token: &str) -> Result<ExtensionKey> {
        let key = new_key(owner_id, author_id, token);
        let mut keys = self.keys.lock().unwrap();
        let history = keys.entry(owner_id.to_string()).or_default();
        for k in history.iter_mut() {
            k.is_active = false;
        }
        history.push(key.clone());
        Ok(key)
    }

    fn active(&self, owner_id: &str) -> Result<Option<ExtensionKey>> {
        Ok(self
            .keys
            .lock()
            .unwrap()
            .get(owner_id)
            .and_then(|h| h.iter().find(|k| k.is_active).cloned()))
    }

    fn history(&self, owner_id: &str) -> Result<Vec<ExtensionKey>> {
        Ok(self
            .keys
            .lock()
            .unwrap()
            .get(owner_id)
            .cloned()
            .unwrap_or_default())
    }
}
