// ============================================================================
// CredentialDb - Embedded Credential Store (redb)
// ============================================================================
// Durable storage of the single Twitter credential record.
// Default path: ~/.twsession/session.redb (override via TWITTER_SESSION_DB_PATH)
// ============================================================================

use anyhow::{anyhow, Result};
use redb::{backends::InMemoryBackend, Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::PersistenceError;
use crate::types::{redact, Credential};

/// Namespaced record holding the credential fields
const SESSION_RECORD: TableDefinition<&str, &[u8]> = TableDefinition::new("twitter_session");

pub const KEY_LOGGED: &str = "logged_in";
pub const KEY_OAUTH_TOKEN: &str = "oauth_token";
pub const KEY_OAUTH_SECRET: &str = "oauth_token_secret";
pub const KEY_OAUTH_USERID: &str = "oauth_token_userid";
pub const KEY_OAUTH_SCREENNAME: &str = "oauth_screen_name";

const ALL_KEYS: [&str; 5] = [
    KEY_LOGGED,
    KEY_OAUTH_TOKEN,
    KEY_OAUTH_SECRET,
    KEY_OAUTH_USERID,
    KEY_OAUTH_SCREENNAME,
];

/// Durable persistence of the credential.
///
/// `save` and `clear` are all-or-nothing. `load` yields a credential only
/// when every field is present and the user id is positive.
pub trait CredentialStore: Send + Sync {
    fn save(&self, credential: &Credential) -> Result<(), PersistenceError>;
    fn load(&self) -> Result<Option<Credential>, PersistenceError>;
    fn clear(&self) -> Result<(), PersistenceError>;
}

/// redb-backed credential store
pub struct CredentialDb {
    db: Database,
    path: Option<PathBuf>,
}

impl CredentialDb {
    /// Open (or create) the database at the given path.
    /// If `path` is None, uses TWITTER_SESSION_DB_PATH or ~/.twsession/session.redb
    pub fn open(path: Option<&str>) -> Result<Self> {
        let db_path = if let Some(p) = path {
            PathBuf::from(p)
        } else if let Ok(env_path) = std::env::var("TWITTER_SESSION_DB_PATH") {
            PathBuf::from(env_path)
        } else {
            let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
            let dir = home.join(".twsession");
            std::fs::create_dir_all(&dir)
                .map_err(|e| anyhow!("Failed to create .twsession directory: {}", e))?;
            dir.join("session.redb")
        };

        info!("Opening credential store at: {}", db_path.display());

        let db = Database::create(&db_path)
            .map_err(|e| anyhow!("Failed to open database: {}", e))?;
        Self::init(db, Some(db_path))
    }

    /// Volatile store, used by tests and throwaway sessions
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .map_err(|e| anyhow!("Failed to create in-memory database: {}", e))?;
        Self::init(db, None)
    }

    fn init(db: Database, path: Option<PathBuf>) -> Result<Self> {
        // Ensure the table exists so reads never hit a missing table
        let write_txn = db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let _ = write_txn
                .open_table(SESSION_RECORD)
                .map_err(|e| anyhow!("Failed to create session table: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        debug!("Credential store ready");
        Ok(Self { db, path })
    }

    /// Database file path, None for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn get_field<T: DeserializeOwned>(
        table: &impl ReadableTable<&'static str, &'static [u8]>,
        key: &'static str,
    ) -> Result<Option<T>, PersistenceError> {
        let Some(value) = table
            .get(key)
            .map_err(PersistenceError::storage("Failed to read credential field"))?
        else {
            return Ok(None);
        };

        match bincode::deserialize(value.value()) {
            Ok(decoded) => Ok(Some(decoded)),
            Err(e) => {
                // A corrupt field is the same as a missing one
                warn!("Unreadable credential field {}: {}", key, e);
                Ok(None)
            }
        }
    }
}

fn encode<T: serde::Serialize>(field: &'static str, value: &T) -> Result<Vec<u8>, PersistenceError> {
    bincode::serialize(value).map_err(|source| PersistenceError::Encoding { field, source })
}

impl CredentialStore for CredentialDb {
    fn save(&self, credential: &Credential) -> Result<(), PersistenceError> {
        debug!(
            "Saving credential: token={}, user_id={}, screen_name={}",
            redact(&credential.token),
            credential.user_id,
            credential.screen_name
        );

        // Encode everything up front so a failure leaves the store untouched
        let fields = [
            (KEY_OAUTH_TOKEN, encode(KEY_OAUTH_TOKEN, &credential.token)?),
            (KEY_OAUTH_SECRET, encode(KEY_OAUTH_SECRET, &credential.token_secret)?),
            (KEY_OAUTH_SCREENNAME, encode(KEY_OAUTH_SCREENNAME, &credential.screen_name)?),
            (KEY_OAUTH_USERID, encode(KEY_OAUTH_USERID, &credential.user_id)?),
            (KEY_LOGGED, encode(KEY_LOGGED, &true)?),
        ];

        let write_txn = self
            .db
            .begin_write()
            .map_err(PersistenceError::storage("Failed to begin write"))?;
        {
            let mut table = write_txn
                .open_table(SESSION_RECORD)
                .map_err(PersistenceError::storage("Failed to open session table"))?;
            for (key, value) in &fields {
                table
                    .insert(*key, value.as_slice())
                    .map_err(PersistenceError::storage("Failed to insert credential field"))?;
            }
        }
        write_txn
            .commit()
            .map_err(PersistenceError::storage("Failed to commit credential"))?;

        info!("Stored credential for @{}", credential.screen_name);
        Ok(())
    }

    fn load(&self) -> Result<Option<Credential>, PersistenceError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(PersistenceError::storage("Failed to begin read"))?;
        let table = read_txn
            .open_table(SESSION_RECORD)
            .map_err(PersistenceError::storage("Failed to open session table"))?;

        let token: Option<String> = Self::get_field(&table, KEY_OAUTH_TOKEN)?;
        let secret: Option<String> = Self::get_field(&table, KEY_OAUTH_SECRET)?;
        let screen_name: Option<String> = Self::get_field(&table, KEY_OAUTH_SCREENNAME)?;
        let user_id: i64 = Self::get_field(&table, KEY_OAUTH_USERID)?.unwrap_or(0);

        match (token, secret, screen_name) {
            (Some(token), Some(token_secret), Some(screen_name)) if user_id > 0 => {
                debug!("Loaded stored credential for user {}", user_id);
                Ok(Some(Credential {
                    token,
                    token_secret,
                    user_id,
                    screen_name,
                }))
            }
            _ => Ok(None),
        }
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(PersistenceError::storage("Failed to begin write"))?;
        let mut removed = 0;
        {
            let mut table = write_txn
                .open_table(SESSION_RECORD)
                .map_err(PersistenceError::storage("Failed to open session table"))?;
            for key in ALL_KEYS {
                if table
                    .remove(key)
                    .map_err(PersistenceError::storage("Failed to remove credential field"))?
                    .is_some()
                {
                    removed += 1;
                }
            }
        }
        write_txn
            .commit()
            .map_err(PersistenceError::storage("Failed to commit clear"))?;

        if removed > 0 {
            info!("Cleared stored credential");
        }
        Ok(())
    }
}
