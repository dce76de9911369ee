//! Persistent storage using redb.
//!
//! Holds everything that must survive a restart:
//! - Friend records (the friend directory)
//! - Invite credentials this host has issued and still honors
//! - The local identity keypair and profile

use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

use crate::error::ChatError;
use crate::identity::Keypair;
use crate::types::UserProfile;

// Submodules
mod friends;
mod invites;

use friends::FRIENDS_TABLE;
use invites::ISSUED_INVITES_TABLE;

pub use invites::IssuedInvite;

// Table for local identity and profile (fixed keys)
const SESSION_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("session");

const SESSION_KEYPAIR_KEY: &str = "keypair";
const SESSION_PROFILE_KEY: &str = "profile";

/// Storage layer using redb for ACID-compliant persistence
#[derive(Clone)]
pub struct Storage {
    db: Arc<RwLock<Database>>,
}

impl Storage {
    /// Create a new storage instance at the given path.
    ///
    /// Creates the parent directory, the database file, and all tables.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, ChatError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(FRIENDS_TABLE)?;
            let _ = write_txn.open_table(ISSUED_INVITES_TABLE)?;
            let _ = write_txn.open_table(SESSION_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Local Identity
    // ═══════════════════════════════════════════════════════════════════════

    /// Persist the local keypair seed
    pub fn save_identity(&self, keypair: &Keypair) -> Result<(), ChatError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSION_TABLE)?;
            table.insert(SESSION_KEYPAIR_KEY, keypair.to_bytes().as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load the local keypair, if one was saved
    pub fn load_identity(&self) -> Result<Option<Keypair>, ChatError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(SESSION_TABLE)?;

        match table.get(SESSION_KEYPAIR_KEY)? {
            Some(data) => Ok(Some(Keypair::from_bytes(data.value())?)),
            None => Ok(None),
        }
    }

    /// Persist the local profile
    pub fn save_profile(&self, profile: &UserProfile) -> Result<(), ChatError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSION_TABLE)?;
            let serialized = postcard::to_allocvec(profile)
                .map_err(|e| ChatError::Serialization(e.to_string()))?;
            table.insert(SESSION_PROFILE_KEY, serialized.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load the local profile, if one was saved
    pub fn load_profile(&self) -> Result<Option<UserProfile>, ChatError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(SESSION_TABLE)?;

        match table.get(SESSION_PROFILE_KEY)? {
            Some(data) => {
                let profile: UserProfile = postcard::from_bytes(data.value())
                    .map_err(|e| ChatError::Serialization(e.to_string()))?;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }
}
