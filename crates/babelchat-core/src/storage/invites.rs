//! Issued-invite tracking
//!
//! The host records every credential it issues; an inbound identity request
//! is only honored when its credential id appears here and the stored
//! expiry has not passed. There is no single-use invalidation: the record
//! stays until expiry or an explicit delete, so a second holder of the same
//! unexpired link can still complete a handshake.

use redb::{ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::invite::InviteCredential;
use crate::types::Language;

use super::Storage;

/// Table for issued invites (key: hex credential id, value: serialized IssuedInvite)
pub(crate) const ISSUED_INVITES_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("issued_invites");

/// Host-side record of an invite this node issued and still honors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedInvite {
    /// Credential id the guest's request must carry
    pub credential_id: [u8; 16],
    /// Language the invite offered the guest
    pub guest_language: Language,
    /// Unix timestamp of issuance
    pub issued_at: i64,
    /// Unix timestamp after which requests are ignored
    pub expires_at: i64,
}

impl IssuedInvite {
    /// Capture the host-side record for a freshly issued credential
    pub fn from_credential(credential: &InviteCredential) -> Self {
        Self {
            credential_id: credential.credential_id,
            guest_language: credential.guest_language,
            issued_at: credential.issued_at,
            expires_at: credential.expires_at,
        }
    }

    /// Whether the invite is expired at `now` (boundary counts as expired)
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

impl Storage {
    /// Record an invite this host just issued
    pub fn record_issued_invite(&self, invite: &IssuedInvite) -> Result<(), ChatError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(ISSUED_INVITES_TABLE)?;
            let serialized = postcard::to_allocvec(invite)
                .map_err(|e| ChatError::Serialization(e.to_string()))?;
            let key = hex::encode(invite.credential_id);
            table.insert(key.as_str(), serialized.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load an issued invite by credential id
    ///
    /// Returns `None` when this host never issued the credential.
    pub fn load_issued_invite(
        &self,
        credential_id: &[u8; 16],
    ) -> Result<Option<IssuedInvite>, ChatError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(ISSUED_INVITES_TABLE)?;
        let key = hex::encode(credential_id);

        match table.get(key.as_str())? {
            Some(data) => {
                let invite: IssuedInvite = postcard::from_bytes(data.value())
                    .map_err(|e| ChatError::Serialization(e.to_string()))?;
                Ok(Some(invite))
            }
            None => Ok(None),
        }
    }

    /// Stop honoring an issued invite
    pub fn delete_issued_invite(&self, credential_id: &[u8; 16]) -> Result<(), ChatError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(ISSUED_INVITES_TABLE)?;
            let key = hex::encode(credential_id);
            table.remove(key.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
