//! Friend directory - CRUD operations for persisted friend records
//!
//! Writes are idempotent: records are keyed by user id, and rewriting the
//! same id overwrites in place while keeping the original insertion
//! timestamp, so listing order stays stable across duplicate completions.

use redb::{ReadableTable, TableDefinition};

use crate::error::ChatError;
use crate::identity::UserId;
use crate::types::FriendRecord;

use super::Storage;

/// Table for friend records (key: user id string, value: serialized FriendRecord)
pub(crate) const FRIENDS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("friends");

impl Storage {
    /// Save a friend record.
    ///
    /// Overwrites any existing record with the same user id; the original
    /// `added_at` is preserved so a retransmitted completion does not
    /// reorder the directory. The write is committed before returning, so
    /// a subsequent `get_friend` on this device always sees it.
    pub fn put_friend(&self, record: &FriendRecord) -> Result<(), ChatError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(FRIENDS_TABLE)?;

            let mut record = record.clone();
            if let Some(existing) = table.get(record.user_id.as_str())? {
                let existing: FriendRecord = postcard::from_bytes(existing.value())
                    .map_err(|e| ChatError::Serialization(e.to_string()))?;
                record.added_at = existing.added_at;
            }

            let serialized = postcard::to_allocvec(&record)
                .map_err(|e| ChatError::Serialization(e.to_string()))?;
            table.insert(record.user_id.as_str(), serialized.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load a friend record by user id.
    ///
    /// Returns `None` if no record exists for the given id.
    pub fn get_friend(&self, user_id: &UserId) -> Result<Option<FriendRecord>, ChatError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(FRIENDS_TABLE)?;

        match table.get(user_id.as_str())? {
            Some(data) => {
                let record: FriendRecord = postcard::from_bytes(data.value())
                    .map_err(|e| ChatError::Serialization(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List all friends in insertion order
    pub fn list_friends(&self) -> Result<Vec<FriendRecord>, ChatError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(FRIENDS_TABLE)?;

        let mut friends = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let record: FriendRecord = postcard::from_bytes(value.value())
                .map_err(|e| ChatError::Serialization(e.to_string()))?;
            friends.push(record);
        }

        // redb iterates in key order; the directory contract is insertion order
        friends.sort_by(|a, b| {
            a.added_at
                .cmp(&b.added_at)
                .then_with(|| a.user_id.as_str().cmp(b.user_id.as_str()))
        });

        Ok(friends)
    }

    /// Delete a friend record by user id.
    ///
    /// Returns `Ok(())` even if the record doesn't exist.
    pub fn delete_friend(&self, user_id: &UserId) -> Result<(), ChatError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(FRIENDS_TABLE)?;
            table.remove(user_id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Keypair;
    use crate::types::{Language, UserProfile};
    use tempfile::tempdir;

    fn test_record(nickname: &str, added_at: i64) -> FriendRecord {
        FriendRecord {
            user_id: Keypair::generate().user_id(),
            friend_token: format!("babel-friend:{}", nickname),
            profile: UserProfile::new(nickname, Language::English),
            added_at,
        }
    }

    fn test_storage() -> (Storage, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let storage = Storage::new(temp_dir.path().join("test.db")).unwrap();
        (storage, temp_dir)
    }

    #[test]
    fn test_put_and_get_friend() {
        let (storage, _temp) = test_storage();

        let record = test_record("Mina", 100);
        storage.put_friend(&record).unwrap();

        let loaded = storage.get_friend(&record.user_id).unwrap().unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn test_get_nonexistent_friend() {
        let (storage, _temp) = test_storage();

        let unknown = Keypair::generate().user_id();
        assert!(storage.get_friend(&unknown).unwrap().is_none());
    }

    #[test]
    fn test_put_is_idempotent_overwrite() {
        let (storage, _temp) = test_storage();

        let mut record = test_record("Mina", 100);
        storage.put_friend(&record).unwrap();

        // A second completion for the same friend rewrites the record
        record.profile.nickname = "Mina Updated".to_string();
        record.added_at = 999;
        storage.put_friend(&record).unwrap();

        let friends = storage.list_friends().unwrap();
        assert_eq!(friends.len(), 1, "Overwrite must never duplicate");
        assert_eq!(friends[0].profile.nickname, "Mina Updated");
        // First insertion time wins
        assert_eq!(friends[0].added_at, 100);
    }

    #[test]
    fn test_list_friends_insertion_order() {
        let (storage, _temp) = test_storage();

        let first = test_record("First", 10);
        let second = test_record("Second", 20);
        let third = test_record("Third", 30);

        // Insert out of order; listing follows insertion timestamps
        storage.put_friend(&second).unwrap();
        storage.put_friend(&third).unwrap();
        storage.put_friend(&first).unwrap();

        let names: Vec<String> = storage
            .list_friends()
            .unwrap()
            .into_iter()
            .map(|r| r.profile.nickname)
            .collect();
        assert_eq!(names, vec!["First", "Second", "Third"]);
    }

    #[test]
    fn test_delete_friend() {
        let (storage, _temp) = test_storage();

        let record = test_record("Mina", 100);
        storage.put_friend(&record).unwrap();
        assert!(storage.get_friend(&record.user_id).unwrap().is_some());

        storage.delete_friend(&record.user_id).unwrap();
        assert!(storage.get_friend(&record.user_id).unwrap().is_none());

        // Deleting again is a no-op
        storage.delete_friend(&record.user_id).unwrap();
    }
}
