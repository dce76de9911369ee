//! Error types for the babelchat core

use thiserror::Error;

/// Main error type for babelchat operations
#[derive(Error, Debug)]
pub enum ChatError {
    /// Invite credential is malformed, unsigned, or unparseable
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// Invite credential carries a valid signature but is past its expiry
    #[error("Credential expired: {0}")]
    ExpiredCredential(String),

    /// Failed to establish a channel to the remote peer
    #[error("Connect error: {0}")]
    Connect(String),

    /// Failed to deliver a message on an established channel
    #[error("Send error: {0}")]
    Send(String),

    /// Self-connect or identity mismatch during the exchange
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The expiry timer fired before the handshake completed
    #[error("Handshake expired: {0}")]
    HandshakeExpired(String),

    /// Error during storage operations (redb)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Identity-related error (keys, signatures, user ids)
    #[error("Identity error: {0}")]
    Identity(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Friend was not found in storage
    #[error("Friend not found: {0}")]
    FriendNotFound(String),

    /// Invalid operation for current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Result type alias using ChatError
pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChatError::Unauthorized("self connect".to_string());
        assert_eq!(format!("{}", err), "Unauthorized: self connect");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let chat_err: ChatError = io_err.into();
        assert!(matches!(chat_err, ChatError::Io(_)));
    }
}
