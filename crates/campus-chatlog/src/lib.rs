//! Append-only message logs, one file per conversation.
//!
//! Each conversation owns a flat file of newline-delimited JSON records
//! with strictly increasing ids. Entries are never rewritten or reordered
//! after append; appends to the same conversation serialize on a
//! per-conversation lock while other conversations proceed untouched.

pub mod entry;
pub mod store;

use thiserror::Error;

pub use entry::LogEntry;
pub use store::{ChatLogs, MembershipProvider};

#[derive(Debug, Error)]
pub enum ChatLogError {
    #[error("conversation log not found")]
    NotFound,
    #[error("conversation log already exists")]
    AlreadyExists,
    #[error("sender is not a member of this conversation")]
    SenderNotMember,
    #[error("no entry with the requested id")]
    EntryNotFound,
    #[error("corrupt log record: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
