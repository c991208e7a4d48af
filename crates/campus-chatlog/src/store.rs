use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::anyhow;
use async_stream::try_stream;
use chrono::Utc;
use futures_util::{Stream, TryStreamExt};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

use campus_db::Database;

use crate::{ChatLogError, LogEntry};

/// Read-only capability check plus the purge hook used when a conversation
/// is destroyed. Membership itself is owned by the account subsystem.
pub trait MembershipProvider {
    fn is_member(&self, chat_id: i64, account_id: i64) -> anyhow::Result<bool>;
    fn purge(&self, chat_id: i64) -> anyhow::Result<()>;
}

impl MembershipProvider for Database {
    fn is_member(&self, chat_id: i64, account_id: i64) -> anyhow::Result<bool> {
        self.is_chat_member(chat_id, account_id)
    }

    fn purge(&self, chat_id: i64) -> anyhow::Result<()> {
        self.remove_chat_members(chat_id)
    }
}

impl<M: MembershipProvider> MembershipProvider for Arc<M> {
    fn is_member(&self, chat_id: i64, account_id: i64) -> anyhow::Result<bool> {
        (**self).is_member(chat_id, account_id)
    }

    fn purge(&self, chat_id: i64) -> anyhow::Result<()> {
        (**self).purge(chat_id)
    }
}

/// Manages the on-disk conversation logs under one directory.
///
/// Each conversation is stored as a single flat file at
/// `{dir}/{chat_id}.chat`. Appends to one conversation hold that
/// conversation's lock for the whole read-ids-then-append sequence.
pub struct ChatLogs<M> {
    dir: PathBuf,
    membership: M,
    locks: StdMutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl<M: MembershipProvider> ChatLogs<M> {
    pub async fn open(dir: impl Into<PathBuf>, membership: M) -> Result<Self, ChatLogError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        info!("Conversation log directory: {}", dir.display());
        Ok(Self {
            dir,
            membership,
            locks: StdMutex::new(HashMap::new()),
        })
    }

    fn log_path(&self, chat_id: i64) -> PathBuf {
        self.dir.join(format!("{chat_id}.chat"))
    }

    fn chat_lock(&self, chat_id: i64) -> Result<Arc<AsyncMutex<()>>, ChatLogError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| ChatLogError::Store(anyhow!("lock table poisoned: {e}")))?;
        Ok(locks.entry(chat_id).or_default().clone())
    }

    async fn open_log(&self, chat_id: i64) -> Result<fs::File, ChatLogError> {
        match fs::File::open(self.log_path(chat_id)).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ChatLogError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Create an empty backing log for a new conversation.
    pub async fn create(&self, chat_id: i64) -> Result<(), ChatLogError> {
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.log_path(chat_id))
            .await
        {
            Ok(_) => {
                info!(chat_id, "conversation log created");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(ChatLogError::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    /// Append one entry, assigning the next id in the log.
    ///
    /// Holds the conversation's lock across the id scan and the write, so
    /// concurrent senders to the same conversation cannot collide on an id.
    pub async fn append(
        &self,
        chat_id: i64,
        sender: i64,
        text: String,
        media: Vec<i64>,
    ) -> Result<LogEntry, ChatLogError> {
        let lock = self.chat_lock(chat_id)?;
        let _guard = lock.lock().await;

        let path = self.log_path(chat_id);
        if let Err(e) = fs::metadata(&path).await {
            return Err(if e.kind() == ErrorKind::NotFound {
                ChatLogError::NotFound
            } else {
                e.into()
            });
        }
        if !self.membership.is_member(chat_id, sender)? {
            return Err(ChatLogError::SenderNotMember);
        }

        let id = self.tail_id(chat_id).await? + 1;
        let entry = LogEntry {
            id,
            sender,
            text,
            media,
            date: Utc::now(),
            edited: false,
            removed: false,
        };

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        let mut file = fs::OpenOptions::new().append(true).open(&path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        Ok(entry)
    }

    /// Look up a single entry by id.
    pub async fn get(&self, chat_id: i64, id: u64) -> Result<LogEntry, ChatLogError> {
        let file = self.open_log(chat_id).await?;
        let mut lines = BufReader::new(file).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let entry: LogEntry = serde_json::from_str(&line)?;
            if entry.id == id {
                return Ok(entry);
            }
        }
        Err(ChatLogError::EntryNotFound)
    }

    /// Lazy forward iteration in append order. Each call starts a fresh
    /// scan; a reader racing an append may or may not see the new tail.
    pub fn entries(
        &self,
        chat_id: i64,
    ) -> impl Stream<Item = Result<LogEntry, ChatLogError>> + '_ {
        try_stream! {
            let file = self.open_log(chat_id).await?;
            let mut lines = BufReader::new(file).lines();
            while let Some(line) = lines.next_line().await? {
                if line.trim().is_empty() {
                    continue;
                }
                let entry: LogEntry = serde_json::from_str(&line)?;
                yield entry;
            }
        }
    }

    pub async fn row_count(&self, chat_id: i64) -> Result<u64, ChatLogError> {
        self.entries(chat_id)
            .try_fold(0u64, |count, _| async move { Ok(count + 1) })
            .await
    }

    /// Delete the backing log and every membership row for the
    /// conversation. Irreversible.
    pub async fn destroy(&self, chat_id: i64) -> Result<(), ChatLogError> {
        let lock = self.chat_lock(chat_id)?;
        let _guard = lock.lock().await;

        match fs::remove_file(self.log_path(chat_id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(ChatLogError::NotFound),
            Err(e) => return Err(e.into()),
        }
        self.membership.purge(chat_id)?;

        if let Ok(mut locks) = self.locks.lock() {
            locks.remove(&chat_id);
        }
        info!(chat_id, "conversation log destroyed");
        Ok(())
    }

    // Highest id currently in the log, 0 when empty.
    async fn tail_id(&self, chat_id: i64) -> Result<u64, ChatLogError> {
        self.entries(chat_id)
            .try_fold(0u64, |max, entry| async move { Ok(max.max(entry.id)) })
            .await
    }
}
