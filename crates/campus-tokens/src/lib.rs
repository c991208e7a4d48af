//! Single- and limited-use action tokens.
//!
//! A token grants permission to perform one specific action on one target
//! entity, bounded by an optional use limit and an optional expiry. The
//! registry's contract ends at "this token is currently valid and one use
//! of it has been recorded"; what the action means for its target is the
//! calling workflow's business.

pub mod registry;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use registry::TokenRegistry;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token not found")]
    NotFound,
    #[error("token has expired")]
    Expired,
    #[error("token use limit reached")]
    Overused,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// What a token authorizes. Stored as text in the `links.action` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenAction {
    VerifyEmail,
    JoinGroup,
    JoinChat,
}

impl TokenAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenAction::VerifyEmail => "verify-email",
            TokenAction::JoinGroup => "join-group",
            TokenAction::JoinChat => "join-chat",
        }
    }
}

impl FromStr for TokenAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verify-email" => Ok(TokenAction::VerifyEmail),
            "join-group" => Ok(TokenAction::JoinGroup),
            "join-chat" => Ok(TokenAction::JoinChat),
            other => Err(anyhow::anyhow!("unknown token action: {}", other)),
        }
    }
}

impl fmt::Display for TokenAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionToken {
    pub url: String,
    pub action: TokenAction,
    pub target: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub use_limit: Option<u32>,
    pub use_count: u32,
}

/// Result of consuming one use of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redemption {
    pub action: TokenAction,
    pub target: i64,
}
