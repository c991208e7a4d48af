use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rand::Rng;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::debug;

use campus_db::{Database, parse_sql_datetime, sql_datetime};

use crate::{ActionToken, Redemption, TokenAction, TokenError};

pub struct TokenRegistry {
    db: Arc<Database>,
}

enum RedeemOutcome {
    Redeemed(Redemption),
    Missing,
    Overused,
    Expired,
}

impl TokenRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Mint a token for `action` on `target`. A `JoinGroup` request reuses
    /// the existing un-expired token for the same target instead of minting
    /// a duplicate, so every invite for a group shares one URL.
    pub fn issue(
        &self,
        action: TokenAction,
        target: i64,
        expires_at: Option<DateTime<Utc>>,
        use_limit: Option<u32>,
    ) -> Result<ActionToken, TokenError> {
        let url = generate_url();
        let now = Utc::now();
        let token = self.db.with_conn(|conn| {
            if action == TokenAction::JoinGroup {
                if let Some(existing) = query_live_by_target(conn, action, target, now)? {
                    return Ok(existing);
                }
            }
            conn.execute(
                "INSERT INTO links (url, action, target, date_expired, use_limit) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    url,
                    action.as_str(),
                    target,
                    expires_at.map(sql_datetime),
                    use_limit
                ],
            )?;
            Ok(ActionToken {
                url: url.clone(),
                action,
                target,
                expires_at,
                use_limit,
                use_count: 0,
            })
        })?;
        debug!(action = %token.action, target = token.target, "action token issued");
        Ok(token)
    }

    /// Consume one use. The lookup, validity checks, and counter increment
    /// run under the connection lock as one unit, so two concurrent redeems
    /// of a single-use token cannot both succeed. An invalid token is
    /// deleted on the way out.
    pub fn redeem(&self, url: &str) -> Result<Redemption, TokenError> {
        let now = Utc::now();
        let outcome = self.db.with_conn(|conn| {
            let Some(token) = query_by_url(conn, url)? else {
                return Ok(RedeemOutcome::Missing);
            };
            if let Some(limit) = token.use_limit {
                if token.use_count >= limit {
                    delete(conn, url)?;
                    return Ok(RedeemOutcome::Overused);
                }
            }
            if let Some(expires_at) = token.expires_at {
                if expires_at <= now {
                    delete(conn, url)?;
                    return Ok(RedeemOutcome::Expired);
                }
            }
            conn.execute(
                "UPDATE links SET count_used = count_used + 1 WHERE url = ?1",
                [url],
            )?;
            Ok(RedeemOutcome::Redeemed(Redemption {
                action: token.action,
                target: token.target,
            }))
        })?;

        match outcome {
            RedeemOutcome::Redeemed(redemption) => Ok(redemption),
            RedeemOutcome::Missing => Err(TokenError::NotFound),
            RedeemOutcome::Overused => {
                debug!("deleted token at its use limit");
                Err(TokenError::Overused)
            }
            RedeemOutcome::Expired => {
                debug!("deleted expired token");
                Err(TokenError::Expired)
            }
        }
    }

    /// Non-consuming lookup.
    pub fn get(&self, url: &str) -> Result<ActionToken, TokenError> {
        self.db
            .with_conn(|conn| query_by_url(conn, url))?
            .ok_or(TokenError::NotFound)
    }

    /// Explicit revocation, regardless of remaining uses or expiry.
    pub fn revoke(&self, url: &str) -> Result<(), TokenError> {
        let deleted = self.db.with_conn(|conn| delete(conn, url))?;
        if deleted == 0 {
            return Err(TokenError::NotFound);
        }
        Ok(())
    }
}

fn delete(conn: &Connection, url: &str) -> Result<usize> {
    Ok(conn.execute("DELETE FROM links WHERE url = ?1", [url])?)
}

fn query_by_url(conn: &Connection, url: &str) -> Result<Option<ActionToken>> {
    let mut stmt = conn.prepare(
        "SELECT url, action, target, date_expired, use_limit, count_used FROM links WHERE url = ?1",
    )?;
    match stmt.query_row([url], raw_token) {
        Ok(raw) => Ok(Some(token_from_raw(raw)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn query_live_by_target(
    conn: &Connection,
    action: TokenAction,
    target: i64,
    now: DateTime<Utc>,
) -> Result<Option<ActionToken>> {
    let mut stmt = conn.prepare(
        "SELECT url, action, target, date_expired, use_limit, count_used FROM links
         WHERE action = ?1 AND target = ?2 AND (date_expired IS NULL OR date_expired > ?3)
         LIMIT 1",
    )?;
    match stmt.query_row(
        rusqlite::params![action.as_str(), target, sql_datetime(now)],
        raw_token,
    ) {
        Ok(raw) => Ok(Some(token_from_raw(raw)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

type RawToken = (String, String, i64, Option<String>, Option<u32>, u32);

fn raw_token(row: &rusqlite::Row<'_>) -> std::result::Result<RawToken, rusqlite::Error> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn token_from_raw(
    (url, action, target, date_expired, use_limit, count_used): RawToken,
) -> Result<ActionToken> {
    Ok(ActionToken {
        url,
        action: action.parse()?,
        target,
        expires_at: date_expired.map(|s| parse_sql_datetime(&s)).transpose()?,
        use_limit,
        use_count: count_used,
    })
}

// Same derivation as session signatures: SHA-256 over a nanosecond
// timestamp and 32 CSPRNG bytes. 256 bits of output keeps redeemable URLs
// unguessable within any token's validity window.
fn generate_url() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let salt: [u8; 32] = rand::rng().random();

    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(salt);
    hex::encode(hasher.finalize())
}
