//! Background task that prunes expired or exhausted action tokens and
//! stale unconfirmed accounts.
//!
//! Runs on a fixed interval for the lifetime of the process, owned by
//! whoever spawned it and stopped through a shutdown channel. Every
//! deletion commits on its own, so a long pass never blocks unrelated
//! operations on the store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use campus_db::{Database, sql_datetime};

pub const DEFAULT_INTERVAL_SECS: u64 = 3600;

pub struct Sweeper {
    db: Arc<Database>,
    interval: Duration,
    grace: chrono::Duration,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SweepReport {
    pub tokens: usize,
    pub accounts: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.tokens + self.accounts
    }
}

impl Sweeper {
    pub fn new(db: Arc<Database>, interval: Duration) -> Self {
        Self {
            db,
            interval,
            // An account gets one hour to confirm its email.
            grace: chrono::Duration::hours(1),
        }
    }

    pub fn with_grace(mut self, grace: chrono::Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Tick until the shutdown channel fires. A failed sweep is logged and
    /// swallowed; the next tick still runs.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        info!(interval_secs = self.interval.as_secs(), "Expiry sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep() {
                        Ok(report) if report.total() > 0 => {
                            info!(
                                "Sweep: removed {} tokens, {} stale accounts",
                                report.tokens, report.accounts
                            );
                        }
                        Ok(_) => debug!("sweep found nothing to remove"),
                        Err(e) => warn!("Sweep error: {e:#}"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("Expiry sweeper stopping");
                    return;
                }
            }
        }
    }

    /// One pass over the token and account stores.
    pub fn sweep(&self) -> Result<SweepReport> {
        Ok(SweepReport {
            tokens: self.sweep_tokens()?,
            accounts: self.sweep_stale_accounts()?,
        })
    }

    fn sweep_tokens(&self) -> Result<usize> {
        let now = sql_datetime(Utc::now());
        let doomed: Vec<String> = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT url FROM links
                 WHERE (use_limit IS NOT NULL AND count_used >= use_limit)
                    OR (date_expired IS NOT NULL AND date_expired < ?1)",
            )?;
            let urls = stmt
                .query_map([now.as_str()], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(urls)
        })?;

        for url in &doomed {
            self.db.with_conn(|conn| {
                conn.execute("DELETE FROM links WHERE url = ?1", [url])?;
                Ok(())
            })?;
            debug!("token deleted: exhausted or expired");
        }

        Ok(doomed.len())
    }

    fn sweep_stale_accounts(&self) -> Result<usize> {
        let cutoff = Utc::now() - self.grace;
        let stale = self.db.stale_unconfirmed_accounts(cutoff)?;

        for id in &stale {
            self.db.delete_account(*id)?;
            debug!(account_id = *id, "account deleted: email not confirmed in time");
        }

        Ok(stale.len())
    }
}
