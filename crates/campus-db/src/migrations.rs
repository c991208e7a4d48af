use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS accounts (
            id            INTEGER PRIMARY KEY,
            email         TEXT NOT NULL UNIQUE,
            sign          TEXT NOT NULL DEFAULT '',
            confirmed     INTEGER NOT NULL DEFAULT 0,
            date_created  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_accounts_confirmed
            ON accounts(confirmed, date_created);

        CREATE TABLE IF NOT EXISTS admins (
            id      INTEGER PRIMARY KEY,
            login   TEXT NOT NULL UNIQUE,
            sign    TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS chat_members (
            chat_id     INTEGER NOT NULL,
            account_id  INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            PRIMARY KEY (chat_id, account_id)
        );

        CREATE TABLE IF NOT EXISTS links (
            url           TEXT PRIMARY KEY,
            action        TEXT NOT NULL,
            target        INTEGER NOT NULL,
            date_expired  TEXT,
            use_limit     INTEGER,
            count_used    INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_links_action_target
            ON links(action, target);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
