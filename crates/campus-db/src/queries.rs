use crate::models::{AccountRow, AdminRow};
use crate::{Database, sql_datetime};
use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use rusqlite::Connection;

impl Database {
    // -- Accounts --

    pub fn create_account(&self, id: i64, email: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO accounts (id, email) VALUES (?1, ?2)",
                (id, email),
            )?;
            Ok(())
        })
    }

    pub fn get_account(&self, id: i64) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account_by_id(conn, id))
    }

    pub fn find_account_by_email(&self, email: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, email, sign, confirmed, date_created FROM accounts WHERE email = ?1",
            )?;
            stmt.query_row([email], account_from_row).optional()
        })
    }

    pub fn set_account_signature(&self, id: i64, sign: &str) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute("UPDATE accounts SET sign = ?1 WHERE id = ?2", (sign, id))?;
            if changed == 0 {
                bail!("no account with id {}", id);
            }
            Ok(())
        })
    }

    pub fn mark_account_confirmed(&self, id: i64) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute("UPDATE accounts SET confirmed = 1 WHERE id = ?1", [id])?;
            if changed == 0 {
                bail!("no account with id {}", id);
            }
            Ok(())
        })
    }

    pub fn delete_account(&self, id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM accounts WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    /// Ids of unconfirmed accounts created before `cutoff`.
    pub fn stale_unconfirmed_accounts(&self, cutoff: DateTime<Utc>) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM accounts WHERE confirmed = 0 AND date_created < ?1",
            )?;
            let ids = stmt
                .query_map([sql_datetime(cutoff)], |row| row.get::<_, i64>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    // -- Admins --

    pub fn create_admin(&self, id: i64, login: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("INSERT INTO admins (id, login) VALUES (?1, ?2)", (id, login))?;
            Ok(())
        })
    }

    pub fn get_admin(&self, id: i64) -> Result<Option<AdminRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, login, sign FROM admins WHERE id = ?1")?;
            stmt.query_row([id], |row| {
                Ok(AdminRow {
                    id: row.get(0)?,
                    login: row.get(1)?,
                    sign: row.get(2)?,
                })
            })
            .optional()
        })
    }

    pub fn set_admin_signature(&self, id: i64, sign: &str) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute("UPDATE admins SET sign = ?1 WHERE id = ?2", (sign, id))?;
            if changed == 0 {
                bail!("no admin with id {}", id);
            }
            Ok(())
        })
    }

    // -- Chat membership --

    pub fn add_chat_member(&self, chat_id: i64, account_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO chat_members (chat_id, account_id) VALUES (?1, ?2)",
                (chat_id, account_id),
            )?;
            Ok(())
        })
    }

    pub fn is_chat_member(&self, chat_id: i64, account_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM chat_members WHERE chat_id = ?1 AND account_id = ?2",
                    (chat_id, account_id),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn remove_chat_members(&self, chat_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM chat_members WHERE chat_id = ?1", [chat_id])?;
            Ok(())
        })
    }
}

fn query_account_by_id(conn: &Connection, id: i64) -> Result<Option<AccountRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, email, sign, confirmed, date_created FROM accounts WHERE id = ?1",
    )?;
    stmt.query_row([id], account_from_row).optional()
}

fn account_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<AccountRow, rusqlite::Error> {
    Ok(AccountRow {
        id: row.get(0)?,
        email: row.get(1)?,
        sign: row.get(2)?,
        confirmed: row.get(3)?,
        date_created: row.get(4)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
