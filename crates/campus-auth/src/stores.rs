use std::sync::Arc;

use anyhow::Result;

use campus_db::Database;
use campus_db::models::{AccountRow, AdminRow};

/// An account record carrying its current session signature.
pub trait Signed {
    fn signature(&self) -> &str;
}

/// The account-table seam: load a signable record by id and persist a new
/// signature for it. `persist` fails if the record does not exist.
pub trait SignatureBackend {
    type Account: Signed;

    fn load(&self, account_id: i64) -> Result<Option<Self::Account>>;
    fn persist(&self, account_id: i64, signature: &str) -> Result<()>;
}

impl Signed for AccountRow {
    fn signature(&self) -> &str {
        &self.sign
    }
}

impl Signed for AdminRow {
    fn signature(&self) -> &str {
        &self.sign
    }
}

/// User-account credentials backed by the shared database.
pub struct UserSignatures {
    db: Arc<Database>,
}

impl UserSignatures {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl SignatureBackend for UserSignatures {
    type Account = AccountRow;

    fn load(&self, account_id: i64) -> Result<Option<AccountRow>> {
        self.db.get_account(account_id)
    }

    fn persist(&self, account_id: i64, signature: &str) -> Result<()> {
        self.db.set_account_signature(account_id, signature)
    }
}

/// Admin credentials live in their own table with the same contract.
pub struct AdminSignatures {
    db: Arc<Database>,
}

impl AdminSignatures {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl SignatureBackend for AdminSignatures {
    type Account = AdminRow;

    fn load(&self, account_id: i64) -> Result<Option<AdminRow>> {
        self.db.get_admin(account_id)
    }

    fn persist(&self, account_id: i64, signature: &str) -> Result<()> {
        self.db.set_admin_signature(account_id, signature)
    }
}
