/// Database row types — these map directly to SQLite rows.
/// The signable principals carry their current session signature inline;
/// `date_created` keeps the storage format (see `sql_datetime`).

pub struct AccountRow {
    pub id: i64,
    pub email: String,
    pub sign: String,
    pub confirmed: bool,
    pub date_created: String,
}

pub struct AdminRow {
    pub id: i64,
    pub login: String,
    pub sign: String,
}
