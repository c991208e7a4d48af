use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immutable record of a conversation log, stored as a single JSON
/// line using the wire format's compact field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "i")]
    pub id: u64,
    #[serde(rename = "s")]
    pub sender: i64,
    #[serde(rename = "t", default)]
    pub text: String,
    #[serde(rename = "m", default)]
    pub media: Vec<i64>,
    #[serde(rename = "d")]
    pub date: DateTime<Utc>,
    /// Carried by the format but never set; edit operations are not
    /// implemented for append-only storage.
    #[serde(rename = "e", default)]
    pub edited: bool,
    #[serde(rename = "r", default)]
    pub removed: bool,
}
