use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A registered bot user. Created on first registration; never deleted
/// by this layer. `chat_id` is the Telegram conversation id and acts as
/// the natural key for find-or-create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub username: String,
    pub chat_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub login_time: Option<DateTime<Utc>>,
    pub logout_time: Option<DateTime<Utc>>,
}

/// A user-submitted post. Immutable once created. May belong to a
/// student, an admin, both, or neither — ownership is not exclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tweet {
    pub id: i64,
    pub chat_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub content: String,
    /// Free-text timestamp supplied by the caller, stored verbatim.
    pub postage_date: String,
    pub student_id: Option<i64>,
    pub admin_id: Option<i64>,
}

/// The administrator record. The table is intended to hold a single
/// logically meaningful row, keyed by a fixed singleton key rather than
/// a magic row id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub id: i64,
    pub telegram_chat_id: i64,
    pub username: String,
    pub email: String,
    pub phone_number: i64,
    pub role: String,
    pub expiration: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// A request an admin has approved. Created once per approval event,
/// immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovedRequest {
    pub id: i64,
    pub chat_id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub content: String,
    pub admin_id: Option<i64>,
}
