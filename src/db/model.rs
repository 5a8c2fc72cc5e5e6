//! Repository-facing parameter structs and seed constants.
//!
//! Keep these focused on what the repositories need to run a query.
//! Domain entities returned by queries live in `crate::model`.

/// Fixed key for the single meaningful admin row. The upsert in
/// `ensure_admin` conflicts on this instead of a magic row id.
pub const ADMIN_SINGLETON_KEY: i64 = 1;

/// Seed values for a freshly created admin row. The remaining fields
/// come from [`crate::config::AdminConfig`] at call time.
pub const DEFAULT_ADMIN_USERNAME: &str = "studentbot_admin";
pub const DEFAULT_ADMIN_ROLE: &str = "admin";
pub const DEFAULT_ADMIN_EXPIRATION: &str = "2024-05-26";

/// Insert parameters for a tweet. A tweet may reference a student, an
/// admin, both, or neither.
#[derive(Debug, Clone)]
pub struct NewTweet<'a> {
    pub chat_id: i64,
    pub username: Option<&'a str>,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub content: &'a str,
    pub postage_date: &'a str,
    pub student_id: Option<i64>,
    pub admin_id: Option<i64>,
}
