use super::model::{
    NewTweet, ADMIN_SINGLETON_KEY, DEFAULT_ADMIN_EXPIRATION, DEFAULT_ADMIN_ROLE,
    DEFAULT_ADMIN_USERNAME,
};
use crate::config::AdminConfig;
use crate::model::{Admin, ApprovedRequest, Student, Tweet};
use chrono::{Datelike, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use thiserror::Error;
use tracing::instrument;

pub type Pool = SqlitePool;

/// Errors surfaced by the repository layer. Not-found is represented as
/// `Option`/empty `Vec` by the lookup operations, never as an error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("field `{field}` exceeds {max} characters")]
    FieldTooLong { field: &'static str, max: usize },
}

pub async fn init_pool(database_url: &str) -> Result<Pool, StoreError> {
    let normalized = prepare_sqlite_url(database_url);
    // WAL, stricter durability, and foreign-key enforcement, applied to
    // every pooled connection rather than a single one-off session.
    let options = SqliteConnectOptions::from_str(&normalized)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(options).await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    // Pass through non-sqlite schemes
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }

    // In-memory URLs like sqlite::memory: or sqlite::memory:?cache=shared
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    // Strip prefix and optional //
    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    // Separate query string if any
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        // nothing to normalize
        return url.to_string();
    }

    // Expand leading ~/ to HOME
    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    // Ensure parent directory exists if any
    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    // Rebuild URL, prefer sqlite:// form
    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

/// Apply schema migrations. Safe to call on every startup; does nothing
/// when the schema is already current.
pub async fn run_migrations(pool: &Pool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Reject values longer than the column's advisory limit before they
/// reach storage.
fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), StoreError> {
    if value.chars().count() > max {
        return Err(StoreError::FieldTooLong { field, max });
    }
    Ok(())
}

const STUDENT_COLUMNS: &str =
    "id, username, chat_id, first_name, last_name, login_time, logout_time";

fn map_student(row: &SqliteRow) -> Student {
    Student {
        id: row.get("id"),
        username: row.get("username"),
        chat_id: row.get("chat_id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        login_time: row.get("login_time"),
        logout_time: row.get("logout_time"),
    }
}

/// Find a student by `chat_id`, inserting one if absent. The insert sets
/// `login_time` to now and leaves `logout_time` unset. An existing row is
/// returned unchanged even when the supplied names differ from the stored
/// ones: first write wins. The unique index on `chat_id` makes the upsert
/// atomic, so concurrent first registrations cannot both insert.
#[instrument(skip_all)]
pub async fn create_or_get_student(
    pool: &Pool,
    username: &str,
    chat_id: i64,
    first_name: &str,
    last_name: &str,
) -> Result<Student, StoreError> {
    check_len("username", username, 50)?;
    check_len("first_name", first_name, 50)?;
    check_len("last_name", last_name, 50)?;

    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO students (username, chat_id, first_name, last_name, login_time) \
         VALUES (?, ?, ?, ?, ?) ON CONFLICT(chat_id) DO NOTHING",
    )
    .bind(username)
    .bind(chat_id)
    .bind(first_name)
    .bind(last_name)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;
    let row = sqlx::query(&format!(
        "SELECT {STUDENT_COLUMNS} FROM students WHERE chat_id = ?"
    ))
    .bind(chat_id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(map_student(&row))
}

#[instrument(skip_all)]
pub async fn get_student_by_chat_id(
    pool: &Pool,
    chat_id: i64,
) -> Result<Option<Student>, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {STUDENT_COLUMNS} FROM students WHERE chat_id = ?"
    ))
    .bind(chat_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(map_student))
}

/// Stamp the student's `logout_time` with the current UTC time. A second
/// call overwrites the first; there is no double-logout guard.
#[instrument(skip_all)]
pub async fn record_logout(pool: &Pool, student_id: i64) -> Result<(), StoreError> {
    sqlx::query("UPDATE students SET logout_time = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(student_id)
        .execute(pool)
        .await?;
    Ok(())
}

const TWEET_COLUMNS: &str =
    "id, chat_id, username, first_name, last_name, content, postage_date, student_id, admin_id";

fn map_tweet(row: &SqliteRow) -> Tweet {
    Tweet {
        id: row.get("id"),
        chat_id: row.get("chat_id"),
        username: row.get("username"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        content: row.get("content"),
        postage_date: row.get("postage_date"),
        student_id: row.get("student_id"),
        admin_id: row.get("admin_id"),
    }
}

/// Unconditional insert; no existence check, no dedup. Dangling
/// `student_id`/`admin_id` references are rejected by the foreign keys.
#[instrument(skip_all)]
pub async fn create_tweet(pool: &Pool, tweet: &NewTweet<'_>) -> Result<Tweet, StoreError> {
    if let Some(username) = tweet.username {
        check_len("username", username, 50)?;
    }
    check_len("first_name", tweet.first_name, 200)?;
    check_len("last_name", tweet.last_name, 200)?;
    check_len("content", tweet.content, 200)?;
    check_len("postage_date", tweet.postage_date, 100)?;

    let row = sqlx::query(&format!(
        "INSERT INTO tweets (chat_id, username, first_name, last_name, content, postage_date, student_id, admin_id) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {TWEET_COLUMNS}"
    ))
    .bind(tweet.chat_id)
    .bind(tweet.username)
    .bind(tweet.first_name)
    .bind(tweet.last_name)
    .bind(tweet.content)
    .bind(tweet.postage_date)
    .bind(tweet.student_id)
    .bind(tweet.admin_id)
    .fetch_one(pool)
    .await?;
    Ok(map_tweet(&row))
}

/// Exact-match lookup on all four identity fields. `username IS ?` keeps
/// the match null-safe: a tweet stored without a username is found only
/// when the caller passes `None`.
#[instrument(skip_all)]
pub async fn find_tweets_by_user(
    pool: &Pool,
    chat_id: i64,
    username: Option<&str>,
    first_name: &str,
    last_name: &str,
) -> Result<Vec<Tweet>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {TWEET_COLUMNS} FROM tweets \
         WHERE chat_id = ? AND username IS ? AND first_name = ? AND last_name = ?"
    ))
    .bind(chat_id)
    .bind(username)
    .bind(first_name)
    .bind(last_name)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(map_tweet).collect())
}

/// The most recently created tweet (highest id), if any exist.
#[instrument(skip_all)]
pub async fn latest_tweet(pool: &Pool) -> Result<Option<Tweet>, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {TWEET_COLUMNS} FROM tweets ORDER BY id DESC LIMIT 1"
    ))
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(map_tweet))
}

const ADMIN_COLUMNS: &str =
    "id, telegram_chat_id, username, email, phone_number, role, expiration, created_at";

fn map_admin(row: &SqliteRow) -> Admin {
    Admin {
        id: row.get("id"),
        telegram_chat_id: row.get("telegram_chat_id"),
        username: row.get("username"),
        email: row.get("email"),
        phone_number: row.get("phone_number"),
        role: row.get("role"),
        expiration: row.get("expiration"),
        created_at: row.get("created_at"),
    }
}

/// Return the singleton admin row, creating it from `cfg` plus the fixed
/// defaults if it does not exist yet. The upsert conflicts on the
/// singleton key, so concurrent first calls insert exactly once. An
/// existing row is returned unchanged even if `cfg` has since changed.
#[instrument(skip_all)]
pub async fn ensure_admin(pool: &Pool, cfg: &AdminConfig) -> Result<Admin, StoreError> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO admins (singleton_key, telegram_chat_id, username, email, phone_number, role, expiration) \
         VALUES (?, ?, ?, ?, ?, ?, ?) ON CONFLICT(singleton_key) DO NOTHING",
    )
    .bind(ADMIN_SINGLETON_KEY)
    .bind(cfg.telegram_chat_id)
    .bind(DEFAULT_ADMIN_USERNAME)
    .bind(&cfg.email)
    .bind(cfg.phone_number)
    .bind(DEFAULT_ADMIN_ROLE)
    .bind(DEFAULT_ADMIN_EXPIRATION)
    .execute(&mut *tx)
    .await?;
    let row = sqlx::query(&format!(
        "SELECT {ADMIN_COLUMNS} FROM admins WHERE singleton_key = ?"
    ))
    .bind(ADMIN_SINGLETON_KEY)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(map_admin(&row))
}

#[instrument(skip_all)]
pub async fn get_admin_by_username(
    pool: &Pool,
    username: &str,
) -> Result<Option<Admin>, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {ADMIN_COLUMNS} FROM admins WHERE username = ?"
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(map_admin))
}

/// Monthly maintenance: remove the admin row when `today` is the 30th.
/// Months without a 30th day (February) never fire; that asymmetry is
/// inherited behavior, kept as-is. Taking the date as a parameter lets
/// callers and tests pin the clock.
#[instrument(skip_all)]
pub async fn run_monthly_expiry_check(pool: &Pool, today: NaiveDate) -> Result<(), StoreError> {
    if today.day() == 30 {
        tracing::info!(%today, "monthly expiry: removing admin");
        remove_admin(pool).await?;
    }
    Ok(())
}

/// Delete the admin row with the highest id, if any exist. With the
/// singleton key in place the table holds at most one meaningful row, so
/// this deletes that row; a later `ensure_admin` re-creates it under a
/// fresh id.
#[instrument(skip_all)]
pub async fn remove_admin(pool: &Pool) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM admins WHERE id = (SELECT MAX(id) FROM admins)")
        .execute(pool)
        .await?;
    Ok(())
}

const APPROVED_REQUEST_COLUMNS: &str =
    "id, chat_id, username, first_name, last_name, content, admin_id";

fn map_approved_request(row: &SqliteRow) -> ApprovedRequest {
    ApprovedRequest {
        id: row.get("id"),
        chat_id: row.get("chat_id"),
        username: row.get("username"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        content: row.get("content"),
        admin_id: row.get("admin_id"),
    }
}

/// Unconditional insert, one row per approval event. `admin_id` is left
/// unset at creation.
#[instrument(skip_all)]
pub async fn create_approved_request(
    pool: &Pool,
    chat_id: i64,
    username: &str,
    first_name: &str,
    last_name: &str,
    content: &str,
) -> Result<ApprovedRequest, StoreError> {
    check_len("username", username, 100)?;
    check_len("first_name", first_name, 50)?;
    check_len("last_name", last_name, 50)?;
    check_len("content", content, 5000)?;

    let row = sqlx::query(&format!(
        "INSERT INTO approved_requests (chat_id, username, first_name, last_name, content) \
         VALUES (?, ?, ?, ?, ?) RETURNING {APPROVED_REQUEST_COLUMNS}"
    ))
    .bind(chat_id)
    .bind(username)
    .bind(first_name)
    .bind(last_name)
    .bind(content)
    .fetch_one(pool)
    .await?;
    Ok(map_approved_request(&row))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_pool() -> Pool {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn admin_cfg() -> AdminConfig {
        AdminConfig {
            telegram_chat_id: 4242,
            email: "admin@example.com".into(),
            phone_number: 989120000000,
        }
    }

    #[tokio::test]
    async fn create_or_get_student_first_write_wins() {
        let pool = setup_pool().await;

        let first = create_or_get_student(&pool, "alice", 100, "A", "L")
            .await
            .unwrap();
        assert!(first.login_time.is_some());
        assert!(first.logout_time.is_none());

        // Same chat_id with different names returns the stored row unchanged.
        let second = create_or_get_student(&pool, "other", 100, "X", "Y")
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.username, "alice");

        let cnt: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(cnt, 1);
    }

    #[tokio::test]
    async fn get_student_by_chat_id_absent_is_none() {
        let pool = setup_pool().await;
        assert!(get_student_by_chat_id(&pool, 999)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn record_logout_overwrites_previous_stamp() {
        let pool = setup_pool().await;
        let student = create_or_get_student(&pool, "bob", 7, "B", "O")
            .await
            .unwrap();

        record_logout(&pool, student.id).await.unwrap();
        let first = get_student_by_chat_id(&pool, 7)
            .await
            .unwrap()
            .unwrap()
            .logout_time
            .unwrap();

        record_logout(&pool, student.id).await.unwrap();
        let second = get_student_by_chat_id(&pool, 7)
            .await
            .unwrap()
            .unwrap()
            .logout_time
            .unwrap();

        assert!(second >= first);
    }

    #[tokio::test]
    async fn student_field_limits_enforced() {
        let pool = setup_pool().await;
        let long = "x".repeat(51);
        let err = create_or_get_student(&pool, &long, 1, "A", "B")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::FieldTooLong { field: "username", max: 50 }
        ));
    }

    #[tokio::test]
    async fn find_tweets_matches_all_four_fields() {
        let pool = setup_pool().await;
        let mk = |content: &'static str| NewTweet {
            chat_id: 100,
            username: Some("alice"),
            first_name: "A",
            last_name: "L",
            content,
            postage_date: "2024-05-01 10:00",
            student_id: None,
            admin_id: None,
        };
        create_tweet(&pool, &mk("one")).await.unwrap();
        create_tweet(&pool, &mk("two")).await.unwrap();
        // Same chat, different username: must not match.
        create_tweet(
            &pool,
            &NewTweet {
                username: Some("mallory"),
                ..mk("three")
            },
        )
        .await
        .unwrap();

        let found = find_tweets_by_user(&pool, 100, Some("alice"), "A", "L")
            .await
            .unwrap();
        assert_eq!(found.len(), 2);

        let none = find_tweets_by_user(&pool, 100, Some("alice"), "A", "Z")
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn find_tweets_null_username_is_null_safe() {
        let pool = setup_pool().await;
        create_tweet(
            &pool,
            &NewTweet {
                chat_id: 5,
                username: None,
                first_name: "N",
                last_name: "U",
                content: "anon",
                postage_date: "today",
                student_id: None,
                admin_id: None,
            },
        )
        .await
        .unwrap();

        assert!(find_tweets_by_user(&pool, 5, Some("anyone"), "N", "U")
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            find_tweets_by_user(&pool, 5, None, "N", "U")
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn latest_tweet_returns_highest_id() {
        let pool = setup_pool().await;
        assert!(latest_tweet(&pool).await.unwrap().is_none());

        let base = NewTweet {
            chat_id: 1,
            username: Some("u"),
            first_name: "F",
            last_name: "L",
            content: "a",
            postage_date: "d",
            student_id: None,
            admin_id: None,
        };
        create_tweet(&pool, &base).await.unwrap();
        let b = create_tweet(&pool, &NewTweet { content: "b", ..base })
            .await
            .unwrap();

        let latest = latest_tweet(&pool).await.unwrap().unwrap();
        assert_eq!(latest.id, b.id);
        assert_eq!(latest.content, "b");
    }

    #[tokio::test]
    async fn tweet_rejects_dangling_student_reference() {
        let pool = setup_pool().await;
        let err = create_tweet(
            &pool,
            &NewTweet {
                chat_id: 1,
                username: None,
                first_name: "F",
                last_name: "L",
                content: "c",
                postage_date: "d",
                student_id: Some(999),
                admin_id: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[tokio::test]
    async fn ensure_admin_inserts_once() {
        let pool = setup_pool().await;
        let first = ensure_admin(&pool, &admin_cfg()).await.unwrap();
        assert_eq!(first.telegram_chat_id, 4242);
        assert_eq!(first.username, DEFAULT_ADMIN_USERNAME);
        assert_eq!(first.role, DEFAULT_ADMIN_ROLE);
        assert_eq!(
            first.expiration,
            NaiveDate::from_ymd_opt(2024, 5, 26).unwrap()
        );

        // A second call with different config returns the stored row.
        let other = AdminConfig {
            telegram_chat_id: 1,
            email: "new@example.com".into(),
            phone_number: 2,
        };
        let second = ensure_admin(&pool, &other).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.email, "admin@example.com");

        let cnt: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM admins")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(cnt, 1);
    }

    #[tokio::test]
    async fn get_admin_by_username_lookup() {
        let pool = setup_pool().await;
        ensure_admin(&pool, &admin_cfg()).await.unwrap();

        assert!(get_admin_by_username(&pool, DEFAULT_ADMIN_USERNAME)
            .await
            .unwrap()
            .is_some());
        assert!(get_admin_by_username(&pool, "nobody")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn monthly_expiry_fires_only_on_the_30th() {
        let pool = setup_pool().await;
        ensure_admin(&pool, &admin_cfg()).await.unwrap();

        run_monthly_expiry_check(&pool, NaiveDate::from_ymd_opt(2024, 4, 29).unwrap())
            .await
            .unwrap();
        let cnt: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM admins")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(cnt, 1);

        run_monthly_expiry_check(&pool, NaiveDate::from_ymd_opt(2024, 4, 30).unwrap())
            .await
            .unwrap();
        let cnt: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM admins")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(cnt, 0);
    }

    #[tokio::test]
    async fn remove_admin_then_ensure_recreates() {
        let pool = setup_pool().await;
        let first = ensure_admin(&pool, &admin_cfg()).await.unwrap();

        remove_admin(&pool).await.unwrap();
        // Deleting from an empty table is a no-op.
        remove_admin(&pool).await.unwrap();

        let recreated = ensure_admin(&pool, &admin_cfg()).await.unwrap();
        assert!(recreated.id > first.id);
    }

    #[tokio::test]
    async fn create_approved_request_inserts() {
        let pool = setup_pool().await;
        let req = create_approved_request(&pool, 55, "carol", "C", "R", "please approve")
            .await
            .unwrap();
        assert_eq!(req.chat_id, 55);
        assert!(req.admin_id.is_none());

        let too_long = "y".repeat(5001);
        let err = create_approved_request(&pool, 55, "carol", "C", "R", &too_long)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::FieldTooLong { field: "content", max: 5000 }
        ));
    }
}
