use crate::model::{NewSite, PublishRecord, PublishStatus, SiteUpdate, WordPressSite};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// For file-backed SQLite URLs, expand a leading `~/` and create the parent
/// directory so first startup does not fail on a missing data dir.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let expanded = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };
    if let Some(parent) = std::path::Path::new(&expanded).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{expanded}?{q}"),
        None => format!("sqlite://{expanded}"),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Site registry
// ---------------------------------------------------------------------------

fn site_from_row(row: &SqliteRow) -> Result<WordPressSite> {
    Ok(WordPressSite {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        username: row.try_get("username")?,
        app_password: row.try_get("app_password")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

#[instrument(skip_all)]
pub async fn create_site(pool: &Pool, site: &NewSite) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO sites (name, url, username, app_password, is_active) VALUES (?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&site.name)
    .bind(site.url.trim_end_matches('/'))
    .bind(&site.username)
    .bind(&site.app_password)
    .bind(site.is_active)
    .fetch_one(pool)
    .await?;
    Ok(rec.get::<i64, _>("id"))
}

#[instrument(skip_all)]
pub async fn list_sites(pool: &Pool, active_only: bool) -> Result<Vec<WordPressSite>> {
    let sql = if active_only {
        "SELECT * FROM sites WHERE is_active = 1 ORDER BY id"
    } else {
        "SELECT * FROM sites ORDER BY id"
    };
    let rows = sqlx::query(sql).fetch_all(pool).await?;
    rows.iter().map(site_from_row).collect()
}

#[instrument(skip_all)]
pub async fn get_site(pool: &Pool, id: i64) -> Result<Option<WordPressSite>> {
    let row = sqlx::query("SELECT * FROM sites WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(site_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn update_site(pool: &Pool, id: i64, update: &SiteUpdate) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE sites SET name = COALESCE(?, name), url = COALESCE(?, url), \
         username = COALESCE(?, username), app_password = COALESCE(?, app_password), \
         is_active = COALESCE(?, is_active) WHERE id = ?",
    )
    .bind(update.name.as_deref())
    .bind(update.url.as_deref().map(|u| u.trim_end_matches('/').to_string()))
    .bind(update.username.as_deref())
    .bind(update.app_password.as_deref())
    .bind(update.is_active)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip_all)]
pub async fn delete_site(pool: &Pool, id: i64) -> Result<bool> {
    let res = sqlx::query("DELETE FROM sites WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

// ---------------------------------------------------------------------------
// Publish record store
// ---------------------------------------------------------------------------

fn record_from_row(row: &SqliteRow) -> Result<PublishRecord> {
    let status_raw: String = row.try_get("status")?;
    let status = PublishStatus::parse(&status_raw)
        .ok_or_else(|| anyhow!("unknown publish status in store: {status_raw}"))?;
    Ok(PublishRecord {
        id: row.try_get("id")?,
        article_id: row.try_get("article_id")?,
        site_id: row.try_get("site_id")?,
        status,
        scheduled_time: row.try_get("scheduled_time")?,
        wordpress_post_id: row.try_get("wordpress_post_id")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Batch-create `scheduled` records, one per site, in a single transaction:
/// either every site gets a record or none do.
#[instrument(skip_all)]
pub async fn create_scheduled_records(
    pool: &Pool,
    article_id: i64,
    site_ids: &[i64],
    scheduled_time: DateTime<Utc>,
) -> Result<Vec<PublishRecord>> {
    let mut tx = pool.begin().await?;
    let mut records = Vec::with_capacity(site_ids.len());
    for site_id in site_ids {
        let row = sqlx::query(
            "INSERT INTO publish_records (article_id, site_id, status, scheduled_time) \
             VALUES (?, ?, 'scheduled', ?) RETURNING *",
        )
        .bind(article_id)
        .bind(site_id)
        .bind(scheduled_time)
        .fetch_one(&mut *tx)
        .await?;
        records.push(record_from_row(&row)?);
    }
    tx.commit().await?;
    Ok(records)
}

/// Batch-create records for the immediate-send path; these rows are born
/// `sending` since the publish starts right away.
#[instrument(skip_all)]
pub async fn create_sending_records(
    pool: &Pool,
    article_id: i64,
    site_ids: &[i64],
) -> Result<Vec<PublishRecord>> {
    let mut tx = pool.begin().await?;
    let mut records = Vec::with_capacity(site_ids.len());
    for site_id in site_ids {
        let row = sqlx::query(
            "INSERT INTO publish_records (article_id, site_id, status) \
             VALUES (?, ?, 'sending') RETURNING *",
        )
        .bind(article_id)
        .bind(site_id)
        .fetch_one(&mut *tx)
        .await?;
        records.push(record_from_row(&row)?);
    }
    tx.commit().await?;
    Ok(records)
}

/// Due records for one sweep: still `scheduled`, scheduled at or before
/// `now`, oldest first, capped at `limit`.
#[instrument(skip_all)]
pub async fn find_due(pool: &Pool, now: DateTime<Utc>, limit: i64) -> Result<Vec<PublishRecord>> {
    let rows = sqlx::query(
        "SELECT * FROM publish_records \
         WHERE status = 'scheduled' AND scheduled_time IS NOT NULL \
           AND datetime(scheduled_time) <= datetime(?) \
         ORDER BY datetime(scheduled_time) ASC LIMIT ?",
    )
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter().map(record_from_row).collect()
}

/// Claim a scheduled record for sending. Conditional on the record still
/// being `scheduled`, so when two sweeps overlap only one caller wins and
/// the loser sees `false`.
#[instrument(skip_all)]
pub async fn claim_sending(pool: &Pool, id: i64) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE publish_records SET status = 'sending' WHERE id = ? AND status = 'scheduled'",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// Terminal success transition; only valid from `sending`.
#[instrument(skip_all)]
pub async fn mark_success(pool: &Pool, id: i64, wordpress_post_id: i64) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE publish_records SET status = 'success', wordpress_post_id = ?, error_message = NULL \
         WHERE id = ? AND status = 'sending'",
    )
    .bind(wordpress_post_id)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// Terminal failure transition. Accepts `scheduled` as a prior state too:
/// the inactive-site path fails a record without claiming it first.
#[instrument(skip_all)]
pub async fn mark_failed(pool: &Pool, id: i64, message: &str) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE publish_records SET status = 'failed', error_message = ?, wordpress_post_id = NULL \
         WHERE id = ? AND status IN ('scheduled', 'sending')",
    )
    .bind(message)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// Delete a record, allowed only while it is still `scheduled`.
#[instrument(skip_all)]
pub async fn delete_record(pool: &Pool, id: i64) -> Result<bool> {
    let res = sqlx::query("DELETE FROM publish_records WHERE id = ? AND status = 'scheduled'")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip_all)]
pub async fn get_record(pool: &Pool, id: i64) -> Result<Option<PublishRecord>> {
    let row = sqlx::query("SELECT * FROM publish_records WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(record_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn list_records_for_article(pool: &Pool, article_id: i64) -> Result<Vec<PublishRecord>> {
    let rows = sqlx::query(
        "SELECT * FROM publish_records WHERE article_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(article_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(record_from_row).collect()
}

#[instrument(skip_all)]
pub async fn list_recent_records(pool: &Pool, limit: i64) -> Result<Vec<PublishRecord>> {
    let rows = sqlx::query("SELECT * FROM publish_records ORDER BY created_at DESC, id DESC LIMIT ?")
        .bind(limit)
        .fetch_all(pool)
        .await?;
    rows.iter().map(record_from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn sample_site() -> NewSite {
        NewSite {
            name: "测试站点".into(),
            url: "https://blog.example.com/".into(),
            username: "editor".into(),
            app_password: "abcd efgh ijkl".into(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn site_crud_round_trip() {
        let pool = setup_pool().await;
        let id = create_site(&pool, &sample_site()).await.unwrap();

        let site = get_site(&pool, id).await.unwrap().unwrap();
        assert_eq!(site.name, "测试站点");
        // Trailing slash is normalized away at insert time.
        assert_eq!(site.url, "https://blog.example.com");

        let updated = update_site(
            &pool,
            id,
            &SiteUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(updated);

        assert!(list_sites(&pool, true).await.unwrap().is_empty());
        assert_eq!(list_sites(&pool, false).await.unwrap().len(), 1);

        assert!(delete_site(&pool, id).await.unwrap());
        assert!(get_site(&pool, id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scheduled_batch_creates_all_records() {
        let pool = setup_pool().await;
        let s1 = create_site(&pool, &sample_site()).await.unwrap();
        let s2 = create_site(&pool, &sample_site()).await.unwrap();
        let at = Utc::now() + Duration::hours(2);

        let records = create_scheduled_records(&pool, 42, &[s1, s2], at).await.unwrap();
        assert_eq!(records.len(), 2);
        for rec in &records {
            assert_eq!(rec.status, PublishStatus::Scheduled);
            assert_eq!(rec.article_id, 42);
            assert!(rec.scheduled_time.is_some());
            assert!(rec.wordpress_post_id.is_none());
            assert!(rec.error_message.is_none());
        }
    }

    #[tokio::test]
    async fn find_due_filters_and_limits() {
        let pool = setup_pool().await;
        let site = create_site(&pool, &sample_site()).await.unwrap();
        let now = Utc::now();

        // Three past-due, one future, one already claimed.
        let due = create_scheduled_records(&pool, 1, &[site, site, site], now - Duration::minutes(5))
            .await
            .unwrap();
        create_scheduled_records(&pool, 2, &[site], now + Duration::hours(1))
            .await
            .unwrap();
        assert!(claim_sending(&pool, due[0].id).await.unwrap());

        let found = find_due(&pool, now, 10).await.unwrap();
        assert_eq!(found.len(), 2);
        for rec in &found {
            assert_eq!(rec.status, PublishStatus::Scheduled);
            assert!(rec.scheduled_time.unwrap() <= now);
        }

        let capped = find_due(&pool, now, 1).await.unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[tokio::test]
    async fn transitions_are_compare_and_set() {
        let pool = setup_pool().await;
        let site = create_site(&pool, &sample_site()).await.unwrap();
        let rec = create_scheduled_records(&pool, 7, &[site], Utc::now())
            .await
            .unwrap()
            .remove(0);

        // Only one claimant wins.
        assert!(claim_sending(&pool, rec.id).await.unwrap());
        assert!(!claim_sending(&pool, rec.id).await.unwrap());

        // success requires a prior claim and is terminal.
        assert!(mark_success(&pool, rec.id, 9001).await.unwrap());
        assert!(!mark_success(&pool, rec.id, 9002).await.unwrap());
        assert!(!mark_failed(&pool, rec.id, "too late").await.unwrap());

        let stored = get_record(&pool, rec.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PublishStatus::Success);
        assert_eq!(stored.wordpress_post_id, Some(9001));
        assert!(stored.error_message.is_none());
    }

    #[tokio::test]
    async fn failed_directly_from_scheduled() {
        let pool = setup_pool().await;
        let site = create_site(&pool, &sample_site()).await.unwrap();
        let rec = create_scheduled_records(&pool, 7, &[site], Utc::now())
            .await
            .unwrap()
            .remove(0);

        assert!(mark_failed(&pool, rec.id, "站点已停用").await.unwrap());
        let stored = get_record(&pool, rec.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PublishStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("站点已停用"));
        assert!(stored.wordpress_post_id.is_none());

        // Terminal: cannot be claimed or succeed afterwards.
        assert!(!claim_sending(&pool, rec.id).await.unwrap());
        assert!(!mark_success(&pool, rec.id, 1).await.unwrap());
    }

    #[tokio::test]
    async fn delete_only_while_scheduled() {
        let pool = setup_pool().await;
        let site = create_site(&pool, &sample_site()).await.unwrap();
        let recs = create_scheduled_records(&pool, 7, &[site, site], Utc::now())
            .await
            .unwrap();

        assert!(delete_record(&pool, recs[0].id).await.unwrap());

        assert!(claim_sending(&pool, recs[1].id).await.unwrap());
        assert!(!delete_record(&pool, recs[1].id).await.unwrap());
        assert!(get_record(&pool, recs[1].id).await.unwrap().is_some());
    }
}
