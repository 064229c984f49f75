//! Periodic sweep over due publish records.

use crate::articles::ArticleStore;
use crate::categorize::SITE_MISSING;
use crate::db::{self, Pool};
use crate::model::{Article, ArticleImage, PostStatus, PublishRecord};
use crate::publisher::{self, ImagePlacement, PublishOptions};
use crate::wordpress::WordPressService;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, error, info, instrument, warn};

/// Aggregate result of one sweep invocation.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct SweepReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl SweepReport {
    fn count(&mut self, success: bool) {
        self.processed += 1;
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Process all currently-due records, at most `limit` per invocation.
///
/// Records are grouped by article so each article (and its image list) is
/// fetched once per sweep. Per-record failures are written to the store and
/// counted; they never propagate to the caller.
#[instrument(skip_all)]
pub async fn process_due(
    pool: &Pool,
    articles: &dyn ArticleStore,
    wp: &dyn WordPressService,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<SweepReport> {
    let due = db::find_due(pool, now, limit).await?;
    let mut report = SweepReport::default();
    if due.is_empty() {
        return Ok(report);
    }

    let mut groups: BTreeMap<i64, Vec<PublishRecord>> = BTreeMap::new();
    for record in due {
        groups.entry(record.article_id).or_default().push(record);
    }

    for (article_id, records) in groups {
        let (article, image) = match fetch_bundle(articles, article_id).await {
            Ok(bundle) => bundle,
            Err(err) => {
                // Coarse granularity on purpose: without the article there is
                // nothing to publish for any site in the group.
                let message = format!("获取文章失败: {err}");
                warn!(article_id, error = %err, "article fetch failed; failing group");
                for record in &records {
                    match db::mark_failed(pool, record.id, &message).await {
                        Ok(true) => report.count(false),
                        Ok(false) => debug!(record_id = record.id, "record no longer fail-able"),
                        Err(store_err) => {
                            error!(?store_err, record_id = record.id, "failed to record group failure");
                        }
                    }
                }
                continue;
            }
        };

        for record in records {
            let site = match db::get_site(pool, record.site_id).await {
                Ok(Some(site)) => site,
                Ok(None) => {
                    if db::mark_failed(pool, record.id, SITE_MISSING).await.unwrap_or(false) {
                        report.count(false);
                    }
                    continue;
                }
                Err(err) => {
                    error!(?err, record_id = record.id, "site lookup failed");
                    continue;
                }
            };

            let opts = PublishOptions {
                post_status: PostStatus::Publish,
                publish_date: record.scheduled_time,
                image_placement: ImagePlacement::Featured,
            };
            match publisher::publish_to_site(
                pool,
                articles,
                wp,
                &record,
                &article,
                image.as_ref(),
                &site,
                &opts,
            )
            .await
            {
                Ok(Some(outcome)) => report.count(outcome.success),
                Ok(None) => debug!(record_id = record.id, "skipped; claimed elsewhere"),
                Err(err) => error!(?err, record_id = record.id, "store error during publish"),
            }
        }
    }

    info!(
        processed = report.processed,
        succeeded = report.succeeded,
        failed = report.failed,
        "sweep complete"
    );
    Ok(report)
}

async fn fetch_bundle(
    articles: &dyn ArticleStore,
    article_id: i64,
) -> Result<(Article, Option<ArticleImage>)> {
    let article = articles.fetch_article(article_id).await?;
    let images = articles.fetch_images(article_id).await?;
    Ok((article, images.into_iter().next()))
}
