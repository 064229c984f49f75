//! Immediate-send orchestrator: synchronous multi-site fan-out, or the
//! bridge into the scheduled path when a future time is requested.

use crate::articles::ArticleStore;
use crate::db::{self, Pool};
use crate::model::{PostStatus, SiteOutcome, WordPressSite};
use crate::publisher::{self, ImagePlacement, PublishOptions};
use crate::wordpress::WordPressService;
use chrono::{DateTime, Utc};
use futures::future;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, instrument};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub article_id: i64,
    #[serde(default)]
    pub site_ids: Vec<i64>,
    /// `draft` or `publish`; defaults to `publish`.
    pub status: Option<String>,
    /// When present and in the future, records are scheduled instead of sent.
    pub scheduled_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub scheduled: bool,
    pub results: Vec<SiteOutcome>,
}

#[derive(Debug, Error)]
pub enum SendError {
    /// Rejected before any record was created; surfaced verbatim.
    #[error("{0}")]
    Invalid(&'static str),
    /// Article or image list could not be fetched; the whole request aborts.
    #[error("获取文章失败: {0}")]
    Upstream(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Handle one send-to-wordpress request.
///
/// A future `scheduled_time` batch-creates `scheduled` records and returns
/// without contacting WordPress. Otherwise every requested site gets a
/// record and all publishes run in parallel; the response aggregates the
/// per-site outcomes in request order, partial failure included.
#[instrument(skip_all, fields(article_id = req.article_id))]
pub async fn send_to_sites(
    pool: &Pool,
    articles: &dyn ArticleStore,
    wp: &dyn WordPressService,
    req: &SendRequest,
    now: DateTime<Utc>,
) -> Result<SendResponse, SendError> {
    if req.article_id <= 0 {
        return Err(SendError::Invalid("articleId 参数缺失或无效"));
    }
    if req.site_ids.is_empty() {
        return Err(SendError::Invalid("siteIds 不能为空"));
    }
    let post_status = match req.status.as_deref() {
        None => PostStatus::Publish,
        Some(raw) => {
            PostStatus::parse(raw).ok_or(SendError::Invalid("status 必须为 draft 或 publish"))?
        }
    };

    // Every requested site must exist. Inactive sites still get records and
    // attempts; they resolve to a synthetic failure at publish time.
    let mut sites: Vec<WordPressSite> = Vec::with_capacity(req.site_ids.len());
    for site_id in &req.site_ids {
        let site = db::get_site(pool, *site_id)
            .await?
            .ok_or(SendError::Invalid("siteIds 包含不存在的站点"))?;
        sites.push(site);
    }

    if let Some(scheduled_time) = req.scheduled_time {
        if scheduled_time <= now {
            return Err(SendError::Invalid("scheduledTime 必须晚于当前时间"));
        }
        db::create_scheduled_records(pool, req.article_id, &req.site_ids, scheduled_time).await?;
        return Ok(SendResponse {
            scheduled: true,
            results: Vec::new(),
        });
    }

    let article = articles
        .fetch_article(req.article_id)
        .await
        .map_err(|err| SendError::Upstream(err.to_string()))?;
    let images = articles
        .fetch_images(req.article_id)
        .await
        .map_err(|err| SendError::Upstream(err.to_string()))?;
    let image = images.into_iter().next();

    let records = db::create_sending_records(pool, req.article_id, &req.site_ids).await?;
    let opts = PublishOptions {
        post_status,
        publish_date: None,
        image_placement: ImagePlacement::Inline,
    };

    // Fan out and wait for all to settle; a slow or failing site must never
    // block or fail the others. join_all keeps request order.
    let publishes = sites.iter().zip(records.iter()).map(|(site, record)| {
        let article = &article;
        let image = image.as_ref();
        let opts = &opts;
        async move {
            match publisher::publish_to_site(pool, articles, wp, record, article, image, site, opts)
                .await
            {
                Ok(Some(outcome)) => outcome,
                // Immediate-path records are born `sending`, so the claim
                // branch can't trigger; treat it as a store inconsistency.
                Ok(None) => SiteOutcome::failure(site, "记录状态异常"),
                Err(err) => {
                    error!(?err, record_id = record.id, "store error during publish");
                    SiteOutcome::failure(site, err.to_string())
                }
            }
        }
    });
    let results = future::join_all(publishes).await;

    Ok(SendResponse {
        scheduled: false,
        results,
    })
}
