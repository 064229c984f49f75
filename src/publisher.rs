//! Delivery of one publish record to one WordPress site.

use crate::articles::ArticleStore;
use crate::categorize::{sanitize_title, SITE_INACTIVE};
use crate::db::{self, Pool};
use crate::model::{Article, ArticleImage, PostStatus, PublishRecord, PublishStatus, SiteOutcome, WordPressSite};
use crate::wordpress::{NewPost, WordPressService};
use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

/// Where the article's image ends up in the created post.
///
/// The immediate path embeds it inline in the content; the scheduled path
/// uploads it to the site's media library and references it as featured
/// media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePlacement {
    Inline,
    Featured,
}

#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub post_status: PostStatus,
    /// Post date sent to WordPress; `None` means "now". Deferred posts pass
    /// their original scheduled time so the published date reflects intent.
    pub publish_date: Option<DateTime<Utc>>,
    pub image_placement: ImagePlacement,
}

/// Push one article to one site and record the outcome.
///
/// Exactly one terminal transition is written per record. Returns `None`
/// when the record was already claimed by a concurrent sweep, in which case
/// nothing was published and nothing was written. Errors are store-level
/// only; publish failures become a `failed` record plus a failure outcome.
#[instrument(skip_all, fields(record_id = record.id, site = %site.name))]
pub async fn publish_to_site(
    pool: &Pool,
    articles: &dyn ArticleStore,
    wp: &dyn WordPressService,
    record: &PublishRecord,
    article: &Article,
    image: Option<&ArticleImage>,
    site: &WordPressSite,
    opts: &PublishOptions,
) -> Result<Option<SiteOutcome>> {
    if !site.is_active {
        db::mark_failed(pool, record.id, SITE_INACTIVE).await?;
        return Ok(Some(SiteOutcome::failure(site, SITE_INACTIVE)));
    }

    if record.status == PublishStatus::Scheduled && !db::claim_sending(pool, record.id).await? {
        debug!("record already claimed by a concurrent sweep");
        return Ok(None);
    }

    let mut featured_media = None;
    let mut inline_image = None;
    if let Some(img) = image {
        match opts.image_placement {
            ImagePlacement::Inline => inline_image = Some(img.image_url.as_str()),
            ImagePlacement::Featured => {
                // Upload failure is non-fatal: publish without a featured image.
                match upload_featured(articles, wp, site, &img.image_url).await {
                    Ok(media_id) => featured_media = Some(media_id),
                    Err(err) => {
                        warn!(?err, image = %img.image_url, "featured image upload failed; publishing without it");
                    }
                }
            }
        }
    }

    let title = sanitize_title(&article.title);
    let content = match inline_image {
        Some(url) => format!("<img src=\"{}\" alt=\"{}\" />\n{}", url, title, article.content),
        None => article.content.clone(),
    };
    let post = NewPost {
        title,
        content,
        status: opts.post_status,
        excerpt: article.excerpt.clone(),
        date: opts.publish_date.unwrap_or_else(Utc::now),
        featured_media,
    };

    match wp.create_post(site, &post).await {
        Ok(created) => {
            db::mark_success(pool, record.id, created.id).await?;
            info!(post_id = created.id, "published to site");
            Ok(Some(SiteOutcome::success(site, created.id, created.link)))
        }
        Err(err) => {
            let message = err.to_string();
            db::mark_failed(pool, record.id, &message).await?;
            warn!(error = %message, "publish failed");
            Ok(Some(SiteOutcome::failure(site, message)))
        }
    }
}

async fn upload_featured(
    articles: &dyn ArticleStore,
    wp: &dyn WordPressService,
    site: &WordPressSite,
    image_url: &str,
) -> Result<i64> {
    let data = articles.fetch_image_data(image_url).await?;
    wp.upload_media(site, &data.file_name, &data.content_type, data.bytes)
        .await
}
