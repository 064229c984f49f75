use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a publish record. Transitions are forward-only:
/// `Scheduled -> Sending -> {Success | Failed}`; the terminal states are
/// never mutated again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Scheduled,
    Sending,
    Success,
    Failed,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStatus::Scheduled => "scheduled",
            PublishStatus::Sending => "sending",
            PublishStatus::Success => "success",
            PublishStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(PublishStatus::Scheduled),
            "sending" => Some(PublishStatus::Sending),
            "success" => Some(PublishStatus::Success),
            "failed" => Some(PublishStatus::Failed),
            _ => None,
        }
    }
}

/// WordPress post visibility requested by the caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Publish,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Publish => "publish",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(PostStatus::Draft),
            "publish" => Some(PostStatus::Publish),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WordPressSite {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub app_password: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSite {
    pub name: String,
    pub url: String,
    pub username: String,
    pub app_password: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub username: Option<String>,
    pub app_password: Option<String>,
    pub is_active: Option<bool>,
}

/// One article-to-site publish intent, the durable unit of work.
///
/// Invariants enforced by the store: `wordpress_post_id` is set iff
/// `status == Success`, `error_message` is set iff `status == Failed`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRecord {
    pub id: i64,
    pub article_id: i64,
    pub site_id: i64,
    pub status: PublishStatus,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub wordpress_post_id: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Article snapshot as served by the content backend.
#[derive(Debug, Clone, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub keywords: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArticleImage {
    pub image_url: String,
}

/// Per-site outcome returned to the immediate-send caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteOutcome {
    pub site_id: i64,
    pub site: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wordpress_post_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SiteOutcome {
    pub fn success(site: &WordPressSite, post_id: i64, post_url: Option<String>) -> Self {
        Self {
            site_id: site.id,
            site: site.name.clone(),
            success: true,
            wordpress_post_id: Some(post_id),
            post_url,
            error: None,
        }
    }

    pub fn failure(site: &WordPressSite, error: impl Into<String>) -> Self {
        Self {
            site_id: site.id,
            site: site.name.clone(),
            success: false,
            wordpress_post_id: None,
            post_url: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_status_round_trips() {
        for status in [
            PublishStatus::Scheduled,
            PublishStatus::Sending,
            PublishStatus::Success,
            PublishStatus::Failed,
        ] {
            assert_eq!(PublishStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PublishStatus::parse("pending"), None);
    }

    #[test]
    fn post_status_parses_known_values_only() {
        assert_eq!(PostStatus::parse("draft"), Some(PostStatus::Draft));
        assert_eq!(PostStatus::parse("publish"), Some(PostStatus::Publish));
        assert_eq!(PostStatus::parse("private"), None);
    }
}
