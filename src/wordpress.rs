//! WordPress REST API client: media upload and post creation with
//! application-password Basic auth.

use crate::categorize::categorize_post_error;
use crate::model::{PostStatus, WordPressSite};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::error::Error as _;
use std::fmt;
use std::time::Duration;

/// Payload for `POST /wp-json/wp/v2/posts`.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub status: PostStatus,
    pub excerpt: Option<String>,
    pub date: DateTime<Utc>,
    pub featured_media: Option<i64>,
}

/// The slice of the post-creation response we persist and surface.
#[derive(Debug, Clone)]
pub struct CreatedPost {
    pub id: i64,
    pub link: Option<String>,
}

#[async_trait]
pub trait WordPressService: Send + Sync {
    /// Upload one media file; returns the WordPress media id.
    async fn upload_media(
        &self,
        site: &WordPressSite,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<i64>;

    /// Create a post. Errors carry the already-categorized, user-facing
    /// message (see [`crate::categorize`]).
    async fn create_post(&self, site: &WordPressSite, post: &NewPost) -> Result<CreatedPost>;
}

#[derive(Clone)]
pub struct WordPressClient {
    http: Client,
}

impl fmt::Debug for WordPressClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WordPressClient").finish_non_exhaustive()
    }
}

pub fn posts_endpoint(site_url: &str) -> String {
    format!("{}/wp-json/wp/v2/posts", site_url.trim_end_matches('/'))
}

pub fn media_endpoint(site_url: &str) -> String {
    format!("{}/wp-json/wp/v2/media", site_url.trim_end_matches('/'))
}

pub fn build_post_payload(post: &NewPost) -> Value {
    let mut body = json!({
        "title": post.title,
        "content": post.content,
        "status": post.status.as_str(),
        "date": post.date.format("%Y-%m-%dT%H:%M:%S").to_string(),
    });
    if let Some(excerpt) = post.excerpt.as_deref().filter(|e| !e.is_empty()) {
        body["excerpt"] = json!(excerpt);
    }
    if let Some(media_id) = post.featured_media {
        body["featured_media"] = json!(media_id);
    }
    body
}

#[derive(Deserialize)]
struct CreatePostResponse {
    id: i64,
    #[serde(default)]
    link: Option<String>,
}

#[derive(Deserialize)]
struct CreateMediaResponse {
    id: i64,
}

impl WordPressClient {
    pub fn new(timeout: Duration) -> Self {
        let http = Client::builder()
            .user_agent(concat!("wp-courier/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        Self { http }
    }

    fn post_request(&self, site: &WordPressSite, payload: &Value) -> Result<reqwest::Request> {
        self.http
            .post(posts_endpoint(&site.url))
            .basic_auth(&site.username, Some(&site.app_password))
            .json(payload)
            .build()
            .context("failed to build post request")
    }
}

/// Flatten a reqwest error chain into one line; the interesting detail
/// (certificate, connect, timeout) usually sits in a source error.
fn transport_detail(err: &reqwest::Error) -> String {
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        detail.push_str(": ");
        detail.push_str(&inner.to_string());
        source = inner.source();
    }
    detail
}

#[async_trait]
impl WordPressService for WordPressClient {
    async fn upload_media(
        &self,
        site: &WordPressSite,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<i64> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)
            .context("invalid image content type")?;
        let form = Form::new().part("file", part);
        let res = self
            .http
            .post(media_endpoint(&site.url))
            .basic_auth(&site.username, Some(&site.app_password))
            .multipart(form)
            .send()
            .await
            .context("failed to reach media endpoint")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("media upload failed with status {}: {}", status, body));
        }
        let media: CreateMediaResponse = res.json().await.context("invalid media response")?;
        Ok(media.id)
    }

    async fn create_post(&self, site: &WordPressSite, post: &NewPost) -> Result<CreatedPost> {
        let payload = build_post_payload(post);
        let request = self.post_request(site, &payload)?;
        let res = match self.http.execute(request).await {
            Ok(res) => res,
            Err(err) => {
                return Err(anyhow!(categorize_post_error(None, &transport_detail(&err))));
            }
        };
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!(categorize_post_error(Some(status), &body)));
        }
        let created: CreatePostResponse = res.json().await.context("invalid WordPress response")?;
        Ok(CreatedPost {
            id: created.id,
            link: created.link,
        })
    }
}
