//! Client for the content backend that owns generated articles and their
//! gallery images.

use crate::model::{Article, ArticleImage};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Downloaded image payload, ready for a media upload.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Fetch one article snapshot by id.
    async fn fetch_article(&self, article_id: i64) -> Result<Article>;

    /// List the images attached to an article; the first entry is used as
    /// the featured image.
    async fn fetch_images(&self, article_id: i64) -> Result<Vec<ArticleImage>>;

    /// Download the raw bytes behind an image URL.
    async fn fetch_image_data(&self, url: &str) -> Result<ImageData>;
}

#[derive(Clone)]
pub struct HttpArticleStore {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for HttpArticleStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpArticleStore")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Envelope shared by every content-backend endpoint.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArticlePayload {
    title: String,
    content: String,
    #[serde(default)]
    excerpt: Option<String>,
    #[serde(default)]
    keywords: Option<String>,
}

impl HttpArticleStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        // A trailing slash keeps Url::join from eating the last path segment.
        let base_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .context("invalid article API base URL")?;
        let http = Client::builder()
            .user_agent(concat!("wp-courier/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, script: &str, key: &str, id: i64) -> Result<Url> {
        let mut url = self
            .base_url
            .join(script)
            .context("invalid article API base URL")?;
        url.query_pairs_mut().append_pair(key, &id.to_string());
        Ok(url)
    }

    async fn get_envelope<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<ApiEnvelope<T>> {
        let res = self
            .http
            .get(url)
            .send()
            .await
            .context("failed to reach article API")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("article API error {}: {}", status, body));
        }
        res.json().await.context("invalid article API response")
    }
}

#[async_trait]
impl ArticleStore for HttpArticleStore {
    async fn fetch_article(&self, article_id: i64) -> Result<Article> {
        let url = self.endpoint("get-article.php", "id", article_id)?;
        let envelope: ApiEnvelope<ArticlePayload> = self.get_envelope(url).await?;
        match (envelope.success, envelope.data) {
            (true, Some(data)) => Ok(Article {
                id: article_id,
                title: data.title,
                content: data.content,
                excerpt: data.excerpt,
                keywords: data.keywords,
            }),
            _ => Err(anyhow!(envelope
                .error
                .unwrap_or_else(|| "文章不存在".to_string()))),
        }
    }

    async fn fetch_images(&self, article_id: i64) -> Result<Vec<ArticleImage>> {
        let url = self.endpoint("get-images.php", "article_id", article_id)?;
        let envelope: ApiEnvelope<Vec<ArticleImage>> = self.get_envelope(url).await?;
        if !envelope.success {
            return Err(anyhow!(envelope
                .error
                .unwrap_or_else(|| "获取图片列表失败".to_string())));
        }
        Ok(envelope.data.unwrap_or_default())
    }

    async fn fetch_image_data(&self, url: &str) -> Result<ImageData> {
        let res = self
            .http
            .get(url)
            .send()
            .await
            .context("failed to download image")?;
        if !res.status().is_success() {
            return Err(anyhow!("image download failed with status {}", res.status()));
        }
        let content_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let file_name = file_name_from_url(url);
        let bytes = res.bytes().await.context("failed to read image body")?;
        Ok(ImageData {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}

fn file_name_from_url(url: &str) -> String {
    let name = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segments| segments.last().map(str::to_string))
        })
        .filter(|s| !s.is_empty());
    name.unwrap_or_else(|| "image.jpg".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> HttpArticleStore {
        HttpArticleStore::new("https://cms.example.com/api", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn endpoints_carry_the_id_query() {
        let url = store().endpoint("get-article.php", "id", 42).unwrap();
        assert_eq!(url.as_str(), "https://cms.example.com/api/get-article.php?id=42");

        let url = store().endpoint("get-images.php", "article_id", 42).unwrap();
        assert_eq!(
            url.as_str(),
            "https://cms.example.com/api/get-images.php?article_id=42"
        );
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let with_slash =
            HttpArticleStore::new("https://cms.example.com/api/", Duration::from_secs(5)).unwrap();
        let url = with_slash.endpoint("get-article.php", "id", 1).unwrap();
        assert_eq!(url.as_str(), "https://cms.example.com/api/get-article.php?id=1");
    }

    #[test]
    fn image_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://cdn.example.com/media/a%20b/cover.png?v=3"),
            "cover.png"
        );
        assert_eq!(file_name_from_url("https://cdn.example.com/"), "image.jpg");
        assert_eq!(file_name_from_url("not a url"), "image.jpg");
    }

    #[test]
    fn envelope_tolerates_missing_optional_fields() {
        let envelope: ApiEnvelope<ArticlePayload> = serde_json::from_str(
            r#"{"success": true, "data": {"title": "T", "content": "C"}}"#,
        )
        .unwrap();
        assert!(envelope.success);
        let data = envelope.data.unwrap();
        assert!(data.excerpt.is_none());
        assert!(data.keywords.is_none());

        let envelope: ApiEnvelope<Vec<ArticleImage>> = serde_json::from_str(
            r#"{"success": true, "data": [{"image_url": "https://cdn/x.jpg", "sort_order": 1}]}"#,
        )
        .unwrap();
        assert_eq!(envelope.data.unwrap()[0].image_url, "https://cdn/x.jpg");
    }
}
