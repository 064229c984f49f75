//! Pattern tables for title cleanup and WordPress error classification.
//!
//! Both tables are data, not scattered regexes: the provider-tag list feeds a
//! single anchored pattern, and publish errors are matched against an ordered
//! rule list so categorization stays testable in isolation.

use once_cell::sync::Lazy;
use regex::Regex;

/// Provider tags appended to titles at generation time, e.g. `"标题 (OPENAI)"`.
pub const PROVIDER_TAGS: &[&str] = &["GOOGLE", "OPENAI", "ANTHROPIC", "GEMINI", "GPT", "CLAUDE"];

static PROVIDER_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\s*\(({})\)\s*$", PROVIDER_TAGS.join("|")))
        .expect("provider tag pattern")
});

/// Strip a trailing provider bookkeeping tag from an article title.
/// Titles without a trailing tag pass through unchanged.
pub fn sanitize_title(title: &str) -> String {
    PROVIDER_TAG_RE.replace(title, "").into_owned()
}

pub const SITE_INACTIVE: &str = "站点已停用";
pub const SITE_MISSING: &str = "站点不存在";
pub const AUTH_FAILED: &str = "认证失败，请检查用户名和应用程序密码";
pub const REST_API_MISSING: &str = "站点未启用 REST API 或站点地址不正确";
pub const SERVER_ERROR: &str = "站点服务器内部错误，请稍后重试";
pub const CERT_INVALID: &str = "站点 SSL 证书已过期或无效";
pub const SITE_UNREACHABLE: &str = "无法连接到站点，请检查站点地址";

enum Matcher {
    Status(&'static [u16]),
    ServerError,
    TextAny(&'static [&'static str]),
}

/// Ordered rules; the first match wins. Status rules run before text rules so
/// an error body cannot shadow an unambiguous HTTP status.
const POST_ERROR_RULES: &[(Matcher, &str)] = &[
    (Matcher::Status(&[401, 403]), AUTH_FAILED),
    (Matcher::Status(&[404]), REST_API_MISSING),
    (Matcher::ServerError, SERVER_ERROR),
    (
        Matcher::TextAny(&["certificate", "cert has expired", "self-signed", "ssl"]),
        CERT_INVALID,
    ),
    (
        Matcher::TextAny(&[
            "connection refused",
            "connect error",
            "unreachable",
            "dns error",
            "failed to lookup",
            "timed out",
            "timeout",
        ]),
        SITE_UNREACHABLE,
    ),
];

/// Map a WordPress post-creation failure to a user-facing message.
///
/// `status` is the HTTP status when a response was received; transport-level
/// failures pass `None` and only the error text. Unrecognized failures pass
/// the raw detail through so nothing is swallowed.
pub fn categorize_post_error(status: Option<u16>, detail: &str) -> String {
    let lowered = detail.to_lowercase();
    for (matcher, message) in POST_ERROR_RULES {
        let hit = match matcher {
            Matcher::Status(codes) => status.map_or(false, |s| codes.contains(&s)),
            Matcher::ServerError => status.map_or(false, |s| s >= 500),
            Matcher::TextAny(needles) => needles.iter().any(|n| lowered.contains(n)),
        };
        if hit {
            return (*message).to_string();
        }
    }
    if detail.is_empty() {
        if let Some(s) = status {
            return format!("站点返回错误状态 {s}");
        }
    }
    detail.to_string()
}
