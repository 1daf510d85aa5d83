//! Header probe, page fetch, and link extraction.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use url::Url;

use crate::core::errors::AppError;

static HREF_RE: OnceLock<Regex> = OnceLock::new();
static TITLE_RE: OnceLock<Regex> = OnceLock::new();

fn href_re() -> &'static Regex {
    HREF_RE.get_or_init(|| {
        Regex::new(r#"(?i)<a\b[^>]*?\bhref\s*=\s*["']([^"']+)["']"#).expect("valid href regex")
    })
}

fn title_re() -> &'static Regex {
    TITLE_RE.get_or_init(|| {
        Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex")
    })
}

/// A fully fetched page. `url` is the final URL after redirects, which is
/// what the document key is derived from.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub body: String,
}

pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()
            .map_err(AppError::internal)?;
        Ok(Self { client })
    }

    /// HEAD probe: true when the Content-Type header names a textual body.
    /// No body is transferred either way. A missing Content-Type counts as
    /// non-textual.
    pub async fn probe_is_text(&self, url: &str) -> Result<bool, AppError> {
        let res = self.client.head(url).send().await.map_err(AppError::fetch)?;
        if !res.status().is_success() {
            return Err(AppError::Fetch(format!("probe {}: {}", url, res.status())));
        }

        let content_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        Ok(is_text_content_type(content_type))
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, AppError> {
        let res = self.client.get(url).send().await.map_err(AppError::fetch)?;
        if !res.status().is_success() {
            return Err(AppError::Fetch(format!("fetch {}: {}", url, res.status())));
        }

        let final_url = res.url().to_string();
        let body = res.text().await.map_err(AppError::fetch)?;
        Ok(FetchedPage {
            url: final_url,
            body,
        })
    }
}

pub fn is_text_content_type(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("text")
}

/// All absolute HTTP(S) link targets on a page. Relative targets are joined
/// against `base`; `mailto:` and other non-web schemes are discarded;
/// fragments are stripped so in-page anchors collapse to one key.
pub fn extract_links(base: &Url, body: &str) -> Vec<Url> {
    let mut links = Vec::new();
    for caps in href_re().captures_iter(body) {
        let Ok(mut joined) = base.join(&caps[1]) else {
            continue;
        };
        if joined.scheme() != "http" && joined.scheme() != "https" {
            continue;
        }
        joined.set_fragment(None);
        links.push(joined);
    }
    links
}

pub fn extract_title(body: &str) -> Option<String> {
    title_re()
        .captures(body)
        .map(|caps| caps[1].trim().to_string())
        .filter(|title| !title.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://helpdesk.example.org/faq/index.html").unwrap()
    }

    #[test]
    fn relative_links_are_joined_against_the_page_url() {
        let body = r#"<a href="other.html">other</a> <a href="/root.html">root</a>"#;
        let links = extract_links(&base(), body);
        let urls: Vec<_> = links.iter().map(Url::as_str).collect();
        assert_eq!(
            urls,
            vec![
                "https://helpdesk.example.org/faq/other.html",
                "https://helpdesk.example.org/root.html",
            ]
        );
    }

    #[test]
    fn mailto_and_foreign_schemes_are_dropped() {
        let body = concat!(
            r#"<a href="mailto:help@example.org">mail</a>"#,
            r#"<a href="ftp://files.example.org/a">ftp</a>"#,
            r#"<a href="javascript:void(0)">js</a>"#,
            r#"<a href="https://helpdesk.example.org/ok">ok</a>"#,
        );
        let links = extract_links(&base(), body);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].as_str(), "https://helpdesk.example.org/ok");
    }

    #[test]
    fn fragments_collapse_to_one_target() {
        let body = r#"<a href="page.html#a">a</a><a href="page.html#b">b</a>"#;
        let links = extract_links(&base(), body);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0], links[1]);
        assert!(links[0].fragment().is_none());
    }

    #[test]
    fn href_attribute_is_found_regardless_of_case_and_position() {
        let body = r#"<A CLASS="x" HREF='/up.html'>up</A>"#;
        let links = extract_links(&base(), body);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].path(), "/up.html");
    }

    #[test]
    fn title_extraction() {
        assert_eq!(
            extract_title("<html><head><title> FAQ — Helpdesk </title></head></html>"),
            Some("FAQ — Helpdesk".to_string())
        );
        assert_eq!(extract_title("<html><head></head></html>"), None);
        assert_eq!(extract_title("<title>  </title>"), None);
    }

    #[test]
    fn textual_content_types() {
        assert!(is_text_content_type("text/html; charset=utf-8"));
        assert!(is_text_content_type("Text/Plain"));
        assert!(!is_text_content_type("application/pdf"));
        assert!(!is_text_content_type("image/png"));
        assert!(!is_text_content_type(""));
    }
}
