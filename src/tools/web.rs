//! Web content handler: bounded-timeout page fetch, best-effort link and
//! image extraction, and JSON API calls. HTML handling is regex-based and
//! degrades gracefully on malformed markup.

use super::Tool;
use crate::error::{AgentError, Result};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;
use url::Url;

const TEXT_CAP: usize = 2000;
const LINK_CAP: usize = 10;
const IMAGE_CAP: usize = 5;
const USER_AGENT: &str = "Mozilla/5.0 (compatible; tool-agent/0.1)";

/// Operations the router can request from the web tool
#[derive(Debug, Clone, Copy, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum WebOp {
    Fetch,
    Links,
    Images,
    Api,
}

/// Parameters for web operations
#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct WebParams {
    pub op: WebOp,
    pub url: String,
    /// HTTP method for `api` calls; defaults to GET.
    #[serde(default)]
    pub method: Option<String>,
    /// JSON body sent with POST/PUT `api` calls.
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

/// Web tool with an explicit timeout on every request.
#[derive(Debug)]
pub struct WebTool {
    client: Client,
    script_re: Regex,
    tag_re: Regex,
    title_re: Regex,
    link_re: Regex,
    image_re: Regex,
}

impl WebTool {
    pub fn new(timeout: Duration, proxy: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder().timeout(timeout).user_agent(USER_AGENT);
        if let Some(proxy) = proxy {
            builder = builder.proxy(
                reqwest::Proxy::all(proxy)
                    .map_err(|e| AgentError::Config(format!("bad proxy {}: {}", proxy, e)))?,
            );
        }
        let client = builder
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            script_re: Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)>")
                .expect("script pattern"),
            tag_re: Regex::new(r"(?s)<[^>]+>").expect("tag pattern"),
            title_re: Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title pattern"),
            link_re: Regex::new(r#"(?is)<a\s[^>]*href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#)
                .expect("link pattern"),
            image_re: Regex::new(
                r#"(?is)<img\s[^>]*src\s*=\s*["']([^"']+)["'][^>]*?(?:\salt\s*=\s*["']([^"']*)["'])?[^>]*>"#,
            )
            .expect("image pattern"),
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        self.send(self.client.get(url), url).await
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<reqwest::Response> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AgentError::RequestTimeout(url.to_string())
            } else {
                AgentError::RequestFailed {
                    status: 0,
                    url: url.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::RequestFailed {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    async fn body(&self, url: &str) -> Result<String> {
        let response = self.get(url).await?;
        response.text().await.map_err(|e| {
            if e.is_timeout() {
                AgentError::RequestTimeout(url.to_string())
            } else {
                AgentError::InvalidResponseBody(e.to_string())
            }
        })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let html = self.body(url).await?;
        let title = self
            .title_re
            .captures(&html)
            .map(|caps| caps[1].trim().to_string())
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| "(no title)".to_string());

        let without_scripts = self.script_re.replace_all(&html, " ");
        let without_tags = self.tag_re.replace_all(&without_scripts, " ");
        let text = collapse_whitespace(&decode_entities(&without_tags));
        let mut preview: String = text.chars().take(TEXT_CAP).collect();
        if text.chars().count() > TEXT_CAP {
            preview.push_str("\n...(truncated)");
        }

        Ok(format!("{}\ntitle: {}\n\n{}", url, title, preview))
    }

    async fn links(&self, url: &str) -> Result<String> {
        let html = self.body(url).await?;
        let mut links = Vec::new();
        for caps in self.link_re.captures_iter(&html) {
            if let Some(resolved) = resolve(url, &caps[1]) {
                let text = collapse_whitespace(&self.tag_re.replace_all(&caps[2], " "));
                if text.is_empty() {
                    links.push(resolved);
                } else {
                    links.push(format!("{}: {}", text, resolved));
                }
            }
        }

        if links.is_empty() {
            return Ok(format!("no links found at {}", url));
        }
        let total = links.len();
        links.truncate(LINK_CAP);
        Ok(format!("{} links at {}:\n{}", total, url, links.join("\n")))
    }

    async fn images(&self, url: &str) -> Result<String> {
        let html = self.body(url).await?;
        let mut images = Vec::new();
        for caps in self.image_re.captures_iter(&html) {
            if let Some(resolved) = resolve(url, &caps[1]) {
                match caps.get(2).map(|alt| alt.as_str().trim()) {
                    Some(alt) if !alt.is_empty() => images.push(format!("{}: {}", alt, resolved)),
                    _ => images.push(resolved),
                }
            }
        }

        if images.is_empty() {
            return Ok(format!("no images found at {}", url));
        }
        let total = images.len();
        images.truncate(IMAGE_CAP);
        Ok(format!(
            "{} images at {}:\n{}",
            total,
            url,
            images.join("\n")
        ))
    }

    async fn call_api(
        &self,
        url: &str,
        method: &str,
        payload: Option<&serde_json::Value>,
    ) -> Result<String> {
        let method = method.to_uppercase();
        let mut request = match method.as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "DELETE" => self.client.delete(url),
            other => {
                return Err(AgentError::ToolExecution(format!(
                    "unsupported HTTP method: {}",
                    other
                )))
            }
        };
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        let response = self.send(request, url).await?;
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                AgentError::RequestTimeout(url.to_string())
            } else {
                AgentError::InvalidResponseBody(e.to_string())
            }
        })?;
        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| AgentError::InvalidResponseBody(format!("{}: {}", url, e)))?;
        let mut formatted = serde_json::to_string_pretty(&value)?;
        if formatted.chars().count() > TEXT_CAP {
            formatted = formatted.chars().take(TEXT_CAP).collect();
            formatted.push_str("\n...(truncated)");
        }
        Ok(format!("{} {}:\n{}", method, url, formatted))
    }
}

impl Tool for WebTool {
    fn name(&self) -> &'static str {
        "web"
    }

    fn description(&self) -> &'static str {
        "Fetch page text, extract links or images, and call JSON APIs with a bounded timeout"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "op": {
                    "type": "string",
                    "enum": ["fetch", "links", "images", "api"]
                },
                "url": { "type": "string" },
                "method": {
                    "type": "string",
                    "enum": ["GET", "POST", "PUT", "DELETE"]
                },
                "body": { "type": "object" }
            },
            "required": ["op", "url"]
        })
    }

    fn execute(
        &self,
        parameters: serde_json::Value,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<serde_json::Value>> + Send + '_>> {
        Box::pin(async move {
            let params: WebParams = serde_json::from_value(parameters)
                .map_err(|e| AgentError::ToolExecution(format!("invalid parameters: {}", e)))?;
            debug!(target: "tool_agent::web", op = ?params.op, url = %params.url, "web request");

            let result = match params.op {
                WebOp::Fetch => self.fetch(&params.url).await?,
                WebOp::Links => self.links(&params.url).await?,
                WebOp::Images => self.images(&params.url).await?,
                WebOp::Api => {
                    self.call_api(
                        &params.url,
                        params.method.as_deref().unwrap_or("GET"),
                        params.body.as_ref(),
                    )
                    .await?
                }
            };
            Ok(serde_json::Value::String(result))
        })
    }
}

/// Resolve an href against the page URL; data: and javascript: schemes
/// and unparseable values are skipped, not errors.
fn resolve(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") || href.starts_with('#') {
        return None;
    }
    if href.starts_with("data:image") {
        return Some(href.to_string());
    }
    match Url::parse(href) {
        Ok(absolute) => Some(absolute.to_string()),
        Err(_) => Url::parse(base)
            .ok()?
            .join(href)
            .ok()
            .map(|joined| joined.to_string()),
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool() -> WebTool {
        WebTool::new(Duration::from_secs(2), None).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_strips_markup() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("GET", "/page")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(
                "<html><head><title>Demo</title><script>var x=1;</script></head>\
                 <body><h1>Hello</h1><p>World &amp; more</p></body></html>",
            )
            .create_async()
            .await;

        let url = format!("{}/page", server.url());
        let result = tool().fetch(&url).await.unwrap();
        assert!(result.contains("title: Demo"));
        assert!(result.contains("Hello World & more"));
        assert!(!result.contains("var x"));
    }

    #[tokio::test]
    async fn test_links_resolve_relative_hrefs() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("GET", "/")
            .with_status(200)
            .with_body(
                r##"<a href="/docs">Docs</a><a href="https://example.com/x">Out</a>
                   <a href="#top">Skip</a>"##,
            )
            .create_async()
            .await;

        let url = format!("{}/", server.url());
        let result = tool().links(&url).await.unwrap();
        assert!(result.contains("2 links"));
        assert!(result.contains(&format!("Docs: {}docs", url)));
        assert!(result.contains("https://example.com/x"));
    }

    #[tokio::test]
    async fn test_images_best_effort_on_malformed_html() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("GET", "/")
            .with_status(200)
            .with_body(r#"<div><img src="/a.png" alt="logo"><img src="b.jpg"<broken"#)
            .create_async()
            .await;

        let url = format!("{}/", server.url());
        let result = tool().images(&url).await.unwrap();
        assert!(result.contains("a.png"));
        assert!(result.contains("logo"));
    }

    #[tokio::test]
    async fn test_non_2xx_is_request_failed() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let url = format!("{}/missing", server.url());
        let err = tool().fetch(&url).await.unwrap_err();
        assert!(matches!(err, AgentError::RequestFailed { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_host_fails_within_bound() {
        // Nothing listens on this port; the error must come back quickly
        // as a failed or timed-out request, never an unbounded hang.
        let tool = WebTool::new(Duration::from_millis(500), None).unwrap();
        let started = std::time::Instant::now();
        let err = tool.fetch("http://127.0.0.1:9").await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::RequestFailed { .. } | AgentError::RequestTimeout(_)
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_api_call_parses_json() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("GET", "/api")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name":"demo","count":3}"#)
            .create_async()
            .await;

        let url = format!("{}/api", server.url());
        let result = tool().call_api(&url, "GET", None).await.unwrap();
        assert!(result.contains("\"name\": \"demo\""));
    }

    #[tokio::test]
    async fn test_api_call_posts_json_body() {
        let mut server = mockito::Server::new_async().await;
        let _endpoint = server
            .mock("POST", "/items")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::Json(json!({ "name": "demo" })))
            .with_status(200)
            .with_body(r#"{"id":7}"#)
            .create_async()
            .await;

        let url = format!("{}/items", server.url());
        let result = tool()
            .execute(json!({
                "op": "api",
                "url": url,
                "method": "post",
                "body": { "name": "demo" }
            }))
            .await
            .unwrap();
        let text = result.as_str().unwrap();
        assert!(text.starts_with("POST"));
        assert!(text.contains("\"id\": 7"));
    }

    #[tokio::test]
    async fn test_api_call_rejects_unknown_method() {
        let err = tool()
            .call_api("http://127.0.0.1:9/x", "PATCH", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolExecution(_)));
    }

    #[tokio::test]
    async fn test_api_call_rejects_malformed_json() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("GET", "/api")
            .with_status(200)
            .with_body("not json at all")
            .create_async()
            .await;

        let url = format!("{}/api", server.url());
        let err = tool().call_api(&url, "GET", None).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidResponseBody(_)));
    }

    #[test]
    fn test_resolve_rules() {
        assert_eq!(
            resolve("https://example.com/dir/", "page.html"),
            Some("https://example.com/dir/page.html".to_string())
        );
        assert_eq!(resolve("https://example.com", "#anchor"), None);
        assert_eq!(resolve("https://example.com", "javascript:void(0)"), None);
    }
}
