use reqwest::Client;

use crate::error::{WeftError, WeftResult};

use super::Document;

/// Fetches web pages and reduces HTML to plain text.
pub struct WebLoader {
    client: Client,
}

impl WebLoader {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Fetch one URL and return it as a document.
    ///
    /// HTML responses are stripped down to their visible text with the page
    /// title captured into metadata. Anything else passes through unchanged.
    pub async fn load(&self, url: &str) -> WeftResult<Document> {
        let response = self
            .client
            .get(url)
            .header("user-agent", "weft/0.1")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(WeftError::Document(format!(
                "GET {url} returned {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await?;

        Ok(document_from_body(url, &content_type, body))
    }

    /// Fetch several URLs in order.
    pub async fn load_all(&self, urls: &[String]) -> WeftResult<Vec<Document>> {
        let mut docs = Vec::with_capacity(urls.len());
        for url in urls {
            docs.push(self.load(url).await?);
        }
        Ok(docs)
    }
}

impl Default for WebLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn document_from_body(url: &str, content_type: &str, body: String) -> Document {
    let is_html = content_type.contains("text/html") || looks_like_html(&body);
    if is_html {
        let title = extract_title(&body);
        let mut doc = Document::new(html_to_text(&body)).with_source(url);
        doc.metadata.title = title;
        doc
    } else {
        Document::new(body).with_source(url)
    }
}

fn looks_like_html(body: &str) -> bool {
    let head = body.trim_start();
    let lower: String = head.chars().take(64).collect::<String>().to_ascii_lowercase();
    lower.starts_with("<!doctype html") || lower.starts_with("<html")
}

/// Reduce an HTML page to visible text. Script, style, and comment blocks
/// are dropped along with all tags; common entities are decoded and runs
/// of whitespace collapse to single spaces.
pub fn html_to_text(html: &str) -> String {
    normalize_whitespace(&decode_entities(&strip_tags(html)))
}

/// Pull the contents of the first `<title>` element, if any.
pub fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let start = lower.find("<title")?;
    let open_end = start + lower[start..].find('>')? + 1;
    let close = open_end + lower[open_end..].find("</title")?;
    let title = normalize_whitespace(&decode_entities(&html[open_end..close]));
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

fn strip_tags(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len() / 2);
    let mut i = 0;

    while i < html.len() {
        if lower[i..].starts_with("<!--") {
            i = match lower[i..].find("-->") {
                Some(end) => i + end + 3,
                None => html.len(),
            };
        } else if lower[i..].starts_with("<script") {
            i = skip_element(&lower, i, "</script");
        } else if lower[i..].starts_with("<style") {
            i = skip_element(&lower, i, "</style");
        } else if lower[i..].starts_with('<') {
            if is_break_tag(&lower[i..]) {
                out.push('\n');
            }
            i = match lower[i..].find('>') {
                Some(end) => i + end + 1,
                None => html.len(),
            };
        } else {
            let next = lower[i..].find('<').map(|n| i + n).unwrap_or(html.len());
            out.push_str(&html[i..next]);
            i = next;
        }
    }
    out
}

/// Skip past an element whose raw contents must not leak into the text
fn skip_element(lower: &str, start: usize, close: &str) -> usize {
    match lower[start..].find(close) {
        Some(pos) => {
            let at = start + pos;
            match lower[at..].find('>') {
                Some(end) => at + end + 1,
                None => lower.len(),
            }
        }
        None => lower.len(),
    }
}

/// Tags that end a line or block of visible text
fn is_break_tag(tag: &str) -> bool {
    const BREAKS: &[&str] = &[
        "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "table",
        "blockquote", "pre", "section", "article", "header", "footer",
    ];
    let name = tag.trim_start_matches('<').trim_start_matches('/');
    BREAKS.iter().any(|b| {
        name.starts_with(b)
            && matches!(
                name.as_bytes().get(b.len()),
                Some(b' ') | Some(b'>') | Some(b'/') | Some(b'\n') | None
            )
    })
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Collapse runs of spaces within lines and runs of blank lines between
/// paragraphs, trimming the edges.
fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_blank = false;

    for line in text.lines() {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            pending_blank = true;
            continue;
        }
        if !out.is_empty() {
            if pending_blank {
                out.push_str("\n\n");
            } else {
                out.push('\n');
            }
        }
        out.push_str(&words.join(" "));
        pending_blank = false;
    }
    out
}
