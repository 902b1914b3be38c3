//! arXiv export API client and Atom feed parsing.

use crate::config::ArxivConfig;
use crate::error::ArxivError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One search hit
#[derive(Debug, Clone, PartialEq)]
pub struct Paper {
    /// Short id as arXiv prints it, version suffix included (`2501.01234v1`)
    pub short_id: String,
    pub info: PaperInfo,
}

/// What gets stored per paper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperInfo {
    pub title: String,
    pub authors: Vec<String>,
    pub summary: String,
    pub pdf_url: Option<String>,
    /// Publication date, `YYYY-MM-DD`
    pub published: String,
}

#[derive(Clone)]
pub struct ArxivClient {
    http: Client,
    base: String,
}

impl ArxivClient {
    pub fn new(config: &ArxivConfig) -> Result<Self, ArxivError> {
        let http = Client::builder()
            .user_agent(concat!("toolmux-arxiv/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base: config.api_url.clone(),
        })
    }

    /// Relevance-sorted search for `topic`
    pub async fn search(&self, topic: &str, max_results: usize) -> Result<Vec<Paper>, ArxivError> {
        debug!(topic, max_results, "Searching arXiv");
        let response = self
            .http
            .get(&self.base)
            .query(&[("search_query", topic)])
            .query(&[("start", 0), ("max_results", max_results)])
            .query(&[("sortBy", "relevance"), ("sortOrder", "descending")])
            .header(ACCEPT, "application/atom+xml, application/xml;q=0.9, text/xml;q=0.8")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArxivError::Api {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let mut papers = parse_feed(&body)?;
        papers.truncate(max_results);
        Ok(papers)
    }
}

#[derive(Clone, Copy)]
enum Field {
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
}

#[derive(Default)]
struct EntryBuilder {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    pdf_url: Option<String>,
    in_author: bool,
}

impl EntryBuilder {
    fn finish(self) -> Option<Paper> {
        let short_id = short_id(&self.id)?;
        Some(Paper {
            short_id,
            info: PaperInfo {
                title: collapse_whitespace(&self.title),
                authors: self.authors,
                summary: self.summary.trim().to_string(),
                pdf_url: self.pdf_url,
                published: published_date(&self.published),
            },
        })
    }

    fn link(&mut self, element: &BytesStart<'_>) {
        let mut href = None;
        let mut is_pdf = false;
        for attr in element.attributes().flatten() {
            let value = String::from_utf8_lossy(&attr.value).to_string();
            match attr.key.local_name().as_ref() {
                b"href" => href = Some(value),
                b"title" if value.eq_ignore_ascii_case("pdf") => is_pdf = true,
                b"type" if value == "application/pdf" => is_pdf = true,
                _ => {}
            }
        }
        if is_pdf && self.pdf_url.is_none() {
            self.pdf_url = href;
        }
    }
}

/// Parse an arXiv Atom response into papers, in feed order
pub fn parse_feed(xml: &str) -> Result<Vec<Paper>, ArxivError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut papers = Vec::new();

    let mut entry: Option<EntryBuilder> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"entry" {
                    entry = Some(EntryBuilder::default());
                } else if let Some(current) = entry.as_mut() {
                    match name.as_ref() {
                        b"author" => current.in_author = true,
                        b"link" => current.link(&e),
                        tag => {
                            field = match tag {
                                b"id" => Some(Field::Id),
                                b"title" => Some(Field::Title),
                                b"summary" => Some(Field::Summary),
                                b"published" => Some(Field::Published),
                                b"name" if current.in_author => Some(Field::AuthorName),
                                _ => None,
                            };
                            text.clear();
                        }
                    }
                }
            }
            // Links are usually self-closing
            Ok(Event::Empty(e)) => {
                if let (b"link", Some(current)) = (e.local_name().as_ref(), entry.as_mut()) {
                    current.link(&e);
                }
            }
            Ok(Event::Text(t)) => {
                if field.is_some() {
                    let unescaped = t
                        .unescape()
                        .map_err(|e| ArxivError::Feed(e.to_string()))?;
                    text.push_str(&unescaped);
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"entry" => {
                        if let Some(paper) = entry.take().and_then(EntryBuilder::finish) {
                            papers.push(paper);
                        }
                    }
                    b"author" => {
                        if let Some(current) = entry.as_mut() {
                            current.in_author = false;
                        }
                    }
                    _ => {
                        if let (Some(done), Some(current)) = (field.take(), entry.as_mut()) {
                            let value = std::mem::take(&mut text);
                            match done {
                                Field::Id => current.id = value,
                                Field::Title => current.title = value,
                                Field::Summary => current.summary = value,
                                Field::Published => current.published = value,
                                Field::AuthorName => current.authors.push(collapse_whitespace(&value)),
                            }
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ArxivError::Feed(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(papers)
}

/// `http://arxiv.org/abs/2501.01234v1` → `2501.01234v1`;
/// old-style `abs/hep-th/9901001v2` keeps its archive prefix
fn short_id(entry_id: &str) -> Option<String> {
    let id = entry_id.trim();
    let short = match id.split_once("/abs/") {
        Some((_, rest)) => rest,
        None => id.rsplit('/').next().unwrap_or(id),
    };
    (!short.is_empty()).then(|| short.to_string())
}

fn published_date(raw: &str) -> String {
    let raw = raw.trim();
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive().to_string())
        .unwrap_or_else(|_| raw.chars().take(10).collect())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
