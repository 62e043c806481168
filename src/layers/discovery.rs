use anyhow::{anyhow, Result};
use chrono::DateTime;
use governor::clock::DefaultClock;
use governor::state::{direct::NotKeyed, InMemoryState};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::layers::query::QueryBuilder;
use crate::layers::{identifier_from_pdf_url, PaperRecord, SearchCriteria};

/// One page of the arXiv Atom feed.
#[derive(Debug, Default)]
pub struct FeedPage {
    pub total_results: Option<usize>,
    /// `<entry>` elements in the feed, including ones that were skipped.
    pub entry_count: usize,
    pub papers: Vec<PaperRecord>,
}

pub struct ArxivClient {
    client: Client,
    base_url: String,
    page_size: usize,
    num_retries: u32,
    limiter: Option<Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>>,
}

impl ArxivClient {
    pub fn new(base_url: impl Into<String>, page_size: usize, page_delay: Duration, num_retries: u32) -> Self {
        // arXiv asks for no more than one API call every three seconds
        let limiter = Quota::with_period(page_delay)
            .map(|quota| Arc::new(RateLimiter::direct(quota.allow_burst(nonzero!(1u32)))));

        Self {
            client: Client::new(),
            base_url: base_url.into(),
            page_size: page_size.max(1),
            num_retries,
            limiter,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.api_url.clone(), config.page_size, config.page_delay, config.num_retries)
    }

    pub fn page_url(&self, query: &str, start: usize, count: usize) -> String {
        format!(
            "{}?search_query={}&start={}&max_results={}&sortBy=submittedDate&sortOrder=descending",
            self.base_url,
            urlencoding::encode(query),
            start,
            count
        )
    }

    /// Runs the search, newest submissions first, paging until `max_results`
    /// records are collected or the feed runs out.
    pub async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<PaperRecord>> {
        let query = QueryBuilder::build(criteria);
        tracing::info!("arXiv query: {}", query);

        let mut papers: Vec<PaperRecord> = Vec::new();
        let mut start = 0;

        while papers.len() < criteria.max_results {
            let want = self.page_size.min(criteria.max_results - papers.len());
            let page = self.fetch_page(&query, start, want).await?;
            // offsets follow the feed, not the entries that parsed
            let got = page.entry_count;
            papers.extend(page.papers);
            start += got;

            if got < want {
                break;
            }
            if let Some(total) = page.total_results {
                if start >= total {
                    break;
                }
            }
        }

        papers.truncate(criteria.max_results);
        Ok(papers)
    }

    async fn fetch_page(&self, query: &str, start: usize, count: usize) -> Result<FeedPage> {
        let mut last_error = None;

        for attempt in 0..=self.num_retries {
            if attempt > 0 {
                tracing::warn!("Retrying arXiv page at offset {} (attempt {}/{})", start, attempt, self.num_retries);
            }
            match self.request_page(query, start, count).await {
                Ok(page) if page.entry_count == 0 && page.total_results.is_some_and(|t| start < t) => {
                    last_error = Some(anyhow!(
                        "arXiv returned an empty page at offset {} of {} results",
                        start,
                        page.total_results.unwrap_or_default()
                    ));
                }
                Ok(page) => return Ok(page),
                Err(e) => {
                    tracing::warn!("arXiv page request failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("arXiv page request failed at offset {}", start)))
    }

    async fn request_page(&self, query: &str, start: usize, count: usize) -> Result<FeedPage> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let url = self.page_url(query, start, count);
        tracing::info!("Querying arXiv: {}", url);

        match self.client.get(&url).send().await {
            Ok(resp) => {
                if !resp.status().is_success() {
                    return Err(anyhow!("arXiv API error: {}", resp.status()));
                }
                let text = resp.text().await?;
                parse_feed(&text)
            }
            Err(e) => Err(anyhow!("Request failed: {}", e)),
        }
    }
}

#[derive(PartialEq)]
enum TagState {
    None,
    Id,
    Title,
    Summary,
    Published,
    Updated,
    AuthorName,
    TotalResults,
}

#[derive(Default)]
struct EntryFields {
    id: String,
    title: String,
    summary: String,
    published: String,
    updated: String,
    authors: Vec<String>,
    author_name: String,
    /// (href, title, type)
    links: Vec<(String, String, String)>,
    primary_category: Option<String>,
}

impl EntryFields {
    fn push_text(&mut self, state: &TagState, text: &str) {
        match state {
            TagState::Id => self.id.push_str(text),
            TagState::Title => self.title.push_str(text),
            TagState::Summary => self.summary.push_str(text),
            TagState::Published => self.published.push_str(text),
            TagState::Updated => self.updated.push_str(text),
            TagState::AuthorName => self.author_name.push_str(text),
            TagState::TotalResults | TagState::None => {}
        }
    }

    fn pdf_url(&self) -> Option<String> {
        self.links
            .iter()
            .find(|(_, t, _)| t == "pdf")
            .or_else(|| self.links.iter().find(|(_, _, ty)| ty == "application/pdf"))
            .map(|(h, _, _)| h.clone())
            .or_else(|| {
                let id = self.id.trim();
                id.contains("/abs/").then(|| id.replacen("/abs/", "/pdf/", 1))
            })
    }

    fn into_record(self) -> Result<PaperRecord> {
        let entry_id = self.id.trim().to_string();
        let pdf_url = self
            .pdf_url()
            .ok_or_else(|| anyhow!("no PDF link for entry '{}'", entry_id))?;
        let arxiv_id = identifier_from_pdf_url(&pdf_url)
            .ok_or_else(|| anyhow!("cannot derive identifier from '{}'", pdf_url))?;
        let published = DateTime::parse_from_rfc3339(self.published.trim())
            .map_err(|e| anyhow!("bad published date '{}' for {}: {}", self.published.trim(), entry_id, e))?;
        let updated = DateTime::parse_from_rfc3339(self.updated.trim()).ok();

        Ok(PaperRecord {
            arxiv_id,
            entry_id,
            title: collapse_whitespace(&self.title),
            authors: self.authors,
            summary: self.summary.trim().to_string(),
            published,
            updated,
            primary_category: self.primary_category,
            pdf_url,
        })
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn read_link(e: &BytesStart) -> (String, String, String) {
    let mut href = String::new();
    let mut title_attr = String::new();
    let mut type_attr = String::new();
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"href" => href = String::from_utf8_lossy(&attr.value).to_string(),
            b"title" => title_attr = String::from_utf8_lossy(&attr.value).to_string(),
            b"type" => type_attr = String::from_utf8_lossy(&attr.value).to_string(),
            _ => {}
        }
    }
    (href, title_attr, type_attr)
}

fn read_term(e: &BytesStart) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == b"term")
        .map(|attr| String::from_utf8_lossy(&attr.value).to_string())
}

/// Entity references arrive as separate events; resolve the ones Atom feeds use.
fn resolve_entity(name: &str) -> Option<String> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    quick_xml::escape::resolve_predefined_entity(name).map(str::to_string)
}

/// Parses one page of the arXiv Atom feed. Entries that cannot be turned
/// into a [`PaperRecord`] are logged and skipped.
pub fn parse_feed(xml: &str) -> Result<FeedPage> {
    let mut reader = Reader::from_str(xml);

    let mut page = FeedPage::default();
    let mut buf = Vec::new();
    let mut total_text = String::new();

    let mut entry: Option<EntryFields> = None;
    let mut state = TagState::None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match (e.local_name().as_ref(), entry.is_some()) {
                (b"entry", _) => {
                    entry = Some(EntryFields::default());
                    state = TagState::None;
                }
                (b"totalResults", false) => state = TagState::TotalResults,
                (b"id", true) => state = TagState::Id,
                (b"title", true) => state = TagState::Title,
                (b"summary", true) => state = TagState::Summary,
                (b"published", true) => state = TagState::Published,
                (b"updated", true) => state = TagState::Updated,
                (b"name", true) => state = TagState::AuthorName,
                (b"link", true) => {
                    if let Some(fields) = entry.as_mut() {
                        fields.links.push(read_link(&e));
                    }
                    state = TagState::None;
                }
                (b"primary_category", true) => {
                    if let Some(fields) = entry.as_mut() {
                        fields.primary_category = read_term(&e);
                    }
                    state = TagState::None;
                }
                _ => state = TagState::None,
            },
            Ok(Event::Empty(e)) => {
                if let Some(fields) = entry.as_mut() {
                    match e.local_name().as_ref() {
                        b"link" => {
                            let link = read_link(&e);
                            tracing::debug!("Found link in entry {}: href={}, title={}, type={}", fields.id.trim(), link.0, link.1, link.2);
                            fields.links.push(link);
                        }
                        b"primary_category" => fields.primary_category = read_term(&e),
                        _ => {}
                    }
                }
            }
            Ok(Event::Text(e)) => {
                let txt = String::from_utf8_lossy(&e.into_inner()).into_owned();
                match (&mut entry, &state) {
                    (_, TagState::TotalResults) => total_text.push_str(&txt),
                    (Some(fields), state) => fields.push_text(state, &txt),
                    (None, _) => {}
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(fields) = entry.as_mut() {
                    let txt = String::from_utf8_lossy(&e.into_inner()).into_owned();
                    fields.push_text(&state, &txt);
                }
            }
            Ok(Event::GeneralRef(e)) => {
                let name = String::from_utf8_lossy(&e.into_inner()).into_owned();
                match resolve_entity(&name) {
                    Some(resolved) => {
                        if let Some(fields) = entry.as_mut() {
                            fields.push_text(&state, &resolved);
                        }
                    }
                    None => tracing::debug!("Unresolved entity &{};", name),
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"entry" => {
                    state = TagState::None;
                    page.entry_count += 1;
                    if let Some(fields) = entry.take() {
                        match fields.into_record() {
                            Ok(paper) => {
                                tracing::debug!("Parsed arXiv entry: Title='{}', ID='{}'", paper.title, paper.arxiv_id);
                                page.papers.push(paper);
                            }
                            Err(err) => tracing::warn!("Skipping arXiv entry: {}", err),
                        }
                    }
                }
                b"name" => {
                    if let Some(fields) = entry.as_mut() {
                        let name = collapse_whitespace(&fields.author_name);
                        if !name.is_empty() {
                            fields.authors.push(name);
                        }
                        fields.author_name.clear();
                    }
                    state = TagState::None;
                }
                _ => state = TagState::None,
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(anyhow!("XML parsing error at position {}: {:?}", reader.buffer_position(), e));
            }
            _ => {}
        }
        buf.clear();
    }

    page.total_results = total_text.trim().parse().ok();
    Ok(page)
}
