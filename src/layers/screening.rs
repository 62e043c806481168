// Client-side date screening of search results
use chrono::NaiveDateTime;
use crate::layers::{PaperRecord, YearMonth};

/// Inclusive submission window. Either side may be open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateWindow {
    from: Option<NaiveDateTime>,
    to: Option<NaiveDateTime>,
}

impl DateWindow {
    pub fn new(from: Option<YearMonth>, to: Option<YearMonth>) -> Option<Self> {
        if from.is_none() && to.is_none() {
            return None;
        }
        Some(Self {
            from: from.map(YearMonth::first_instant),
            to: to.map(YearMonth::last_instant),
        })
    }

    /// The offset is dropped and the wall-clock time compared as-is.
    pub fn contains(&self, paper: &PaperRecord) -> bool {
        let published = paper.published.naive_local();
        if let Some(from) = self.from {
            if published < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if published > to {
                return false;
            }
        }
        true
    }

    pub fn retain(&self, papers: Vec<PaperRecord>) -> Vec<PaperRecord> {
        let before = papers.len();
        let kept: Vec<PaperRecord> = papers
            .into_iter()
            .filter(|p| {
                let keep = self.contains(p);
                if !keep {
                    tracing::debug!("Dropping {} published {} (outside date window)", p.arxiv_id, p.published);
                }
                keep
            })
            .collect();
        tracing::info!("Date screening kept {} of {} records", kept.len(), before);
        kept
    }
}
