use anyhow::{anyhow, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use url::Url;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PaperRecord {
    /// Short arXiv identifier, e.g. `2410.01234v2`.
    pub arxiv_id: String,
    pub entry_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub summary: String,
    pub published: DateTime<FixedOffset>,
    pub updated: Option<DateTime<FixedOffset>>,
    pub primary_category: Option<String>,
    pub pdf_url: String,
}

impl PaperRecord {
    /// `<arxiv-id>.pdf`; the on-disk name doubles as the skip-if-present key.
    pub fn file_name(&self) -> String {
        format!("{}.pdf", self.arxiv_id)
    }
}

/// Last path segment of a PDF URL, without any `.pdf` suffix.
pub fn identifier_from_pdf_url(pdf_url: &str) -> Option<String> {
    let last = match Url::parse(pdf_url) {
        Ok(url) => url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(str::to_string),
        Err(_) => pdf_url.rsplit('/').next().map(str::to_string),
    }?;
    let id = last.strip_suffix(".pdf").unwrap_or(&last);
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl Combinator {
    pub fn separator(self) -> &'static str {
        match self {
            Combinator::And => " AND ",
            Combinator::Or => " OR ",
        }
    }
}

/// A `YYYYMM` month, used for inclusive submission date bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(0..=9999).contains(&year) {
            return Err(anyhow!("year out of range: {}", year));
        }
        if !(1..=12).contains(&month) {
            return Err(anyhow!("month out of range: {}", month));
        }
        Ok(Self { year, month })
    }

    pub fn first_instant(self) -> NaiveDateTime {
        // year and month are range-checked in `new`
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or(NaiveDateTime::MIN)
    }

    /// Last representable instant of the month (`23:59:59.999999999` on its final day).
    pub fn last_instant(self) -> NaiveDateTime {
        let next_month_start = if self.month == 12 {
            NaiveDate::from_ymd_opt(self.year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(self.year, self.month + 1, 1)
        };
        let last_day = next_month_start
            .and_then(|d| d.pred_opt())
            .unwrap_or(NaiveDate::MAX);
        last_day
            .and_hms_nano_opt(23, 59, 59, 999_999_999)
            .unwrap_or(NaiveDateTime::MAX)
    }
}

impl FromStr for YearMonth {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != 6 || !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(anyhow!("expected YYYYMM, got '{}'", s));
        }
        let year: i32 = s[..4].parse()?;
        let month: u32 = s[4..].parse()?;
        YearMonth::new(year, month)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

pub struct SearchCriteria {
    pub keywords: Vec<String>,
    pub combinator: Combinator,
    pub max_results: usize,
    pub date_from: Option<YearMonth>,
    pub date_to: Option<YearMonth>,
}

impl SearchCriteria {
    pub fn has_date_bounds(&self) -> bool {
        self.date_from.is_some() || self.date_to.is_some()
    }
}

pub mod query;
pub mod discovery;
pub mod screening;
pub mod download;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_month_parses_and_displays() {
        let ym: YearMonth = "202410".parse().unwrap();
        assert_eq!(ym, YearMonth { year: 2024, month: 10 });
        assert_eq!(ym.to_string(), "202410");
    }

    #[test]
    fn test_year_month_rejects_bad_input() {
        assert!("2024".parse::<YearMonth>().is_err());
        assert!("202413".parse::<YearMonth>().is_err());
        assert!("202400".parse::<YearMonth>().is_err());
        assert!("2024-1".parse::<YearMonth>().is_err());
    }

    #[test]
    fn test_year_month_sentinels_display_verbatim() {
        assert_eq!("000001".parse::<YearMonth>().unwrap().to_string(), "000001");
        assert_eq!("999912".parse::<YearMonth>().unwrap().to_string(), "999912");
    }

    #[test]
    fn test_last_instant_handles_month_lengths() {
        let feb_leap = YearMonth::new(2024, 2).unwrap().last_instant();
        assert_eq!(feb_leap.date(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let dec = YearMonth::new(2025, 12).unwrap().last_instant();
        assert_eq!(dec.date(), NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert_eq!(dec.format("%H:%M:%S").to_string(), "23:59:59");
    }

    #[test]
    fn test_first_instant_is_midnight_on_the_first() {
        let first = YearMonth::new(2024, 10).unwrap().first_instant();
        assert_eq!(first.to_string(), "2024-10-01 00:00:00");
    }

    #[test]
    fn test_identifier_from_pdf_url() {
        assert_eq!(
            identifier_from_pdf_url("http://arxiv.org/pdf/2410.01234v2").as_deref(),
            Some("2410.01234v2")
        );
        assert_eq!(
            identifier_from_pdf_url("https://arxiv.org/pdf/2410.01234v2.pdf").as_deref(),
            Some("2410.01234v2")
        );
        assert_eq!(
            identifier_from_pdf_url("http://arxiv.org/pdf/hep-th/9901001v1").as_deref(),
            Some("9901001v1")
        );
        assert_eq!(identifier_from_pdf_url("http://arxiv.org/pdf/"), None);
    }

    #[test]
    fn test_file_name_enforces_pdf_suffix() {
        let published = DateTime::parse_from_rfc3339("2024-10-01T00:00:00Z").unwrap();
        let paper = PaperRecord {
            arxiv_id: identifier_from_pdf_url("http://arxiv.org/pdf/2410.01234v2.pdf").unwrap(),
            entry_id: "http://arxiv.org/abs/2410.01234v2".to_string(),
            title: "T".to_string(),
            authors: vec![],
            summary: String::new(),
            published,
            updated: None,
            primary_category: None,
            pdf_url: "http://arxiv.org/pdf/2410.01234v2.pdf".to_string(),
        };
        assert_eq!(paper.file_name(), "2410.01234v2.pdf");
    }

    #[test]
    fn test_combinator_separator() {
        assert_eq!(Combinator::And.separator(), " AND ");
        assert_eq!(Combinator::Or.separator(), " OR ");
    }
}
