use crate::layers::{SearchCriteria, YearMonth};

/// Lower bound used when only `--date-to` is given.
pub const EARLIEST_MONTH: &str = "000001";
/// Upper bound used when only `--date-from` is given.
pub const LATEST_MONTH: &str = "999912";

pub struct QueryBuilder;

impl QueryBuilder {
    /// Builds the arXiv `search_query` value for the given criteria.
    ///
    /// Keywords are passed through untouched; the remote service reports
    /// its own syntax errors.
    pub fn build(criteria: &SearchCriteria) -> String {
        let keywords = criteria.keywords.join(criteria.combinator.separator());

        if !criteria.has_date_bounds() {
            return keywords;
        }

        format!(
            "({}) AND {}",
            keywords,
            Self::date_clause(criteria.date_from, criteria.date_to)
        )
    }

    pub fn date_clause(from: Option<YearMonth>, to: Option<YearMonth>) -> String {
        let from = from.map(|ym| ym.to_string()).unwrap_or_else(|| EARLIEST_MONTH.to_string());
        let to = to.map(|ym| ym.to_string()).unwrap_or_else(|| LATEST_MONTH.to_string());
        format!("submittedDate:[{} TO {}]", from, to)
    }
}
