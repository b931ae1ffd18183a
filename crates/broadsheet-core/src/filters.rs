//! Metadata predicates applied to retrieval candidates.
//!
//! Filters are logically a post-filter over candidate ids; the article
//! store evaluates them against its rows. Source and author are exact
//! string equality, date predicates compare against `published_date`, and
//! all predicates conjoin.

use crate::error::SearchError;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Recognized date ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateRange {
    PastWeek,
    PastMonth,
    /// Past 90 days. Front ends disagree on the spelling; both
    /// `past_3_months` and `past_3months` parse to this variant.
    PastThreeMonths,
    PastYear,
    /// A calendar decade: 1990, 2000, 2010, 2020
    Decade(u16),
    /// Inclusive custom range; either bound may be open
    Custom {
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
}

impl DateRange {
    /// Parses a date-range preset name.
    pub fn parse(name: &str) -> Result<Self, SearchError> {
        match name.to_ascii_lowercase().as_str() {
            "past_week" => Ok(DateRange::PastWeek),
            "past_month" => Ok(DateRange::PastMonth),
            "past_3_months" | "past_3months" => Ok(DateRange::PastThreeMonths),
            "past_year" => Ok(DateRange::PastYear),
            "1990s" => Ok(DateRange::Decade(1990)),
            "2000s" => Ok(DateRange::Decade(2000)),
            "2010s" => Ok(DateRange::Decade(2010)),
            "2020s" => Ok(DateRange::Decade(2020)),
            other => Err(SearchError::MalformedFilter(format!(
                "unknown date range: {other}"
            ))),
        }
    }

    /// Whether a publication timestamp falls inside the range.
    pub fn contains(&self, published: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            DateRange::PastWeek => published >= now - Duration::days(7),
            DateRange::PastMonth => published >= now - Duration::days(30),
            DateRange::PastThreeMonths => published >= now - Duration::days(90),
            DateRange::PastYear => published >= now - Duration::days(365),
            DateRange::Decade(start_year) => {
                let year = published.year();
                year >= *start_year as i32 && year < *start_year as i32 + 10
            }
            DateRange::Custom { start, end } => {
                let date = published.date_naive();
                start.map_or(true, |s| date >= s) && end.map_or(true, |e| date <= e)
            }
        }
    }
}

/// A validated filter specification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Exact source name
    pub source: Option<String>,
    /// Exact author name
    pub author: Option<String>,
    pub date_range: Option<DateRange>,
    /// Exact publication year
    pub published_year: Option<i32>,
    /// Minimum article word count
    pub min_word_count: Option<u32>,
}

impl FilterSpec {
    /// Builds a validated spec from raw string parameters, as received from
    /// a front end. A named range and custom bounds are mutually exclusive;
    /// invalid names or dates surface `MalformedFilter`.
    pub fn from_params(
        source: Option<&str>,
        author: Option<&str>,
        date_range: Option<&str>,
        custom_start: Option<&str>,
        custom_end: Option<&str>,
    ) -> Result<Self, SearchError> {
        let date_range = match date_range {
            Some(name) if !name.is_empty() => Some(DateRange::parse(name)?),
            _ => {
                let start = custom_start.map(parse_iso_date).transpose()?;
                let end = custom_end.map(parse_iso_date).transpose()?;
                if start.is_some() || end.is_some() {
                    if let (Some(s), Some(e)) = (start, end) {
                        if s > e {
                            return Err(SearchError::MalformedFilter(format!(
                                "start date {s} is after end date {e}"
                            )));
                        }
                    }
                    Some(DateRange::Custom { start, end })
                } else {
                    None
                }
            }
        };

        Ok(Self {
            source: source.filter(|s| !s.is_empty()).map(str::to_string),
            author: author.filter(|a| !a.is_empty()).map(str::to_string),
            date_range,
            published_year: None,
            min_word_count: None,
        })
    }

    /// True when no predicate is set.
    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.author.is_none()
            && self.date_range.is_none()
            && self.published_year.is_none()
            && self.min_word_count.is_none()
    }

    /// Evaluates all predicates conjunctively against article metadata.
    pub fn matches(
        &self,
        source: &str,
        author: Option<&str>,
        published: DateTime<Utc>,
        word_count: u32,
        now: DateTime<Utc>,
    ) -> bool {
        if let Some(want) = &self.source {
            if want != source {
                return false;
            }
        }
        if let Some(want) = &self.author {
            if author != Some(want.as_str()) {
                return false;
            }
        }
        if let Some(range) = &self.date_range {
            if !range.contains(published, now) {
                return false;
            }
        }
        if let Some(year) = self.published_year {
            if published.year() != year {
                return false;
            }
        }
        if let Some(min) = self.min_word_count {
            if word_count < min {
                return false;
            }
        }
        true
    }
}

fn parse_iso_date(raw: &str) -> Result<NaiveDate, SearchError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| SearchError::MalformedFilter(format!("invalid date: {raw}")))
}
