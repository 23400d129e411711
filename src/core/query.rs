//! Post search parameters: filters, sort order and date handling.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use super::error::{CatalogError, CatalogResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Newest first; posts without a usable date come last.
    #[default]
    Date,
    /// Most liked first.
    Popularity,
    /// Most commented first.
    Comments,
}

impl FromStr for SortOrder {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "date" => Ok(Self::Date),
            "popularity" | "likes" => Ok(Self::Popularity),
            "comments" => Ok(Self::Comments),
            other => Err(CatalogError::invalid(format!(
                "unknown sort order '{}' (must be: date|popularity|comments)",
                other
            ))),
        }
    }
}

/// Raw filter values as they arrive from a form, query string or CLI flag.
/// Blank strings mean "no filter".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub file_type: Option<String>,
    pub department: Option<String>,
    pub user: Option<String>,
}

/// Filters after validation. Date bounds are parsed calendar dates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidFilters {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub file_type: Option<String>,
    pub department: Option<String>,
    pub user: Option<String>,
}

impl SearchFilters {
    pub fn validate(&self) -> CatalogResult<ValidFilters> {
        let start_date = non_blank(&self.start_date)
            .map(|d| parse_filter_date("start_date", d))
            .transpose()?;
        let end_date = non_blank(&self.end_date)
            .map(|d| parse_filter_date("end_date", d))
            .transpose()?;

        if let (Some(start), Some(end)) = (start_date, end_date) {
            if start > end {
                return Err(CatalogError::invalid(format!(
                    "start_date {} is after end_date {}",
                    start, end
                )));
            }
        }

        Ok(ValidFilters {
            start_date,
            end_date,
            file_type: non_blank(&self.file_type).map(String::from),
            department: non_blank(&self.department).map(String::from),
            user: non_blank(&self.user).map(String::from),
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_filter_date(field: &str, value: &str) -> CatalogResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        CatalogError::invalid(format!(
            "{} '{}' is not a YYYY-MM-DD date",
            field, value
        ))
    })
}

/// Parse a stored post date. Accepts `YYYY-MM-DD` or an RFC 3339 timestamp.
pub fn parse_post_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
}

impl ValidFilters {
    /// Whether a post date satisfies the date bounds. Without bounds every
    /// post passes; with a bound, an unusable date never does.
    pub fn date_in_range(&self, date: Option<&str>) -> bool {
        if self.start_date.is_none() && self.end_date.is_none() {
            return true;
        }
        let Some(date) = date.and_then(parse_post_date) else {
            return false;
        };
        self.start_date.map_or(true, |start| date >= start)
            && self.end_date.map_or(true, |end| date <= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_order_parse() {
        assert_eq!("".parse::<SortOrder>().unwrap(), SortOrder::Date);
        assert_eq!("Popularity".parse::<SortOrder>().unwrap(), SortOrder::Popularity);
        assert_eq!("comments".parse::<SortOrder>().unwrap(), SortOrder::Comments);
        assert!("random".parse::<SortOrder>().is_err());
    }

    #[test]
    fn test_malformed_date_filter_is_reported() {
        let filters = SearchFilters {
            start_date: Some("2024/01/05".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            filters.validate(),
            Err(CatalogError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_blank_filters_are_ignored() {
        let filters = SearchFilters {
            start_date: Some("  ".to_string()),
            user: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(filters.validate().unwrap(), ValidFilters::default());
    }

    #[test]
    fn test_date_range_is_inclusive_and_calendar_aware() {
        let filters = SearchFilters {
            start_date: Some("2024-01-05".to_string()),
            end_date: Some("2024-02-01".to_string()),
            ..Default::default()
        }
        .validate()
        .unwrap();

        assert!(filters.date_in_range(Some("2024-01-05")));
        assert!(filters.date_in_range(Some("2024-02-01T23:10:00Z")));
        assert!(!filters.date_in_range(Some("2024-02-02")));
        // Not zero padded; a string comparison would put it after 2024-02-01
        assert!(filters.date_in_range(Some("2024-1-9")));
        assert!(!filters.date_in_range(None));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let filters = SearchFilters {
            start_date: Some("2024-03-01".to_string()),
            end_date: Some("2024-02-01".to_string()),
            ..Default::default()
        };
        assert!(filters.validate().is_err());
    }
}
