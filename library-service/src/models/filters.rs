//! Listing filters, sorting and pagination metadata.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_PAGE_SIZE: u32 = 5;
pub const MAX_PAGE: u32 = 10_000_000;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Id,
    Title,
    Date,
}

impl SortColumn {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Title => "title",
            Self::Date => "date",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Validated paging and sort parameters. Sorting is restricted to a fixed
/// set of columns, optionally prefixed with `-` for descending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filters {
    pub page: u32,
    pub page_size: u32,
    pub sort: SortColumn,
    pub direction: SortDirection,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort: SortColumn::Id,
            direction: SortDirection::Asc,
        }
    }
}

impl Filters {
    /// Parse raw query values, collecting one message per offending field.
    pub fn parse(
        page: Option<&str>,
        page_size: Option<&str>,
        sort: Option<&str>,
    ) -> Result<Self, BTreeMap<String, String>> {
        let mut errors = BTreeMap::new();
        let mut filters = Filters::default();

        if let Some(page) = read_int(page, "page", &mut errors) {
            if page < 1 {
                errors.insert("page".into(), "must be greater than or equal to 1".into());
            } else if page > i64::from(MAX_PAGE) {
                errors.insert("page".into(), "must be less than or equal to 10 000 000".into());
            } else {
                filters.page = page as u32;
            }
        }

        if let Some(page_size) = read_int(page_size, "page_size", &mut errors) {
            if page_size < 1 {
                errors.insert("page_size".into(), "must be greater than or equal to 1".into());
            } else if page_size > i64::from(MAX_PAGE_SIZE) {
                errors.insert("page_size".into(), "must be less than or equal to 100".into());
            } else {
                filters.page_size = page_size as u32;
            }
        }

        if let Some(sort) = sort.filter(|s| !s.is_empty()) {
            let (direction, column) = match sort.strip_prefix('-') {
                Some(column) => (SortDirection::Desc, column),
                None => (SortDirection::Asc, sort),
            };
            let column = match column {
                "id" => Some(SortColumn::Id),
                "title" => Some(SortColumn::Title),
                "date" => Some(SortColumn::Date),
                _ => None,
            };
            match column {
                Some(column) => {
                    filters.sort = column;
                    filters.direction = direction;
                }
                None => {
                    errors.insert("sort".into(), "invalid sort value".into());
                }
            }
        }

        if errors.is_empty() {
            Ok(filters)
        } else {
            Err(errors)
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn offset(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.page_size)
    }
}

fn read_int(value: Option<&str>, field: &str, errors: &mut BTreeMap<String, String>) -> Option<i64> {
    let value = value.filter(|v| !v.is_empty())?;
    match value.parse::<i64>() {
        Ok(n) => Some(n),
        Err(_) => {
            errors.insert(field.to_string(), "must be an integer value".to_string());
            None
        }
    }
}

/// Criteria for listing events.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Full-text match on the title; empty matches everything.
    pub title: String,
    pub date: Option<NaiveDate>,
    pub filters: Filters,
}

/// Pagination summary returned alongside a page of results. All zero when
/// nothing matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: u32,
    #[serde(skip_serializing_if = "is_zero_i64")]
    pub total_records: i64,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

fn is_zero_i64(n: &i64) -> bool {
    *n == 0
}

impl Metadata {
    pub fn calculate(total_records: i64, page: u32, page_size: u32) -> Self {
        if total_records <= 0 || page_size == 0 {
            return Self::default();
        }

        let page_size_i = i64::from(page_size);
        let last_page = (total_records + page_size_i - 1) / page_size_i;

        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: u32::try_from(last_page).unwrap_or(u32::MAX),
            total_records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_parameters_absent() {
        let filters = Filters::parse(None, None, None).unwrap();
        assert_eq!(filters, Filters::default());
        assert_eq!(filters.limit(), 5);
        assert_eq!(filters.offset(), 0);
    }

    #[test]
    fn test_descending_sort_and_offset() {
        let filters = Filters::parse(Some("3"), Some("20"), Some("-date")).unwrap();
        assert_eq!(filters.sort, SortColumn::Date);
        assert_eq!(filters.direction, SortDirection::Desc);
        assert_eq!(filters.offset(), 40);
    }

    #[test]
    fn test_invalid_values_are_reported_per_field() {
        let errors = Filters::parse(Some("0"), Some("abc"), Some("password")).unwrap_err();
        assert_eq!(errors["page"], "must be greater than or equal to 1");
        assert_eq!(errors["page_size"], "must be an integer value");
        assert_eq!(errors["sort"], "invalid sort value");

        let errors = Filters::parse(Some("10000001"), Some("101"), None).unwrap_err();
        assert!(errors.contains_key("page"));
        assert!(errors.contains_key("page_size"));
    }

    #[test]
    fn test_metadata_rounds_last_page_up() {
        let metadata = Metadata::calculate(11, 2, 5);
        assert_eq!(metadata.first_page, 1);
        assert_eq!(metadata.last_page, 3);
        assert_eq!(metadata.current_page, 2);
        assert_eq!(metadata.total_records, 11);
    }

    #[test]
    fn test_metadata_is_empty_without_records() {
        assert_eq!(Metadata::calculate(0, 1, 5), Metadata::default());
        assert_eq!(serde_json::to_value(Metadata::default()).unwrap(), serde_json::json!({}));
    }
}
