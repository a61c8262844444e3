//! Page position, size and sort order of a root query
//!
//! `offset` is always derived from `page` and `size` (or the reverse when an
//! offset is set directly); the three are never mutated independently.

use crate::config::QueryConfig;
use crate::error::{Error, Result};
use crate::query::{SortDirection, SortKey};
use serde::Serialize;

/// Largest offset a store accepts; PostgreSQL `OFFSET` is a bigint.
pub const MAX_OFFSET: u64 = i64::MAX as u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pager {
    page: u64,
    size: usize,
    zero_based: bool,
    offset: u64,
    sort: Vec<SortKey>,
    count_enabled: bool,
}

impl Default for Pager {
    fn default() -> Self {
        Self::new(1, QueryConfig::default().default_page_size)
    }
}

impl Pager {
    /// One-based pager. A page past the last addressable offset is clamped.
    pub fn new(page: u64, size: usize) -> Self {
        let mut pager = Self {
            page: 1,
            size,
            zero_based: false,
            offset: 0,
            sort: Vec::new(),
            count_enabled: true,
        };
        pager.move_to(page);
        pager
    }

    pub fn zero_based(page: u64, size: usize) -> Self {
        let mut pager = Self::new(1, size);
        pager.zero_based = true;
        pager.move_to(page);
        pager
    }

    /// Pager with the configured default size, base and counting behavior.
    pub fn from_config(config: &QueryConfig) -> Self {
        let mut pager = if config.zero_based_pages {
            Self::zero_based(0, config.default_page_size)
        } else {
            Self::new(1, config.default_page_size)
        };
        pager.count_enabled = config.count_by_default;
        pager
    }

    fn first_page(&self) -> u64 {
        if self.zero_based {
            0
        } else {
            1
        }
    }

    fn offset_for(&self, page: u64, size: usize) -> Option<u64> {
        (page - self.first_page())
            .checked_mul(size as u64)
            .filter(|offset| *offset <= MAX_OFFSET)
    }

    /// `set_page`, clamping to the last addressable page.
    fn move_to(&mut self, page: u64) {
        if self.set_page(page).is_err() {
            let last = self.first_page() + MAX_OFFSET / self.size.max(1) as u64;
            self.page = last;
            self.offset = self.offset_for(last, self.size).unwrap_or(MAX_OFFSET);
        }
    }

    pub fn set_page(&mut self, page: u64) -> Result<()> {
        let page = page.max(self.first_page());
        let offset = self.offset_for(page, self.size).ok_or_else(|| {
            Error::InvalidPager(format!("page {page} of size {} is out of range", self.size))
        })?;
        self.page = page;
        self.offset = offset;
        Ok(())
    }

    pub fn set_size(&mut self, size: usize) -> Result<()> {
        let offset = self.offset_for(self.page, size).ok_or_else(|| {
            Error::InvalidPager(format!("page {} of size {size} is out of range", self.page))
        })?;
        self.size = size;
        self.offset = offset;
        Ok(())
    }

    /// Position the pager at the page containing `offset`.
    pub fn set_offset(&mut self, offset: u64) -> Result<()> {
        if offset > MAX_OFFSET {
            return Err(Error::InvalidPager(format!("offset {offset} is out of range")));
        }
        self.page = match self.size {
            0 => self.first_page(),
            size => offset / size as u64 + self.first_page(),
        };
        self.offset = offset;
        Ok(())
    }

    pub fn with_sort(mut self, sort: Vec<SortKey>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_count(mut self, enabled: bool) -> Self {
        self.count_enabled = enabled;
        self
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn sort(&self) -> &[SortKey] {
        &self.sort
    }

    pub fn count_enabled(&self) -> bool {
        self.count_enabled
    }

    pub fn is_zero_based(&self) -> bool {
        self.zero_based
    }

    /// Parse `page`, `size`, `sort` and `count` query parameters.
    ///
    /// Unknown keys are ignored so the same item list can carry the filter
    /// and fetch parameters.
    pub fn from_items(items: &[(String, String)], config: &QueryConfig) -> Result<Self> {
        let mut pager = Self::from_config(config);
        let mut page = None;

        for (key, value) in items {
            let value = value.trim();
            match key.as_str() {
                "page" => {
                    page = Some(value.parse::<u64>().map_err(|_| {
                        Error::InvalidPager(format!("Invalid page value: {value}"))
                    })?);
                }
                "size" => {
                    let size = value.parse::<usize>().map_err(|_| {
                        Error::InvalidPager(format!("Invalid size value: {value}"))
                    })?;
                    if size == 0 {
                        return Err(Error::InvalidPager("size must be at least 1".into()));
                    }
                    pager.set_size(size)?;
                }
                "sort" => pager.sort.extend(parse_sort(value)?),
                "count" => {
                    pager.count_enabled = match value.to_ascii_lowercase().as_str() {
                        "true" | "1" => true,
                        "false" | "0" => false,
                        _ => {
                            return Err(Error::InvalidPager(format!(
                                "Invalid count value: {value}"
                            )))
                        }
                    };
                }
                _ => {}
            }
        }

        if let Some(page) = page {
            if page < pager.first_page() {
                return Err(Error::InvalidPager(format!(
                    "page must be at least {}",
                    pager.first_page()
                )));
            }
            pager.set_page(page)?;
        }
        Ok(pager)
    }

    pub fn validate_limits(&self, config: &QueryConfig) -> Result<()> {
        if self.size > config.max_page_size {
            return Err(Error::TooCostly(format!(
                "size={} exceeds maximum allowed page size of {}",
                self.size, config.max_page_size
            )));
        }
        if self.size == 0 {
            return Err(Error::InvalidPager("size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Parse `name,-created` or `name:asc,created:desc`.
pub fn parse_sort(value: &str) -> Result<Vec<SortKey>> {
    let mut out = Vec::new();
    for raw in value.split(',') {
        let mut s = raw.trim();
        if s.is_empty() {
            continue;
        }

        let mut direction = SortDirection::Asc;
        if let Some(rest) = s.strip_prefix('-') {
            direction = SortDirection::Desc;
            s = rest;
        }

        if let Some((field, dir)) = s.split_once(':') {
            direction = SortDirection::parse(dir.trim()).ok_or_else(|| {
                Error::InvalidPager(format!("Invalid sort direction in '{raw}'"))
            })?;
            s = field.trim();
        }

        if s.is_empty() {
            return Err(Error::InvalidPager(format!("Empty sort field in '{raw}'")));
        }
        out.push(SortKey {
            field: s.to_string(),
            direction,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn offset_follows_page_and_size() {
        let mut pager = Pager::new(3, 10);
        assert_eq!(pager.offset(), 20);
        pager.set_size(25).unwrap();
        assert_eq!(pager.offset(), 50);
        pager.set_offset(60).unwrap();
        assert_eq!(pager.page(), 3);

        let pager = Pager::zero_based(2, 10);
        assert_eq!(pager.offset(), 20);
    }

    #[test]
    fn parses_query_items() {
        let config = QueryConfig::default();
        let pager = Pager::from_items(
            &items(&[("page", "2"), ("size", "5"), ("sort", "name,-created"), ("count", "false"), ("filter", "x:1")]),
            &config,
        )
        .unwrap();
        assert_eq!(pager.page(), 2);
        assert_eq!(pager.offset(), 5);
        assert!(!pager.count_enabled());
        assert_eq!(pager.sort(), &[SortKey::asc("name"), SortKey::desc("created")]);
    }

    #[test]
    fn page_after_size_is_order_independent() {
        let config = QueryConfig::default();
        let a = Pager::from_items(&items(&[("page", "4"), ("size", "10")]), &config).unwrap();
        let b = Pager::from_items(&items(&[("size", "10"), ("page", "4")]), &config).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.offset(), 30);
    }

    #[test]
    fn colon_sort_form() {
        assert_eq!(
            parse_sort("name:asc, created:DESC").unwrap(),
            vec![SortKey::asc("name"), SortKey::desc("created")]
        );
        assert!(parse_sort("name:sideways").is_err());
    }

    #[test]
    fn oversized_pages_are_too_costly() {
        let config = QueryConfig::default();
        let pager = Pager::new(1, config.max_page_size + 1);
        assert!(matches!(
            pager.validate_limits(&config),
            Err(Error::TooCostly(_))
        ));
        assert!(Pager::from_items(&items(&[("page", "0")]), &config).is_err());
        assert!(Pager::from_items(&items(&[("size", "abc")]), &config).is_err());
    }

    #[test]
    fn out_of_range_pages_are_rejected() {
        let config = QueryConfig::default();
        let err = Pager::from_items(
            &items(&[("page", "18446744073709551615"), ("size", "20")]),
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidPager(_)));

        let mut pager = Pager::new(2, 10);
        assert!(pager.set_offset(u64::MAX).is_err());
        assert!(pager.set_size(usize::MAX).is_err());
        assert!(pager.set_page(u64::MAX).is_err());
        assert_eq!((pager.page(), pager.size(), pager.offset()), (2, 10, 10));

        let clamped = Pager::new(u64::MAX, 20);
        assert!(clamped.offset() <= MAX_OFFSET);
        assert_eq!(clamped.offset(), (clamped.page() - 1) * 20);
    }
}
