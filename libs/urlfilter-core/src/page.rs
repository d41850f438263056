use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::mapper::QueryParams;

pub const PAGE_PARAM: &str = "page";
pub const SIZE_PARAM: &str = "size";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitCfg {
    pub default: u64,
    pub max: u64,
}

/// Zero becomes one; anything above `max` becomes `max`.
pub fn clamp_limit(req: Option<u64>, cfg: LimitCfg) -> u64 {
    req.unwrap_or(cfg.default).clamp(1, cfg.max.max(1))
}

/// Offset-based window into a result set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub offset: u64,
    pub limit: u64,
}

impl PageRequest {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// Zero-based page index and page size, limit clamped.
    ///
    /// The offset must fit a signed 64-bit SQL integer; a page beyond that
    /// is a coercion error.
    pub fn of(page: u64, size: Option<u64>, cfg: LimitCfg) -> Result<Self> {
        let limit = clamp_limit(size, cfg);
        let offset = page
            .checked_mul(limit)
            .filter(|offset| i64::try_from(*offset).is_ok())
            .ok_or_else(|| Error::ValueCoercion {
                field: PAGE_PARAM.to_string(),
                value: page.to_string(),
                expected: "a page whose offset fits a 64-bit signed integer",
            })?;
        Ok(Self { offset, limit })
    }

    /// Reads `page` (zero-based) and `size` from the query string.
    pub fn from_params(params: &QueryParams, cfg: LimitCfg) -> Result<Self> {
        let page = parse_param(params, PAGE_PARAM)?.unwrap_or(0);
        let size = parse_param(params, SIZE_PARAM)?;
        Self::of(page, size, cfg)
    }
}

fn parse_param(params: &QueryParams, name: &str) -> Result<Option<u64>> {
    match params.get(name).map(|v| v.trim()) {
        None | Some("") => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| Error::ValueCoercion {
            field: name.to_string(),
            value: raw.to_string(),
            expected: "a non-negative integer",
        }),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub offset: u64,
    pub limit: u64,
    /// Rows matching the predicate, ignoring the window.
    pub total: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_info: PageInfo,
}

impl<T> Page<T> {
    /// Create a new page with items and page info
    pub fn new(items: Vec<T>, page_info: PageInfo) -> Self {
        Self { items, page_info }
    }

    /// Create an empty page for the given request
    pub fn empty(request: PageRequest) -> Self {
        Self {
            items: Vec::new(),
            page_info: PageInfo {
                offset: request.offset,
                limit: request.limit,
                total: 0,
            },
        }
    }

    pub fn has_next(&self) -> bool {
        self.page_info.offset.saturating_add(self.items.len() as u64) < self.page_info.total
    }

    /// Map items while preserving page_info
    pub fn map_items<U>(self, mut f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(&mut f).collect(),
            page_info: self.page_info,
        }
    }
}
