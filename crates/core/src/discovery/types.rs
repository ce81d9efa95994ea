//! Request and response types shared by every discovery operation.

use serde::{Deserialize, Serialize};

use super::store::{CatalogSort, CatalogSortKey, ProductFilter};
use super::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::domain::product::CategoryId;
use crate::errors::DiscoveryError;

/// Which strategy actually served a search request. Observability only;
/// callers must not branch on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPath {
    Fulltext,
    Scan,
}

impl SearchPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fulltext => "fulltext",
            Self::Scan => "scan",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Relevance,
    Price,
    Rating,
    ReviewCount,
    Name,
    CreatedAt,
}

impl SortKey {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "relevance" => Some(Self::Relevance),
            "price" => Some(Self::Price),
            "rating" => Some(Self::Rating),
            "review_count" | "reviewCount" => Some(Self::ReviewCount),
            "name" => Some(Self::Name),
            "created_at" | "createdAt" => Some(Self::CreatedAt),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    Day,
    Week,
    #[default]
    Month,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            _ => None,
        }
    }
}

/// Validated limit/offset pair. The limit is clamped to the page cap rather
/// than rejected, matching the router contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub limit: u32,
    pub offset: u32,
}

impl PageRequest {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        Self { limit, offset: offset.unwrap_or(0) }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// A structured catalog search. Constructed per request, validated, discarded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    pub category: Option<CategoryId>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rating: Option<f64>,
    pub min_review_count: Option<u32>,
    pub in_stock_only: bool,
    pub discounted_only: bool,
    pub brand: Option<String>,
    pub sort: SortKey,
    pub direction: SortDirection,
    pub page: PageRequest,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into().trim().to_string(), ..Self::default() }
    }

    pub fn with_category(mut self, category: CategoryId) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_price_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_price = min;
        self.max_price = max;
        self
    }

    pub fn with_min_rating(mut self, rating: f64) -> Self {
        self.min_rating = Some(rating);
        self
    }

    pub fn with_min_review_count(mut self, count: u32) -> Self {
        self.min_review_count = Some(count);
        self
    }

    pub fn in_stock_only(mut self) -> Self {
        self.in_stock_only = true;
        self
    }

    pub fn discounted_only(mut self) -> Self {
        self.discounted_only = true;
        self
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_sort(mut self, sort: SortKey, direction: SortDirection) -> Self {
        self.sort = sort;
        self.direction = direction;
        self
    }

    pub fn with_page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }

    /// Rejected before any store access.
    pub fn validate(&self) -> Result<(), DiscoveryError> {
        if let Some(category) = self.category {
            if category.0 <= 0 {
                return Err(DiscoveryError::invalid_input(format!(
                    "category id must be positive, got {}",
                    category.0
                )));
            }
        }

        for (label, value) in [("min_price", self.min_price), ("max_price", self.max_price)] {
            if let Some(price) = value {
                if !price.is_finite() || price < 0.0 {
                    return Err(DiscoveryError::invalid_input(format!(
                        "{label} must be a non-negative number, got {price}"
                    )));
                }
            }
        }

        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err(DiscoveryError::invalid_input(format!(
                    "min_price {min} exceeds max_price {max}"
                )));
            }
        }

        if let Some(rating) = self.min_rating {
            if !rating.is_finite() || !(0.0..=5.0).contains(&rating) {
                return Err(DiscoveryError::invalid_input(format!(
                    "min_rating must be in 0..=5, got {rating}"
                )));
            }
        }

        Ok(())
    }

    /// The same semantic query expressed as a scan filter for the fallback
    /// path (and for the hard-filter part of the indexed path).
    pub fn to_filter(&self) -> ProductFilter {
        ProductFilter {
            category: self.category,
            brand: self.brand.clone(),
            min_price: self.min_price,
            max_price: self.max_price,
            min_rating: self.min_rating,
            min_review_count: self.min_review_count,
            in_stock_only: self.in_stock_only,
            discounted_only: self.discounted_only,
            text_contains: (!self.text.is_empty()).then(|| self.text.clone()),
            ..ProductFilter::default()
        }
    }

    /// Sort mapping for the scan path. The scan path has no relevance score,
    /// so `relevance` maps to newest-first there.
    pub fn scan_sort(&self) -> CatalogSort {
        let key = match self.sort {
            SortKey::Relevance | SortKey::CreatedAt => CatalogSortKey::CreatedAt,
            SortKey::Price => CatalogSortKey::Price,
            SortKey::Rating => CatalogSortKey::Rating,
            SortKey::ReviewCount => CatalogSortKey::ReviewCount,
            SortKey::Name => CatalogSortKey::Name,
        };
        let direction = match self.sort {
            SortKey::Relevance => SortDirection::Desc,
            _ => self.direction,
        };
        CatalogSort { key, direction }
    }
}

/// The response shape every discovery operation returns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total_items: u64,
    pub item_count: u32,
    pub items_per_page: u32,
    pub total_pages: u32,
    pub current_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_engine: Option<SearchPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub took_ms: Option<u64>,
}

impl PageMeta {
    fn new(total_items: u64, item_count: u32, page: PageRequest) -> Self {
        let limit = u64::from(page.limit.max(1));
        Self {
            total_items,
            item_count,
            items_per_page: page.limit,
            total_pages: total_items.div_ceil(limit) as u32,
            current_page: (u64::from(page.offset) / limit) as u32 + 1,
            algorithm: None,
            search_engine: None,
            time_range: None,
            took_ms: None,
        }
    }
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total_items: u64, page: PageRequest) -> Self {
        let meta = PageMeta::new(total_items, data.len() as u32, page);
        Self { data, meta }
    }

    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.meta.algorithm = Some(algorithm.into());
        self
    }

    pub fn with_search_path(mut self, path: SearchPath, took_ms: u64) -> Self {
        self.meta.search_engine = Some(path);
        self.meta.took_ms = Some(took_ms);
        self
    }

    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.meta.time_range = Some(range);
        self
    }
}

/// Slice a fully scored and sorted list down to the requested window.
pub(crate) fn paginate<T>(items: Vec<T>, page: PageRequest) -> (Vec<T>, u64) {
    let total = items.len() as u64;
    let data =
        items.into_iter().skip(page.offset as usize).take(page.limit as usize).collect::<Vec<_>>();
    (data, total)
}
