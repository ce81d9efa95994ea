//! Store traits the engine depends on.
//!
//! The engine owns the contract; the persistence collaborator (`vitrine-db`)
//! and the in-memory stores implement it. Counters must be incremented as a
//! single atomic update on the backing store, never read-modify-write here.

use async_trait::async_trait;
use chrono::Duration;
use thiserror::Error;

use super::types::{PageRequest, SearchPath, SearchQuery, SortDirection};
use crate::domain::interaction::{Actor, FavoriteRecord, NewView, PurchaseRecord, ViewRecord};
use crate::domain::product::{CategoryId, Product, ProductId, UserId};

#[derive(Clone, Debug, Error, PartialEq)]
pub enum StoreError {
    /// The backing index or store cannot serve this request right now. For
    /// the full-text path this is the recoverable signal the router falls
    /// back on.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("duplicate record: {0}")]
    Duplicate(String),
    #[error("store failure: {0}")]
    Backend(String),
}

/// Hard filters applied identically by both search paths and by the
/// candidate-pool queries of the scorers. Everything is a non-scoring
/// constraint.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProductFilter {
    pub category: Option<CategoryId>,
    pub brand: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rating: Option<f64>,
    pub min_review_count: Option<u32>,
    pub in_stock_only: bool,
    pub discounted_only: bool,
    /// Case-insensitive substring over name/description (the scan path).
    pub text_contains: Option<String>,
    pub created_within_days: Option<i64>,
    pub exclude: Vec<ProductId>,
    pub related_to: Option<RelatedFilter>,
}

/// OR-match pulling the similarity candidate pool: same category, same brand,
/// or at least one overlapping tag.
#[derive(Clone, Debug, PartialEq)]
pub struct RelatedFilter {
    pub category: CategoryId,
    pub brand: String,
    pub tags: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogSortKey {
    Price,
    Rating,
    ReviewCount,
    Name,
    CreatedAt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CatalogSort {
    pub key: CatalogSortKey,
    pub direction: SortDirection,
}

impl CatalogSort {
    /// Default pool order for candidate fetches.
    pub fn newest_first() -> Self {
        Self { key: CatalogSortKey::CreatedAt, direction: SortDirection::Desc }
    }
}

/// The popularity counters discovery is allowed to touch. `rating` and
/// `review_count` are owned by the review subsystem and deliberately absent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CounterField {
    ViewCount,
    FavoriteCount,
    PurchaseCount,
}

impl CounterField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::ViewCount => "view_count",
            Self::FavoriteCount => "favorite_count",
            Self::PurchaseCount => "purchase_count",
        }
    }
}

/// A successful primary-path search, with the elapsed query time. `path`
/// records which strategy actually answered: a store may satisfy a query
/// without indexable text through its scan machinery and must say so.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchHits {
    pub items: Vec<Product>,
    pub total: u64,
    pub elapsed_ms: u64,
    pub path: SearchPath,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Filtered, sorted, paginated scan over active products, with the total
    /// match count.
    async fn find_active(
        &self,
        filter: &ProductFilter,
        sort: CatalogSort,
        page: PageRequest,
    ) -> Result<(Vec<Product>, u64), StoreError>;

    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Must execute as one atomic update on the backing store.
    async fn increment_counter(
        &self,
        id: ProductId,
        field: CounterField,
        delta: i64,
    ) -> Result<(), StoreError>;

    /// Indexed search path. `Unavailable` is recoverable; the router falls
    /// back to [`CatalogStore::find_active`] with the equivalent filter.
    async fn full_text_search(&self, query: &SearchQuery) -> Result<SearchHits, StoreError>;
}

#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Purchases with status `completed`, newest first, resolved with the
    /// referenced product's category/brand/tags.
    async fn completed_purchases(&self, user: UserId) -> Result<Vec<PurchaseRecord>, StoreError>;

    async fn favorites(&self, user: UserId) -> Result<Vec<FavoriteRecord>, StoreError>;

    /// Newest-first views inside the retention window, at most `limit`.
    async fn recent_views(&self, user: UserId, limit: u32) -> Result<Vec<ViewRecord>, StoreError>;

    async fn insert_view(&self, view: NewView) -> Result<ViewRecord, StoreError>;

    /// Most recent identical (product, actor) view inside `within`, if any.
    async fn find_duplicate_view(
        &self,
        product: ProductId,
        actor: &Actor,
        within: Duration,
    ) -> Result<Option<ViewRecord>, StoreError>;

    /// Inserts the favorite row and bumps the product's favorite counter in
    /// one transaction. `Duplicate` if the pair already exists.
    async fn add_favorite(
        &self,
        user: UserId,
        product: ProductId,
    ) -> Result<FavoriteRecord, StoreError>;

    /// Removes the favorite row and decrements the counter in one
    /// transaction. Returns false when there was nothing to remove.
    async fn remove_favorite(&self, user: UserId, product: ProductId)
        -> Result<bool, StoreError>;

    /// Deletes views older than `retention`; returns how many were dropped.
    async fn prune_expired_views(&self, retention: Duration) -> Result<u64, StoreError>;
}
