//! In-memory store implementations.
//!
//! These back the engine's unit tests and local demos without a database.
//! They mirror the SQL stores' observable behavior, including the full-text
//! path's prefix matching and the atomicity of the favorite mutations, and
//! they expose failure toggles so the fallback routing can be exercised.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;

use super::store::{
    CatalogSort, CatalogSortKey, CatalogStore, CounterField, InteractionStore, ProductFilter,
    SearchHits, StoreError,
};
use super::types::{PageRequest, SearchPath, SearchQuery, SortDirection, SortKey};
use super::VIEW_RETENTION_DAYS;
use crate::domain::interaction::{
    Actor, FavoriteRecord, NewView, PurchaseRecord, PurchaseStatus, ViewRecord, ViewSource,
};
use crate::domain::product::{CategoryId, Product, ProductId, UserId};

#[derive(Default)]
pub struct InMemoryCatalogStore {
    products: RwLock<Vec<Product>>,
    full_text_down: AtomicBool,
    scan_down: AtomicBool,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, product: Product) {
        // blocking_write is unusable on a runtime worker; try_write is safe
        // because seeding happens before any concurrent access.
        if let Ok(mut products) = self.products.try_write() {
            products.retain(|existing| existing.id != product.id);
            products.push(product);
        }
    }

    /// Make the indexed path fail so requests exercise the scan fallback.
    pub fn fail_full_text(&self) {
        self.full_text_down.store(true, Ordering::SeqCst);
    }

    /// Make the scan path fail too.
    pub fn fail_scan(&self) {
        self.scan_down.store(true, Ordering::SeqCst);
    }

    /// A plausible active product for fixtures.
    pub fn sample_product(id: i64, name: &str, category: i64, price: f64) -> Product {
        Product {
            id: ProductId(id),
            name: name.to_string(),
            description: format!("{name} description"),
            price,
            category_id: CategoryId(category),
            category_name: format!("category {category}"),
            brand: "Acme".to_string(),
            tags: Vec::new(),
            stock: 10,
            rating: 0.0,
            review_count: 0,
            purchase_count: 0,
            view_count: 0,
            favorite_count: 0,
            discount: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn matches(product: &Product, filter: &ProductFilter) -> bool {
        if !product.is_active {
            return false;
        }
        if filter.category.is_some_and(|category| product.category_id != category) {
            return false;
        }
        if filter.brand.as_deref().is_some_and(|brand| product.brand != brand) {
            return false;
        }
        if filter.min_price.is_some_and(|min| product.price < min) {
            return false;
        }
        if filter.max_price.is_some_and(|max| product.price > max) {
            return false;
        }
        if filter.min_rating.is_some_and(|min| product.rating < min) {
            return false;
        }
        if filter.min_review_count.is_some_and(|min| product.review_count < min) {
            return false;
        }
        if filter.in_stock_only && product.stock == 0 {
            return false;
        }
        if filter.discounted_only
            && !product.discount.as_ref().is_some_and(|d| d.is_active_at(Utc::now()))
        {
            return false;
        }
        if let Some(needle) = &filter.text_contains {
            let needle = needle.to_lowercase();
            if !product.name.to_lowercase().contains(&needle)
                && !product.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if let Some(days) = filter.created_within_days {
            if !product.created_within_days(Utc::now(), days) {
                return false;
            }
        }
        if filter.exclude.contains(&product.id) {
            return false;
        }
        if let Some(related) = &filter.related_to {
            let tag_hit = product.tags.iter().any(|tag| related.tags.contains(tag));
            let brand_hit = !related.brand.is_empty() && product.brand == related.brand;
            if product.category_id != related.category && !brand_hit && !tag_hit {
                return false;
            }
        }
        true
    }

    fn apply_sort(products: &mut [Product], sort: CatalogSort) {
        products.sort_by(|a, b| {
            let ordering = match sort.key {
                CatalogSortKey::Price => a.price.total_cmp(&b.price),
                CatalogSortKey::Rating => a.rating.total_cmp(&b.rating),
                CatalogSortKey::ReviewCount => a.review_count.cmp(&b.review_count),
                CatalogSortKey::Name => a.name.cmp(&b.name),
                CatalogSortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            };
            match sort.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
    }

    /// Prefix-token relevance weighted by field, approximating the SQL
    /// index's ranking closely enough for routing tests.
    fn relevance(product: &Product, tokens: &[String]) -> f64 {
        let fields: [(&str, f64); 4] = [
            (&product.name, 10.0),
            (&product.description, 4.0),
            (&product.category_name, 2.0),
            (&product.brand, 2.0),
        ];
        let mut score = 0.0;
        for token in tokens {
            for (text, weight) in &fields {
                let hit = text
                    .to_lowercase()
                    .split_whitespace()
                    .any(|word| word.starts_with(token.as_str()));
                if hit {
                    score += weight;
                }
            }
        }
        score
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn find_active(
        &self,
        filter: &ProductFilter,
        sort: CatalogSort,
        page: PageRequest,
    ) -> Result<(Vec<Product>, u64), StoreError> {
        if self.scan_down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("catalog store offline".to_string()));
        }

        let products = self.products.read().await;
        let mut matched: Vec<Product> =
            products.iter().filter(|p| Self::matches(p, filter)).cloned().collect();
        Self::apply_sort(&mut matched, sort);

        let total = matched.len() as u64;
        let data: Vec<Product> = matched
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect();
        Ok((data, total))
    }

    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        if self.scan_down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("catalog store offline".to_string()));
        }
        let products = self.products.read().await;
        Ok(products.iter().find(|p| p.id == id).cloned())
    }

    async fn increment_counter(
        &self,
        id: ProductId,
        field: CounterField,
        delta: i64,
    ) -> Result<(), StoreError> {
        let mut products = self.products.write().await;
        let product = products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::Backend(format!("unknown product {}", id.0)))?;
        let counter = match field {
            CounterField::ViewCount => &mut product.view_count,
            CounterField::FavoriteCount => &mut product.favorite_count,
            CounterField::PurchaseCount => &mut product.purchase_count,
        };
        *counter = counter.saturating_add_signed(delta as i32);
        Ok(())
    }

    async fn full_text_search(&self, query: &SearchQuery) -> Result<SearchHits, StoreError> {
        if self.full_text_down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("full-text index offline".to_string()));
        }

        let started = Instant::now();
        let tokens: Vec<String> =
            query.text.split_whitespace().map(str::to_lowercase).collect();
        let mut filter = query.to_filter();
        filter.text_contains = None;

        let products = self.products.read().await;
        let mut matched: Vec<Product> = products
            .iter()
            .filter(|p| Self::matches(p, &filter))
            .filter(|p| tokens.is_empty() || Self::relevance(p, &tokens) > 0.0)
            .cloned()
            .collect();

        if query.sort == SortKey::Relevance {
            matched.sort_by(|a, b| {
                Self::relevance(b, &tokens)
                    .total_cmp(&Self::relevance(a, &tokens))
                    .then_with(|| b.created_at.cmp(&a.created_at))
            });
        } else {
            Self::apply_sort(&mut matched, query.scan_sort());
        }

        let total = matched.len() as u64;
        let items: Vec<Product> = matched
            .into_iter()
            .skip(query.page.offset as usize)
            .take(query.page.limit as usize)
            .collect();
        // Without indexable text this was a filtered browse, not an index hit.
        let path = if tokens.is_empty() { SearchPath::Scan } else { SearchPath::Fulltext };
        Ok(SearchHits { items, total, elapsed_ms: started.elapsed().as_millis() as u64, path })
    }
}

pub struct InMemoryInteractionStore {
    catalog: Arc<InMemoryCatalogStore>,
    purchases: RwLock<Vec<(UserId, ProductId, PurchaseStatus, chrono::DateTime<Utc>)>>,
    favorites: RwLock<Vec<(UserId, ProductId, chrono::DateTime<Utc>)>>,
    views: RwLock<Vec<ViewRecord>>,
    next_view_id: AtomicI64,
}

impl InMemoryInteractionStore {
    pub fn new(catalog: Arc<InMemoryCatalogStore>) -> Self {
        Self {
            catalog,
            purchases: RwLock::new(Vec::new()),
            favorites: RwLock::new(Vec::new()),
            views: RwLock::new(Vec::new()),
            next_view_id: AtomicI64::new(1),
        }
    }

    pub fn seed_purchase(&self, user: UserId, product: ProductId, status: PurchaseStatus) {
        if let Ok(mut purchases) = self.purchases.try_write() {
            purchases.push((user, product, status, Utc::now()));
        }
    }

    pub fn seed_favorite(&self, user: UserId, product: ProductId) {
        if let Ok(mut favorites) = self.favorites.try_write() {
            favorites.push((user, product, Utc::now()));
        }
    }

    pub fn seed_view(&self, user: UserId, product: ProductId, age: Duration) {
        if let Ok(mut views) = self.views.try_write() {
            let id = self.next_view_id.fetch_add(1, Ordering::SeqCst);
            if let Some(record) =
                self.resolve_view(id, product, Actor::User(user), ViewSource::Direct)
            {
                let mut record = record;
                record.created_at = Utc::now() - age;
                views.push(record);
            }
        }
    }

    fn resolve_view(
        &self,
        id: i64,
        product_id: ProductId,
        actor: Actor,
        source: ViewSource,
    ) -> Option<ViewRecord> {
        let products = self.catalog.products.try_read().ok()?;
        let product = products.iter().find(|p| p.id == product_id)?;
        Some(ViewRecord {
            id,
            product_id,
            actor,
            category_id: product.category_id,
            brand: product.brand.clone(),
            tags: product.tags.clone(),
            source,
            created_at: Utc::now(),
        })
    }
}

#[async_trait]
impl InteractionStore for InMemoryInteractionStore {
    async fn completed_purchases(&self, user: UserId) -> Result<Vec<PurchaseRecord>, StoreError> {
        let products = self.catalog.products.read().await;
        let purchases = self.purchases.read().await;
        let mut records: Vec<PurchaseRecord> = purchases
            .iter()
            .filter(|(owner, _, status, _)| *owner == user && *status == PurchaseStatus::Completed)
            .filter_map(|(_, product_id, status, created_at)| {
                let product = products.iter().find(|p| p.id == *product_id)?;
                Some(PurchaseRecord {
                    product_id: *product_id,
                    category_id: product.category_id,
                    brand: product.brand.clone(),
                    tags: product.tags.clone(),
                    status: *status,
                    created_at: *created_at,
                })
            })
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn favorites(&self, user: UserId) -> Result<Vec<FavoriteRecord>, StoreError> {
        let products = self.catalog.products.read().await;
        let favorites = self.favorites.read().await;
        let mut records: Vec<FavoriteRecord> = favorites
            .iter()
            .filter(|(owner, _, _)| *owner == user)
            .filter_map(|(_, product_id, created_at)| {
                let product = products.iter().find(|p| p.id == *product_id)?;
                Some(FavoriteRecord {
                    product_id: *product_id,
                    category_id: product.category_id,
                    brand: product.brand.clone(),
                    tags: product.tags.clone(),
                    created_at: *created_at,
                })
            })
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn recent_views(&self, user: UserId, limit: u32) -> Result<Vec<ViewRecord>, StoreError> {
        let horizon = Utc::now() - Duration::days(VIEW_RETENTION_DAYS);
        let views = self.views.read().await;
        let mut records: Vec<ViewRecord> = views
            .iter()
            .filter(|view| view.actor == Actor::User(user) && view.created_at >= horizon)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn insert_view(&self, view: NewView) -> Result<ViewRecord, StoreError> {
        let id = self.next_view_id.fetch_add(1, Ordering::SeqCst);
        let record = self
            .resolve_view(id, view.product_id, view.actor, view.source)
            .ok_or_else(|| StoreError::Backend(format!("unknown product {}", view.product_id.0)))?;
        self.views.write().await.push(record.clone());
        Ok(record)
    }

    async fn find_duplicate_view(
        &self,
        product: ProductId,
        actor: &Actor,
        within: Duration,
    ) -> Result<Option<ViewRecord>, StoreError> {
        let horizon = Utc::now() - within;
        let views = self.views.read().await;
        let duplicate = views
            .iter()
            .filter(|view| {
                view.product_id == product && &view.actor == actor && view.created_at >= horizon
            })
            .max_by_key(|view| view.created_at)
            .cloned();
        Ok(duplicate)
    }

    async fn add_favorite(
        &self,
        user: UserId,
        product: ProductId,
    ) -> Result<FavoriteRecord, StoreError> {
        let mut favorites = self.favorites.write().await;
        if favorites.iter().any(|(owner, id, _)| *owner == user && *id == product) {
            return Err(StoreError::Duplicate(format!(
                "favorite ({}, {}) already exists",
                user.0, product.0
            )));
        }

        let created_at = Utc::now();
        let record = {
            let products = self.catalog.products.read().await;
            let item = products
                .iter()
                .find(|p| p.id == product)
                .ok_or_else(|| StoreError::Backend(format!("unknown product {}", product.0)))?;
            FavoriteRecord {
                product_id: product,
                category_id: item.category_id,
                brand: item.brand.clone(),
                tags: item.tags.clone(),
                created_at,
            }
        };

        favorites.push((user, product, created_at));
        self.catalog.increment_counter(product, CounterField::FavoriteCount, 1).await?;
        Ok(record)
    }

    async fn remove_favorite(
        &self,
        user: UserId,
        product: ProductId,
    ) -> Result<bool, StoreError> {
        let mut favorites = self.favorites.write().await;
        let before = favorites.len();
        favorites.retain(|(owner, id, _)| !(*owner == user && *id == product));
        if favorites.len() == before {
            return Ok(false);
        }
        self.catalog.increment_counter(product, CounterField::FavoriteCount, -1).await?;
        Ok(true)
    }

    async fn prune_expired_views(&self, retention: Duration) -> Result<u64, StoreError> {
        let horizon = Utc::now() - retention;
        let mut views = self.views.write().await;
        let before = views.len();
        views.retain(|view| view.created_at >= horizon);
        Ok((before - views.len()) as u64)
    }
}
