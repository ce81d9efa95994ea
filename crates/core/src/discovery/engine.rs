//! The discovery facade.
//!
//! One engine instance is shared across the whole process; every operation
//! borrows it immutably and all state lives behind the store traits.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use super::activity::{self, RecordedView};
use super::preference::build_preferences;
use super::scoring::preference_score;
use super::store::{CatalogSort, CatalogStore, InteractionStore, ProductFilter};
use super::types::{paginate, Page, PageRequest, SearchQuery, TimeRange};
use super::{
    search, similarity, trending, DiscoveryResult, CANDIDATE_POOL_LIMIT, RECENT_VIEW_SAMPLE,
};
use crate::domain::interaction::{FavoriteRecord, NewView};
use crate::domain::product::{Product, ProductId, UserId};
use crate::errors::DiscoveryError;

pub struct DiscoveryEngine {
    catalog: Arc<dyn CatalogStore>,
    interactions: Arc<dyn InteractionStore>,
}

impl DiscoveryEngine {
    pub fn new(catalog: Arc<dyn CatalogStore>, interactions: Arc<dyn InteractionStore>) -> Self {
        Self { catalog, interactions }
    }

    /// Catalog search through the index-first, scan-second router.
    pub async fn search(&self, query: &SearchQuery) -> DiscoveryResult<Page<Product>> {
        search::execute(self.catalog.as_ref(), query).await
    }

    /// Products most similar to `reference` by weighted attribute overlap.
    pub async fn similar_products(
        &self,
        reference: ProductId,
        page: PageRequest,
    ) -> DiscoveryResult<Page<Product>> {
        similarity::execute(self.catalog.as_ref(), reference, page).await
    }

    /// Personalized ranking from the user's interaction history. Users with
    /// no usable history get the trending ranking instead; the response meta
    /// names whichever algorithm actually ran.
    pub async fn personalized(
        &self,
        user: UserId,
        page: PageRequest,
    ) -> DiscoveryResult<Page<Product>> {
        if user.0 <= 0 {
            return Err(DiscoveryError::invalid_input(format!(
                "user id must be positive, got {}",
                user.0
            )));
        }

        let purchases = self.interactions.completed_purchases(user).await?;
        let favorites = self.interactions.favorites(user).await?;
        let views = self.interactions.recent_views(user, RECENT_VIEW_SAMPLE).await?;

        let preferences = build_preferences(&purchases, &favorites, &views);
        if preferences.is_empty() {
            debug!(
                event_name = "personalized.cold_start",
                user = user.0,
                "no usable history, serving trending instead"
            );
            return self.trending(TimeRange::Month, page).await;
        }

        // Products the user already owns or saved stay out of the ranking.
        let mut owned: Vec<ProductId> = purchases
            .iter()
            .map(|purchase| purchase.product_id)
            .chain(favorites.iter().map(|favorite| favorite.product_id))
            .collect();
        owned.sort_unstable_by_key(|id| id.0);
        owned.dedup();

        let filter = ProductFilter { exclude: owned, ..ProductFilter::default() };
        let pool = PageRequest { limit: CANDIDATE_POOL_LIMIT, offset: 0 };
        let (candidates, _) = self
            .catalog
            .find_active(&filter, CatalogSort::newest_first(), pool)
            .await
            .map_err(DiscoveryError::from)?;

        let now = Utc::now();
        let mut scored: Vec<(f64, Product)> = candidates
            .into_iter()
            .map(|candidate| (preference_score(&candidate, &preferences, now), candidate))
            .collect();
        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0).then_with(|| b.1.rating.total_cmp(&a.1.rating))
        });

        let items: Vec<Product> = scored.into_iter().map(|(_, product)| product).collect();
        let (data, total) = paginate(items, page);
        Ok(Page::new(data, total, page).with_algorithm("personalized"))
    }

    /// Time-decayed popularity over the fresh slice of the catalog.
    pub async fn trending(
        &self,
        range: TimeRange,
        page: PageRequest,
    ) -> DiscoveryResult<Page<Product>> {
        trending::execute(self.catalog.as_ref(), range, page).await
    }

    /// Record a product view, collapsing rapid repeats by the same actor.
    pub async fn record_view(&self, view: NewView) -> DiscoveryResult<RecordedView> {
        activity::record_view(self.catalog.as_ref(), self.interactions.as_ref(), view).await
    }

    pub async fn add_favorite(
        &self,
        user: UserId,
        product: ProductId,
    ) -> DiscoveryResult<FavoriteRecord> {
        activity::add_favorite(self.catalog.as_ref(), self.interactions.as_ref(), user, product)
            .await
    }

    pub async fn remove_favorite(&self, user: UserId, product: ProductId) -> DiscoveryResult<()> {
        activity::remove_favorite(self.catalog.as_ref(), self.interactions.as_ref(), user, product)
            .await
    }

    /// Drop view records past the retention horizon.
    pub async fn prune_expired_views(&self) -> DiscoveryResult<u64> {
        activity::prune_expired_views(self.interactions.as_ref()).await
    }
}
