//! Time-decayed popularity ranking over the fresh slice of the catalog.

use chrono::Utc;
use tracing::debug;

use super::scoring::trending_score;
use super::store::{CatalogSort, CatalogStore, ProductFilter};
use super::types::{paginate, Page, PageRequest, TimeRange};
use super::{DiscoveryResult, CANDIDATE_POOL_LIMIT, FRESHNESS_WINDOW_DAYS};
use crate::domain::product::Product;
use crate::errors::DiscoveryError;

/// The candidate pool is always the freshness window; `range` only tightens
/// the age penalty's frame of reference for the caller and is echoed back in
/// the response meta.
pub(crate) async fn execute(
    catalog: &dyn CatalogStore,
    range: TimeRange,
    page: PageRequest,
) -> DiscoveryResult<Page<Product>> {
    let filter = ProductFilter {
        created_within_days: Some(FRESHNESS_WINDOW_DAYS),
        ..ProductFilter::default()
    };
    let pool = PageRequest { limit: CANDIDATE_POOL_LIMIT, offset: 0 };
    let (candidates, _) = catalog
        .find_active(&filter, CatalogSort::newest_first(), pool)
        .await
        .map_err(DiscoveryError::from)?;

    let now = Utc::now();
    let mut scored: Vec<(f64, Product)> = candidates
        .into_iter()
        .map(|candidate| (trending_score(&candidate, now), candidate))
        .collect();
    scored.sort_by(|a, b| {
        b.0.total_cmp(&a.0).then_with(|| b.1.rating.total_cmp(&a.1.rating))
    });

    debug!(
        event_name = "trending.scored",
        pool_size = scored.len(),
        range = range.as_str(),
        "scored trending candidates"
    );

    let items: Vec<Product> = scored.into_iter().map(|(_, product)| product).collect();
    let (data, total) = paginate(items, page);
    Ok(Page::new(data, total, page).with_algorithm("trending").with_time_range(range))
}
