//! Dual-path search routing.
//!
//! Every query goes to the full-text index first. Any index failure is
//! treated as recoverable: the router logs it and replays the query as a
//! filtered scan against the catalog store, so callers see a slower answer
//! instead of an error. Only when both paths fail does the request surface
//! as unavailable.

use std::time::Instant;

use tracing::{debug, warn};

use super::store::CatalogStore;
use super::types::{Page, SearchPath, SearchQuery};
use super::DiscoveryResult;
use crate::domain::product::Product;
use crate::errors::DiscoveryError;

/// Run `query` through the index-first, scan-second pipeline.
pub(crate) async fn execute(
    catalog: &dyn CatalogStore,
    query: &SearchQuery,
) -> DiscoveryResult<Page<Product>> {
    query.validate()?;

    match catalog.full_text_search(query).await {
        Ok(hits) => {
            debug!(
                event_name = "search.fulltext",
                total = hits.total,
                took_ms = hits.elapsed_ms,
                path = hits.path.as_str(),
                "served from the primary search path"
            );
            let page = Page::new(hits.items, hits.total, query.page)
                .with_search_path(hits.path, hits.elapsed_ms);
            Ok(page)
        }
        Err(index_error) => {
            warn!(
                event_name = "search.fallback",
                error = %index_error,
                "full-text index failed, replaying query as a catalog scan"
            );
            scan(catalog, query).await
        }
    }
}

async fn scan(catalog: &dyn CatalogStore, query: &SearchQuery) -> DiscoveryResult<Page<Product>> {
    let started = Instant::now();
    let (items, total) = catalog
        .find_active(&query.to_filter(), query.scan_sort(), query.page)
        .await
        .map_err(|scan_error| {
            warn!(
                event_name = "search.unavailable",
                error = %scan_error,
                "both search paths failed"
            );
            DiscoveryError::ServiceUnavailable(scan_error.to_string())
        })?;

    let took_ms = started.elapsed().as_millis() as u64;
    Ok(Page::new(items, total, query.page).with_search_path(SearchPath::Scan, took_ms))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::memory::InMemoryCatalogStore;
    use super::super::types::{PageRequest, SortDirection, SortKey};
    use super::*;
    use crate::domain::product::CategoryId;

    fn seeded_catalog() -> Arc<InMemoryCatalogStore> {
        let catalog = Arc::new(InMemoryCatalogStore::new());
        catalog.seed(InMemoryCatalogStore::sample_product(1, "wireless headphones", 1, 120.0));
        catalog.seed(InMemoryCatalogStore::sample_product(2, "wired headphones", 1, 40.0));
        catalog.seed(InMemoryCatalogStore::sample_product(3, "running shoes", 2, 90.0));
        catalog
    }

    #[tokio::test]
    async fn indexed_path_serves_when_healthy() {
        let catalog = seeded_catalog();
        let page = execute(catalog.as_ref(), &SearchQuery::new("headphones")).await.unwrap();

        assert_eq!(page.meta.search_engine, Some(SearchPath::Fulltext));
        assert_eq!(page.meta.total_items, 2);
        assert!(page.data.iter().all(|p| p.name.contains("headphones")));
    }

    #[tokio::test]
    async fn empty_text_queries_are_labeled_as_scans() {
        let catalog = seeded_catalog();
        let query = SearchQuery::new("").with_category(CategoryId(1));

        let page = execute(catalog.as_ref(), &query).await.unwrap();
        assert_eq!(page.meta.search_engine, Some(SearchPath::Scan));
        assert_eq!(page.meta.total_items, 2);
    }

    #[tokio::test]
    async fn index_failure_falls_back_to_the_scan() {
        let catalog = seeded_catalog();
        catalog.fail_full_text();

        let page = execute(catalog.as_ref(), &SearchQuery::new("headphones")).await.unwrap();
        assert_eq!(page.meta.search_engine, Some(SearchPath::Scan));
        assert_eq!(page.meta.total_items, 2);
    }

    #[tokio::test]
    async fn both_paths_down_is_unavailable() {
        let catalog = seeded_catalog();
        catalog.fail_full_text();
        catalog.fail_scan();

        let result = execute(catalog.as_ref(), &SearchQuery::new("headphones")).await;
        assert!(matches!(result, Err(DiscoveryError::ServiceUnavailable(_))));
    }

    #[tokio::test]
    async fn invalid_queries_never_reach_a_store() {
        let catalog = seeded_catalog();
        catalog.fail_full_text();
        catalog.fail_scan();

        let query = SearchQuery::new("x").with_price_range(Some(10.0), Some(1.0));
        let result = execute(catalog.as_ref(), &query).await;
        assert!(matches!(result, Err(DiscoveryError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn filters_apply_on_both_paths() {
        let catalog = seeded_catalog();
        let query = SearchQuery::new("headphones")
            .with_category(CategoryId(1))
            .with_price_range(Some(50.0), None)
            .with_page(PageRequest::new(Some(10), None));

        let indexed = execute(catalog.as_ref(), &query).await.unwrap();
        assert_eq!(indexed.meta.total_items, 1);

        catalog.fail_full_text();
        let scanned = execute(catalog.as_ref(), &query).await.unwrap();
        assert_eq!(scanned.meta.total_items, 1);
        assert_eq!(scanned.data[0].id, indexed.data[0].id);
    }

    #[tokio::test]
    async fn scan_path_honors_explicit_sorts() {
        let catalog = seeded_catalog();
        catalog.fail_full_text();

        let query =
            SearchQuery::new("headphones").with_sort(SortKey::Price, SortDirection::Asc);
        let page = execute(catalog.as_ref(), &query).await.unwrap();
        assert!(page.data[0].price <= page.data[1].price);
    }
}
