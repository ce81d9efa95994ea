//! "More like this" ranking for a single reference product.
//!
//! The store narrows the pool to products related by category, brand or tag
//! overlap; the weighted attribute scoring and final ordering happen here.

use tracing::debug;

use super::scoring::similarity_score;
use super::store::{CatalogSort, CatalogStore, ProductFilter, RelatedFilter};
use super::types::{paginate, Page, PageRequest};
use super::{DiscoveryResult, CANDIDATE_POOL_LIMIT};
use crate::domain::product::{Product, ProductId};
use crate::errors::DiscoveryError;

pub(crate) async fn execute(
    catalog: &dyn CatalogStore,
    reference_id: ProductId,
    page: PageRequest,
) -> DiscoveryResult<Page<Product>> {
    if reference_id.0 <= 0 {
        return Err(DiscoveryError::invalid_input(format!(
            "product id must be positive, got {}",
            reference_id.0
        )));
    }

    let reference = catalog
        .find_by_id(reference_id)
        .await?
        .filter(|product| product.is_active)
        .ok_or(DiscoveryError::NotFound { entity: "product", id: reference_id.0 })?;

    let filter = ProductFilter {
        exclude: vec![reference.id],
        related_to: Some(RelatedFilter {
            category: reference.category_id,
            brand: reference.brand.clone(),
            tags: reference.tags.clone(),
        }),
        ..ProductFilter::default()
    };
    let pool = PageRequest { limit: CANDIDATE_POOL_LIMIT, offset: 0 };
    let (candidates, _) = catalog
        .find_active(&filter, CatalogSort::newest_first(), pool)
        .await
        .map_err(DiscoveryError::from)?;

    let mut scored: Vec<(f64, Product)> = candidates
        .into_iter()
        .map(|candidate| (similarity_score(&reference, &candidate), candidate))
        .collect();
    scored.sort_by(|a, b| {
        b.0.total_cmp(&a.0)
            .then_with(|| b.1.rating.total_cmp(&a.1.rating))
            .then_with(|| b.1.purchase_count.cmp(&a.1.purchase_count))
    });

    debug!(
        event_name = "similar.scored",
        reference = reference_id.0,
        pool_size = scored.len(),
        "scored similarity candidates"
    );

    let items: Vec<Product> = scored.into_iter().map(|(_, product)| product).collect();
    let (data, total) = paginate(items, page);
    Ok(Page::new(data, total, page).with_algorithm("similarity"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::memory::InMemoryCatalogStore;
    use super::*;
    use crate::domain::product::CategoryId;

    fn catalog() -> Arc<InMemoryCatalogStore> {
        let catalog = Arc::new(InMemoryCatalogStore::new());

        let mut reference = InMemoryCatalogStore::sample_product(1, "trail shoes", 2, 90.0);
        reference.tags = vec!["outdoor".to_string(), "running".to_string()];
        catalog.seed(reference);

        let mut sibling = InMemoryCatalogStore::sample_product(2, "road shoes", 2, 95.0);
        sibling.tags = vec!["running".to_string()];
        catalog.seed(sibling);

        let mut cousin = InMemoryCatalogStore::sample_product(3, "camping tent", 5, 200.0);
        cousin.brand = "Elsewhere".to_string();
        cousin.tags = vec!["outdoor".to_string()];
        catalog.seed(cousin);

        let mut unrelated = InMemoryCatalogStore::sample_product(4, "blender", 9, 50.0);
        unrelated.brand = "Kitchenette".to_string();
        catalog.seed(unrelated);

        catalog
    }

    #[tokio::test]
    async fn ranks_same_category_above_tag_only_matches() {
        let catalog = catalog();
        let page = execute(catalog.as_ref(), ProductId(1), PageRequest::default())
            .await
            .unwrap();

        let ids: Vec<i64> = page.data.iter().map(|p| p.id.0).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(page.meta.algorithm.as_deref(), Some("similarity"));
    }

    #[tokio::test]
    async fn reference_is_never_its_own_neighbor() {
        let catalog = catalog();
        let page = execute(catalog.as_ref(), ProductId(1), PageRequest::default())
            .await
            .unwrap();
        assert!(page.data.iter().all(|p| p.id != ProductId(1)));
    }

    #[tokio::test]
    async fn unknown_or_inactive_reference_is_not_found() {
        let catalog = catalog();
        let missing = execute(catalog.as_ref(), ProductId(99), PageRequest::default()).await;
        assert!(matches!(missing, Err(DiscoveryError::NotFound { .. })));

        let mut retired = InMemoryCatalogStore::sample_product(7, "retired", 2, 10.0);
        retired.is_active = false;
        catalog.seed(retired);
        let inactive = execute(catalog.as_ref(), ProductId(7), PageRequest::default()).await;
        assert!(matches!(inactive, Err(DiscoveryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn non_positive_ids_are_rejected() {
        let catalog = catalog();
        let result = execute(catalog.as_ref(), ProductId(0), PageRequest::default()).await;
        assert!(matches!(result, Err(DiscoveryError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn ties_break_on_rating_then_purchases() {
        let catalog = Arc::new(InMemoryCatalogStore::new());
        catalog.seed(InMemoryCatalogStore::sample_product(1, "ref", 1, 100.0));

        let mut low = InMemoryCatalogStore::sample_product(2, "twin a", 1, 100.0);
        low.rating = 4.5;
        let mut high = InMemoryCatalogStore::sample_product(3, "twin b", 1, 100.0);
        high.rating = 4.5;
        high.purchase_count = 9;
        catalog.seed(low);
        catalog.seed(high);

        let page = execute(catalog.as_ref(), ProductId(1), PageRequest::default())
            .await
            .unwrap();
        // Same rating, product 3's purchase log term puts it first.
        assert_eq!(page.data[0].id, ProductId(3));
    }
}
