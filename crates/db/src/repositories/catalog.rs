//! SQL-backed catalog store.
//!
//! The scan path is a filtered SELECT over `products`; the indexed path goes
//! through the `products_fts` FTS5 table with bm25 ranking weighted toward
//! the product name. Both paths share the same filter builder so a fallback
//! answers the same semantic query.

use std::time::Instant;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use vitrine_core::chrono::{Duration, Utc};
use vitrine_core::{
    CatalogSort, CatalogSortKey, CatalogStore, CounterField, Discount, PageRequest, Product,
    ProductFilter, ProductId, SearchHits, SearchPath, SearchQuery, SortDirection, SortKey,
    StoreError,
};

use super::{decode_error, parse_timestamp, store_error};
use crate::DbPool;

const PRODUCT_COLUMNS: &str = "p.id, p.name, p.description, p.price, p.category_id, \
     c.name AS category_name, p.brand, p.tags_json, p.stock, p.rating, p.review_count, \
     p.purchase_count, p.view_count, p.favorite_count, p.discount_percent, \
     p.discount_starts_at, p.discount_ends_at, p.is_active, p.created_at";

/// bm25 column weights for (name, description, category_name, brand).
const BM25_RANK: &str = "bm25(products_fts, 10.0, 4.0, 2.0, 2.0)";

pub struct SqlCatalogStore {
    pool: DbPool,
}

impl SqlCatalogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn count(
        &self,
        base: &str,
        filter: &ProductFilter,
        match_expr: Option<&str>,
    ) -> Result<u64, StoreError> {
        let mut builder = QueryBuilder::<Sqlite>::new(base);
        if let Some(expr) = match_expr {
            builder.push(" AND products_fts MATCH ").push_bind(expr.to_string());
        }
        push_filters(&mut builder, filter);

        let row = builder.build().fetch_one(&self.pool).await.map_err(store_error)?;
        let count: i64 = row.try_get("count").map_err(store_error)?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl CatalogStore for SqlCatalogStore {
    async fn find_active(
        &self,
        filter: &ProductFilter,
        sort: CatalogSort,
        page: PageRequest,
    ) -> Result<(Vec<Product>, u64), StoreError> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p \
             JOIN categories c ON c.id = p.category_id WHERE p.is_active = 1"
        ));
        push_filters(&mut builder, filter);
        builder.push(format!(" ORDER BY {}", sort_clause(sort)));
        builder.push(" LIMIT ").push_bind(i64::from(page.limit));
        builder.push(" OFFSET ").push_bind(i64::from(page.offset));

        let rows = builder.build().fetch_all(&self.pool).await.map_err(store_error)?;
        let items = rows.iter().map(product_from_row).collect::<Result<Vec<_>, _>>()?;

        let total = self
            .count(
                "SELECT COUNT(*) AS count FROM products p \
                 JOIN categories c ON c.id = p.category_id WHERE p.is_active = 1",
                filter,
                None,
            )
            .await?;
        Ok((items, total))
    }

    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p \
             JOIN categories c ON c.id = p.category_id WHERE p.id = ?"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn increment_counter(
        &self,
        id: ProductId,
        field: CounterField,
        delta: i64,
    ) -> Result<(), StoreError> {
        let column = field.column();
        let sql = format!("UPDATE products SET {column} = MAX(0, {column} + ?) WHERE id = ?");
        let result =
            sqlx::query(&sql).bind(delta).bind(id.0).execute(&self.pool).await.map_err(store_error)?;
        if result.rows_affected() == 0 {
            return Err(decode_error(format!("unknown product {}", id.0)));
        }
        Ok(())
    }

    async fn full_text_search(&self, query: &SearchQuery) -> Result<SearchHits, StoreError> {
        let started = Instant::now();

        let Some(match_expr) = match_expression(&query.text) else {
            // Nothing indexable in the text; the filtered scan answers the
            // same question and keeps empty-text browsing working.
            let (items, total) =
                self.find_active(&query.to_filter(), query.scan_sort(), query.page).await?;
            return Ok(SearchHits {
                items,
                total,
                elapsed_ms: started.elapsed().as_millis() as u64,
                path: SearchPath::Scan,
            });
        };

        let mut filter = query.to_filter();
        filter.text_contains = None;

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products_fts \
             JOIN products p ON p.id = products_fts.rowid \
             JOIN categories c ON c.id = p.category_id \
             WHERE p.is_active = 1 AND products_fts MATCH "
        ));
        builder.push_bind(match_expr.clone());
        push_filters(&mut builder, &filter);

        let order = if query.sort == SortKey::Relevance {
            format!("{BM25_RANK} ASC, p.created_at DESC")
        } else {
            sort_clause(query.scan_sort())
        };
        builder.push(format!(" ORDER BY {order}"));
        builder.push(" LIMIT ").push_bind(i64::from(query.page.limit));
        builder.push(" OFFSET ").push_bind(i64::from(query.page.offset));

        let rows = builder.build().fetch_all(&self.pool).await.map_err(store_error)?;
        let items = rows.iter().map(product_from_row).collect::<Result<Vec<_>, _>>()?;

        let total = self
            .count(
                "SELECT COUNT(*) AS count FROM products_fts \
                 JOIN products p ON p.id = products_fts.rowid \
                 JOIN categories c ON c.id = p.category_id WHERE p.is_active = 1",
                &filter,
                Some(&match_expr),
            )
            .await?;

        Ok(SearchHits {
            items,
            total,
            elapsed_ms: started.elapsed().as_millis() as u64,
            path: SearchPath::Fulltext,
        })
    }
}

/// Quoted prefix tokens, e.g. `wireless head` becomes `"wireless"* "head"*`.
/// Returns `None` when nothing indexable is left after sanitizing.
fn match_expression(text: &str) -> Option<String> {
    let tokens: Vec<String> = text
        .split_whitespace()
        .map(|token| token.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|token| !token.is_empty())
        .map(|token| format!("\"{token}\"*"))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &ProductFilter) {
    if let Some(category) = filter.category {
        builder.push(" AND p.category_id = ").push_bind(category.0);
    }
    if let Some(brand) = &filter.brand {
        builder.push(" AND p.brand = ").push_bind(brand.clone());
    }
    if let Some(min) = filter.min_price {
        builder.push(" AND p.price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        builder.push(" AND p.price <= ").push_bind(max);
    }
    if let Some(min) = filter.min_rating {
        builder.push(" AND p.rating >= ").push_bind(min);
    }
    if let Some(min) = filter.min_review_count {
        builder.push(" AND p.review_count >= ").push_bind(i64::from(min));
    }
    if filter.in_stock_only {
        builder.push(" AND p.stock > 0");
    }
    if filter.discounted_only {
        let now = Utc::now().to_rfc3339();
        builder.push(" AND p.discount_percent > 0");
        builder
            .push(" AND (p.discount_starts_at IS NULL OR p.discount_starts_at <= ")
            .push_bind(now.clone())
            .push(")");
        builder
            .push(" AND (p.discount_ends_at IS NULL OR p.discount_ends_at >= ")
            .push_bind(now)
            .push(")");
    }
    if let Some(text) = &filter.text_contains {
        let pattern = format!("%{}%", text.to_lowercase());
        builder
            .push(" AND (LOWER(p.name) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(p.description) LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(days) = filter.created_within_days {
        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();
        builder.push(" AND p.created_at >= ").push_bind(cutoff);
    }
    if !filter.exclude.is_empty() {
        builder.push(" AND p.id NOT IN (");
        let mut ids = builder.separated(", ");
        for id in &filter.exclude {
            ids.push_bind(id.0);
        }
        builder.push(")");
    }
    if let Some(related) = &filter.related_to {
        builder.push(" AND (p.category_id = ").push_bind(related.category.0);
        if !related.brand.is_empty() {
            builder.push(" OR p.brand = ").push_bind(related.brand.clone());
        }
        if !related.tags.is_empty() {
            builder.push(
                " OR EXISTS (SELECT 1 FROM json_each(p.tags_json) WHERE json_each.value IN (",
            );
            let mut tags = builder.separated(", ");
            for tag in &related.tags {
                tags.push_bind(tag.clone());
            }
            builder.push("))");
        }
        builder.push(")");
    }
}

fn sort_clause(sort: CatalogSort) -> String {
    let column = match sort.key {
        CatalogSortKey::Price => "p.price",
        CatalogSortKey::Rating => "p.rating",
        CatalogSortKey::ReviewCount => "p.review_count",
        CatalogSortKey::Name => "p.name",
        CatalogSortKey::CreatedAt => "p.created_at",
    };
    let direction = match sort.direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    };
    format!("{column} {direction}, p.id ASC")
}

fn product_from_row(row: &SqliteRow) -> Result<Product, StoreError> {
    let tags_json: String = row.try_get("tags_json").map_err(store_error)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json)
        .map_err(|e| decode_error(format!("invalid tags_json: {e}")))?;

    let discount_percent: f64 = row.try_get("discount_percent").map_err(store_error)?;
    let discount = if discount_percent > 0.0 {
        let starts_at: Option<String> = row.try_get("discount_starts_at").map_err(store_error)?;
        let ends_at: Option<String> = row.try_get("discount_ends_at").map_err(store_error)?;
        Some(Discount {
            percent: discount_percent,
            starts_at: starts_at
                .map(|ts| parse_timestamp("discount_starts_at", &ts))
                .transpose()?,
            ends_at: ends_at.map(|ts| parse_timestamp("discount_ends_at", &ts)).transpose()?,
        })
    } else {
        None
    };

    let created_at: String = row.try_get("created_at").map_err(store_error)?;

    Ok(Product {
        id: ProductId(row.try_get("id").map_err(store_error)?),
        name: row.try_get("name").map_err(store_error)?,
        description: row.try_get("description").map_err(store_error)?,
        price: row.try_get("price").map_err(store_error)?,
        category_id: vitrine_core::CategoryId(row.try_get("category_id").map_err(store_error)?),
        category_name: row.try_get("category_name").map_err(store_error)?,
        brand: row.try_get("brand").map_err(store_error)?,
        tags,
        stock: row.try_get("stock").map_err(store_error)?,
        rating: row.try_get("rating").map_err(store_error)?,
        review_count: row.try_get("review_count").map_err(store_error)?,
        purchase_count: row.try_get("purchase_count").map_err(store_error)?,
        view_count: row.try_get("view_count").map_err(store_error)?,
        favorite_count: row.try_get("favorite_count").map_err(store_error)?,
        discount,
        is_active: row.try_get("is_active").map_err(store_error)?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use vitrine_core::CategoryId;

    use super::*;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        sqlx::query("INSERT INTO categories (id, name) VALUES (1, 'Audio'), (2, 'Kitchen')")
            .execute(&pool)
            .await
            .expect("insert categories");
        pool
    }

    async fn insert_product(
        pool: &DbPool,
        id: i64,
        name: &str,
        description: &str,
        category: i64,
        price: f64,
    ) {
        sqlx::query(
            "INSERT INTO products \
             (id, name, description, price, category_id, brand, tags_json, stock, created_at) \
             VALUES (?, ?, ?, ?, ?, 'Acme', '[\"tag\"]', 5, ?)",
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(price)
        .bind(category)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .expect("insert product");
    }

    #[tokio::test]
    async fn find_active_filters_and_sorts() {
        let pool = setup_pool().await;
        insert_product(&pool, 1, "earbuds", "", 1, 60.0).await;
        insert_product(&pool, 2, "speaker", "", 1, 150.0).await;
        insert_product(&pool, 3, "kettle", "", 2, 30.0).await;
        let store = SqlCatalogStore::new(pool.clone());

        let filter = ProductFilter {
            category: Some(CategoryId(1)),
            min_price: Some(50.0),
            ..ProductFilter::default()
        };
        let sort = CatalogSort { key: CatalogSortKey::Price, direction: SortDirection::Asc };
        let (items, total) =
            store.find_active(&filter, sort, PageRequest::default()).await.expect("find");

        assert_eq!(total, 2);
        let ids: Vec<i64> = items.iter().map(|p| p.id.0).collect();
        assert_eq!(ids, vec![1, 2]);
        pool.close().await;
    }

    #[tokio::test]
    async fn inactive_products_are_invisible() {
        let pool = setup_pool().await;
        insert_product(&pool, 1, "earbuds", "", 1, 60.0).await;
        sqlx::query("UPDATE products SET is_active = 0 WHERE id = 1")
            .execute(&pool)
            .await
            .expect("retire product");
        let store = SqlCatalogStore::new(pool.clone());

        let (items, total) = store
            .find_active(&ProductFilter::default(), CatalogSort::newest_first(), PageRequest::default())
            .await
            .expect("find");
        assert_eq!(total, 0);
        assert!(items.is_empty());
        pool.close().await;
    }

    #[tokio::test]
    async fn full_text_search_prefers_name_matches() {
        let pool = setup_pool().await;
        insert_product(&pool, 1, "steel kettle", "a plain pot", 2, 30.0).await;
        insert_product(&pool, 2, "tea pot", "pairs well with any kettle", 2, 25.0).await;
        let store = SqlCatalogStore::new(pool.clone());

        let hits = store.full_text_search(&SearchQuery::new("kettle")).await.expect("search");
        assert_eq!(hits.total, 2);
        assert_eq!(hits.path, SearchPath::Fulltext);
        assert_eq!(hits.items[0].id.0, 1, "name match should outrank description match");
        pool.close().await;
    }

    #[tokio::test]
    async fn full_text_search_matches_prefixes() {
        let pool = setup_pool().await;
        insert_product(&pool, 1, "wireless headphones", "", 1, 99.0).await;
        let store = SqlCatalogStore::new(pool.clone());

        let hits = store.full_text_search(&SearchQuery::new("wirel headph")).await.expect("search");
        assert_eq!(hits.total, 1);
        pool.close().await;
    }

    #[tokio::test]
    async fn empty_text_browses_through_filters() {
        let pool = setup_pool().await;
        insert_product(&pool, 1, "earbuds", "", 1, 60.0).await;
        insert_product(&pool, 2, "kettle", "", 2, 30.0).await;
        let store = SqlCatalogStore::new(pool.clone());

        let query = SearchQuery::new("").with_category(CategoryId(2));
        let hits = store.full_text_search(&query).await.expect("search");
        assert_eq!(hits.total, 1);
        assert_eq!(hits.items[0].id.0, 2);
        assert_eq!(hits.path, SearchPath::Scan, "browsing is answered by the scan machinery");
        pool.close().await;
    }

    #[tokio::test]
    async fn scan_path_answers_the_same_query_as_the_index() {
        let pool = setup_pool().await;
        insert_product(&pool, 1, "ceramic mug", "", 2, 12.0).await;
        insert_product(&pool, 2, "mug warmer", "keeps a mug hot", 2, 20.0).await;
        let store = SqlCatalogStore::new(pool.clone());

        let query = SearchQuery::new("mug");
        let indexed = store.full_text_search(&query).await.expect("indexed");
        let (scanned, scanned_total) = store
            .find_active(&query.to_filter(), query.scan_sort(), query.page)
            .await
            .expect("scanned");

        assert_eq!(indexed.total, scanned_total);
        let mut indexed_ids: Vec<i64> = indexed.items.iter().map(|p| p.id.0).collect();
        let mut scanned_ids: Vec<i64> = scanned.iter().map(|p| p.id.0).collect();
        indexed_ids.sort_unstable();
        scanned_ids.sort_unstable();
        assert_eq!(indexed_ids, scanned_ids);
        pool.close().await;
    }

    #[tokio::test]
    async fn counters_update_atomically_and_floor_at_zero() {
        let pool = setup_pool().await;
        insert_product(&pool, 1, "earbuds", "", 1, 60.0).await;
        let store = SqlCatalogStore::new(pool.clone());

        store.increment_counter(ProductId(1), CounterField::ViewCount, 1).await.expect("bump");
        store.increment_counter(ProductId(1), CounterField::ViewCount, -5).await.expect("drop");

        let product = store.find_by_id(ProductId(1)).await.expect("find").expect("exists");
        assert_eq!(product.view_count, 0);

        let missing = store.increment_counter(ProductId(99), CounterField::ViewCount, 1).await;
        assert!(missing.is_err());
        pool.close().await;
    }

    #[tokio::test]
    async fn discounts_decode_with_their_window() {
        let pool = setup_pool().await;
        insert_product(&pool, 1, "earbuds", "", 1, 60.0).await;
        sqlx::query(
            "UPDATE products SET discount_percent = 20, discount_starts_at = ?, discount_ends_at = ? \
             WHERE id = 1",
        )
        .bind((Utc::now() - Duration::days(1)).to_rfc3339())
        .bind((Utc::now() + Duration::days(1)).to_rfc3339())
        .execute(&pool)
        .await
        .expect("set discount");
        let store = SqlCatalogStore::new(pool.clone());

        let product = store.find_by_id(ProductId(1)).await.expect("find").expect("exists");
        let discount = product.discount.expect("discount decoded");
        assert_eq!(discount.percent, 20.0);
        assert!(discount.is_active_at(Utc::now()));

        let filter = ProductFilter { discounted_only: true, ..ProductFilter::default() };
        let (_, total) = store
            .find_active(&filter, CatalogSort::newest_first(), PageRequest::default())
            .await
            .expect("find discounted");
        assert_eq!(total, 1);
        pool.close().await;
    }
}
