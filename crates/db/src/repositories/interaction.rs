//! SQL-backed interaction store.
//!
//! History reads resolve the referenced product's category, brand and tags in
//! the same query so the preference engine never fans out per record. The
//! favorite mutations run the log write and the counter update inside one
//! transaction.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use vitrine_core::chrono::{DateTime, Duration, Utc};
use vitrine_core::{
    Actor, CategoryId, FavoriteRecord, InteractionStore, NewView, ProductId, PurchaseRecord,
    PurchaseStatus, StoreError, UserId, ViewRecord, ViewSource,
};

use super::{decode_error, parse_timestamp, store_error};
use crate::DbPool;

pub struct SqlInteractionStore {
    pool: DbPool,
}

impl SqlInteractionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InteractionStore for SqlInteractionStore {
    async fn completed_purchases(&self, user: UserId) -> Result<Vec<PurchaseRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT pu.product_id, p.category_id, p.brand, p.tags_json, pu.status, pu.created_at \
             FROM purchases pu JOIN products p ON p.id = pu.product_id \
             WHERE pu.user_id = ? AND pu.status = 'completed' \
             ORDER BY pu.created_at DESC",
        )
        .bind(user.0)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter().map(purchase_from_row).collect()
    }

    async fn favorites(&self, user: UserId) -> Result<Vec<FavoriteRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT f.product_id, p.category_id, p.brand, p.tags_json, f.created_at \
             FROM favorites f JOIN products p ON p.id = f.product_id \
             WHERE f.user_id = ? \
             ORDER BY f.created_at DESC",
        )
        .bind(user.0)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter().map(favorite_from_row).collect()
    }

    async fn recent_views(&self, user: UserId, limit: u32) -> Result<Vec<ViewRecord>, StoreError> {
        let horizon = (Utc::now() - Duration::days(vitrine_core::discovery::VIEW_RETENTION_DAYS))
            .to_rfc3339();
        let rows = sqlx::query(
            "SELECT v.id, v.product_id, v.user_id, v.session_id, v.source, v.created_at, \
                    p.category_id, p.brand, p.tags_json \
             FROM product_views v JOIN products p ON p.id = v.product_id \
             WHERE v.user_id = ? AND v.created_at >= ? \
             ORDER BY v.created_at DESC \
             LIMIT ?",
        )
        .bind(user.0)
        .bind(horizon)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter().map(view_from_row).collect()
    }

    async fn insert_view(&self, view: NewView) -> Result<ViewRecord, StoreError> {
        let attrs = product_attrs(&self.pool, view.product_id).await?;
        let now = Utc::now();
        let (user_id, session_id) = match &view.actor {
            Actor::User(user) => (Some(user.0), None),
            Actor::Session(session) => (None, Some(session.clone())),
        };

        let result = sqlx::query(
            "INSERT INTO product_views (product_id, user_id, session_id, source, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(view.product_id.0)
        .bind(user_id)
        .bind(session_id)
        .bind(view.source.as_str())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(ViewRecord {
            id: result.last_insert_rowid(),
            product_id: view.product_id,
            actor: view.actor,
            category_id: attrs.category_id,
            brand: attrs.brand,
            tags: attrs.tags,
            source: view.source,
            created_at: now,
        })
    }

    async fn find_duplicate_view(
        &self,
        product: ProductId,
        actor: &Actor,
        within: Duration,
    ) -> Result<Option<ViewRecord>, StoreError> {
        let horizon = (Utc::now() - within).to_rfc3339();
        let actor_clause = match actor {
            Actor::User(_) => "v.user_id = ?",
            Actor::Session(_) => "v.session_id = ?",
        };
        let sql = format!(
            "SELECT v.id, v.product_id, v.user_id, v.session_id, v.source, v.created_at, \
                    p.category_id, p.brand, p.tags_json \
             FROM product_views v JOIN products p ON p.id = v.product_id \
             WHERE v.product_id = ? AND {actor_clause} AND v.created_at >= ? \
             ORDER BY v.created_at DESC \
             LIMIT 1"
        );

        let query = sqlx::query(&sql).bind(product.0);
        let query = match actor {
            Actor::User(user) => query.bind(user.0),
            Actor::Session(session) => query.bind(session.clone()),
        };
        let row = query.bind(horizon).fetch_optional(&self.pool).await.map_err(store_error)?;

        row.as_ref().map(view_from_row).transpose()
    }

    async fn add_favorite(
        &self,
        user: UserId,
        product: ProductId,
    ) -> Result<FavoriteRecord, StoreError> {
        let attrs = product_attrs(&self.pool, product).await?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(store_error)?;
        sqlx::query("INSERT INTO favorites (user_id, product_id, created_at) VALUES (?, ?, ?)")
            .bind(user.0)
            .bind(product.0)
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        sqlx::query("UPDATE products SET favorite_count = favorite_count + 1 WHERE id = ?")
            .bind(product.0)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        tx.commit().await.map_err(store_error)?;

        Ok(FavoriteRecord {
            product_id: product,
            category_id: attrs.category_id,
            brand: attrs.brand,
            tags: attrs.tags,
            created_at: now,
        })
    }

    async fn remove_favorite(
        &self,
        user: UserId,
        product: ProductId,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        let deleted = sqlx::query("DELETE FROM favorites WHERE user_id = ? AND product_id = ?")
            .bind(user.0)
            .bind(product.0)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?
            .rows_affected();
        if deleted == 0 {
            return Ok(false);
        }
        sqlx::query("UPDATE products SET favorite_count = MAX(0, favorite_count - 1) WHERE id = ?")
            .bind(product.0)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        tx.commit().await.map_err(store_error)?;
        Ok(true)
    }

    async fn prune_expired_views(&self, retention: Duration) -> Result<u64, StoreError> {
        let horizon = (Utc::now() - retention).to_rfc3339();
        let result = sqlx::query("DELETE FROM product_views WHERE created_at < ?")
            .bind(horizon)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected())
    }
}

struct ProductAttrs {
    category_id: CategoryId,
    brand: String,
    tags: Vec<String>,
}

async fn product_attrs(pool: &DbPool, product: ProductId) -> Result<ProductAttrs, StoreError> {
    let row = sqlx::query("SELECT category_id, brand, tags_json FROM products WHERE id = ?")
        .bind(product.0)
        .fetch_optional(pool)
        .await
        .map_err(store_error)?
        .ok_or_else(|| decode_error(format!("unknown product {}", product.0)))?;
    attrs_from_row(&row)
}

fn attrs_from_row(row: &SqliteRow) -> Result<ProductAttrs, StoreError> {
    let tags_json: String = row.try_get("tags_json").map_err(store_error)?;
    Ok(ProductAttrs {
        category_id: CategoryId(row.try_get("category_id").map_err(store_error)?),
        brand: row.try_get("brand").map_err(store_error)?,
        tags: serde_json::from_str(&tags_json)
            .map_err(|e| decode_error(format!("invalid tags_json: {e}")))?,
    })
}

fn purchase_from_row(row: &SqliteRow) -> Result<PurchaseRecord, StoreError> {
    let attrs = attrs_from_row(row)?;
    let status: String = row.try_get("status").map_err(store_error)?;
    let created_at: String = row.try_get("created_at").map_err(store_error)?;

    Ok(PurchaseRecord {
        product_id: ProductId(row.try_get("product_id").map_err(store_error)?),
        category_id: attrs.category_id,
        brand: attrs.brand,
        tags: attrs.tags,
        status: PurchaseStatus::parse(&status)
            .ok_or_else(|| decode_error(format!("invalid purchase status: {status}")))?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

fn favorite_from_row(row: &SqliteRow) -> Result<FavoriteRecord, StoreError> {
    let attrs = attrs_from_row(row)?;
    let created_at: String = row.try_get("created_at").map_err(store_error)?;

    Ok(FavoriteRecord {
        product_id: ProductId(row.try_get("product_id").map_err(store_error)?),
        category_id: attrs.category_id,
        brand: attrs.brand,
        tags: attrs.tags,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

fn view_from_row(row: &SqliteRow) -> Result<ViewRecord, StoreError> {
    let attrs = attrs_from_row(row)?;
    let source: String = row.try_get("source").map_err(store_error)?;
    let created_at: String = row.try_get("created_at").map_err(store_error)?;
    let user_id: Option<i64> = row.try_get("user_id").map_err(store_error)?;
    let session_id: Option<String> = row.try_get("session_id").map_err(store_error)?;

    let actor = match (user_id, session_id) {
        (Some(user), _) => Actor::User(UserId(user)),
        (None, Some(session)) => Actor::Session(session),
        (None, None) => return Err(decode_error("view row has neither user nor session")),
    };

    Ok(ViewRecord {
        id: row.try_get("id").map_err(store_error)?,
        product_id: ProductId(row.try_get("product_id").map_err(store_error)?),
        actor,
        category_id: attrs.category_id,
        brand: attrs.brand,
        tags: attrs.tags,
        source: ViewSource::parse(&source)
            .ok_or_else(|| decode_error(format!("invalid view source: {source}")))?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use vitrine_core::CatalogStore;

    use super::*;
    use crate::repositories::SqlCatalogStore;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        sqlx::query("INSERT INTO categories (id, name) VALUES (1, 'Audio')")
            .execute(&pool)
            .await
            .expect("insert category");
        sqlx::query(
            "INSERT INTO products \
             (id, name, price, category_id, brand, tags_json, stock, created_at) \
             VALUES (1, 'earbuds', 60.0, 1, 'Acme', '[\"audio\"]', 5, ?)",
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .expect("insert product");
        pool
    }

    async fn insert_purchase(pool: &DbPool, user: i64, status: &str, created_at: DateTime<Utc>) {
        sqlx::query(
            "INSERT INTO purchases (user_id, product_id, status, created_at) VALUES (?, 1, ?, ?)",
        )
        .bind(user)
        .bind(status)
        .bind(created_at.to_rfc3339())
        .execute(pool)
        .await
        .expect("insert purchase");
    }

    #[tokio::test]
    async fn completed_purchases_are_resolved_and_filtered() {
        let pool = setup_pool().await;
        insert_purchase(&pool, 7, "completed", Utc::now() - Duration::days(2)).await;
        insert_purchase(&pool, 7, "completed", Utc::now() - Duration::days(1)).await;
        insert_purchase(&pool, 7, "cancelled", Utc::now()).await;
        insert_purchase(&pool, 8, "completed", Utc::now()).await;
        let store = SqlInteractionStore::new(pool.clone());

        let purchases = store.completed_purchases(UserId(7)).await.expect("purchases");
        assert_eq!(purchases.len(), 2);
        assert!(purchases[0].created_at > purchases[1].created_at);
        assert_eq!(purchases[0].category_id, CategoryId(1));
        assert_eq!(purchases[0].tags, vec!["audio".to_string()]);
        pool.close().await;
    }

    #[tokio::test]
    async fn favorite_add_and_remove_keep_the_counter_in_step() {
        let pool = setup_pool().await;
        let store = SqlInteractionStore::new(pool.clone());
        let catalog = SqlCatalogStore::new(pool.clone());

        let record = store.add_favorite(UserId(7), ProductId(1)).await.expect("add");
        assert_eq!(record.brand, "Acme");
        let product = catalog.find_by_id(ProductId(1)).await.expect("find").expect("exists");
        assert_eq!(product.favorite_count, 1);

        let duplicate = store.add_favorite(UserId(7), ProductId(1)).await;
        assert!(matches!(duplicate, Err(StoreError::Duplicate(_))));
        let product = catalog.find_by_id(ProductId(1)).await.expect("find").expect("exists");
        assert_eq!(product.favorite_count, 1, "failed insert must not bump the counter");

        assert!(store.remove_favorite(UserId(7), ProductId(1)).await.expect("remove"));
        assert!(!store.remove_favorite(UserId(7), ProductId(1)).await.expect("remove again"));
        let product = catalog.find_by_id(ProductId(1)).await.expect("find").expect("exists");
        assert_eq!(product.favorite_count, 0);
        pool.close().await;
    }

    #[tokio::test]
    async fn views_round_trip_with_their_actor() {
        let pool = setup_pool().await;
        let store = SqlInteractionStore::new(pool.clone());

        let by_user = store
            .insert_view(NewView {
                product_id: ProductId(1),
                actor: Actor::User(UserId(7)),
                source: ViewSource::Search,
            })
            .await
            .expect("insert user view");
        let by_session = store
            .insert_view(NewView {
                product_id: ProductId(1),
                actor: Actor::Session("sess-1".to_string()),
                source: ViewSource::Direct,
            })
            .await
            .expect("insert session view");
        assert_ne!(by_user.id, by_session.id);

        let recent = store.recent_views(UserId(7), 10).await.expect("recent");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].actor, Actor::User(UserId(7)));
        assert_eq!(recent[0].source, ViewSource::Search);
        pool.close().await;
    }

    #[tokio::test]
    async fn duplicate_view_lookup_respects_the_window_and_actor() {
        let pool = setup_pool().await;
        let store = SqlInteractionStore::new(pool.clone());

        let first = store
            .insert_view(NewView {
                product_id: ProductId(1),
                actor: Actor::User(UserId(7)),
                source: ViewSource::Direct,
            })
            .await
            .expect("insert view");

        let found = store
            .find_duplicate_view(ProductId(1), &Actor::User(UserId(7)), Duration::minutes(10))
            .await
            .expect("lookup");
        assert_eq!(found.map(|v| v.id), Some(first.id));

        let other_actor = store
            .find_duplicate_view(
                ProductId(1),
                &Actor::Session("sess-1".to_string()),
                Duration::minutes(10),
            )
            .await
            .expect("lookup other actor");
        assert!(other_actor.is_none());
        pool.close().await;
    }

    #[tokio::test]
    async fn pruning_drops_only_expired_views() {
        let pool = setup_pool().await;
        let store = SqlInteractionStore::new(pool.clone());

        sqlx::query(
            "INSERT INTO product_views (product_id, user_id, source, created_at) \
             VALUES (1, 7, 'direct', ?), (1, 7, 'direct', ?)",
        )
        .bind((Utc::now() - Duration::days(100)).to_rfc3339())
        .bind((Utc::now() - Duration::days(1)).to_rfc3339())
        .execute(&pool)
        .await
        .expect("insert views");

        let dropped = store.prune_expired_views(Duration::days(90)).await.expect("prune");
        assert_eq!(dropped, 1);
        let remaining = store.recent_views(UserId(7), 10).await.expect("recent");
        assert_eq!(remaining.len(), 1);
        pool.close().await;
    }
}
