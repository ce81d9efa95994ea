use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::connect_with_settings;

    #[tokio::test]
    async fn migrations_create_the_catalog_schema() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for table in ["categories", "products", "purchases", "favorites", "product_views"] {
            let count = sqlx::query(
                "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .expect("check table")
            .get::<i64, _>("count");
            assert_eq!(count, 1, "missing table {table}");
        }
    }

    #[tokio::test]
    async fn full_text_index_tracks_product_writes() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query("INSERT INTO categories (id, name) VALUES (1, 'Audio')")
            .execute(&pool)
            .await
            .expect("insert category");
        sqlx::query(
            "INSERT INTO products (id, name, description, price, category_id, brand, created_at)
             VALUES (1, 'noise cancelling headphones', '', 199.0, 1, 'Acme', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert product");

        let hits = sqlx::query(
            "SELECT COUNT(*) AS count FROM products_fts WHERE products_fts MATCH '\"noise\"*'",
        )
        .fetch_one(&pool)
        .await
        .expect("query index")
        .get::<i64, _>("count");
        assert_eq!(hits, 1);

        sqlx::query("DELETE FROM products WHERE id = 1")
            .execute(&pool)
            .await
            .expect("delete product");
        let hits = sqlx::query("SELECT COUNT(*) AS count FROM products_fts")
            .fetch_one(&pool)
            .await
            .expect("query index after delete")
            .get::<i64, _>("count");
        assert_eq!(hits, 0);
    }
}
