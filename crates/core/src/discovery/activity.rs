//! View and favorite recording.
//!
//! Views are the noisiest signal, so identical (product, actor) views inside
//! a short window collapse into the earlier record and bump no counter.
//! Favorite mutations are delegated to the store as a single transaction over
//! the favorites row and the product counter.

use chrono::Duration;
use serde::Serialize;
use tracing::{debug, info};

use super::store::{CatalogStore, CounterField, InteractionStore, StoreError};
use super::{DiscoveryResult, VIEW_DEDUPE_WINDOW_MINUTES, VIEW_RETENTION_DAYS};
use crate::domain::interaction::{Actor, FavoriteRecord, NewView, ViewRecord};
use crate::domain::product::{ProductId, UserId};
use crate::errors::DiscoveryError;

/// The outcome of a view submission. `deduplicated` is true when the request
/// collapsed into an earlier view and `record` is that earlier row.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedView {
    pub record: ViewRecord,
    pub deduplicated: bool,
}

pub(crate) async fn record_view(
    catalog: &dyn CatalogStore,
    interactions: &dyn InteractionStore,
    view: NewView,
) -> DiscoveryResult<RecordedView> {
    validate_product_id(view.product_id)?;
    if let Actor::Session(session) = &view.actor {
        if session.trim().is_empty() {
            return Err(DiscoveryError::invalid_input("session id must not be blank"));
        }
    }
    require_active_product(catalog, view.product_id).await?;

    // Check-then-insert: concurrent identical views can slip past the window
    // probe and both count. The window is advisory, not a uniqueness rule.
    let window = Duration::minutes(VIEW_DEDUPE_WINDOW_MINUTES);
    if let Some(existing) =
        interactions.find_duplicate_view(view.product_id, &view.actor, window).await?
    {
        debug!(
            event_name = "view.deduplicated",
            product = view.product_id.0,
            "collapsed into a recent identical view"
        );
        return Ok(RecordedView { record: existing, deduplicated: true });
    }

    let record = interactions.insert_view(view).await?;
    catalog.increment_counter(record.product_id, CounterField::ViewCount, 1).await?;
    Ok(RecordedView { record, deduplicated: false })
}

pub(crate) async fn add_favorite(
    catalog: &dyn CatalogStore,
    interactions: &dyn InteractionStore,
    user: UserId,
    product: ProductId,
) -> DiscoveryResult<FavoriteRecord> {
    validate_user_id(user)?;
    validate_product_id(product)?;
    require_active_product(catalog, product).await?;

    let record = interactions.add_favorite(user, product).await.map_err(|err| match err {
        StoreError::Duplicate(_) => {
            DiscoveryError::Conflict("product is already a favorite".to_string())
        }
        other => DiscoveryError::from(other),
    })?;

    info!(
        event_name = "favorite.added",
        user = user.0,
        product = product.0,
        "favorite recorded"
    );
    Ok(record)
}

pub(crate) async fn remove_favorite(
    catalog: &dyn CatalogStore,
    interactions: &dyn InteractionStore,
    user: UserId,
    product: ProductId,
) -> DiscoveryResult<()> {
    validate_user_id(user)?;
    validate_product_id(product)?;
    // The product may have been retired since it was favorited; removal only
    // needs the row to exist, not the product to still be live.
    let _ = catalog;

    let removed = interactions.remove_favorite(user, product).await?;
    if !removed {
        return Err(DiscoveryError::NotFound { entity: "favorite", id: product.0 });
    }

    info!(
        event_name = "favorite.removed",
        user = user.0,
        product = product.0,
        "favorite removed"
    );
    Ok(())
}

/// Drop views past the retention horizon. Intended for a periodic sweeper.
pub(crate) async fn prune_expired_views(interactions: &dyn InteractionStore) -> DiscoveryResult<u64> {
    let dropped = interactions.prune_expired_views(Duration::days(VIEW_RETENTION_DAYS)).await?;
    if dropped > 0 {
        info!(event_name = "views.pruned", dropped, "expired view records removed");
    }
    Ok(dropped)
}

async fn require_active_product(
    catalog: &dyn CatalogStore,
    product: ProductId,
) -> DiscoveryResult<()> {
    catalog
        .find_by_id(product)
        .await?
        .filter(|p| p.is_active)
        .map(|_| ())
        .ok_or(DiscoveryError::NotFound { entity: "product", id: product.0 })
}

fn validate_product_id(product: ProductId) -> DiscoveryResult<()> {
    if product.0 <= 0 {
        return Err(DiscoveryError::invalid_input(format!(
            "product id must be positive, got {}",
            product.0
        )));
    }
    Ok(())
}

fn validate_user_id(user: UserId) -> DiscoveryResult<()> {
    if user.0 <= 0 {
        return Err(DiscoveryError::invalid_input(format!(
            "user id must be positive, got {}",
            user.0
        )));
    }
    Ok(())
}
