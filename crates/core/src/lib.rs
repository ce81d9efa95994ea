pub use chrono;

pub mod config;
pub mod discovery;
pub mod domain;
pub mod errors;

pub use discovery::activity::RecordedView;
pub use discovery::engine::DiscoveryEngine;
pub use discovery::store::{
    CatalogSort, CatalogSortKey, CatalogStore, CounterField, InteractionStore, ProductFilter,
    RelatedFilter, SearchHits, StoreError,
};
pub use discovery::types::{
    Page, PageMeta, PageRequest, SearchPath, SearchQuery, SortDirection, SortKey, TimeRange,
};
pub use domain::interaction::{
    Actor, FavoriteRecord, NewView, PurchaseRecord, PurchaseStatus, ViewRecord, ViewSource,
};
pub use domain::product::{CategoryId, Discount, Product, ProductId, UserId};
pub use errors::DiscoveryError;
