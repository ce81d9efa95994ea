//! Product Discovery Engine
//!
//! Catalog search with a dual-path router (full-text index with a transparent
//! scan fallback), attribute-similarity ranking, history-derived personalized
//! recommendations with a trending fallback, and deduplicated view/favorite
//! recording. Everything here is a stateless request handler over the store
//! traits in [`store`]; durable state belongs to the persistence collaborator.

pub mod activity;
pub mod engine;
pub mod memory;
pub mod preference;
pub mod scoring;
pub mod search;
pub mod similarity;
pub mod store;
pub mod trending;
pub mod types;

pub use engine::DiscoveryEngine;
pub use preference::PreferenceVector;

use crate::errors::DiscoveryError;

/// Result type for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Page size cap shared by every discovery operation.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Upper bound on the candidate pool fetched before in-process scoring.
pub const CANDIDATE_POOL_LIMIT: u32 = 500;

/// Interaction-history vote weights.
pub const PURCHASE_VOTE_WEIGHT: f64 = 3.0;
pub const FAVORITE_VOTE_WEIGHT: f64 = 2.0;
pub const VIEW_VOTE_WEIGHT: f64 = 1.0;

/// Linear view decay: the newest view keeps full weight, each older view
/// loses one step, never dropping below the floor.
pub const VIEW_DECAY_STEP: f64 = 0.1;
pub const VIEW_DECAY_FLOOR: f64 = 0.1;

/// How many of the user's most recent views feed the preference maps.
pub const RECENT_VIEW_SAMPLE: u32 = 50;

/// Identical (product, actor) views inside this window are collapsed.
pub const VIEW_DEDUPE_WINDOW_MINUTES: i64 = 10;

/// Views older than this are expired and never read.
pub const VIEW_RETENTION_DAYS: i64 = 90;

/// Products younger than this feed the trending pool and earn the
/// personalized freshness bonus.
pub const FRESHNESS_WINDOW_DAYS: i64 = 30;
