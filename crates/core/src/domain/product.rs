use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Percentage discount with an optional activity window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discount {
    pub percent: f64,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl Discount {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        if self.percent <= 0.0 {
            return false;
        }
        if let Some(starts_at) = self.starts_at {
            if now < starts_at {
                return false;
            }
        }
        if let Some(ends_at) = self.ends_at {
            if now > ends_at {
                return false;
            }
        }
        true
    }
}

/// Catalog record as the discovery engine sees it.
///
/// `rating` and `review_count` are derived from the review log by the review
/// subsystem; discovery reads them but never writes them. The three popularity
/// counters are only ever changed through the store's atomic increment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category_id: CategoryId,
    pub category_name: String,
    pub brand: String,
    pub tags: Vec<String>,
    pub stock: u32,
    pub rating: f64,
    pub review_count: u32,
    pub purchase_count: u32,
    pub view_count: u32,
    pub favorite_count: u32,
    pub discount: Option<Discount>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn age_in_days(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_seconds().max(0) as f64 / 86_400.0
    }

    pub fn created_within_days(&self, now: DateTime<Utc>, days: i64) -> bool {
        (now - self.created_at).num_days() < days
    }
}
