use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::product::{CategoryId, ProductId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Pending,
    Completed,
    Cancelled,
    Refunded,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }
}

/// Where a product view originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewSource {
    Search,
    Category,
    Recommendation,
    Direct,
    External,
}

impl ViewSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Category => "category",
            Self::Recommendation => "recommendation",
            Self::Direct => "direct",
            Self::External => "external",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "search" => Some(Self::Search),
            "category" => Some(Self::Category),
            "recommendation" => Some(Self::Recommendation),
            "direct" => Some(Self::Direct),
            "external" => Some(Self::External),
            _ => None,
        }
    }
}

/// A signed-in user or an anonymous browsing session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Actor {
    User(UserId),
    Session(String),
}

/// A completed (or in-flight) purchase, resolved with the attributes of the
/// product it references so the preference engine can vote without extra reads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRecord {
    pub product_id: ProductId,
    pub category_id: CategoryId,
    pub brand: String,
    pub tags: Vec<String>,
    pub status: PurchaseStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteRecord {
    pub product_id: ProductId,
    pub category_id: CategoryId,
    pub brand: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewRecord {
    pub id: i64,
    pub product_id: ProductId,
    pub actor: Actor,
    pub category_id: CategoryId,
    pub brand: String,
    pub tags: Vec<String>,
    pub source: ViewSource,
    pub created_at: DateTime<Utc>,
}

/// Input for a view insert; the store assigns id and timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct NewView {
    pub product_id: ProductId,
    pub actor: Actor,
    pub source: ViewSource,
}

#[cfg(test)]
mod tests {
    use super::{PurchaseStatus, ViewSource};

    #[test]
    fn purchase_status_round_trips_through_str() {
        for status in [
            PurchaseStatus::Pending,
            PurchaseStatus::Completed,
            PurchaseStatus::Cancelled,
            PurchaseStatus::Refunded,
        ] {
            assert_eq!(PurchaseStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PurchaseStatus::parse("shipped"), None);
    }

    #[test]
    fn view_source_round_trips_through_str() {
        for source in [
            ViewSource::Search,
            ViewSource::Category,
            ViewSource::Recommendation,
            ViewSource::Direct,
            ViewSource::External,
        ] {
            assert_eq!(ViewSource::parse(source.as_str()), Some(source));
        }
        assert_eq!(ViewSource::parse("email"), None);
    }
}
