//! HTTP surface for the discovery engine.
//!
//! Endpoints:
//! - `GET    /api/v1/products/search`                          — catalog search
//! - `GET    /api/v1/products/trending`                        — trending ranking
//! - `GET    /api/v1/products/{id}/similar`                    — similar products
//! - `POST   /api/v1/products/{id}/views`                      — record a view
//! - `GET    /api/v1/users/{id}/recommendations`               — personalized ranking
//! - `POST   /api/v1/users/{user_id}/favorites/{product_id}`   — add a favorite
//! - `DELETE /api/v1/users/{user_id}/favorites/{product_id}`   — remove a favorite

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;
use vitrine_core::{
    Actor, CategoryId, DiscoveryEngine, DiscoveryError, FavoriteRecord, NewView, Page,
    PageRequest, Product, ProductId, RecordedView, SearchQuery, SortDirection, SortKey,
    TimeRange, UserId, ViewSource,
};

#[derive(Clone)]
pub struct DiscoveryState {
    engine: Arc<DiscoveryEngine>,
}

pub fn router(engine: Arc<DiscoveryEngine>) -> Router {
    Router::new()
        .route("/api/v1/products/search", get(search_products))
        .route("/api/v1/products/trending", get(trending_products))
        .route("/api/v1/products/{id}/similar", get(similar_products))
        .route("/api/v1/products/{id}/views", post(record_view))
        .route("/api/v1/users/{id}/recommendations", get(recommendations))
        .route(
            "/api/v1/users/{user_id}/favorites/{product_id}",
            post(add_favorite).delete(remove_favorite),
        )
        .with_state(DiscoveryState { engine })
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchParams {
    pub q: Option<String>,
    pub category: Option<i64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rating: Option<f64>,
    pub min_reviews: Option<u32>,
    pub in_stock: Option<bool>,
    pub discounted: Option<bool>,
    pub brand: Option<String>,
    pub sort: Option<String>,
    pub direction: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PageParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TrendingParams {
    pub range: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewRequest {
    pub user_id: Option<i64>,
    pub session_id: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

/// Boundary error: the response body carries the safe message and a
/// correlation id; the detailed cause goes to the log under the same id.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl From<DiscoveryError> for ApiError {
    fn from(error: DiscoveryError) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        let status = match &error {
            DiscoveryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            DiscoveryError::NotFound { .. } => StatusCode::NOT_FOUND,
            DiscoveryError::Conflict(_) => StatusCode::CONFLICT,
            DiscoveryError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            DiscoveryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(
                event_name = "api.request_failed",
                correlation_id = %correlation_id,
                error = %error,
                "request failed"
            );
        } else {
            warn!(
                event_name = "api.request_rejected",
                correlation_id = %correlation_id,
                error = %error,
                "request rejected"
            );
        }

        Self {
            status,
            body: ErrorBody { error: error.user_message().to_string(), correlation_id },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn search_products(
    State(state): State<DiscoveryState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Page<Product>>, ApiError> {
    let query = search_query(params)?;
    let page = state.engine.search(&query).await?;
    Ok(Json(page))
}

pub async fn similar_products(
    State(state): State<DiscoveryState>,
    Path(id): Path<i64>,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<Product>>, ApiError> {
    let page = PageRequest::new(params.limit, params.offset);
    let result = state.engine.similar_products(ProductId(id), page).await?;
    Ok(Json(result))
}

pub async fn recommendations(
    State(state): State<DiscoveryState>,
    Path(id): Path<i64>,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<Product>>, ApiError> {
    let page = PageRequest::new(params.limit, params.offset);
    let result = state.engine.personalized(UserId(id), page).await?;
    Ok(Json(result))
}

pub async fn trending_products(
    State(state): State<DiscoveryState>,
    Query(params): Query<TrendingParams>,
) -> Result<Json<Page<Product>>, ApiError> {
    let range = match params.range.as_deref() {
        None => TimeRange::default(),
        Some(value) => TimeRange::parse(value).ok_or_else(|| {
            ApiError::from(DiscoveryError::invalid_input(format!(
                "range must be one of day, week, month; got {value}"
            )))
        })?,
    };
    let page = PageRequest::new(params.limit, params.offset);
    let result = state.engine.trending(range, page).await?;
    Ok(Json(result))
}

pub async fn record_view(
    State(state): State<DiscoveryState>,
    Path(id): Path<i64>,
    Json(request): Json<ViewRequest>,
) -> Result<(StatusCode, Json<RecordedView>), ApiError> {
    let actor = match (request.user_id, request.session_id) {
        (Some(user), _) => Actor::User(UserId(user)),
        (None, Some(session)) => Actor::Session(session),
        (None, None) => {
            return Err(DiscoveryError::invalid_input(
                "either userId or sessionId is required",
            )
            .into())
        }
    };
    let source = match request.source.as_deref() {
        None => ViewSource::Direct,
        Some(value) => ViewSource::parse(value).ok_or_else(|| {
            ApiError::from(DiscoveryError::invalid_input(format!("unknown view source {value}")))
        })?,
    };

    let outcome = state
        .engine
        .record_view(NewView { product_id: ProductId(id), actor, source })
        .await?;
    let status = if outcome.deduplicated { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(outcome)))
}

pub async fn add_favorite(
    State(state): State<DiscoveryState>,
    Path((user_id, product_id)): Path<(i64, i64)>,
) -> Result<(StatusCode, Json<FavoriteRecord>), ApiError> {
    let record = state.engine.add_favorite(UserId(user_id), ProductId(product_id)).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn remove_favorite(
    State(state): State<DiscoveryState>,
    Path((user_id, product_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    state.engine.remove_favorite(UserId(user_id), ProductId(product_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn search_query(params: SearchParams) -> Result<SearchQuery, ApiError> {
    let mut query = SearchQuery::new(params.q.unwrap_or_default());
    if let Some(category) = params.category {
        query = query.with_category(CategoryId(category));
    }
    query = query.with_price_range(params.min_price, params.max_price);
    if let Some(rating) = params.min_rating {
        query = query.with_min_rating(rating);
    }
    if let Some(reviews) = params.min_reviews {
        query = query.with_min_review_count(reviews);
    }
    if params.in_stock.unwrap_or(false) {
        query = query.in_stock_only();
    }
    if params.discounted.unwrap_or(false) {
        query = query.discounted_only();
    }
    if let Some(brand) = params.brand {
        query = query.with_brand(brand);
    }

    let sort = match params.sort.as_deref() {
        None => SortKey::default(),
        Some(value) => SortKey::parse(value).ok_or_else(|| {
            ApiError::from(DiscoveryError::invalid_input(format!("unknown sort key {value}")))
        })?,
    };
    let direction = match params.direction.as_deref() {
        None => SortDirection::default(),
        Some(value) => SortDirection::parse(value).ok_or_else(|| {
            ApiError::from(DiscoveryError::invalid_input(format!(
                "direction must be asc or desc, got {value}"
            )))
        })?,
    };
    query = query.with_sort(sort, direction);
    query = query.with_page(PageRequest::new(params.limit, params.offset));
    Ok(query)
}
