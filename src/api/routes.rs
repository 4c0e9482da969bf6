use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::health::HealthSnapshot;
use crate::resolver::Resolver;
use crate::types::{PriceHistoryDocument, ProductId, TimeRange};

#[derive(Clone)]
pub struct ApiState {
    pub resolver: Arc<Resolver>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(get_health))
        .route("/search/:set_name", get(search_set))
        .route("/price-history/:product_id", get(get_price_history))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct PriceHistoryQuery {
    pub range: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub set_name: String,
    pub product_id: ProductId,
    pub collector_booster_ids: Vec<ProductId>,
    pub price_history: Option<PriceHistoryDocument>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundResponse {
    pub error: String,
    pub set_name: String,
    pub product_id: Option<ProductId>,
    pub price_history: Option<PriceHistoryDocument>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceHistoryResponse {
    pub product_id: ProductId,
    pub range: TimeRange,
    pub price_history: Option<PriceHistoryDocument>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn root() -> &'static str {
    "hello world"
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthSnapshot> {
    Json(state.resolver.health().snapshot())
}

async fn search_set(State(state): State<ApiState>, Path(set_name): Path<String>) -> Response {
    info!("Searching for the collector booster display product ID of set: {set_name}");

    let result = state.resolver.resolve_set(&set_name).await;
    match result.product_id {
        Some(product_id) => Json(SearchResponse {
            set_name: result.set_name,
            product_id,
            collector_booster_ids: result.candidates,
            price_history: result.price_history,
        })
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(NotFoundResponse {
                error: format!("No collector booster display found for set: {set_name}"),
                set_name: result.set_name,
                product_id: None,
                price_history: None,
            }),
        )
            .into_response(),
    }
}

async fn get_price_history(
    State(state): State<ApiState>,
    Path(product_id): Path<String>,
    Query(params): Query<PriceHistoryQuery>,
) -> Json<PriceHistoryResponse> {
    let lookup = state
        .resolver
        .get_price_history(ProductId::new(product_id), params.range.as_deref())
        .await;
    Json(PriceHistoryResponse {
        product_id: lookup.product_id,
        range: lookup.range,
        price_history: lookup.price_history,
    })
}
