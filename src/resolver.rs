use std::sync::Arc;

use tracing::{info, warn};

use crate::extractor::{extract_product_id, extract_product_ids};
use crate::health::HealthState;
use crate::listing::ListingFetcher;
use crate::price_history::PriceHistorySource;
use crate::slug::normalize;
use crate::types::{PriceHistoryDocument, PriceHistoryLookup, ProductId, ResolutionResult, TimeRange};

/// Set name → product id → price history. Every failure on the way is
/// absorbed into an empty field plus a log line.
pub struct Resolver {
    listing: Arc<dyn ListingFetcher>,
    prices: Arc<dyn PriceHistorySource>,
    health: Arc<HealthState>,
}

impl Resolver {
    pub fn new(
        listing: Arc<dyn ListingFetcher>,
        prices: Arc<dyn PriceHistorySource>,
        health: Arc<HealthState>,
    ) -> Self {
        Self {
            listing,
            prices,
            health,
        }
    }

    pub fn health(&self) -> &HealthState {
        &self.health
    }

    pub async fn resolve_set(&self, set_name: &str) -> ResolutionResult {
        self.health.inc_resolutions();
        let slug = normalize(set_name);

        let markup = match self.listing.fetch_listing_markup(&slug).await {
            Ok(m) => m,
            Err(e) => {
                warn!("Scraping failed for set {set_name:?}: {e}");
                self.health.inc_not_found();
                return ResolutionResult::not_found(set_name);
            }
        };

        let Some(product_id) = extract_product_id(&markup) else {
            info!("No collector booster display found for {set_name:?}");
            self.health.inc_not_found();
            return ResolutionResult::not_found(set_name);
        };
        let candidates = extract_product_ids(&markup);
        if candidates.len() > 1 {
            info!(
                "{} collector booster displays for {set_name:?}, using the first: {candidates:?}",
                candidates.len()
            );
        }
        info!("Product ID for {set_name}: {product_id}");
        self.health.inc_resolved();

        let price_history = self.fetch(&product_id, TimeRange::default()).await;

        ResolutionResult {
            set_name: set_name.to_string(),
            product_id: Some(product_id),
            candidates,
            price_history,
        }
    }

    /// `range` is coerced to a known code first; the lookup reports the code
    /// that was actually used.
    pub async fn get_price_history(
        &self,
        product_id: ProductId,
        range: Option<&str>,
    ) -> PriceHistoryLookup {
        let range = TimeRange::coerce(range);
        let price_history = self.fetch(&product_id, range).await;
        PriceHistoryLookup {
            product_id,
            range,
            price_history,
        }
    }

    async fn fetch(&self, product_id: &ProductId, range: TimeRange) -> Option<PriceHistoryDocument> {
        let doc = self.prices.fetch_price_history(product_id, range).await;
        if doc.is_none() {
            self.health.inc_price_history_failures();
        }
        doc
    }
}
