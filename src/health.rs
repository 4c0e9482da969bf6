//! Resolution counters. Updated by the Resolver, served on `/health`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Default)]
pub struct HealthState {
    /// resolveSet calls started.
    pub resolutions: AtomicU64,
    /// Resolutions that produced a product id.
    pub resolved: AtomicU64,
    /// Resolutions that ended without a product id (miss or navigation failure).
    pub not_found: AtomicU64,
    /// Price-history lookups that came back empty.
    pub price_history_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub resolutions: u64,
    pub resolved: u64,
    pub not_found: u64,
    pub price_history_failures: u64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_resolutions(&self) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_resolved(&self) {
        self.resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_price_history_failures(&self) {
        self.price_history_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            resolutions: self.resolutions.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            price_history_failures: self.price_history_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_serializes_camel_case() {
        let state = HealthState::new();
        state.inc_resolutions();
        state.inc_not_found();
        state.inc_price_history_failures();
        assert_eq!(
            serde_json::to_value(state.snapshot()).unwrap(),
            json!({"resolutions": 1, "resolved": 0, "notFound": 1, "priceHistoryFailures": 1})
        );
    }
}
