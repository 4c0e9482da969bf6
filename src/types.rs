use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// URL-safe rendering of a set name. Only `slug::normalize` builds one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Slug(String);

impl Slug {
    pub(crate) fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Slug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Marketplace product identifier. Transported as text, never parsed as a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Time range
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeRange {
    Month,
    #[default]
    Quarter,
    SemiAnnual,
    Annual,
}

impl TimeRange {
    pub const ALL: [TimeRange; 4] = [
        TimeRange::Month,
        TimeRange::Quarter,
        TimeRange::SemiAnnual,
        TimeRange::Annual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TimeRange::Month => "month",
            TimeRange::Quarter => "quarter",
            TimeRange::SemiAnnual => "semi-annual",
            TimeRange::Annual => "annual",
        }
    }

    /// Exact match against the range codes; `None` for anything else.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == raw)
    }

    /// Unknown or missing codes become `Quarter`.
    pub fn coerce(raw: Option<&str>) -> Self {
        raw.and_then(Self::parse).unwrap_or_default()
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Upstream price-history payload, passed through untouched.
pub type PriceHistoryDocument = serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionResult {
    pub set_name: String,
    pub product_id: Option<ProductId>,
    /// Every qualifying identifier on the listing, in document order.
    /// `product_id` is the first of these.
    pub candidates: Vec<ProductId>,
    /// Only ever `Some` when `product_id` is.
    pub price_history: Option<PriceHistoryDocument>,
}

impl ResolutionResult {
    pub fn not_found(set_name: &str) -> Self {
        Self {
            set_name: set_name.to_string(),
            product_id: None,
            candidates: Vec::new(),
            price_history: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceHistoryLookup {
    pub product_id: ProductId,
    /// The range actually sent upstream, after coercion.
    pub range: TimeRange,
    pub price_history: Option<PriceHistoryDocument>,
}
