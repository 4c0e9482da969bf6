//! Picks the collector booster display product out of a search listing.
//!
//! The listing mixes every sealed product type for a set, and the storefront
//! also sells "Collector Booster Display Case" as its own bulk SKU. Only links
//! whose text names a display, and not a case, qualify.

use std::sync::LazyLock;

use scraper::{Html, Selector};

use crate::types::ProductId;

const PRODUCT_PATH: &str = "/product/";
const TARGET_PHRASE: &str = "collector booster display";
const EXCLUDED_WORD: &str = "case";

static PRODUCT_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="/product/"]"#).expect("valid product link selector"));

/// First qualifying identifier in document order, if any.
pub fn extract_product_id(markup: &str) -> Option<ProductId> {
    extract_product_ids(markup).into_iter().next()
}

/// Every qualifying identifier in document order. Repeats of an identifier
/// already seen are dropped.
pub fn extract_product_ids(markup: &str) -> Vec<ProductId> {
    let doc = Html::parse_document(markup);
    let mut ids: Vec<ProductId> = Vec::new();

    for link in doc.select(&PRODUCT_LINK) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };

        let text = link.text().collect::<String>().to_lowercase();
        if !is_collector_display(&text) {
            continue;
        }

        let Some(id) = product_id_from_href(href) else {
            continue;
        };
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    ids
}

fn is_collector_display(text: &str) -> bool {
    text.contains(TARGET_PHRASE) && !text.contains(EXCLUDED_WORD)
}

/// Digits between `/product/` and the next `/`.
/// `/product/619672/magic-foundations-collector-booster-display` → `619672`.
pub fn product_id_from_href(href: &str) -> Option<ProductId> {
    href.match_indices(PRODUCT_PATH).find_map(|(idx, _)| {
        let rest = &href[idx + PRODUCT_PATH.len()..];
        let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits_len > 0 && rest[digits_len..].starts_with('/') {
            Some(ProductId::new(&rest[..digits_len]))
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(cards: &str) -> String {
        format!(
            r#"<html><body><div class="search-results">{cards}</div></body></html>"#
        )
    }

    #[test]
    fn display_chosen_over_display_case() {
        let html = listing(
            r#"
            <a href="/product/619999/magic-foo-collector-booster-display-case">
                <span>Foo Collector Booster Display Case</span>
            </a>
            <a href="/product/619672/magic-foo-collector-booster-display">
                <span>Foo Collector Booster Display</span>
            </a>
            "#,
        );
        assert_eq!(extract_product_id(&html), Some(ProductId::new("619672")));
        assert_eq!(extract_product_ids(&html), vec![ProductId::new("619672")]);
    }

    #[test]
    fn no_qualifying_anchor_is_none() {
        let html = listing(
            r#"
            <a href="/product/500001/magic-foo-play-booster-display">Foo Play Booster Display</a>
            <a href="/product/500002/magic-foo-bundle">Foo Bundle</a>
            <a href="/help">Collector Booster Display</a>
            "#,
        );
        assert_eq!(extract_product_id(&html), None);
        assert_eq!(extract_product_id(""), None);
    }

    #[test]
    fn match_is_case_insensitive_and_spans_nested_text() {
        let html = listing(
            r#"<a href="/product/777/x"><div><b>FOUNDATIONS</b> <i>Collector Booster</i> DISPLAY</div></a>"#,
        );
        assert_eq!(extract_product_id(&html), Some(ProductId::new("777")));
    }

    #[test]
    fn first_match_wins_and_all_are_kept() {
        let html = listing(
            r#"
            <a href="/product/111/a">Collector Booster Display</a>
            <a href="/product/222/b">Collector Booster Display (Japanese)</a>
            <a href="/product/111/a?img=1">Collector Booster Display</a>
            "#,
        );
        assert_eq!(extract_product_id(&html), Some(ProductId::new("111")));
        assert_eq!(
            extract_product_ids(&html),
            vec![ProductId::new("111"), ProductId::new("222")]
        );
    }

    #[test]
    fn anchor_without_numeric_segment_is_skipped() {
        let html = listing(
            r#"
            <a href="/product/latest">Collector Booster Display</a>
            <a href="/product/123">Collector Booster Display</a>
            <a href="/product/456/ok">Collector Booster Display</a>
            "#,
        );
        assert_eq!(extract_product_id(&html), Some(ProductId::new("456")));
    }

    #[test]
    fn href_parsing() {
        assert_eq!(
            product_id_from_href("https://www.tcgplayer.com/product/619672/foo?x=1"),
            Some(ProductId::new("619672"))
        );
        assert_eq!(
            product_id_from_href("/product/abc/product/42/foo"),
            Some(ProductId::new("42"))
        );
        assert_eq!(product_id_from_href("/product/12a/foo"), None);
        assert_eq!(product_id_from_href("/product//foo"), None);
        assert_eq!(product_id_from_href("/products/1/foo"), None);
    }
}
