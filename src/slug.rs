//! Set name → search slug.

use crate::types::Slug;

/// Lower-cases, drops apostrophes and colons, then turns every whitespace run
/// into a single `-`. Leading/trailing whitespace is kept as a hyphen.
pub fn normalize(set_name: &str) -> Slug {
    let lowered = set_name.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut in_space = false;

    for c in lowered.chars().filter(|c| !matches!(c, '\'' | '\u{2019}' | ':')) {
        if c.is_whitespace() {
            if !in_space {
                out.push('-');
                in_space = true;
            }
        } else {
            out.push(c);
            in_space = false;
        }
    }

    Slug::new(out)
}
