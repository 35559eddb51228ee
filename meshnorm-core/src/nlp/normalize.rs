//! Term normalization for punctuation-tolerant lookups.
//!
//! Heading strings coming from publication records do not always match the
//! hierarchy file byte for byte: commas, hyphens, apostrophes and case vary
//! ("Alzheimer Disease" vs "alzheimer's disease"). The normalized key folds
//! those differences away so a fallback search can still find the entry.

/// Normalize a term for fallback lookup.
///
/// Lowercases, drops apostrophes, turns every other non-alphanumeric
/// character into a separator and collapses runs of separators into a
/// single space.
///
/// # Example
/// ```
/// use meshnorm_core::nlp::normalize::normalize_term;
///
/// assert_eq!(normalize_term("Leukemia, Myeloid, Acute"), "leukemia myeloid acute");
/// assert_eq!(normalize_term("Alzheimer's  Disease"), "alzheimers disease");
/// ```
#[inline]
pub fn normalize_term(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    let mut pending_space = false;

    for c in term.chars() {
        if c == '\'' || c == '\u{2019}' {
            continue;
        }
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(c.to_lowercase());
        } else {
            pending_space = true;
        }
    }

    out
}
