//! String handling for vocabulary terms.
//!
//! | Algorithm | Complexity | Used by |
//! |-----------|------------|---------|
//! | [Levenshtein](levenshtein) | O(m×n) | Synonym ranking in the concept table |
//! | [Normalize](normalize) | O(n) | Fallback hierarchy search |
//!
//! # Example
//!
//! ```
//! use meshnorm_core::nlp::{levenshtein_distance, normalize_term};
//!
//! assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
//! assert_eq!(normalize_term("Breast Neoplasms"), "breast neoplasms");
//! ```

pub mod levenshtein;
pub mod normalize;

pub use levenshtein::levenshtein_distance;
pub use normalize::normalize_term;
