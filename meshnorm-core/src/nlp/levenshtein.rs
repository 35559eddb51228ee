//! Levenshtein Distance (Edit Distance)
//!
//! Used to rank alternate-vocabulary synonyms of a concept against its
//! preferred name. Lower scores mean closer candidates.
//!
//! # Time Complexity
//! O(m × n) where m, n are character counts
//!
//! # Space Complexity
//! O(min(m, n)) with a rolling row
//!
//! # Operations
//! - Insert: cost = 1
//! - Delete: cost = 1
//! - Substitute: cost = 1
//!
//! Comparison is case-sensitive and operates on Unicode scalar values with
//! no normalization, so `"Tumor"` and `"tumor"` are one edit apart.

/// Compute Levenshtein edit distance between two strings.
///
/// # Algorithm
/// Wagner-Fischer dynamic programming, keeping only two rows sized by
/// the shorter input.
///
/// # Example
/// ```
/// use meshnorm_core::nlp::levenshtein::levenshtein_distance;
///
/// assert_eq!(levenshtein_distance("Tumor", "Tumour"), 1);
/// assert_eq!(levenshtein_distance("", "abc"), 3);
/// ```
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    // Rows are sized by the shorter sequence
    let (short, long) = if a_chars.len() <= b_chars.len() {
        (&a_chars, &b_chars)
    } else {
        (&b_chars, &a_chars)
    };
    let m = short.len();

    if m == 0 {
        return long.len();
    }

    let mut prev: Vec<usize> = (0..=m).collect();
    let mut curr: Vec<usize> = vec![0; m + 1];

    for (j, lc) in long.iter().enumerate() {
        curr[0] = j + 1;

        for i in 1..=m {
            let cost = usize::from(short[i - 1] != *lc);

            curr[i] = (prev[i] + 1) // deletion
                .min(curr[i - 1] + 1) // insertion
                .min(prev[i - 1] + cost); // substitution
        }

        std::mem::swap(&mut prev, &mut curr);
    }

    prev[m]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_distance() {
        // Empty strings
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", ""), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);

        // Identical strings
        assert_eq!(levenshtein_distance("Neoplasms", "Neoplasms"), 0);

        // Single operations
        assert_eq!(levenshtein_distance("Tumor", "Tumour"), 1); // insertion
        assert_eq!(levenshtein_distance("Tumour", "Tumor"), 1); // deletion
        assert_eq!(levenshtein_distance("cat", "hat"), 1); // substitution

        // Classic examples
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("saturday", "sunday"), 3);
    }

    #[test]
    fn test_case_sensitive() {
        assert_eq!(levenshtein_distance("Leukemia", "leukemia"), 1);
        assert_eq!(levenshtein_distance("AML", "aml"), 3);
    }

    #[test]
    fn test_multibyte_counts_characters() {
        assert_eq!(levenshtein_distance("Sjögren", "Sjogren"), 1);
        assert_eq!(levenshtein_distance("β-Thalassemia", "beta-Thalassemia"), 4);
    }

    #[test]
    fn test_metric_properties() {
        let terms = [
            "",
            "Leukemia",
            "Leukaemia",
            "Leukemia, Myeloid, Acute",
            "Acute myeloid leukemia",
            "AML",
        ];
        for a in terms {
            assert_eq!(levenshtein_distance(a, a), 0);
            for b in terms {
                let ab = levenshtein_distance(a, b);
                assert_eq!(ab, levenshtein_distance(b, a), "symmetry {a:?} {b:?}");
                if a != b {
                    assert!(ab > 0, "distinct strings {a:?} {b:?} scored zero");
                }
                for c in terms {
                    let ac = levenshtein_distance(a, c);
                    let cb = levenshtein_distance(c, b);
                    assert!(ab <= ac + cb, "triangle {a:?} {b:?} via {c:?}");
                }
            }
        }
    }
}
