//! Edit distance and normalized similarity scoring.
//!
//! Both functions are pure and CPU-bound. The distance is O(n * m) in the
//! lengths of the two inputs and has no built-in cap: callers bound the cost
//! by bounding the size of the chunks they compare (the locator compares
//! chunks of exactly as many lines as the SEARCH block).
//!
//! The distance itself comes from [`strsim::levenshtein`].

/// Computes the Levenshtein edit distance between two strings.
///
/// Insertions, deletions and substitutions all cost 1. The distance is
/// measured over Unicode scalar values, so a multi-byte character counts as a
/// single edit.
///
/// # Example
///
/// ```
/// # use srpatch::levenshtein_distance;
/// assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
/// assert_eq!(levenshtein_distance("", "abc"), 3);
/// assert_eq!(levenshtein_distance("same", "same"), 0);
/// ```
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

/// Collapses every run of whitespace to a single space and trims both ends.
fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Scores how similar `original` is to `search`, from `0.0` to `1.0`.
///
/// Both strings are compared after collapsing whitespace runs to a single
/// space and trimming, so indentation and line-wrapping differences do not
/// count against a candidate. An empty `search` is always a perfect match.
///
/// # Example
///
/// ```
/// # use srpatch::similarity;
/// assert_eq!(similarity("  total = 0", "total = 0"), 1.0);
/// assert_eq!(similarity("anything", ""), 1.0);
/// assert_eq!(similarity("abcd", "abcX"), 0.75);
/// ```
pub fn similarity(original: &str, search: &str) -> f64 {
    if search.is_empty() {
        return 1.0;
    }

    let normalized_original = normalize_whitespace(original);
    let normalized_search = normalize_whitespace(search);

    // Also covers the case where both normalize to the empty string.
    if normalized_original == normalized_search {
        return 1.0;
    }

    let distance = levenshtein_distance(&normalized_original, &normalized_search);
    let max_len = normalized_original
        .chars()
        .count()
        .max(normalized_search.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (distance as f64 / max_len as f64)
}
