//! Pure resolution primitives: normalisation, Jaro-Winkler, token overlap.
//!
//! No I/O, no state — ported directly from the source's pure-function
//! resolution helpers so they can be unit tested without a database.

/// Minimum fraction of the shorter token set that must overlap for the
/// token-overlap guard to pass a fuzzy match.
pub const MIN_TOKEN_OVERLAP_RATIO: f64 = 0.5;
/// Minimum absolute number of overlapping tokens for the guard to pass.
pub const MIN_TOKEN_OVERLAP_COUNT: usize = 2;

/// Lowercase, trim, replace `_`/`-` with space, collapse doubled spaces,
/// strip a leading `@`.
pub fn normalize_entity_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let trimmed = lowered.trim();
    let replaced = trimmed.replace('_', " ").replace('-', " ");
    let collapsed = replaced.replace("  ", " ");
    collapsed.trim_start_matches('@').to_string()
}

/// Strip `[[target|display]]` wikilink wrappers (keeping `target`), keep
/// only the last `/`-delimited segment, lowercase and trim.
pub fn normalize_alias(alias: &str) -> String {
    let unwrapped = strip_wikilink(alias);
    let segment = unwrapped.rsplit('/').next().unwrap_or(&unwrapped);
    segment.to_lowercase().trim().to_string()
}

fn strip_wikilink(alias: &str) -> String {
    let trimmed = alias.trim();
    if let Some(inner) = trimmed.strip_prefix("[[").and_then(|s| s.strip_suffix("]]")) {
        inner.split('|').next().unwrap_or(inner).to_string()
    } else {
        trimmed.to_string()
    }
}

/// Standard Jaro-Winkler similarity (prefix scaling 0.1, prefix length cap
/// 4), delegated to `strsim` rather than hand-rolled.
pub fn jaro_winkler_similarity(s1: &str, s2: &str) -> f64 {
    strsim::jaro_winkler(s1, s2)
}

/// `(overlap_ratio, overlap_count)` between the whitespace-token sets of
/// two (already-lowercased) strings.
pub fn compute_token_overlap(text1: &str, text2: &str) -> (f64, usize) {
    use std::collections::HashSet;
    let lower1 = text1.to_lowercase();
    let lower2 = text2.to_lowercase();
    let tokens1: HashSet<&str> = lower1.split_whitespace().collect();
    let tokens2: HashSet<&str> = lower2.split_whitespace().collect();
    let overlap_count = tokens1.intersection(&tokens2).count();
    let shorter_len = tokens1.len().min(tokens2.len());
    if shorter_len == 0 {
        return (0.0, 0);
    }
    (overlap_count as f64 / shorter_len as f64, overlap_count)
}

/// Whether `entity_type` requires the token-overlap guard before accepting
/// a fuzzy match, and the thresholds it applies.
pub struct TokenOverlapPolicy {
    pub require_token_overlap: bool,
}

/// Apply the token-overlap guard: single-token queries on either side
/// always pass; otherwise both the ratio and count minimums must hold.
pub fn passes_token_overlap_check(text1: &str, text2: &str, policy: &TokenOverlapPolicy) -> bool {
    if !policy.require_token_overlap {
        return true;
    }
    let tokens1 = text1.to_lowercase();
    let tokens2 = text2.to_lowercase();
    let n1 = tokens1.split_whitespace().count();
    let n2 = tokens2.split_whitespace().count();
    if n1 == 1 || n2 == 1 {
        return true;
    }
    let (ratio, count) = compute_token_overlap(text1, text2);
    if ratio < MIN_TOKEN_OVERLAP_RATIO {
        return false;
    }
    if count < MIN_TOKEN_OVERLAP_COUNT {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_underscores_dashes_and_leading_at() {
        assert_eq!(normalize_entity_text("  @Salish_Sea-Region  "), "salish sea region");
    }

    #[test]
    fn alias_strips_wikilink_and_keeps_last_segment() {
        assert_eq!(normalize_alias("[[People/Jane Doe|Jane]]"), "jane doe");
        assert_eq!(normalize_alias("People/Jane Doe"), "jane doe");
    }

    #[test]
    fn jaro_winkler_identical_strings_is_one() {
        assert_eq!(jaro_winkler_similarity("same", "same"), 1.0);
    }

    #[test]
    fn jaro_winkler_disjoint_strings_is_zero() {
        assert_eq!(jaro_winkler_similarity("abc", "xyz"), 0.0);
    }

    #[test]
    fn jaro_winkler_known_pair() {
        let score = jaro_winkler_similarity("martha", "marhta");
        assert!((score - 0.9611).abs() < 0.001);
    }

    #[test]
    fn token_overlap_guard_always_passes_single_token() {
        let policy = TokenOverlapPolicy { require_token_overlap: true };
        assert!(passes_token_overlap_check("salish", "salishsea", &policy));
    }

    #[test]
    fn token_overlap_guard_rejects_one_shared_word_of_two() {
        // "jane doe" vs "jane smith": 1 shared token, below MIN_TOKEN_OVERLAP_COUNT=2.
        let policy = TokenOverlapPolicy { require_token_overlap: true };
        assert!(!passes_token_overlap_check("jane doe", "jane smith", &policy));
    }

    #[test]
    fn token_overlap_guard_disabled_always_passes() {
        let policy = TokenOverlapPolicy { require_token_overlap: false };
        assert!(passes_token_overlap_check("jane doe", "jane smith", &policy));
    }
}
