//! Two-pass duplicate removal over raw fetched items.
//!
//! 1. Exact: first item per stable identifier wins.
//! 2. Fuzzy: word-set Jaccard similarity of a truncated text signature
//!    against every item accepted so far. Similarity at or above the
//!    threshold marks a near-duplicate.
//!
//! Both passes preserve first-occurrence order.

use std::collections::HashSet;

use search_client::RawItem;
use tracing::debug;

use crate::normalize::{collapse_whitespace, stable_id, text_parts};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupConfig {
    /// Signature prefix length in characters.
    pub signature_len: usize,
    /// Signatures shorter than this are never judged; the item is kept.
    pub min_signature_len: usize,
    /// Inclusive Jaccard threshold for near-duplicates.
    pub similarity_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            signature_len: 150,
            min_signature_len: 20,
            similarity_threshold: 0.85,
        }
    }
}

/// Case-folded, whitespace-collapsed text prefix of an item. Only lives for
/// the duration of a dedup pass.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ContentSignature(String);

impl ContentSignature {
    /// Title, body, description, then card text, in that order.
    pub(crate) fn of(item: &RawItem, len: usize) -> Self {
        let parts = text_parts(item);
        let joined = parts
            .title
            .iter()
            .chain(parts.body.iter())
            .chain(parts.description.iter())
            .chain(parts.cards.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        let folded = collapse_whitespace(&joined).to_lowercase();
        Self(folded.chars().take(len).collect())
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }

    fn char_len(&self) -> usize {
        self.0.chars().count()
    }
}

/// Word-set Jaccard similarity. Identical strings score 1, an empty side 0.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let a_tokens: HashSet<&str> = a.split_whitespace().collect();
    let b_tokens: HashSet<&str> = b.split_whitespace().collect();
    similarity_of_sets(&a_tokens, &b_tokens)
}

fn similarity_of_sets(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Remove exact and near duplicates, keeping the first occurrence of each.
pub fn dedupe(items: Vec<RawItem>, config: &DedupConfig) -> Vec<RawItem> {
    let fetched = items.len();

    let mut seen_ids = HashSet::new();
    let unique: Vec<RawItem> = items
        .into_iter()
        .filter(|item| seen_ids.insert(stable_id(item)))
        .collect();
    let exact_removed = fetched - unique.len();

    let signatures: Vec<ContentSignature> = unique
        .iter()
        .map(|item| ContentSignature::of(item, config.signature_len))
        .collect();

    // Indices into `signatures` of accepted, judgeable items.
    let mut accepted_sigs: Vec<(usize, HashSet<&str>)> = Vec::new();
    let mut keep = vec![true; unique.len()];

    for (idx, sig) in signatures.iter().enumerate() {
        if sig.char_len() < config.min_signature_len {
            continue;
        }
        let tokens: HashSet<&str> = sig.as_str().split_whitespace().collect();
        let duplicate = accepted_sigs.iter().any(|(prev, prev_tokens)| {
            let similarity = if signatures[*prev] == *sig {
                1.0
            } else {
                similarity_of_sets(&tokens, prev_tokens)
            };
            similarity >= config.similarity_threshold
        });
        if duplicate {
            keep[idx] = false;
        } else {
            accepted_sigs.push((idx, tokens));
        }
    }

    let result: Vec<RawItem> = unique
        .into_iter()
        .zip(keep)
        .filter_map(|(item, kept)| kept.then_some(item))
        .collect();

    debug!(
        fetched,
        exact_removed,
        fuzzy_removed = fetched - exact_removed - result.len(),
        kept = result.len(),
        "Deduplicated items"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(id: &str, text: &str) -> RawItem {
        RawItem::Unknown(json!({"id": id, "text": text}))
    }

    fn ids(items: &[RawItem]) -> Vec<String> {
        items.iter().map(stable_id).collect()
    }

    /// `shared` common tokens, then `only` tokens unique to this side.
    fn tokens(shared: usize, only: usize, tag: &str) -> String {
        (0..shared)
            .map(|i| format!("tok{i:02}"))
            .chain((0..only).map(|i| format!("{tag}{i:02}")))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn jaccard_edge_cases() {
        assert_eq!(jaccard_similarity("", "anything"), 0.0);
        assert_eq!(jaccard_similarity("same words", "same words"), 1.0);
        assert_eq!(jaccard_similarity("a b", "b c"), 1.0 / 3.0);
    }

    #[test]
    fn exact_duplicates_keep_first() {
        let items = vec![
            item("1", "first version of the wireless earbuds ad"),
            item("2", "completely different content about headphones"),
            item("1", "second version with the same identifier"),
        ];
        let out = dedupe(items, &DedupConfig::default());
        assert_eq!(ids(&out), vec!["1", "2"]);
        let RawItem::Unknown(v) = &out[0] else {
            panic!("expected unknown item");
        };
        assert_eq!(v["text"], "first version of the wireless earbuds ad");
    }

    #[test]
    fn threshold_is_inclusive() {
        // 17 shared of 20 total tokens = 0.85
        let a = tokens(17, 1, "aa");
        let b = tokens(17, 2, "bb");
        assert_eq!(jaccard_similarity(&a, &b), 0.85);

        let out = dedupe(vec![item("a", &a), item("b", &b)], &DedupConfig::default());
        assert_eq!(ids(&out), vec!["a"]);
    }

    #[test]
    fn one_token_below_threshold_keeps_both() {
        // 16 shared of 20 total tokens = 0.8
        let a = tokens(16, 2, "aa");
        let b = tokens(16, 2, "bb");
        assert!(jaccard_similarity(&a, &b) < 0.85);

        let out = dedupe(vec![item("a", &a), item("b", &b)], &DedupConfig::default());
        assert_eq!(ids(&out), vec!["a", "b"]);
    }

    #[test]
    fn short_signatures_are_always_kept() {
        let items = vec![item("1", "Buy now"), item("2", "Buy now"), item("3", "")];
        let out = dedupe(items, &DedupConfig::default());
        assert_eq!(ids(&out), vec!["1", "2", "3"]);
    }

    #[test]
    fn case_and_whitespace_do_not_matter() {
        let items = vec![
            item("1", "Wireless Earbuds with   forty hour battery life"),
            item("2", "wireless earbuds with forty hour battery LIFE"),
        ];
        let out = dedupe(items, &DedupConfig::default());
        assert_eq!(ids(&out), vec!["1"]);
    }

    #[test]
    fn dedupe_is_idempotent() {
        let items = vec![
            item("1", &tokens(18, 1, "aa")),
            item("2", &tokens(18, 1, "bb")),
            item("3", "an entirely separate advertisement for a phone case"),
            item("1", "dup id"),
            item("4", &tokens(5, 12, "cc")),
        ];
        let config = DedupConfig::default();
        let once = dedupe(items, &config);
        let once_ids = ids(&once);
        let twice = dedupe(once, &config);
        assert_eq!(ids(&twice), once_ids);
    }
}
