use std::collections::HashSet;

/// Tokens shorter than this are dropped; the phrase entry is exempt.
const MIN_KEYWORD_LEN: usize = 3;

const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "best", "but", "by", "can", "do", "for", "from", "get", "has", "have", "how", "i", "if", "in",
    "into", "is", "it", "its", "just", "me", "more", "my", "new", "no", "not", "now", "of", "on",
    "or", "our", "out", "so", "some", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "to", "up", "us", "was", "we", "what", "when", "where", "which",
    "who", "why", "will", "with", "you", "your",
];

/// Keywords derived from query text: significant words in first-seen order,
/// followed by the whole cleaned query as a phrase when it adds anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordSet {
    keywords: Vec<String>,
}

impl KeywordSet {
    pub fn from_query(text: &str) -> Self {
        let cleaned = clean(text);
        let stop: HashSet<&str> = STOP_WORDS.iter().copied().collect();

        let mut seen = HashSet::new();
        let mut keywords: Vec<String> = cleaned
            .split_whitespace()
            .filter(|t| t.chars().count() >= MIN_KEYWORD_LEN && !stop.contains(t))
            .filter(|t| seen.insert(t.to_string()))
            .map(str::to_string)
            .collect();

        // A stop-word-only query keeps its phrase; an empty one yields nothing.
        if !cleaned.is_empty() && !keywords.iter().any(|k| *k == cleaned) {
            keywords.push(cleaned);
        }
        Self { keywords }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keywords.iter().map(String::as_str)
    }
}

/// Lower-case, turn punctuation into spaces, collapse whitespace.
fn clean(text: &str) -> String {
    let lowered: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(set: &KeywordSet) -> Vec<&str> {
        set.iter().collect()
    }

    #[test]
    fn drops_stop_words_and_short_tokens_and_adds_phrase() {
        let set = KeywordSet::from_query("The best Wireless earbuds for TV!");
        assert_eq!(
            words(&set),
            vec!["wireless", "earbuds", "the best wireless earbuds for tv"]
        );
    }

    #[test]
    fn single_word_phrase_is_not_duplicated() {
        let set = KeywordSet::from_query("Earbuds");
        assert_eq!(words(&set), vec!["earbuds"]);
    }

    #[test]
    fn duplicates_removed() {
        let set = KeywordSet::from_query("earbuds earbuds case");
        assert_eq!(words(&set), vec!["earbuds", "case", "earbuds earbuds case"]);
    }

    #[test]
    fn stop_word_query_keeps_phrase_only() {
        let set = KeywordSet::from_query("to be");
        assert_eq!(words(&set), vec!["to be"]);
    }

    #[test]
    fn punctuation_only_query_is_empty() {
        assert!(KeywordSet::from_query("?! ...").is_empty());
        assert!(KeywordSet::from_query("").is_empty());
    }
}
