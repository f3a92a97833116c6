use regex::Regex;

use crate::keywords::KeywordSet;
use crate::normalize::ContentRecord;

/// Per-keyword scoring weights. A keyword found in the searchable text
/// starts at `base`, gains `whole_word_bonus` when it matches on word
/// boundaries, `title_bonus` when it also appears in the title, and
/// `frequency_step` per occurrence up to `frequency_cap`. The sum is capped
/// at `keyword_cap`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub base: f64,
    pub whole_word_bonus: f64,
    pub title_bonus: f64,
    pub frequency_step: f64,
    pub frequency_cap: f64,
    pub keyword_cap: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            base: 0.5,
            whole_word_bonus: 0.3,
            title_bonus: 0.2,
            frequency_step: 0.1,
            frequency_cap: 0.5,
            keyword_cap: 1.0,
        }
    }
}

struct CompiledKeyword {
    text: String,
    /// `None` only if the escaped pattern failed to compile; such a keyword
    /// never earns the whole-word bonus.
    whole_word: Option<Regex>,
}

/// Scores content records against one query's keywords.
pub struct RelevanceScorer {
    keywords: Vec<CompiledKeyword>,
    weights: ScoringWeights,
}

impl RelevanceScorer {
    pub fn new(keywords: &KeywordSet, weights: ScoringWeights) -> Self {
        let keywords = keywords
            .iter()
            .map(|kw| CompiledKeyword {
                text: kw.to_string(),
                whole_word: Regex::new(&format!(r"\b{}\b", regex::escape(kw))).ok(),
            })
            .collect();
        Self { keywords, weights }
    }

    /// Relevance in `[0, 1]`: the mean per-keyword contribution. With no
    /// keywords every record is maximally relevant.
    pub fn score(&self, record: &ContentRecord) -> f64 {
        if self.keywords.is_empty() {
            return 1.0;
        }
        let title = record.title.as_deref().unwrap_or_default().to_lowercase();
        let searchable = format!(
            "{} {} {}",
            record.content,
            title,
            record.source_name.as_deref().unwrap_or_default()
        )
        .to_lowercase();

        let total: f64 = self
            .keywords
            .iter()
            .map(|kw| self.keyword_score(kw, &searchable, &title))
            .sum();
        (total / self.keywords.len() as f64).clamp(0.0, 1.0)
    }

    fn keyword_score(&self, kw: &CompiledKeyword, searchable: &str, title: &str) -> f64 {
        let occurrences = searchable.matches(kw.text.as_str()).count();
        if occurrences == 0 {
            return 0.0;
        }
        let w = &self.weights;
        let mut score = w.base;
        if kw.whole_word.as_ref().is_some_and(|re| re.is_match(searchable)) {
            score += w.whole_word_bonus;
        }
        if title.contains(kw.text.as_str()) {
            score += w.title_bonus;
        }
        score += (occurrences as f64 * w.frequency_step).min(w.frequency_cap);
        score.min(w.keyword_cap)
    }
}
