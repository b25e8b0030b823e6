//! TF-IDF term weighting over a batch of messages

use std::collections::{BTreeMap, HashMap};

/// Common English words ignored when building the vocabulary
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "almost", "also", "am", "an",
    "and", "any", "are", "as", "at", "be", "because", "been", "before", "being", "below",
    "between", "both", "but", "by", "can", "cannot", "could", "did", "do", "does", "doing",
    "done", "down", "during", "each", "either", "else", "enough", "etc", "even", "ever",
    "every", "few", "for", "from", "further", "get", "had", "has", "have", "having", "he",
    "her", "here", "hers", "herself", "him", "himself", "his", "how", "however", "i", "ie",
    "if", "in", "into", "is", "it", "its", "itself", "just", "least", "less", "like", "made",
    "many", "may", "me", "might", "mine", "more", "most", "much", "must", "my", "myself",
    "neither", "never", "no", "nor", "not", "nothing", "now", "of", "off", "often", "on",
    "once", "one", "only", "or", "other", "others", "otherwise", "our", "ours", "ourselves",
    "out", "over", "own", "per", "perhaps", "please", "put", "rather", "re", "same", "see",
    "seem", "seemed", "seems", "several", "she", "should", "since", "so", "some", "something",
    "sometime", "still", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "though", "through",
    "thus", "to", "together", "too", "toward", "towards", "under", "until", "up", "upon",
    "us", "very", "via", "was", "we", "well", "were", "what", "whatever", "when", "where",
    "whether", "which", "while", "who", "whole", "whom", "whose", "why", "will", "with",
    "within", "without", "would", "yet", "you", "your", "yours", "yourself", "yourselves",
];

/// Document-term matrix with L2-normalised rows
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TermMatrix {
    vocabulary: Vec<String>,
    rows: Vec<Vec<f32>>,
}

impl TermMatrix {
    /// Terms, in column order
    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// Weighted rows, one per document
    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    /// Number of documents
    pub fn n_documents(&self) -> usize {
        self.rows.len()
    }

    /// Number of terms
    pub fn n_terms(&self) -> usize {
        self.vocabulary.len()
    }

    /// Whether no term survived tokenization and filtering
    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }

    /// Highest-weighted terms of a weight vector over this vocabulary
    pub fn top_terms(&self, weights: &[f32], n: usize) -> Vec<String> {
        let mut ranked: Vec<(usize, f32)> = weights
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, w)| *w > 0.0)
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked
            .into_iter()
            .take(n)
            .filter_map(|(i, _)| self.vocabulary.get(i).cloned())
            .collect()
    }
}

/// TF-IDF vectorizer
///
/// Tokens are lowercase alphanumeric runs of at least two characters. The
/// vocabulary keeps the `max_features` most frequent non-stop-word terms.
/// Weights use raw counts times the smoothed idf `ln((1 + n) / (1 + df)) + 1`.
#[derive(Debug, Clone)]
pub struct TfIdfVectorizer {
    max_features: usize,
}

impl Default for TfIdfVectorizer {
    fn default() -> Self {
        Self { max_features: 1000 }
    }
}

impl TfIdfVectorizer {
    /// Vectorizer keeping at most `max_features` terms
    pub fn new(max_features: usize) -> Self {
        Self { max_features }
    }

    /// Split text into vocabulary candidates
    pub fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() >= 2)
            .map(str::to_lowercase)
            .filter(|t| !STOP_WORDS.contains(&t.as_str()))
            .collect()
    }

    /// Fit on `documents` and return their weighted rows
    pub fn fit_transform<S: AsRef<str>>(&self, documents: &[S]) -> TermMatrix {
        let tokenized: Vec<Vec<String>> = documents
            .iter()
            .map(|d| Self::tokenize(d.as_ref()))
            .collect();

        // Corpus-wide counts decide which terms are kept
        let mut corpus_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for tokens in &tokenized {
            for token in tokens {
                *corpus_counts.entry(token.as_str()).or_default() += 1;
            }
        }
        let mut by_frequency: Vec<(&str, usize)> = corpus_counts.into_iter().collect();
        by_frequency.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        by_frequency.truncate(self.max_features);

        let mut vocabulary: Vec<String> = by_frequency.into_iter().map(|(t, _)| t.to_string()).collect();
        vocabulary.sort();
        let column: HashMap<&str, usize> = vocabulary
            .iter()
            .enumerate()
            .map(|(i, t)| (t.as_str(), i))
            .collect();

        let mut counts = vec![vec![0.0f32; vocabulary.len()]; tokenized.len()];
        let mut document_frequency = vec![0usize; vocabulary.len()];
        for (row, tokens) in counts.iter_mut().zip(&tokenized) {
            for token in tokens {
                if let Some(&col) = column.get(token.as_str()) {
                    if row[col] == 0.0 {
                        document_frequency[col] += 1;
                    }
                    row[col] += 1.0;
                }
            }
        }

        let n = tokenized.len() as f32;
        let idf: Vec<f32> = document_frequency
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f32)).ln() + 1.0)
            .collect();

        for row in counts.iter_mut() {
            for (weight, factor) in row.iter_mut().zip(&idf) {
                *weight *= factor;
            }
            let norm = row.iter().map(|w| w * w).sum::<f32>().sqrt();
            if norm > 0.0 {
                row.iter_mut().for_each(|w| *w /= norm);
            }
        }

        TermMatrix {
            vocabulary,
            rows: counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_stop_words_and_short_tokens() {
        let tokens = TfIdfVectorizer::tokenize("I want a REFUND for my order #42, please!");
        assert_eq!(tokens, vec!["want", "refund", "order", "42"]);
    }

    #[test]
    fn test_rows_are_normalised() {
        let matrix = TfIdfVectorizer::default().fit_transform(&[
            "refund order refund",
            "weather forecast today",
        ]);

        assert_eq!(matrix.n_documents(), 2);
        for row in matrix.rows() {
            let norm: f32 = row.iter().map(|w| w * w).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
        assert_eq!(matrix.top_terms(&matrix.rows()[0], 1), vec!["refund"]);
    }

    #[test]
    fn test_max_features_keeps_most_frequent() {
        let matrix = TfIdfVectorizer::new(2).fit_transform(&["apple apple banana", "apple cherry cherry"]);
        assert_eq!(matrix.vocabulary(), &["apple".to_string(), "cherry".to_string()]);
    }

    #[test]
    fn test_stop_words_only_gives_empty_vocabulary() {
        let matrix = TfIdfVectorizer::default().fit_transform(&["it is what it is", "the and of"]);
        assert!(matrix.is_empty());
        assert_eq!(matrix.n_documents(), 2);
    }
}
