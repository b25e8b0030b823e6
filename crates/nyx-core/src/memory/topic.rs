//! Topic inference capability and a built-in centroid model

use super::tfidf::TermMatrix;
use super::vector::cosine_similarity;
use crate::error::{NyxError, NyxResult};
use async_trait::async_trait;

/// Per-document topic weights plus per-topic keywords
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TopicAssignment {
    /// One distribution per document, `n_topics` wide
    pub distributions: Vec<Vec<f32>>,

    /// Keywords per topic, most representative first
    pub keywords: Vec<Vec<String>>,
}

impl TopicAssignment {
    /// Winning topic and its weight for a document
    pub fn dominant(&self, document: usize) -> Option<(usize, f32)> {
        self.distributions.get(document)?.iter().copied().enumerate().fold(
            None,
            |best: Option<(usize, f32)>, (topic, weight)| match best {
                Some((_, w)) if w >= weight => best,
                _ => Some((topic, weight)),
            },
        )
    }

    /// Check that the assignment covers `n_documents` and its own topics
    pub fn validate(&self, n_documents: usize) -> NyxResult<()> {
        if self.distributions.len() != n_documents {
            return Err(NyxError::topic(format!(
                "expected {n_documents} distributions, got {}",
                self.distributions.len()
            )));
        }
        let n_topics = self.keywords.len();
        if self.distributions.iter().any(|d| d.len() != n_topics) {
            return Err(NyxError::topic(format!(
                "every distribution must have {n_topics} weights"
            )));
        }
        Ok(())
    }
}

/// Topic inference capability
#[async_trait]
pub trait TopicCapability: Send + Sync {
    /// Infer topics for the documents of `matrix`
    async fn topics_of(&self, matrix: &TermMatrix) -> NyxResult<TopicAssignment>;
}

/// Spherical k-means over TF-IDF rows
///
/// Deterministic: the first document seeds topic 0, each further seed is
/// the document least similar to the seeds chosen so far.
#[derive(Debug, Clone)]
pub struct CentroidTopicModel {
    n_topics: usize,
    max_iterations: usize,
    keywords_per_topic: usize,
}

impl Default for CentroidTopicModel {
    fn default() -> Self {
        Self {
            n_topics: 5,
            max_iterations: 20,
            keywords_per_topic: 10,
        }
    }
}

impl CentroidTopicModel {
    /// Model with `n_topics` clusters
    pub fn new(n_topics: usize) -> Self {
        Self {
            n_topics: n_topics.max(1),
            ..Self::default()
        }
    }

    fn similarity(a: &[f32], b: &[f32]) -> f32 {
        cosine_similarity(a, b).unwrap_or(0.0)
    }

    fn seed_centroids(&self, rows: &[Vec<f32>]) -> Vec<Vec<f32>> {
        let k = self.n_topics.min(rows.len());
        let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(k);
        let mut chosen = vec![false; rows.len()];

        if let Some(first) = rows.first() {
            centroids.push(first.clone());
            chosen[0] = true;
        }
        while centroids.len() < k {
            let next = rows
                .iter()
                .enumerate()
                .filter(|(i, _)| !chosen[*i])
                .map(|(i, row)| {
                    let closest = centroids
                        .iter()
                        .map(|c| Self::similarity(row, c))
                        .fold(f32::MIN, f32::max);
                    (i, closest)
                })
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            match next {
                Some((i, _)) => {
                    chosen[i] = true;
                    centroids.push(rows[i].clone());
                }
                None => break,
            }
        }
        centroids
    }

    fn nearest(row: &[f32], centroids: &[Vec<f32>]) -> usize {
        centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, Self::similarity(row, c)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best })
            .0
    }

    fn recompute(rows: &[Vec<f32>], assignment: &[usize], centroids: &mut [Vec<f32>]) {
        let width = rows.first().map_or(0, Vec::len);
        for (topic, centroid) in centroids.iter_mut().enumerate() {
            let mut sum = vec![0.0f32; width];
            let mut members = 0;
            for (row, _) in rows.iter().zip(assignment).filter(|(_, a)| **a == topic) {
                sum.iter_mut().zip(row).for_each(|(s, w)| *s += w);
                members += 1;
            }
            if members == 0 {
                continue;
            }
            let norm = sum.iter().map(|w| w * w).sum::<f32>().sqrt();
            if norm > 0.0 {
                sum.iter_mut().for_each(|w| *w /= norm);
            }
            *centroid = sum;
        }
    }
}

#[async_trait]
impl TopicCapability for CentroidTopicModel {
    async fn topics_of(&self, matrix: &TermMatrix) -> NyxResult<TopicAssignment> {
        if matrix.is_empty() {
            return Err(NyxError::topic("empty vocabulary"));
        }
        let rows = matrix.rows();
        let mut centroids = self.seed_centroids(rows);

        let mut assignment: Vec<usize> = rows.iter().map(|r| Self::nearest(r, &centroids)).collect();
        for _ in 0..self.max_iterations {
            Self::recompute(rows, &assignment, &mut centroids);
            let next: Vec<usize> = rows.iter().map(|r| Self::nearest(r, &centroids)).collect();
            if next == assignment {
                break;
            }
            assignment = next;
        }

        let distributions = rows
            .iter()
            .map(|row| {
                let sims: Vec<f32> = centroids
                    .iter()
                    .map(|c| Self::similarity(row, c).max(0.0))
                    .collect();
                let total: f32 = sims.iter().sum();
                if total > 0.0 {
                    sims.into_iter().map(|s| s / total).collect()
                } else {
                    vec![1.0 / centroids.len() as f32; centroids.len()]
                }
            })
            .collect();

        let keywords = centroids
            .iter()
            .map(|c| matrix.top_terms(c, self.keywords_per_topic))
            .collect();

        Ok(TopicAssignment {
            distributions,
            keywords,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::tfidf::TfIdfVectorizer;

    #[tokio::test]
    async fn test_separates_distinct_topics() {
        let docs = [
            "refund order payment refund",
            "payment refund order delayed",
            "weather forecast rain tomorrow",
            "rain weather umbrella forecast",
        ];
        let matrix = TfIdfVectorizer::default().fit_transform(&docs);
        let topics = CentroidTopicModel::new(2).topics_of(&matrix).await.unwrap();
        topics.validate(docs.len()).unwrap();

        let winners: Vec<usize> = (0..4).map(|i| topics.dominant(i).unwrap().0).collect();
        assert_eq!(winners[0], winners[1]);
        assert_eq!(winners[2], winners[3]);
        assert_ne!(winners[0], winners[2]);
        assert!(topics.keywords[winners[0]].contains(&"refund".to_string()));
    }

    #[tokio::test]
    async fn test_deterministic() {
        let docs = ["alpha beta", "gamma delta", "alpha gamma", "beta delta"];
        let matrix = TfIdfVectorizer::default().fit_transform(&docs);
        let model = CentroidTopicModel::default();
        let a = model.topics_of(&matrix).await.unwrap();
        let b = model.topics_of(&matrix).await.unwrap();
        assert_eq!(a, b);
        // Never more topics than documents
        assert_eq!(a.keywords.len(), 4);
    }

    #[tokio::test]
    async fn test_empty_vocabulary_is_topic_error() {
        let matrix = TfIdfVectorizer::default().fit_transform(&["the", "a"]);
        let err = CentroidTopicModel::default().topics_of(&matrix).await.unwrap_err();
        assert!(matches!(err, NyxError::Topic { .. }));
    }

    #[test]
    fn test_dominant_picks_first_maximum() {
        let topics = TopicAssignment {
            distributions: vec![vec![0.2, 0.5, 0.3]],
            keywords: vec![vec![], vec![], vec![]],
        };
        assert_eq!(topics.dominant(0), Some((1, 0.5)));
        assert_eq!(topics.dominant(1), None);
    }
}
