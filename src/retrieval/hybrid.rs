//! CJK-aware hybrid search: Okapi BM25 keyword scoring blended with dense
//! cosine similarity. Tokenizer and scoring weights are grounded line-for-line
//! on `hybrid_search_service.py`'s `_tokenize`/`search`; the BM25 formula
//! itself mirrors `rank_bm25.BM25Okapi` (k1=1.5, b=0.75, epsilon=0.25), the
//! library the reference implementation depends on.

use std::collections::HashMap;

const BM25_K1: f32 = 1.5;
const BM25_B: f32 = 0.75;
const BM25_EPSILON: f32 = 0.25;
const BM25_WEIGHT: f32 = 0.3;
const SEMANTIC_WEIGHT: f32 = 0.7;

/// Splits on whitespace, then for any token that is not purely ASCII
/// alphanumeric, appends its character bi-grams (plus the whole token) so
/// CJK text without natural word boundaries still gets partial matches.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    let mut tokens: Vec<String> = words.iter().map(|w| w.to_string()).collect();

    for word in &words {
        if is_ascii_alphanumeric(word) {
            tokens.push(word.to_string());
        } else {
            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(2) {
                tokens.push(window.iter().collect());
            }
            tokens.push(word.to_string());
        }
    }
    tokens
}

fn is_ascii_alphanumeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
}

/// An Okapi BM25 index over a fixed document corpus, built once and reused
/// across queries the way `BM25Okapi` caches its corpus statistics.
pub struct BM25Index {
    doc_freqs: Vec<HashMap<String, u32>>,
    doc_len: Vec<u32>,
    avgdl: f32,
    idf: HashMap<String, f32>,
    corpus_size: usize,
}

impl BM25Index {
    pub fn build(documents: &[String]) -> Self {
        let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();
        let corpus_size = tokenized.len();

        let mut doc_freqs = Vec::with_capacity(corpus_size);
        let mut doc_len = Vec::with_capacity(corpus_size);
        let mut nd: HashMap<String, u32> = HashMap::new();

        for tokens in &tokenized {
            doc_len.push(tokens.len() as u32);
            let mut freqs: HashMap<String, u32> = HashMap::new();
            for tok in tokens {
                *freqs.entry(tok.clone()).or_insert(0) += 1;
            }
            for word in freqs.keys() {
                *nd.entry(word.clone()).or_insert(0) += 1;
            }
            doc_freqs.push(freqs);
        }

        let avgdl = if corpus_size == 0 {
            0.0
        } else {
            doc_len.iter().sum::<u32>() as f32 / corpus_size as f32
        };

        let mut idf: HashMap<String, f32> = HashMap::new();
        let mut idf_sum = 0.0f32;
        let mut negative: Vec<String> = Vec::new();
        for (word, freq) in &nd {
            let value = ((corpus_size as f32 - *freq as f32 + 0.5) / (*freq as f32 + 0.5)).ln();
            idf.insert(word.clone(), value);
            idf_sum += value;
            if value < 0.0 {
                negative.push(word.clone());
            }
        }
        let average_idf = if idf.is_empty() { 0.0 } else { idf_sum / idf.len() as f32 };
        let eps = BM25_EPSILON * average_idf;
        for word in negative {
            idf.insert(word, eps);
        }

        Self { doc_freqs, doc_len, avgdl, idf, corpus_size }
    }

    /// Raw (unnormalized) BM25 score per document for the given query.
    pub fn scores(&self, query: &str) -> Vec<f32> {
        let tokens = tokenize(query);
        let mut scores = vec![0.0f32; self.corpus_size];
        if self.corpus_size == 0 {
            return scores;
        }
        for token in &tokens {
            let idf = match self.idf.get(token) {
                Some(v) => *v,
                None => continue,
            };
            for (i, freqs) in self.doc_freqs.iter().enumerate() {
                let q_freq = *freqs.get(token).unwrap_or(&0) as f32;
                if q_freq == 0.0 {
                    continue;
                }
                let doc_len = self.doc_len[i] as f32;
                let denom = q_freq + BM25_K1 * (1.0 - BM25_B + BM25_B * doc_len / self.avgdl.max(1e-8));
                scores[i] += idf * (q_freq * (BM25_K1 + 1.0)) / denom;
            }
        }
        scores
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub index: usize,
    pub bm25: f32,
    pub semantic: f32,
    pub hybrid: f32,
}

/// Blends normalized BM25 scores with dense cosine similarity per
/// `bm25_weight * bm25_norm + semantic_weight * semantic`, then sorts the
/// full candidate set descending by hybrid score — matching `search`'s
/// `np.argsort(...)[::-1][:top_k]`.
pub fn hybrid_search(
    query: &str,
    contents: &[String],
    query_vector: &[f32],
    candidate_vectors: &[Vec<f32>],
) -> Vec<ScoredCandidate> {
    if contents.is_empty() {
        return Vec::new();
    }
    let bm25 = BM25Index::build(contents);
    let bm25_scores = bm25.scores(query);
    let max_bm25 = bm25_scores.iter().cloned().fold(0.0f32, f32::max);

    let mut scored: Vec<ScoredCandidate> = (0..contents.len())
        .map(|i| {
            let bm25_norm = bm25_scores[i] / (max_bm25 + 1e-8);
            let semantic = candidate_vectors
                .get(i)
                .map(|v| cosine_similarity(query_vector, v))
                .unwrap_or(0.0);
            let hybrid = BM25_WEIGHT * bm25_norm + SEMANTIC_WEIGHT * semantic;
            ScoredCandidate { index: i, bm25: bm25_norm, semantic, hybrid }
        })
        .collect();

    scored.sort_by(|a, b| b.hybrid.partial_cmp(&a.hybrid).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_tokens_are_not_bigrammed() {
        let tokens = tokenize("auth error");
        assert!(tokens.contains(&"auth".to_string()));
        assert!(tokens.contains(&"error".to_string()));
        assert!(!tokens.iter().any(|t| t == "au"));
    }

    #[test]
    fn cjk_tokens_get_bigrams() {
        let tokens = tokenize("로그인");
        assert!(tokens.contains(&"로그인".to_string()));
        assert!(tokens.contains(&"로그".to_string()));
        assert!(tokens.contains(&"그인".to_string()));
    }

    #[test]
    fn bm25_ranks_matching_document_first() {
        let docs = vec![
            "authentication failure on login".to_string(),
            "unrelated billing issue".to_string(),
        ];
        let index = BM25Index::build(&docs);
        let scores = index.scores("authentication login");
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn hybrid_search_orders_by_combined_score() {
        let docs = vec!["auth error".to_string(), "payment error".to_string()];
        let query_vector = vec![1.0, 0.0];
        let candidate_vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let results = hybrid_search("auth", &docs, &query_vector, &candidate_vectors);
        assert_eq!(results[0].index, 0);
    }

    #[test]
    fn cosine_similarity_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }
}
