//! Brute-force top-k retrieval by cosine similarity.
//!
//! Every query is embedded once and compared against every chunk; there is no ANN structure.
//! Indexes cover a single local codebase, so a linear scan is fast enough.

use crate::embeddings::Embedder;
use crate::error::{IndexError, Result};
use crate::index::{Chunk, CodebaseIndex};

/// Added to the norm product so all-zero vectors score `0.0` instead of `NaN`.
pub const EPSILON: f32 = 1e-8;

/// `dot(a, b) / (|a| * |b| + EPSILON)`.
///
/// Both slices are expected to have the same length; extra elements of the longer one are
/// ignored.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });
    dot / (norm_a.sqrt() * norm_b.sqrt() + EPSILON)
}

/// Score every chunk against `query_embedding`, best first.
///
/// The sort is stable: chunks with equal scores keep their index order.
///
/// # Errors
/// [`IndexError::DimensionMismatch`] if a chunk's embedding length differs from the query's.
pub fn rank<'a>(query_embedding: &[f32], index: &'a CodebaseIndex) -> Result<Vec<(&'a Chunk, f32)>> {
    let mut scored = index
        .chunks
        .iter()
        .map(|chunk| {
            if chunk.embedding.len() != query_embedding.len() {
                return Err(IndexError::DimensionMismatch {
                    query: query_embedding.len(),
                    chunk: chunk.embedding.len(),
                });
            }
            Ok((chunk, cosine_similarity(query_embedding, &chunk.embedding)))
        })
        .collect::<Result<Vec<_>>>()?;

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    Ok(scored)
}

/// Embed `query` and return the `top_k` most similar chunks of `index`.
///
/// Returns `min(top_k, index.len())` chunks. An empty index or `top_k == 0` returns
/// immediately without calling the embedder.
pub async fn retrieve<'a, E: Embedder>(
    embedder: &E,
    query: &str,
    index: &'a CodebaseIndex,
    top_k: usize,
) -> Result<Vec<&'a Chunk>> {
    if index.is_empty() || top_k == 0 {
        return Ok(Vec::new());
    }

    let query_embedding = embedder.embed(query).await?;
    let ranked = rank(&query_embedding, index)?;

    Ok(ranked.into_iter().take(top_k).map(|(chunk, _)| chunk).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::fake::FakeEmbedder;

    fn chunk(text: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            embedding,
            text: text.to_string(),
            file_path: format!("{text}.py"),
        }
    }

    fn sample_index() -> CodebaseIndex {
        CodebaseIndex {
            chunks: vec![
                chunk("c0", vec![1.0, 0.0, 0.0]),
                chunk("c1", vec![0.0, 1.0, 0.0]),
                chunk("c2", vec![0.7, 0.7, 0.0]),
                chunk("c3", vec![0.0, 0.2, 0.9]),
                chunk("c4", vec![-1.0, 0.0, 0.0]),
            ],
        }
    }

    #[test]
    fn identical_vectors_score_one() {
        for v in [vec![1.0, 2.0, 3.0], vec![-0.5, 0.25], vec![0.1; 16]] {
            assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-4, "{v:?}");
        }
    }

    #[test]
    fn opposite_vectors_score_minus_one() {
        let v = vec![0.3, -2.0, 5.5];
        let neg: Vec<f32> = v.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&v, &neg) + 1.0).abs() < 1e-4);
    }

    #[test]
    fn orthogonal_and_zero_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        let zero = cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]);
        assert_eq!(zero, 0.0);
        assert!(!zero.is_nan());
    }

    #[test]
    fn rank_is_descending_and_complete() {
        let index = sample_index();
        let ranked = rank(&[1.0, 0.1, 0.0], &index).unwrap();
        assert_eq!(ranked.len(), index.len());
        assert!(ranked.windows(2).all(|w| w[0].1 >= w[1].1));
        assert_eq!(ranked[0].0.text, "c0");
        assert_eq!(ranked.last().unwrap().0.text, "c4");
    }

    #[test]
    fn ties_keep_index_order() {
        let index = CodebaseIndex {
            chunks: vec![
                chunk("first", vec![0.0, 1.0]),
                chunk("second", vec![0.0, 2.0]),
                chunk("third", vec![0.0, 3.0]),
            ],
        };
        let ranked = rank(&[0.0, 1.0], &index).unwrap();
        let order: Vec<_> = ranked.iter().map(|(c, _)| c.text.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[test]
    fn mismatched_dimensions_are_an_error() {
        let index = sample_index();
        assert!(matches!(
            rank(&[1.0, 0.0], &index),
            Err(IndexError::DimensionMismatch { query: 2, chunk: 3 })
        ));
    }

    #[tokio::test]
    async fn query_matching_chunk_three_returns_it_alone() {
        let index = sample_index();
        let embedder = FakeEmbedder::with_fixed(&[("find c3", vec![0.0, 0.2, 0.9])]);

        let hits = retrieve(&embedder, "find c3", &index, 1).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0], &index.chunks[3]);
    }

    #[tokio::test]
    async fn top_k_limits_results_to_the_best_chunks() {
        let index = sample_index();
        let embedder = FakeEmbedder::with_fixed(&[("q", vec![1.0, 1.0, 0.0])]);

        let hits = retrieve(&embedder, "q", &index, 3).await.unwrap();
        let texts: Vec<_> = hits.iter().map(|c| c.text.as_str()).collect();

        assert_eq!(texts, vec!["c2", "c0", "c1"]);
    }

    #[tokio::test]
    async fn top_k_larger_than_index_returns_everything_sorted() {
        let index = sample_index();
        let embedder = FakeEmbedder::with_fixed(&[("q", vec![0.0, 0.0, 1.0])]);

        let hits = retrieve(&embedder, "q", &index, 50).await.unwrap();

        assert_eq!(hits.len(), index.len());
        assert_eq!(hits[0].text, "c3");
        let scores: Vec<f32> = hits
            .iter()
            .map(|c| cosine_similarity(&[0.0, 0.0, 1.0], &c.embedding))
            .collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[tokio::test]
    async fn empty_index_returns_nothing_without_embedding() {
        let embedder = FakeEmbedder::default();
        let index = CodebaseIndex::default();
        let hits = retrieve(&embedder, "anything", &index, 3).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(embedder.call_count(), 0);
    }

    #[tokio::test]
    async fn zero_top_k_returns_nothing() {
        let embedder = FakeEmbedder::default();
        let index = sample_index();
        let hits = retrieve(&embedder, "q", &index, 0).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(embedder.call_count(), 0);
    }
}
