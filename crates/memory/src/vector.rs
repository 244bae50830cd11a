//! Brute-force vector ranking over stored embeddings.

use echogarden_core::message::MessageRef;
use echogarden_core::search::{ScoredCandidate, Signal};
use echogarden_core::similarity::cosine_similarity;
use std::sync::Arc;

/// Score every embedded message against `query_embedding`.
///
/// Messages whose embedding has a different dimension (or zero norm) are
/// skipped. Results are unsorted; each carries its embedding so the ranker
/// can use it for diversity.
pub fn rank_by_similarity<'a>(
    entries: impl IntoIterator<Item = (&'a MessageRef, &'a Arc<[f32]>)>,
    query_embedding: &[f32],
) -> Vec<ScoredCandidate> {
    entries
        .into_iter()
        .filter_map(|(message, embedding)| {
            let sim = cosine_similarity(embedding, query_embedding)?;
            Some(
                ScoredCandidate::new(message.clone(), sim, Signal::Vector)
                    .with_embedding(Arc::clone(embedding)),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use echogarden_core::message::Role;

    fn message(id: &str) -> MessageRef {
        MessageRef {
            conv_id: "c1".into(),
            msg_id: id.into(),
            role: Role::Assistant,
            timestamp: Utc::now(),
            text: format!("Content for {id}"),
            parent_id: None,
        }
    }

    #[test]
    fn scores_are_cosine_similarities() {
        let a = message("a");
        let b = message("b");
        let emb_a: Arc<[f32]> = Arc::from(vec![0.0, 1.0, 0.0]);
        let emb_b: Arc<[f32]> = Arc::from(vec![0.5, 0.5, 0.0]);

        let results = rank_by_similarity([(&a, &emb_a), (&b, &emb_b)], &[1.0, 0.0, 0.0]);
        assert_eq!(results.len(), 2);
        assert!(results[0].score.abs() < 1e-6);
        assert!((results[1].score - 0.7071).abs() < 0.001);
        assert!(results.iter().all(|c| c.signal == Signal::Vector));
    }

    #[test]
    fn mismatched_dimensions_are_skipped() {
        let a = message("a");
        let emb: Arc<[f32]> = Arc::from(vec![1.0, 0.0]);
        let results = rank_by_similarity([(&a, &emb)], &[1.0, 0.0, 0.0]);
        assert!(results.is_empty());
    }
}
