use ndarray::Array1;

use super::embeddings::Embedding;
use crate::error::{AppError, Result};

/// Cosine similarity between two embeddings, in `[-1, 1]`.
///
/// A zero-norm operand has no direction; its similarity to anything is `0.0`.
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> Result<f64> {
    if a.dim() != b.dim() {
        return Err(AppError::DimensionMismatch {
            expected: a.dim(),
            actual: b.dim(),
        });
    }

    let norm_a = a.norm();
    let norm_b = b.norm();

    let dot_product = {
        let a: Array1<f64> = a.as_array().mapv(f64::from);
        let b: Array1<f64> = b.as_array().mapv(f64::from);
        a.dot(&b)
    };

    if norm_a > 0.0 && norm_b > 0.0 {
        Ok((dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0))
    } else {
        log::warn!("Degenerate (all-zero) embedding in similarity; scoring it as 0");
        Ok(0.0)
    }
}

/// Mean cosine similarity of `test` against every reference.
///
/// `None` when there are no references to compare against.
pub fn average_similarity(test: &Embedding, refs: &[Embedding]) -> Result<Option<f64>> {
    if refs.is_empty() {
        return Ok(None);
    }

    let mut total = 0.0;
    for reference in refs {
        total += cosine_similarity(test, reference)?;
    }
    Ok(Some(total / refs.len() as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec()).unwrap()
    }

    #[test]
    fn test_cosine_similarity() {
        // Identical vectors
        let a = emb(&[0.3, -1.2, 4.5, 0.01]);
        let b = emb(&[0.3, -1.2, 4.5, 0.01]);
        assert!((cosine_similarity(&a, &b).unwrap() - 1.0).abs() < 1e-9);

        // Orthogonal vectors
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[0.0, 1.0]);
        assert!(cosine_similarity(&a, &b).unwrap().abs() < 1e-9);

        // Opposite vectors
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[-1.0, 0.0]);
        assert!((cosine_similarity(&a, &b).unwrap() + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity_is_symmetric_and_scale_free() {
        let a = emb(&[0.5, 2.0, -1.0]);
        let b = emb(&[3.0, -0.25, 0.75]);
        let ab = cosine_similarity(&a, &b).unwrap();
        let ba = cosine_similarity(&b, &a).unwrap();
        assert_eq!(ab, ba);

        let scaled = emb(&[5.0, 20.0, -10.0]);
        assert!((cosine_similarity(&scaled, &b).unwrap() - ab).abs() < 1e-9);
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        let zero = emb(&[0.0, 0.0, 0.0]);
        let a = emb(&[1.0, 2.0, 3.0]);
        assert_eq!(cosine_similarity(&zero, &a).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&a, &zero).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero).unwrap(), 0.0);
    }

    #[test]
    fn test_similarity_uses_embedding_norm() {
        // 3-4-5 triangle: cos = (3 * 4) / (5 * 4)
        let a = emb(&[3.0, 4.0]);
        let b = emb(&[4.0, 0.0]);
        assert_eq!(a.norm(), 5.0);
        let expected = 12.0 / (a.norm() * b.norm());
        assert!((cosine_similarity(&a, &b).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = emb(&[1.0, 2.0]);
        let b = emb(&[1.0, 2.0, 3.0]);
        assert!(matches!(
            cosine_similarity(&a, &b),
            Err(AppError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_average_similarity() {
        let test = emb(&[1.0, 0.0]);
        assert_eq!(average_similarity(&test, &[]).unwrap(), None);

        let single = vec![emb(&[1.0, 1.0])];
        let expected = cosine_similarity(&test, &single[0]).unwrap();
        assert_eq!(average_similarity(&test, &single).unwrap(), Some(expected));

        // Mean of 1.0 and -1.0
        let refs = vec![emb(&[2.0, 0.0]), emb(&[-3.0, 0.0])];
        let avg = average_similarity(&test, &refs).unwrap().unwrap();
        assert!(avg.abs() < 1e-9);
    }
}
