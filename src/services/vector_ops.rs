//! Vector operations used to turn token states into embeddings.

use rayon::prelude::*;

/// Utility struct for vector operations.
pub struct VectorOps;

impl VectorOps {
    /// Mean-pool a `[batch, seq_len, hidden]` buffer over the token axis.
    ///
    /// `mask` is the `[batch, seq_len]` attention mask; padded positions
    /// (mask 0) do not contribute, so a text pools to the same vector alone
    /// or inside a padded batch. A row with no unmasked tokens pools to zeros.
    pub fn mean_pool(
        hidden: &[f32],
        mask: &[i64],
        batch: usize,
        seq_len: usize,
        hidden_size: usize,
    ) -> Vec<Vec<f32>> {
        (0..batch)
            .into_par_iter()
            .map(|b| {
                let mut pooled = vec![0.0f32; hidden_size];
                let mut count = 0usize;
                for t in 0..seq_len {
                    if mask[b * seq_len + t] == 0 {
                        continue;
                    }
                    let offset = (b * seq_len + t) * hidden_size;
                    for (acc, &x) in pooled.iter_mut().zip(&hidden[offset..offset + hidden_size]) {
                        *acc += x;
                    }
                    count += 1;
                }
                if count > 0 {
                    let n = count as f32;
                    pooled.iter_mut().for_each(|x| *x /= n);
                }
                pooled
            })
            .collect()
    }

    /// Normalize a vector in-place to unit length.
    pub fn normalize_inplace(vector: &mut [f32]) {
        let norm: f32 = vector.par_iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.par_iter_mut().for_each(|x| *x /= norm);
        }
    }

    /// Batch normalize vectors in-place.
    pub fn batch_normalize(vectors: &mut [Vec<f32>]) {
        vectors.par_iter_mut().for_each(|vector| {
            Self::normalize_inplace(vector);
        });
    }
}
