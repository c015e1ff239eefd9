use rand_distr::{Distribution, Uniform};
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::error::Error;

use crate::consts::LANES;
use crate::model_instance::ModelInstance;
use crate::optimizer::WeightAndAccumulator;
use crate::prefetch;
use crate::simd::{chunks_for, F32x8};

/*
Embedding arena layout, in F32x8 chunks:
  feature_id * feature_stride + field * row_stride
    [ weights: dim_chunks ][ accumulators: dim_chunks ]
Weight lanes past embedding_dim are 0, accumulator lanes past it stay at init_acc_gradient.
*/
pub struct ParameterStore {
    pub embedding_dim: u32,
    pub field_count: u32,
    pub feature_count: usize,
    pub init_acc_gradient: f32,
    pub dim_chunks: usize,
    pub row_stride: usize,
    pub feature_stride: usize,
    pub embeddings: Vec<F32x8>,
    pub linear: Vec<WeightAndAccumulator>,
    pub bias: WeightAndAccumulator,
}

/// Read-only view of one (feature_id, field) row
pub struct EmbeddingRow<'a> {
    chunks: &'a [F32x8],
    dim_chunks: usize,
}

impl<'a> EmbeddingRow<'a> {
    pub fn weights(&self) -> &'a [F32x8] {
        &self.chunks[..self.dim_chunks]
    }

    pub fn accumulators(&self) -> &'a [F32x8] {
        &self.chunks[self.dim_chunks..]
    }

    /// Active (unpadded) weights as plain floats
    pub fn active_weights(&self, embedding_dim: u32) -> Vec<f32> {
        self.weights()
            .iter()
            .flat_map(|c| c.0.iter().copied())
            .take(embedding_dim as usize)
            .collect()
    }
}

fn try_alloc<T: Clone>(len: usize, value: T, what: &str) -> Result<Vec<T>, Box<dyn Error>> {
    let mut v: Vec<T> = Vec::new();
    if let Err(e) = v.try_reserve_exact(len) {
        return Err(format!(
            "Could not allocate {} ({} bytes): {}",
            what,
            len.saturating_mul(std::mem::size_of::<T>()),
            e
        ))?;
    }
    v.resize(len, value);
    Ok(v)
}

impl ParameterStore {
    pub fn new(mi: &ModelInstance) -> Result<ParameterStore, Box<dyn Error>> {
        mi.validate()?;
        let dim_chunks = chunks_for(mi.embedding_dim);
        let row_stride = dim_chunks * 2;
        let feature_stride = row_stride * mi.field_count as usize;
        let feature_count = mi.feature_count();
        let embeddings_len = feature_count
            .checked_mul(feature_stride)
            .ok_or_else(|| format!("Embedding arena size overflows: {} features x {} chunks", feature_count, feature_stride))?;

        let embeddings = try_alloc(embeddings_len, F32x8::ZERO, "embedding weights")?;
        let linear = try_alloc(
            feature_count,
            WeightAndAccumulator { weight: 0.0, acc_grad: mi.init_acc_gradient },
            "linear weights",
        )?;

        log::info!(
            "Allocated parameter store: {} features x {} fields, dim {} (aligned {}), {} MB of embeddings",
            feature_count,
            mi.field_count,
            mi.embedding_dim,
            dim_chunks * LANES,
            embeddings_len * std::mem::size_of::<F32x8>() >> 20
        );

        Ok(ParameterStore {
            embedding_dim: mi.embedding_dim,
            field_count: mi.field_count,
            feature_count,
            init_acc_gradient: mi.init_acc_gradient,
            dim_chunks,
            row_stride,
            feature_stride,
            embeddings,
            linear,
            bias: WeightAndAccumulator { weight: 0.0, acc_grad: mi.init_acc_gradient },
        })
    }

    /// Fills every embedding row: active lanes uniform in [0, 1/sqrt(dim)), padding lanes 0,
    /// all accumulator lanes init_acc_gradient. Same seed, same parameters.
    pub fn init_weights(&mut self, seed: u64) {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let dist = Uniform::new(0.0f32, 1.0 / (self.embedding_dim as f32).sqrt());
        let dim = self.embedding_dim as usize;
        let acc = F32x8::splat(self.init_acc_gradient);

        for row in self.embeddings.chunks_exact_mut(self.row_stride) {
            let (weights, accumulators) = row.split_at_mut(self.dim_chunks);
            for (c, chunk) in weights.iter_mut().enumerate() {
                for (k, lane) in chunk.0.iter_mut().enumerate() {
                    *lane = if c * LANES + k < dim { dist.sample(&mut rng) } else { 0.0 };
                }
            }
            for chunk in accumulators.iter_mut() {
                *chunk = acc;
            }
        }
        for w in self.linear.iter_mut() {
            *w = WeightAndAccumulator { weight: 0.0, acc_grad: self.init_acc_gradient };
        }
        self.bias = WeightAndAccumulator { weight: 0.0, acc_grad: self.init_acc_gradient };
    }

    /// Chunk offset of the (feature_id, field) row; accumulators start dim_chunks later
    #[inline(always)]
    pub fn embedding_offset(&self, feature_id: u32, field: u32) -> usize {
        debug_assert!((feature_id as usize) < self.feature_count, "feature_id {} out of range", feature_id);
        debug_assert!(field < self.field_count, "field {} out of range (field_count {})", field, self.field_count);
        feature_id as usize * self.feature_stride + field as usize * self.row_stride
    }

    pub fn embedding_row(&self, feature_id: u32, field: u32) -> EmbeddingRow<'_> {
        let offset = self.embedding_offset(feature_id, field);
        EmbeddingRow {
            chunks: &self.embeddings[offset..offset + self.row_stride],
            dim_chunks: self.dim_chunks,
        }
    }

    #[inline(always)]
    pub fn prefetch_row(&self, feature_id: u32, field: u32) {
        let offset = self.embedding_offset(feature_id, field);
        if let Some(row) = self.embeddings.get(offset..offset + self.row_stride) {
            prefetch::prefetch_row(row);
        }
    }

    #[inline(always)]
    pub fn linear(&self, feature_id: u32) -> &WeightAndAccumulator {
        &self.linear[feature_id as usize]
    }

    #[inline(always)]
    pub fn linear_mut(&mut self, feature_id: u32) -> &mut WeightAndAccumulator {
        &mut self.linear[feature_id as usize]
    }

    pub fn bias(&self) -> &WeightAndAccumulator {
        &self.bias
    }

    pub fn bias_mut(&mut self) -> &mut WeightAndAccumulator {
        &mut self.bias
    }

    /// Verifies that no row has a non-zero padding weight or a padding accumulator
    /// that moved away from init_acc_gradient
    pub fn check_padding(&self) -> Result<(), Box<dyn Error>> {
        let dim = self.embedding_dim as usize;
        for (row_num, row) in self.embeddings.chunks_exact(self.row_stride).enumerate() {
            let (weights, accumulators) = row.split_at(self.dim_chunks);
            for lane in dim..self.dim_chunks * LANES {
                let w = weights[lane / LANES].0[lane % LANES];
                let a = accumulators[lane / LANES].0[lane % LANES];
                if w != 0.0 || a != self.init_acc_gradient {
                    return Err(format!(
                        "Padding broken in row {} lane {}: weight {}, accumulator {}",
                        row_num, lane, w, a
                    ))?;
                }
            }
        }
        Ok(())
    }

    /// Total number of f32 values persistence writes
    pub fn get_serialized_len(&self) -> usize {
        2 + self.linear.len() * 2 + self.embeddings.len() * LANES
    }
}
