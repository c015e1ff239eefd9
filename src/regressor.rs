use serde_json::{json, Value};
use std::error::Error;

use crate::block_helpers::{f32_to_json, stats_to_json};
use crate::consts::LANES;
use crate::feature_buffer::Feature;
use crate::interaction_mask::InteractionMask;
use crate::model_instance::ModelInstance;
use crate::optimizer::OptimizerAdagrad;
use crate::restriction::RestrictionPolicy;
use crate::simd::F32x8;
use crate::weights::ParameterStore;

pub struct Regressor {
    pub regressor_name: String,
    pub weights: ParameterStore,
    // Fixed at construction, the weight layout and the traversal both depend on them
    mi: ModelInstance,
    policy: RestrictionPolicy,
    optimizer: OptimizerAdagrad,
}

impl Regressor {
    /// Allocates the parameter store without touching its values
    pub fn new_without_weights(mi: &ModelInstance) -> Result<Regressor, Box<dyn Error>> {
        let weights = ParameterStore::new(mi)?;
        let policy = RestrictionPolicy::new(mi);
        let optimizer = OptimizerAdagrad::new(mi.learning_rate, mi.l2);
        log::info!(
            "FFM regressor: optimizer {}, learning_rate {}, l2 {}, restriction: outer field >= {}, inner field <= {}",
            OptimizerAdagrad::get_name(),
            mi.learning_rate,
            mi.l2,
            policy.min_a_field,
            policy.max_b_field
        );
        Ok(Regressor {
            regressor_name: format!("FFM regressor with optimizer \"{}\"", OptimizerAdagrad::get_name()),
            mi: mi.clone(),
            weights,
            policy,
            optimizer,
        })
    }

    pub fn new(mi: &ModelInstance) -> Result<Regressor, Box<dyn Error>> {
        let mut re = Regressor::new_without_weights(mi)?;
        re.weights.init_weights(mi.seed);
        Ok(re)
    }

    pub fn new_from_params(seed: u64, restricted: bool, learning_rate: f32, l2: f32) -> Result<Regressor, Box<dyn Error>> {
        let mi = ModelInstance::new_from_params(seed, restricted, learning_rate, l2)?;
        Regressor::new(&mi)
    }

    pub fn model_instance(&self) -> &ModelInstance {
        &self.mi
    }

    pub fn policy(&self) -> &RestrictionPolicy {
        &self.policy
    }

    /// Mask length a caller has to provide for this instance
    pub fn interactions_len(&self, features: &[Feature]) -> usize {
        self.policy.count_interactions(features)
    }

    /// bias + linear term / feature count + masked pairwise term / norm.
    /// Features have to be sorted by field.
    pub fn predict(&self, features: &[Feature], norm: f32, mask: &InteractionMask) -> f32 {
        let hash_bits = self.policy.hash_bits;
        let ws = &self.weights;
        let dim_chunks = ws.dim_chunks;
        let linear_norm = features.len() as f32;

        let mut linear_total: f32 = 0.0;
        let mut wsum = F32x8::ZERO;
        let mut cursor = mask.cursor();

        for (pos, fa) in features.iter().enumerate() {
            let index_a = fa.feature_id(hash_bits);
            let field_a = fa.field(hash_bits);
            let value_a = fa.value;

            linear_total += value_a * ws.linear(index_a).weight / linear_norm;

            if !self.policy.outer_eligible(field_a) {
                continue;
            }

            for pair in self.policy.inner_scan(features, pos, &mut cursor) {
                if let Some(upcoming) = pair.upcoming {
                    let index_p = upcoming.feature_id(hash_bits);
                    let field_p = upcoming.field(hash_bits);
                    ws.prefetch_row(index_p, field_a);
                    ws.prefetch_row(index_a, field_p);
                }

                if !pair.enabled {
                    continue;
                }

                let index_b = pair.inner.feature_id(hash_bits);
                let field_b = pair.inner.field(hash_bits);
                let joint = F32x8::splat(value_a * pair.inner.value / norm);

                let offset_a = ws.embedding_offset(index_a, field_b);
                let offset_b = ws.embedding_offset(index_b, field_a);
                let wa = &ws.embeddings[offset_a..offset_a + dim_chunks];
                let wb = &ws.embeddings[offset_b..offset_b + dim_chunks];
                for (a, b) in wa.iter().zip(wb.iter()) {
                    wsum = (*a * *b).mul_add(joint, wsum);
                }
            }
        }

        ws.bias().weight + wsum.sum() + linear_total
    }

    /// One in-place adaptive step for everything the instance touches.
    /// `kappa` is d(loss)/d(score); the mask has to be the one the paired predict used.
    pub fn update(&mut self, features: &[Feature], norm: f32, kappa: f32, mask: &InteractionMask) {
        let hash_bits = self.policy.hash_bits;
        let optimizer = self.optimizer;
        let policy = self.policy;
        let ws = &mut self.weights;
        let dim_chunks = ws.dim_chunks;
        let linear_norm = features.len() as f32;

        let mut cursor = mask.cursor();

        for (pos, fa) in features.iter().enumerate() {
            let index_a = fa.feature_id(hash_bits);
            let field_a = fa.field(hash_bits);
            let value_a = fa.value;

            optimizer.scalar_step(ws.linear_mut(index_a), kappa * value_a / linear_norm);

            if !policy.outer_eligible(field_a) {
                continue;
            }

            for pair in policy.inner_scan(features, pos, &mut cursor) {
                if let Some(upcoming) = pair.upcoming {
                    let index_p = upcoming.feature_id(hash_bits);
                    let field_p = upcoming.field(hash_bits);
                    ws.prefetch_row(index_p, field_a);
                    ws.prefetch_row(index_a, field_p);
                }

                if !pair.enabled {
                    continue;
                }

                let index_b = pair.inner.feature_id(hash_bits);
                let field_b = pair.inner.field(hash_bits);
                let joint = F32x8::splat(kappa * value_a * pair.inner.value / norm);

                let wa_offset = ws.embedding_offset(index_a, field_b);
                let wb_offset = ws.embedding_offset(index_b, field_a);
                let wga_offset = wa_offset + dim_chunks;
                let wgb_offset = wb_offset + dim_chunks;

                // Whole aligned width; padding lanes have zero weights so their gradient is zero.
                // Rows may alias (same feature id and field on both sides), so load everything first.
                let e = &mut ws.embeddings;
                for d in 0..dim_chunks {
                    let (wa, wb, wga, wgb) =
                        optimizer.pair_step(joint, e[wa_offset + d], e[wb_offset + d], e[wga_offset + d], e[wgb_offset + d]);
                    e[wa_offset + d] = wa;
                    e[wb_offset + d] = wb;
                    e[wga_offset + d] = wga;
                    e[wgb_offset + d] = wgb;
                }
            }
        }

        optimizer.bias_step(ws.bias_mut(), kappa);
    }

    /// Configuration plus a summary of the parameters, for humans
    pub fn describe(&self) -> Result<Value, Box<dyn Error>> {
        let ws = &self.weights;
        let dim = ws.embedding_dim as usize;
        let active_lanes = ws
            .embeddings
            .chunks_exact(ws.row_stride)
            .flat_map(|row| row[..ws.dim_chunks].iter().flat_map(|c| c.0.iter().copied()).take(dim));
        Ok(json!({
            "regressor": self.regressor_name,
            "model_instance": serde_json::to_value(&self.mi)?,
            "restriction": {
                "min_a_field": self.policy.min_a_field,
                "max_b_field": self.policy.max_b_field,
            },
            "layout": {
                "feature_count": ws.feature_count,
                "field_count": ws.field_count,
                "embedding_dim": ws.embedding_dim,
                "embedding_dim_aligned": ws.dim_chunks * LANES,
            },
            "bias": {
                "weight": f32_to_json(ws.bias.weight),
                "acc_grad": f32_to_json(ws.bias.acc_grad),
            },
            "linear_weights": stats_to_json(ws.linear.iter().map(|w| w.weight)),
            "embedding_weights": stats_to_json(active_lanes),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_epsilon;
    use crate::feature_buffer::FeatureBuffer;
    use crate::optimizer::WeightAndAccumulator;
    use rand_xoshiro::rand_core::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn small_mi() -> ModelInstance {
        let mut mi = ModelInstance::new_empty().unwrap();
        mi.hash_bits = 6;
        mi.field_count = 4;
        mi.embedding_dim = 5;
        mi.learning_rate = 0.1;
        mi.l2 = 0.01;
        mi.seed = 3;
        mi
    }

    fn dot(re: &Regressor, fa: u32, field_b: u32, fb: u32, field_a: u32) -> f32 {
        let dim = re.mi.embedding_dim;
        let wa = re.weights.embedding_row(fa, field_b).active_weights(dim);
        let wb = re.weights.embedding_row(fb, field_a).active_weights(dim);
        wa.iter().zip(wb.iter()).map(|(a, b)| a * b).sum()
    }

    fn instance(mi: &ModelInstance) -> Vec<Feature> {
        let mut fb = FeatureBuffer::new(mi);
        fb.push(2, 7, 0.5);
        fb.push(0, 3, 1.0);
        fb.push(1, 11, 2.0);
        fb.push(3, 5, 1.5);
        fb.sort_by_field();
        fb.features
    }

    #[test]
    fn test_single_feature_scenario() {
        let mut mi = small_mi();
        mi.field_count = 1;
        let mut re = Regressor::new(&mi).unwrap();
        let features = vec![Feature::new(0, 9, 1.0, mi.hash_bits)];
        let mask = InteractionMask::all_enabled(0);

        re.weights.linear_mut(9).weight = 0.25;
        re.weights.bias_mut().weight = 0.5;
        assert_eq!(re.predict(&features, 1.0, &mask), 0.5 + 0.25);

        re.update(&features, 1.0, 1.0, &mask);
        // linear: g = l2 * w + kappa * value / 1
        let g: f32 = 0.01 * 0.25 + 1.0;
        let acc = 1.0 + g * g;
        assert_epsilon!(re.weights.linear(9).weight, 0.25 - 0.1 * g / acc.sqrt());
        assert_epsilon!(re.weights.linear(9).acc_grad, acc);
        // bias: acc += kappa
        assert_epsilon!(re.weights.bias().acc_grad, 2.0);
        assert_epsilon!(re.weights.bias().weight, 0.5 - 0.1 / 2.0f32.sqrt());

        // Second call continues from the mutated state
        let w1 = re.weights.linear(9).weight;
        re.update(&features, 1.0, 1.0, &mask);
        let g2 = 0.01 * w1 + 1.0;
        let acc2 = acc + g2 * g2;
        assert_epsilon!(re.weights.linear(9).weight, w1 - 0.1 * g2 / acc2.sqrt());
        assert_epsilon!(re.weights.bias().acc_grad, 3.0);
        assert_epsilon!(re.weights.bias().weight, 0.5 - 0.1 / 2.0f32.sqrt() - 0.1 / 3.0f32.sqrt());
    }

    #[test]
    fn test_predict_matches_reference() {
        let mi = small_mi();
        let mut re = Regressor::new(&mi).unwrap();
        let hb = mi.hash_bits;
        let features = instance(&mi);
        for (i, f) in features.iter().enumerate() {
            re.weights.linear_mut(f.feature_id(hb)).weight = 0.1 * (i as f32 + 1.0);
        }
        re.weights.bias_mut().weight = -0.2;
        let norm = 2.5;
        let mask = InteractionMask::all_enabled(re.interactions_len(&features));

        let mut expected: f32 = -0.2;
        for f in features.iter() {
            expected += f.value * re.weights.linear(f.feature_id(hb)).weight / features.len() as f32;
        }
        for a in 0..features.len() {
            for b in 0..a {
                let (fa, fb) = (&features[a], &features[b]);
                expected += fa.value * fb.value / norm * dot(&re, fa.feature_id(hb), fb.field(hb), fb.feature_id(hb), fa.field(hb));
            }
        }
        assert_epsilon!(re.predict(&features, norm, &mask), expected);
    }

    #[test]
    fn test_zero_mask_predict_is_linear_plus_bias() {
        let mi = small_mi();
        let mut re = Regressor::new(&mi).unwrap();
        let hb = mi.hash_bits;
        let features = instance(&mi);
        re.weights.linear_mut(features[0].feature_id(hb)).weight = 0.4;
        re.weights.bias_mut().weight = 0.1;
        let mask = InteractionMask::all_disabled(re.interactions_len(&features));
        let expected = 0.1 + features[0].value * 0.4 / 4.0;
        assert_epsilon!(re.predict(&features, 1.0, &mask), expected);
    }

    #[test]
    fn test_zero_mask_update_leaves_embeddings() {
        let mi = small_mi();
        let mut re = Regressor::new(&mi).unwrap();
        let features = instance(&mi);
        let before = re.weights.embeddings.clone();
        let linear_before = re.weights.linear.clone();
        let mask = InteractionMask::all_disabled(re.interactions_len(&features));
        re.update(&features, 1.0, 0.7, &mask);
        assert_eq!(re.weights.embeddings, before);
        assert_ne!(re.weights.linear, linear_before);
        assert_ne!(re.weights.bias().weight, 0.0);
    }

    #[test]
    fn test_masked_pair_is_skipped_but_counted() {
        let mi = small_mi();
        let re = Regressor::new(&mi).unwrap();
        let hb = mi.hash_bits;
        let features = instance(&mi);
        let n = re.interactions_len(&features);
        assert_eq!(n, 6);

        // Only ordinal 4 enabled: outer at position 3 (ordinals 3,4,5), inner at position 1
        let mut mask = InteractionMask::all_disabled(n);
        mask.set(4, true);
        let (fa, fb) = (&features[3], &features[1]);
        let pair = fa.value * fb.value / 2.0 * dot(&re, fa.feature_id(hb), fb.field(hb), fb.feature_id(hb), fa.field(hb));
        let all_off = re.predict(&features, 2.0, &InteractionMask::all_disabled(n));
        assert_epsilon!(re.predict(&features, 2.0, &mask), all_off + pair);
    }

    #[test]
    fn test_update_pair_uses_same_snapshot() {
        let mi = small_mi();
        let mut re = Regressor::new(&mi).unwrap();
        let hb = mi.hash_bits;
        let features = vec![Feature::new(0, 3, 1.0, hb), Feature::new(1, 8, 2.0, hb)];
        let mask = InteractionMask::all_enabled(1);
        let (norm, kappa) = (4.0, 0.5);

        let wa0 = re.weights.embedding_row(8, 0).active_weights(mi.embedding_dim);
        let wb0 = re.weights.embedding_row(3, 1).active_weights(mi.embedding_dim);
        re.update(&features, norm, kappa, &mask);
        let wa1 = re.weights.embedding_row(8, 0).active_weights(mi.embedding_dim);
        let wb1 = re.weights.embedding_row(3, 1).active_weights(mi.embedding_dim);

        let kv = kappa * 2.0 * 1.0 / norm;
        for d in 0..mi.embedding_dim as usize {
            let ga = 0.01 * wa0[d] + kv * wb0[d];
            let gb = 0.01 * wb0[d] + kv * wa0[d];
            assert_epsilon!(wa1[d], wa0[d] - 0.1 * ga / (1.0 + ga * ga).sqrt());
            assert_epsilon!(wb1[d], wb0[d] - 0.1 * gb / (1.0 + gb * gb).sqrt());
        }
        re.weights.check_padding().unwrap();
    }

    #[test]
    fn test_aliased_rows() {
        // Same feature id twice in the same field, both sides of the pair are one row
        let mi = small_mi();
        let mut re = Regressor::new(&mi).unwrap();
        let hb = mi.hash_bits;
        let features = vec![Feature::new(2, 4, 1.0, hb), Feature::new(2, 4, 1.0, hb)];
        let mask = InteractionMask::all_enabled(1);
        let w0 = re.weights.embedding_row(4, 2).active_weights(mi.embedding_dim);
        re.update(&features, 1.0, 1.0, &mask);
        let w1 = re.weights.embedding_row(4, 2).active_weights(mi.embedding_dim);
        for d in 0..mi.embedding_dim as usize {
            let g = 0.01 * w0[d] + w0[d];
            assert_epsilon!(w1[d], w0[d] - 0.1 * g / (1.0 + g * g).sqrt());
        }
    }

    #[test]
    fn test_padding_survives_training() {
        let mi = small_mi();
        let mut re = Regressor::new(&mi).unwrap();
        let features = instance(&mi);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        for i in 0..50 {
            let mask = InteractionMask::with_dropout(re.interactions_len(&features), 0.3, &mut rng);
            let kappa = 0.05 + 0.1 * (i % 3) as f32;
            re.update(&features, 3.0, kappa, &mask);
        }
        re.weights.check_padding().unwrap();
    }

    #[test]
    fn test_learning_reduces_error() {
        let mi = small_mi();
        let mut re = Regressor::new(&mi).unwrap();
        let features = instance(&mi);
        let mask = InteractionMask::all_enabled(re.interactions_len(&features));
        // Below the initial score, so the bias accumulator only grows while we get there
        let target = -0.5;
        let first = (re.predict(&features, 3.0, &mask) - target).abs();
        for _ in 0..100 {
            let p = re.predict(&features, 3.0, &mask);
            re.update(&features, 3.0, p - target, &mask);
        }
        let last = (re.predict(&features, 3.0, &mask) - target).abs();
        assert!(last.is_finite());
        assert!(last < first, "first {} last {}", first, last);
    }

    #[test]
    fn test_step_sizes_do_not_grow() {
        let mut mi = small_mi();
        mi.l2 = 0.0;
        let mut re = Regressor::new(&mi).unwrap();
        let features = instance(&mi);
        let id = features[2].feature_id(mi.hash_bits);
        let mask = InteractionMask::all_enabled(re.interactions_len(&features));
        let mut last_step = f32::MAX;
        for _ in 0..30 {
            let before = re.weights.linear(id).weight;
            re.update(&features, 3.0, 0.8, &mask);
            let step = (re.weights.linear(id).weight - before).abs();
            assert!(step <= last_step);
            last_step = step;
        }
    }

    #[test]
    fn test_restricted_skips_pairs() {
        let mut mi = small_mi();
        mi.restricted = true;
        mi.field_count = 6; // outer >= 2, inner <= 3
        let re = Regressor::new(&mi).unwrap();
        let hb = mi.hash_bits;
        let features: Vec<Feature> = (0..6).map(|f| Feature::new(f, f + 1, 1.0, hb)).collect();
        let n = re.interactions_len(&features);
        // outer 2: {0,1}, outer 3: {0,1,2}, outer 4 and 5: {0,1,2,3}
        assert_eq!(n, 2 + 3 + 4 + 4);

        let mask = InteractionMask::all_enabled(n);
        let mut expected = re.predict(&features, 1.0, &InteractionMask::all_disabled(n));
        for a in 2..6u32 {
            for b in 0..a.min(4) {
                expected += dot(&re, a + 1, b, b + 1, a);
            }
        }
        assert_epsilon!(re.predict(&features, 1.0, &mask), expected);
    }

    #[test]
    fn test_same_seed_same_model() {
        let mi = small_mi();
        let a = Regressor::new(&mi).unwrap();
        let b = Regressor::new(&mi).unwrap();
        assert_eq!(a.weights.embeddings, b.weights.embeddings);
        assert_eq!(a.weights.linear, b.weights.linear);
        assert_eq!(*a.weights.bias(), WeightAndAccumulator { weight: 0.0, acc_grad: 1.0 });
    }

    #[test]
    fn test_describe() {
        let mi = small_mi();
        let re = Regressor::new(&mi).unwrap();
        let d = re.describe().unwrap();
        assert_eq!(d["layout"]["feature_count"], 64);
        assert_eq!(d["layout"]["embedding_dim_aligned"], 8);
        assert_eq!(d["restriction"]["max_b_field"], 4);
        assert_eq!(d["embedding_weights"]["count"], 64 * 4 * 5);
        assert_eq!(d["linear_weights"]["max"], 0.0);
        assert_eq!(d["model_instance"]["seed"], 3);
    }

    #[test]
    fn test_config_is_read_only() {
        let mi = small_mi();
        let re = Regressor::new(&mi).unwrap();
        assert_eq!(*re.model_instance(), mi);
        assert_eq!(re.policy().hash_bits, mi.hash_bits);
        assert_eq!(re.policy().max_b_field, mi.field_count);
        let hb = mi.hash_bits;
        let features = vec![Feature::new(0, 1, 1.0, hb), Feature::new(3, 2, 1.0, hb)];
        assert_eq!(re.interactions_len(&features), 1);
    }

    #[test]
    fn test_new_from_params_rejects_bad_params() {
        // Validation runs before the default layout gets allocated
        assert!(Regressor::new_from_params(1, false, -0.1, 0.0).is_err());
        assert!(Regressor::new_from_params(1, true, 0.1, f32::NAN).is_err());
    }

    #[test]
    #[ignore] // two default layout models, about 1 GiB each
    fn test_new_from_params_same_seed_same_model() {
        let a = Regressor::new_from_params(7, true, 0.05, 0.001).unwrap();
        let b = Regressor::new_from_params(7, true, 0.05, 0.001).unwrap();
        assert_eq!(*a.model_instance(), ModelInstance::new_from_params(7, true, 0.05, 0.001).unwrap());
        assert_eq!(a.policy().min_a_field, 10);
        assert_eq!(a.policy().max_b_field, 19);
        assert!(a.weights.embeddings == b.weights.embeddings);
        assert!(a.weights.linear == b.weights.linear);
        a.weights.check_padding().unwrap();
    }

    #[test]
    fn test_empty_instance() {
        let mi = small_mi();
        let mut re = Regressor::new(&mi).unwrap();
        let mask = InteractionMask::all_disabled(0);
        assert_eq!(re.predict(&[], 1.0, &mask), 0.0);
        re.update(&[], 1.0, 1.0, &mask);
        assert_epsilon!(re.weights.bias().acc_grad, 2.0);
    }
}
