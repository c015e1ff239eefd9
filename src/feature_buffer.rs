use crate::model_instance::ModelInstance;

/// One sparse input: feature-id in the low `hash_bits` bits of `index`, field above them
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Feature {
    pub index: u32,
    pub value: f32,
}

impl Feature {
    #[inline(always)]
    pub fn new(field: u32, feature_id: u32, value: f32, hash_bits: u32) -> Feature {
        let hash_mask = (1u32 << hash_bits) - 1;
        debug_assert!(feature_id <= hash_mask, "feature_id {} does not fit into {} bits", feature_id, hash_bits);
        Feature {
            index: (field << hash_bits) | (feature_id & hash_mask),
            value,
        }
    }

    #[inline(always)]
    pub fn field(&self, hash_bits: u32) -> u32 {
        self.index >> hash_bits
    }

    #[inline(always)]
    pub fn feature_id(&self, hash_bits: u32) -> u32 {
        self.index & ((1u32 << hash_bits) - 1)
    }
}

#[derive(Clone, Debug)]
pub struct FeatureBuffer {
    pub features: Vec<Feature>,
    pub norm: f32,
    hash_bits: u32,
}

impl FeatureBuffer {
    pub fn new(mi: &ModelInstance) -> FeatureBuffer {
        FeatureBuffer {
            features: Vec::with_capacity(64),
            norm: 1.0,
            hash_bits: mi.hash_bits,
        }
    }

    pub fn reset(&mut self) {
        self.features.truncate(0);
        self.norm = 1.0;
    }

    pub fn push(&mut self, field: u32, feature_id: u32, value: f32) {
        self.features.push(Feature::new(field, feature_id, value, self.hash_bits));
    }

    /// Both engines require features ordered by field, this establishes it. Stable, so
    /// features within a field keep their order (and therefore their interaction ordinals).
    pub fn sort_by_field(&mut self) {
        let hash_bits = self.hash_bits;
        self.features.sort_by_key(|f| f.field(hash_bits));
    }

    pub fn is_sorted_by_field(&self) -> bool {
        self.features
            .windows(2)
            .all(|w| w[0].field(self.hash_bits) <= w[1].field(self.hash_bits))
    }

    /// Squared L2 norm of the instance, the usual FFM pairwise normalization
    pub fn default_norm(&self) -> f32 {
        let norm: f32 = self.features.iter().map(|f| f.value * f.value).sum();
        if norm == 0.0 {
            1.0
        } else {
            norm
        }
    }

    pub fn set_default_norm(&mut self) {
        self.norm = self.default_norm();
    }
}
