use serde::{Deserialize, Serialize};
use std::error::Error;

use crate::consts;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModelInstance {
    #[serde(default = "default_u64_zero")]
    pub seed: u64,
    #[serde(default = "default_bool_false")]
    pub restricted: bool,
    pub learning_rate: f32, // eta
    pub l2: f32,            // lambda

    #[serde(default = "default_field_count")]
    pub field_count: u32,
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: u32,
    #[serde(default = "default_hash_bits")]
    pub hash_bits: u32,

    // Starting value of every accumulator, also what padding lanes hold forever
    #[serde(default = "default_f32_one")]
    pub init_acc_gradient: f32,

    // When not given these are derived from field_count and restricted
    #[serde(default)]
    pub min_a_field: Option<u32>,
    #[serde(default)]
    pub max_b_field: Option<u32>,
}

fn default_u64_zero() -> u64 {
    0
}
fn default_bool_false() -> bool {
    false
}
fn default_f32_one() -> f32 {
    1.0
}
fn default_field_count() -> u32 {
    consts::DEFAULT_FIELD_COUNT
}
fn default_embedding_dim() -> u32 {
    consts::DEFAULT_EMBEDDING_DIM
}
fn default_hash_bits() -> u32 {
    consts::DEFAULT_HASH_BITS
}

impl ModelInstance {
    pub fn new_empty() -> Result<ModelInstance, Box<dyn Error>> {
        let mi = ModelInstance {
            seed: 0,
            restricted: false,
            learning_rate: 0.2,
            l2: 0.00002,
            field_count: consts::DEFAULT_FIELD_COUNT,
            embedding_dim: consts::DEFAULT_EMBEDDING_DIM,
            hash_bits: consts::DEFAULT_HASH_BITS,
            init_acc_gradient: 1.0,
            min_a_field: None,
            max_b_field: None,
        };
        Ok(mi)
    }

    /// The four knobs the kernel is usually built with, on the default layout
    pub fn new_from_params(
        seed: u64,
        restricted: bool,
        learning_rate: f32,
        l2: f32,
    ) -> Result<ModelInstance, Box<dyn Error>> {
        let mut mi = ModelInstance::new_empty()?;
        mi.seed = seed;
        mi.restricted = restricted;
        mi.learning_rate = learning_rate;
        mi.l2 = l2;
        mi.validate()?;
        Ok(mi)
    }

    pub fn new_from_cmdline<'a>(cl: &clap::ArgMatches<'a>) -> Result<ModelInstance, Box<dyn Error>> {
        let mut mi = ModelInstance::new_empty()?;

        if let Some(val) = cl.value_of("seed") {
            mi.seed = val.parse()?;
        }
        mi.restricted = cl.is_present("restricted");

        if let Some(val) = cl.value_of("learning_rate") {
            mi.learning_rate = val.parse()?;
        }
        if let Some(val) = cl.value_of("l2") {
            mi.l2 = val.parse()?;
        }
        if let Some(val) = cl.value_of("field_count") {
            mi.field_count = val.parse()?;
        }
        if let Some(val) = cl.value_of("embedding_dim") {
            mi.embedding_dim = val.parse()?;
        }
        if let Some(val) = cl.value_of("hash_bits") {
            mi.hash_bits = val.parse()?;
        }
        if let Some(val) = cl.value_of("init_acc_gradient") {
            mi.init_acc_gradient = val.parse()?;
        }
        if let Some(val) = cl.value_of("min_a_field") {
            mi.min_a_field = Some(val.parse()?);
        }
        if let Some(val) = cl.value_of("max_b_field") {
            mi.max_b_field = Some(val.parse()?);
        }

        mi.validate()?;
        Ok(mi)
    }

    pub fn feature_count(&self) -> usize {
        1usize << self.hash_bits
    }

    pub fn hash_mask(&self) -> u32 {
        (1u32 << self.hash_bits) - 1
    }

    /// (min_a_field, max_b_field) actually in effect
    pub fn restriction_bounds(&self) -> (u32, u32) {
        let (min_a, max_b) = if self.restricted {
            // Outer features from the upper part of the field space, inner from the lower part
            // For 30 fields this is 10 and 19
            (self.field_count / 3, (2 * self.field_count / 3).saturating_sub(1))
        } else {
            (0, self.field_count)
        };
        (self.min_a_field.unwrap_or(min_a), self.max_b_field.unwrap_or(max_b))
    }

    pub fn validate(&self) -> Result<(), Box<dyn Error>> {
        if self.field_count == 0 {
            return Err("field_count has to be at least 1")?;
        }
        if self.embedding_dim == 0 {
            return Err("embedding_dim has to be at least 1")?;
        }
        if self.hash_bits == 0 || self.hash_bits > consts::MAX_HASH_BITS {
            return Err(format!(
                "hash_bits has to be between 1 and {}, got {}",
                consts::MAX_HASH_BITS,
                self.hash_bits
            ))?;
        }
        let field_bits = 32 - self.hash_bits;
        if (self.field_count as u64 - 1) >> field_bits != 0 {
            return Err(format!(
                "{} fields do not fit into {} bits left above hash_bits {}",
                self.field_count, field_bits, self.hash_bits
            ))?;
        }
        if !(self.init_acc_gradient > 0.0) || !self.init_acc_gradient.is_finite() {
            return Err(format!(
                "init_acc_gradient has to be positive, got {}",
                self.init_acc_gradient
            ))?;
        }
        if !self.learning_rate.is_finite() || self.learning_rate < 0.0 {
            return Err(format!("learning_rate has to be non-negative, got {}", self.learning_rate))?;
        }
        if !self.l2.is_finite() || self.l2 < 0.0 {
            return Err(format!("l2 has to be non-negative, got {}", self.l2))?;
        }
        let (min_a, max_b) = self.restriction_bounds();
        if min_a >= self.field_count {
            return Err(format!(
                "min_a_field {} is outside of field range 0..{}",
                min_a, self.field_count
            ))?;
        }
        if max_b > self.field_count {
            return Err(format!(
                "max_b_field {} is outside of field range 0..={}",
                max_b, self.field_count
            ))?;
        }
        Ok(())
    }
}
