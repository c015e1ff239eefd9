use crate::consts::PREFETCH_DEPTH;
use crate::feature_buffer::Feature;
use crate::interaction_mask::MaskCursor;
use crate::model_instance::ModelInstance;

/// Which field pairs take part in the pairwise term.
/// The outer feature has to be in a field >= min_a_field, inner scan stops at the first
/// feature whose field is > max_b_field. Relies on features being sorted by field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RestrictionPolicy {
    pub min_a_field: u32,
    pub max_b_field: u32,
    pub hash_bits: u32,
}

/// One visited (outer, inner) pair
pub struct Interaction<'a> {
    pub inner: &'a Feature,
    /// Mask bit for this pair's ordinal
    pub enabled: bool,
    /// Feature PREFETCH_DEPTH positions ahead in the inner scan, if its interaction will be computed
    pub upcoming: Option<&'a Feature>,
}

impl RestrictionPolicy {
    pub fn new(mi: &ModelInstance) -> RestrictionPolicy {
        let (min_a_field, max_b_field) = mi.restriction_bounds();
        RestrictionPolicy {
            min_a_field,
            max_b_field,
            hash_bits: mi.hash_bits,
        }
    }

    #[inline(always)]
    pub fn outer_eligible(&self, field: u32) -> bool {
        field >= self.min_a_field
    }

    #[inline(always)]
    pub fn inner_eligible(&self, field: u32) -> bool {
        field <= self.max_b_field
    }

    /// Scans features[0..outer_pos] as inner partners of features[outer_pos].
    /// Every yielded pair consumes exactly one ordinal of the cursor; pairs past the field
    /// ceiling are never reached and consume nothing.
    #[inline(always)]
    pub fn inner_scan<'a, 'c, 'm>(
        &self,
        features: &'a [Feature],
        outer_pos: usize,
        cursor: &'c mut MaskCursor<'m>,
    ) -> InnerScan<'a, 'c, 'm> {
        InnerScan {
            inner: &features[..outer_pos],
            pos: 0,
            max_b_field: self.max_b_field,
            hash_bits: self.hash_bits,
            cursor,
        }
    }

    /// Number of ordinals a traversal of `features` consumes, i.e. how long the mask has to be
    pub fn count_interactions(&self, features: &[Feature]) -> usize {
        let mut count = 0;
        for (pos, fa) in features.iter().enumerate() {
            if !self.outer_eligible(fa.field(self.hash_bits)) {
                continue;
            }
            count += features[..pos]
                .iter()
                .take_while(|fb| self.inner_eligible(fb.field(self.hash_bits)))
                .count();
        }
        count
    }
}

pub struct InnerScan<'a, 'c, 'm> {
    inner: &'a [Feature],
    pos: usize,
    max_b_field: u32,
    hash_bits: u32,
    cursor: &'c mut MaskCursor<'m>,
}

impl<'a, 'c, 'm> Iterator for InnerScan<'a, 'c, 'm> {
    type Item = Interaction<'a>;

    #[inline(always)]
    fn next(&mut self) -> Option<Interaction<'a>> {
        let inner = self.inner.get(self.pos)?;
        if inner.field(self.hash_bits) > self.max_b_field {
            // Sorted by field, nothing after this can qualify either
            self.pos = self.inner.len();
            return None;
        }
        let upcoming = match self.inner.get(self.pos + PREFETCH_DEPTH) {
            Some(f) if self.cursor.peek(PREFETCH_DEPTH) => Some(f),
            _ => None,
        };
        let enabled = self.cursor.next();
        self.pos += 1;
        Some(Interaction {
            inner,
            enabled,
            upcoming,
        })
    }
}
