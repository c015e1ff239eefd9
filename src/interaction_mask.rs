use rand::Rng;

/// One bit per interaction ordinal. 1 means the pair takes part, 0 means it is dropped out.
#[derive(Clone, Debug, PartialEq)]
pub struct InteractionMask {
    words: Vec<u64>,
    len: usize,
}

#[inline(always)]
fn words_for(len: usize) -> usize {
    (len + 63) >> 6
}

impl InteractionMask {
    pub fn all_enabled(len: usize) -> InteractionMask {
        let mut mask = InteractionMask {
            words: vec![u64::MAX; words_for(len)],
            len,
        };
        mask.clear_tail();
        mask
    }

    pub fn all_disabled(len: usize) -> InteractionMask {
        InteractionMask {
            words: vec![0; words_for(len)],
            len,
        }
    }

    /// Takes a raw packed bit array, bit i lives in words[i >> 6] at position i & 63
    pub fn from_words(words: Vec<u64>) -> InteractionMask {
        let len = words.len() * 64;
        InteractionMask { words, len }
    }

    /// Dropout mask: every interaction survives with probability 1 - rate
    pub fn with_dropout<R: Rng>(len: usize, rate: f32, rng: &mut R) -> InteractionMask {
        let mut mask = InteractionMask::all_disabled(len);
        let keep = f64::from(1.0 - rate).max(0.0).min(1.0);
        for i in 0..len {
            if rng.gen_bool(keep) {
                mask.set(i, true);
            }
        }
        mask
    }

    fn clear_tail(&mut self) {
        let rem = self.len & 63;
        if rem != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << rem) - 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Bits past the end read as disabled
    #[inline(always)]
    pub fn get(&self, i: usize) -> bool {
        match self.words.get(i >> 6) {
            Some(word) => (word >> (i & 63)) & 1 == 1,
            None => false,
        }
    }

    pub fn set(&mut self, i: usize, enabled: bool) {
        assert!(i < self.len, "bit {} out of mask of length {}", i, self.len);
        let bit = 1u64 << (i & 63);
        if enabled {
            self.words[i >> 6] |= bit;
        } else {
            self.words[i >> 6] &= !bit;
        }
    }

    pub fn count_enabled(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn cursor(&self) -> MaskCursor<'_> {
        MaskCursor { mask: self, ordinal: 0 }
    }
}

/// Hands out interaction ordinals in traversal order. Both engines walk pairs through
/// the same cursor, so a predict and its update consume identical bits.
pub struct MaskCursor<'a> {
    mask: &'a InteractionMask,
    ordinal: usize,
}

impl<'a> MaskCursor<'a> {
    /// Consumes the current ordinal and tells whether that interaction is computed
    #[inline(always)]
    pub fn next(&mut self) -> bool {
        let enabled = self.mask.get(self.ordinal);
        self.ordinal += 1;
        enabled
    }

    /// Looks at an ordinal `distance` ahead of the current one without consuming anything
    #[inline(always)]
    pub fn peek(&self, distance: usize) -> bool {
        self.mask.get(self.ordinal + distance)
    }

    /// Ordinals consumed so far
    pub fn consumed(&self) -> usize {
        self.ordinal
    }
}
