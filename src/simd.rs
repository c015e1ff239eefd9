use std::ops::{Add, AddAssign, Mul, Sub};

use crate::consts::LANES;

/// Eight f32 lanes, aligned to 32 bytes so one value maps onto one AVX register.
/// All arithmetic is lane-wise; we keep it plain Rust and let LLVM lower it.
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(C, align(32))]
pub struct F32x8(pub [f32; LANES]);

impl F32x8 {
    pub const ZERO: F32x8 = F32x8([0.0; LANES]);

    #[inline(always)]
    pub fn splat(v: f32) -> F32x8 {
        F32x8([v; LANES])
    }

    /// self * b + c
    #[inline(always)]
    pub fn mul_add(self, b: F32x8, c: F32x8) -> F32x8 {
        let mut r = c;
        for k in 0..LANES {
            r.0[k] += self.0[k] * b.0[k];
        }
        r
    }

    /// Exact 1/sqrt per lane (no rsqrt approximation, results must not depend on the CPU)
    #[inline(always)]
    pub fn rsqrt(self) -> F32x8 {
        let mut r = self;
        for k in 0..LANES {
            r.0[k] = 1.0 / r.0[k].sqrt();
        }
        r
    }

    /// Horizontal sum, done once per traversal
    #[inline(always)]
    pub fn sum(self) -> f32 {
        // Pairwise, the same shape a permute + hadd reduction has
        let a = self.0;
        let s0 = (a[0] + a[4]) + (a[2] + a[6]);
        let s1 = (a[1] + a[5]) + (a[3] + a[7]);
        s0 + s1
    }
}

impl Default for F32x8 {
    fn default() -> F32x8 {
        F32x8::ZERO
    }
}

impl Add for F32x8 {
    type Output = F32x8;
    #[inline(always)]
    fn add(self, o: F32x8) -> F32x8 {
        let mut r = self;
        for k in 0..LANES {
            r.0[k] += o.0[k];
        }
        r
    }
}

impl AddAssign for F32x8 {
    #[inline(always)]
    fn add_assign(&mut self, o: F32x8) {
        for k in 0..LANES {
            self.0[k] += o.0[k];
        }
    }
}

impl Sub for F32x8 {
    type Output = F32x8;
    #[inline(always)]
    fn sub(self, o: F32x8) -> F32x8 {
        let mut r = self;
        for k in 0..LANES {
            r.0[k] -= o.0[k];
        }
        r
    }
}

impl Mul for F32x8 {
    type Output = F32x8;
    #[inline(always)]
    fn mul(self, o: F32x8) -> F32x8 {
        let mut r = self;
        for k in 0..LANES {
            r.0[k] *= o.0[k];
        }
        r
    }
}

/// Number of F32x8 chunks needed to hold `dim` floats
pub fn chunks_for(dim: u32) -> usize {
    (dim as usize + LANES - 1) / LANES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment() {
        assert_eq!(std::mem::align_of::<F32x8>(), 32);
        assert_eq!(std::mem::size_of::<F32x8>(), 32);
        let v = vec![F32x8::ZERO; 3];
        assert_eq!(v.as_ptr() as usize % 32, 0);
    }

    #[test]
    fn test_arithmetic() {
        let a = F32x8([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let b = F32x8::splat(2.0);
        assert_eq!((a * b).0, [2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0]);
        assert_eq!((a - b).0[0], -1.0);
        assert_eq!((a + b).0[7], 10.0);
        assert_eq!(a.mul_add(b, F32x8::splat(1.0)).0[2], 7.0);
        assert_eq!(a.sum(), 36.0);
        let mut c = a;
        c += b;
        assert_eq!(c.0[0], 3.0);
    }

    #[test]
    fn test_rsqrt() {
        let r = F32x8::splat(4.0).rsqrt();
        assert_eq!(r.0, [0.5; 8]);
    }

    #[test]
    fn test_chunks_for() {
        assert_eq!(chunks_for(1), 1);
        assert_eq!(chunks_for(8), 1);
        assert_eq!(chunks_for(14), 2);
        assert_eq!(chunks_for(16), 2);
        assert_eq!(chunks_for(17), 3);
    }
}
