use crate::consts::CACHE_LINE_BYTES;
use crate::simd::F32x8;

#[cfg(target_arch = "x86_64")]
use core::arch::x86_64::{_mm_prefetch, _MM_HINT_T1};

/// Hints the CPU to pull a whole embedding row (weights and accumulators) into cache.
/// Advisory only, results never depend on it.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
pub fn prefetch_row(row: &[F32x8]) {
    let base = row.as_ptr() as *const i8;
    let bytes = row.len() * std::mem::size_of::<F32x8>();
    for offset in (0..bytes).step_by(CACHE_LINE_BYTES) {
        // SAFETY: offset stays inside the row, and prefetch never faults anyway
        unsafe {
            _mm_prefetch(base.add(offset), _MM_HINT_T1);
        }
    }
}

#[cfg(not(target_arch = "x86_64"))]
#[inline(always)]
pub fn prefetch_row(_row: &[F32x8]) {}
