//! Vectorized accumulator row updates.
//!
//! Supports:
//! - `x86_64`: AVX2 (256-bit vectors, 16 i16 lanes)
//! - aarch64: NEON (128-bit vectors, 8 i16 lanes)
//! - Fallback: scalar loops
//!
//! The accumulator arrays are 64-byte aligned (see `Accumulator`); rows
//! come from the network weight vector and may be unaligned, so all loads
//! use the unaligned variants.

use super::L1;

/// `acc[i] += row[i]` over one transformer row.
#[inline]
pub fn add_row(acc: &mut [i16; L1], row: &[i16]) {
    debug_assert_eq!(row.len(), L1);

    #[cfg(target_arch = "aarch64")]
    {
        unsafe { add_row_neon(acc, row) }
    }

    #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
    {
        unsafe { add_row_avx2(acc, row) }
    }

    #[cfg(all(target_arch = "x86_64", not(target_feature = "avx2")))]
    {
        if is_x86_feature_detected!("avx2") {
            unsafe { add_row_avx2(acc, row) }
        } else {
            add_row_scalar(acc, row);
        }
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        add_row_scalar(acc, row);
    }
}

/// `acc[i] -= row[i]` over one transformer row.
#[inline]
pub fn sub_row(acc: &mut [i16; L1], row: &[i16]) {
    debug_assert_eq!(row.len(), L1);

    #[cfg(target_arch = "aarch64")]
    {
        unsafe { sub_row_neon(acc, row) }
    }

    #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
    {
        unsafe { sub_row_avx2(acc, row) }
    }

    #[cfg(all(target_arch = "x86_64", not(target_feature = "avx2")))]
    {
        if is_x86_feature_detected!("avx2") {
            unsafe { sub_row_avx2(acc, row) }
        } else {
            sub_row_scalar(acc, row);
        }
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        sub_row_scalar(acc, row);
    }
}

// ============================================================================
// Scalar fallbacks
// ============================================================================

#[cfg(any(
    test,
    not(any(target_arch = "x86_64", target_arch = "aarch64")),
    all(target_arch = "x86_64", not(target_feature = "avx2"))
))]
#[inline]
fn add_row_scalar(acc: &mut [i16; L1], row: &[i16]) {
    for (a, &r) in acc.iter_mut().zip(row) {
        *a = a.wrapping_add(r);
    }
}

#[cfg(any(
    test,
    not(any(target_arch = "x86_64", target_arch = "aarch64")),
    all(target_arch = "x86_64", not(target_feature = "avx2"))
))]
#[inline]
fn sub_row_scalar(acc: &mut [i16; L1], row: &[i16]) {
    for (a, &r) in acc.iter_mut().zip(row) {
        *a = a.wrapping_sub(r);
    }
}

// ============================================================================
// NEON (aarch64)
// ============================================================================

#[cfg(target_arch = "aarch64")]
unsafe fn add_row_neon(acc: &mut [i16; L1], row: &[i16]) {
    use std::arch::aarch64::{vaddq_s16, vld1q_s16, vst1q_s16};

    let acc_ptr = acc.as_mut_ptr();
    let row_ptr = row.as_ptr();
    for i in (0..L1).step_by(8) {
        let a = vld1q_s16(acc_ptr.add(i));
        let r = vld1q_s16(row_ptr.add(i));
        vst1q_s16(acc_ptr.add(i), vaddq_s16(a, r));
    }
}

#[cfg(target_arch = "aarch64")]
unsafe fn sub_row_neon(acc: &mut [i16; L1], row: &[i16]) {
    use std::arch::aarch64::{vld1q_s16, vst1q_s16, vsubq_s16};

    let acc_ptr = acc.as_mut_ptr();
    let row_ptr = row.as_ptr();
    for i in (0..L1).step_by(8) {
        let a = vld1q_s16(acc_ptr.add(i));
        let r = vld1q_s16(row_ptr.add(i));
        vst1q_s16(acc_ptr.add(i), vsubq_s16(a, r));
    }
}

// ============================================================================
// AVX2 (x86_64)
// ============================================================================

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn add_row_avx2(acc: &mut [i16; L1], row: &[i16]) {
    use std::arch::x86_64::{_mm256_add_epi16, _mm256_loadu_si256, _mm256_storeu_si256, __m256i};

    let acc_ptr = acc.as_mut_ptr();
    let row_ptr = row.as_ptr();
    for i in (0..L1).step_by(16) {
        let a = _mm256_loadu_si256(acc_ptr.add(i) as *const __m256i);
        let r = _mm256_loadu_si256(row_ptr.add(i) as *const __m256i);
        _mm256_storeu_si256(acc_ptr.add(i) as *mut __m256i, _mm256_add_epi16(a, r));
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn sub_row_avx2(acc: &mut [i16; L1], row: &[i16]) {
    use std::arch::x86_64::{_mm256_loadu_si256, _mm256_storeu_si256, _mm256_sub_epi16, __m256i};

    let acc_ptr = acc.as_mut_ptr();
    let row_ptr = row.as_ptr();
    for i in (0..L1).step_by(16) {
        let a = _mm256_loadu_si256(acc_ptr.add(i) as *const __m256i);
        let r = _mm256_loadu_si256(row_ptr.add(i) as *const __m256i);
        _mm256_storeu_si256(acc_ptr.add(i) as *mut __m256i, _mm256_sub_epi16(a, r));
    }
}
