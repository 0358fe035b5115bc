//! Proof-of-work target and cumulative-weight arithmetic.
//!
//! Targets and depths are 32-byte big-endian numerators over 2^256. The
//! retarget and the fork-weight comparison are rational; both are
//! evaluated with arbitrary-precision integers so the only rounding is the
//! final truncation toward zero.

use crate::constants::*;
use crate::types::{Depth, Target, Timestamp};
use num_bigint::BigUint;

/// ChildTarget: 𝒯 × ℤ × ℤ → 𝒯
///
/// For a parent target t, observed time span `time_passed` and expected
/// time span `expected`:
/// 1. Let adj = time_passed / expected as a rational
/// 2. Clamp adj to [MAX_ADJUSTMENT_DOWN, MAX_ADJUSTMENT_UP]
/// 3. Return ⌊ t · adj ⌋, truncated toward zero
///
/// A negative or zero time span clamps to the downward bound, so the result
/// is always a positive rational before truncation.
pub fn child_target(parent_target: &Target, time_passed: Timestamp, expected: Timestamp) -> Target {
    let mut num = time_passed as i128;
    let mut den = expected as i128;

    // den is positive: expected = BLOCK_FREQUENCY * window with window >= 1.
    if num * MAX_ADJUSTMENT_UP_DENOM as i128 > MAX_ADJUSTMENT_UP_NUM as i128 * den {
        num = MAX_ADJUSTMENT_UP_NUM as i128;
        den = MAX_ADJUSTMENT_UP_DENOM as i128;
    } else if num * (MAX_ADJUSTMENT_DOWN_DENOM as i128) < MAX_ADJUSTMENT_DOWN_NUM as i128 * den {
        num = MAX_ADJUSTMENT_DOWN_NUM as i128;
        den = MAX_ADJUSTMENT_DOWN_DENOM as i128;
    }

    let old = parent_target.to_int();
    let new = old * BigUint::from(num as u128) / BigUint::from(den as u128);
    Target::from_int(&new)
}

/// ChildDepth: 𝒟 × 𝒯 → 𝒟
///
/// The child's cumulative weight is the parent's weight plus one block at
/// the parent's target. Depths encode the *inverse* of cumulative weight,
/// so with parent depth d and parent target t:
///
///   1/child = 1/d + 1/t   ⇒   child = ⌊ d·t / (d + t) ⌋
///
/// The truncation direction matches the historical consensus; do not
/// simplify the expression algebraically.
pub fn child_depth(parent_depth: &Depth, parent_target: &Target) -> Depth {
    let d = parent_depth.to_int();
    let t = parent_target.to_int();
    let denominator = &d + &t;
    if denominator == BigUint::default() {
        return Depth([0; 32]);
    }
    Depth::from_int(&(d * t / denominator))
}

/// Returns true if `new_depth` carries more cumulative weight than
/// `tip_depth` plus the surpass threshold of one tip-target block weight:
///
///   1/dₙ > 1/dₜ + (S_N/S_D) · (1/t)
///
/// Cross-multiplied by S_D·dₙ·dₜ·t, which are all non-negative:
///
///   S_D·dₜ·t > S_D·dₙ·t + S_N·dₙ·dₜ
pub fn exceeds_surpass_threshold(new_depth: &Depth, tip_depth: &Depth, tip_target: &Target) -> bool {
    let dn = new_depth.to_int();
    let dt = tip_depth.to_int();
    let t = tip_target.to_int();
    let s_num = BigUint::from(SURPASS_THRESHOLD_NUM);
    let s_den = BigUint::from(SURPASS_THRESHOLD_DENOM);

    &s_den * &dt * &t > &s_den * &dn * &t + &s_num * &dn * &dt
}
