//! Scalar floating-point execution and the shared soft-float layer.
//!
//! Arithmetic that `simple_soft_float` exposes (add/sub/mul/div/sqrt, fused
//! multiply-add, compares, int conversions) goes through that crate with an
//! explicit rounding mode and a per-op `FPState` whose flags are folded into
//! the architectural encoding. Everything else (f64→f32 narrowing, scaleb,
//! logb, round-to-integral, the min/max families, classify) is implemented
//! here as bit-level round-and-pack helpers.
//!
//! The `pub(crate)` primitives at the top operate on raw bit patterns plus an
//! `FpStatus` flag accumulator; the vector FP unit drives the same primitives
//! lane by lane. The public functions at the bottom are the scalar
//! instruction semantics: clear transient flags, compute, merge flags once,
//! then write the destination only if no trap was taken.

use simple_soft_float::{FPState, RoundingMode, StatusFlags, F32, F64};

use crate::cpu::fcsr::{self, FpStatus, RoundMode};
use crate::cpu::{Cpu, Trap};

/// Default (generated) quiet NaN patterns.
pub const DEFAULT_NAN_32: u32 = 0x7FC0_0000;
pub const DEFAULT_NAN_64: u64 = 0x7FF8_0000_0000_0000;

const QUIET_BIT_32: u32 = 0x0040_0000;
const QUIET_BIT_64: u64 = 0x0008_0000_0000_0000;

// Comparison relation bits, matched against a condition set by fcmp/vfcmp.
pub const FCMP_LT: u32 = 0b0001;
pub const FCMP_EQ: u32 = 0b0010;
pub const FCMP_UN: u32 = 0b0100;
pub const FCMP_GT: u32 = 0b1000;

// -------------------------------------------------------------------------
// Bit tests

#[inline]
pub(crate) fn is_nan32(v: u32) -> bool {
    v & 0x7FFF_FFFF > 0x7F80_0000
}

#[inline]
pub(crate) fn is_snan32(v: u32) -> bool {
    is_nan32(v) && v & QUIET_BIT_32 == 0
}

#[inline]
pub(crate) fn is_nan64(v: u64) -> bool {
    v & 0x7FFF_FFFF_FFFF_FFFF > 0x7FF0_0000_0000_0000
}

#[inline]
pub(crate) fn is_snan64(v: u64) -> bool {
    is_nan64(v) && v & QUIET_BIT_64 == 0
}

// -------------------------------------------------------------------------
// simple_soft_float bridge

fn soft_rm(rm: RoundMode) -> RoundingMode {
    match rm {
        RoundMode::NearestEven => RoundingMode::TiesToEven,
        RoundMode::TowardZero => RoundingMode::TowardZero,
        RoundMode::Up => RoundingMode::TowardPositive,
        RoundMode::Down => RoundingMode::TowardNegative,
    }
}

/// Fold soft-float status flags into the architectural flag encoding.
fn fold_flags(fp: &FPState) -> u32 {
    let flags = fp.status_flags;
    let mut bits = 0;
    if flags.contains(StatusFlags::INVALID_OPERATION) {
        bits |= fcsr::NV;
    }
    if flags.contains(StatusFlags::DIVISION_BY_ZERO) {
        bits |= fcsr::DZ;
    }
    if flags.contains(StatusFlags::OVERFLOW) {
        bits |= fcsr::OF;
    }
    if flags.contains(StatusFlags::UNDERFLOW) {
        bits |= fcsr::UF;
    }
    if flags.contains(StatusFlags::INEXACT) {
        bits |= fcsr::NX;
    }
    bits
}

macro_rules! soft_binop {
    ($($name32:ident, $name64:ident => $op:ident;)*) => {$(
        #[inline]
        pub(crate) fn $name32(a: u32, b: u32, rm: RoundMode, st: &mut FpStatus) -> u32 {
            let mut fp = FPState::default();
            let r = F32::from_bits(a).$op(&F32::from_bits(b), Some(soft_rm(rm)), Some(&mut fp));
            st.raise(fold_flags(&fp));
            r.into_bits()
        }

        #[inline]
        pub(crate) fn $name64(a: u64, b: u64, rm: RoundMode, st: &mut FpStatus) -> u64 {
            let mut fp = FPState::default();
            let r = F64::from_bits(a).$op(&F64::from_bits(b), Some(soft_rm(rm)), Some(&mut fp));
            st.raise(fold_flags(&fp));
            r.into_bits()
        }
    )*};
}

soft_binop! {
    fadd32, fadd64 => add;
    fsub32, fsub64 => sub;
    fmul32, fmul64 => mul;
    fdiv32, fdiv64 => div;
}

#[inline]
pub(crate) fn fsqrt32(a: u32, rm: RoundMode, st: &mut FpStatus) -> u32 {
    let mut fp = FPState::default();
    let r = F32::from_bits(a).sqrt(Some(soft_rm(rm)), Some(&mut fp));
    st.raise(fold_flags(&fp));
    r.into_bits()
}

#[inline]
pub(crate) fn fsqrt64(a: u64, rm: RoundMode, st: &mut FpStatus) -> u64 {
    let mut fp = FPState::default();
    let r = F64::from_bits(a).sqrt(Some(soft_rm(rm)), Some(&mut fp));
    st.raise(fold_flags(&fp));
    r.into_bits()
}

/// Fused multiply-add with optional sign toggles on the addend (applied
/// before the fused op) and on the rounded result: covers madd (f, f),
/// msub (t, f), nmadd (f, t) and nmsub (t, t). The result negation must
/// come after rounding: under directed rounding round(-x) and -round(x)
/// differ, and an exact-zero result would get the wrong sign otherwise.
/// NaN results are passed through unnegated.
pub(crate) fn fmuladd32(
    a: u32,
    b: u32,
    c: u32,
    neg_addend: bool,
    neg_result: bool,
    rm: RoundMode,
    st: &mut FpStatus,
) -> u32 {
    let mut fp = FPState::default();
    let a = F32::from_bits(a);
    let b = F32::from_bits(b);
    let mut c = F32::from_bits(c);
    if neg_addend {
        c.toggle_sign();
    }
    let r = a.fused_mul_add(&b, &c, Some(soft_rm(rm)), Some(&mut fp));
    st.raise(fold_flags(&fp));
    let bits = r.into_bits();
    if neg_result && !is_nan32(bits) {
        bits ^ 0x8000_0000
    } else {
        bits
    }
}

pub(crate) fn fmuladd64(
    a: u64,
    b: u64,
    c: u64,
    neg_addend: bool,
    neg_result: bool,
    rm: RoundMode,
    st: &mut FpStatus,
) -> u64 {
    let mut fp = FPState::default();
    let a = F64::from_bits(a);
    let b = F64::from_bits(b);
    let mut c = F64::from_bits(c);
    if neg_addend {
        c.toggle_sign();
    }
    let r = a.fused_mul_add(&b, &c, Some(soft_rm(rm)), Some(&mut fp));
    st.raise(fold_flags(&fp));
    let bits = r.into_bits();
    if neg_result && !is_nan64(bits) {
        bits ^ 0x8000_0000_0000_0000
    } else {
        bits
    }
}

/// 1 / x, rounded once.
#[inline]
pub(crate) fn frecip32(a: u32, rm: RoundMode, st: &mut FpStatus) -> u32 {
    fdiv32(0x3F80_0000, a, rm, st)
}

#[inline]
pub(crate) fn frecip64(a: u64, rm: RoundMode, st: &mut FpStatus) -> u64 {
    fdiv64(0x3FF0_0000_0000_0000, a, rm, st)
}

/// 1 / sqrt(x): two rounded operations, flags accumulate over both.
pub(crate) fn frsqrt32(a: u32, rm: RoundMode, st: &mut FpStatus) -> u32 {
    let s = fsqrt32(a, rm, st);
    fdiv32(0x3F80_0000, s, rm, st)
}

pub(crate) fn frsqrt64(a: u64, rm: RoundMode, st: &mut FpStatus) -> u64 {
    let s = fsqrt64(a, rm, st);
    fdiv64(0x3FF0_0000_0000_0000, s, rm, st)
}

// -------------------------------------------------------------------------
// min/max families (IEEE 754-2008 minNum/maxNum plus the magnitude forms)

/// Sign-magnitude total order key for non-NaN values.
#[inline]
fn key32(v: u32) -> i64 {
    let m = (v & 0x7FFF_FFFF) as i64;
    if v >> 31 != 0 {
        -m
    } else {
        m
    }
}

#[inline]
fn key64(v: u64) -> i128 {
    let m = (v & 0x7FFF_FFFF_FFFF_FFFF) as i128;
    if v >> 63 != 0 {
        -m
    } else {
        m
    }
}

macro_rules! minmax_impl {
    ($($name:ident: $bits:ty, $is_nan:ident, $is_snan:ident, $key:ident,
       $quiet:expr, $default_nan:expr, $mag_mask:expr, $magnitude:expr, $want_min:expr;)*) => {$(
        pub(crate) fn $name(a: $bits, b: $bits, _rm: RoundMode, st: &mut FpStatus) -> $bits {
            let an = $is_nan(a);
            let bn = $is_nan(b);
            if $is_snan(a) || $is_snan(b) {
                st.raise(fcsr::NV);
                return if an && bn {
                    $default_nan
                } else if an {
                    a | $quiet
                } else {
                    b | $quiet
                };
            }
            match (an, bn) {
                (true, true) => $default_nan,
                (true, false) => b,
                (false, true) => a,
                (false, false) => {
                    if $magnitude {
                        let (ma, mb) = (a & $mag_mask, b & $mag_mask);
                        if ma != mb {
                            return if (ma < mb) == $want_min { a } else { b };
                        }
                        // equal magnitudes fall back to the numeric compare
                    }
                    if a & $mag_mask == 0 && b & $mag_mask == 0 {
                        // min(+0, -0) = -0, max(+0, -0) = +0
                        return if $want_min { a | b } else { a & b };
                    }
                    if ($key(a) < $key(b)) == $want_min {
                        a
                    } else {
                        b
                    }
                }
            }
        }
    )*};
}

minmax_impl! {
    fmin32: u32, is_nan32, is_snan32, key32, QUIET_BIT_32, DEFAULT_NAN_32, 0x7FFF_FFFF, false, true;
    fmax32: u32, is_nan32, is_snan32, key32, QUIET_BIT_32, DEFAULT_NAN_32, 0x7FFF_FFFF, false, false;
    fmina32: u32, is_nan32, is_snan32, key32, QUIET_BIT_32, DEFAULT_NAN_32, 0x7FFF_FFFF, true, true;
    fmaxa32: u32, is_nan32, is_snan32, key32, QUIET_BIT_32, DEFAULT_NAN_32, 0x7FFF_FFFF, true, false;
    fmin64: u64, is_nan64, is_snan64, key64, QUIET_BIT_64, DEFAULT_NAN_64, 0x7FFF_FFFF_FFFF_FFFF, false, true;
    fmax64: u64, is_nan64, is_snan64, key64, QUIET_BIT_64, DEFAULT_NAN_64, 0x7FFF_FFFF_FFFF_FFFF, false, false;
    fmina64: u64, is_nan64, is_snan64, key64, QUIET_BIT_64, DEFAULT_NAN_64, 0x7FFF_FFFF_FFFF_FFFF, true, true;
    fmaxa64: u64, is_nan64, is_snan64, key64, QUIET_BIT_64, DEFAULT_NAN_64, 0x7FFF_FFFF_FFFF_FFFF, true, false;
}

// -------------------------------------------------------------------------
// classify

/// 10-bit class mask: bit 0 sNaN, 1 qNaN, 2 -inf, 3 -normal, 4 -subnormal,
/// 5 -zero, 6 +inf, 7 +normal, 8 +subnormal, 9 +zero.
pub(crate) fn fclass32(v: u32) -> u32 {
    let neg = v >> 31 != 0;
    let exp = (v >> 23) & 0xFF;
    let frac = v & 0x7F_FFFF;
    if exp == 0xFF {
        if frac == 0 {
            if neg {
                1 << 2
            } else {
                1 << 6
            }
        } else if frac & QUIET_BIT_32 == 0 {
            1 << 0
        } else {
            1 << 1
        }
    } else if exp == 0 {
        match (frac == 0, neg) {
            (true, true) => 1 << 5,
            (true, false) => 1 << 9,
            (false, true) => 1 << 4,
            (false, false) => 1 << 8,
        }
    } else if neg {
        1 << 3
    } else {
        1 << 7
    }
}

pub(crate) fn fclass64(v: u64) -> u32 {
    let neg = v >> 63 != 0;
    let exp = (v >> 52) & 0x7FF;
    let frac = v & 0xF_FFFF_FFFF_FFFF;
    if exp == 0x7FF {
        if frac == 0 {
            if neg {
                1 << 2
            } else {
                1 << 6
            }
        } else if frac & QUIET_BIT_64 == 0 {
            1 << 0
        } else {
            1 << 1
        }
    } else if exp == 0 {
        match (frac == 0, neg) {
            (true, true) => 1 << 5,
            (true, false) => 1 << 9,
            (false, true) => 1 << 4,
            (false, false) => 1 << 8,
        }
    } else if neg {
        1 << 3
    } else {
        1 << 7
    }
}

// -------------------------------------------------------------------------
// compare

/// Compare into one of the four relation bits. The signaling form raises
/// invalid for any NaN operand, the quiet form for signaling NaNs only.
pub(crate) fn fcmp32(a: u32, b: u32, signaling: bool, st: &mut FpStatus) -> u32 {
    let mut fp = FPState::default();
    let x = F32::from_bits(a);
    let y = F32::from_bits(b);
    let r = if signaling {
        x.compare_signaling(&y, Some(&mut fp))
    } else {
        x.compare_quiet(&y, Some(&mut fp))
    };
    st.raise(fold_flags(&fp));
    match r {
        Some(std::cmp::Ordering::Less) => FCMP_LT,
        Some(std::cmp::Ordering::Equal) => FCMP_EQ,
        Some(std::cmp::Ordering::Greater) => FCMP_GT,
        None => FCMP_UN,
    }
}

pub(crate) fn fcmp64(a: u64, b: u64, signaling: bool, st: &mut FpStatus) -> u32 {
    let mut fp = FPState::default();
    let x = F64::from_bits(a);
    let y = F64::from_bits(b);
    let r = if signaling {
        x.compare_signaling(&y, Some(&mut fp))
    } else {
        x.compare_quiet(&y, Some(&mut fp))
    };
    st.raise(fold_flags(&fp));
    match r {
        Some(std::cmp::Ordering::Less) => FCMP_LT,
        Some(std::cmp::Ordering::Equal) => FCMP_EQ,
        Some(std::cmp::Ordering::Greater) => FCMP_GT,
        None => FCMP_UN,
    }
}

// -------------------------------------------------------------------------
// round-and-pack (shared by the narrowing conversion and scaleb)

const TAIL: u32 = 10;
const TAIL_MASK: u64 = (1 << TAIL) - 1;
const TAIL_HALF: u64 = 1 << (TAIL - 1);

#[inline]
fn round_increment(neg: bool, tail: u64, even_bit: u64, rm: RoundMode) -> bool {
    match rm {
        RoundMode::NearestEven => tail > TAIL_HALF || (tail == TAIL_HALF && even_bit != 0),
        RoundMode::TowardZero => false,
        RoundMode::Up => !neg && tail != 0,
        RoundMode::Down => neg && tail != 0,
    }
}

/// Round `1.fff × 2^exp` (implied bit of `sig` at position `nbits`) into
/// single-precision format. Tininess is detected before rounding.
fn round_pack_32(neg: bool, exp: i32, sig: u64, nbits: u32, rm: RoundMode, st: &mut FpStatus) -> u32 {
    let sign = (neg as u32) << 31;
    let target = 23 + TAIL;
    let mut sig = if nbits > target {
        let sh = nbits - target;
        let sticky = (sig & ((1u64 << sh) - 1) != 0) as u64;
        (sig >> sh) | sticky
    } else {
        sig << (target - nbits)
    };

    let mut be = exp + 127;
    let tiny = be <= 0;
    if tiny {
        let sh = ((1 - be) as u32).min(63);
        let sticky = (sig & ((1u64 << sh) - 1) != 0) as u64;
        sig = (sig >> sh) | sticky;
        be = 0;
    }

    let tail = sig & TAIL_MASK;
    let inexact = tail != 0;
    let mut frac = (sig >> TAIL) as u32;
    if round_increment(neg, tail, sig & (TAIL_MASK + 1), rm) {
        frac += 1;
        if frac == 1 << 24 {
            frac = 1 << 23;
            be += 1;
        }
    }

    if tiny {
        if inexact {
            st.raise(fcsr::UF | fcsr::NX);
        }
        // frac == 1 << 23 encodes the smallest normal here
        return sign | frac;
    }
    if be >= 0xFF {
        st.raise(fcsr::OF | fcsr::NX);
        return sign
            | match rm {
                RoundMode::NearestEven => 0x7F80_0000,
                RoundMode::TowardZero => 0x7F7F_FFFF,
                RoundMode::Up => {
                    if neg {
                        0x7F7F_FFFF
                    } else {
                        0x7F80_0000
                    }
                }
                RoundMode::Down => {
                    if neg {
                        0x7F80_0000
                    } else {
                        0x7F7F_FFFF
                    }
                }
            };
    }
    if inexact {
        st.raise(fcsr::NX);
    }
    sign | ((be as u32) << 23) | (frac & 0x7F_FFFF)
}

/// `round_pack_32` for double precision.
fn round_pack_64(neg: bool, exp: i32, sig: u64, nbits: u32, rm: RoundMode, st: &mut FpStatus) -> u64 {
    let sign = (neg as u64) << 63;
    let target = 52 + TAIL;
    let mut sig = if nbits > target {
        let sh = nbits - target;
        let sticky = (sig & ((1u64 << sh) - 1) != 0) as u64;
        (sig >> sh) | sticky
    } else {
        sig << (target - nbits)
    };

    let mut be = exp + 1023;
    let tiny = be <= 0;
    if tiny {
        let sh = ((1 - be) as u32).min(63);
        let sticky = (sig & ((1u64 << sh) - 1) != 0) as u64;
        sig = (sig >> sh) | sticky;
        be = 0;
    }

    let tail = sig & TAIL_MASK;
    let inexact = tail != 0;
    let mut frac = sig >> TAIL;
    if round_increment(neg, tail, sig & (TAIL_MASK + 1), rm) {
        frac += 1;
        if frac == 1 << 53 {
            frac = 1 << 52;
            be += 1;
        }
    }

    if tiny {
        if inexact {
            st.raise(fcsr::UF | fcsr::NX);
        }
        return sign | frac;
    }
    if be >= 0x7FF {
        st.raise(fcsr::OF | fcsr::NX);
        return sign
            | match rm {
                RoundMode::NearestEven => 0x7FF0_0000_0000_0000,
                RoundMode::TowardZero => 0x7FEF_FFFF_FFFF_FFFF,
                RoundMode::Up => {
                    if neg {
                        0x7FEF_FFFF_FFFF_FFFF
                    } else {
                        0x7FF0_0000_0000_0000
                    }
                }
                RoundMode::Down => {
                    if neg {
                        0x7FF0_0000_0000_0000
                    } else {
                        0x7FEF_FFFF_FFFF_FFFF
                    }
                }
            };
    }
    if inexact {
        st.raise(fcsr::NX);
    }
    sign | ((be as u64) << 52) | (frac & 0xF_FFFF_FFFF_FFFF)
}

// -------------------------------------------------------------------------
// format conversion

/// Narrow f64 → f32 under the given rounding mode.
pub(crate) fn cvt_s_d(v: u64, rm: RoundMode, st: &mut FpStatus) -> u32 {
    let neg = v >> 63 != 0;
    let sign = (neg as u32) << 31;
    let exp = ((v >> 52) & 0x7FF) as i32;
    let frac = v & 0xF_FFFF_FFFF_FFFF;
    if exp == 0x7FF {
        if frac != 0 {
            if is_snan64(v) {
                st.raise(fcsr::NV);
            }
            return sign | 0x7FC0_0000 | ((frac >> 29) as u32 & 0x3F_FFFF);
        }
        return sign | 0x7F80_0000;
    }
    if exp == 0 && frac == 0 {
        return sign;
    }
    let (mut sig, mut e) = if exp == 0 {
        (frac, -1022)
    } else {
        (frac | (1 << 52), exp - 1023)
    };
    while sig & (1 << 52) == 0 {
        sig <<= 1;
        e -= 1;
    }
    round_pack_32(neg, e, sig, 52, rm, st)
}

/// Widen f32 → f64 (exact; a signaling NaN raises invalid and is quieted,
/// payload bits carried below the quiet bit).
pub(crate) fn cvt_d_s(v: u32, st: &mut FpStatus) -> u64 {
    let sign = ((v >> 31) as u64) << 63;
    let exp = (v >> 23) & 0xFF;
    let frac = v & 0x7F_FFFF;
    if exp == 0xFF {
        if frac != 0 {
            if is_snan32(v) {
                st.raise(fcsr::NV);
            }
            return sign | DEFAULT_NAN_64 | (((frac & 0x3F_FFFF) as u64) << 29);
        }
        return sign | 0x7FF0_0000_0000_0000;
    }
    if exp == 0 {
        if frac == 0 {
            return sign;
        }
        // normalize the subnormal into the wider exponent range
        let p = 31 - frac.leading_zeros();
        let s = 23 - p;
        let m = (frac << s) as u64;
        let dexp = (897 - s) as u64;
        return sign | (dexp << 52) | ((m & 0x7F_FFFF) << 29);
    }
    let dexp = (exp + 1023 - 127) as u64;
    sign | (dexp << 52) | ((frac as u64) << 29)
}

// -------------------------------------------------------------------------
// float → integer (saturating; NaN converts to 0 with invalid)

macro_rules! to_int_impl {
    ($($name:ident: $fty:ident/$bits:ty, $conv:ident -> $ity:ty, $nan:ident, $sbit:expr;)*) => {$(
        pub(crate) fn $name(a: $bits, rm: RoundMode, st: &mut FpStatus) -> $ity {
            let mut fp = FPState::default();
            let r = $fty::from_bits(a).$conv(true, Some(soft_rm(rm)), Some(&mut fp));
            st.raise(fold_flags(&fp));
            match r {
                Some(v) => v,
                None => {
                    st.raise(fcsr::NV);
                    if $nan(a) {
                        0
                    } else if a >> $sbit != 0 {
                        <$ity>::MIN
                    } else {
                        <$ity>::MAX
                    }
                }
            }
        }
    )*};
}

to_int_impl! {
    f32_to_i32: F32/u32, to_i32 -> i32, is_nan32, 31;
    f32_to_u32: F32/u32, to_u32 -> u32, is_nan32, 31;
    f32_to_i64: F32/u32, to_i64 -> i64, is_nan32, 31;
    f32_to_u64: F32/u32, to_u64 -> u64, is_nan32, 31;
    f64_to_i32: F64/u64, to_i32 -> i32, is_nan64, 63;
    f64_to_u32: F64/u64, to_u32 -> u32, is_nan64, 63;
    f64_to_i64: F64/u64, to_i64 -> i64, is_nan64, 63;
    f64_to_u64: F64/u64, to_u64 -> u64, is_nan64, 63;
}

// -------------------------------------------------------------------------
// integer → float

macro_rules! from_int_impl {
    ($($name:ident: $ity:ty => $fty:ident/$bits:ty, $conv:ident;)*) => {$(
        pub(crate) fn $name(v: $ity, rm: RoundMode, st: &mut FpStatus) -> $bits {
            let mut fp = FPState::default();
            let r = $fty::$conv(v, Some(soft_rm(rm)), Some(&mut fp));
            st.raise(fold_flags(&fp));
            r.into_bits()
        }
    )*};
}

from_int_impl! {
    i32_to_f32: i32 => F32/u32, from_i32;
    u32_to_f32: u32 => F32/u32, from_u32;
    i64_to_f32: i64 => F32/u32, from_i64;
    u64_to_f32: u64 => F32/u32, from_u64;
    i32_to_f64: i32 => F64/u64, from_i32;
    u32_to_f64: u32 => F64/u64, from_u32;
    i64_to_f64: i64 => F64/u64, from_i64;
    u64_to_f64: u64 => F64/u64, from_u64;
}

// -------------------------------------------------------------------------
// round to integral-valued float

pub(crate) fn frint32(a: u32, rm: RoundMode, st: &mut FpStatus) -> u32 {
    if is_nan32(a) {
        if is_snan32(a) {
            st.raise(fcsr::NV);
        }
        return a | QUIET_BIT_32;
    }
    let exp = ((a >> 23) & 0xFF) as i32;
    if exp >= 150 {
        // already integral (covers infinities)
        return a;
    }
    let sign = a & 0x8000_0000;
    if exp < 127 {
        if a & 0x7FFF_FFFF == 0 {
            return a;
        }
        st.raise(fcsr::NX);
        let one = sign | 0x3F80_0000;
        return match rm {
            RoundMode::NearestEven => {
                // only magnitudes above one half round away from zero
                if exp == 126 && a & 0x7F_FFFF != 0 {
                    one
                } else {
                    sign
                }
            }
            RoundMode::TowardZero => sign,
            RoundMode::Up => {
                if sign == 0 {
                    one
                } else {
                    sign
                }
            }
            RoundMode::Down => {
                if sign != 0 {
                    one
                } else {
                    sign
                }
            }
        };
    }
    let mask = (1u32 << (150 - exp)) - 1;
    if a & mask == 0 {
        return a;
    }
    st.raise(fcsr::NX);
    let half = (mask >> 1) + 1;
    let mut r = a;
    match rm {
        RoundMode::NearestEven => {
            r = r.wrapping_add(half);
            if a & mask == half {
                r &= !(mask + 1);
            }
        }
        RoundMode::TowardZero => {}
        RoundMode::Up => {
            if sign == 0 {
                r = r.wrapping_add(mask);
            }
        }
        RoundMode::Down => {
            if sign != 0 {
                r = r.wrapping_add(mask);
            }
        }
    }
    r & !mask
}

pub(crate) fn frint64(a: u64, rm: RoundMode, st: &mut FpStatus) -> u64 {
    if is_nan64(a) {
        if is_snan64(a) {
            st.raise(fcsr::NV);
        }
        return a | QUIET_BIT_64;
    }
    let exp = ((a >> 52) & 0x7FF) as i32;
    if exp >= 1075 {
        return a;
    }
    let sign = a & 0x8000_0000_0000_0000;
    if exp < 1023 {
        if a & 0x7FFF_FFFF_FFFF_FFFF == 0 {
            return a;
        }
        st.raise(fcsr::NX);
        let one = sign | 0x3FF0_0000_0000_0000;
        return match rm {
            RoundMode::NearestEven => {
                if exp == 1022 && a & 0xF_FFFF_FFFF_FFFF != 0 {
                    one
                } else {
                    sign
                }
            }
            RoundMode::TowardZero => sign,
            RoundMode::Up => {
                if sign == 0 {
                    one
                } else {
                    sign
                }
            }
            RoundMode::Down => {
                if sign != 0 {
                    one
                } else {
                    sign
                }
            }
        };
    }
    let mask = (1u64 << (1075 - exp)) - 1;
    if a & mask == 0 {
        return a;
    }
    st.raise(fcsr::NX);
    let half = (mask >> 1) + 1;
    let mut r = a;
    match rm {
        RoundMode::NearestEven => {
            r = r.wrapping_add(half);
            if a & mask == half {
                r &= !(mask + 1);
            }
        }
        RoundMode::TowardZero => {}
        RoundMode::Up => {
            if sign == 0 {
                r = r.wrapping_add(mask);
            }
        }
        RoundMode::Down => {
            if sign != 0 {
                r = r.wrapping_add(mask);
            }
        }
    }
    r & !mask
}

// -------------------------------------------------------------------------
// scaleb / logb

/// x · 2^n with n clamped to ±0x200; the result is rounded and packed, so
/// overflow/underflow flags come out exactly as for an arithmetic op.
pub(crate) fn fscaleb32(a: u32, n: i64, rm: RoundMode, st: &mut FpStatus) -> u32 {
    if is_nan32(a) {
        if is_snan32(a) {
            st.raise(fcsr::NV);
        }
        return a | QUIET_BIT_32;
    }
    let exp = (a >> 23) & 0xFF;
    let frac = a & 0x7F_FFFF;
    if exp == 0xFF || (exp == 0 && frac == 0) {
        return a;
    }
    let n = n.clamp(-0x200, 0x200) as i32;
    let (mut sig, mut e) = if exp == 0 {
        (frac as u64, -126)
    } else {
        ((frac | 0x80_0000) as u64, exp as i32 - 127)
    };
    while sig & 0x80_0000 == 0 {
        sig <<= 1;
        e -= 1;
    }
    round_pack_32(a >> 31 != 0, e + n, sig, 23, rm, st)
}

/// `fscaleb32` for double precision; n clamped to ±0x1000.
pub(crate) fn fscaleb64(a: u64, n: i64, rm: RoundMode, st: &mut FpStatus) -> u64 {
    if is_nan64(a) {
        if is_snan64(a) {
            st.raise(fcsr::NV);
        }
        return a | QUIET_BIT_64;
    }
    let exp = (a >> 52) & 0x7FF;
    let frac = a & 0xF_FFFF_FFFF_FFFF;
    if exp == 0x7FF || (exp == 0 && frac == 0) {
        return a;
    }
    let n = n.clamp(-0x1000, 0x1000) as i32;
    let (mut sig, mut e) = if exp == 0 {
        (frac, -1022)
    } else {
        (frac | (1 << 52), exp as i32 - 1023)
    };
    while sig & (1 << 52) == 0 {
        sig <<= 1;
        e -= 1;
    }
    round_pack_64(a >> 63 != 0, e + n, sig, 52, rm, st)
}

/// ⌊log₂|x|⌋ as a float. Zero gives -inf with divide-by-zero, negative
/// values and -inf give the default NaN with invalid. The caller masks
/// inexact out of the merge.
pub(crate) fn flogb32(a: u32, rm: RoundMode, st: &mut FpStatus) -> u32 {
    if is_nan32(a) {
        if is_snan32(a) {
            st.raise(fcsr::NV);
        }
        return a | QUIET_BIT_32;
    }
    if a & 0x7FFF_FFFF == 0 {
        st.raise(fcsr::DZ);
        return 0xFF80_0000;
    }
    if a >> 31 != 0 {
        st.raise(fcsr::NV);
        return DEFAULT_NAN_32;
    }
    if a == 0x7F80_0000 {
        return a;
    }
    let exp = (a >> 23) & 0xFF;
    let e = if exp == 0 {
        31 - (a & 0x7F_FFFF).leading_zeros() as i32 - 149
    } else {
        exp as i32 - 127
    };
    i32_to_f32(e, rm, st)
}

pub(crate) fn flogb64(a: u64, rm: RoundMode, st: &mut FpStatus) -> u64 {
    if is_nan64(a) {
        if is_snan64(a) {
            st.raise(fcsr::NV);
        }
        return a | QUIET_BIT_64;
    }
    if a & 0x7FFF_FFFF_FFFF_FFFF == 0 {
        st.raise(fcsr::DZ);
        return 0xFFF0_0000_0000_0000;
    }
    if a >> 63 != 0 {
        st.raise(fcsr::NV);
        return DEFAULT_NAN_64;
    }
    if a == 0x7FF0_0000_0000_0000 {
        return a;
    }
    let exp = (a >> 52) & 0x7FF;
    let e = if exp == 0 {
        63 - (a & 0xF_FFFF_FFFF_FFFF).leading_zeros() as i32 - 1074
    } else {
        exp as i32 - 1023
    };
    i32_to_f64(e, rm, st)
}

// -------------------------------------------------------------------------
// scalar instruction semantics

macro_rules! scalar_binop {
    ($($(#[$m:meta])* $name_s:ident, $name_d:ident => $p32:ident, $p64:ident;)*) => {$(
        $(#[$m])*
        pub fn $name_s(cpu: &mut Cpu, fd: usize, fj: usize, fk: usize) -> Result<(), Trap> {
            cpu.begin_fp_op();
            let rm = cpu.fp_status.rm;
            let r = $p32(cpu.fpr32(fj), cpu.fpr32(fk), rm, &mut cpu.fp_status);
            cpu.end_fp_op()?;
            cpu.set_fpr32(fd, r);
            Ok(())
        }

        $(#[$m])*
        pub fn $name_d(cpu: &mut Cpu, fd: usize, fj: usize, fk: usize) -> Result<(), Trap> {
            cpu.begin_fp_op();
            let rm = cpu.fp_status.rm;
            let r = $p64(cpu.fpr(fj), cpu.fpr(fk), rm, &mut cpu.fp_status);
            cpu.end_fp_op()?;
            cpu.set_fpr(fd, r);
            Ok(())
        }
    )*};
}

scalar_binop! {
    /// fd = fj + fk
    fadd_s, fadd_d => fadd32, fadd64;
    /// fd = fj - fk
    fsub_s, fsub_d => fsub32, fsub64;
    /// fd = fj * fk
    fmul_s, fmul_d => fmul32, fmul64;
    /// fd = fj / fk
    fdiv_s, fdiv_d => fdiv32, fdiv64;
    /// fd = maxNum(fj, fk)
    fmax_s, fmax_d => fmax32, fmax64;
    /// fd = minNum(fj, fk)
    fmin_s, fmin_d => fmin32, fmin64;
    /// fd = the operand with the greater magnitude
    fmaxa_s, fmaxa_d => fmaxa32, fmaxa64;
    /// fd = the operand with the smaller magnitude
    fmina_s, fmina_d => fmina32, fmina64;
}

macro_rules! scalar_unop {
    ($($(#[$m:meta])* $name_s:ident, $name_d:ident => $p32:ident, $p64:ident;)*) => {$(
        $(#[$m])*
        pub fn $name_s(cpu: &mut Cpu, fd: usize, fj: usize) -> Result<(), Trap> {
            cpu.begin_fp_op();
            let rm = cpu.fp_status.rm;
            let r = $p32(cpu.fpr32(fj), rm, &mut cpu.fp_status);
            cpu.end_fp_op()?;
            cpu.set_fpr32(fd, r);
            Ok(())
        }

        $(#[$m])*
        pub fn $name_d(cpu: &mut Cpu, fd: usize, fj: usize) -> Result<(), Trap> {
            cpu.begin_fp_op();
            let rm = cpu.fp_status.rm;
            let r = $p64(cpu.fpr(fj), rm, &mut cpu.fp_status);
            cpu.end_fp_op()?;
            cpu.set_fpr(fd, r);
            Ok(())
        }
    )*};
}

scalar_unop! {
    /// fd = sqrt(fj)
    fsqrt_s, fsqrt_d => fsqrt32, fsqrt64;
    /// fd = 1 / fj
    frecip_s, frecip_d => frecip32, frecip64;
    /// fd = 1 / sqrt(fj)
    frsqrt_s, frsqrt_d => frsqrt32, frsqrt64;
}

macro_rules! scalar_muladd {
    ($($(#[$m:meta])* $name_s:ident, $name_d:ident => $na:expr, $nr:expr;)*) => {$(
        $(#[$m])*
        pub fn $name_s(cpu: &mut Cpu, fd: usize, fj: usize, fk: usize, fa: usize) -> Result<(), Trap> {
            cpu.begin_fp_op();
            let rm = cpu.fp_status.rm;
            let r = fmuladd32(
                cpu.fpr32(fj), cpu.fpr32(fk), cpu.fpr32(fa), $na, $nr, rm, &mut cpu.fp_status,
            );
            cpu.end_fp_op()?;
            cpu.set_fpr32(fd, r);
            Ok(())
        }

        $(#[$m])*
        pub fn $name_d(cpu: &mut Cpu, fd: usize, fj: usize, fk: usize, fa: usize) -> Result<(), Trap> {
            cpu.begin_fp_op();
            let rm = cpu.fp_status.rm;
            let r = fmuladd64(
                cpu.fpr(fj), cpu.fpr(fk), cpu.fpr(fa), $na, $nr, rm, &mut cpu.fp_status,
            );
            cpu.end_fp_op()?;
            cpu.set_fpr(fd, r);
            Ok(())
        }
    )*};
}

scalar_muladd! {
    /// fd = fj * fk + fa, single rounding
    fmadd_s, fmadd_d => false, false;
    /// fd = fj * fk - fa
    fmsub_s, fmsub_d => true, false;
    /// fd = -(fj * fk + fa)
    fnmadd_s, fnmadd_d => false, true;
    /// fd = -(fj * fk - fa)
    fnmsub_s, fnmsub_d => true, true;
}

/// fd = fj * 2^n, n taken from the integer bits of fk.
pub fn fscaleb_s(cpu: &mut Cpu, fd: usize, fj: usize, fk: usize) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let rm = cpu.fp_status.rm;
    let n = cpu.fpr32(fk) as i32 as i64;
    let r = fscaleb32(cpu.fpr32(fj), n, rm, &mut cpu.fp_status);
    cpu.end_fp_op()?;
    cpu.set_fpr32(fd, r);
    Ok(())
}

pub fn fscaleb_d(cpu: &mut Cpu, fd: usize, fj: usize, fk: usize) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let rm = cpu.fp_status.rm;
    let n = cpu.fpr(fk) as i64;
    let r = fscaleb64(cpu.fpr(fj), n, rm, &mut cpu.fp_status);
    cpu.end_fp_op()?;
    cpu.set_fpr(fd, r);
    Ok(())
}

/// fd = ⌊log₂|fj|⌋; the inexact flag never reaches the FCSR.
pub fn flogb_s(cpu: &mut Cpu, fd: usize, fj: usize) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let rm = cpu.fp_status.rm;
    let r = flogb32(cpu.fpr32(fj), rm, &mut cpu.fp_status);
    cpu.end_fp_op_masked(!fcsr::NX)?;
    cpu.set_fpr32(fd, r);
    Ok(())
}

pub fn flogb_d(cpu: &mut Cpu, fd: usize, fj: usize) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let rm = cpu.fp_status.rm;
    let r = flogb64(cpu.fpr(fj), rm, &mut cpu.fp_status);
    cpu.end_fp_op_masked(!fcsr::NX)?;
    cpu.set_fpr(fd, r);
    Ok(())
}

/// Class mask of fj into fd. Raises no exceptions.
pub fn fclass_s(cpu: &mut Cpu, fd: usize, fj: usize) {
    let m = fclass32(cpu.fpr32(fj));
    cpu.set_fpr(fd, m as u64);
}

pub fn fclass_d(cpu: &mut Cpu, fd: usize, fj: usize) {
    let m = fclass64(cpu.fpr(fj));
    cpu.set_fpr(fd, m as u64);
}

/// Compare fj with fk and set condition flag `cd` to whether the observed
/// relation is in `cond` (a set of `FCMP_*` bits).
pub fn fcmp_cond_s(
    cpu: &mut Cpu,
    cd: usize,
    fj: usize,
    fk: usize,
    cond: u32,
    signaling: bool,
) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let rel = fcmp32(cpu.fpr32(fj), cpu.fpr32(fk), signaling, &mut cpu.fp_status);
    cpu.end_fp_op()?;
    cpu.cf[cd & 7] = rel & cond != 0;
    Ok(())
}

pub fn fcmp_cond_d(
    cpu: &mut Cpu,
    cd: usize,
    fj: usize,
    fk: usize,
    cond: u32,
    signaling: bool,
) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let rel = fcmp64(cpu.fpr(fj), cpu.fpr(fk), signaling, &mut cpu.fp_status);
    cpu.end_fp_op()?;
    cpu.cf[cd & 7] = rel & cond != 0;
    Ok(())
}

/// fd = (f32)fj, narrowing under the current rounding mode.
pub fn fcvt_s_d(cpu: &mut Cpu, fd: usize, fj: usize) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let rm = cpu.fp_status.rm;
    let r = cvt_s_d(cpu.fpr(fj), rm, &mut cpu.fp_status);
    cpu.end_fp_op()?;
    cpu.set_fpr32(fd, r);
    Ok(())
}

/// fd = (f64)fj, widening (exact).
pub fn fcvt_d_s(cpu: &mut Cpu, fd: usize, fj: usize) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let r = cvt_d_s(cpu.fpr32(fj), &mut cpu.fp_status);
    cpu.end_fp_op()?;
    cpu.set_fpr(fd, r);
    Ok(())
}

macro_rules! scalar_to_int {
    ($($(#[$m:meta])* $name:ident: $src:ident, $prim:ident, $store:expr;)*) => {$(
        $(#[$m])*
        pub fn $name(cpu: &mut Cpu, fd: usize, fj: usize, rm: Option<RoundMode>) -> Result<(), Trap> {
            cpu.begin_fp_op();
            let rm = rm.unwrap_or(cpu.fp_status.rm);
            let v = $prim(cpu.$src(fj), rm, &mut cpu.fp_status);
            cpu.end_fp_op()?;
            cpu.set_fpr(fd, $store(v));
            Ok(())
        }
    )*};
}

scalar_to_int! {
    /// fd = (i32)fj, sign-extended; explicit mode overrides the FCSR.
    ftint_w_s: fpr32, f32_to_i32, |v: i32| v as i64 as u64;
    ftint_w_d: fpr, f64_to_i32, |v: i32| v as i64 as u64;
    /// fd = (u32)fj, zero-extended
    ftint_wu_s: fpr32, f32_to_u32, |v: u32| v as u64;
    ftint_wu_d: fpr, f64_to_u32, |v: u32| v as u64;
    /// fd = (i64)fj
    ftint_l_s: fpr32, f32_to_i64, |v: i64| v as u64;
    ftint_l_d: fpr, f64_to_i64, |v: i64| v as u64;
    /// fd = (u64)fj
    ftint_lu_s: fpr32, f32_to_u64, |v: u64| v;
    ftint_lu_d: fpr, f64_to_u64, |v: u64| v;
}

macro_rules! scalar_from_int {
    ($($(#[$m:meta])* $name:ident: $src:ident => $ity:ty, $prim:ident, $write:ident;)*) => {$(
        $(#[$m])*
        pub fn $name(cpu: &mut Cpu, fd: usize, fj: usize) -> Result<(), Trap> {
            cpu.begin_fp_op();
            let rm = cpu.fp_status.rm;
            let v = cpu.$src(fj) as $ity;
            let r = $prim(v, rm, &mut cpu.fp_status);
            cpu.end_fp_op()?;
            cpu.$write(fd, r);
            Ok(())
        }
    )*};
}

scalar_from_int! {
    /// fd = (f32) of the i32 held in fj
    ffint_s_w: fpr32 => i32, i32_to_f32, set_fpr32;
    ffint_s_wu: fpr32 => u32, u32_to_f32, set_fpr32;
    ffint_s_l: fpr => i64, i64_to_f32, set_fpr32;
    ffint_s_lu: fpr => u64, u64_to_f32, set_fpr32;
    /// fd = (f64) of the integer held in fj
    ffint_d_w: fpr32 => i32, i32_to_f64, set_fpr;
    ffint_d_wu: fpr32 => u32, u32_to_f64, set_fpr;
    ffint_d_l: fpr => i64, i64_to_f64, set_fpr;
    ffint_d_lu: fpr => u64, u64_to_f64, set_fpr;
}

/// fd = fj rounded to an integral-valued float.
pub fn frint_s(cpu: &mut Cpu, fd: usize, fj: usize, rm: Option<RoundMode>) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let rm = rm.unwrap_or(cpu.fp_status.rm);
    let r = frint32(cpu.fpr32(fj), rm, &mut cpu.fp_status);
    cpu.end_fp_op()?;
    cpu.set_fpr32(fd, r);
    Ok(())
}

pub fn frint_d(cpu: &mut Cpu, fd: usize, fj: usize, rm: Option<RoundMode>) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let rm = rm.unwrap_or(cpu.fp_status.rm);
    let r = frint64(cpu.fpr(fj), rm, &mut cpu.fp_status);
    cpu.end_fp_op()?;
    cpu.set_fpr(fd, r);
    Ok(())
}
