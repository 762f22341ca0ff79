//! Vector register file and lane addressing.
//!
//! A register is 256 bits (LASX); LSX instructions use the low 128 bits.
//! Lane index 0 is always the least-significant element. All lane reads and
//! writes go through `from_le_bytes`/`to_le_bytes`, so this module is the
//! single place where host byte order is resolved — everything above it is
//! endian-agnostic.

/// Bytes per architectural vector register (256 bits).
pub const VLENB: usize = 32;

/// Bytes per 128-bit group. Cross-lane instructions (narrow, pick,
/// interleave, shuffle) apply their index mapping per group even at
/// 256-bit operand width.
pub const GROUP_BYTES: usize = 16;

/// Operand width descriptor, derived once per helper invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VecLen {
    /// 128-bit operation.
    Lsx,
    /// 256-bit operation.
    Lasx,
}

impl VecLen {
    pub const fn bytes(self) -> usize {
        match self {
            VecLen::Lsx => 16,
            VecLen::Lasx => 32,
        }
    }

    /// Number of 128-bit groups covered by this operand width.
    pub const fn groups(self) -> usize {
        self.bytes() / GROUP_BYTES
    }
}

/// One vector register value. Copy semantics: helpers read their sources
/// by value up front, so in-place updates of the destination register
/// cannot corrupt an aliased source operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VReg(pub [u8; VLENB]);

impl VReg {
    /// Build a register from typed lanes, lane 0 first. Lanes beyond the
    /// given slice stay zero.
    pub fn from_lanes<E: Elem>(lanes: &[E]) -> Self {
        debug_assert!(lanes.len() * E::BYTES <= VLENB);
        let mut r = VReg::default();
        for (i, &v) in lanes.iter().enumerate() {
            E::write(&mut r, i, v);
        }
        r
    }

    /// Collect the first `n` lanes as a vector (test and debug aid).
    pub fn to_lanes<E: Elem>(&self, n: usize) -> Vec<E> {
        (0..n).map(|i| E::read(self, i)).collect()
    }
}

/// The 32-register vector file. Scalar FP registers alias the low 64 bits
/// of the corresponding vector register.
#[derive(Debug, Clone)]
pub struct VectorRegFile {
    pub data: [VReg; 32],
}

impl Default for VectorRegFile {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorRegFile {
    pub fn new() -> Self {
        Self {
            data: [VReg::default(); 32],
        }
    }

    pub fn reset(&mut self) {
        self.data = [VReg::default(); 32];
    }

    #[inline]
    pub fn get(&self, r: usize) -> VReg {
        self.data[r]
    }

    #[inline]
    pub fn set(&mut self, r: usize, v: VReg) {
        self.data[r] = v;
    }
}

/// Number of lanes of element type `E` in an operand of width `len`.
#[inline]
pub fn lanes<E: Elem>(len: VecLen) -> usize {
    len.bytes() / E::BYTES
}

/// A typed lane view: maps a logical lane index to a little-endian byte
/// range of a register. Implemented for the eight 8–64-bit integer types
/// plus `i128`/`u128` for the Q lane width.
pub trait Elem: Copy + Default + PartialEq + std::fmt::Debug {
    const BYTES: usize;

    fn read(reg: &VReg, idx: usize) -> Self;
    fn write(reg: &mut VReg, idx: usize, val: Self);
}

macro_rules! impl_elem {
    ($($t:ty),*) => {$(
        impl Elem for $t {
            const BYTES: usize = std::mem::size_of::<$t>();

            #[inline]
            fn read(reg: &VReg, idx: usize) -> Self {
                let off = idx * Self::BYTES;
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(&reg.0[off..off + Self::BYTES]);
                <$t>::from_le_bytes(buf)
            }

            #[inline]
            fn write(reg: &mut VReg, idx: usize, val: Self) {
                let off = idx * Self::BYTES;
                reg.0[off..off + Self::BYTES].copy_from_slice(&val.to_le_bytes());
            }
        }
    )*};
}

impl_elem!(i8, u8, i16, u16, i32, u32, i64, u64, i128, u128);

/// Generic integer-lane operations for the 8–64-bit element types.
/// The 128-bit lane width is handled by dedicated `i128`/`u128` code
/// paths and does not implement this trait.
pub trait Int: Elem + Ord {
    const BITS: u32;
    const ZERO: Self;
    const ONE: Self;
    const MIN: Self;
    const MAX: Self;
    const IS_SIGNED: bool;

    fn wrapping_add(self, rhs: Self) -> Self;
    fn wrapping_sub(self, rhs: Self) -> Self;
    fn wrapping_mul(self, rhs: Self) -> Self;
    fn wrapping_neg(self) -> Self;
    fn saturating_add(self, rhs: Self) -> Self;
    fn saturating_sub(self, rhs: Self) -> Self;
    fn checked_div(self, rhs: Self) -> Option<Self>;
    fn checked_rem(self, rhs: Self) -> Option<Self>;

    /// Wrapping absolute value (identity for unsigned types).
    fn abs_wrap(self) -> Self;
    /// Floor average: `(a >> 1) + (b >> 1) + (a & b & 1)`.
    fn avg(self, rhs: Self) -> Self;
    /// Round-half-up average: `(a >> 1) + (b >> 1) + ((a | b) & 1)`.
    fn avg_round(self, rhs: Self) -> Self;
    /// `|a - b|` computed without widening; wraps like the lane type.
    fn abs_diff_wrap(self, rhs: Self) -> Self;
    fn is_neg(self) -> bool;

    /// Shift left; caller keeps `sh < BITS`.
    fn lsl(self, sh: u32) -> Self;
    /// Logical shift right; caller keeps `sh < BITS`.
    fn lsr(self, sh: u32) -> Self;
    /// Arithmetic shift right; caller keeps `sh < BITS`.
    fn asr(self, sh: u32) -> Self;

    /// Raw lane bits, zero-extended.
    fn to_bits(self) -> u128;
    /// Truncate raw bits into this lane type.
    fn from_bits(v: u128) -> Self;
    /// Numeric value, sign- or zero-extended.
    fn to_wide(self) -> i128;
    /// Clamp a wide numeric value into this type's range.
    fn sat_from_wide(v: i128) -> Self;
}

macro_rules! impl_int {
    ($($t:ty => $u:ty, $s:ty, $signed:expr);* $(;)?) => {$(
        impl Int for $t {
            const BITS: u32 = <$t>::BITS;
            const ZERO: Self = 0;
            const ONE: Self = 1;
            const MIN: Self = <$t>::MIN;
            const MAX: Self = <$t>::MAX;
            const IS_SIGNED: bool = $signed;

            #[inline]
            fn wrapping_add(self, rhs: Self) -> Self { <$t>::wrapping_add(self, rhs) }
            #[inline]
            fn wrapping_sub(self, rhs: Self) -> Self { <$t>::wrapping_sub(self, rhs) }
            #[inline]
            fn wrapping_mul(self, rhs: Self) -> Self { <$t>::wrapping_mul(self, rhs) }
            #[inline]
            fn wrapping_neg(self) -> Self { <$t>::wrapping_neg(self) }
            #[inline]
            fn saturating_add(self, rhs: Self) -> Self { <$t>::saturating_add(self, rhs) }
            #[inline]
            fn saturating_sub(self, rhs: Self) -> Self { <$t>::saturating_sub(self, rhs) }
            #[inline]
            fn checked_div(self, rhs: Self) -> Option<Self> { <$t>::checked_div(self, rhs) }
            #[inline]
            fn checked_rem(self, rhs: Self) -> Option<Self> { <$t>::checked_rem(self, rhs) }

            #[inline]
            fn abs_wrap(self) -> Self {
                if $signed && self.is_neg() { self.wrapping_neg() } else { self }
            }
            #[inline]
            fn avg(self, rhs: Self) -> Self {
                (self >> 1).wrapping_add(rhs >> 1).wrapping_add(self & rhs & 1)
            }
            #[inline]
            fn avg_round(self, rhs: Self) -> Self {
                (self >> 1).wrapping_add(rhs >> 1).wrapping_add((self | rhs) & 1)
            }
            #[inline]
            fn abs_diff_wrap(self, rhs: Self) -> Self {
                if self > rhs { self.wrapping_sub(rhs) } else { rhs.wrapping_sub(self) }
            }
            #[inline]
            fn is_neg(self) -> bool { $signed && ((self as $s) < 0) }

            #[inline]
            fn lsl(self, sh: u32) -> Self { ((self as $u) << sh) as $t }
            #[inline]
            fn lsr(self, sh: u32) -> Self { ((self as $u) >> sh) as $t }
            #[inline]
            fn asr(self, sh: u32) -> Self { ((self as $s) >> sh) as $t }

            #[inline]
            fn to_bits(self) -> u128 { self as $u as u128 }
            #[inline]
            fn from_bits(v: u128) -> Self { v as $t }
            #[inline]
            fn to_wide(self) -> i128 { self as i128 }
            #[inline]
            fn sat_from_wide(v: i128) -> Self {
                v.clamp(<$t>::MIN as i128, <$t>::MAX as i128) as $t
            }
        }
    )*};
}

impl_int! {
    i8  => u8,  i8,  true;
    u8  => u8,  i8,  false;
    i16 => u16, i16, true;
    u16 => u16, i16, false;
    i32 => u32, i32, true;
    u32 => u32, i32, false;
    i64 => u64, i64, true;
    u64 => u64, i64, false;
}

/// Widening multiply support: the high half of the double-width product.
pub trait MulHigh: Int {
    fn mul_high(self, rhs: Self) -> Self;
}

macro_rules! impl_mul_high {
    ($($t:ty => $w:ty),* $(,)?) => {$(
        impl MulHigh for $t {
            #[inline]
            fn mul_high(self, rhs: Self) -> Self {
                ((self as $w * rhs as $w) >> <$t>::BITS) as $t
            }
        }
    )*};
}

impl_mul_high! {
    i8 => i16, u8 => u16,
    i16 => i32, u16 => u32,
    i32 => i64, u32 => u64,
    i64 => i128, u64 => u128,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lane_zero_is_least_significant() {
        let mut r = VReg::default();
        u64::write(&mut r, 0, 0x0807_0605_0403_0201);
        assert_eq!(u8::read(&r, 0), 0x01);
        assert_eq!(u8::read(&r, 7), 0x08);
        assert_eq!(u16::read(&r, 0), 0x0201);
        assert_eq!(u32::read(&r, 1), 0x0807_0605);
    }

    #[test]
    fn lane_write_does_not_disturb_neighbors() {
        let mut r = VReg::from_lanes::<u32>(&[1, 2, 3, 4, 5, 6, 7, 8]);
        u32::write(&mut r, 3, 0xDEAD_BEEF);
        assert_eq!(r.to_lanes::<u32>(8), [1, 2, 3, 0xDEAD_BEEF, 5, 6, 7, 8]);
    }

    #[test]
    fn q_lane_round_trip() {
        let mut r = VReg::default();
        i128::write(&mut r, 1, -5);
        assert_eq!(i128::read(&r, 1), -5);
        assert_eq!(i128::read(&r, 0), 0);
    }

    #[test]
    fn avg_carry_in_rules() {
        assert_eq!(3i8.avg(4), 3);
        assert_eq!(3i8.avg_round(4), 4);
        assert_eq!((-1i8).avg(-2), -2);
        assert_eq!(255u8.avg_round(255), 255);
    }

    #[test]
    fn abs_diff_wraps_at_type_width() {
        // 127 - (-128) wraps to -1 in the 8-bit lane, i.e. bit pattern 0xFF.
        assert_eq!(127i8.abs_diff_wrap(-128), -1);
        assert_eq!(200u8.abs_diff_wrap(10), 190);
    }

    #[test]
    fn mul_high() {
        assert_eq!((-1i8).mul_high(-1), 0);
        // (-2^63) * (-1) = 2^63, whose high 64 bits are zero.
        assert_eq!(i64::MIN.mul_high(-1), 0);
        assert_eq!(0x80u8.mul_high(0x80), 0x40);
        assert_eq!(i16::MIN.mul_high(i16::MIN), 0x4000);
    }
}
