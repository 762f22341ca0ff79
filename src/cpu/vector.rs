//! Integer vector lane execution.
//!
//! Every operation here is a pure function from source register values to a
//! destination value; sources are read by value, so `vd == vj` aliasing in
//! the caller is harmless. Results are built in a zeroed temporary, which
//! also gives 128-bit operations their zeroed upper half and the narrowing
//! forms their zeroed high group halves.
//!
//! Lane width and signedness come from the `Int` type parameter; the
//! dispatcher instantiates e.g. `vadd::<i8>` for `vadd.b` and
//! `vssrln::<u16, u8>` for `vssrln.bu.h`. The 128-bit Q-lane forms are
//! concrete functions over `i128`/`u128`.

use crate::cpu::vreg::{lanes, Elem, Int, MulHigh, VReg, VecLen, GROUP_BYTES};
use crate::cpu::Cpu;

fn map1<E: Elem>(len: VecLen, vj: VReg, f: impl Fn(E) -> E) -> VReg {
    let mut d = VReg::default();
    for i in 0..lanes::<E>(len) {
        E::write(&mut d, i, f(E::read(&vj, i)));
    }
    d
}

fn map2<E: Elem>(len: VecLen, vj: VReg, vk: VReg, f: impl Fn(E, E) -> E) -> VReg {
    let mut d = VReg::default();
    for i in 0..lanes::<E>(len) {
        E::write(&mut d, i, f(E::read(&vj, i), E::read(&vk, i)));
    }
    d
}

fn map3<E: Elem>(len: VecLen, vd: VReg, vj: VReg, vk: VReg, f: impl Fn(E, E, E) -> E) -> VReg {
    let mut d = VReg::default();
    for i in 0..lanes::<E>(len) {
        E::write(&mut d, i, f(E::read(&vd, i), E::read(&vj, i), E::read(&vk, i)));
    }
    d
}

// -------------------------------------------------------------------------
// lane-wise arithmetic

pub fn vadd<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| a.wrapping_add(b))
}

pub fn vsub<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| a.wrapping_sub(b))
}

/// Saturating add: clamps at the lane type's bounds instead of wrapping.
pub fn vsadd<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| a.saturating_add(b))
}

pub fn vssub<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| a.saturating_sub(b))
}

/// Floor average: carries in `a & b & 1`, so it never overflows.
pub fn vavg<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| a.avg(b))
}

/// Round-half-up average: carries in `(a | b) & 1`.
pub fn vavgr<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| a.avg_round(b))
}

/// |a - b|, wrapping like the lane type.
pub fn vabsd<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| a.abs_diff_wrap(b))
}

/// |a| + |b|, wrapping.
pub fn vadda<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| a.abs_wrap().wrapping_add(b.abs_wrap()))
}

pub fn vmin<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| a.min(b))
}

pub fn vmax<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| a.max(b))
}

/// Sign cover: a == 0 → 0, a < 0 → -b, a > 0 → b.
pub fn vsigncov<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| {
        if a == E::ZERO {
            E::ZERO
        } else if a.is_neg() {
            b.wrapping_neg()
        } else {
            b
        }
    })
}

pub fn vmul<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| a.wrapping_mul(b))
}

/// High half of the double-width product.
pub fn vmuh<E: MulHigh>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| a.mul_high(b))
}

/// d + a*b (low half), wrapping.
pub fn vmadd<E: Int>(len: VecLen, vd: VReg, vj: VReg, vk: VReg) -> VReg {
    map3::<E>(len, vd, vj, vk, |d, a, b| d.wrapping_add(a.wrapping_mul(b)))
}

/// d - a*b (low half), wrapping.
pub fn vmsub<E: Int>(len: VecLen, vd: VReg, vj: VReg, vk: VReg) -> VReg {
    map3::<E>(len, vd, vj, vk, |d, a, b| d.wrapping_sub(a.wrapping_mul(b)))
}

/// Division with the architectural edge cases: divide by zero yields 0 and
/// signed MIN / -1 yields the dividend; neither traps.
pub fn vdiv<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| {
        if b == E::ZERO {
            E::ZERO
        } else {
            a.checked_div(b).unwrap_or(a)
        }
    })
}

/// Remainder; divide by zero and signed MIN % -1 both yield 0.
pub fn vmod<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| {
        if b == E::ZERO {
            E::ZERO
        } else {
            a.checked_rem(b).unwrap_or(E::ZERO)
        }
    })
}

// -------------------------------------------------------------------------
// compares (all-ones / all-zero lane masks)

fn mask<E: Int>(c: bool) -> E {
    if c {
        E::from_bits(u128::MAX)
    } else {
        E::ZERO
    }
}

pub fn vseq<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| mask(a == b))
}

pub fn vsle<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| mask(a <= b))
}

pub fn vslt<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| mask(a < b))
}

/// Immediate compare forms; the immediate is truncated into the lane type.
pub fn vseqi<E: Int>(len: VecLen, vj: VReg, imm: i64) -> VReg {
    let b = E::from_bits(imm as u128);
    map1::<E>(len, vj, |a| mask(a == b))
}

pub fn vslei<E: Int>(len: VecLen, vj: VReg, imm: i64) -> VReg {
    let b = E::from_bits(imm as u128);
    map1::<E>(len, vj, |a| mask(a <= b))
}

pub fn vslti<E: Int>(len: VecLen, vj: VReg, imm: i64) -> VReg {
    let b = E::from_bits(imm as u128);
    map1::<E>(len, vj, |a| mask(a < b))
}

/// Set condition flag `cd` if any lane of vj is zero.
pub fn vsetanyeqz<E: Int>(cpu: &mut Cpu, cd: usize, vj: usize, len: VecLen) {
    let v = cpu.vregs.get(vj);
    cpu.cf[cd & 7] = (0..lanes::<E>(len)).any(|i| E::read(&v, i) == E::ZERO);
}

/// Set condition flag `cd` if no lane of vj is zero.
pub fn vsetallnez<E: Int>(cpu: &mut Cpu, cd: usize, vj: usize, len: VecLen) {
    let v = cpu.vregs.get(vj);
    cpu.cf[cd & 7] = (0..lanes::<E>(len)).all(|i| E::read(&v, i) != E::ZERO);
}

// -------------------------------------------------------------------------
// shifts and single-bit operations

#[inline]
fn shift_amount<E: Int>(b: E) -> u32 {
    (b.to_bits() % E::BITS as u128) as u32
}

pub fn vsll<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| a.lsl(shift_amount(b)))
}

pub fn vsrl<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| a.lsr(shift_amount(b)))
}

pub fn vsra<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| a.asr(shift_amount(b)))
}

pub fn vslli<E: Int>(len: VecLen, vj: VReg, imm: u32) -> VReg {
    map1::<E>(len, vj, |a| a.lsl(imm % E::BITS))
}

pub fn vsrli<E: Int>(len: VecLen, vj: VReg, imm: u32) -> VReg {
    map1::<E>(len, vj, |a| a.lsr(imm % E::BITS))
}

pub fn vsrai<E: Int>(len: VecLen, vj: VReg, imm: u32) -> VReg {
    map1::<E>(len, vj, |a| a.asr(imm % E::BITS))
}

/// Rounding logical shift right: shift 0 is the identity, otherwise the bit
/// shifted out last is added back in.
#[inline]
fn srlr<E: Int>(x: E, sh: u32) -> E {
    if sh == 0 {
        x
    } else {
        let carry = E::from_bits((x.to_bits() >> (sh - 1)) & 1);
        x.lsr(sh).wrapping_add(carry)
    }
}

/// Rounding arithmetic shift right.
#[inline]
fn srar<E: Int>(x: E, sh: u32) -> E {
    if sh == 0 {
        x
    } else {
        let carry = E::from_bits((x.to_bits() >> (sh - 1)) & 1);
        x.asr(sh).wrapping_add(carry)
    }
}

pub fn vsrlr<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| srlr(a, shift_amount(b)))
}

pub fn vsrar<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| srar(a, shift_amount(b)))
}

pub fn vsrlri<E: Int>(len: VecLen, vj: VReg, imm: u32) -> VReg {
    map1::<E>(len, vj, |a| srlr(a, imm % E::BITS))
}

pub fn vsrari<E: Int>(len: VecLen, vj: VReg, imm: u32) -> VReg {
    map1::<E>(len, vj, |a| srar(a, imm % E::BITS))
}

pub fn vbitclr<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| E::from_bits(a.to_bits() & !(1u128 << shift_amount(b))))
}

pub fn vbitset<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| E::from_bits(a.to_bits() | (1u128 << shift_amount(b))))
}

pub fn vbitrev<E: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    map2::<E>(len, vj, vk, |a, b| E::from_bits(a.to_bits() ^ (1u128 << shift_amount(b))))
}

pub fn vbitclri<E: Int>(len: VecLen, vj: VReg, imm: u32) -> VReg {
    map1::<E>(len, vj, |a| E::from_bits(a.to_bits() & !(1u128 << (imm % E::BITS))))
}

pub fn vbitseti<E: Int>(len: VecLen, vj: VReg, imm: u32) -> VReg {
    map1::<E>(len, vj, |a| E::from_bits(a.to_bits() | (1u128 << (imm % E::BITS))))
}

pub fn vbitrevi<E: Int>(len: VecLen, vj: VReg, imm: u32) -> VReg {
    map1::<E>(len, vj, |a| E::from_bits(a.to_bits() ^ (1u128 << (imm % E::BITS))))
}

// -------------------------------------------------------------------------
// widening even/odd and horizontal pairs
//
// These families index lanes linearly across the whole register; the
// 128-bit grouping of the narrowing and permutation units does not apply.

fn wide_map<NJ: Int, NK: Int, W: Int>(
    len: VecLen,
    vj: VReg,
    vk: VReg,
    jo: usize,
    ko: usize,
    f: impl Fn(i128, i128) -> i128,
) -> VReg {
    debug_assert_eq!(NJ::BYTES, NK::BYTES);
    let mut d = VReg::default();
    for i in 0..lanes::<W>(len) {
        let a = NJ::read(&vj, 2 * i + jo).to_wide();
        let b = NK::read(&vk, 2 * i + ko).to_wide();
        W::write(&mut d, i, W::from_bits(f(a, b) as u128));
    }
    d
}

/// Widening add of even-numbered lanes. The `NJ`/`NK` split carries the
/// mixed-signedness forms (e.g. `vaddwev.h.bu.b` is `<u8, i8, i16>`).
pub fn vaddwev<NJ: Int, NK: Int, W: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    wide_map::<NJ, NK, W>(len, vj, vk, 0, 0, |a, b| a + b)
}

pub fn vaddwod<NJ: Int, NK: Int, W: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    wide_map::<NJ, NK, W>(len, vj, vk, 1, 1, |a, b| a + b)
}

pub fn vsubwev<NJ: Int, NK: Int, W: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    wide_map::<NJ, NK, W>(len, vj, vk, 0, 0, |a, b| a - b)
}

pub fn vsubwod<NJ: Int, NK: Int, W: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    wide_map::<NJ, NK, W>(len, vj, vk, 1, 1, |a, b| a - b)
}

pub fn vmulwev<NJ: Int, NK: Int, W: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    wide_map::<NJ, NK, W>(len, vj, vk, 0, 0, |a, b| a * b)
}

pub fn vmulwod<NJ: Int, NK: Int, W: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    wide_map::<NJ, NK, W>(len, vj, vk, 1, 1, |a, b| a * b)
}

/// Horizontal add: odd lane of vj plus even lane of vk, widened.
pub fn vhaddw<NJ: Int, NK: Int, W: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    wide_map::<NJ, NK, W>(len, vj, vk, 1, 0, |a, b| a + b)
}

pub fn vhsubw<NJ: Int, NK: Int, W: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    wide_map::<NJ, NK, W>(len, vj, vk, 1, 0, |a, b| a - b)
}

fn wide_madd<NJ: Int, NK: Int, W: Int>(len: VecLen, vd: VReg, vj: VReg, vk: VReg, o: usize) -> VReg {
    debug_assert_eq!(NJ::BYTES, NK::BYTES);
    let mut d = VReg::default();
    for i in 0..lanes::<W>(len) {
        let prod = NJ::read(&vj, 2 * i + o).to_wide() * NK::read(&vk, 2 * i + o).to_wide();
        let acc = W::read(&vd, i).to_wide().wrapping_add(prod);
        W::write(&mut d, i, W::from_bits(acc as u128));
    }
    d
}

/// d += widening product of even lanes; the accumulate wraps in the wide
/// lane type.
pub fn vmaddwev<NJ: Int, NK: Int, W: Int>(len: VecLen, vd: VReg, vj: VReg, vk: VReg) -> VReg {
    wide_madd::<NJ, NK, W>(len, vd, vj, vk, 0)
}

pub fn vmaddwod<NJ: Int, NK: Int, W: Int>(len: VecLen, vd: VReg, vj: VReg, vk: VReg) -> VReg {
    wide_madd::<NJ, NK, W>(len, vd, vj, vk, 1)
}

// -------------------------------------------------------------------------
// Q-lane (128-bit) widening forms

macro_rules! q_even_odd {
    ($($name:ident: $tj:ty, $tk:ty, $jo:expr, $ko:expr, $f:expr;)*) => {$(
        pub fn $name(len: VecLen, vj: VReg, vk: VReg) -> VReg {
            let mut d = VReg::default();
            let f: fn(i128, i128) -> i128 = $f;
            for i in 0..len.groups() {
                let a = <$tj as Elem>::read(&vj, 2 * i + $jo) as i128;
                let b = <$tk as Elem>::read(&vk, 2 * i + $ko) as i128;
                i128::write(&mut d, i, f(a, b));
            }
            d
        }
    )*};
}

q_even_odd! {
    vaddwev_q_d: i64, i64, 0, 0, |a, b| a.wrapping_add(b);
    vaddwod_q_d: i64, i64, 1, 1, |a, b| a.wrapping_add(b);
    vaddwev_q_du: u64, u64, 0, 0, |a, b| a.wrapping_add(b);
    vaddwod_q_du: u64, u64, 1, 1, |a, b| a.wrapping_add(b);
    vaddwev_q_du_d: u64, i64, 0, 0, |a, b| a.wrapping_add(b);
    vaddwod_q_du_d: u64, i64, 1, 1, |a, b| a.wrapping_add(b);
    vsubwev_q_d: i64, i64, 0, 0, |a, b| a.wrapping_sub(b);
    vsubwod_q_d: i64, i64, 1, 1, |a, b| a.wrapping_sub(b);
    vsubwev_q_du: u64, u64, 0, 0, |a, b| a.wrapping_sub(b);
    vsubwod_q_du: u64, u64, 1, 1, |a, b| a.wrapping_sub(b);
    vmulwev_q_d: i64, i64, 0, 0, |a, b| a.wrapping_mul(b);
    vmulwod_q_d: i64, i64, 1, 1, |a, b| a.wrapping_mul(b);
    vmulwev_q_du: u64, u64, 0, 0, |a, b| a.wrapping_mul(b);
    vmulwod_q_du: u64, u64, 1, 1, |a, b| a.wrapping_mul(b);
    vmulwev_q_du_d: u64, i64, 0, 0, |a, b| a.wrapping_mul(b);
    vmulwod_q_du_d: u64, i64, 1, 1, |a, b| a.wrapping_mul(b);
    vhaddw_q_d: i64, i64, 1, 0, |a, b| a.wrapping_add(b);
    vhaddw_qu_du: u64, u64, 1, 0, |a, b| a.wrapping_add(b);
    vhsubw_q_d: i64, i64, 1, 0, |a, b| a.wrapping_sub(b);
    vhsubw_qu_du: u64, u64, 1, 0, |a, b| a.wrapping_sub(b);
}

macro_rules! q_madd {
    ($($name:ident: $tj:ty, $tk:ty, $o:expr;)*) => {$(
        pub fn $name(len: VecLen, vd: VReg, vj: VReg, vk: VReg) -> VReg {
            let mut d = VReg::default();
            for i in 0..len.groups() {
                let a = <$tj as Elem>::read(&vj, 2 * i + $o) as i128;
                let b = <$tk as Elem>::read(&vk, 2 * i + $o) as i128;
                let acc = i128::read(&vd, i).wrapping_add(a.wrapping_mul(b));
                i128::write(&mut d, i, acc);
            }
            d
        }
    )*};
}

q_madd! {
    vmaddwev_q_d: i64, i64, 0;
    vmaddwod_q_d: i64, i64, 1;
    vmaddwev_q_du: u64, u64, 0;
    vmaddwod_q_du: u64, u64, 1;
    vmaddwev_q_du_d: u64, i64, 0;
    vmaddwod_q_du_d: u64, i64, 1;
}

macro_rules! q_ext {
    ($($name:ident: $t:ty, $o:expr;)*) => {$(
        pub fn $name(len: VecLen, vj: VReg) -> VReg {
            let mut d = VReg::default();
            for i in 0..len.groups() {
                i128::write(&mut d, i, <$t as Elem>::read(&vj, 2 * i + $o) as i128);
            }
            d
        }
    )*};
}

q_ext! {
    vextl_q_d: i64, 0;
    vextl_qu_du: u64, 0;
    vexth_q_d: i64, 1;
    vexth_qu_du: u64, 1;
}

// -------------------------------------------------------------------------
// widening extensions and shift-left

/// Widen the low half of each 128-bit group, shifting left by `imm`.
pub fn vsllwil<N: Int, W: Int>(len: VecLen, vj: VReg, imm: u32) -> VReg {
    let ofs = GROUP_BYTES / W::BYTES;
    let sh = imm % W::BITS;
    let mut d = VReg::default();
    for i in 0..len.groups() {
        for j in 0..ofs {
            let v = N::read(&vj, j + ofs * 2 * i).to_wide();
            W::write(&mut d, j + ofs * i, W::from_bits((v as u128) << sh));
        }
    }
    d
}

/// Widen the high half of each 128-bit group.
pub fn vexth<N: Int, W: Int>(len: VecLen, vj: VReg) -> VReg {
    let ofs = GROUP_BYTES / W::BYTES;
    let mut d = VReg::default();
    for i in 0..len.groups() {
        for j in 0..ofs {
            let v = N::read(&vj, j + ofs + ofs * 2 * i).to_wide();
            W::write(&mut d, j + ofs * i, W::from_bits(v as u128));
        }
    }
    d
}

/// Widen the low lanes of the whole register, linearly (256-bit form).
pub fn vext2xv<N: Int, W: Int>(len: VecLen, vj: VReg) -> VReg {
    let mut d = VReg::default();
    for i in 0..lanes::<W>(len) {
        W::write(&mut d, i, W::from_bits(N::read(&vj, i).to_wide() as u128));
    }
    d
}

// -------------------------------------------------------------------------
// narrowing shifts
//
// `ofs` below is the number of wide lanes per 128-bit group, which equals
// the number of narrow lanes in each half-group. Register forms write the
// low half of each destination group and zero the high half; immediate
// forms fill the high half from the old destination's wide lanes.

#[inline]
fn srl_round_u(x: u128, sh: u32, round: bool) -> u128 {
    if sh == 0 {
        x
    } else if round {
        (x >> sh).wrapping_add((x >> (sh - 1)) & 1)
    } else {
        x >> sh
    }
}

#[inline]
fn sra_round_s(x: i128, sh: u32, round: bool) -> i128 {
    if sh == 0 {
        x
    } else if round {
        (x >> sh).wrapping_add((x >> (sh - 1)) & 1)
    } else {
        x >> sh
    }
}

#[inline]
fn narrow_lane<W: Int, N: Int>(x: W, sh: u32, arith: bool, round: bool) -> N {
    if arith {
        N::from_bits(sra_round_s(x.to_wide(), sh, round) as u128)
    } else {
        N::from_bits(srl_round_u(x.to_bits(), sh, round))
    }
}

fn narrow_shift<W: Int, N: Int>(len: VecLen, vj: VReg, vk: VReg, arith: bool, round: bool) -> VReg {
    debug_assert_eq!(W::BYTES, 2 * N::BYTES);
    let ofs = GROUP_BYTES / W::BYTES;
    let mut d = VReg::default();
    for i in 0..len.groups() {
        for j in 0..ofs {
            let sh = (W::read(&vk, j + ofs * i).to_bits() % W::BITS as u128) as u32;
            let x = W::read(&vj, j + ofs * i);
            N::write(&mut d, j + ofs * 2 * i, narrow_lane::<W, N>(x, sh, arith, round));
        }
    }
    d
}

fn narrow_shift_imm<W: Int, N: Int>(
    len: VecLen,
    vd: VReg,
    vj: VReg,
    imm: u32,
    arith: bool,
    round: bool,
) -> VReg {
    debug_assert_eq!(W::BYTES, 2 * N::BYTES);
    let ofs = GROUP_BYTES / W::BYTES;
    let sh = imm % W::BITS;
    let mut d = VReg::default();
    for i in 0..len.groups() {
        for j in 0..ofs {
            let lo = W::read(&vj, j + ofs * i);
            let hi = W::read(&vd, j + ofs * i);
            N::write(&mut d, j + ofs * 2 * i, narrow_lane::<W, N>(lo, sh, arith, round));
            N::write(&mut d, j + ofs * (2 * i + 1), narrow_lane::<W, N>(hi, sh, arith, round));
        }
    }
    d
}

/// Narrowing logical shift right, per-lane amount from vk.
pub fn vsrln<W: Int, N: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    narrow_shift::<W, N>(len, vj, vk, false, false)
}

/// Narrowing arithmetic shift right.
pub fn vsran<W: Int, N: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    narrow_shift::<W, N>(len, vj, vk, true, false)
}

pub fn vsrlrn<W: Int, N: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    narrow_shift::<W, N>(len, vj, vk, false, true)
}

pub fn vsrarn<W: Int, N: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    narrow_shift::<W, N>(len, vj, vk, true, true)
}

/// Immediate narrowing shift: vj fills the low half of each group, the old
/// destination's lanes fill the high half.
pub fn vsrlni<W: Int, N: Int>(len: VecLen, vd: VReg, vj: VReg, imm: u32) -> VReg {
    narrow_shift_imm::<W, N>(len, vd, vj, imm, false, false)
}

pub fn vsrani<W: Int, N: Int>(len: VecLen, vd: VReg, vj: VReg, imm: u32) -> VReg {
    narrow_shift_imm::<W, N>(len, vd, vj, imm, true, false)
}

pub fn vsrlrni<W: Int, N: Int>(len: VecLen, vd: VReg, vj: VReg, imm: u32) -> VReg {
    narrow_shift_imm::<W, N>(len, vd, vj, imm, false, true)
}

pub fn vsrarni<W: Int, N: Int>(len: VecLen, vd: VReg, vj: VReg, imm: u32) -> VReg {
    narrow_shift_imm::<W, N>(len, vd, vj, imm, true, true)
}

macro_rules! q_narrow_imm {
    ($($name:ident: $arith:expr, $round:expr;)*) => {$(
        pub fn $name(len: VecLen, vd: VReg, vj: VReg, imm: u32) -> VReg {
            let sh = imm % 128;
            let mut d = VReg::default();
            for i in 0..len.groups() {
                let (lo, hi) = if $arith {
                    (
                        sra_round_s(i128::read(&vj, i), sh, $round) as u128,
                        sra_round_s(i128::read(&vd, i), sh, $round) as u128,
                    )
                } else {
                    (
                        srl_round_u(u128::read(&vj, i), sh, $round),
                        srl_round_u(u128::read(&vd, i), sh, $round),
                    )
                };
                u64::write(&mut d, 2 * i, lo as u64);
                u64::write(&mut d, 2 * i + 1, hi as u64);
            }
            d
        }
    )*};
}

q_narrow_imm! {
    vsrlni_d_q: false, false;
    vsrani_d_q: true, false;
    vsrlrni_d_q: false, true;
    vsrarni_d_q: true, true;
}

// -------------------------------------------------------------------------
// saturating narrowing shifts
//
// Logical forms shift in the unsigned wide domain and clamp from above;
// arithmetic forms shift sign-extended and clamp both ways (or flush
// negatives to zero for the unsigned-result variants).

#[inline]
fn sat_narrow_lane<W: Int, N: Int>(x: W, sh: u32, arith: bool, round: bool) -> N {
    if arith {
        let v = sra_round_s(x.to_wide(), sh, round);
        if N::IS_SIGNED {
            let b = N::BITS - 1;
            N::from_bits(v.clamp(-(1i128 << b), (1i128 << b) - 1) as u128)
        } else {
            N::from_bits(v.clamp(0, (1i128 << N::BITS) - 1) as u128)
        }
    } else {
        let v = srl_round_u(x.to_bits(), sh, round);
        let nbits = if N::IS_SIGNED { N::BITS - 1 } else { N::BITS };
        N::from_bits(v.min((1u128 << nbits) - 1))
    }
}

fn sat_narrow_shift<W: Int, N: Int>(
    len: VecLen,
    vj: VReg,
    vk: VReg,
    arith: bool,
    round: bool,
) -> VReg {
    debug_assert_eq!(W::BYTES, 2 * N::BYTES);
    let ofs = GROUP_BYTES / W::BYTES;
    let mut d = VReg::default();
    for i in 0..len.groups() {
        for j in 0..ofs {
            let sh = (W::read(&vk, j + ofs * i).to_bits() % W::BITS as u128) as u32;
            let x = W::read(&vj, j + ofs * i);
            N::write(&mut d, j + ofs * 2 * i, sat_narrow_lane::<W, N>(x, sh, arith, round));
        }
    }
    d
}

fn sat_narrow_shift_imm<W: Int, N: Int>(
    len: VecLen,
    vd: VReg,
    vj: VReg,
    imm: u32,
    arith: bool,
    round: bool,
) -> VReg {
    debug_assert_eq!(W::BYTES, 2 * N::BYTES);
    let ofs = GROUP_BYTES / W::BYTES;
    let sh = imm % W::BITS;
    let mut d = VReg::default();
    for i in 0..len.groups() {
        for j in 0..ofs {
            let lo = W::read(&vj, j + ofs * i);
            let hi = W::read(&vd, j + ofs * i);
            N::write(&mut d, j + ofs * 2 * i, sat_narrow_lane::<W, N>(lo, sh, arith, round));
            N::write(&mut d, j + ofs * (2 * i + 1), sat_narrow_lane::<W, N>(hi, sh, arith, round));
        }
    }
    d
}

/// Saturating narrowing logical shift; `N`'s signedness picks the clamp
/// bound (`vssrln.b.h` is `<u16, i8>`, `vssrln.bu.h` is `<u16, u8>`).
pub fn vssrln<W: Int, N: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    sat_narrow_shift::<W, N>(len, vj, vk, false, false)
}

/// Saturating narrowing arithmetic shift.
pub fn vssran<W: Int, N: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    sat_narrow_shift::<W, N>(len, vj, vk, true, false)
}

pub fn vssrlrn<W: Int, N: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    sat_narrow_shift::<W, N>(len, vj, vk, false, true)
}

pub fn vssrarn<W: Int, N: Int>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    sat_narrow_shift::<W, N>(len, vj, vk, true, true)
}

pub fn vssrlni<W: Int, N: Int>(len: VecLen, vd: VReg, vj: VReg, imm: u32) -> VReg {
    sat_narrow_shift_imm::<W, N>(len, vd, vj, imm, false, false)
}

pub fn vssrani<W: Int, N: Int>(len: VecLen, vd: VReg, vj: VReg, imm: u32) -> VReg {
    sat_narrow_shift_imm::<W, N>(len, vd, vj, imm, true, false)
}

pub fn vssrlrni<W: Int, N: Int>(len: VecLen, vd: VReg, vj: VReg, imm: u32) -> VReg {
    sat_narrow_shift_imm::<W, N>(len, vd, vj, imm, false, true)
}

pub fn vssrarni<W: Int, N: Int>(len: VecLen, vd: VReg, vj: VReg, imm: u32) -> VReg {
    sat_narrow_shift_imm::<W, N>(len, vd, vj, imm, true, true)
}

macro_rules! q_sat_narrow_imm {
    ($($name:ident: $arith:expr, $round:expr, $signed_target:expr;)*) => {$(
        pub fn $name(len: VecLen, vd: VReg, vj: VReg, imm: u32) -> VReg {
            let sh = imm % 128;
            let mut d = VReg::default();
            for i in 0..len.groups() {
                let clamp = |x: u128| -> u64 {
                    if $arith {
                        let v = sra_round_s(x as i128, sh, $round);
                        if $signed_target {
                            v.clamp(-(1i128 << 63), (1i128 << 63) - 1) as u64
                        } else {
                            v.clamp(0, (1i128 << 64) - 1) as u64
                        }
                    } else {
                        let v = srl_round_u(x, sh, $round);
                        let max = if $signed_target { (1u128 << 63) - 1 } else { (1u128 << 64) - 1 };
                        v.min(max) as u64
                    }
                };
                u64::write(&mut d, 2 * i, clamp(u128::read(&vj, i)));
                u64::write(&mut d, 2 * i + 1, clamp(u128::read(&vd, i)));
            }
            d
        }
    )*};
}

q_sat_narrow_imm! {
    vssrlni_d_q: false, false, true;
    vssrlni_du_q: false, false, false;
    vssrani_d_q: true, false, true;
    vssrani_du_q: true, false, false;
    vssrlrni_d_q: false, true, true;
    vssrlrni_du_q: false, true, false;
    vssrarni_d_q: true, true, true;
    vssrarni_du_q: true, true, false;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r8(v: &[i8]) -> VReg {
        VReg::from_lanes(v)
    }

    #[test]
    fn add_wraps_sadd_saturates() {
        let a = r8(&[1, 2, 3, 4]);
        let b = r8(&[127, 1, 1, 1]);
        let w = vadd::<i8>(VecLen::Lsx, a, b);
        assert_eq!(w.to_lanes::<i8>(4), [-128, 3, 4, 5]);
        let s = vsadd::<i8>(VecLen::Lsx, a, b);
        assert_eq!(s.to_lanes::<i8>(4), [127, 3, 4, 5]);
    }

    #[test]
    fn ssub_saturates_unsigned_at_zero() {
        let a = VReg::from_lanes::<u8>(&[5, 0]);
        let b = VReg::from_lanes::<u8>(&[9, 1]);
        let s = vssub::<u8>(VecLen::Lsx, a, b);
        assert_eq!(s.to_lanes::<u8>(2), [0, 0]);
    }

    #[test]
    fn avg_and_absd() {
        let a = VReg::from_lanes::<u8>(&[3, 255, 10]);
        let b = VReg::from_lanes::<u8>(&[4, 255, 200]);
        assert_eq!(vavg::<u8>(VecLen::Lsx, a, b).to_lanes::<u8>(3), [3, 255, 105]);
        assert_eq!(vavgr::<u8>(VecLen::Lsx, a, b).to_lanes::<u8>(3), [4, 255, 105]);
        assert_eq!(vabsd::<u8>(VecLen::Lsx, a, b).to_lanes::<u8>(3), [1, 0, 190]);
    }

    #[test]
    fn adda_uses_wrapping_abs() {
        let a = r8(&[-128, -3]);
        let b = r8(&[0, 4]);
        // |-128| wraps back to -128
        assert_eq!(vadda::<i8>(VecLen::Lsx, a, b).to_lanes::<i8>(2), [-128, 7]);
    }

    #[test]
    fn signcov() {
        let a = r8(&[0, -1, 5, -2]);
        let b = r8(&[9, 9, -9, -128]);
        assert_eq!(vsigncov::<i8>(VecLen::Lsx, a, b).to_lanes::<i8>(4), [0, -9, -9, -128]);
    }

    #[test]
    fn div_mod_edge_cases() {
        let a = r8(&[7, 7, -128, -128]);
        let b = r8(&[2, 0, -1, 0]);
        assert_eq!(vdiv::<i8>(VecLen::Lsx, a, b).to_lanes::<i8>(4), [3, 0, -128, 0]);
        assert_eq!(vmod::<i8>(VecLen::Lsx, a, b).to_lanes::<i8>(4), [1, 0, 0, 0]);
        let ua = VReg::from_lanes::<u8>(&[7, 7]);
        let ub = VReg::from_lanes::<u8>(&[0, 3]);
        assert_eq!(vdiv::<u8>(VecLen::Lsx, ua, ub).to_lanes::<u8>(2), [0, 2]);
    }

    #[test]
    fn muh_and_madd() {
        let a = VReg::from_lanes::<i16>(&[i16::MIN, 300]);
        let b = VReg::from_lanes::<i16>(&[i16::MIN, 300]);
        assert_eq!(vmuh::<i16>(VecLen::Lsx, a, b).to_lanes::<i16>(2), [0x4000, 1]);
        let d = VReg::from_lanes::<i16>(&[10, 10]);
        assert_eq!(
            vmadd::<i16>(VecLen::Lsx, d, a, b).to_lanes::<i16>(1),
            [10] // MIN*MIN truncates to 0
        );
    }

    #[test]
    fn compare_masks() {
        let a = r8(&[1, 2, 3]);
        let b = r8(&[1, 9, -1]);
        assert_eq!(vseq::<i8>(VecLen::Lsx, a, b).to_lanes::<i8>(3), [-1, 0, 0]);
        assert_eq!(vslt::<i8>(VecLen::Lsx, a, b).to_lanes::<i8>(3), [0, -1, 0]);
        // unsigned view: 0xFF is the largest byte
        assert_eq!(vslt::<u8>(VecLen::Lsx, a, b).to_lanes::<i8>(3), [0, -1, -1]);
        assert_eq!(vslei::<i8>(VecLen::Lsx, a, 2).to_lanes::<i8>(3), [-1, -1, 0]);
    }

    #[test]
    fn set_flags_scan_all_lanes() {
        let mut cpu = Cpu::new();
        cpu.vregs.set(1, VReg::from_lanes::<u8>(&[1; 32]));
        vsetanyeqz::<u8>(&mut cpu, 0, 1, VecLen::Lsx);
        assert!(!cpu.cf[0]);
        vsetallnez::<u8>(&mut cpu, 1, 1, VecLen::Lsx);
        assert!(cpu.cf[1]);
        let mut z = VReg::from_lanes::<u8>(&[1; 32]);
        u8::write(&mut z, 20, 0); // only in the high half
        cpu.vregs.set(2, z);
        vsetanyeqz::<u8>(&mut cpu, 2, 2, VecLen::Lsx);
        assert!(!cpu.cf[2]);
        vsetanyeqz::<u8>(&mut cpu, 3, 2, VecLen::Lasx);
        assert!(cpu.cf[3]);
    }

    #[test]
    fn shifts_take_amount_modulo_width() {
        let a = VReg::from_lanes::<u8>(&[0x80, 0x80]);
        let k = VReg::from_lanes::<u8>(&[9, 1]); // 9 % 8 == 1
        assert_eq!(vsrl::<u8>(VecLen::Lsx, a, k).to_lanes::<u8>(2), [0x40, 0x40]);
        let sa = r8(&[-64, -64]);
        assert_eq!(vsra::<i8>(VecLen::Lsx, sa, k).to_lanes::<i8>(2), [-32, -32]);
        assert_eq!(vslli::<u8>(VecLen::Lsx, a, 1).to_lanes::<u8>(1), [0]);
    }

    #[test]
    fn rounding_shift_zero_is_identity() {
        let a = VReg::from_lanes::<u8>(&[0xFF]);
        assert_eq!(vsrlri::<u8>(VecLen::Lsx, a, 0).to_lanes::<u8>(1), [0xFF]);
        // 0xFF >> 4 = 0x0F, carry bit (bit 3) set -> 0x10
        assert_eq!(vsrlri::<u8>(VecLen::Lsx, a, 4).to_lanes::<u8>(1), [0x10]);
        let s = r8(&[-1]);
        assert_eq!(vsrari::<i8>(VecLen::Lsx, s, 4).to_lanes::<i8>(1), [0]);
    }

    #[test]
    fn bit_ops() {
        let a = VReg::from_lanes::<u8>(&[0xFF, 0, 0xFF]);
        let k = VReg::from_lanes::<u8>(&[0, 11, 7]); // 11 % 8 == 3
        assert_eq!(vbitclr::<u8>(VecLen::Lsx, a, k).to_lanes::<u8>(3), [0xFE, 0, 0x7F]);
        assert_eq!(vbitset::<u8>(VecLen::Lsx, a, k).to_lanes::<u8>(3), [0xFF, 8, 0xFF]);
        assert_eq!(vbitrev::<u8>(VecLen::Lsx, a, k).to_lanes::<u8>(3), [0xFE, 8, 0x7F]);
        assert_eq!(vbitseti::<u8>(VecLen::Lsx, a, 1).to_lanes::<u8>(2), [0xFF, 2]);
    }

    #[test]
    fn widening_even_odd() {
        let a = r8(&[-1, 2, -3, 4]);
        let b = r8(&[10, 20, 30, 40]);
        let ev = vaddwev::<i8, i8, i16>(VecLen::Lsx, a, b);
        assert_eq!(ev.to_lanes::<i16>(2), [9, 27]);
        let od = vaddwod::<i8, i8, i16>(VecLen::Lsx, a, b);
        assert_eq!(od.to_lanes::<i16>(2), [22, 44]);
        // unsigned widening sees 0xFF as 255
        let evu = vaddwev::<u8, u8, u16>(VecLen::Lsx, a, b);
        assert_eq!(evu.to_lanes::<u16>(2), [265, 283]);
        // mixed: j unsigned, k signed
        let evm = vaddwev::<u8, i8, i16>(VecLen::Lsx, a, b);
        assert_eq!(evm.to_lanes::<i16>(2), [265, 283]);
    }

    #[test]
    fn widening_multiply() {
        let a = VReg::from_lanes::<i16>(&[-200, 0, 300, 0]);
        let b = VReg::from_lanes::<i16>(&[100, 0, -100, 0]);
        let ev = vmulwev::<i16, i16, i32>(VecLen::Lsx, a, b);
        assert_eq!(ev.to_lanes::<i32>(2), [-20000, -30000]);
        let d = VReg::from_lanes::<i32>(&[5, 5]);
        let m = vmaddwev::<i16, i16, i32>(VecLen::Lsx, d, a, b);
        assert_eq!(m.to_lanes::<i32>(2), [-19995, -29995]);
    }

    #[test]
    fn horizontal_pairs_are_linear_across_lasx() {
        let mut a = VReg::default();
        let mut b = VReg::default();
        for i in 0..16 {
            i16::write(&mut a, i, i as i16 + 1); // 1..16
            i16::write(&mut b, i, 100);
        }
        let h = vhaddw::<i16, i16, i32>(VecLen::Lasx, a, b);
        // odd a-lane + even b-lane: 2+100, 4+100, ...
        assert_eq!(h.to_lanes::<i32>(8), [102, 104, 106, 108, 110, 112, 114, 116]);
        let s = vhsubw::<i16, i16, i32>(VecLen::Lasx, a, b);
        assert_eq!(s.to_lanes::<i32>(2), [-98, -96]);
    }

    #[test]
    fn q_lane_widening() {
        let a = VReg::from_lanes::<i64>(&[i64::MAX, 1]);
        let b = VReg::from_lanes::<i64>(&[1, 0]);
        let r = vaddwev_q_d(VecLen::Lsx, a, b);
        assert_eq!(i128::read(&r, 0), i64::MAX as i128 + 1);
        // unsigned variant zero-extends
        let n = VReg::from_lanes::<i64>(&[-1, 0]);
        let ru = vaddwev_q_du(VecLen::Lsx, n, b);
        assert_eq!(i128::read(&ru, 0), u64::MAX as i128 + 1);
        let h = vhaddw_qu_du(VecLen::Lsx, VReg::from_lanes::<u64>(&[0, u64::MAX]), b);
        assert_eq!(u128::read(&h, 0), u64::MAX as u128 + 1);
    }

    #[test]
    fn extension_families() {
        let mut a = VReg::default();
        for i in 0..32 {
            u8::write(&mut a, i, i as u8 | 0x80);
        }
        // high half of each group, sign-extended
        let h = vexth::<i8, i16>(VecLen::Lasx, a);
        assert_eq!(i16::read(&h, 0), 0x88u8 as i8 as i16);
        assert_eq!(i16::read(&h, 8), 0x98u8 as i8 as i16);
        // low half of each group, shifted
        let w = vsllwil::<u8, u16>(VecLen::Lasx, a, 4);
        assert_eq!(u16::read(&w, 0), 0x80 << 4);
        assert_eq!(u16::read(&w, 8), 0x90 << 4);
        // linear whole-register widening
        let x = vext2xv::<u8, u16>(VecLen::Lasx, a);
        assert_eq!(u16::read(&x, 15), 0x8F);
    }

    #[test]
    fn narrow_register_form_zeroes_high_halves() {
        let mut j = VReg::default();
        let mut k = VReg::default();
        for i in 0..16 {
            u16::write(&mut j, i, 0x1230 + i as u16);
            u16::write(&mut k, i, 4); // shift each lane by 4
        }
        let r = vsrln::<u16, u8>(VecLen::Lasx, j, k);
        assert_eq!(u8::read(&r, 0), 0x23);
        assert_eq!(u8::read(&r, 7), 0x23);
        assert_eq!(u8::read(&r, 8), 0); // high half of group 0
        assert_eq!(u8::read(&r, 16), 0x23); // low half of group 1
        assert_eq!(u8::read(&r, 24), 0);
    }

    #[test]
    fn narrow_imm_form_packs_old_destination() {
        let mut j = VReg::default();
        let mut d = VReg::default();
        for i in 0..8 {
            u16::write(&mut j, i, 0x0A00 + i as u16);
            u16::write(&mut d, i, 0x0B00 + i as u16);
        }
        let r = vsrlni::<u16, u8>(VecLen::Lsx, d, j, 8);
        assert_eq!(r.to_lanes::<u8>(16), [
            0x0A, 0x0A, 0x0A, 0x0A, 0x0A, 0x0A, 0x0A, 0x0A,
            0x0B, 0x0B, 0x0B, 0x0B, 0x0B, 0x0B, 0x0B, 0x0B,
        ]);
    }

    #[test]
    fn saturating_narrow_clamps_at_zero_shift() {
        // shift 0 keeps the value, so saturation is what narrows it
        let j = VReg::from_lanes::<i16>(&[300, -300, 100, 0, 0, 0, 0, 0]);
        let k = VReg::default();
        let r = vssran::<i16, i8>(VecLen::Lsx, j, k);
        assert_eq!(r.to_lanes::<i8>(4), [127, -128, 100, 0]);
        let ru = vssran::<i16, u8>(VecLen::Lsx, j, k);
        assert_eq!(ru.to_lanes::<u8>(4), [255, 0, 100, 0]);
    }

    #[test]
    fn saturating_narrow_logical_bounds() {
        let j = VReg::from_lanes::<u16>(&[0x200, 0x7F, 0xFF, 0x100, 0, 0, 0, 0]);
        let k = VReg::default();
        // signed-result bound is 0x7F even though the shift is logical
        let r = vssrln::<u16, i8>(VecLen::Lsx, j, k);
        assert_eq!(r.to_lanes::<u8>(4), [0x7F, 0x7F, 0x7F, 0x7F]);
        let ru = vssrln::<u16, u8>(VecLen::Lsx, j, k);
        assert_eq!(ru.to_lanes::<u8>(4), [0xFF, 0x7F, 0xFF, 0xFF]);
    }

    #[test]
    fn saturating_narrow_rounding() {
        // 0x18 >> 3 = 3, carry bit set -> 4
        let j = VReg::from_lanes::<u16>(&[0x1C, 0, 0, 0, 0, 0, 0, 0]);
        let k = VReg::from_lanes::<u16>(&[3, 0, 0, 0, 0, 0, 0, 0]);
        let r = vssrlrn::<u16, u8>(VecLen::Lsx, j, k);
        assert_eq!(u8::read(&r, 0), 4);
    }

    #[test]
    fn q_saturating_narrow() {
        let mut j = VReg::default();
        i128::write(&mut j, 0, 1i128 << 70);
        let d = VReg::default();
        let r = vssrani_d_q(VecLen::Lsx, d, j, 0);
        assert_eq!(i64::read(&r, 0), i64::MAX);
        let r = vssrani_d_q(VecLen::Lsx, d, j, 8);
        assert_eq!(i64::read(&r, 0), 1i64 << 62);
        let mut n = VReg::default();
        i128::write(&mut n, 0, -1);
        let r = vssrani_du_q(VecLen::Lsx, d, n, 0);
        assert_eq!(u64::read(&r, 0), 0);
        let r = vssrlni_du_q(VecLen::Lsx, d, n, 64);
        assert_eq!(u64::read(&r, 0), u64::MAX);
    }

    #[test]
    fn q_plain_narrow_imm() {
        let mut j = VReg::default();
        u128::write(&mut j, 0, 0xABCD_0000_0000_0000_0000_u128);
        let mut d = VReg::default();
        u128::write(&mut d, 0, 0x1234_u128 << 64);
        let r = vsrlni_d_q(VecLen::Lsx, d, j, 64);
        assert_eq!(u64::read(&r, 0), 0xABCD);
        assert_eq!(u64::read(&r, 1), 0x1234);
    }
}
