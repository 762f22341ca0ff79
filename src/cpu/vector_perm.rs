//! Data movement: pack/pick/interleave, shuffles, lane insert/extract and
//! whole-byte shifts.
//!
//! No value here is ever interpreted arithmetically; everything is index
//! arithmetic over lanes. With a 256-bit register most families operate
//! per 128-bit group (both halves run the same permutation on their own
//! lanes); the exceptions are noted on the functions. As in the integer
//! engine, results are built in a zeroed temporary, so 128-bit forms clear
//! the upper half.

use crate::cpu::vreg::{lanes, Elem, Int, VReg, VecLen, GROUP_BYTES};

/// Lanes per 128-bit group.
#[inline]
fn group_lanes<E: Elem>() -> usize {
    GROUP_BYTES / E::BYTES
}

// -------------------------------------------------------------------------
// pack / pick / interleave

/// Interleave the even-numbered lanes of vj (into odd destination lanes)
/// and vk (into even ones). Lane numbering is linear; the group structure
/// falls out of the index arithmetic.
pub fn vpackev<E: Elem>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    let mut d = VReg::default();
    for i in 0..lanes::<E>(len) / 2 {
        E::write(&mut d, 2 * i + 1, E::read(&vj, 2 * i));
        E::write(&mut d, 2 * i, E::read(&vk, 2 * i));
    }
    d
}

pub fn vpackod<E: Elem>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    let mut d = VReg::default();
    for i in 0..lanes::<E>(len) / 2 {
        E::write(&mut d, 2 * i + 1, E::read(&vj, 2 * i + 1));
        E::write(&mut d, 2 * i, E::read(&vk, 2 * i + 1));
    }
    d
}

/// Gather the even-numbered lanes of each group: vk's into the low half of
/// the destination group, vj's into the high half.
pub fn vpickev<E: Elem>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    let ofs = group_lanes::<E>() / 2;
    let mut d = VReg::default();
    for i in 0..len.groups() {
        for j in 0..ofs {
            E::write(&mut d, j + ofs * (2 * i + 1), E::read(&vj, 2 * (j + ofs * i)));
            E::write(&mut d, j + ofs * 2 * i, E::read(&vk, 2 * (j + ofs * i)));
        }
    }
    d
}

pub fn vpickod<E: Elem>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    let ofs = group_lanes::<E>() / 2;
    let mut d = VReg::default();
    for i in 0..len.groups() {
        for j in 0..ofs {
            E::write(&mut d, j + ofs * (2 * i + 1), E::read(&vj, 2 * (j + ofs * i) + 1));
            E::write(&mut d, j + ofs * 2 * i, E::read(&vk, 2 * (j + ofs * i) + 1));
        }
    }
    d
}

/// Interleave the low half of each group: vj's lanes land odd, vk's even.
pub fn vilvl<E: Elem>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    let ofs = group_lanes::<E>() / 2;
    let mut d = VReg::default();
    for i in 0..len.groups() {
        for j in 0..ofs {
            E::write(&mut d, 2 * (j + ofs * i) + 1, E::read(&vj, j + ofs * 2 * i));
            E::write(&mut d, 2 * (j + ofs * i), E::read(&vk, j + ofs * 2 * i));
        }
    }
    d
}

/// Interleave the high half of each group.
pub fn vilvh<E: Elem>(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    let ofs = group_lanes::<E>() / 2;
    let mut d = VReg::default();
    for i in 0..len.groups() {
        for j in 0..ofs {
            E::write(&mut d, 2 * (j + ofs * i) + 1, E::read(&vj, j + ofs * (2 * i + 1)));
            E::write(&mut d, 2 * (j + ofs * i), E::read(&vk, j + ofs * (2 * i + 1)));
        }
    }
    d
}

// -------------------------------------------------------------------------
// shuffles

/// Full shuffle, selector in vd. Each selector byte is taken modulo the
/// two-register window: values below the group lane count pick from vk,
/// the rest from vj. Group-relative on both sides.
pub fn vshuf<E: Int>(len: VecLen, vd: VReg, vj: VReg, vk: VReg) -> VReg {
    let m = group_lanes::<E>();
    let mut d = VReg::default();
    for i in 0..lanes::<E>(len) {
        let g = i / m;
        let k = (E::read(&vd, i).to_bits() as u8 as usize) % (2 * m);
        let v = if k < m {
            E::read(&vk, k + g * m)
        } else {
            E::read(&vj, k - m + g * m)
        };
        E::write(&mut d, i, v);
    }
    d
}

/// Byte shuffle with a third selector register; the window is the 32-byte
/// concatenation vj:vk of each group, selector modulo 32.
pub fn vshuf_b(len: VecLen, va: VReg, vj: VReg, vk: VReg) -> VReg {
    let mut d = VReg::default();
    for i in 0..lanes::<u8>(len) {
        let g = i / GROUP_BYTES;
        let k = (u8::read(&va, i) as usize) % (2 * GROUP_BYTES);
        let v = if k < GROUP_BYTES {
            u8::read(&vk, k + g * GROUP_BYTES)
        } else {
            u8::read(&vj, k - GROUP_BYTES + g * GROUP_BYTES)
        };
        u8::write(&mut d, i, v);
    }
    d
}

/// Immediate shuffle within aligned blocks of four lanes; two imm bits per
/// destination lane.
pub fn vshuf4i<E: Elem>(len: VecLen, vj: VReg, imm: u32) -> VReg {
    let mut d = VReg::default();
    for i in 0..lanes::<E>(len) {
        let src = (i & !3) + ((imm as usize >> (2 * (i & 3))) & 3);
        E::write(&mut d, i, E::read(&vj, src));
    }
    d
}

/// Doubleword variant: each destination lane selects vd or vj and one of
/// the two lanes of its group.
pub fn vshuf4i_d(len: VecLen, vd: VReg, vj: VReg, imm: u32) -> VReg {
    let mut d = VReg::default();
    for i in 0..len.groups() {
        let lo = if imm & 2 != 0 { &vj } else { &vd };
        let hi = if imm & 8 != 0 { &vj } else { &vd };
        u64::write(&mut d, 2 * i, u64::read(lo, (imm as usize & 1) + 2 * i));
        u64::write(&mut d, 2 * i + 1, u64::read(hi, ((imm as usize >> 2) & 1) + 2 * i));
    }
    d
}

/// Word permute: low two lanes of each group from vj, high two from vd,
/// each selected by a 2-bit imm field.
pub fn vpermi_w(len: VecLen, vd: VReg, vj: VReg, imm: u32) -> VReg {
    let mut d = VReg::default();
    for i in 0..len.groups() {
        let base = 4 * i;
        u32::write(&mut d, base, u32::read(&vj, (imm as usize & 3) + base));
        u32::write(&mut d, base + 1, u32::read(&vj, ((imm as usize >> 2) & 3) + base));
        u32::write(&mut d, base + 2, u32::read(&vd, ((imm as usize >> 4) & 3) + base));
        u32::write(&mut d, base + 3, u32::read(&vd, ((imm as usize >> 6) & 3) + base));
    }
    d
}

/// Doubleword permute across the whole register (256-bit form).
pub fn vpermi_d(len: VecLen, vj: VReg, imm: u32) -> VReg {
    let mut d = VReg::default();
    for i in 0..lanes::<u64>(len) {
        u64::write(&mut d, i, u64::read(&vj, (imm as usize >> (2 * i)) & 3));
    }
    d
}

/// 128-bit group permute over the four groups of vj:vd (256-bit form).
pub fn vpermi_q(len: VecLen, vd: VReg, vj: VReg, imm: u32) -> VReg {
    let mut d = VReg::default();
    for i in 0..len.groups() {
        let sel = (imm >> (4 * i)) as usize;
        let src = if sel & 2 != 0 { &vd } else { &vj };
        u128::write(&mut d, i, u128::read(src, sel & 1));
    }
    d
}

/// Full-width word gather: every destination word selects any of the eight
/// words of vj (256-bit form, not grouped).
pub fn vperm_w(len: VecLen, vj: VReg, vk: VReg) -> VReg {
    let n = lanes::<u32>(len);
    let mut d = VReg::default();
    for i in 0..n {
        let k = (u32::read(&vk, i) as u8 as usize) % n;
        u32::write(&mut d, i, u32::read(&vj, k));
    }
    d
}

/// Extract one lane of vj and insert it into vd, per group; the imm nibbles
/// give the insert and extract positions.
pub fn vextrins<E: Elem>(len: VecLen, vd: VReg, vj: VReg, imm: u32) -> VReg {
    let m = group_lanes::<E>();
    let ins = (imm as usize >> 4) & (m - 1);
    let extr = imm as usize & (m - 1);
    let mut d = vd;
    for i in 0..len.groups() {
        E::write(&mut d, ins + i * m, E::read(&vj, extr + i * m));
    }
    d
}

// -------------------------------------------------------------------------
// replicate / insert / extract

/// Replicate one lane of vj across each group; the index comes from a
/// general register and wraps modulo the group lane count.
pub fn vreplve<E: Elem>(len: VecLen, vj: VReg, rk: u64) -> VReg {
    vreplvei::<E>(len, vj, (rk % group_lanes::<E>() as u64) as u32)
}

pub fn vreplvei<E: Elem>(len: VecLen, vj: VReg, imm: u32) -> VReg {
    let m = group_lanes::<E>();
    let idx = imm as usize % m;
    let mut d = VReg::default();
    for i in 0..len.groups() {
        let v = E::read(&vj, idx + i * m);
        for j in 0..m {
            E::write(&mut d, j + i * m, v);
        }
    }
    d
}

/// Insert a general-register value into one lane, preserving the rest.
pub fn vinsgr2vr<E: Int>(len: VecLen, vd: VReg, val: u64, imm: u32) -> VReg {
    let mut d = vd;
    let idx = imm as usize % lanes::<E>(len);
    E::write(&mut d, idx, E::from_bits(val as u128));
    d
}

/// Lane read, extended to 64 bits following the lane type's signedness
/// (instantiate with `i32` for `vpickve2gr.w`, `u32` for `vpickve2gr.wu`).
pub fn vpickve2gr<E: Int>(len: VecLen, vj: VReg, imm: u32) -> u64 {
    let idx = imm as usize % lanes::<E>(len);
    E::read(&vj, idx).to_wide() as u64
}

/// Insert lane 0 of vj at an arbitrary lane of vd (256-bit form).
pub fn vinsve0<E: Elem>(len: VecLen, vd: VReg, vj: VReg, imm: u32) -> VReg {
    let mut d = vd;
    let idx = imm as usize % lanes::<E>(len);
    E::write(&mut d, idx, E::read(&vj, 0));
    d
}

/// Copy an arbitrary lane of vj to lane 0, zeroing everything above it
/// (256-bit form).
pub fn vpickve<E: Elem>(len: VecLen, vj: VReg, imm: u32) -> VReg {
    let idx = imm as usize % lanes::<E>(len);
    let mut d = VReg::default();
    E::write(&mut d, 0, E::read(&vj, idx));
    d
}

// -------------------------------------------------------------------------
// whole-byte shifts (per group)

pub fn vbsll(len: VecLen, vj: VReg, imm: u32) -> VReg {
    let sh = imm as usize % GROUP_BYTES;
    let mut d = VReg::default();
    for i in 0..len.groups() {
        for b in sh..GROUP_BYTES {
            u8::write(&mut d, b + i * GROUP_BYTES, u8::read(&vj, b - sh + i * GROUP_BYTES));
        }
    }
    d
}

pub fn vbsrl(len: VecLen, vj: VReg, imm: u32) -> VReg {
    let sh = imm as usize % GROUP_BYTES;
    let mut d = VReg::default();
    for i in 0..len.groups() {
        for b in 0..GROUP_BYTES - sh {
            u8::write(&mut d, b + i * GROUP_BYTES, u8::read(&vj, b + sh + i * GROUP_BYTES));
        }
    }
    d
}
