//! Vector floating-point execution: per-lane arithmetic, conversions and
//! compares over f32/f64 lanes.
//!
//! Every operation follows the scalar engine's accounting protocol, but at
//! vector width: flags raised by individual lanes accumulate in the
//! transient status and are merged into the FCSR exactly once per
//! instruction, after the last lane. The destination is computed into a
//! temporary and only stored when the merge does not trap, so a trapping
//! instruction leaves the register file untouched.
//!
//! Lane arithmetic itself is the scalar soft-float layer in `cpu::fpu`;
//! this module owns lane iteration and the half/paired lane placements of
//! the conversion families.

use crate::cpu::fcsr::{self, FpStatus, RoundMode};
use crate::cpu::fpu::{
    cvt_d_s, cvt_s_d, f32_to_i32, f32_to_i64, f32_to_u32, f64_to_i32, f64_to_i64, f64_to_u64,
    fadd32, fadd64, fclass32, fclass64, fcmp32, fcmp64, fdiv32, fdiv64, flogb32, flogb64, fmax32,
    fmax64, fmaxa32, fmaxa64, fmin32, fmin64, fmina32, fmina64, fmul32, fmul64, fmuladd32,
    fmuladd64, frecip32, frecip64, frint32, frint64, frsqrt32, frsqrt64, fsqrt32, fsqrt64, fsub32,
    fsub64, i32_to_f32, i32_to_f64, i64_to_f32, i64_to_f64, u32_to_f32, u64_to_f64,
};
use crate::cpu::vreg::{lanes, Elem, VReg, VecLen, GROUP_BYTES};
use crate::cpu::{Cpu, Trap};

// f64 lanes per 128-bit group; the conversion families address half-groups
// in these units.
const DOFS: usize = GROUP_BYTES / 8;

fn fp2_s(
    cpu: &mut Cpu,
    vd: usize,
    vj: usize,
    len: VecLen,
    f: fn(u32, RoundMode, &mut FpStatus) -> u32,
) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let j = cpu.vregs.get(vj);
    let rm = cpu.fp_status.rm;
    let mut d = VReg::default();
    for i in 0..lanes::<u32>(len) {
        u32::write(&mut d, i, f(u32::read(&j, i), rm, &mut cpu.fp_status));
    }
    cpu.end_fp_op()?;
    cpu.vregs.set(vd, d);
    Ok(())
}

fn fp2_d(
    cpu: &mut Cpu,
    vd: usize,
    vj: usize,
    len: VecLen,
    f: fn(u64, RoundMode, &mut FpStatus) -> u64,
) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let j = cpu.vregs.get(vj);
    let rm = cpu.fp_status.rm;
    let mut d = VReg::default();
    for i in 0..lanes::<u64>(len) {
        u64::write(&mut d, i, f(u64::read(&j, i), rm, &mut cpu.fp_status));
    }
    cpu.end_fp_op()?;
    cpu.vregs.set(vd, d);
    Ok(())
}

fn fp3_s(
    cpu: &mut Cpu,
    vd: usize,
    vj: usize,
    vk: usize,
    len: VecLen,
    f: fn(u32, u32, RoundMode, &mut FpStatus) -> u32,
) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let j = cpu.vregs.get(vj);
    let k = cpu.vregs.get(vk);
    let rm = cpu.fp_status.rm;
    let mut d = VReg::default();
    for i in 0..lanes::<u32>(len) {
        let r = f(u32::read(&j, i), u32::read(&k, i), rm, &mut cpu.fp_status);
        u32::write(&mut d, i, r);
    }
    cpu.end_fp_op()?;
    cpu.vregs.set(vd, d);
    Ok(())
}

fn fp3_d(
    cpu: &mut Cpu,
    vd: usize,
    vj: usize,
    vk: usize,
    len: VecLen,
    f: fn(u64, u64, RoundMode, &mut FpStatus) -> u64,
) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let j = cpu.vregs.get(vj);
    let k = cpu.vregs.get(vk);
    let rm = cpu.fp_status.rm;
    let mut d = VReg::default();
    for i in 0..lanes::<u64>(len) {
        let r = f(u64::read(&j, i), u64::read(&k, i), rm, &mut cpu.fp_status);
        u64::write(&mut d, i, r);
    }
    cpu.end_fp_op()?;
    cpu.vregs.set(vd, d);
    Ok(())
}

macro_rules! vfp3 {
    ($($name_s:ident, $name_d:ident => $f32:ident, $f64:ident;)*) => {$(
        pub fn $name_s(
            cpu: &mut Cpu,
            vd: usize,
            vj: usize,
            vk: usize,
            len: VecLen,
        ) -> Result<(), Trap> {
            fp3_s(cpu, vd, vj, vk, len, $f32)
        }

        pub fn $name_d(
            cpu: &mut Cpu,
            vd: usize,
            vj: usize,
            vk: usize,
            len: VecLen,
        ) -> Result<(), Trap> {
            fp3_d(cpu, vd, vj, vk, len, $f64)
        }
    )*};
}

vfp3! {
    vfadd_s, vfadd_d => fadd32, fadd64;
    vfsub_s, vfsub_d => fsub32, fsub64;
    vfmul_s, vfmul_d => fmul32, fmul64;
    vfdiv_s, vfdiv_d => fdiv32, fdiv64;
    vfmax_s, vfmax_d => fmax32, fmax64;
    vfmin_s, vfmin_d => fmin32, fmin64;
    vfmaxa_s, vfmaxa_d => fmaxa32, fmaxa64;
    vfmina_s, vfmina_d => fmina32, fmina64;
}

macro_rules! vfp2 {
    ($($name_s:ident, $name_d:ident => $f32:ident, $f64:ident;)*) => {$(
        pub fn $name_s(cpu: &mut Cpu, vd: usize, vj: usize, len: VecLen) -> Result<(), Trap> {
            fp2_s(cpu, vd, vj, len, $f32)
        }

        pub fn $name_d(cpu: &mut Cpu, vd: usize, vj: usize, len: VecLen) -> Result<(), Trap> {
            fp2_d(cpu, vd, vj, len, $f64)
        }
    )*};
}

vfp2! {
    vfsqrt_s, vfsqrt_d => fsqrt32, fsqrt64;
    vfrecip_s, vfrecip_d => frecip32, frecip64;
    vfrsqrt_s, vfrsqrt_d => frsqrt32, frsqrt64;
}

/// Per-lane exponent extraction. Inexact never reaches the FCSR here, the
/// merge is masked the same way as the scalar form.
pub fn vflogb_s(cpu: &mut Cpu, vd: usize, vj: usize, len: VecLen) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let j = cpu.vregs.get(vj);
    let rm = cpu.fp_status.rm;
    let mut d = VReg::default();
    for i in 0..lanes::<u32>(len) {
        u32::write(&mut d, i, flogb32(u32::read(&j, i), rm, &mut cpu.fp_status));
    }
    cpu.end_fp_op_masked(!fcsr::NX)?;
    cpu.vregs.set(vd, d);
    Ok(())
}

pub fn vflogb_d(cpu: &mut Cpu, vd: usize, vj: usize, len: VecLen) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let j = cpu.vregs.get(vj);
    let rm = cpu.fp_status.rm;
    let mut d = VReg::default();
    for i in 0..lanes::<u64>(len) {
        u64::write(&mut d, i, flogb64(u64::read(&j, i), rm, &mut cpu.fp_status));
    }
    cpu.end_fp_op_masked(!fcsr::NX)?;
    cpu.vregs.set(vd, d);
    Ok(())
}

/// Per-lane classification; touches no FP state.
pub fn vfclass_s(cpu: &mut Cpu, vd: usize, vj: usize, len: VecLen) {
    let j = cpu.vregs.get(vj);
    let mut d = VReg::default();
    for i in 0..lanes::<u32>(len) {
        u32::write(&mut d, i, fclass32(u32::read(&j, i)));
    }
    cpu.vregs.set(vd, d);
}

pub fn vfclass_d(cpu: &mut Cpu, vd: usize, vj: usize, len: VecLen) {
    let j = cpu.vregs.get(vj);
    let mut d = VReg::default();
    for i in 0..lanes::<u64>(len) {
        u64::write(&mut d, i, fclass64(u64::read(&j, i)) as u64);
    }
    cpu.vregs.set(vd, d);
}

fn fp4_s(
    cpu: &mut Cpu,
    vd: usize,
    vj: usize,
    vk: usize,
    va: usize,
    len: VecLen,
    neg_addend: bool,
    neg_result: bool,
) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let j = cpu.vregs.get(vj);
    let k = cpu.vregs.get(vk);
    let a = cpu.vregs.get(va);
    let rm = cpu.fp_status.rm;
    let mut d = VReg::default();
    for i in 0..lanes::<u32>(len) {
        let r = fmuladd32(
            u32::read(&j, i),
            u32::read(&k, i),
            u32::read(&a, i),
            neg_addend,
            neg_result,
            rm,
            &mut cpu.fp_status,
        );
        u32::write(&mut d, i, r);
    }
    cpu.end_fp_op()?;
    cpu.vregs.set(vd, d);
    Ok(())
}

fn fp4_d(
    cpu: &mut Cpu,
    vd: usize,
    vj: usize,
    vk: usize,
    va: usize,
    len: VecLen,
    neg_addend: bool,
    neg_result: bool,
) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let j = cpu.vregs.get(vj);
    let k = cpu.vregs.get(vk);
    let a = cpu.vregs.get(va);
    let rm = cpu.fp_status.rm;
    let mut d = VReg::default();
    for i in 0..lanes::<u64>(len) {
        let r = fmuladd64(
            u64::read(&j, i),
            u64::read(&k, i),
            u64::read(&a, i),
            neg_addend,
            neg_result,
            rm,
            &mut cpu.fp_status,
        );
        u64::write(&mut d, i, r);
    }
    cpu.end_fp_op()?;
    cpu.vregs.set(vd, d);
    Ok(())
}

macro_rules! vfp4 {
    ($($name_s:ident, $name_d:ident => $neg_a:expr, $neg_r:expr;)*) => {$(
        pub fn $name_s(
            cpu: &mut Cpu,
            vd: usize,
            vj: usize,
            vk: usize,
            va: usize,
            len: VecLen,
        ) -> Result<(), Trap> {
            fp4_s(cpu, vd, vj, vk, va, len, $neg_a, $neg_r)
        }

        pub fn $name_d(
            cpu: &mut Cpu,
            vd: usize,
            vj: usize,
            vk: usize,
            va: usize,
            len: VecLen,
        ) -> Result<(), Trap> {
            fp4_d(cpu, vd, vj, vk, va, len, $neg_a, $neg_r)
        }
    )*};
}

vfp4! {
    vfmadd_s, vfmadd_d => false, false;
    vfmsub_s, vfmsub_d => true, false;
    vfnmadd_s, vfnmadd_d => false, true;
    vfnmsub_s, vfnmsub_d => true, true;
}

// -------------------------------------------------------------------------
// compares

/// Per-lane compare against a relation mask (LT/EQ/UN/GT bits); matching
/// lanes become all-ones, the rest zero.
pub fn vfcmp_s(
    cpu: &mut Cpu,
    vd: usize,
    vj: usize,
    vk: usize,
    len: VecLen,
    cond: u32,
    signaling: bool,
) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let j = cpu.vregs.get(vj);
    let k = cpu.vregs.get(vk);
    let mut d = VReg::default();
    for i in 0..lanes::<u32>(len) {
        let rel = fcmp32(u32::read(&j, i), u32::read(&k, i), signaling, &mut cpu.fp_status);
        u32::write(&mut d, i, if rel & cond != 0 { u32::MAX } else { 0 });
    }
    cpu.end_fp_op()?;
    cpu.vregs.set(vd, d);
    Ok(())
}

pub fn vfcmp_d(
    cpu: &mut Cpu,
    vd: usize,
    vj: usize,
    vk: usize,
    len: VecLen,
    cond: u32,
    signaling: bool,
) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let j = cpu.vregs.get(vj);
    let k = cpu.vregs.get(vk);
    let mut d = VReg::default();
    for i in 0..lanes::<u64>(len) {
        let rel = fcmp64(u64::read(&j, i), u64::read(&k, i), signaling, &mut cpu.fp_status);
        u64::write(&mut d, i, if rel & cond != 0 { u64::MAX } else { 0 });
    }
    cpu.end_fp_op()?;
    cpu.vregs.set(vd, d);
    Ok(())
}

// -------------------------------------------------------------------------
// f32 <-> f64 lane-placement conversions
//
// Widening reads one half of each 128-bit group of f32 lanes and fills the
// group with f64 lanes; paired narrowing packs two f64 source registers
// into one register of f32 lanes, vk into the low half of each group and
// vj into the high half.

pub fn vfcvtl_d_s(cpu: &mut Cpu, vd: usize, vj: usize, len: VecLen) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let j = cpu.vregs.get(vj);
    let mut d = VReg::default();
    for i in 0..len.groups() {
        for l in 0..DOFS {
            let v = cvt_d_s(u32::read(&j, l + DOFS * 2 * i), &mut cpu.fp_status);
            u64::write(&mut d, l + DOFS * i, v);
        }
    }
    cpu.end_fp_op()?;
    cpu.vregs.set(vd, d);
    Ok(())
}

pub fn vfcvth_d_s(cpu: &mut Cpu, vd: usize, vj: usize, len: VecLen) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let j = cpu.vregs.get(vj);
    let mut d = VReg::default();
    for i in 0..len.groups() {
        for l in 0..DOFS {
            let v = cvt_d_s(u32::read(&j, l + DOFS * (2 * i + 1)), &mut cpu.fp_status);
            u64::write(&mut d, l + DOFS * i, v);
        }
    }
    cpu.end_fp_op()?;
    cpu.vregs.set(vd, d);
    Ok(())
}

pub fn vfcvt_s_d(cpu: &mut Cpu, vd: usize, vj: usize, vk: usize, len: VecLen) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let j = cpu.vregs.get(vj);
    let k = cpu.vregs.get(vk);
    let rm = cpu.fp_status.rm;
    let mut d = VReg::default();
    for i in 0..len.groups() {
        for l in 0..DOFS {
            let lo = cvt_s_d(u64::read(&k, l + DOFS * i), rm, &mut cpu.fp_status);
            let hi = cvt_s_d(u64::read(&j, l + DOFS * i), rm, &mut cpu.fp_status);
            u32::write(&mut d, l + DOFS * 2 * i, lo);
            u32::write(&mut d, l + DOFS * (2 * i + 1), hi);
        }
    }
    cpu.end_fp_op()?;
    cpu.vregs.set(vd, d);
    Ok(())
}

// -------------------------------------------------------------------------
// round to integral-valued float

/// `rm: None` rounds in the current FCSR mode; the directed-rounding
/// encodings pass their mode explicitly.
pub fn vfrint_s(
    cpu: &mut Cpu,
    vd: usize,
    vj: usize,
    len: VecLen,
    rm: Option<RoundMode>,
) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let j = cpu.vregs.get(vj);
    let rm = rm.unwrap_or(cpu.fp_status.rm);
    let mut d = VReg::default();
    for i in 0..lanes::<u32>(len) {
        u32::write(&mut d, i, frint32(u32::read(&j, i), rm, &mut cpu.fp_status));
    }
    cpu.end_fp_op()?;
    cpu.vregs.set(vd, d);
    Ok(())
}

pub fn vfrint_d(
    cpu: &mut Cpu,
    vd: usize,
    vj: usize,
    len: VecLen,
    rm: Option<RoundMode>,
) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let j = cpu.vregs.get(vj);
    let rm = rm.unwrap_or(cpu.fp_status.rm);
    let mut d = VReg::default();
    for i in 0..lanes::<u64>(len) {
        u64::write(&mut d, i, frint64(u64::read(&j, i), rm, &mut cpu.fp_status));
    }
    cpu.end_fp_op()?;
    cpu.vregs.set(vd, d);
    Ok(())
}

// -------------------------------------------------------------------------
// float -> integer
//
// Saturating; NaN lanes convert to 0 and raise invalid (handled in the
// scalar conversion layer).

macro_rules! vftint_same_width {
    ($($name:ident: $lane:ty, $conv:ident;)*) => {$(
        pub fn $name(
            cpu: &mut Cpu,
            vd: usize,
            vj: usize,
            len: VecLen,
            rm: Option<RoundMode>,
        ) -> Result<(), Trap> {
            cpu.begin_fp_op();
            let j = cpu.vregs.get(vj);
            let rm = rm.unwrap_or(cpu.fp_status.rm);
            let mut d = VReg::default();
            for i in 0..lanes::<$lane>(len) {
                let v = $conv(<$lane as Elem>::read(&j, i), rm, &mut cpu.fp_status);
                <$lane as Elem>::write(&mut d, i, v as $lane);
            }
            cpu.end_fp_op()?;
            cpu.vregs.set(vd, d);
            Ok(())
        }
    )*};
}

vftint_same_width! {
    vftint_w_s: u32, f32_to_i32;
    vftint_wu_s: u32, f32_to_u32;
    vftint_l_d: u64, f64_to_i64;
    vftint_lu_d: u64, f64_to_u64;
}

/// Paired f64 → i32: vk fills the low half of each group of word lanes,
/// vj the high half.
pub fn vftint_w_d(
    cpu: &mut Cpu,
    vd: usize,
    vj: usize,
    vk: usize,
    len: VecLen,
    rm: Option<RoundMode>,
) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let j = cpu.vregs.get(vj);
    let k = cpu.vregs.get(vk);
    let rm = rm.unwrap_or(cpu.fp_status.rm);
    let mut d = VReg::default();
    for i in 0..len.groups() {
        for l in 0..DOFS {
            let lo = f64_to_i32(u64::read(&k, l + DOFS * i), rm, &mut cpu.fp_status);
            let hi = f64_to_i32(u64::read(&j, l + DOFS * i), rm, &mut cpu.fp_status);
            u32::write(&mut d, l + DOFS * 2 * i, lo as u32);
            u32::write(&mut d, l + DOFS * (2 * i + 1), hi as u32);
        }
    }
    cpu.end_fp_op()?;
    cpu.vregs.set(vd, d);
    Ok(())
}

/// f32 low half of each group → i64 lanes.
pub fn vftintl_l_s(
    cpu: &mut Cpu,
    vd: usize,
    vj: usize,
    len: VecLen,
    rm: Option<RoundMode>,
) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let j = cpu.vregs.get(vj);
    let rm = rm.unwrap_or(cpu.fp_status.rm);
    let mut d = VReg::default();
    for i in 0..len.groups() {
        for l in 0..DOFS {
            let v = f32_to_i64(u32::read(&j, l + DOFS * 2 * i), rm, &mut cpu.fp_status);
            u64::write(&mut d, l + DOFS * i, v as u64);
        }
    }
    cpu.end_fp_op()?;
    cpu.vregs.set(vd, d);
    Ok(())
}

/// f32 high half of each group → i64 lanes.
pub fn vftinth_l_s(
    cpu: &mut Cpu,
    vd: usize,
    vj: usize,
    len: VecLen,
    rm: Option<RoundMode>,
) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let j = cpu.vregs.get(vj);
    let rm = rm.unwrap_or(cpu.fp_status.rm);
    let mut d = VReg::default();
    for i in 0..len.groups() {
        for l in 0..DOFS {
            let v = f32_to_i64(u32::read(&j, l + DOFS * (2 * i + 1)), rm, &mut cpu.fp_status);
            u64::write(&mut d, l + DOFS * i, v as u64);
        }
    }
    cpu.end_fp_op()?;
    cpu.vregs.set(vd, d);
    Ok(())
}

// -------------------------------------------------------------------------
// integer -> float (always in the current rounding mode)

macro_rules! vffint_same_width {
    ($($name:ident: $lane:ty, $ity:ty, $conv:ident;)*) => {$(
        pub fn $name(cpu: &mut Cpu, vd: usize, vj: usize, len: VecLen) -> Result<(), Trap> {
            cpu.begin_fp_op();
            let j = cpu.vregs.get(vj);
            let rm = cpu.fp_status.rm;
            let mut d = VReg::default();
            for i in 0..lanes::<$lane>(len) {
                let v = $conv(<$lane as Elem>::read(&j, i) as $ity, rm, &mut cpu.fp_status);
                <$lane as Elem>::write(&mut d, i, v);
            }
            cpu.end_fp_op()?;
            cpu.vregs.set(vd, d);
            Ok(())
        }
    )*};
}

vffint_same_width! {
    vffint_s_w: u32, i32, i32_to_f32;
    vffint_s_wu: u32, u32, u32_to_f32;
    vffint_d_l: u64, i64, i64_to_f64;
    vffint_d_lu: u64, u64, u64_to_f64;
}

/// i32 low half of each group → f64 lanes. Exact, but kept under the same
/// accounting protocol as the rest of the family.
pub fn vffintl_d_w(cpu: &mut Cpu, vd: usize, vj: usize, len: VecLen) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let j = cpu.vregs.get(vj);
    let rm = cpu.fp_status.rm;
    let mut d = VReg::default();
    for i in 0..len.groups() {
        for l in 0..DOFS {
            let v = i32_to_f64(u32::read(&j, l + DOFS * 2 * i) as i32, rm, &mut cpu.fp_status);
            u64::write(&mut d, l + DOFS * i, v);
        }
    }
    cpu.end_fp_op()?;
    cpu.vregs.set(vd, d);
    Ok(())
}

pub fn vffinth_d_w(cpu: &mut Cpu, vd: usize, vj: usize, len: VecLen) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let j = cpu.vregs.get(vj);
    let rm = cpu.fp_status.rm;
    let mut d = VReg::default();
    for i in 0..len.groups() {
        for l in 0..DOFS {
            let v = i32_to_f64(
                u32::read(&j, l + DOFS * (2 * i + 1)) as i32,
                rm,
                &mut cpu.fp_status,
            );
            u64::write(&mut d, l + DOFS * i, v);
        }
    }
    cpu.end_fp_op()?;
    cpu.vregs.set(vd, d);
    Ok(())
}

/// Paired i64 → f32: vk into the low half of each group of word lanes, vj
/// into the high half.
pub fn vffint_s_l(cpu: &mut Cpu, vd: usize, vj: usize, vk: usize, len: VecLen) -> Result<(), Trap> {
    cpu.begin_fp_op();
    let j = cpu.vregs.get(vj);
    let k = cpu.vregs.get(vk);
    let rm = cpu.fp_status.rm;
    let mut d = VReg::default();
    for i in 0..len.groups() {
        for l in 0..DOFS {
            let lo = i64_to_f32(u64::read(&k, l + DOFS * i) as i64, rm, &mut cpu.fp_status);
            let hi = i64_to_f32(u64::read(&j, l + DOFS * i) as i64, rm, &mut cpu.fp_status);
            u32::write(&mut d, l + DOFS * 2 * i, lo);
            u32::write(&mut d, l + DOFS * (2 * i + 1), hi);
        }
    }
    cpu.end_fp_op()?;
    cpu.vregs.set(vd, d);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::fpu::{FCMP_EQ, FCMP_LT, FCMP_UN};

    fn cpu_with_f32(r: usize, vals: &[f32]) -> Cpu {
        let mut cpu = Cpu::new();
        set_f32(&mut cpu, r, vals);
        cpu
    }

    fn set_f32(cpu: &mut Cpu, r: usize, vals: &[f32]) {
        let mut v = VReg::default();
        for (i, x) in vals.iter().enumerate() {
            u32::write(&mut v, i, x.to_bits());
        }
        cpu.vregs.set(r, v);
    }

    fn set_f64(cpu: &mut Cpu, r: usize, vals: &[f64]) {
        let mut v = VReg::default();
        for (i, x) in vals.iter().enumerate() {
            u64::write(&mut v, i, x.to_bits());
        }
        cpu.vregs.set(r, v);
    }

    fn f32_lane(cpu: &Cpu, r: usize, i: usize) -> f32 {
        f32::from_bits(u32::read(&cpu.vregs.get(r), i))
    }

    fn f64_lane(cpu: &Cpu, r: usize, i: usize) -> f64 {
        f64::from_bits(u64::read(&cpu.vregs.get(r), i))
    }

    #[test]
    fn add_lanes_and_clear_upper_half() {
        let mut cpu = cpu_with_f32(1, &[1.5, 2.0, -3.0, 0.25]);
        set_f32(&mut cpu, 2, &[0.5, 0.5, 0.5, 0.5]);
        let mut hi = cpu.vregs.get(3);
        u32::write(&mut hi, 7, 0xDEAD_BEEF);
        cpu.vregs.set(3, hi);
        vfadd_s(&mut cpu, 3, 1, 2, VecLen::Lsx).unwrap();
        assert_eq!(f32_lane(&cpu, 3, 0), 2.0);
        assert_eq!(f32_lane(&cpu, 3, 2), -2.5);
        assert_eq!(u32::read(&cpu.vregs.get(3), 7), 0);
    }

    #[test]
    fn lane_flags_accumulate_into_one_merge() {
        // lane 0 divides by zero, lane 1 is inexact; both land sticky
        let mut cpu = cpu_with_f32(1, &[1.0, 1.0, 0.0, 0.0]);
        set_f32(&mut cpu, 2, &[0.0, 3.0, 1.0, 1.0]);
        vfdiv_s(&mut cpu, 0, 1, 2, VecLen::Lsx).unwrap();
        assert_eq!(cpu.fcsr.flags(), fcsr::DZ | fcsr::NX);
        assert_eq!(cpu.fcsr.cause(), fcsr::DZ | fcsr::NX);
    }

    #[test]
    fn trap_leaves_destination_unchanged() {
        let mut cpu = cpu_with_f32(1, &[1.0, f32::INFINITY, 0.0, 0.0]);
        set_f32(&mut cpu, 2, &[1.0, f32::NEG_INFINITY, 0.0, 0.0]);
        set_f32(&mut cpu, 3, &[9.0, 9.0, 9.0, 9.0]);
        cpu.fcsr.set_enables(fcsr::NV);
        cpu.pc = 0x1000;
        let r = vfadd_s(&mut cpu, 3, 1, 2, VecLen::Lsx);
        assert_eq!(r, Err(Trap::FloatingPointException { pc: 0x1000 }));
        assert_eq!(f32_lane(&cpu, 3, 0), 9.0);
        assert_eq!(cpu.fcsr.flags(), 0);
        assert_eq!(cpu.fcsr.cause(), fcsr::NV);
    }

    #[test]
    fn fused_multiply_add_per_lane() {
        let mut cpu = cpu_with_f32(1, &[2.0, 2.0, 0.0, 0.0]);
        set_f32(&mut cpu, 2, &[3.0, 3.0, 0.0, 0.0]);
        set_f32(&mut cpu, 3, &[1.0, 1.0, 0.0, 0.0]);
        vfmadd_s(&mut cpu, 4, 1, 2, 3, VecLen::Lsx).unwrap();
        assert_eq!(f32_lane(&cpu, 4, 0), 7.0);
        vfnmadd_s(&mut cpu, 4, 1, 2, 3, VecLen::Lsx).unwrap();
        assert_eq!(f32_lane(&cpu, 4, 0), -7.0);
        vfmsub_s(&mut cpu, 4, 1, 2, 3, VecLen::Lsx).unwrap();
        assert_eq!(f32_lane(&cpu, 4, 0), 5.0);
        vfnmsub_s(&mut cpu, 4, 1, 2, 3, VecLen::Lsx).unwrap();
        assert_eq!(f32_lane(&cpu, 4, 0), -5.0);
    }

    #[test]
    fn negated_fma_flips_exact_zero_sign() {
        // 1 * 1 + (-1) rounds to +0.0; the nmadd negation applies to the
        // rounded result, so the lane must read back as -0.0
        let mut cpu = cpu_with_f32(1, &[1.0, 0.0, 0.0, 0.0]);
        set_f32(&mut cpu, 2, &[1.0, 0.0, 0.0, 0.0]);
        set_f32(&mut cpu, 3, &[-1.0, 0.0, 0.0, 0.0]);
        vfnmadd_s(&mut cpu, 4, 1, 2, 3, VecLen::Lsx).unwrap();
        let d = cpu.vregs.get(4);
        assert_eq!(u32::read(&d, 0), 0x8000_0000);
    }

    #[test]
    fn min_prefers_number_over_quiet_nan() {
        let mut cpu = cpu_with_f32(1, &[f32::NAN, 4.0, 0.0, 0.0]);
        set_f32(&mut cpu, 2, &[2.0, 3.0, -0.0, 0.0]);
        vfmin_s(&mut cpu, 0, 1, 2, VecLen::Lsx).unwrap();
        assert_eq!(f32_lane(&cpu, 0, 0), 2.0);
        assert_eq!(f32_lane(&cpu, 0, 1), 3.0);
        // min(+0, -0) is -0
        assert!(f32_lane(&cpu, 0, 2).is_sign_negative());
        assert_eq!(cpu.fcsr.flags(), 0);
    }

    #[test]
    fn classify_lanes() {
        let mut cpu = cpu_with_f32(1, &[f32::NEG_INFINITY, 0.0, -1.0, f32::NAN]);
        vfclass_s(&mut cpu, 0, 1, VecLen::Lsx);
        let d = cpu.vregs.get(0);
        assert_eq!(u32::read(&d, 0), 1 << 2);
        assert_eq!(u32::read(&d, 1), 1 << 9);
        assert_eq!(u32::read(&d, 2), 1 << 3);
        assert_eq!(u32::read(&d, 3), 1 << 1);
    }

    #[test]
    fn compare_masks_per_lane() {
        let mut cpu = cpu_with_f32(1, &[1.0, 2.0, f32::NAN, 5.0]);
        set_f32(&mut cpu, 2, &[2.0, 2.0, 2.0, 2.0]);
        vfcmp_s(&mut cpu, 0, 1, 2, VecLen::Lsx, FCMP_LT | FCMP_EQ, false).unwrap();
        let d = cpu.vregs.get(0);
        assert_eq!(u32::read(&d, 0), u32::MAX);
        assert_eq!(u32::read(&d, 1), u32::MAX);
        assert_eq!(u32::read(&d, 2), 0);
        assert_eq!(u32::read(&d, 3), 0);
        vfcmp_s(&mut cpu, 0, 1, 2, VecLen::Lsx, FCMP_UN, false).unwrap();
        assert_eq!(u32::read(&cpu.vregs.get(0), 2), u32::MAX);
        assert_eq!(cpu.fcsr.flags(), 0);
        // signaling compare raises invalid on the quiet NaN lane
        vfcmp_s(&mut cpu, 0, 1, 2, VecLen::Lsx, FCMP_LT, true).unwrap();
        assert_eq!(cpu.fcsr.flags(), fcsr::NV);
    }

    #[test]
    fn widening_convert_reads_group_halves() {
        let mut cpu = Cpu::new();
        set_f32(&mut cpu, 1, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        vfcvtl_d_s(&mut cpu, 0, 1, VecLen::Lasx).unwrap();
        assert_eq!(f64_lane(&cpu, 0, 0), 1.0);
        assert_eq!(f64_lane(&cpu, 0, 1), 2.0);
        assert_eq!(f64_lane(&cpu, 0, 2), 5.0);
        assert_eq!(f64_lane(&cpu, 0, 3), 6.0);
        vfcvth_d_s(&mut cpu, 0, 1, VecLen::Lasx).unwrap();
        assert_eq!(f64_lane(&cpu, 0, 0), 3.0);
        assert_eq!(f64_lane(&cpu, 0, 2), 7.0);
    }

    #[test]
    fn narrowing_convert_packs_two_sources() {
        let mut cpu = Cpu::new();
        set_f64(&mut cpu, 1, &[10.0, 11.0, 12.0, 13.0]);
        set_f64(&mut cpu, 2, &[20.0, 21.0, 22.0, 23.0]);
        vfcvt_s_d(&mut cpu, 0, 1, 2, VecLen::Lasx).unwrap();
        // per group: vk low, vj high
        assert_eq!(f32_lane(&cpu, 0, 0), 20.0);
        assert_eq!(f32_lane(&cpu, 0, 1), 21.0);
        assert_eq!(f32_lane(&cpu, 0, 2), 10.0);
        assert_eq!(f32_lane(&cpu, 0, 3), 11.0);
        assert_eq!(f32_lane(&cpu, 0, 4), 22.0);
        assert_eq!(f32_lane(&cpu, 0, 6), 12.0);
    }

    #[test]
    fn round_to_int_respects_explicit_mode() {
        let mut cpu = cpu_with_f32(1, &[1.5, -1.5, 2.5, 0.4]);
        vfrint_s(&mut cpu, 0, 1, VecLen::Lsx, None).unwrap();
        assert_eq!(f32_lane(&cpu, 0, 0), 2.0);
        assert_eq!(f32_lane(&cpu, 0, 2), 2.0); // ties to even
        vfrint_s(&mut cpu, 0, 1, VecLen::Lsx, Some(RoundMode::TowardZero)).unwrap();
        assert_eq!(f32_lane(&cpu, 0, 0), 1.0);
        assert_eq!(f32_lane(&cpu, 0, 1), -1.0);
        assert!(cpu.fcsr.flags() & fcsr::NX != 0);
    }

    #[test]
    fn float_to_int_saturates_and_zeroes_nan() {
        let mut cpu = cpu_with_f32(1, &[1.9, -2.5, f32::NAN, 3.0e9]);
        vftint_w_s(&mut cpu, 0, 1, VecLen::Lsx, Some(RoundMode::TowardZero)).unwrap();
        let d = cpu.vregs.get(0);
        assert_eq!(u32::read(&d, 0) as i32, 1);
        assert_eq!(u32::read(&d, 1) as i32, -2);
        assert_eq!(u32::read(&d, 2), 0);
        assert_eq!(u32::read(&d, 3) as i32, i32::MAX);
        assert!(cpu.fcsr.flags() & fcsr::NV != 0);
    }

    #[test]
    fn paired_float_to_int_lane_placement() {
        let mut cpu = Cpu::new();
        set_f64(&mut cpu, 1, &[-1.0, -2.0, -3.0, -4.0]);
        set_f64(&mut cpu, 2, &[1.0, 2.0, 3.0, 4.0]);
        vftint_w_d(&mut cpu, 0, 1, 2, VecLen::Lasx, None).unwrap();
        let d = cpu.vregs.get(0);
        assert_eq!(u32::read(&d, 0) as i32, 1);
        assert_eq!(u32::read(&d, 2) as i32, -1);
        assert_eq!(u32::read(&d, 4) as i32, 3);
        assert_eq!(u32::read(&d, 6) as i32, -3);
    }

    #[test]
    fn half_register_float_to_wide_int() {
        let mut cpu = cpu_with_f32(1, &[1.5, -2.5, 3.5, -4.5]);
        vftintl_l_s(&mut cpu, 0, 1, VecLen::Lsx, Some(RoundMode::TowardZero)).unwrap();
        let d = cpu.vregs.get(0);
        assert_eq!(u64::read(&d, 0) as i64, 1);
        assert_eq!(u64::read(&d, 1) as i64, -2);
        vftinth_l_s(&mut cpu, 0, 1, VecLen::Lsx, Some(RoundMode::TowardZero)).unwrap();
        let d = cpu.vregs.get(0);
        assert_eq!(u64::read(&d, 0) as i64, 3);
        assert_eq!(u64::read(&d, 1) as i64, -4);
    }

    #[test]
    fn int_to_float_families() {
        let mut cpu = Cpu::new();
        let mut v = VReg::default();
        u32::write(&mut v, 0, -7i32 as u32);
        u32::write(&mut v, 1, u32::MAX);
        cpu.vregs.set(1, v);
        vffint_s_w(&mut cpu, 0, 1, VecLen::Lsx).unwrap();
        assert_eq!(f32_lane(&cpu, 0, 0), -7.0);
        vffint_s_wu(&mut cpu, 0, 1, VecLen::Lsx).unwrap();
        assert_eq!(f32_lane(&cpu, 0, 1), u32::MAX as f32);

        vffintl_d_w(&mut cpu, 0, 1, VecLen::Lsx).unwrap();
        assert_eq!(f64_lane(&cpu, 0, 0), -7.0);
        assert_eq!(f64_lane(&cpu, 0, 1), u32::MAX as i32 as f64);

        let mut q = VReg::default();
        u64::write(&mut q, 0, 100);
        u64::write(&mut q, 1, -100i64 as u64);
        cpu.vregs.set(2, q);
        cpu.vregs.set(3, q);
        vffint_s_l(&mut cpu, 0, 2, 3, VecLen::Lsx).unwrap();
        assert_eq!(f32_lane(&cpu, 0, 0), 100.0);
        assert_eq!(f32_lane(&cpu, 0, 1), -100.0);
        assert_eq!(f32_lane(&cpu, 0, 2), 100.0);
    }

    #[test]
    fn logb_never_sets_sticky_inexact() {
        let mut cpu = cpu_with_f32(1, &[12.0, 0.5, 1.0, 2.0]);
        vflogb_s(&mut cpu, 0, 1, VecLen::Lsx).unwrap();
        assert_eq!(f32_lane(&cpu, 0, 0), 3.0);
        assert_eq!(f32_lane(&cpu, 0, 1), -1.0);
        assert_eq!(cpu.fcsr.flags() & fcsr::NX, 0);
    }
}
