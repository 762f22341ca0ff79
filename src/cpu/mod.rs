//! CPU-side state of the FP/SIMD execution engine.
//!
//! One `Cpu` owns everything an instruction helper touches: the vector
//! register file (whose low 64 bits double as the scalar FP registers),
//! the FCSR, the transient per-instruction FP status and the eight
//! condition-flag registers. Decode and dispatch live outside this crate
//! and drive the helper functions with register indices plus a `VecLen`.

pub mod fcsr;
pub mod fpu;
pub mod vector;
pub mod vector_fp;
pub mod vector_perm;
pub mod vreg;

use fcsr::{Fcsr, FpStatus};
use vreg::{Elem, VectorRegFile};

/// Synchronous trap signal, unwound to the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trap {
    /// An FP instruction raised an exception whose enable bit is set;
    /// carries the faulting instruction address.
    FloatingPointException { pc: u64 },
}

impl std::fmt::Display for Trap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trap::FloatingPointException { pc } => {
                write!(f, "floating-point exception at pc {:#x}", pc)
            }
        }
    }
}

/// Execution context for one virtual CPU. Exclusively owned by its
/// dispatch loop; helpers run to completion, so no lane state ever
/// straddles a suspension point.
pub struct Cpu {
    /// Vector registers v0-v31; the low 64 bits alias f0-f31.
    pub vregs: VectorRegFile,
    /// Floating-point control/status register.
    pub fcsr: Fcsr,
    /// Transient per-instruction FP status.
    pub fp_status: FpStatus,
    /// FP condition flags fcc0-fcc7.
    pub cf: [bool; 8],
    /// Program counter of the instruction being executed.
    pub pc: u64,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            vregs: VectorRegFile::new(),
            fcsr: Fcsr::new(),
            fp_status: FpStatus::default(),
            cf: [false; 8],
            pc: 0,
        }
    }

    pub fn reset(&mut self) {
        self.vregs.reset();
        self.fcsr = Fcsr::new();
        self.fp_status = FpStatus::default();
        self.cf = [false; 8];
        self.pc = 0;
    }

    /// Scalar double-precision read: low 64 bits of the vector register.
    #[inline]
    pub fn fpr(&self, r: usize) -> u64 {
        u64::read(&self.vregs.data[r], 0)
    }

    /// Scalar single-precision read: low 32 bits.
    #[inline]
    pub fn fpr32(&self, r: usize) -> u32 {
        u32::read(&self.vregs.data[r], 0)
    }

    /// Scalar double-precision write. Bits 255:64 of the register are
    /// left unchanged.
    #[inline]
    pub fn set_fpr(&mut self, r: usize, v: u64) {
        u64::write(&mut self.vregs.data[r], 0, v);
    }

    /// Scalar single-precision write, NaN-boxed into the low 64 bits.
    #[inline]
    pub fn set_fpr32(&mut self, r: usize, v: u32) {
        self.set_fpr(r, v as u64 | 0xFFFF_FFFF_0000_0000);
    }

    /// Start FP-instruction accounting: drop any stale transient flags and
    /// latch the current rounding mode from the FCSR.
    pub fn begin_fp_op(&mut self) {
        self.fp_status.take();
        self.fp_status.rm = self.fcsr.rounding_mode();
    }

    /// Finish FP-instruction accounting: merge the accumulated flags into
    /// the FCSR exactly once, trapping if an enabled exception was raised.
    pub fn end_fp_op(&mut self) -> Result<(), Trap> {
        let raised = self.fp_status.take();
        self.fcsr.update(raised, self.pc)
    }

    /// `end_fp_op` with a flag mask, for operations whose inexact result
    /// is architecturally invisible.
    pub fn end_fp_op_masked(&mut self, mask: u32) -> Result<(), Trap> {
        let raised = self.fp_status.take();
        self.fcsr.update_masked(raised, mask, self.pc)
    }
}
