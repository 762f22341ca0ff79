//! Floating-point control/status register and per-instruction flag
//! bookkeeping.
//!
//! FCSR layout (guest- and debugger-visible, bit-exact):
//!   [4:0]   enabled-exception mask
//!   [9:8]   rounding mode (0 = nearest-even, 1 = toward-zero, 2 = up, 3 = down)
//!   [20:16] sticky exception flags
//!   [28:24] cause bits (flags of the most recent FP instruction only)
//!
//! All three 5-bit fields use the same per-exception encoding, see the
//! `NX`..`NV` constants.

use crate::cpu::Trap;

// Exception flags (architectural encoding, shared by the enable, sticky
// and cause fields).
pub const NX: u32 = 0x01; // inexact
pub const UF: u32 = 0x02; // underflow
pub const OF: u32 = 0x04; // overflow
pub const DZ: u32 = 0x08; // divide by zero
pub const NV: u32 = 0x10; // invalid operation

const ENABLE_SHIFT: u32 = 0;
const RM_SHIFT: u32 = 8;
const FLAGS_SHIFT: u32 = 16;
const CAUSE_SHIFT: u32 = 24;

/// Bits that are actually backed by state; everything else reads as zero.
const WRITE_MASK: u32 =
    (0x1F << ENABLE_SHIFT) | (0x3 << RM_SHIFT) | (0x1F << FLAGS_SHIFT) | (0x1F << CAUSE_SHIFT);

/// IEEE-754 directed rounding policy, in the FCSR encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundMode {
    #[default]
    NearestEven = 0,
    TowardZero = 1,
    Up = 2,
    Down = 3,
}

impl RoundMode {
    pub fn from_bits(v: u32) -> Self {
        match v & 3 {
            0 => RoundMode::NearestEven,
            1 => RoundMode::TowardZero,
            2 => RoundMode::Up,
            _ => RoundMode::Down,
        }
    }
}

/// The architectural FCSR.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fcsr {
    bits: u32,
}

impl Fcsr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw register value, as read by the debug stub.
    #[inline]
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Raw register write; hardwired-zero bits are dropped.
    pub fn set_bits(&mut self, v: u32) {
        if v & !WRITE_MASK != 0 {
            log::debug!("ignoring write to reserved fcsr bits: {:#010x}", v);
        }
        self.bits = v & WRITE_MASK;
    }

    #[inline]
    pub fn enables(&self) -> u32 {
        (self.bits >> ENABLE_SHIFT) & 0x1F
    }

    pub fn set_enables(&mut self, e: u32) {
        self.bits = (self.bits & !(0x1F << ENABLE_SHIFT)) | ((e & 0x1F) << ENABLE_SHIFT);
    }

    #[inline]
    pub fn rounding_mode(&self) -> RoundMode {
        RoundMode::from_bits(self.bits >> RM_SHIFT)
    }

    pub fn set_rounding_mode(&mut self, rm: RoundMode) {
        self.bits = (self.bits & !(0x3 << RM_SHIFT)) | ((rm as u32) << RM_SHIFT);
    }

    /// Sticky exception flags.
    #[inline]
    pub fn flags(&self) -> u32 {
        (self.bits >> FLAGS_SHIFT) & 0x1F
    }

    pub fn clear_flags(&mut self) {
        self.bits &= !(0x1F << FLAGS_SHIFT);
    }

    /// Cause bits of the most recent FP instruction.
    #[inline]
    pub fn cause(&self) -> u32 {
        (self.bits >> CAUSE_SHIFT) & 0x1F
    }

    /// Merge the flags accumulated over one instruction into architectural
    /// state: cause is overwritten, then either a trap is raised (sticky
    /// flags untouched) or the flags become sticky.
    pub fn update(&mut self, raised: u32, pc: u64) -> Result<(), Trap> {
        let raised = raised & 0x1F;
        self.bits = (self.bits & !(0x1F << CAUSE_SHIFT)) | (raised << CAUSE_SHIFT);
        if raised & self.enables() != 0 {
            log::trace!(
                "fp exception at pc={:#x}: cause={:#07b} enables={:#07b}",
                pc,
                raised,
                self.enables()
            );
            return Err(Trap::FloatingPointException { pc });
        }
        self.bits |= raised << FLAGS_SHIFT;
        Ok(())
    }

    /// Like `update`, but `mask` suppresses flags before the merge.
    /// Used by the log2 family, whose inexact result must not trap.
    pub fn update_masked(&mut self, raised: u32, mask: u32, pc: u64) -> Result<(), Trap> {
        self.update(raised & mask, pc)
    }
}

/// Transient per-instruction FP state: the rounding mode in effect and the
/// set of exceptions raised so far. Cleared at instruction start so repeated
/// accumulation never double-counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct FpStatus {
    pub rm: RoundMode,
    flags: u32,
}

impl FpStatus {
    #[inline]
    pub fn raise(&mut self, flags: u32) {
        self.flags |= flags;
    }

    #[inline]
    pub fn raised(&self) -> u32 {
        self.flags
    }

    /// Read and clear the accumulated flags.
    #[inline]
    pub fn take(&mut self) -> u32 {
        std::mem::take(&mut self.flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_mode_round_trips() {
        let mut f = Fcsr::new();
        for rm in [
            RoundMode::NearestEven,
            RoundMode::TowardZero,
            RoundMode::Up,
            RoundMode::Down,
        ] {
            f.set_rounding_mode(rm);
            assert_eq!(f.rounding_mode(), rm);
        }
    }

    #[test]
    fn reserved_bits_read_as_zero() {
        let mut f = Fcsr::new();
        f.set_bits(0xFFFF_FFFF);
        assert_eq!(f.bits(), 0x1F1F_031F);
    }

    #[test]
    fn update_accumulates_sticky_and_overwrites_cause() {
        let mut f = Fcsr::new();
        f.update(NX | UF, 0).unwrap();
        assert_eq!(f.flags(), NX | UF);
        assert_eq!(f.cause(), NX | UF);
        f.update(NV, 0).unwrap();
        assert_eq!(f.flags(), NX | UF | NV);
        assert_eq!(f.cause(), NV);
        f.update(0, 0).unwrap();
        assert_eq!(f.cause(), 0);
        assert_eq!(f.flags(), NX | UF | NV);
    }

    #[test]
    fn enabled_exception_traps_and_skips_sticky() {
        let mut f = Fcsr::new();
        f.set_enables(NV);
        let err = f.update(NV | NX, 0x1234).unwrap_err();
        assert_eq!(err, Trap::FloatingPointException { pc: 0x1234 });
        assert_eq!(f.cause(), NV | NX);
        assert_eq!(f.flags(), 0);
    }

    #[test]
    fn masked_update_suppresses_flags() {
        let mut f = Fcsr::new();
        f.set_enables(NX);
        f.update_masked(NX | DZ, !NX, 0).unwrap();
        assert_eq!(f.cause(), DZ);
        assert_eq!(f.flags(), DZ);
    }
}
