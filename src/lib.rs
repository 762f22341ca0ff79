//! Scalar FP and 128/256-bit SIMD execution engine with bit-exact IEEE-754
//! semantics and architectural FCSR exception bookkeeping.
//!
//! The crate is the arithmetic back half of an emulated CPU: a host
//! front-end decodes instructions and calls the helper functions under
//! [`cpu`] with register indices and an operating width. Everything
//! guest-visible lives in [`cpu::Cpu`].

pub mod cpu;
