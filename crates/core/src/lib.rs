//! Opal Core: the value subsystem of the Opal runtime
//!
//! Everything compiled Opal programs compute with lives here, behind the
//! "smart type" discipline: values pick the cheapest representation that
//! holds them and migrate transparently when they outgrow it.
//!
//! Key design principles:
//! - Tagged numerics: machine integers by default, promoted to arbitrary
//!   precision exactly when an operation would overflow
//! - SSO strings: payloads up to 23 bytes live inline in a 24-byte
//!   envelope; longer payloads own a heap buffer, behind one API
//! - Containers copy the bytes handed to them and own what they hold
//!
//! # Modules
//!
//! - `bigdec`: sign-magnitude arbitrary-precision decimal integers
//! - `overflow`: exact overflow probes for signed 64-bit arithmetic
//! - `numeric`: the tagged numeric surface type
//! - `sso`: small-string-optimized byte strings
//! - `list`: generic homogeneous dynamic sequences
//! - `map`: string-keyed chained hash maps (FNV-1a)
//! - `optional`: presence-tagged value wrappers

pub mod bigdec;
pub mod list;
pub mod map;
pub mod numeric;
pub mod optional;
pub mod overflow;
pub mod sso;

// Re-export key types and functions
pub use bigdec::{BigDec, ParseBigDecError};
pub use list::Sequence;
pub use map::{OpalMap, fnv1a};
pub use numeric::{KIND_BIG, KIND_F64, KIND_I64, Numeric, format_g};
pub use optional::{OpalOptional, coalesce};
pub use overflow::{
    add_would_overflow, mul_would_overflow, safe_add, safe_mul, safe_sub, sub_would_overflow,
};
pub use sso::{OpalString, SSO_ENVELOPE, SSO_INLINE_CAP};
