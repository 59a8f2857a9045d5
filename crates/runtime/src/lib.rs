//! Opal Runtime: the library linked into compiled Opal programs
//!
//! The code generator lowers every surface operation to a C-ABI call
//! into this crate. Values cross the boundary as opaque handles over the
//! `opal-core` value subsystem:
//!
//! - `numeric` → tagged numeric handle (machine integer, double, or
//!   arbitrary-precision decimal, promoted on overflow)
//! - `string` → SSO envelope handle (inline up to 23 bytes, heap beyond)
//! - `boolean` → plain i64 0/1 at the ABI
//! - `numeric?` / `string?` / `boolean?` → optional wrapper handles
//!
//! Contract violations in generated code terminate the process with
//! fixed exit codes: 42 for sequence bounds violations, 43 for generic
//! runtime errors (optional get on none, division by zero).

pub mod arithmetic;
pub mod bigdec_ops;
pub mod error;
pub mod file;
pub mod io;
pub mod list_ops;
pub mod map_ops;
pub mod mathx;
pub mod numeric_ops;
pub mod optional_ops;
pub mod state;
pub mod string_ops;

// Re-export key functions with short names for internal use
pub use error::{
    EXIT_BOUNDS, EXIT_RUNTIME, bounds_fatal, clear_runtime_error, has_runtime_error,
    opal_clear_error as clear_error, opal_get_error as get_error, opal_has_error as has_error,
    runtime_fatal, set_runtime_error, take_runtime_error,
};

pub use arithmetic::{
    opal_add_will_overflow as add_will_overflow, opal_mul_will_overflow as mul_will_overflow,
    opal_safe_add as safe_add, opal_safe_mul as safe_mul, opal_safe_sub as safe_sub,
    opal_sub_will_overflow as sub_will_overflow,
};

pub use numeric_ops::{
    opal_numeric_add as numeric_add, opal_numeric_compare as numeric_compare,
    opal_numeric_div as numeric_div, opal_numeric_free as numeric_free,
    opal_numeric_from_literal as numeric_from_literal, opal_numeric_mul as numeric_mul,
    opal_numeric_neg as numeric_neg, opal_numeric_sub as numeric_sub,
    opal_numeric_to_string as numeric_to_string,
};

pub use string_ops::{
    opal_string_concat as string_concat, opal_string_create as string_create,
    opal_string_equals as string_equals, opal_string_find as string_find,
    opal_string_free as string_free, opal_string_length as string_length,
    opal_string_substring as string_substring,
};

pub use state::{
    state_clear, state_close, state_config_set, state_delete, state_get, state_has, state_init,
    state_load, state_save, state_set, state_stats,
};

// The core value types, for embedders and tests.
pub use opal_core::{BigDec, Numeric, OpalMap, OpalOptional, OpalString, Sequence};
