//! Overflow probes and safe arithmetic
//!
//! These functions are exported with C ABI for LLVM codegen to call.
//!
//! # Safety Contract
//!
//! **IMPORTANT:** These functions are designed to be called ONLY by
//! compiler-generated code, not by end users or arbitrary C code. The code
//! generator wraps every integer arithmetic op over surface `numeric`
//! values with one of the `opal_safe_*` operations; when the overflow flag
//! comes back set, both operands are promoted to arbitrary precision and
//! the operation retried there (see `numeric_ops`).
//!
//! The probes are pure predicates with no side effects; the `safe_*`
//! variants write the result (or zero on overflow) through an out
//! pointer and return the overflow flag.

use opal_core::overflow;

/// True when `a + b` would overflow a signed 64-bit integer.
#[unsafe(no_mangle)]
pub extern "C" fn opal_add_will_overflow(a: i64, b: i64) -> bool {
    overflow::add_would_overflow(a, b)
}

/// True when `a - b` would overflow a signed 64-bit integer.
#[unsafe(no_mangle)]
pub extern "C" fn opal_sub_will_overflow(a: i64, b: i64) -> bool {
    overflow::sub_would_overflow(a, b)
}

/// True when `a * b` would overflow a signed 64-bit integer.
#[unsafe(no_mangle)]
pub extern "C" fn opal_mul_will_overflow(a: i64, b: i64) -> bool {
    overflow::mul_would_overflow(a, b)
}

/// Add with overflow report. Writes the sum (or zero on overflow) to
/// `result` and returns the overflow flag.
///
/// # Safety
/// `result` must be a valid pointer to writable memory for one i64.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_safe_add(a: i64, b: i64, result: *mut i64) -> bool {
    let (r, overflow) = overflow::safe_add(a, b);
    unsafe { *result = r };
    overflow
}

/// Subtract with overflow report (see `opal_safe_add`).
///
/// # Safety
/// `result` must be a valid pointer to writable memory for one i64.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_safe_sub(a: i64, b: i64, result: *mut i64) -> bool {
    let (r, overflow) = overflow::safe_sub(a, b);
    unsafe { *result = r };
    overflow
}

/// Multiply with overflow report (see `opal_safe_add`).
///
/// # Safety
/// `result` must be a valid pointer to writable memory for one i64.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_safe_mul(a: i64, b: i64, result: *mut i64) -> bool {
    let (r, overflow) = overflow::safe_mul(a, b);
    unsafe { *result = r };
    overflow
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probes() {
        assert!(!opal_add_will_overflow(100, 200));
        assert!(opal_add_will_overflow(i64::MAX, 1));
        assert!(opal_add_will_overflow(i64::MIN, -1));
        assert!(opal_sub_will_overflow(i64::MIN, 1));
        assert!(!opal_sub_will_overflow(200, 100));
        assert!(opal_mul_will_overflow(i64::MAX, 2));
        assert!(!opal_mul_will_overflow(i64::MAX, 1));
        assert!(!opal_mul_will_overflow(i64::MAX, 0));
    }

    #[test]
    fn test_safe_add() {
        let mut out = 0i64;
        assert!(!unsafe { opal_safe_add(100, 200, &mut out) });
        assert_eq!(out, 300);
        assert!(unsafe { opal_safe_add(i64::MAX, 1, &mut out) });
        assert_eq!(out, 0);
    }

    #[test]
    fn test_safe_sub() {
        let mut out = 0i64;
        assert!(!unsafe { opal_safe_sub(200, 100, &mut out) });
        assert_eq!(out, 100);
        assert!(unsafe { opal_safe_sub(i64::MIN, 1, &mut out) });
        assert_eq!(out, 0);
    }

    #[test]
    fn test_safe_mul() {
        let mut out = 0i64;
        assert!(!unsafe { opal_safe_mul(1_000_000, 1_000_000, &mut out) });
        assert_eq!(out, 1_000_000_000_000);
        assert!(unsafe { opal_safe_mul(i64::MAX, 2, &mut out) });
        assert_eq!(out, 0);
    }
}
