//! Math helpers
//!
//! The surface builtins `min`, `max` and `abs`, exported with C ABI:
//! once over raw machine integers for the inline fast path, and once
//! over tagged numeric handles for values that may have been promoted.

use opal_core::Numeric;
use std::cmp::Ordering;

/// Minimum of two machine integers.
#[unsafe(no_mangle)]
pub extern "C" fn opal_min(a: i64, b: i64) -> i64 {
    a.min(b)
}

/// Maximum of two machine integers.
#[unsafe(no_mangle)]
pub extern "C" fn opal_max(a: i64, b: i64) -> i64 {
    a.max(b)
}

/// Absolute value of a machine integer. `i64::MIN` has no machine
/// counterpart; it saturates to `i64::MAX` (the tagged variant below is
/// exact).
#[unsafe(no_mangle)]
pub extern "C" fn opal_abs(v: i64) -> i64 {
    v.checked_abs().unwrap_or(i64::MAX)
}

/// Minimum of two tagged numerics. Returns a fresh handle.
///
/// # Safety
/// `a` and `b` must be valid numeric handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_numeric_min(a: *const Numeric, b: *const Numeric) -> *mut Numeric {
    assert!(!a.is_null() && !b.is_null(), "numeric_min: null handle");
    let (a, b) = unsafe { (&*a, &*b) };
    let winner = if a.compare(b) == Ordering::Greater { b } else { a };
    Box::into_raw(Box::new(winner.clone()))
}

/// Maximum of two tagged numerics. Returns a fresh handle.
///
/// # Safety
/// `a` and `b` must be valid numeric handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_numeric_max(a: *const Numeric, b: *const Numeric) -> *mut Numeric {
    assert!(!a.is_null() && !b.is_null(), "numeric_max: null handle");
    let (a, b) = unsafe { (&*a, &*b) };
    let winner = if a.compare(b) == Ordering::Less { b } else { a };
    Box::into_raw(Box::new(winner.clone()))
}

/// Absolute value of a tagged numeric. Exact for every kind: negating
/// `i64::MIN` promotes to arbitrary precision.
///
/// # Safety
/// `p` must be a valid numeric handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_numeric_abs(p: *const Numeric) -> *mut Numeric {
    assert!(!p.is_null(), "numeric_abs: null handle");
    let n = unsafe { &*p };
    let result = match n {
        Numeric::Int(v) if *v < 0 => n.neg(),
        Numeric::Float(v) if *v < 0.0 => Numeric::Float(-v),
        Numeric::Big(b) if b.is_negative() => n.neg(),
        _ => n.clone(),
    };
    Box::into_raw(Box::new(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric_ops::{opal_numeric_free, opal_numeric_from_i64};

    #[test]
    fn test_machine_helpers() {
        assert_eq!(opal_min(3, 5), 3);
        assert_eq!(opal_max(3, 5), 5);
        assert_eq!(opal_abs(-7), 7);
        assert_eq!(opal_abs(7), 7);
        assert_eq!(opal_abs(i64::MIN), i64::MAX);
    }

    #[test]
    fn test_numeric_min_max() {
        unsafe {
            let a = opal_numeric_from_i64(3);
            let b = opal_numeric_from_i64(5);
            let lo = opal_numeric_min(a, b);
            let hi = opal_numeric_max(a, b);
            assert_eq!((*lo).to_string(), "3");
            assert_eq!((*hi).to_string(), "5");
            for p in [a, b, lo, hi] {
                opal_numeric_free(p);
            }
        }
    }

    #[test]
    fn test_numeric_abs_min_edge() {
        unsafe {
            let v = opal_numeric_from_i64(i64::MIN);
            let r = opal_numeric_abs(v);
            assert_eq!((*r).to_string(), "9223372036854775808");
            opal_numeric_free(v);
            opal_numeric_free(r);
        }
    }
}
