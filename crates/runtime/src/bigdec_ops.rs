//! Arbitrary-precision decimal operations
//!
//! C-ABI surface over the [`BigDec`] engine, for generated code that
//! works with big values directly (literals too wide for a machine
//! integer) and for the promotion path out of the overflow probes.
//!
//! # Ownership
//!
//! Handles are owned by the caller and released exactly once with
//! `opal_bigdec_free`. Operands are borrowed. `opal_bigdec_to_string`
//! transfers a fresh C string to the caller (`opal_cstr_free`).

use crate::error::runtime_fatal;
use opal_core::BigDec;
use std::cmp::Ordering;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

unsafe fn bigdec_ref<'a>(p: *const BigDec, what: &str) -> &'a BigDec {
    assert!(!p.is_null(), "{what}: null bigdec handle");
    unsafe { &*p }
}

fn export(b: BigDec) -> *mut BigDec {
    Box::into_raw(Box::new(b))
}

/// Build from a machine integer (the promotion path).
#[unsafe(no_mangle)]
pub extern "C" fn opal_bigdec_from_i64(v: i64) -> *mut BigDec {
    export(BigDec::from_i64(v))
}

/// Parse a decimal literal (optional leading `-`, at least one digit).
/// Returns null on malformed text.
///
/// # Safety
/// `text` must be a valid nul-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_bigdec_from_string(text: *const c_char) -> *mut BigDec {
    assert!(!text.is_null(), "bigdec_from_string: null text");
    let text = unsafe { CStr::from_ptr(text) };
    match text.to_str().ok().and_then(|s| s.parse::<BigDec>().ok()) {
        Some(b) => export(b),
        None => std::ptr::null_mut(),
    }
}

/// Signed addition.
///
/// # Safety
/// `a` and `b` must be valid bigdec handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_bigdec_add(a: *const BigDec, b: *const BigDec) -> *mut BigDec {
    let a = unsafe { bigdec_ref(a, "bigdec_add") };
    let b = unsafe { bigdec_ref(b, "bigdec_add") };
    export(a.add(b))
}

/// Signed subtraction (a - b).
///
/// # Safety
/// `a` and `b` must be valid bigdec handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_bigdec_sub(a: *const BigDec, b: *const BigDec) -> *mut BigDec {
    let a = unsafe { bigdec_ref(a, "bigdec_sub") };
    let b = unsafe { bigdec_ref(b, "bigdec_sub") };
    export(a.sub(b))
}

/// Signed multiplication.
///
/// # Safety
/// `a` and `b` must be valid bigdec handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_bigdec_mul(a: *const BigDec, b: *const BigDec) -> *mut BigDec {
    let a = unsafe { bigdec_ref(a, "bigdec_mul") };
    let b = unsafe { bigdec_ref(b, "bigdec_mul") };
    export(a.mul(b))
}

/// Truncating division at full precision. Division by zero terminates
/// with exit code 43.
///
/// # Safety
/// `a` and `b` must be valid bigdec handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_bigdec_div(a: *const BigDec, b: *const BigDec) -> *mut BigDec {
    let a = unsafe { bigdec_ref(a, "bigdec_div") };
    let b = unsafe { bigdec_ref(b, "bigdec_div") };
    match a.div(b) {
        Some(r) => export(r),
        None => runtime_fatal("division by zero"),
    }
}

/// Three-way compare: -1, 0 or 1.
///
/// # Safety
/// `a` and `b` must be valid bigdec handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_bigdec_compare(a: *const BigDec, b: *const BigDec) -> i64 {
    let a = unsafe { bigdec_ref(a, "bigdec_compare") };
    let b = unsafe { bigdec_ref(b, "bigdec_compare") };
    match a.cmp(b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

/// The canonical digit string with a leading `-` when negative, as a
/// fresh C string the caller must free with `opal_cstr_free`.
///
/// # Safety
/// `p` must be a valid bigdec handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_bigdec_to_string(p: *const BigDec) -> *mut c_char {
    let b = unsafe { bigdec_ref(p, "bigdec_to_string") };
    CString::new(b.to_string())
        .expect("digit strings contain no nul bytes")
        .into_raw()
}

/// Release a bigdec handle.
///
/// # Safety
/// `p` must be null or an owned handle, not used again after this call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_bigdec_free(p: *mut BigDec) {
    if !p.is_null() {
        unsafe {
            drop(Box::from_raw(p));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    unsafe fn text_of(b: *const BigDec) -> String {
        let c = unsafe { opal_bigdec_to_string(b) };
        let s = unsafe { CStr::from_ptr(c) }.to_str().unwrap().to_string();
        unsafe { crate::error::opal_cstr_free(c) };
        s
    }

    #[test]
    fn test_construction_round_trip() {
        unsafe {
            let b = opal_bigdec_from_i64(12345);
            assert_eq!(text_of(b), "12345");
            opal_bigdec_free(b);

            let b = opal_bigdec_from_i64(-67890);
            assert_eq!(text_of(b), "-67890");
            opal_bigdec_free(b);

            let text = CString::new("999999999999999999").unwrap();
            let b = opal_bigdec_from_string(text.as_ptr());
            assert_eq!(text_of(b), "999999999999999999");
            opal_bigdec_free(b);

            let bad = CString::new("12x").unwrap();
            assert!(opal_bigdec_from_string(bad.as_ptr()).is_null());
        }
    }

    #[test]
    fn test_arithmetic() {
        unsafe {
            let a = opal_bigdec_from_i64(100);
            let b = opal_bigdec_from_i64(200);
            let sum = opal_bigdec_add(a, b);
            assert_eq!(text_of(sum), "300");

            let diff = opal_bigdec_sub(b, a);
            assert_eq!(text_of(diff), "100");

            let prod = opal_bigdec_mul(a, b);
            assert_eq!(text_of(prod), "20000");

            let quot = opal_bigdec_div(b, a);
            assert_eq!(text_of(quot), "2");

            for p in [a, b, sum, diff, prod, quot] {
                opal_bigdec_free(p);
            }
        }
    }

    #[test]
    fn test_negative_addition() {
        unsafe {
            let a = opal_bigdec_from_i64(-50);
            let b = opal_bigdec_from_i64(30);
            let r = opal_bigdec_add(a, b);
            assert_eq!(text_of(r), "-20");
            opal_bigdec_free(a);
            opal_bigdec_free(b);
            opal_bigdec_free(r);
        }
    }

    #[test]
    fn test_compare() {
        unsafe {
            let a = opal_bigdec_from_i64(50);
            let b = opal_bigdec_from_i64(100);
            let n = opal_bigdec_from_i64(-100);
            assert_eq!(opal_bigdec_compare(a, b), -1);
            assert_eq!(opal_bigdec_compare(b, a), 1);
            assert_eq!(opal_bigdec_compare(a, a), 0);
            assert_eq!(opal_bigdec_compare(n, a), -1);
            for p in [a, b, n] {
                opal_bigdec_free(p);
            }
        }
    }
}
