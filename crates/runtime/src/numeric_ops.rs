//! Tagged numeric operations
//!
//! These functions are exported with C ABI for LLVM codegen to call. A
//! surface `numeric` value is an opaque handle (`*mut Numeric`) whose
//! storage kind — machine integer, double, or arbitrary-precision decimal
//! — was chosen at construction and travels with the value.
//!
//! # Ownership
//!
//! Every constructor and combinator returns a handle owned by the caller,
//! to be released exactly once with `opal_numeric_free`. Operands are
//! borrowed, never consumed.
//!
//! # Safety Contract
//!
//! Handles passed in must come from this module's constructors and must
//! not have been freed. The compiler's type checker guarantees operand
//! kinds; these functions only dispatch on the runtime tag.

use crate::error::runtime_fatal;
use opal_core::Numeric;
use std::cmp::Ordering;
use std::ffi::CStr;
use std::os::raw::c_char;

unsafe fn numeric_ref<'a>(p: *const Numeric, what: &str) -> &'a Numeric {
    assert!(!p.is_null(), "{what}: null numeric handle");
    unsafe { &*p }
}

fn export(n: Numeric) -> *mut Numeric {
    Box::into_raw(Box::new(n))
}

/// Build a numeric from literal text, inferring the storage kind
/// (integers that fit stay machine-sized, wider integers start big,
/// decimal-point literals are doubles). Returns null for text that is
/// not a numeric literal.
///
/// # Safety
/// `text` must be a valid nul-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_numeric_from_literal(text: *const c_char) -> *mut Numeric {
    assert!(!text.is_null(), "numeric_from_literal: null text");
    let text = unsafe { CStr::from_ptr(text) };
    match text.to_str().ok().and_then(Numeric::from_literal) {
        Some(n) => export(n),
        None => std::ptr::null_mut(),
    }
}

/// Wrap a machine integer.
#[unsafe(no_mangle)]
pub extern "C" fn opal_numeric_from_i64(v: i64) -> *mut Numeric {
    export(Numeric::Int(v))
}

/// Wrap a double.
#[unsafe(no_mangle)]
pub extern "C" fn opal_numeric_from_f64(v: f64) -> *mut Numeric {
    export(Numeric::Float(v))
}

/// The storage-kind discriminant (1 = i64, 2 = f64, 3 = big).
///
/// # Safety
/// `p` must be a valid numeric handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_numeric_kind(p: *const Numeric) -> u8 {
    unsafe { numeric_ref(p, "numeric_kind") }.kind()
}

/// Deep copy.
///
/// # Safety
/// `p` must be a valid numeric handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_numeric_clone(p: *const Numeric) -> *mut Numeric {
    export(unsafe { numeric_ref(p, "numeric_clone") }.clone())
}

/// Release a numeric handle.
///
/// # Safety
/// `p` must be null or an owned handle, not used again after this call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_numeric_free(p: *mut Numeric) {
    if !p.is_null() {
        unsafe {
            drop(Box::from_raw(p));
        }
    }
}

/// Add. The integer fast path is probed for overflow and promotes both
/// operands to arbitrary precision when it trips.
///
/// # Safety
/// `a` and `b` must be valid numeric handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_numeric_add(a: *const Numeric, b: *const Numeric) -> *mut Numeric {
    let a = unsafe { numeric_ref(a, "numeric_add") };
    let b = unsafe { numeric_ref(b, "numeric_add") };
    export(a.add(b))
}

/// Subtract (a - b).
///
/// # Safety
/// `a` and `b` must be valid numeric handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_numeric_sub(a: *const Numeric, b: *const Numeric) -> *mut Numeric {
    let a = unsafe { numeric_ref(a, "numeric_sub") };
    let b = unsafe { numeric_ref(b, "numeric_sub") };
    export(a.sub(b))
}

/// Multiply.
///
/// # Safety
/// `a` and `b` must be valid numeric handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_numeric_mul(a: *const Numeric, b: *const Numeric) -> *mut Numeric {
    let a = unsafe { numeric_ref(a, "numeric_mul") };
    let b = unsafe { numeric_ref(b, "numeric_mul") };
    export(a.mul(b))
}

/// Truncating division (a / b). Division by zero terminates with exit
/// code 43.
///
/// # Safety
/// `a` and `b` must be valid numeric handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_numeric_div(a: *const Numeric, b: *const Numeric) -> *mut Numeric {
    let a = unsafe { numeric_ref(a, "numeric_div") };
    let b = unsafe { numeric_ref(b, "numeric_div") };
    match a.div(b) {
        Some(r) => export(r),
        None => runtime_fatal("division by zero"),
    }
}

/// Additive inverse.
///
/// # Safety
/// `p` must be a valid numeric handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_numeric_neg(p: *const Numeric) -> *mut Numeric {
    export(unsafe { numeric_ref(p, "numeric_neg") }.neg())
}

/// Three-way compare: -1, 0 or 1. Agrees with the mathematical order of
/// the represented values across storage kinds.
///
/// # Safety
/// `a` and `b` must be valid numeric handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_numeric_compare(a: *const Numeric, b: *const Numeric) -> i64 {
    let a = unsafe { numeric_ref(a, "numeric_compare") };
    let b = unsafe { numeric_ref(b, "numeric_compare") };
    match a.compare(b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

/// Equality by magnitude (1/0). An i64 and a big denoting the same
/// integer are equal.
///
/// # Safety
/// `a` and `b` must be valid numeric handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_numeric_eq(a: *const Numeric, b: *const Numeric) -> i64 {
    (unsafe { opal_numeric_compare(a, b) } == 0) as i64
}

/// The observable console form of the value, as an SSO string handle.
///
/// # Safety
/// `p` must be a valid numeric handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_numeric_to_string(
    p: *const Numeric,
) -> *mut opal_core::OpalString {
    let n = unsafe { numeric_ref(p, "numeric_to_string") };
    Box::into_raw(Box::new(opal_core::OpalString::new(
        n.to_string().as_bytes(),
    )))
}

/// Narrow to a machine integer: exact for the integer kind, truncating
/// toward zero for doubles, clamping to the representable range for
/// bigs. Generated code uses this for byte indices and counts.
///
/// # Safety
/// `p` must be a valid numeric handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_numeric_as_i64(p: *const Numeric) -> i64 {
    match unsafe { numeric_ref(p, "numeric_as_i64") } {
        Numeric::Int(v) => *v,
        Numeric::Float(v) => {
            // `as` saturates at the range ends and maps NaN to zero.
            v.trunc() as i64
        }
        Numeric::Big(b) => {
            let text = b.to_string();
            match text.parse::<i64>() {
                Ok(v) => v,
                Err(_) if b.is_negative() => i64::MIN,
                Err(_) => i64::MAX,
            }
        }
    }
}

/// Parse a string payload as a numeric, with the same kind inference as
/// literal text. Unparseable payloads yield integer zero.
///
/// # Safety
/// `s` must be a valid string handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_numeric_parse(s: *const opal_core::OpalString) -> *mut Numeric {
    assert!(!s.is_null(), "numeric_parse: null string handle");
    let s = unsafe { &*s };
    let parsed = std::str::from_utf8(s.as_bytes())
        .ok()
        .and_then(|text| Numeric::from_literal(text.trim()));
    export(parsed.unwrap_or(Numeric::Int(0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    unsafe fn value_of(p: *mut Numeric) -> String {
        let s = unsafe { numeric_ref(p, "test") }.to_string();
        unsafe { opal_numeric_free(p) };
        s
    }

    #[test]
    fn test_literal_construction() {
        unsafe {
            let text = CString::new("42").unwrap();
            let n = opal_numeric_from_literal(text.as_ptr());
            assert_eq!(opal_numeric_kind(n), opal_core::KIND_I64);
            assert_eq!(value_of(n), "42");

            let text = CString::new("9223372036854775808").unwrap();
            let n = opal_numeric_from_literal(text.as_ptr());
            assert_eq!(opal_numeric_kind(n), opal_core::KIND_BIG);
            assert_eq!(value_of(n), "9223372036854775808");

            let text = CString::new("2.5").unwrap();
            let n = opal_numeric_from_literal(text.as_ptr());
            assert_eq!(opal_numeric_kind(n), opal_core::KIND_F64);
            assert_eq!(value_of(n), "2.5");

            let text = CString::new("not a number").unwrap();
            assert!(opal_numeric_from_literal(text.as_ptr()).is_null());
        }
    }

    #[test]
    fn test_add_promotes_on_overflow() {
        unsafe {
            let a = opal_numeric_from_i64(i64::MAX);
            let b = opal_numeric_from_i64(1);
            let r = opal_numeric_add(a, b);
            assert_eq!(opal_numeric_kind(r), opal_core::KIND_BIG);
            assert_eq!(value_of(r), "9223372036854775808");
            opal_numeric_free(a);
            opal_numeric_free(b);
        }
    }

    #[test]
    fn test_arithmetic_fast_path() {
        unsafe {
            let a = opal_numeric_from_i64(6);
            let b = opal_numeric_from_i64(7);
            let r = opal_numeric_mul(a, b);
            assert_eq!(opal_numeric_kind(r), opal_core::KIND_I64);
            assert_eq!(value_of(r), "42");

            let r = opal_numeric_sub(a, b);
            assert_eq!(value_of(r), "-1");

            let r = opal_numeric_div(b, a);
            assert_eq!(value_of(r), "1");

            opal_numeric_free(a);
            opal_numeric_free(b);
        }
    }

    #[test]
    fn test_compare_and_eq() {
        unsafe {
            let small = opal_numeric_from_i64(5);
            let big = opal_numeric_from_i64(9);
            assert_eq!(opal_numeric_compare(small, big), -1);
            assert_eq!(opal_numeric_compare(big, small), 1);
            assert_eq!(opal_numeric_compare(small, small), 0);
            assert_eq!(opal_numeric_eq(small, small), 1);
            assert_eq!(opal_numeric_eq(small, big), 0);
            opal_numeric_free(small);
            opal_numeric_free(big);
        }
    }

    #[test]
    fn test_neg_and_clone() {
        unsafe {
            let n = opal_numeric_from_i64(5);
            let m = opal_numeric_neg(n);
            let c = opal_numeric_clone(m);
            assert_eq!(value_of(m), "-5");
            assert_eq!(value_of(c), "-5");
            opal_numeric_free(n);
        }
    }

    #[test]
    fn test_as_i64() {
        unsafe {
            let n = opal_numeric_from_i64(42);
            assert_eq!(opal_numeric_as_i64(n), 42);
            opal_numeric_free(n);

            let f = opal_numeric_from_f64(-2.9);
            assert_eq!(opal_numeric_as_i64(f), -2);
            opal_numeric_free(f);

            let text = CString::new("99999999999999999999").unwrap();
            let big = opal_numeric_from_literal(text.as_ptr());
            assert_eq!(opal_numeric_as_i64(big), i64::MAX);
            opal_numeric_free(big);
        }
    }

    #[test]
    fn test_parse_string_payload() {
        unsafe {
            let s = Box::into_raw(Box::new(opal_core::OpalString::new(b" 123 ")));
            let n = opal_numeric_parse(s);
            assert_eq!(value_of(n), "123");

            let bad = Box::into_raw(Box::new(opal_core::OpalString::new(b"junk")));
            let z = opal_numeric_parse(bad);
            assert_eq!(value_of(z), "0");

            drop(Box::from_raw(s));
            drop(Box::from_raw(bad));
        }
    }

    #[test]
    fn test_to_string_handle() {
        unsafe {
            let n = opal_numeric_from_f64(1.5);
            let s = opal_numeric_to_string(n);
            assert_eq!((*s).as_bytes(), b"1.5");
            drop(Box::from_raw(s));
            opal_numeric_free(n);
        }
    }
}
