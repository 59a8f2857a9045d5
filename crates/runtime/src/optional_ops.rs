//! Optional operations
//!
//! These functions are exported with C ABI for LLVM codegen to call. The
//! surface optional types (`numeric?`, `string?`, `boolean?`) lower to a
//! presence-tagged wrapper ([`OpalOptional`]) owning the wrapped value
//! buffer.
//!
//! # Ownership
//!
//! `opal_optional_some` copies the caller's bytes. The per-type helpers
//! wrap an existing handle: the wrapper then carries the handle, and
//! whoever extracts it with a typed getter takes over that handle's
//! ownership (the wrapper itself never frees wrapped handles — generated
//! code extracts before releasing the wrapper).
//!
//! Extracting from an absent optional is a contract violation in
//! generated code and terminates with exit code 43.

use crate::error::runtime_fatal;
use opal_core::{Numeric, OpalOptional, OpalString, coalesce};
use std::ffi::CStr;
use std::os::raw::c_char;

unsafe fn optional_ref<'a>(p: *const OpalOptional, what: &str) -> &'a OpalOptional {
    assert!(!p.is_null(), "{what}: null optional handle");
    unsafe { &*p }
}

fn export(o: OpalOptional) -> *mut OpalOptional {
    Box::into_raw(Box::new(o))
}

fn handle_buffer<T>(handle: *mut T) -> Box<[u8]> {
    (handle as usize).to_ne_bytes().into()
}

unsafe fn buffer_handle<T>(bytes: &[u8], what: &str) -> *mut T {
    let raw: [u8; 8] = bytes
        .try_into()
        .unwrap_or_else(|_| panic!("{what}: wrapped value is not a handle"));
    usize::from_ne_bytes(raw) as *mut T
}

/// The absent value.
#[unsafe(no_mangle)]
pub extern "C" fn opal_optional_none() -> *mut OpalOptional {
    export(OpalOptional::none())
}

/// Wrap a copy of `size` bytes from `value`.
///
/// # Safety
/// `value` must point to at least `size` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_optional_some(value: *const u8, size: usize) -> *mut OpalOptional {
    assert!(!value.is_null(), "optional_some: null value");
    let bytes = unsafe { std::slice::from_raw_parts(value, size) };
    export(OpalOptional::some(bytes))
}

/// Wrap a numeric handle, boxing it into the value buffer. The wrapper
/// carries the handle; extraction transfers it back out.
///
/// # Safety
/// `value` must be an owned numeric handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_optional_some_numeric(value: *mut Numeric) -> *mut OpalOptional {
    assert!(!value.is_null(), "optional_some_numeric: null value");
    export(OpalOptional::some_boxed(handle_buffer(value)))
}

/// Wrap a string handle (see `opal_optional_some_numeric`).
///
/// # Safety
/// `value` must be an owned string handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_optional_some_string(value: *mut OpalString) -> *mut OpalOptional {
    assert!(!value.is_null(), "optional_some_string: null value");
    export(OpalOptional::some_boxed(handle_buffer(value)))
}

/// Wrap a boolean into a fresh one-byte buffer.
#[unsafe(no_mangle)]
pub extern "C" fn opal_optional_some_bool(value: i64) -> *mut OpalOptional {
    export(OpalOptional::some(&[(value != 0) as u8]))
}

/// Release an optional wrapper and its value buffer. Wrapped handles are
/// not followed; extract them first if they must live on.
///
/// # Safety
/// `p` must be null or an owned handle, not used again after this call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_optional_free(p: *mut OpalOptional) {
    if !p.is_null() {
        unsafe {
            drop(Box::from_raw(p));
        }
    }
}

/// Presence check (1/0).
///
/// # Safety
/// `p` must be a valid optional handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_optional_has_value(p: *const OpalOptional) -> i64 {
    unsafe { optional_ref(p, "optional_has_value") }.has_value() as i64
}

/// Absence check (1/0).
///
/// # Safety
/// `p` must be a valid optional handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_optional_is_null(p: *const OpalOptional) -> i64 {
    unsafe { optional_ref(p, "optional_is_null") }.is_null() as i64
}

/// Borrow the wrapped bytes. Terminates with exit code 43 when absent.
///
/// # Safety
/// `p` must be a valid optional handle; the pointer dies with the wrapper.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_optional_get(p: *const OpalOptional) -> *const u8 {
    match unsafe { optional_ref(p, "optional_get") }.get() {
        Some(bytes) => bytes.as_ptr(),
        None => runtime_fatal("optional access: value is none"),
    }
}

/// Extract a wrapped numeric handle, taking over its ownership.
/// Terminates with exit code 43 when absent.
///
/// # Safety
/// `p` must be a valid optional built with `opal_optional_some_numeric`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_optional_get_numeric(p: *const OpalOptional) -> *mut Numeric {
    match unsafe { optional_ref(p, "optional_get_numeric") }.get() {
        Some(bytes) => unsafe { buffer_handle(bytes, "optional_get_numeric") },
        None => runtime_fatal("optional access: value is none"),
    }
}

/// Extract a wrapped string handle (see `opal_optional_get_numeric`).
///
/// # Safety
/// `p` must be a valid optional built with `opal_optional_some_string`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_optional_get_string(p: *const OpalOptional) -> *mut OpalString {
    match unsafe { optional_ref(p, "optional_get_string") }.get() {
        Some(bytes) => unsafe { buffer_handle(bytes, "optional_get_string") },
        None => runtime_fatal("optional access: value is none"),
    }
}

/// Extract a wrapped boolean. Terminates with exit code 43 when absent.
///
/// # Safety
/// `p` must be a valid optional built with `opal_optional_some_bool`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_optional_get_bool(p: *const OpalOptional) -> i64 {
    match unsafe { optional_ref(p, "optional_get_bool") }.get() {
        Some(bytes) => (bytes[0] != 0) as i64,
        None => runtime_fatal("optional access: value is none"),
    }
}

/// Borrow the wrapped bytes, or `default` when absent.
///
/// # Safety
/// `p` must be a valid optional handle; `default` stays owned by the
/// caller and must outlive its use.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_optional_get_or(
    p: *const OpalOptional,
    default: *const u8,
) -> *const u8 {
    match unsafe { optional_ref(p, "optional_get_or") }.get() {
        Some(bytes) => bytes.as_ptr(),
        None => default,
    }
}

/// Left when present, else right. Returns one of the two argument
/// handles, non-owning; both stay owned by the caller.
///
/// # Safety
/// `left` and `right` must be valid optional handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_optional_coalesce(
    left: *const OpalOptional,
    right: *const OpalOptional,
) -> *const OpalOptional {
    let l = unsafe { optional_ref(left, "optional_coalesce") };
    let r = unsafe { optional_ref(right, "optional_coalesce") };
    if std::ptr::eq(coalesce(l, r), l) {
        left
    } else {
        right
    }
}

/// Assert presence with a caller-supplied message. Terminates with exit
/// code 43 when absent, otherwise a no-op.
///
/// # Safety
/// `p` must be a valid optional handle; `message` null or a valid C
/// string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_optional_assert(p: *const OpalOptional, message: *const c_char) {
    if unsafe { optional_ref(p, "optional_assert") }.is_null() {
        let text = if message.is_null() {
            "optional assertion failed".to_string()
        } else {
            unsafe { CStr::from_ptr(message) }
                .to_string_lossy()
                .into_owned()
        };
        runtime_fatal(&text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_and_some() {
        unsafe {
            let none = opal_optional_none();
            assert_eq!(opal_optional_has_value(none), 0);
            assert_eq!(opal_optional_is_null(none), 1);

            let bytes = 42i64.to_ne_bytes();
            let some = opal_optional_some(bytes.as_ptr(), 8);
            assert_eq!(opal_optional_has_value(some), 1);
            let p = opal_optional_get(some);
            assert_eq!(std::slice::from_raw_parts(p, 8), &bytes);

            opal_optional_free(none);
            opal_optional_free(some);
        }
    }

    #[test]
    fn test_typed_round_trip() {
        unsafe {
            let n = crate::numeric_ops::opal_numeric_from_i64(7);
            let wrapped = opal_optional_some_numeric(n);
            let back = opal_optional_get_numeric(wrapped);
            assert_eq!(back, n);
            opal_optional_free(wrapped);
            crate::numeric_ops::opal_numeric_free(n);

            let flag = opal_optional_some_bool(1);
            assert_eq!(opal_optional_get_bool(flag), 1);
            opal_optional_free(flag);
        }
    }

    #[test]
    fn test_get_or() {
        unsafe {
            let none = opal_optional_none();
            let default = 9i64.to_ne_bytes();
            let p = opal_optional_get_or(none, default.as_ptr());
            assert_eq!(std::slice::from_raw_parts(p, 8), &default);
            opal_optional_free(none);
        }
    }

    #[test]
    fn test_coalesce() {
        unsafe {
            let a = opal_optional_some(b"a".as_ptr(), 1);
            let n = opal_optional_none();
            assert_eq!(opal_optional_coalesce(a, n), a as *const _);
            assert_eq!(opal_optional_coalesce(n, a), a as *const _);
            opal_optional_free(a);
            opal_optional_free(n);
        }
    }
}
