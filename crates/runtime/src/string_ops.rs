//! String operations
//!
//! These functions are exported with C ABI for LLVM codegen to call. A
//! surface `string` is a handle to an SSO envelope ([`OpalString`]):
//! short payloads live inline, long payloads behind an owned buffer, and
//! every operation here accepts either representation transparently.
//!
//! # Ownership
//!
//! A string returned from any constructor or combinator is fully owned by
//! the caller and must be released exactly once with `opal_string_free`.
//! `opal_string_data` is the one non-owning accessor: the pointer it
//! returns stays valid only until the envelope is freed.

use opal_core::OpalString;
use std::ffi::CStr;
use std::os::raw::c_char;

unsafe fn string_ref<'a>(p: *const OpalString, what: &str) -> &'a OpalString {
    assert!(!p.is_null(), "{what}: null string handle");
    unsafe { &*p }
}

fn export(s: OpalString) -> *mut OpalString {
    Box::into_raw(Box::new(s))
}

/// Build a string from nul-terminated text. The representation (inline
/// or heap) is chosen from the byte count; nothing truncates.
///
/// # Safety
/// `text` must be a valid nul-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_string_create(text: *const c_char) -> *mut OpalString {
    assert!(!text.is_null(), "string_create: null text");
    let bytes = unsafe { CStr::from_ptr(text) }.to_bytes();
    export(OpalString::new(bytes))
}

/// Build a string from a raw byte range (embedded nul bytes allowed).
///
/// # Safety
/// `data` must point to at least `len` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_string_create_len(data: *const u8, len: usize) -> *mut OpalString {
    assert!(!data.is_null() || len == 0, "string_create_len: null data");
    let bytes = if len == 0 {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(data, len) }
    };
    export(OpalString::new(bytes))
}

/// Release a string handle.
///
/// # Safety
/// `p` must be null or an owned handle, not used again after this call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_string_free(p: *mut OpalString) {
    if !p.is_null() {
        unsafe {
            drop(Box::from_raw(p));
        }
    }
}

/// Payload length in bytes, O(1) from the flag word or heap descriptor.
///
/// # Safety
/// `p` must be a valid string handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_string_length(p: *const OpalString) -> i64 {
    unsafe { string_ref(p, "string_length") }.len() as i64
}

/// Non-owning pointer to the nul-terminated payload.
///
/// # Safety
/// `p` must be a valid string handle; the pointer dies with the envelope.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_string_data(p: *const OpalString) -> *const c_char {
    unsafe { string_ref(p, "string_data") }.as_ptr() as *const c_char
}

/// New envelope holding `a ‖ b`; inline exactly when the total still fits.
///
/// # Safety
/// `a` and `b` must be valid string handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_string_concat(
    a: *const OpalString,
    b: *const OpalString,
) -> *mut OpalString {
    let a = unsafe { string_ref(a, "string_concat") };
    let b = unsafe { string_ref(b, "string_concat") };
    export(a.concat(b))
}

/// Lexicographic byte compare: -1, 0 or 1.
///
/// # Safety
/// `a` and `b` must be valid string handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_string_compare(a: *const OpalString, b: *const OpalString) -> i64 {
    let a = unsafe { string_ref(a, "string_compare") };
    let b = unsafe { string_ref(b, "string_compare") };
    match a.cmp(b) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }
}

/// Byte equality (1/0).
///
/// # Safety
/// `a` and `b` must be valid string handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_string_equals(a: *const OpalString, b: *const OpalString) -> i64 {
    (unsafe { opal_string_compare(a, b) } == 0) as i64
}

/// Byte substring. Null when `start` is at or past the end; otherwise
/// `len` clamps to the remaining bytes and the result picks its own
/// representation.
///
/// # Safety
/// `p` must be a valid string handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_string_substring(
    p: *const OpalString,
    start: i64,
    len: i64,
) -> *mut OpalString {
    let s = unsafe { string_ref(p, "string_substring") };
    if start < 0 || len < 0 {
        return std::ptr::null_mut();
    }
    match s.substring(start as usize, len as usize) {
        Some(sub) => export(sub),
        None => std::ptr::null_mut(),
    }
}

/// Decimal formatting of a signed 64-bit integer.
#[unsafe(no_mangle)]
pub extern "C" fn opal_string_from_i64(v: i64) -> *mut OpalString {
    export(OpalString::from_i64(v))
}

/// Decimal parse (base 10, signed): the longest digit prefix after an
/// optional sign; empty prefixes parse as zero.
///
/// # Safety
/// `p` must be a valid string handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_string_to_i64(p: *const OpalString) -> i64 {
    unsafe { string_ref(p, "string_to_i64") }.to_i64()
}

/// First occurrence of `needle` in `haystack` as a byte index, or -1.
///
/// # Safety
/// `haystack` and `needle` must be valid string handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_string_find(
    haystack: *const OpalString,
    needle: *const OpalString,
) -> i64 {
    let haystack = unsafe { string_ref(haystack, "string_find") };
    let needle = unsafe { string_ref(needle, "string_find") };
    match haystack.find(needle.as_bytes()) {
        Some(index) => index as i64,
        None => -1,
    }
}

/// Byte-wise prefix check (1/0).
///
/// # Safety
/// `p` and `prefix` must be valid string handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_string_starts_with(
    p: *const OpalString,
    prefix: *const OpalString,
) -> i64 {
    let s = unsafe { string_ref(p, "string_starts_with") };
    let prefix = unsafe { string_ref(prefix, "string_starts_with") };
    s.starts_with(prefix.as_bytes()) as i64
}

/// Byte-wise suffix check (1/0).
///
/// # Safety
/// `p` and `suffix` must be valid string handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_string_ends_with(
    p: *const OpalString,
    suffix: *const OpalString,
) -> i64 {
    let s = unsafe { string_ref(p, "string_ends_with") };
    let suffix = unsafe { string_ref(suffix, "string_ends_with") };
    s.ends_with(suffix.as_bytes()) as i64
}

/// Deep copy; the copy chooses its representation independently.
///
/// # Safety
/// `p` must be a valid string handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_string_copy(p: *const OpalString) -> *mut OpalString {
    export(unsafe { string_ref(p, "string_copy") }.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    unsafe fn make(text: &str) -> *mut OpalString {
        let c = CString::new(text).unwrap();
        unsafe { opal_string_create(c.as_ptr()) }
    }

    #[test]
    fn test_create_and_data() {
        unsafe {
            let s = make("Hello");
            assert_eq!(opal_string_length(s), 5);
            let data = CStr::from_ptr(opal_string_data(s));
            assert_eq!(data.to_bytes(), b"Hello");
            opal_string_free(s);
        }
    }

    #[test]
    fn test_create_len_with_embedded_nul() {
        unsafe {
            let bytes = [b'a', 0, b'b'];
            let s = opal_string_create_len(bytes.as_ptr(), 3);
            assert_eq!(opal_string_length(s), 3);
            assert_eq!((*s).as_bytes(), &bytes);
            opal_string_free(s);
        }
    }

    #[test]
    fn test_concat_crosses_threshold() {
        unsafe {
            let a = make("This is a longer");
            let b = make(" string example");
            let r = opal_string_concat(a, b);
            assert_eq!((*r).as_bytes(), b"This is a longer string example");
            assert_eq!((*r).flags() & 1, 1);
            opal_string_free(a);
            opal_string_free(b);
            opal_string_free(r);
        }
    }

    #[test]
    fn test_compare_equals() {
        unsafe {
            let a = make("apple");
            let b = make("banana");
            assert_eq!(opal_string_compare(a, b), -1);
            assert_eq!(opal_string_compare(b, a), 1);
            assert_eq!(opal_string_equals(a, a), 1);
            assert_eq!(opal_string_equals(a, b), 0);
            opal_string_free(a);
            opal_string_free(b);
        }
    }

    #[test]
    fn test_substring() {
        unsafe {
            let s = make("hello world");
            let w = opal_string_substring(s, 6, 5);
            assert_eq!((*w).as_bytes(), b"world");
            opal_string_free(w);

            // Clamps past the end, nulls at or past the start.
            let all = opal_string_substring(s, 0, 100);
            assert_eq!((*all).as_bytes(), b"hello world");
            opal_string_free(all);
            assert!(opal_string_substring(s, 11, 1).is_null());
            assert!(opal_string_substring(s, -1, 1).is_null());
            opal_string_free(s);
        }
    }

    #[test]
    fn test_i64_round_trip() {
        unsafe {
            let s = opal_string_from_i64(-12345);
            assert_eq!((*s).as_bytes(), b"-12345");
            assert_eq!(opal_string_to_i64(s), -12345);
            opal_string_free(s);
        }
    }

    #[test]
    fn test_find() {
        unsafe {
            let hay = make("the quick brown fox");
            let needle = make("brown");
            let missing = make("wolf");
            assert_eq!(opal_string_find(hay, needle), 10);
            assert_eq!(opal_string_find(hay, missing), -1);
            opal_string_free(hay);
            opal_string_free(needle);
            opal_string_free(missing);
        }
    }

    #[test]
    fn test_prefix_suffix_copy() {
        unsafe {
            let s = make("main.opal");
            let pre = make("main");
            let suf = make(".opal");
            assert_eq!(opal_string_starts_with(s, pre), 1);
            assert_eq!(opal_string_ends_with(s, suf), 1);
            assert_eq!(opal_string_starts_with(s, suf), 0);

            let copy = opal_string_copy(s);
            opal_string_free(s);
            assert_eq!((*copy).as_bytes(), b"main.opal");
            opal_string_free(copy);
            opal_string_free(pre);
            opal_string_free(suf);
        }
    }
}
