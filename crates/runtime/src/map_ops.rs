//! Map operations
//!
//! These functions are exported with C ABI for LLVM codegen to call. A
//! surface map is a handle to an [`OpalMap`]: a string-keyed chained hash
//! table (FNV-1a) holding fixed-size value buffers.
//!
//! # Ownership
//!
//! The map owns every key and value buffer it holds. `opal_map_get`
//! returns a non-owning pointer into the stored value; its lifetime ends
//! at the next operation that could remove the key or resize the map.
//! Allocator failures propagate as 0 and leave the map structurally
//! unchanged.

use opal_core::{OpalMap, fnv1a};
use std::ffi::CStr;
use std::os::raw::c_char;

unsafe fn map_ref<'a>(p: *const OpalMap, what: &str) -> &'a OpalMap {
    assert!(!p.is_null(), "{what}: null map handle");
    unsafe { &*p }
}

unsafe fn map_mut<'a>(p: *mut OpalMap, what: &str) -> &'a mut OpalMap {
    assert!(!p.is_null(), "{what}: null map handle");
    unsafe { &mut *p }
}

unsafe fn key_bytes<'a>(key: *const c_char) -> &'a [u8] {
    unsafe { CStr::from_ptr(key) }.to_bytes()
}

/// FNV-1a hash of a nul-terminated key (offset basis
/// 14695981039346656037, prime 1099511628211).
///
/// # Safety
/// `key` must be a valid nul-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_map_hash(key: *const c_char) -> u64 {
    if key.is_null() {
        return 0;
    }
    fnv1a(unsafe { key_bytes(key) })
}

/// Create a map for values of `value_size` bytes.
#[unsafe(no_mangle)]
pub extern "C" fn opal_map_create(value_size: usize) -> *mut OpalMap {
    Box::into_raw(Box::new(OpalMap::new(value_size)))
}

/// Release a map with every key and value buffer it owns.
///
/// # Safety
/// `p` must be null or an owned handle, not used again after this call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_map_free(p: *mut OpalMap) {
    if !p.is_null() {
        unsafe {
            drop(Box::from_raw(p));
        }
    }
}

/// Insert or update. An existing key is overwritten in place; a new key
/// prepends a node to its bucket chain, doubling and rehashing first
/// when the load factor exceeds 0.75.
///
/// # Safety
/// `p` must be a valid map handle, `key` a valid C string, `value` a
/// pointer to at least `value_size` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_map_insert(
    p: *mut OpalMap,
    key: *const c_char,
    value: *const u8,
) -> i64 {
    let map = unsafe { map_mut(p, "map_insert") };
    if key.is_null() || value.is_null() {
        return 0;
    }
    let key = unsafe { key_bytes(key) };
    let value = unsafe { std::slice::from_raw_parts(value, map.value_size()) };
    map.insert(key, value) as i64
}

/// Borrow the stored value for `key`, or null when absent.
///
/// # Safety
/// `p` must be a valid map handle, `key` a valid C string. The returned
/// pointer dies at the next remove or resize.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_map_get(p: *const OpalMap, key: *const c_char) -> *const u8 {
    let map = unsafe { map_ref(p, "map_get") };
    if key.is_null() {
        return std::ptr::null();
    }
    match map.get(unsafe { key_bytes(key) }) {
        Some(value) => value.as_ptr(),
        None => std::ptr::null(),
    }
}

/// Unlink and free the node for `key`. 1 when a key was removed.
///
/// # Safety
/// `p` must be a valid map handle, `key` a valid C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_map_remove(p: *mut OpalMap, key: *const c_char) -> i64 {
    let map = unsafe { map_mut(p, "map_remove") };
    if key.is_null() {
        return 0;
    }
    map.remove(unsafe { key_bytes(key) }) as i64
}

/// Presence check (1/0).
///
/// # Safety
/// `p` must be a valid map handle, `key` a valid C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_map_has(p: *const OpalMap, key: *const c_char) -> i64 {
    (!unsafe { opal_map_get(p, key) }.is_null()) as i64
}

/// Number of key-value pairs.
///
/// # Safety
/// `p` must be a valid map handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_map_length(p: *const OpalMap) -> i64 {
    unsafe { map_ref(p, "map_length") }.len() as i64
}
