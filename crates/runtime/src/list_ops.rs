//! Sequence operations
//!
//! These functions are exported with C ABI for LLVM codegen to call. A
//! surface list is a handle to a [`Sequence`]: a growable array of
//! fixed-size element slots that owns copies of everything inserted.
//!
//! # Ownership
//!
//! The sequence owns its element slots. `opal_list_get` returns a
//! non-owning pointer into the stored element, valid until the next
//! operation that could mutate or reallocate the sequence. Mutating
//! entry points copy `elem_size` bytes from the caller's buffer.
//!
//! Out-of-bounds `get` is a contract violation in generated code and
//! terminates with exit code 42. Out-of-bounds `set` / `remove` report
//! failure and leave the sequence unchanged.

use crate::error::bounds_fatal;
use opal_core::Sequence;

unsafe fn list_ref<'a>(p: *const Sequence, what: &str) -> &'a Sequence {
    assert!(!p.is_null(), "{what}: null list handle");
    unsafe { &*p }
}

unsafe fn list_mut<'a>(p: *mut Sequence, what: &str) -> &'a mut Sequence {
    assert!(!p.is_null(), "{what}: null list handle");
    unsafe { &mut *p }
}

unsafe fn elem_bytes<'a>(data: *const u8, len: usize) -> &'a [u8] {
    unsafe { std::slice::from_raw_parts(data, len) }
}

/// Create a sequence for elements of `elem_size` bytes. Null when
/// `elem_size` is zero or allocation fails.
#[unsafe(no_mangle)]
pub extern "C" fn opal_list_create(elem_size: usize) -> *mut Sequence {
    match Sequence::new(elem_size) {
        Some(seq) => Box::into_raw(Box::new(seq)),
        None => std::ptr::null_mut(),
    }
}

/// Release a sequence and every element it owns.
///
/// # Safety
/// `p` must be null or an owned handle, not used again after this call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_list_free(p: *mut Sequence) {
    if !p.is_null() {
        unsafe {
            drop(Box::from_raw(p));
        }
    }
}

/// Current element count.
///
/// # Safety
/// `p` must be a valid sequence handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_list_length(p: *const Sequence) -> i64 {
    unsafe { list_ref(p, "list_length") }.len() as i64
}

/// 1 when the sequence holds no elements.
///
/// # Safety
/// `p` must be a valid sequence handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_list_is_empty(p: *const Sequence) -> i64 {
    unsafe { list_ref(p, "list_is_empty") }.is_empty() as i64
}

/// Borrow the element at `index`. Terminates with exit code 42 on an
/// out-of-bounds index.
///
/// # Safety
/// `p` must be a valid sequence handle; the returned pointer is valid
/// until the next mutating operation on the same sequence.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_list_get(p: *const Sequence, index: i64) -> *const u8 {
    let seq = unsafe { list_ref(p, "list_get") };
    if index < 0 {
        bounds_fatal(&format!("list index {index} out of bounds"));
    }
    match seq.get(index as usize) {
        Some(element) => element.as_ptr(),
        None => bounds_fatal(&format!(
            "list index {index} out of bounds (length {})",
            seq.len()
        )),
    }
}

/// Overwrite the element at `index` with a copy of `element`. Reports
/// failure (0) without mutation when the index is out of bounds.
///
/// # Safety
/// `p` must be a valid sequence handle; `element` must point to at least
/// `elem_size` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_list_set(p: *mut Sequence, index: i64, element: *const u8) -> i64 {
    let seq = unsafe { list_mut(p, "list_set") };
    if index < 0 || element.is_null() {
        return 0;
    }
    let bytes = unsafe { elem_bytes(element, seq.elem_size()) };
    seq.set(index as usize, bytes) as i64
}

/// Append a copy of `element`, doubling capacity when full.
///
/// # Safety
/// `p` must be a valid sequence handle; `element` must point to at least
/// `elem_size` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_list_append(p: *mut Sequence, element: *const u8) -> i64 {
    let seq = unsafe { list_mut(p, "list_append") };
    if element.is_null() {
        return 0;
    }
    let bytes = unsafe { elem_bytes(element, seq.elem_size()) };
    seq.append(bytes) as i64
}

/// Insert a copy of `element` at the front.
///
/// # Safety
/// `p` must be a valid sequence handle; `element` must point to at least
/// `elem_size` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_list_prepend(p: *mut Sequence, element: *const u8) -> i64 {
    let seq = unsafe { list_mut(p, "list_prepend") };
    if element.is_null() {
        return 0;
    }
    let bytes = unsafe { elem_bytes(element, seq.elem_size()) };
    seq.prepend(bytes) as i64
}

/// Remove the element at `index`, preserving the order of the rest.
/// Reports failure (0) without mutation when out of bounds.
///
/// # Safety
/// `p` must be a valid sequence handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_list_remove(p: *mut Sequence, index: i64) -> i64 {
    let seq = unsafe { list_mut(p, "list_remove") };
    if index < 0 {
        return 0;
    }
    seq.remove(index as usize) as i64
}

/// Drop every element; capacity is kept.
///
/// # Safety
/// `p` must be a valid sequence handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_list_clear(p: *mut Sequence) {
    unsafe { list_mut(p, "list_clear") }.clear();
}

/// Deep copy: the clone owns fresh element slots.
///
/// # Safety
/// `p` must be a valid sequence handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_list_clone(p: *const Sequence) -> *mut Sequence {
    Box::into_raw(Box::new(unsafe { list_ref(p, "list_clone") }.clone()))
}

/// Reverse in place.
///
/// # Safety
/// `p` must be a valid sequence handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_list_reverse(p: *mut Sequence) {
    unsafe { list_mut(p, "list_reverse") }.reverse();
}

/// Current slot capacity.
///
/// # Safety
/// `p` must be a valid sequence handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_list_capacity(p: *const Sequence) -> i64 {
    unsafe { list_ref(p, "list_capacity") }.capacity() as i64
}

/// Ensure room for at least `capacity` slots.
///
/// # Safety
/// `p` must be a valid sequence handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_list_reserve(p: *mut Sequence, capacity: i64) -> i64 {
    if capacity < 0 {
        return 0;
    }
    unsafe { list_mut(p, "list_reserve") }.reserve(capacity as usize);
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        unsafe {
            let list = opal_list_create(8);
            assert!(!list.is_null());
            for v in 0..10i64 {
                assert_eq!(opal_list_append(list, v.to_ne_bytes().as_ptr()), 1);
            }
            assert_eq!(opal_list_length(list), 10);
            for v in 0..10i64 {
                let p = opal_list_get(list, v);
                let got = i64::from_ne_bytes(std::slice::from_raw_parts(p, 8).try_into().unwrap());
                assert_eq!(got, v);
            }
            opal_list_free(list);
        }
    }

    #[test]
    fn test_zero_elem_size_rejected() {
        assert!(opal_list_create(0).is_null());
    }

    #[test]
    fn test_set_remove_failures_leave_list_alone() {
        unsafe {
            let list = opal_list_create(8);
            opal_list_append(list, 7i64.to_ne_bytes().as_ptr());
            assert_eq!(opal_list_set(list, 5, 1i64.to_ne_bytes().as_ptr()), 0);
            assert_eq!(opal_list_remove(list, 5), 0);
            assert_eq!(opal_list_length(list), 1);
            opal_list_free(list);
        }
    }

    #[test]
    fn test_prepend_reverse_clone() {
        unsafe {
            let list = opal_list_create(8);
            opal_list_append(list, 2i64.to_ne_bytes().as_ptr());
            opal_list_prepend(list, 1i64.to_ne_bytes().as_ptr());

            let copy = opal_list_clone(list);
            opal_list_reverse(list);

            let first = opal_list_get(list, 0);
            assert_eq!(
                i64::from_ne_bytes(std::slice::from_raw_parts(first, 8).try_into().unwrap()),
                2
            );
            // The clone kept the pre-reverse order.
            let first = opal_list_get(copy, 0);
            assert_eq!(
                i64::from_ne_bytes(std::slice::from_raw_parts(first, 8).try_into().unwrap()),
                1
            );
            opal_list_free(list);
            opal_list_free(copy);
        }
    }

    #[test]
    fn test_capacity_and_reserve() {
        unsafe {
            let list = opal_list_create(8);
            assert_eq!(opal_list_capacity(list), 4);
            assert_eq!(opal_list_reserve(list, 64), 1);
            assert!(opal_list_capacity(list) >= 64);
            opal_list_clear(list);
            assert_eq!(opal_list_length(list), 0);
            opal_list_free(list);
        }
    }
}
