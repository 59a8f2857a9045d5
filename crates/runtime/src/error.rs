//! Runtime Error Handling
//!
//! Two disciplines, matching how compiled programs can fail:
//!
//! 1. A thread-local last-error channel for recoverable failures, so FFI
//!    functions can report errors without panicking across the FFI
//!    boundary.
//! 2. Fatal termination for contract violations in generated code:
//!    out-of-bounds sequence access exits with code 42, generic runtime
//!    errors (optional get on none, division by zero) exit with code 43
//!    and a diagnostic on standard error. These exit codes are observable
//!    and fixed.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::process;
use std::ptr;

/// Exit code for sequence bounds violations.
pub const EXIT_BOUNDS: i32 = 42;

/// Exit code for generic runtime errors.
pub const EXIT_RUNTIME: i32 = 43;

thread_local! {
    /// Thread-local storage for the last runtime error message
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };

    /// Cached C string for FFI access (avoids allocation on every get)
    static ERROR_CSTRING: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last runtime error message.
///
/// Clears any cached CString so stale pointers cannot be observed.
pub fn set_runtime_error(msg: impl Into<String>) {
    ERROR_CSTRING.with(|cs| *cs.borrow_mut() = None);
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = Some(msg.into());
    });
}

/// Take (and clear) the last runtime error message
pub fn take_runtime_error() -> Option<String> {
    LAST_ERROR.with(|e| e.borrow_mut().take())
}

/// Check if there's a pending runtime error
pub fn has_runtime_error() -> bool {
    LAST_ERROR.with(|e| e.borrow().is_some())
}

/// Clear any pending runtime error
pub fn clear_runtime_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
    ERROR_CSTRING.with(|e| *e.borrow_mut() = None);
}

/// Terminate on a bounds violation (exit code 42).
pub fn bounds_fatal(msg: &str) -> ! {
    eprintln!("opal runtime error: {msg}");
    process::exit(EXIT_BOUNDS);
}

/// Terminate on a generic runtime error (exit code 43).
pub fn runtime_fatal(msg: &str) -> ! {
    eprintln!("opal runtime error: {msg}");
    process::exit(EXIT_RUNTIME);
}

// FFI-safe error access functions

/// Check if there's a pending runtime error (FFI-safe)
#[unsafe(no_mangle)]
pub extern "C" fn opal_has_error() -> i64 {
    has_runtime_error() as i64
}

/// Get the last error message as a C string pointer (FFI-safe)
///
/// Returns null if no error is pending.
///
/// # WARNING: Pointer Lifetime
/// The returned pointer is only valid until the next call to
/// `set_runtime_error`, `opal_get_error`, or `opal_clear_error`. Callers
/// must copy the string immediately if they need to retain it.
#[unsafe(no_mangle)]
pub extern "C" fn opal_get_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        let error = e.borrow();
        match &*error {
            Some(msg) => ERROR_CSTRING.with(|cs| {
                // Replace null bytes with '?' to preserve error content
                let safe_msg: String = msg
                    .chars()
                    .map(|c| if c == '\0' { '?' } else { c })
                    .collect();
                let cstring = CString::new(safe_msg).expect("null bytes already replaced");
                let ptr = cstring.as_ptr();
                *cs.borrow_mut() = Some(cstring);
                ptr
            }),
            None => ptr::null(),
        }
    })
}

/// Clear any pending error (FFI-safe)
#[unsafe(no_mangle)]
pub extern "C" fn opal_clear_error() {
    clear_runtime_error();
}

/// Report a bounds violation and terminate with exit code 42.
///
/// # Safety
/// `msg` must be null or a valid nul-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_bounds_error(msg: *const c_char) -> ! {
    let text = if msg.is_null() {
        "index out of bounds".to_string()
    } else {
        unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned()
    };
    bounds_fatal(&text);
}

/// Report a generic runtime error and terminate with exit code 43.
///
/// # Safety
/// `msg` must be null or a valid nul-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_runtime_error(msg: *const c_char) -> ! {
    let text = if msg.is_null() {
        "runtime error".to_string()
    } else {
        unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned()
    };
    runtime_fatal(&text);
}

/// Report division by zero and terminate with exit code 43.
#[unsafe(no_mangle)]
pub extern "C" fn opal_division_by_zero() -> ! {
    runtime_fatal("division by zero");
}

/// Release a C string previously handed to the caller by the runtime.
///
/// # Safety
/// `ptr` must be null or a pointer previously returned by a runtime
/// function documented as "caller must free", and must not be used again.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_cstr_free(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            drop(CString::from_raw(ptr));
        }
    }
}
