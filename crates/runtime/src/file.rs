//! File I/O shims
//!
//! Whole-file read/write/append plus existence and size probes, exported
//! with C ABI for LLVM codegen. These back the compiler driver's
//! file-reading shim and the surface builtins of the same names.
//!
//! Failures are silent at this layer (null / -1 returns); the surface
//! program decides what a missing file means.

use opal_core::OpalString;
use std::ffi::CStr;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::raw::c_char;
use std::path::Path;

unsafe fn path_of<'a>(path: *const c_char) -> Option<&'a Path> {
    if path.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(path) }
        .to_str()
        .ok()
        .map(Path::new)
}

/// Read an entire file. Returns an owned string handle, or null on any
/// failure (missing file, permissions, unreadable).
///
/// # Safety
/// `path` must be a valid nul-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_read_file(path: *const c_char) -> *mut OpalString {
    let Some(path) = (unsafe { path_of(path) }) else {
        return std::ptr::null_mut();
    };
    match fs::read(path) {
        Ok(bytes) => Box::into_raw(Box::new(OpalString::new(&bytes))),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Overwrite a file with the string payload. 0 on success, -1 on failure.
///
/// # Safety
/// `path` must be a valid nul-terminated C string; `content` a valid
/// string handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_write_file(path: *const c_char, content: *const OpalString) -> i64 {
    let Some(path) = (unsafe { path_of(path) }) else {
        return -1;
    };
    if content.is_null() {
        return -1;
    }
    let content = unsafe { &*content };
    match fs::write(path, content.as_bytes()) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// Append the string payload to a file, creating it first when missing.
/// 0 on success, -1 on failure.
///
/// # Safety
/// `path` must be a valid nul-terminated C string; `content` a valid
/// string handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_append_file(path: *const c_char, content: *const OpalString) -> i64 {
    let Some(path) = (unsafe { path_of(path) }) else {
        return -1;
    };
    if content.is_null() {
        return -1;
    }
    let content = unsafe { &*content };
    let appended = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(content.as_bytes()));
    match appended {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// 1 when the path names an existing file or directory.
///
/// # Safety
/// `path` must be a valid nul-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_file_exists(path: *const c_char) -> i64 {
    unsafe { path_of(path) }.is_some_and(|p| p.exists()) as i64
}

/// File size in bytes, or -1 when it cannot be read.
///
/// # Safety
/// `path` must be a valid nul-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_file_size(path: *const c_char) -> i64 {
    match unsafe { path_of(path) }.and_then(|p| fs::metadata(p).ok()) {
        Some(meta) => meta.len() as i64,
        None => -1,
    }
}

// String-handle adapters for generated code, which holds paths and
// contents as SSO envelopes.

unsafe fn handle_path<'a>(path: *const OpalString) -> Option<&'a Path> {
    if path.is_null() {
        return None;
    }
    std::str::from_utf8(unsafe { &*path }.as_bytes())
        .ok()
        .map(Path::new)
}

/// Read a whole file into a fresh optional: a string when readable,
/// none otherwise.
///
/// # Safety
/// `path` must be a valid string handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_read_file_string(
    path: *const OpalString,
) -> *mut opal_core::OpalOptional {
    let slurped = unsafe { handle_path(path) }.and_then(|p| fs::read(p).ok());
    let optional = match slurped {
        Some(bytes) => {
            let handle = Box::into_raw(Box::new(OpalString::new(&bytes)));
            // The optional carries the handle; extraction hands it back.
            unsafe { crate::optional_ops::opal_optional_some_string(handle) }
        }
        None => crate::optional_ops::opal_optional_none(),
    };
    optional
}

/// Overwrite a file with the string payload (1/0).
///
/// # Safety
/// `path` and `content` must be valid string handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_write_file_string(
    path: *const OpalString,
    content: *const OpalString,
) -> i64 {
    let Some(path) = (unsafe { handle_path(path) }) else {
        return 0;
    };
    if content.is_null() {
        return 0;
    }
    fs::write(path, unsafe { &*content }.as_bytes()).is_ok() as i64
}

/// Append the string payload to a file, creating it when missing (1/0).
///
/// # Safety
/// `path` and `content` must be valid string handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_append_file_string(
    path: *const OpalString,
    content: *const OpalString,
) -> i64 {
    let Some(path) = (unsafe { handle_path(path) }) else {
        return 0;
    };
    if content.is_null() {
        return 0;
    }
    let appended = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(unsafe { &*content }.as_bytes()));
    appended.is_ok() as i64
}

/// Existence probe over a string handle (1/0).
///
/// # Safety
/// `path` must be a valid string handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_file_exists_string(path: *const OpalString) -> i64 {
    unsafe { handle_path(path) }.is_some_and(|p| p.exists()) as i64
}

/// File size over a string handle, -1 when unreadable.
///
/// # Safety
/// `path` must be a valid string handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_file_size_string(path: *const OpalString) -> i64 {
    match unsafe { handle_path(path) }.and_then(|p| fs::metadata(p).ok()) {
        Some(meta) => meta.len() as i64,
        None => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn c_path(path: &Path) -> CString {
        CString::new(path.to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        let cpath = c_path(&path);

        unsafe {
            let content = Box::into_raw(Box::new(OpalString::new(b"hello file\n")));
            assert_eq!(opal_write_file(cpath.as_ptr(), content), 0);
            assert_eq!(opal_file_exists(cpath.as_ptr()), 1);
            assert_eq!(opal_file_size(cpath.as_ptr()), 11);

            let read = opal_read_file(cpath.as_ptr());
            assert!(!read.is_null());
            assert_eq!((*read).as_bytes(), b"hello file\n");

            crate::string_ops::opal_string_free(content);
            crate::string_ops::opal_string_free(read);
        }
    }

    #[test]
    fn test_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let cpath = c_path(&path);

        unsafe {
            let a = Box::into_raw(Box::new(OpalString::new(b"one")));
            let b = Box::into_raw(Box::new(OpalString::new(b"two")));
            assert_eq!(opal_append_file(cpath.as_ptr(), a), 0);
            assert_eq!(opal_append_file(cpath.as_ptr(), b), 0);

            let read = opal_read_file(cpath.as_ptr());
            assert_eq!((*read).as_bytes(), b"onetwo");

            crate::string_ops::opal_string_free(a);
            crate::string_ops::opal_string_free(b);
            crate::string_ops::opal_string_free(read);
        }
    }

    #[test]
    fn test_string_handle_adapters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        unsafe {
            let path_s = Box::into_raw(Box::new(OpalString::new(
                path.to_str().unwrap().as_bytes(),
            )));
            let content = Box::into_raw(Box::new(OpalString::new(b"payload")));

            assert_eq!(opal_write_file_string(path_s, content), 1);
            assert_eq!(opal_file_exists_string(path_s), 1);
            assert_eq!(opal_file_size_string(path_s), 7);

            let slurped = opal_read_file_string(path_s);
            assert_eq!(crate::optional_ops::opal_optional_has_value(slurped), 1);
            let text = crate::optional_ops::opal_optional_get_string(slurped);
            assert_eq!((*text).as_bytes(), b"payload");

            let missing = Box::into_raw(Box::new(OpalString::new(b"/no/such/file")));
            let absent = opal_read_file_string(missing);
            assert_eq!(crate::optional_ops::opal_optional_has_value(absent), 0);

            crate::string_ops::opal_string_free(path_s);
            crate::string_ops::opal_string_free(content);
            crate::string_ops::opal_string_free(text);
            crate::string_ops::opal_string_free(missing);
            crate::optional_ops::opal_optional_free(slurped);
            crate::optional_ops::opal_optional_free(absent);
        }
    }

    #[test]
    fn test_missing_file() {
        let missing = CString::new("/nonexistent/surely/file.txt").unwrap();
        unsafe {
            assert!(opal_read_file(missing.as_ptr()).is_null());
            assert_eq!(opal_file_exists(missing.as_ptr()), 0);
            assert_eq!(opal_file_size(missing.as_ptr()), -1);
        }
    }
}
