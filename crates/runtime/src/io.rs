//! Console I/O
//!
//! These functions are exported with C ABI for LLVM codegen to call. The
//! surface `print` statement lowers to one of the line writers below,
//! picked by the expression's static type.
//!
//! Observable formats are fixed: booleans print the literal text `true` /
//! `false`; machine integers print as plain decimal; doubles print in
//! `%g`-equivalent notation; big decimals print their canonical digit
//! string with a leading `-` when negative.

use opal_core::{Numeric, OpalString};
use std::io::{BufRead, Write};

/// Write a numeric value and a newline to stdout.
///
/// # Safety
/// `p` must be a valid numeric handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_print_numeric(p: *const Numeric) {
    assert!(!p.is_null(), "print_numeric: null numeric handle");
    let n = unsafe { &*p };
    println!("{n}");
}

/// Write a string payload and a newline to stdout.
///
/// # Safety
/// `p` must be a valid string handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_print_string(p: *const OpalString) {
    assert!(!p.is_null(), "print_string: null string handle");
    let s = unsafe { &*p };
    let mut stdout = std::io::stdout().lock();
    // Byte-faithful: the payload goes out as-is, no UTF-8 validation.
    let _ = stdout.write_all(s.as_bytes());
    let _ = stdout.write_all(b"\n");
}

/// Write `true` or `false` and a newline to stdout.
#[unsafe(no_mangle)]
pub extern "C" fn opal_print_bool(value: i64) {
    println!("{}", if value != 0 { "true" } else { "false" });
}

/// Read one line from stdin, without the trailing newline. Returns an
/// empty string at EOF. Windows-style `\r\n` endings are normalized.
#[unsafe(no_mangle)]
pub extern "C" fn opal_read_line() -> *mut OpalString {
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Box::into_raw(Box::new(OpalString::new(line.as_bytes())))
}

