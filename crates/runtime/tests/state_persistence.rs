//! End-to-end state store scenarios through the C ABI, the way compiled
//! programs drive it: init, set, save, clear, load, get, close.

use opal_runtime::state::{
    opal_state_clear, opal_state_close, opal_state_config_set, opal_state_get, opal_state_has,
    opal_state_init, opal_state_load, opal_state_save, opal_state_set,
};
use serial_test::serial;
use std::ffi::{CStr, CString};

fn c(text: &str) -> CString {
    CString::new(text).unwrap()
}

unsafe fn get_owned(key: &CString) -> String {
    let ptr = unsafe { opal_state_get(key.as_ptr()) };
    assert!(!ptr.is_null(), "store must be live");
    let value = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
    unsafe { opal_runtime::error::opal_cstr_free(ptr) };
    value
}

#[test]
#[serial]
fn test_persistence_round_trip_through_abi() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s.json");
    let path_c = c(path.to_str().unwrap());

    // A previous test may have left the singleton live.
    opal_state_close();
    assert_eq!(opal_state_init(), 1);
    unsafe {
        assert_eq!(
            opal_state_config_set(c("persist_file").as_ptr(), path_c.as_ptr()),
            1
        );

        let user_key = c("shared:username");
        let theme_key = c("shared:theme");
        assert_eq!(opal_state_set(user_key.as_ptr(), c("Ali").as_ptr()), 1);
        assert_eq!(opal_state_set(theme_key.as_ptr(), c("dark").as_ptr()), 1);

        assert_eq!(opal_state_save(), 1);
        assert_eq!(opal_state_clear(), 1);
        assert_eq!(opal_state_has(user_key.as_ptr()), 0);

        assert_eq!(opal_state_load(), 1);
        assert_eq!(get_owned(&user_key), "Ali");
        assert_eq!(get_owned(&theme_key), "dark");
    }
    assert_eq!(opal_state_close(), 1);
}

#[test]
#[serial]
fn test_close_leaves_operations_uninitialized() {
    opal_state_close();
    assert_eq!(opal_state_init(), 1);
    unsafe {
        let key = c("k");
        assert_eq!(opal_state_set(key.as_ptr(), c("v").as_ptr()), 1);
        assert_eq!(opal_state_close(), 1);

        // Every operation on the closed store reports failure.
        assert_eq!(opal_state_set(key.as_ptr(), c("v").as_ptr()), 0);
        assert!(opal_state_get(key.as_ptr()).is_null());
        assert_eq!(opal_state_save(), 0);
        assert_eq!(opal_state_load(), 0);
    }
}

#[test]
#[serial]
fn test_double_init_rejected_reinit_allowed() {
    opal_state_close();
    assert_eq!(opal_state_init(), 1);
    assert_eq!(opal_state_init(), 0);
    assert_eq!(opal_state_close(), 1);
    assert_eq!(opal_state_init(), 1);
    assert_eq!(opal_state_close(), 1);
}

#[test]
#[serial]
fn test_values_survive_with_escapes_and_long_payloads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s.json");
    let path_c = c(path.to_str().unwrap());

    opal_state_close();
    assert_eq!(opal_state_init(), 1);
    unsafe {
        opal_state_config_set(c("persist_file").as_ptr(), path_c.as_ptr());

        let quoted = c("he said \"ok\" and left");
        let long = c("a value long enough to leave the inline envelope and live on the heap");
        opal_state_set(c("quoted").as_ptr(), quoted.as_ptr());
        opal_state_set(c("long").as_ptr(), long.as_ptr());

        assert_eq!(opal_state_save(), 1);
        assert_eq!(opal_state_clear(), 1);
        assert_eq!(opal_state_load(), 1);

        assert_eq!(get_owned(&c("quoted")), "he said \"ok\" and left");
        assert_eq!(
            get_owned(&c("long")),
            "a value long enough to leave the inline envelope and live on the heap"
        );
    }
    assert_eq!(opal_state_close(), 1);
}
