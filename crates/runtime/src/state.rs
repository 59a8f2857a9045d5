//! Persistent keyed state store
//!
//! A process-global key→string map with an explicit lifecycle
//! (`init` → live → `close`, re-init after close allowed) and optional
//! JSON-shaped persistence. Entries form an intrusive singly-linked
//! list; values shorter than 24 bytes are stored inline in the entry,
//! longer values own a heap buffer — the same small-value discipline the
//! string envelope uses.
//!
//! # Persistence format
//!
//! UTF-8 text holding a single JSON object whose members are
//! string-to-string. Only `\"` and `\\` escapes are emitted and
//! recognized; every other byte passes through literally (embedded
//! newlines included). A save is a full overwrite, a load a full replay
//! through `set` — no merging. Malformed input is an explicit parse
//! error; pairs applied before the error stays applied.
//!
//! # Lifecycle
//!
//! Calls on an uninitialized (or closed) store log an error and report
//! failure. At process exit a hook saves the store when `auto_persist`
//! is configured, then closes it.
//!
//! The store is a process-wide singleton; the runtime is single-threaded
//! per process and concurrent callers are not supported (the interior
//! mutex only satisfies Rust's static rules, it is not an ordering
//! guarantee).

use std::ffi::CStr;
use std::fmt;
use std::fs;
use std::os::raw::c_char;
use std::path::PathBuf;
use std::sync::{Mutex, Once};

/// Values shorter than this stay inline in the entry.
pub const STATE_INLINE: usize = 24;

/// Default persist-file path.
pub const DEFAULT_PERSIST_FILE: &str = ".opal_state.json";

static STATE: Mutex<Option<StateManager>> = Mutex::new(None);
static EXIT_HOOK: Once = Once::new();

/// Value envelope: inline byte buffer for short values, owned heap
/// buffer for the rest.
enum ValueCell {
    Inline { len: u8, buf: [u8; STATE_INLINE] },
    Heap(Box<[u8]>),
}

impl ValueCell {
    fn new(bytes: &[u8]) -> ValueCell {
        if bytes.len() < STATE_INLINE {
            let mut buf = [0u8; STATE_INLINE];
            buf[..bytes.len()].copy_from_slice(bytes);
            ValueCell::Inline {
                len: bytes.len() as u8,
                buf,
            }
        } else {
            ValueCell::Heap(bytes.into())
        }
    }

    fn bytes(&self) -> &[u8] {
        match self {
            ValueCell::Inline { len, buf } => &buf[..*len as usize],
            ValueCell::Heap(buf) => buf,
        }
    }

    fn is_heap(&self) -> bool {
        matches!(self, ValueCell::Heap(_))
    }
}

struct StateEntry {
    key: Box<[u8]>,
    value: ValueCell,
    next: Option<Box<StateEntry>>,
}

/// The live store: entry list, configuration and storage statistics.
pub struct StateManager {
    entries: Option<Box<StateEntry>>,
    count: usize,
    auto_persist: bool,
    persist_file: PathBuf,
    inline_count: usize,
    heap_count: usize,
    heap_bytes: usize,
}

/// Persistence failure: file I/O or a malformed persist file.
#[derive(Debug)]
pub enum PersistError {
    Io(std::io::Error),
    Parse { offset: usize, message: String },
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::Io(e) => write!(f, "persist file i/o: {e}"),
            PersistError::Parse { offset, message } => {
                write!(f, "persist file malformed at byte {offset}: {message}")
            }
        }
    }
}

impl std::error::Error for PersistError {}

impl StateManager {
    fn new() -> StateManager {
        StateManager {
            entries: None,
            count: 0,
            auto_persist: false,
            persist_file: PathBuf::from(DEFAULT_PERSIST_FILE),
            inline_count: 0,
            heap_count: 0,
            heap_bytes: 0,
        }
    }

    fn find(&self, key: &[u8]) -> Option<&StateEntry> {
        let mut cur = &self.entries;
        while let Some(entry) = cur {
            if entry.key.as_ref() == key {
                return Some(entry);
            }
            cur = &entry.next;
        }
        None
    }

    /// Insert or rewrite in place. New keys are prepended.
    fn set(&mut self, key: &[u8], value: &[u8]) {
        let new_is_heap = value.len() >= STATE_INLINE;
        let new_len = value.len();
        let mut cell = Some(ValueCell::new(value));

        let mut cur = &mut self.entries;
        loop {
            match cur {
                None => break,
                Some(entry) if entry.key.as_ref() == key => {
                    let old =
                        std::mem::replace(&mut entry.value, cell.take().expect("cell present"));
                    if old.is_heap() {
                        self.heap_count -= 1;
                        self.heap_bytes -= old.bytes().len();
                    } else {
                        self.inline_count -= 1;
                    }
                    if new_is_heap {
                        self.heap_count += 1;
                        self.heap_bytes += new_len;
                    } else {
                        self.inline_count += 1;
                    }
                    return;
                }
                Some(entry) => cur = &mut entry.next,
            }
        }

        let head = self.entries.take();
        self.entries = Some(Box::new(StateEntry {
            key: key.into(),
            value: cell.take().expect("cell present"),
            next: head,
        }));
        if new_is_heap {
            self.heap_count += 1;
            self.heap_bytes += new_len;
        } else {
            self.inline_count += 1;
        }
        self.count += 1;
    }

    /// A fresh owned copy of the stored bytes; `None` when absent.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.find(key).map(|entry| entry.value.bytes().to_vec())
    }

    fn has(&self, key: &[u8]) -> bool {
        self.find(key).is_some()
    }

    /// Unlink and free. Returns whether a key was found.
    fn delete(&mut self, key: &[u8]) -> bool {
        let mut cur = &mut self.entries;
        loop {
            match cur {
                None => return false,
                Some(entry) if entry.key.as_ref() == key => {
                    let was_heap = entry.value.is_heap();
                    let old_len = entry.value.bytes().len();
                    let next = entry.next.take();
                    *cur = next;
                    if was_heap {
                        self.heap_count -= 1;
                        self.heap_bytes -= old_len;
                    } else {
                        self.inline_count -= 1;
                    }
                    self.count -= 1;
                    return true;
                }
                Some(entry) => cur = &mut entry.next,
            }
        }
    }

    fn clear(&mut self) {
        self.entries = None;
        self.count = 0;
        self.inline_count = 0;
        self.heap_count = 0;
        self.heap_bytes = 0;
    }

    /// Serialize every entry as a JSON object and overwrite the persist
    /// file in one write.
    fn save(&self) -> Result<(), PersistError> {
        let mut out: Vec<u8> = b"{\n".to_vec();
        let mut cur = &self.entries;
        let mut first = true;
        while let Some(entry) = cur {
            if !first {
                out.extend_from_slice(b",\n");
            }
            first = false;
            out.extend_from_slice(b"  \"");
            escape_into(&mut out, &entry.key);
            out.extend_from_slice(b"\": \"");
            escape_into(&mut out, entry.value.bytes());
            out.push(b'"');
            cur = &entry.next;
        }
        out.extend_from_slice(b"\n}\n");
        fs::write(&self.persist_file, out).map_err(PersistError::Io)
    }

    /// Read the persist file and replay each pair through `set`. A
    /// missing file or empty content is a no-op success. Pairs applied
    /// before a parse error stay applied.
    fn load(&mut self) -> Result<(), PersistError> {
        let content = match fs::read(&self.persist_file) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(PersistError::Io(e)),
        };
        if content.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(());
        }

        let mut scanner = Scanner {
            input: &content,
            pos: 0,
        };
        scanner.skip_whitespace();
        scanner.expect(b'{')?;
        scanner.skip_whitespace();
        if scanner.eat(b'}') {
            return Ok(());
        }
        loop {
            let key = scanner.string()?;
            scanner.skip_whitespace();
            scanner.expect(b':')?;
            scanner.skip_whitespace();
            let value = scanner.string()?;
            self.set(&key, &value);
            scanner.skip_whitespace();
            if scanner.eat(b',') {
                scanner.skip_whitespace();
                continue;
            }
            scanner.expect(b'}')?;
            return Ok(());
        }
    }
}

/// Append `bytes` with `"` and `\` backslash-escaped; everything else
/// passes through literally.
fn escape_into(out: &mut Vec<u8>, bytes: &[u8]) {
    for &b in bytes {
        match b {
            b'"' => out.extend_from_slice(b"\\\""),
            b'\\' => out.extend_from_slice(b"\\\\"),
            _ => out.push(b),
        }
    }
}

/// Minimal scanner for the persist format: a single object of
/// string-to-string members. Keys and values grow without bound; there
/// are no fixed working buffers to overrun.
struct Scanner<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Scanner<'_> {
    fn skip_whitespace(&mut self) {
        while self
            .input
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.input.get(self.pos) == Some(&byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), PersistError> {
        if self.eat(byte) {
            Ok(())
        } else {
            Err(PersistError::Parse {
                offset: self.pos,
                message: format!("expected '{}'", byte as char),
            })
        }
    }

    /// A quoted string. Recognizes `\"` and `\\`; a backslash before any
    /// other byte stays literal, and raw control bytes (newlines
    /// included) pass through.
    fn string(&mut self) -> Result<Vec<u8>, PersistError> {
        self.expect(b'"')?;
        let mut out = Vec::new();
        loop {
            match self.input.get(self.pos) {
                None => {
                    return Err(PersistError::Parse {
                        offset: self.pos,
                        message: "unterminated string".to_string(),
                    });
                }
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') => match self.input.get(self.pos + 1) {
                    Some(b'"') => {
                        out.push(b'"');
                        self.pos += 2;
                    }
                    Some(b'\\') => {
                        out.push(b'\\');
                        self.pos += 2;
                    }
                    _ => {
                        out.push(b'\\');
                        self.pos += 1;
                    }
                },
                Some(&b) => {
                    out.push(b);
                    self.pos += 1;
                }
            }
        }
    }
}

fn lock() -> std::sync::MutexGuard<'static, Option<StateManager>> {
    STATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn dead_store(what: &str) -> bool {
    eprintln!("opal runtime: state {what}: state manager not initialized");
    false
}

/// Process-exit hook: save when configured, then close.
extern "C" fn state_exit_hook() {
    let mut guard = lock();
    if let Some(manager) = guard.take()
        && manager.auto_persist
        && let Err(e) = manager.save()
    {
        eprintln!("opal runtime: state save at exit failed: {e}");
    }
}

// Rust-level API (the C ABI below wraps these; tests drive them directly).

/// Create the singleton. Fails (with a warning) when already live.
pub fn state_init() -> bool {
    EXIT_HOOK.call_once(|| unsafe {
        libc::atexit(state_exit_hook);
    });
    let mut guard = lock();
    if guard.is_some() {
        eprintln!("opal runtime: state init: already initialized");
        return false;
    }
    *guard = Some(StateManager::new());
    true
}

/// Free all entries and leave the store closed.
pub fn state_close() -> bool {
    let mut guard = lock();
    if guard.take().is_none() {
        dead_store("close")
    } else {
        true
    }
}

pub fn state_set(key: &[u8], value: &[u8]) -> bool {
    let mut guard = lock();
    match guard.as_mut() {
        None => dead_store("set"),
        Some(manager) => {
            manager.set(key, value);
            if manager.auto_persist
                && let Err(e) = manager.save()
            {
                eprintln!("opal runtime: state auto-persist failed: {e}");
                return false;
            }
            true
        }
    }
}

/// A fresh owned copy of the stored bytes; empty when absent.
pub fn state_get(key: &[u8]) -> Option<Vec<u8>> {
    let guard = lock();
    match guard.as_ref() {
        None => {
            dead_store("get");
            None
        }
        Some(manager) => Some(manager.get(key).unwrap_or_default()),
    }
}

pub fn state_has(key: &[u8]) -> bool {
    lock().as_ref().is_some_and(|manager| manager.has(key))
}

pub fn state_delete(key: &[u8]) -> bool {
    let mut guard = lock();
    match guard.as_mut() {
        None => dead_store("delete"),
        Some(manager) => manager.delete(key),
    }
}

pub fn state_clear() -> bool {
    let mut guard = lock();
    match guard.as_mut() {
        None => dead_store("clear"),
        Some(manager) => {
            manager.clear();
            true
        }
    }
}

/// Recognized keys: `auto_persist` (1/0) and `persist_file` (path).
/// Unknown keys warn and fail.
pub fn state_config_set(key: &str, value: &str) -> bool {
    let mut guard = lock();
    match guard.as_mut() {
        None => dead_store("config_set"),
        Some(manager) => match key {
            "auto_persist" => {
                manager.auto_persist = value == "1";
                true
            }
            "persist_file" => {
                manager.persist_file = PathBuf::from(value);
                true
            }
            _ => {
                eprintln!("opal runtime: state config: unknown key '{key}'");
                false
            }
        },
    }
}

pub fn state_save() -> bool {
    let guard = lock();
    match guard.as_ref() {
        None => dead_store("save"),
        Some(manager) => match manager.save() {
            Ok(()) => true,
            Err(e) => {
                eprintln!("opal runtime: state save failed: {e}");
                false
            }
        },
    }
}

pub fn state_load() -> bool {
    let mut guard = lock();
    match guard.as_mut() {
        None => dead_store("load"),
        Some(manager) => match manager.load() {
            Ok(()) => true,
            Err(e) => {
                eprintln!("opal runtime: state load failed: {e}");
                false
            }
        },
    }
}

/// Storage statistics `(inline_count, heap_count, heap_bytes)`; `None`
/// when the store is not live.
pub fn state_stats() -> Option<(usize, usize, usize)> {
    lock()
        .as_ref()
        .map(|m| (m.inline_count, m.heap_count, m.heap_bytes))
}

/// Number of live entries; `None` when the store is not live.
pub fn state_len() -> Option<usize> {
    lock().as_ref().map(|m| m.count)
}

// C ABI (for LLVM codegen; all predicates and status results are i64 1/0).

unsafe fn cstr_bytes<'a>(p: *const c_char) -> &'a [u8] {
    unsafe { CStr::from_ptr(p) }.to_bytes()
}

/// Create the state singleton (1 on success, 0 on double-init).
#[unsafe(no_mangle)]
pub extern "C" fn opal_state_init() -> i64 {
    state_init() as i64
}

/// Close the singleton, freeing all entries.
#[unsafe(no_mangle)]
pub extern "C" fn opal_state_close() -> i64 {
    state_close() as i64
}

/// Store a copy of `value` under `key` (rewrite in place when present).
///
/// # Safety
/// `key` and `value` must be valid nul-terminated C strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_state_set(key: *const c_char, value: *const c_char) -> i64 {
    if key.is_null() || value.is_null() {
        return 0;
    }
    state_set(unsafe { cstr_bytes(key) }, unsafe { cstr_bytes(value) }) as i64
}

/// A freshly owned copy of the stored value (empty string when absent);
/// caller frees with `opal_cstr_free`. Null when the store is not live.
///
/// # Safety
/// `key` must be a valid nul-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_state_get(key: *const c_char) -> *mut c_char {
    if key.is_null() {
        return std::ptr::null_mut();
    }
    match state_get(unsafe { cstr_bytes(key) }) {
        None => std::ptr::null_mut(),
        Some(bytes) => {
            // Interior nuls cannot survive the C string boundary.
            let sanitized: Vec<u8> = bytes
                .into_iter()
                .map(|b| if b == 0 { b'?' } else { b })
                .collect();
            std::ffi::CString::new(sanitized)
                .expect("nul bytes already replaced")
                .into_raw()
        }
    }
}

/// Presence check (1/0).
///
/// # Safety
/// `key` must be a valid nul-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_state_has(key: *const c_char) -> i64 {
    if key.is_null() {
        return 0;
    }
    state_has(unsafe { cstr_bytes(key) }) as i64
}

/// Unlink and free (1 when a key was found).
///
/// # Safety
/// `key` must be a valid nul-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_state_delete(key: *const c_char) -> i64 {
    if key.is_null() {
        return 0;
    }
    state_delete(unsafe { cstr_bytes(key) }) as i64
}

/// Free all entries; counters reset.
#[unsafe(no_mangle)]
pub extern "C" fn opal_state_clear() -> i64 {
    state_clear() as i64
}

/// Set a configuration key (`auto_persist`, `persist_file`).
///
/// # Safety
/// `key` and `value` must be valid nul-terminated C strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_state_config_set(key: *const c_char, value: *const c_char) -> i64 {
    if key.is_null() || value.is_null() {
        return 0;
    }
    let key = unsafe { CStr::from_ptr(key) }.to_string_lossy();
    let value = unsafe { CStr::from_ptr(value) }.to_string_lossy();
    state_config_set(&key, &value) as i64
}

/// Serialize to the persist file (1/0).
#[unsafe(no_mangle)]
pub extern "C" fn opal_state_save() -> i64 {
    state_save() as i64
}

/// Replay the persist file through `set` (1/0).
#[unsafe(no_mangle)]
pub extern "C" fn opal_state_load() -> i64 {
    state_load() as i64
}

// String-handle adapters. Generated code holds keys and values as SSO
// envelopes; these entry points bridge them to the store without a
// round-trip through C strings at every call site.

/// `opal_state_set` over string handles.
///
/// # Safety
/// `key` and `value` must be valid string handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_state_set_str(
    key: *const opal_core::OpalString,
    value: *const opal_core::OpalString,
) -> i64 {
    if key.is_null() || value.is_null() {
        return 0;
    }
    let (key, value) = unsafe { (&*key, &*value) };
    state_set(key.as_bytes(), value.as_bytes()) as i64
}

/// `opal_state_get` over string handles: a freshly owned envelope
/// holding the stored bytes, empty when the key is absent or the store
/// is not live.
///
/// # Safety
/// `key` must be a valid string handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_state_get_str(
    key: *const opal_core::OpalString,
) -> *mut opal_core::OpalString {
    assert!(!key.is_null(), "state_get_str: null key handle");
    let key = unsafe { &*key };
    let bytes = state_get(key.as_bytes()).unwrap_or_default();
    Box::into_raw(Box::new(opal_core::OpalString::new(&bytes)))
}

/// `opal_state_has` over a string handle.
///
/// # Safety
/// `key` must be a valid string handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_state_has_str(key: *const opal_core::OpalString) -> i64 {
    assert!(!key.is_null(), "state_has_str: null key handle");
    state_has(unsafe { &*key }.as_bytes()) as i64
}

/// `opal_state_delete` over a string handle.
///
/// # Safety
/// `key` must be a valid string handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_state_delete_str(key: *const opal_core::OpalString) -> i64 {
    assert!(!key.is_null(), "state_delete_str: null key handle");
    state_delete(unsafe { &*key }.as_bytes()) as i64
}

/// `opal_state_config_set` over string handles.
///
/// # Safety
/// `key` and `value` must be valid string handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn opal_state_config_set_str(
    key: *const opal_core::OpalString,
    value: *const opal_core::OpalString,
) -> i64 {
    if key.is_null() || value.is_null() {
        return 0;
    }
    let (key, value) = unsafe { (&*key, &*value) };
    let key = String::from_utf8_lossy(key.as_bytes());
    let value = String::from_utf8_lossy(value.as_bytes());
    state_config_set(&key, &value) as i64
}
