//! Presence-tagged optional values
//!
//! The surface optional types (`numeric?`, `string?`, `boolean?`) lower to
//! this wrapper: a presence state plus an owned byte buffer of the
//! wrapped value. In the absent state there is no buffer at all.
//!
//! Extraction of an absent value is a bounds-class error; the runtime
//! boundary turns it into process termination. Here it surfaces as `None`
//! so library callers can decide.

/// A presence-tagged, owned value buffer.
pub struct OpalOptional {
    value: Option<Box<[u8]>>,
}

impl OpalOptional {
    /// The absent value.
    pub fn none() -> OpalOptional {
        OpalOptional { value: None }
    }

    /// Wrap a copy of `bytes`.
    pub fn some(bytes: &[u8]) -> OpalOptional {
        OpalOptional {
            value: Some(bytes.into()),
        }
    }

    /// Wrap an already-owned buffer without copying.
    pub fn some_boxed(buffer: Box<[u8]>) -> OpalOptional {
        OpalOptional {
            value: Some(buffer),
        }
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Size of the wrapped buffer in bytes; zero when absent.
    pub fn value_size(&self) -> usize {
        self.value.as_ref().map_or(0, |v| v.len())
    }

    /// The wrapped bytes, or `None` when absent.
    pub fn get(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// The wrapped bytes, or `default` when absent.
    pub fn get_or<'a>(&'a self, default: &'a [u8]) -> &'a [u8] {
        self.get().unwrap_or(default)
    }

    /// Take the buffer out, leaving the wrapper absent.
    pub fn take(&mut self) -> Option<Box<[u8]>> {
        self.value.take()
    }
}

/// Left when present, else right.
pub fn coalesce<'a>(left: &'a OpalOptional, right: &'a OpalOptional) -> &'a OpalOptional {
    if left.has_value() { left } else { right }
}
