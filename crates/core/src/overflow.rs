//! Overflow probes for signed 64-bit arithmetic
//!
//! Every arithmetic operation the code generator emits for the integer fast
//! path is guarded by one of these predicates. When a probe reports
//! overflow, both operands are promoted to arbitrary precision and the
//! operation is retried there.
//!
//! The probes are exact: `safe_add(a, b)` yields the mathematically correct
//! sum precisely when `add_would_overflow(a, b)` is false, and reports
//! overflow otherwise (same for sub and mul). Note the `i64::MIN` edge
//! cases: `a - i64::MIN` overflows for every `a >= 0`, and
//! `(-1) * i64::MIN` overflows even though both operands are small.

/// True when `a + b` does not fit in a signed 64-bit integer.
pub fn add_would_overflow(a: i64, b: i64) -> bool {
    a.checked_add(b).is_none()
}

/// True when `a - b` does not fit in a signed 64-bit integer.
pub fn sub_would_overflow(a: i64, b: i64) -> bool {
    a.checked_sub(b).is_none()
}

/// True when `a * b` does not fit in a signed 64-bit integer.
pub fn mul_would_overflow(a: i64, b: i64) -> bool {
    a.checked_mul(b).is_none()
}

/// Add with an overflow report: `(result, overflowed)`.
///
/// The result slot holds zero when the operation overflowed.
pub fn safe_add(a: i64, b: i64) -> (i64, bool) {
    match a.checked_add(b) {
        Some(r) => (r, false),
        None => (0, true),
    }
}

/// Subtract with an overflow report: `(result, overflowed)`.
pub fn safe_sub(a: i64, b: i64) -> (i64, bool) {
    match a.checked_sub(b) {
        Some(r) => (r, false),
        None => (0, true),
    }
}

/// Multiply with an overflow report: `(result, overflowed)`.
pub fn safe_mul(a: i64, b: i64) -> (i64, bool) {
    match a.checked_mul(b) {
        Some(r) => (r, false),
        None => (0, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_probe() {
        assert!(!add_would_overflow(100, 200));
        assert!(add_would_overflow(i64::MAX, 1));
        assert!(add_would_overflow(i64::MIN, -1));
        assert!(add_would_overflow(i64::MAX, i64::MAX));
        assert!(!add_would_overflow(i64::MAX, 0));
        assert!(!add_would_overflow(i64::MIN, 0));
        assert!(!add_would_overflow(i64::MAX, i64::MIN));
    }

    #[test]
    fn test_sub_probe() {
        assert!(!sub_would_overflow(200, 100));
        assert!(sub_would_overflow(i64::MIN, 1));
        assert!(sub_would_overflow(i64::MAX, -1));
        assert!(!sub_would_overflow(i64::MIN, i64::MIN));
    }

    #[test]
    fn test_sub_probe_min_divisor_edge() {
        // a - i64::MIN overflows for every non-negative a, including zero.
        assert!(sub_would_overflow(0, i64::MIN));
        assert!(sub_would_overflow(1, i64::MIN));
        assert!(!sub_would_overflow(-1, i64::MIN));
    }

    #[test]
    fn test_mul_probe() {
        assert!(!mul_would_overflow(100, 200));
        assert!(mul_would_overflow(i64::MAX, 2));
        assert!(!mul_would_overflow(i64::MAX, 0));
        assert!(!mul_would_overflow(i64::MAX, 1));
        assert!(!mul_would_overflow(i64::MIN, 1));
        assert!(!mul_would_overflow(i64::MAX, -1));
    }

    #[test]
    fn test_mul_probe_negation_edge() {
        // The single small-operand exception: negating i64::MIN.
        assert!(mul_would_overflow(-1, i64::MIN));
        assert!(mul_would_overflow(i64::MIN, -1));
    }

    #[test]
    fn test_safe_ops_agree_with_probes() {
        let samples = [
            (100i64, 200i64),
            (i64::MAX, 1),
            (i64::MIN, -1),
            (i64::MIN, i64::MIN),
            (0, i64::MIN),
            (-1, i64::MIN),
            (1_000_000, 1_000_000),
            (-1_000, 2_000),
        ];
        for (a, b) in samples {
            let (r, o) = safe_add(a, b);
            assert_eq!(o, add_would_overflow(a, b));
            if !o {
                assert_eq!(r, a + b);
            } else {
                assert_eq!(r, 0);
            }

            let (r, o) = safe_sub(a, b);
            assert_eq!(o, sub_would_overflow(a, b));
            if !o {
                assert_eq!(r, a - b);
            } else {
                assert_eq!(r, 0);
            }

            let (r, o) = safe_mul(a, b);
            assert_eq!(o, mul_would_overflow(a, b));
            if !o {
                assert_eq!(r, a * b);
            } else {
                assert_eq!(r, 0);
            }
        }
    }

    #[test]
    fn test_safe_mul_large() {
        assert_eq!(safe_mul(1_000_000, 1_000_000), (1_000_000_000_000, false));
        assert_eq!(safe_mul(-1_000, 2_000), (-2_000_000, false));
    }
}
