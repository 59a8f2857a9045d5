//! Tagged numeric values
//!
//! The surface type `numeric` spans three storage kinds behind one
//! discriminated value: a machine integer fast path, a double-precision
//! mode for non-integer literals, and arbitrary-precision decimals as the
//! overflow sink. The kind is chosen at construction and carried
//! explicitly; all arithmetic dispatches on it.
//!
//! Mixed-kind arithmetic promotes both operands to the higher kind in the
//! order `I64 < F64 < BIG`. An I64 and a BIG denoting the same magnitude
//! are equal: equality is defined by magnitude, not representation.
//!
//! Integer arithmetic is probed for overflow on every operation; on
//! overflow both operands are promoted to [`BigDec`] and the operation
//! retried there, so integer results are always exact.

use crate::bigdec::BigDec;
use crate::overflow::{safe_add, safe_mul, safe_sub};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

/// Storage kind discriminants, stable across the C ABI.
pub const KIND_I64: u8 = 1;
pub const KIND_F64: u8 = 2;
pub const KIND_BIG: u8 = 3;

/// A surface `numeric` value.
#[derive(Clone, Debug)]
pub enum Numeric {
    Int(i64),
    Float(f64),
    Big(Rc<BigDec>),
}

impl Numeric {
    /// Infer the storage kind from a literal's textual form.
    ///
    /// A literal with a decimal point is F64. Integer literals take the
    /// machine representation when they fit in a signed 64-bit range and
    /// spill to arbitrary precision otherwise. Returns `None` for text
    /// that is not a numeric literal at all.
    pub fn from_literal(text: &str) -> Option<Numeric> {
        if text.contains('.') {
            return text.parse::<f64>().ok().map(Numeric::Float);
        }
        match text.parse::<i64>() {
            Ok(v) => Some(Numeric::Int(v)),
            // Out-of-range integer text is still a valid literal; it just
            // starts life in the big representation.
            Err(_) => text
                .parse::<BigDec>()
                .ok()
                .map(|b| Numeric::Big(Rc::new(b))),
        }
    }

    pub fn from_big(b: BigDec) -> Numeric {
        Numeric::Big(Rc::new(b))
    }

    /// The ABI discriminant for this value's storage kind.
    pub fn kind(&self) -> u8 {
        match self {
            Numeric::Int(_) => KIND_I64,
            Numeric::Float(_) => KIND_F64,
            Numeric::Big(_) => KIND_BIG,
        }
    }

    pub fn add(&self, other: &Numeric) -> Numeric {
        self.binary(other, safe_add, f64_add, BigDec::add)
    }

    pub fn sub(&self, other: &Numeric) -> Numeric {
        self.binary(other, safe_sub, f64_sub, BigDec::sub)
    }

    pub fn mul(&self, other: &Numeric) -> Numeric {
        self.binary(other, safe_mul, f64_mul, BigDec::mul)
    }

    /// Truncating division. `None` signals division by zero (integer and
    /// big kinds only; float division follows IEEE-754 and never fails).
    pub fn div(&self, other: &Numeric) -> Option<Numeric> {
        match (self, other) {
            (Numeric::Int(_), Numeric::Int(0)) => None,
            (Numeric::Int(a), Numeric::Int(b)) => {
                // i64::MIN / -1 is the one quotient that cannot stay machine-sized.
                if *a == i64::MIN && *b == -1 {
                    let big = BigDec::from_i64(*a).div(&BigDec::from_i64(*b));
                    big.map(Numeric::from_big)
                } else {
                    Some(Numeric::Int(a / b))
                }
            }
            (Numeric::Float(_), Numeric::Big(_)) | (Numeric::Big(_), Numeric::Float(_)) => {
                // Same promotion order as add/sub/mul: big wins.
                self.to_big().div(&other.to_big()).map(Numeric::from_big)
            }
            (Numeric::Float(_), _) | (_, Numeric::Float(_)) => {
                Some(Numeric::Float(self.to_f64() / other.to_f64()))
            }
            _ => {
                let a = self.to_big();
                let b = other.to_big();
                a.div(&b).map(Numeric::from_big)
            }
        }
    }

    /// Additive inverse.
    pub fn neg(&self) -> Numeric {
        match self {
            Numeric::Int(v) => match v.checked_neg() {
                Some(n) => Numeric::Int(n),
                None => Numeric::from_big(BigDec::from_i64(*v).neg()),
            },
            Numeric::Float(v) => Numeric::Float(-v),
            Numeric::Big(b) => Numeric::from_big(b.neg()),
        }
    }

    /// Total order agreeing with the mathematical order of the
    /// represented values across kinds. Float NaN sorts below everything
    /// (it cannot arise from surface literals).
    pub fn compare(&self, other: &Numeric) -> Ordering {
        match (self, other) {
            (Numeric::Int(a), Numeric::Int(b)) => a.cmp(b),
            (Numeric::Float(_), _) | (_, Numeric::Float(_)) => self
                .to_f64()
                .partial_cmp(&other.to_f64())
                .unwrap_or_else(|| {
                    if self.to_f64().is_nan() && other.to_f64().is_nan() {
                        Ordering::Equal
                    } else if self.to_f64().is_nan() {
                        Ordering::Less
                    } else {
                        Ordering::Greater
                    }
                }),
            _ => self.to_big().cmp(&other.to_big()),
        }
    }

    /// Tag-directed dispatch for add/sub/mul: both operands are promoted
    /// to the higher kind, and the integer fast path retries in big
    /// precision when its probe trips.
    fn binary(
        &self,
        other: &Numeric,
        int_op: fn(i64, i64) -> (i64, bool),
        float_op: fn(f64, f64) -> f64,
        big_op: fn(&BigDec, &BigDec) -> BigDec,
    ) -> Numeric {
        match (self, other) {
            (Numeric::Int(a), Numeric::Int(b)) => {
                let (r, overflow) = int_op(*a, *b);
                if overflow {
                    let big = big_op(&BigDec::from_i64(*a), &BigDec::from_i64(*b));
                    Numeric::from_big(big)
                } else {
                    Numeric::Int(r)
                }
            }
            (Numeric::Float(_), Numeric::Big(_)) | (Numeric::Big(_), Numeric::Float(_)) => {
                Numeric::from_big(big_op(&self.to_big(), &other.to_big()))
            }
            (Numeric::Float(_), _) | (_, Numeric::Float(_)) => {
                Numeric::Float(float_op(self.to_f64(), other.to_f64()))
            }
            _ => Numeric::from_big(big_op(&self.to_big(), &other.to_big())),
        }
    }

    /// Widen to f64 (approximate beyond 2^53).
    pub fn to_f64(&self) -> f64 {
        match self {
            Numeric::Int(v) => *v as f64,
            Numeric::Float(v) => *v,
            Numeric::Big(b) => {
                let approx: f64 = b.digits().parse().unwrap_or(f64::INFINITY);
                if b.is_negative() { -approx } else { approx }
            }
        }
    }

    /// Widen to arbitrary precision. Floats truncate toward zero.
    pub fn to_big(&self) -> BigDec {
        match self {
            Numeric::Int(v) => BigDec::from_i64(*v),
            Numeric::Float(v) => {
                let t = v.trunc();
                if t.abs() < 9.2e18 {
                    BigDec::from_i64(t as i64)
                } else {
                    // Beyond i64: format without a fractional part and reparse.
                    format!("{t:.0}").parse().unwrap_or_else(|_| BigDec::zero())
                }
            }
            Numeric::Big(b) => (**b).clone(),
        }
    }
}

impl PartialEq for Numeric {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl fmt::Display for Numeric {
    /// The observable console form: I64 as plain decimal, F64 in
    /// `%g`-equivalent notation, BIG as its canonical digit string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Numeric::Int(v) => write!(f, "{v}"),
            Numeric::Float(v) => write!(f, "{}", format_g(*v)),
            Numeric::Big(b) => write!(f, "{b}"),
        }
    }
}

fn f64_add(a: f64, b: f64) -> f64 {
    a + b
}
fn f64_sub(a: f64, b: f64) -> f64 {
    a - b
}
fn f64_mul(a: f64, b: f64) -> f64 {
    a * b
}

/// Format a double the way C's `%g` does: six significant digits,
/// trailing zeros stripped, scientific notation when the decimal exponent
/// is below -4 or at least 6.
pub fn format_g(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if v == 0.0 {
        return "0".to_string();
    }

    // Round to six significant digits first, then read the exponent off
    // the rounded form so boundary values land in the right branch.
    let sci = format!("{v:.5e}");
    let (mantissa, exp) = sci.split_once('e').expect("{:e} always emits an exponent");
    let exp: i32 = exp.parse().expect("exponent is a small integer");

    if !(-4..6).contains(&exp) {
        let mantissa = mantissa.trim_end_matches('0').trim_end_matches('.');
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    } else {
        let precision = (5 - exp) as usize;
        let fixed = format!("{v:.precision$}");
        if fixed.contains('.') {
            fixed
                .trim_end_matches('0')
                .trim_end_matches('.')
                .to_string()
        } else {
            fixed
        }
    }
}
