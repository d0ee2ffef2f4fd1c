//! JSON numbers that keep their literal subtype.
//!
//! Schema bounds and instance values are both carried as [`Number`], so a
//! comparison between, say, `u64::MAX` and `-1` is decided exactly instead of
//! going through `f64`.

use std::cmp::Ordering;

/// A JSON number as produced by the parser: negative integers are
/// [`Signed`](Number::Signed), non-negative integers
/// [`Unsigned`](Number::Unsigned), everything else [`Double`](Number::Double).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Signed(i64),
    Unsigned(u64),
    Double(f64),
}

impl Number {
    /// Converts a `serde_json` number, preferring the integer subtypes.
    pub fn from_json(number: &serde_json::Number) -> Self {
        if let Some(u) = number.as_u64() {
            Number::Unsigned(u)
        } else if let Some(i) = number.as_i64() {
            Number::Signed(i)
        } else {
            Number::Double(number.as_f64().unwrap_or(f64::NAN))
        }
    }

    /// Returns `true` for the two integer subtypes.
    pub fn is_integer(self) -> bool {
        !matches!(self, Number::Double(_))
    }

    /// Collapses equal values onto one representation: non-negative signed
    /// values become unsigned, integral doubles within range become integers.
    ///
    /// Two numbers are numerically equal exactly when their canonical forms
    /// are equal, which is what enum matching and `uniqueItems` hashing rely on.
    ///
    /// ```
    /// use stream_schema_core::Number;
    ///
    /// assert_eq!(Number::Double(3.0).canonical(), Number::Unsigned(3));
    /// assert_eq!(Number::Signed(7).canonical(), Number::Unsigned(7));
    /// assert_eq!(Number::Double(-2.0).canonical(), Number::Signed(-2));
    /// assert_eq!(Number::Double(0.5).canonical(), Number::Double(0.5));
    /// ```
    pub fn canonical(self) -> Self {
        match self {
            Number::Signed(i) if i >= 0 => Number::Unsigned(i as u64),
            Number::Double(d) if d.fract() == 0.0 => {
                if d >= 0.0 && d < 18_446_744_073_709_551_616.0 {
                    Number::Unsigned(d as u64)
                } else if d < 0.0 && d >= -9_223_372_036_854_775_808.0 {
                    Number::Signed(d as i64)
                } else {
                    self
                }
            }
            other => other,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Signed(i) => i as f64,
            Number::Unsigned(u) => u as f64,
            Number::Double(d) => d,
        }
    }
}

/// Orders two numbers, exactly when both are integers and in double
/// precision otherwise. `None` only when a NaN is involved.
pub fn compare(lhs: Number, rhs: Number) -> Option<Ordering> {
    match (lhs, rhs) {
        (Number::Signed(a), Number::Signed(b)) => Some(a.cmp(&b)),
        (Number::Unsigned(a), Number::Unsigned(b)) => Some(a.cmp(&b)),
        (Number::Signed(a), Number::Unsigned(b)) => Some(if a < 0 {
            Ordering::Less
        } else {
            (a as u64).cmp(&b)
        }),
        (Number::Unsigned(a), Number::Signed(b)) => Some(if b < 0 {
            Ordering::Greater
        } else {
            a.cmp(&(b as u64))
        }),
        _ => lhs.as_f64().partial_cmp(&rhs.as_f64()),
    }
}

/// Divisor of a compiled `multipleOf`. Positive integer literals of either
/// sign subtype are stored as unsigned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MultipleOf {
    Unsigned(u64),
    Double(f64),
}

impl MultipleOf {
    /// Returns `true` if `value` is an integer multiple of this divisor.
    pub fn divides(self, value: Number) -> bool {
        match (self, value) {
            (MultipleOf::Unsigned(m), Number::Unsigned(v)) => v % m == 0,
            (MultipleOf::Unsigned(m), Number::Signed(v)) => v.unsigned_abs() % m == 0,
            (MultipleOf::Unsigned(m), Number::Double(v)) => is_multiple_of(v, m as f64),
            (MultipleOf::Double(m), v) => is_multiple_of(v.as_f64(), m),
        }
    }
}

fn is_multiple_of(value: f64, divisor: f64) -> bool {
    let remainder = value % divisor;
    remainder.abs() < f64::EPSILON || (remainder - divisor).abs() < f64::EPSILON
}

/// An upper or lower bound from `maximum`/`minimum`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bound {
    pub limit: Number,
    pub exclusive: bool,
}

impl Bound {
    /// Returns `true` if `value` does not exceed this bound as a maximum.
    pub fn admits_below(self, value: Number) -> bool {
        match compare(value, self.limit) {
            Some(Ordering::Greater) => false,
            Some(Ordering::Equal) => !self.exclusive,
            _ => true,
        }
    }

    /// Returns `true` if `value` is not below this bound as a minimum.
    pub fn admits_above(self, value: Number) -> bool {
        match compare(value, self.limit) {
            Some(Ordering::Less) => false,
            Some(Ordering::Equal) => !self.exclusive,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_mixed_integer_subtypes_is_exact() {
        assert_eq!(
            compare(Number::Signed(-1), Number::Unsigned(u64::MAX)),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare(Number::Unsigned(u64::MAX), Number::Signed(i64::MAX)),
            Some(Ordering::Greater)
        );
        assert_eq!(
            compare(Number::Unsigned(5), Number::Signed(5)),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_compare_with_double_falls_back_to_f64() {
        assert_eq!(
            compare(Number::Double(5.5), Number::Unsigned(5)),
            Some(Ordering::Greater)
        );
        assert_eq!(compare(Number::Double(f64::NAN), Number::Unsigned(1)), None);
    }

    #[test]
    fn test_bounds_respect_exclusivity() {
        let max = Bound {
            limit: Number::Unsigned(10),
            exclusive: false,
        };
        assert!(max.admits_below(Number::Unsigned(10)));
        assert!(max.admits_below(Number::Signed(-3)));
        assert!(!max.admits_below(Number::Double(10.5)));

        let exclusive_min = Bound {
            limit: Number::Signed(-2),
            exclusive: true,
        };
        assert!(!exclusive_min.admits_above(Number::Signed(-2)));
        assert!(exclusive_min.admits_above(Number::Unsigned(0)));
    }

    #[test]
    fn test_multiple_of() {
        assert!(MultipleOf::Unsigned(3).divides(Number::Signed(-9)));
        assert!(!MultipleOf::Unsigned(3).divides(Number::Unsigned(10)));
        assert!(MultipleOf::Unsigned(2).divides(Number::Double(4.0)));
        assert!(MultipleOf::Double(0.5).divides(Number::Double(2.5)));
        assert!(!MultipleOf::Double(0.5).divides(Number::Double(2.3)));
    }

    #[test]
    fn test_from_json_prefers_integers() {
        let json: serde_json::Value = serde_json::from_str("[0, -4, 1.5]").unwrap();
        let numbers: Vec<Number> = json
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| match v {
                serde_json::Value::Number(n) => Some(Number::from_json(n)),
                _ => None,
            })
            .collect();
        assert_eq!(
            numbers,
            vec![Number::Unsigned(0), Number::Signed(-4), Number::Double(1.5)]
        );
    }
}
