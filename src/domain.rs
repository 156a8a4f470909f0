//! Variable values and finite enumerable domains.
//!
//! Every domain is a finite, ordered sequence of [`Value`]s. Solvers only rely
//! on the iteration contract: `len`, `contains`, and an iterator that yields
//! each value exactly once and then reports exhaustion.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DcopError;

// ---------------------------------------------------------------------------
// Fixed-precision decimals
// ---------------------------------------------------------------------------

/// Largest supported number of decimal places; `10^MAX_SCALE` fits in an `i64`.
pub const MAX_SCALE: u8 = 18;

/// Fixed-precision decimal: `units * 10^-scale`.
///
/// Always stored in normalized form (no trailing decimal zeros), so the
/// derived equality and hash agree with numeric equality. The scale never
/// exceeds [`MAX_SCALE`], which keeps comparison and display overflow-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawFixed")]
pub struct Fixed {
    units: i64,
    scale: u8,
}

#[derive(Deserialize)]
struct RawFixed {
    units: i64,
    scale: u8,
}

impl TryFrom<RawFixed> for Fixed {
    type Error = DcopError;

    fn try_from(raw: RawFixed) -> Result<Self, Self::Error> {
        Fixed::new(raw.units, raw.scale)
    }
}

impl Fixed {
    /// Create `units * 10^-scale`, normalizing trailing zeros away.
    ///
    /// Fails with [`DcopError::ScaleOverflow`] once `scale` exceeds [`MAX_SCALE`].
    pub fn new(units: i64, scale: u8) -> Result<Self, DcopError> {
        if scale > MAX_SCALE {
            return Err(DcopError::ScaleOverflow(scale));
        }
        let (mut units, mut scale) = (units, scale);
        while scale > 0 && units % 10 == 0 {
            units /= 10;
            scale -= 1;
        }
        Ok(Self { units, scale })
    }

    /// Raw integer units at this value's scale.
    pub fn units(&self) -> i64 {
        self.units
    }

    /// Number of decimal places.
    pub fn scale(&self) -> u8 {
        self.scale
    }

    /// Units of this value expressed at a (larger or equal) scale.
    fn units_at(&self, scale: u8) -> i128 {
        self.units as i128 * 10_i128.pow(u32::from(scale - self.scale))
    }

    /// Lossy conversion to `f64`.
    pub fn to_f64(&self) -> f64 {
        self.units as f64 / 10_f64.powi(i32::from(self.scale))
    }
}

impl PartialOrd for Fixed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fixed {
    fn cmp(&self, other: &Self) -> Ordering {
        let scale = self.scale.max(other.scale);
        self.units_at(scale).cmp(&other.units_at(scale))
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.units);
        }
        let divisor = 10_i64.pow(u32::from(self.scale));
        let sign = if self.units < 0 { "-" } else { "" };
        let abs = self.units.unsigned_abs();
        write!(
            f,
            "{sign}{}.{:0width$}",
            abs / divisor as u64,
            abs % divisor as u64,
            width = usize::from(self.scale)
        )
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A single candidate value of a variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Value {
    /// Integer value.
    Int(i64),
    /// Boolean value.
    Bool(bool),
    /// Fixed-precision decimal value.
    Fixed(Fixed),
    /// Member of an explicit symbolic list.
    Symbol(String),
}

impl Value {
    /// Integer payload, if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean payload, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Fixed(v) => Some(v.to_f64()),
            Value::Symbol(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Fixed(v) => write!(f, "{v}"),
            Value::Symbol(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Fixed> for Value {
    fn from(v: Fixed) -> Self {
        Value::Fixed(v)
    }
}

// ---------------------------------------------------------------------------
// Domain
// ---------------------------------------------------------------------------

/// A finite, enumerable domain.
///
/// Build domains through the validating constructors ([`Domain::int_range`],
/// [`Domain::list`], [`Domain::grid`]); they reject empty domains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Domain {
    /// Inclusive integer range `[lo, hi]`.
    IntRange { lo: i64, hi: i64 },
    /// `false`, then `true`.
    Boolean,
    /// Explicit list of distinct values, in the given order.
    List(Vec<Value>),
    /// Fixed-precision grid `lo, lo + step, ...` up to and including `hi`.
    Grid { lo: Fixed, hi: Fixed, step: Fixed },
}

impl Domain {
    /// Inclusive integer range.
    pub fn int_range(lo: i64, hi: i64) -> Result<Self, DcopError> {
        if hi < lo {
            return Err(DcopError::EmptyDomain(format!("range [{lo}, {hi}] is empty")));
        }
        Ok(Domain::IntRange { lo, hi })
    }

    /// The boolean domain.
    pub fn boolean() -> Self {
        Domain::Boolean
    }

    /// Explicit list; must be non-empty and free of duplicates.
    pub fn list(values: Vec<Value>) -> Result<Self, DcopError> {
        if values.is_empty() {
            return Err(DcopError::EmptyDomain("list is empty".to_string()));
        }
        for (i, v) in values.iter().enumerate() {
            if values[..i].contains(v) {
                return Err(DcopError::EmptyDomain(format!("duplicate value {v}")));
            }
        }
        Ok(Domain::List(values))
    }

    /// Fixed-precision grid; `step` must be positive and `lo <= hi`.
    pub fn grid(lo: Fixed, hi: Fixed, step: Fixed) -> Result<Self, DcopError> {
        if step.units() <= 0 {
            return Err(DcopError::EmptyDomain(format!("grid step {step} is not positive")));
        }
        if hi < lo {
            return Err(DcopError::EmptyDomain(format!("grid [{lo}, {hi}] is empty")));
        }
        Ok(Domain::Grid { lo, hi, step })
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        match self {
            Domain::IntRange { lo, hi } => {
                if hi < lo {
                    0
                } else {
                    (i128::from(*hi) - i128::from(*lo) + 1) as usize
                }
            }
            Domain::Boolean => 2,
            Domain::List(values) => values.len(),
            Domain::Grid { lo, hi, step } => {
                let scale = grid_scale(lo, hi, step);
                let span = hi.units_at(scale) - lo.units_at(scale);
                let step = step.units_at(scale);
                if span < 0 || step <= 0 {
                    0
                } else {
                    (span / step + 1) as usize
                }
            }
        }
    }

    /// `true` if the domain has no values (only reachable for hand-built variants).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at a position in iteration order.
    pub fn value_at(&self, index: usize) -> Option<Value> {
        if index >= self.len() {
            return None;
        }
        match self {
            Domain::IntRange { lo, .. } => Some(Value::Int(lo + index as i64)),
            Domain::Boolean => Some(Value::Bool(index == 1)),
            Domain::List(values) => values.get(index).cloned(),
            Domain::Grid { lo, hi, step } => {
                let scale = grid_scale(lo, hi, step);
                let units = lo.units_at(scale) + step.units_at(scale) * index as i128;
                Fixed::new(units as i64, scale).ok().map(Value::Fixed)
            }
        }
    }

    /// Position of a value in iteration order, if it is a member.
    pub fn index_of(&self, value: &Value) -> Option<usize> {
        match (self, value) {
            (Domain::IntRange { lo, hi }, Value::Int(v)) => {
                (lo..=hi).contains(&v).then(|| (v - lo) as usize)
            }
            (Domain::Boolean, Value::Bool(v)) => Some(usize::from(*v)),
            (Domain::List(values), v) => values.iter().position(|x| x == v),
            (Domain::Grid { lo, hi, step }, Value::Fixed(v)) => {
                if v < lo || v > hi {
                    return None;
                }
                let scale = grid_scale(lo, hi, step).max(v.scale());
                let offset = v.units_at(scale) - lo.units_at(scale);
                let step = step.units_at(scale);
                (offset % step == 0).then(|| (offset / step) as usize)
            }
            _ => None,
        }
    }

    /// Membership test.
    pub fn contains(&self, value: &Value) -> bool {
        self.index_of(value).is_some()
    }

    /// Iterate the values in order.
    pub fn iter(&self) -> DomainIter<'_> {
        DomainIter {
            domain: self,
            next: 0,
            len: self.len(),
        }
    }

    /// All values, collected.
    pub fn values(&self) -> Vec<Value> {
        self.iter().collect()
    }
}

fn grid_scale(lo: &Fixed, hi: &Fixed, step: &Fixed) -> u8 {
    lo.scale().max(hi.scale()).max(step.scale())
}

impl<'a> IntoIterator for &'a Domain {
    type Item = Value;
    type IntoIter = DomainIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`Domain`].
///
/// Besides the standard `Iterator` protocol, [`DomainIter::next_value`]
/// reports exhaustion as an error. There is no removal operation.
#[derive(Debug, Clone)]
pub struct DomainIter<'a> {
    domain: &'a Domain,
    next: usize,
    len: usize,
}

impl DomainIter<'_> {
    /// Whether another value remains.
    pub fn has_next(&self) -> bool {
        self.next < self.len
    }

    /// Next value, or [`DcopError::DomainExhausted`] once every value was yielded.
    pub fn next_value(&mut self) -> Result<Value, DcopError> {
        self.next().ok_or(DcopError::DomainExhausted)
    }
}

impl Iterator for DomainIter<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        if self.next >= self.len {
            return None;
        }
        let value = self.domain.value_at(self.next);
        self.next += 1;
        value
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.next.min(self.len);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for DomainIter<'_> {}
