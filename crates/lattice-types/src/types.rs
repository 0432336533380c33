use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Storage kind of a pivot field, inferred from the first extracted value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    /// Normalized string column; the only kind with a categorical index
    String,
    /// `f64` column, `NaN` for missing values; the only kind with a numeric index
    Number,
    /// `0`/`1` column
    Boolean,
}

impl FieldKind {
    /// Get the kind name as a string
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single value produced by a field extractor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PivotValue {
    /// String value
    String(String),
    /// Numeric value; integers and dates are carried as `f64`
    Number(f64),
    /// Boolean value
    Boolean(bool),
    /// Missing value
    Null,
}

// -------------------------------------------------------------------------------------------------
// Conversions between `PivotValue` and `serde_json::Value`, so callers holding JSON records can
// write extractors without hand-rolled matching.
// -------------------------------------------------------------------------------------------------

impl From<PivotValue> for serde_json::Value {
    fn from(value: PivotValue) -> Self {
        match value {
            PivotValue::String(s) => Self::String(s),
            PivotValue::Number(n) => serde_json::Number::from_f64(n).map_or(Self::Null, Self::Number),
            PivotValue::Boolean(b) => Self::Bool(b),
            PivotValue::Null => Self::Null,
        }
    }
}

impl From<&PivotValue> for serde_json::Value {
    fn from(value: &PivotValue) -> Self {
        value.clone().into()
    }
}

impl TryFrom<&serde_json::Value> for PivotValue {
    type Error = anyhow::Error;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        Ok(match value {
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Number(n) => {
                Self::Number(n.as_f64().ok_or_else(|| anyhow!("Unsupported number value: {n}"))?)
            }
            serde_json::Value::Bool(b) => Self::Boolean(*b),
            serde_json::Value::Null => Self::Null,
            // Nested values collapse to their JSON text, the same way a string column would show them
            other @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                Self::String(other.to_string())
            }
        })
    }
}

impl From<&str> for PivotValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PivotValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&String> for PivotValue {
    fn from(value: &String) -> Self {
        Self::String(value.clone())
    }
}

impl From<f64> for PivotValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<f32> for PivotValue {
    fn from(value: f32) -> Self {
        Self::Number(f64::from(value))
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for PivotValue {
                #[allow(clippy::cast_precision_loss, clippy::cast_lossless)]
                fn from(value: $ty) -> Self {
                    Self::Number(value as f64)
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl From<bool> for PivotValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

/// Dates are coerced to epoch milliseconds so they land in a numeric column
impl From<DateTime<Utc>> for PivotValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: DateTime<Utc>) -> Self {
        Self::Number(value.timestamp_millis() as f64)
    }
}

impl<V> From<Option<V>> for PivotValue
where
    V: Into<Self>,
{
    fn from(value: Option<V>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl fmt::Display for PivotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Null => f.write_str("null"),
        }
    }
}

impl PivotValue {
    /// The field kind a column would take if this were its first value
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::Number(_) => FieldKind::Number,
            Self::Boolean(_) => FieldKind::Boolean,
            Self::String(_) | Self::Null => FieldKind::String,
        }
    }

    /// Canonical string form used by string columns
    #[must_use]
    pub fn stringify(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Numeric form used by number columns; anything that is not a number is `NaN`
    #[must_use]
    pub const fn as_number(&self) -> f64 {
        match self {
            Self::Number(n) => *n,
            _ => f64::NAN,
        }
    }

    /// Check if this value is "truthy"; used to coerce values into boolean columns
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Boolean(b) => *b,
            Self::Number(n) => n.abs() > 0.0,
            Self::String(s) => !s.is_empty(),
            Self::Null => false,
        }
    }

    /// Check whether the value is missing
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name as a string
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Boolean(_) => "boolean",
            Self::Null => "null",
        }
    }

    /// Ordering between two values of the same variant; `None` across variants
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Number(a), Self::Number(b)) => a.partial_cmp(b),
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            _ => None,
        }
    }
}

/// Format a number the way a string column stores it: integral values carry no
/// fractional part, non-finite values use their long names. Magnitudes of `1e21` and
/// above or below `1e-6` switch to exponent form (`1e+21`, `1.5e-7`).
#[must_use]
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else if n == 0.0 {
        // covers -0.0
        "0".to_string()
    } else if !(EXPONENT_BELOW..EXPONENT_FROM).contains(&n.abs()) {
        let formatted = format!("{n:e}");
        match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => format!("{mantissa}e+{exponent}"),
            _ => formatted,
        }
    } else {
        format!("{n}")
    }
}

const EXPONENT_FROM: f64 = 1e21;
const EXPONENT_BELOW: f64 = 1e-6;

/// Format a number with `precision` fractional digits, rounding exact ties away from zero.
///
/// Rounding works on the exact binary value, so `0.25` becomes `0.3` while `0.15` (stored as
/// slightly less than that) becomes `0.1`. Magnitudes of `1e21` and above fall back to
/// [`format_number`].
#[must_use]
pub fn format_fixed(n: f64, precision: usize) -> String {
    if !n.is_finite() || n.abs() >= EXPONENT_FROM {
        return format_number(n);
    }

    let magnitude = n.abs();
    // enough exact digits to tell a true tie from a value one ulp off it
    let exact = format!("{:.*}", precision + 40, magnitude);
    let cut = exact.find('.').map_or(exact.len(), |point| point + 1 + precision);
    let (kept, rest) = exact.split_at(cut);
    let is_tie = rest.starts_with('5') && rest[1..].bytes().all(|b| b == b'0');

    let digits = if is_tie {
        let truncated: f64 = kept.trim_end_matches('.').parse().unwrap_or(magnitude);
        let step = 10f64.powi(-(precision as i32));
        format!("{:.precision$}", truncated + step)
    } else {
        format!("{magnitude:.precision$}")
    };

    if n < 0.0 { format!("-{digits}") } else { digits }
}
