use crate::error::XdmError;
use crate::qname::{QualifiedName, is_ncname};
use crate::temporal::{DateTimeValue, DateValue, DurationKind, DurationValue, TimeValue};
use crate::types::AtomicType;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub enum AtomicValue {
    String(String),
    UntypedAtomic(String),
    AnyUri(String),
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    Double(f64),
    Float(f32),
    Date(DateValue),
    DateTime(DateTimeValue),
    Time(TimeValue),
    Duration(DurationValue),
    DayTimeDuration(DurationValue),
    YearMonthDuration(DurationValue),
    QName(QualifiedName),
}

fn format_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        if d > 0.0 { "INF" } else { "-INF" }.to_string()
    } else if d == 0.0 && d.is_sign_negative() {
        "-0".to_string()
    } else {
        d.to_string()
    }
}

fn is_decimal_lexical(s: &str) -> bool {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    let mut seen_dot = false;
    let mut seen_digit = false;
    for c in digits.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }
    seen_digit
}

fn is_double_lexical(s: &str) -> bool {
    let (mantissa, exponent) = match s.find(['e', 'E']) {
        Some(at) => (&s[..at], Some(&s[at + 1..])),
        None => (s, None),
    };
    if !is_decimal_lexical(mantissa) {
        return false;
    }
    match exponent {
        None => true,
        Some(exp) => {
            let exp = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            !exp.is_empty() && exp.chars().all(|c| c.is_ascii_digit())
        }
    }
}

fn parse_double(s: &str, target: AtomicType) -> Result<f64, XdmError> {
    match s {
        "INF" | "+INF" => Ok(f64::INFINITY),
        "-INF" => Ok(f64::NEG_INFINITY),
        "NaN" => Ok(f64::NAN),
        _ if is_double_lexical(s) => s
            .parse::<f64>()
            .map_err(|_| XdmError::lexical(target.to_string(), s)),
        _ => Err(XdmError::lexical(target.to_string(), s)),
    }
}

impl AtomicValue {
    pub fn atomic_type(&self) -> AtomicType {
        match self {
            AtomicValue::String(_) => AtomicType::String,
            AtomicValue::UntypedAtomic(_) => AtomicType::UntypedAtomic,
            AtomicValue::AnyUri(_) => AtomicType::AnyUri,
            AtomicValue::Boolean(_) => AtomicType::Boolean,
            AtomicValue::Integer(_) => AtomicType::Integer,
            AtomicValue::Decimal(_) => AtomicType::Decimal,
            AtomicValue::Double(_) => AtomicType::Double,
            AtomicValue::Float(_) => AtomicType::Float,
            AtomicValue::Date(_) => AtomicType::Date,
            AtomicValue::DateTime(_) => AtomicType::DateTime,
            AtomicValue::Time(_) => AtomicType::Time,
            AtomicValue::Duration(_) => AtomicType::Duration,
            AtomicValue::DayTimeDuration(_) => AtomicType::DayTimeDuration,
            AtomicValue::YearMonthDuration(_) => AtomicType::YearMonthDuration,
            AtomicValue::QName(_) => AtomicType::QName,
        }
    }

    pub fn type_name(&self) -> String {
        self.atomic_type().to_string()
    }

    pub fn is_instance_of(&self, target: AtomicType) -> bool {
        self.atomic_type().is_subtype_of(target)
    }

    pub fn is_numeric(&self) -> bool {
        self.atomic_type().is_numeric()
    }

    pub fn is_string_like(&self) -> bool {
        matches!(
            self,
            AtomicValue::String(_) | AtomicValue::UntypedAtomic(_) | AtomicValue::AnyUri(_)
        )
    }

    pub fn to_string_value(&self) -> String {
        match self {
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => {
                s.clone()
            }
            AtomicValue::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
            AtomicValue::Integer(i) => i.to_string(),
            AtomicValue::Decimal(d) => d.normalize().to_string(),
            AtomicValue::Double(d) => format_double(*d),
            AtomicValue::Float(f) => format_double(f64::from(*f)),
            AtomicValue::Date(d) => d.to_string(),
            AtomicValue::DateTime(d) => d.to_string(),
            AtomicValue::Time(t) => t.to_string(),
            AtomicValue::Duration(d) => d.format(DurationKind::Any),
            AtomicValue::DayTimeDuration(d) => d.format(DurationKind::DayTime),
            AtomicValue::YearMonthDuration(d) => d.format(DurationKind::YearMonth),
            AtomicValue::QName(q) => q.to_string(),
        }
    }

    /// Effective boolean value of a single atomic value.
    pub fn to_boolean(&self) -> Result<bool, XdmError> {
        match self {
            AtomicValue::Boolean(b) => Ok(*b),
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => {
                Ok(!s.is_empty())
            }
            AtomicValue::Integer(i) => Ok(*i != 0),
            AtomicValue::Decimal(d) => Ok(!d.is_zero()),
            AtomicValue::Double(d) => Ok(*d != 0.0 && !d.is_nan()),
            AtomicValue::Float(f) => Ok(*f != 0.0 && !f.is_nan()),
            other => Err(XdmError::NoEffectiveBooleanValue(other.type_name())),
        }
    }

    pub fn to_double(&self) -> f64 {
        match self {
            AtomicValue::Double(d) => *d,
            AtomicValue::Float(f) => f64::from(*f),
            AtomicValue::Integer(i) => *i as f64,
            AtomicValue::Decimal(d) => d.to_f64().unwrap_or(f64::NAN),
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => {
                parse_double(s.trim(), AtomicType::Double).unwrap_or(f64::NAN)
            }
            AtomicValue::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            _ => f64::NAN,
        }
    }

    fn to_decimal(&self) -> Option<Decimal> {
        match self {
            AtomicValue::Integer(i) => Some(Decimal::from(*i)),
            AtomicValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Value comparison. Returns `None` for incomparable types, and for NaN.
    pub fn compare(&self, other: &AtomicValue) -> Option<Ordering> {
        use AtomicValue as A;
        match (self, other) {
            (a, b) if a.is_numeric() && b.is_numeric() => match (a.to_decimal(), b.to_decimal()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => a.to_double().partial_cmp(&b.to_double()),
            },
            (a, b) if a.is_string_like() && b.is_string_like() => {
                Some(a.to_string_value().cmp(&b.to_string_value()))
            }
            (A::Boolean(a), A::Boolean(b)) => Some(a.cmp(b)),
            (A::Date(a), A::Date(b)) => Some(a.cmp(b)),
            (A::DateTime(a), A::DateTime(b)) => Some(a.cmp(b)),
            (A::Time(a), A::Time(b)) => Some(a.cmp(b)),
            (
                A::Duration(a) | A::DayTimeDuration(a) | A::YearMonthDuration(a),
                A::Duration(b) | A::DayTimeDuration(b) | A::YearMonthDuration(b),
            ) => Some(a.cmp(b)),
            (A::QName(a), A::QName(b)) if a == b => Some(Ordering::Equal),
            _ => None,
        }
    }

    /// Parses `lexical` as a value of `target`.
    pub fn parse_as(target: AtomicType, lexical: &str) -> Result<AtomicValue, XdmError> {
        let s = lexical.trim();
        let err = || XdmError::lexical(target.to_string(), lexical);
        match target {
            AtomicType::AnyAtomic | AtomicType::UntypedAtomic => {
                Ok(AtomicValue::UntypedAtomic(lexical.to_string()))
            }
            AtomicType::String => Ok(AtomicValue::String(lexical.to_string())),
            AtomicType::AnyUri => Ok(AtomicValue::AnyUri(s.to_string())),
            AtomicType::Boolean => match s {
                "true" | "1" => Ok(AtomicValue::Boolean(true)),
                "false" | "0" => Ok(AtomicValue::Boolean(false)),
                _ => Err(err()),
            },
            AtomicType::Integer => {
                let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
                if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                    return Err(err());
                }
                s.parse::<i64>().map(AtomicValue::Integer).map_err(|_| err())
            }
            AtomicType::Decimal => {
                if !is_decimal_lexical(s) {
                    return Err(err());
                }
                Decimal::from_str(s).map(AtomicValue::Decimal).map_err(|_| err())
            }
            AtomicType::Double | AtomicType::Numeric => {
                parse_double(s, AtomicType::Double).map(AtomicValue::Double)
            }
            AtomicType::Float => parse_double(s, AtomicType::Float).map(|d| AtomicValue::Float(d as f32)),
            AtomicType::Date => DateValue::parse(s).map(AtomicValue::Date),
            AtomicType::DateTime => DateTimeValue::parse(s).map(AtomicValue::DateTime),
            AtomicType::Time => TimeValue::parse(s).map(AtomicValue::Time),
            AtomicType::Duration => {
                DurationValue::parse(s, DurationKind::Any).map(AtomicValue::Duration)
            }
            AtomicType::DayTimeDuration => {
                DurationValue::parse(s, DurationKind::DayTime).map(AtomicValue::DayTimeDuration)
            }
            AtomicType::YearMonthDuration => {
                DurationValue::parse(s, DurationKind::YearMonth).map(AtomicValue::YearMonthDuration)
            }
            AtomicType::QName => {
                if let Some(rest) = s.strip_prefix("Q{") {
                    let (uri, local) = rest.split_once('}').ok_or_else(err)?;
                    if is_ncname(local) {
                        return Ok(AtomicValue::QName(QualifiedName::new(Some(uri), local)));
                    }
                } else if is_ncname(s) {
                    return Ok(AtomicValue::QName(QualifiedName::local(s)));
                }
                Err(err())
            }
        }
    }

    /// Casts this value to `target`.
    ///
    /// Values that are already instances of `target` are returned unchanged. Numeric,
    /// boolean and temporal conversions are performed directly; everything else goes
    /// through the string value of the source.
    pub fn cast_to(&self, target: AtomicType) -> Result<AtomicValue, XdmError> {
        use AtomicValue as A;
        if self.is_instance_of(target) {
            return Ok(self.clone());
        }
        let invalid = || XdmError::invalid_cast(self.type_name(), target.to_string());

        match (target, self) {
            (AtomicType::String | AtomicType::UntypedAtomic, value) => {
                Self::parse_as(target, &value.to_string_value())
            }
            (AtomicType::Boolean, value) if value.is_numeric() => {
                value.to_boolean().map(A::Boolean)
            }
            (AtomicType::Integer, A::Boolean(b)) => Ok(A::Integer(i64::from(*b))),
            (AtomicType::Integer, A::Decimal(d)) => d.trunc().to_i64().map(A::Integer).ok_or_else(invalid),
            (AtomicType::Integer, A::Double(_) | A::Float(_)) => {
                let d = self.to_double();
                if d.is_finite() && d.abs() < 9.2e18 {
                    Ok(A::Integer(d.trunc() as i64))
                } else {
                    Err(invalid())
                }
            }
            (AtomicType::Decimal, A::Boolean(b)) => Ok(A::Decimal(Decimal::from(i64::from(*b)))),
            (AtomicType::Decimal, A::Integer(i)) => Ok(A::Decimal(Decimal::from(*i))),
            (AtomicType::Decimal, A::Double(_) | A::Float(_)) => {
                Decimal::from_f64(self.to_double()).map(A::Decimal).ok_or_else(invalid)
            }
            (AtomicType::Double | AtomicType::Numeric, value)
                if value.is_numeric() || matches!(value, A::Boolean(_)) =>
            {
                Ok(A::Double(value.to_double()))
            }
            (AtomicType::Float, value) if value.is_numeric() || matches!(value, A::Boolean(_)) => {
                Ok(A::Float(value.to_double() as f32))
            }
            (AtomicType::Date, A::DateTime(dt)) => Ok(A::Date(DateValue {
                date: dt.value.date(),
                timezone: dt.timezone,
            })),
            (AtomicType::DateTime, A::Date(d)) => Ok(A::DateTime(DateTimeValue::from_date(d))),
            (AtomicType::Time, A::DateTime(dt)) => Ok(A::Time(TimeValue {
                time: dt.value.time(),
                timezone: dt.timezone,
            })),
            (AtomicType::Duration, A::DayTimeDuration(d) | A::YearMonthDuration(d)) => {
                Ok(A::Duration(*d))
            }
            (AtomicType::DayTimeDuration, A::Duration(d) | A::YearMonthDuration(d)) => {
                Ok(A::DayTimeDuration(DurationValue {
                    months: 0,
                    seconds: d.seconds,
                }))
            }
            (AtomicType::YearMonthDuration, A::Duration(d) | A::DayTimeDuration(d)) => {
                Ok(A::YearMonthDuration(DurationValue {
                    months: d.months,
                    seconds: Decimal::ZERO,
                }))
            }
            (_, value) => Self::parse_as(target, &value.to_string_value()),
        }
    }
}

impl PartialEq for AtomicValue {
    fn eq(&self, other: &Self) -> bool {
        use AtomicValue as A;
        match (self, other) {
            (a, b) if a.is_numeric() && b.is_numeric() => match (a.to_decimal(), b.to_decimal()) {
                (Some(x), Some(y)) => x == y,
                _ => {
                    let (x, y) = (a.to_double(), b.to_double());
                    x == y || (x.is_nan() && y.is_nan())
                }
            },
            (a, b) if a.is_string_like() && b.is_string_like() => {
                a.to_string_value() == b.to_string_value()
            }
            (A::Boolean(a), A::Boolean(b)) => a == b,
            (A::Date(a), A::Date(b)) => a == b,
            (A::DateTime(a), A::DateTime(b)) => a == b,
            (A::Time(a), A::Time(b)) => a == b,
            (
                A::Duration(a) | A::DayTimeDuration(a) | A::YearMonthDuration(a),
                A::Duration(b) | A::DayTimeDuration(b) | A::YearMonthDuration(b),
            ) => a == b,
            (A::QName(a), A::QName(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for AtomicValue {}

impl Hash for AtomicValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use AtomicValue as A;
        match self {
            v if v.is_numeric() => {
                0u8.hash(state);
                let d = v.to_double();
                let canonical = if d.is_nan() {
                    f64::NAN.to_bits()
                } else if d == 0.0 {
                    0u64
                } else {
                    d.to_bits()
                };
                canonical.hash(state);
            }
            v if v.is_string_like() => {
                1u8.hash(state);
                v.to_string_value().hash(state);
            }
            A::Boolean(b) => {
                2u8.hash(state);
                b.hash(state);
            }
            A::Date(d) => {
                3u8.hash(state);
                d.hash(state);
            }
            A::DateTime(d) => {
                4u8.hash(state);
                d.hash(state);
            }
            A::Time(t) => {
                5u8.hash(state);
                t.hash(state);
            }
            A::Duration(d) | A::DayTimeDuration(d) | A::YearMonthDuration(d) => {
                6u8.hash(state);
                d.hash(state);
            }
            A::QName(q) => {
                7u8.hash(state);
                q.hash(state);
            }
            _ => 8u8.hash(state),
        }
    }
}

impl PartialOrd for AtomicValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other)
    }
}

impl fmt::Display for AtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_value())
    }
}

impl From<String> for AtomicValue {
    fn from(s: String) -> Self {
        AtomicValue::String(s)
    }
}

impl From<&str> for AtomicValue {
    fn from(s: &str) -> Self {
        AtomicValue::String(s.to_string())
    }
}

impl From<bool> for AtomicValue {
    fn from(b: bool) -> Self {
        AtomicValue::Boolean(b)
    }
}

impl From<i64> for AtomicValue {
    fn from(i: i64) -> Self {
        AtomicValue::Integer(i)
    }
}

impl From<i32> for AtomicValue {
    fn from(i: i32) -> Self {
        AtomicValue::Integer(i64::from(i))
    }
}

impl From<f64> for AtomicValue {
    fn from(d: f64) -> Self {
        AtomicValue::Double(d)
    }
}
