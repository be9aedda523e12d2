use crate::qname::{QualifiedName, XS_NAMESPACE};
use std::fmt;

/// The built-in atomic types known to the engine, arranged as a subtype lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicType {
    AnyAtomic,
    UntypedAtomic,
    String,
    AnyUri,
    Boolean,
    Numeric,
    Decimal,
    Integer,
    Double,
    Float,
    Date,
    DateTime,
    Time,
    Duration,
    DayTimeDuration,
    YearMonthDuration,
    QName,
}

impl AtomicType {
    pub const ALL: [AtomicType; 17] = [
        AtomicType::AnyAtomic,
        AtomicType::UntypedAtomic,
        AtomicType::String,
        AtomicType::AnyUri,
        AtomicType::Boolean,
        AtomicType::Numeric,
        AtomicType::Decimal,
        AtomicType::Integer,
        AtomicType::Double,
        AtomicType::Float,
        AtomicType::Date,
        AtomicType::DateTime,
        AtomicType::Time,
        AtomicType::Duration,
        AtomicType::DayTimeDuration,
        AtomicType::YearMonthDuration,
        AtomicType::QName,
    ];

    pub fn local_name(self) -> &'static str {
        match self {
            AtomicType::AnyAtomic => "anyAtomicType",
            AtomicType::UntypedAtomic => "untypedAtomic",
            AtomicType::String => "string",
            AtomicType::AnyUri => "anyURI",
            AtomicType::Boolean => "boolean",
            AtomicType::Numeric => "numeric",
            AtomicType::Decimal => "decimal",
            AtomicType::Integer => "integer",
            AtomicType::Double => "double",
            AtomicType::Float => "float",
            AtomicType::Date => "date",
            AtomicType::DateTime => "dateTime",
            AtomicType::Time => "time",
            AtomicType::Duration => "duration",
            AtomicType::DayTimeDuration => "dayTimeDuration",
            AtomicType::YearMonthDuration => "yearMonthDuration",
            AtomicType::QName => "QName",
        }
    }

    pub fn from_local_name(local: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.local_name() == local)
    }

    /// Looks up a type by expanded name; only names in the XML Schema namespace are known.
    pub fn from_name(name: &QualifiedName) -> Option<Self> {
        if name.is_in(XS_NAMESPACE) {
            Self::from_local_name(&name.local)
        } else {
            None
        }
    }

    pub fn name(self) -> QualifiedName {
        QualifiedName::xs(self.local_name())
    }

    /// The immediate supertype. `xs:numeric` is a union; its members report it as parent.
    pub fn parent(self) -> Option<Self> {
        match self {
            AtomicType::AnyAtomic => None,
            AtomicType::Integer => Some(AtomicType::Decimal),
            AtomicType::Decimal | AtomicType::Double | AtomicType::Float => {
                Some(AtomicType::Numeric)
            }
            AtomicType::DayTimeDuration | AtomicType::YearMonthDuration => {
                Some(AtomicType::Duration)
            }
            _ => Some(AtomicType::AnyAtomic),
        }
    }

    pub fn is_subtype_of(self, other: AtomicType) -> bool {
        let mut current = Some(self);
        while let Some(t) = current {
            if t == other {
                return true;
            }
            current = t.parent();
        }
        false
    }

    pub fn is_numeric(self) -> bool {
        self.is_subtype_of(AtomicType::Numeric)
    }
}

impl fmt::Display for AtomicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xs:{}", self.local_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtype_lattice() {
        assert!(AtomicType::Integer.is_subtype_of(AtomicType::Decimal));
        assert!(AtomicType::Integer.is_subtype_of(AtomicType::Numeric));
        assert!(AtomicType::Integer.is_subtype_of(AtomicType::AnyAtomic));
        assert!(AtomicType::DayTimeDuration.is_subtype_of(AtomicType::Duration));
        assert!(!AtomicType::Double.is_subtype_of(AtomicType::Decimal));
        assert!(!AtomicType::String.is_subtype_of(AtomicType::AnyUri));
    }

    #[test]
    fn test_lookup_requires_schema_namespace() {
        assert_eq!(
            AtomicType::from_name(&QualifiedName::xs("dateTime")),
            Some(AtomicType::DateTime)
        );
        assert_eq!(AtomicType::from_name(&QualifiedName::local("dateTime")), None);
        assert_eq!(AtomicType::Integer.to_string(), "xs:integer");
    }
}
