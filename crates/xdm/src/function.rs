use crate::qname::QualifiedName;
use std::fmt;

/// A function value. The body is an opaque handle owned by the expression layer; only the
/// name and arity are visible to the data model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionItem {
    pub name: Option<QualifiedName>,
    pub arity: usize,
    pub body: usize,
}

impl FunctionItem {
    pub fn named(name: QualifiedName, arity: usize, body: usize) -> Self {
        Self {
            name: Some(name),
            arity,
            body,
        }
    }

    pub fn anonymous(arity: usize, body: usize) -> Self {
        Self {
            name: None,
            arity,
            body,
        }
    }
}

impl fmt::Display for FunctionItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}#{}", name, self.arity),
            None => write!(f, "(anonymous-function)#{}", self.arity),
        }
    }
}
