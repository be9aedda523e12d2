//! Qualified names and prefix resolution.

use crate::error::XdmError;
use indexmap::IndexMap;
use std::fmt;
use std::hash::{Hash, Hasher};

pub const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
pub const FN_NAMESPACE: &str = "http://www.w3.org/2005/xpath-functions";
pub const MAP_NAMESPACE: &str = "http://www.w3.org/2005/xpath-functions/map";
pub const ARRAY_NAMESPACE: &str = "http://www.w3.org/2005/xpath-functions/array";
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// An expanded name with the prefix it was written with.
///
/// Equality and hashing only consider the namespace URI and the local part; the
/// prefix is kept for display.
#[derive(Debug, Clone, Eq)]
pub struct QualifiedName {
    pub namespace: Option<String>,
    pub local: String,
    pub prefix: Option<String>,
}

impl QualifiedName {
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local: local.into(),
            prefix: None,
        }
    }

    pub fn new(namespace: Option<&str>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.filter(|ns| !ns.is_empty()).map(String::from),
            local: local.into(),
            prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn xs(local: impl Into<String>) -> Self {
        Self::new(Some(XS_NAMESPACE), local).with_prefix("xs")
    }

    pub fn is_in(&self, namespace: &str) -> bool {
        self.namespace.as_deref() == Some(namespace)
    }

    /// Clark notation, `{uri}local`, or the bare local name when there is no namespace.
    pub fn clark(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{{{}}}{}", ns, self.local),
            None => self.local.clone(),
        }
    }
}

impl PartialEq for QualifiedName {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.local == other.local
    }
}

impl PartialOrd for QualifiedName {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QualifiedName {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.namespace, &self.local).cmp(&(&other.namespace, &other.local))
    }
}

impl Hash for QualifiedName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.local.hash(state);
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.prefix, &self.namespace) {
            (Some(p), _) => write!(f, "{}:{}", p, self.local),
            (None, Some(ns)) => write!(f, "Q{{{}}}{}", ns, self.local),
            (None, None) => write!(f, "{}", self.local),
        }
    }
}

pub fn is_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{B7}'))
}

/// In-scope namespace bindings used to resolve lexical QNames written in patterns and
/// sequence types.
#[derive(Debug, Clone)]
pub struct Namespaces {
    bindings: IndexMap<String, String>,
    default_element_namespace: Option<String>,
}

impl Default for Namespaces {
    fn default() -> Self {
        let mut bindings = IndexMap::new();
        bindings.insert("xs".to_string(), XS_NAMESPACE.to_string());
        bindings.insert("fn".to_string(), FN_NAMESPACE.to_string());
        bindings.insert("map".to_string(), MAP_NAMESPACE.to_string());
        bindings.insert("array".to_string(), ARRAY_NAMESPACE.to_string());
        bindings.insert("xml".to_string(), XML_NAMESPACE.to_string());
        Self {
            bindings,
            default_element_namespace: None,
        }
    }
}

impl Namespaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.bindings.insert(prefix.into(), uri.into());
        self
    }

    pub fn with_default_element_namespace(mut self, uri: impl Into<String>) -> Self {
        self.default_element_namespace = Some(uri.into());
        self
    }

    pub fn lookup(&self, prefix: &str) -> Option<&str> {
        self.bindings.get(prefix).map(String::as_str)
    }

    pub fn default_element_namespace(&self) -> Option<&str> {
        self.default_element_namespace.as_deref()
    }

    /// Resolves `prefix:local`, `local` or `Q{uri}local`.
    ///
    /// Unprefixed names take the default element namespace only when
    /// `use_default` is set (element and type names do, attribute names do not).
    pub fn resolve(&self, lexical: &str, use_default: bool) -> Result<QualifiedName, XdmError> {
        let lexical = lexical.trim();
        if let Some(rest) = lexical.strip_prefix("Q{") {
            let (uri, local) = rest
                .split_once('}')
                .ok_or_else(|| XdmError::InvalidName(lexical.to_string()))?;
            if !is_ncname(local) {
                return Err(XdmError::InvalidName(lexical.to_string()));
            }
            return Ok(QualifiedName::new(Some(uri), local));
        }
        match lexical.split_once(':') {
            Some((prefix, local)) => {
                if !is_ncname(prefix) || !is_ncname(local) {
                    return Err(XdmError::InvalidName(lexical.to_string()));
                }
                let uri = self
                    .lookup(prefix)
                    .ok_or_else(|| XdmError::UnboundPrefix(prefix.to_string()))?;
                Ok(QualifiedName::new(Some(uri), local).with_prefix(prefix))
            }
            None => {
                if !is_ncname(lexical) {
                    return Err(XdmError::InvalidName(lexical.to_string()));
                }
                let ns = if use_default {
                    self.default_element_namespace.as_deref()
                } else {
                    None
                };
                Ok(QualifiedName::new(ns, lexical))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_is_ignored_by_equality() {
        let a = QualifiedName::new(Some("urn:a"), "x").with_prefix("p");
        let b = QualifiedName::new(Some("urn:a"), "x").with_prefix("q");
        assert_eq!(a, b);
        assert_ne!(a, QualifiedName::local("x"));
    }

    #[test]
    fn test_resolve_forms() {
        let ns = Namespaces::new().bind("p", "urn:p");
        assert_eq!(ns.resolve("p:item", true).unwrap(), QualifiedName::new(Some("urn:p"), "item"));
        assert_eq!(ns.resolve("Q{urn:q}item", true).unwrap(), QualifiedName::new(Some("urn:q"), "item"));
        assert_eq!(ns.resolve("item", true).unwrap(), QualifiedName::local("item"));
        assert!(matches!(ns.resolve("zz:item", true), Err(XdmError::UnboundPrefix(_))));
        assert!(ns.resolve("1abc", true).is_err());
    }

    #[test]
    fn test_default_element_namespace_only_when_requested() {
        let ns = Namespaces::new().with_default_element_namespace("urn:d");
        assert!(ns.resolve("a", true).unwrap().is_in("urn:d"));
        assert_eq!(ns.resolve("a", false).unwrap().namespace, None);
    }
}
