use crate::seqtype::Occurrence;
use quire_xdm::{QualifiedName, XdmError};
use std::fmt;
use thiserror::Error;

/// Identifies the declaration that owns a declared type, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclarationSite {
    /// A template or function parameter, by 1-based position.
    Parameter { index: usize, name: QualifiedName },
    Variable(QualifiedName),
    FunctionResult(QualifiedName),
    /// The `as` type of a template rule, named by its pattern or template name.
    TemplateResult(String),
    EvaluateResult,
    GroupingKey,
    SortKey(usize),
}

impl fmt::Display for DeclarationSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclarationSite::Parameter { index, name } => {
                write!(f, "parameter {} (${})", index, name)
            }
            DeclarationSite::Variable(name) => write!(f, "variable ${}", name),
            DeclarationSite::FunctionResult(name) => write!(f, "result of function {}", name),
            DeclarationSite::TemplateResult(rule) => write!(f, "result of template {}", rule),
            DeclarationSite::EvaluateResult => write!(f, "result of dynamic evaluation"),
            DeclarationSite::GroupingKey => write!(f, "grouping key"),
            DeclarationSite::SortKey(index) => write!(f, "sort key {}", index),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeclarationError {
    #[error("Grouping requires exactly one strategy, found {}", strategy_list(.0))]
    GroupingStrategy(Vec<String>),

    #[error("Duplicate parameter ${name} on {owner}")]
    DuplicateParameter { owner: String, name: QualifiedName },

    #[error("Duplicate named template {0} at the same import precedence")]
    DuplicateNamedTemplate(QualifiedName),

    #[error("No template named {0}")]
    UnknownTemplate(QualifiedName),

    #[error("Invalid priority on {rule}: {value}")]
    InvalidPriority { rule: String, value: f64 },

    #[error("Rule declares neither a match pattern nor a name")]
    EmptyRule,

    #[error("Unknown collation '{0}'")]
    UnknownCollation(String),

    #[error("Invalid pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    #[error("Invalid sequence type '{text}': {message}")]
    SequenceType { text: String, message: String },

    #[error("current-group() is not available here")]
    NoCurrentGroup,
}

impl DeclarationError {
    pub fn pattern(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Pattern {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    pub fn sequence_type(text: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SequenceType {
            text: text.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("No matching rule for {item} in {}", mode_label(.mode))]
    NoMatchingRule {
        item: String,
        mode: Option<QualifiedName>,
    },

    #[error("Ambiguous rule match for {item}: {first} and {second}")]
    Ambiguous {
        item: String,
        first: String,
        second: String,
    },

    #[error("Required parameter ${name} was not supplied to {rule}")]
    MissingParameter { rule: String, name: QualifiedName },

    #[error("No current template rule")]
    NoCurrentRule,
}

fn strategy_list(found: &[String]) -> String {
    if found.is_empty() {
        "none".to_string()
    } else {
        found.join(", ")
    }
}

fn mode_label(mode: &Option<QualifiedName>) -> String {
    match mode {
        Some(m) => format!("mode {}", m),
        None => "the unnamed mode".to_string(),
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypeError {
    #[error("Cardinality mismatch for {site}: expected {expected}, got {actual} item(s)")]
    Cardinality {
        site: DeclarationSite,
        expected: Occurrence,
        actual: usize,
    },

    #[error("Type mismatch for {site}: expected {expected}, got {actual}")]
    Mismatch {
        site: DeclarationSite,
        expected: String,
        actual: String,
    },

    #[error("Cannot convert {from} to {to} for {site}")]
    Cast {
        site: DeclarationSite,
        from: String,
        to: String,
    },
}

impl TypeError {
    pub fn site(&self) -> &DeclarationSite {
        match self {
            TypeError::Cardinality { site, .. }
            | TypeError::Mismatch { site, .. }
            | TypeError::Cast { site, .. } => site,
        }
    }

    pub fn mismatch(
        site: &DeclarationSite,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::Mismatch {
            site: site.clone(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Validation requested for {site} but no schema is bound")]
    NoSchemaBound { site: DeclarationSite },

    #[error("Value for {site} is not valid against {target}")]
    Invalid {
        site: DeclarationSite,
        target: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceGuardError {
    #[error("Evaluation nested too deep: limit of {limit} frames exceeded")]
    TooDeep { limit: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Declaration error: {0}")]
    Declaration(#[from] DeclarationError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Type error: {0}")]
    Type(#[from] TypeError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Resource guard: {0}")]
    ResourceGuard(#[from] ResourceGuardError),

    #[error("Data model error: {0}")]
    Data(#[from] XdmError),

    #[error("Evaluation error: {message}")]
    Evaluation { message: String },
}

impl EngineError {
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_site() {
        let err = EngineError::from(TypeError::Cardinality {
            site: DeclarationSite::Parameter {
                index: 2,
                name: QualifiedName::local("count"),
            },
            expected: Occurrence::ExactlyOne,
            actual: 0,
        });
        let text = err.to_string();
        assert!(text.contains("parameter 2 ($count)"), "{}", text);
        assert!(text.contains("exactly one"), "{}", text);
    }

    #[test]
    fn test_grouping_strategy_message() {
        let none = DeclarationError::GroupingStrategy(Vec::new());
        assert!(none.to_string().ends_with("none"));
        let two = DeclarationError::GroupingStrategy(vec!["group-by".into(), "group-adjacent".into()]);
        assert!(two.to_string().contains("group-by, group-adjacent"));
    }
}
