use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum XdmError {
    #[error("Invalid lexical form for {target}: '{value}'")]
    InvalidLexical { target: String, value: String },

    #[error("Cannot cast {from} to {to}")]
    InvalidCast { from: String, to: String },

    #[error("Effective boolean value is not defined for {0}")]
    NoEffectiveBooleanValue(String),

    #[error("Unknown node handle {0}")]
    UnknownNode(String),

    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Invalid qualified name: '{0}'")]
    InvalidName(String),

    #[error("Unbound namespace prefix '{0}'")]
    UnboundPrefix(String),
}

impl XdmError {
    pub fn lexical(target: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidLexical {
            target: target.into(),
            value: value.into(),
        }
    }

    pub fn invalid_cast(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::InvalidCast {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn serialize(msg: impl Into<String>) -> Self {
        Self::Serialize(msg.into())
    }
}

impl From<roxmltree::Error> for XdmError {
    fn from(err: roxmltree::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}
