use crate::collation::CODEPOINT_COLLATION;
use serde::{Deserialize, Serialize};

/// Run-time settings for one engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of nested context frames before evaluation is abandoned.
    pub max_depth: usize,
    /// Treat an unresolved tie between matching rules as an error instead of a warning.
    pub strict: bool,
    /// Collation URI for grouping and sort keys that do not declare one.
    pub default_collation: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: 512,
            strict: false,
            default_collation: CODEPOINT_COLLATION.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "max_depth": 64 }"#).unwrap();
        assert_eq!(config.max_depth, 64);
        assert!(!config.strict);
        assert_eq!(config.default_collation, CODEPOINT_COLLATION);
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(EngineConfig::from_json_str(r#"{ "max_depth": "deep" }"#).is_err());
    }
}
