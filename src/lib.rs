//! # quire
//!
//! Run-time core of a template-rule tree transformation engine.
//!
//! - [`xdm`]: items, atomic values, qualified names and the arena-backed source tree
//! - [`runtime`]: rule dispatch, grouping, sorting and sequence-type casting
//!
//! [`Transformation`] wires a rule table, a configuration and an optional schema validator
//! into a single entry point that applies templates to an initial item.

pub use quire_runtime as runtime;
pub use quire_xdm as xdm;

pub use quire_runtime::{
    BodyExecutor, BodyRef, Engine, EngineConfig, EngineError, EvaluationContext, Evaluator,
    ExprHandle, ExpressionCompiler, Params, Pattern, RuleTable, SchemaValidator, TemplateRule,
};
pub use quire_xdm::{Forest, Item, NodeRef, QualifiedName};

/// A configured transformation over one rule table.
pub struct Transformation<'a> {
    rules: &'a RuleTable,
    config: EngineConfig,
    validator: Option<&'a dyn SchemaValidator>,
    initial_mode: Option<QualifiedName>,
}

impl<'a> Transformation<'a> {
    pub fn new(rules: &'a RuleTable) -> Self {
        Self {
            rules,
            config: EngineConfig::default(),
            validator: None,
            initial_mode: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Loads the configuration from JSON, keeping defaults for absent fields.
    pub fn with_config_json(mut self, json: &str) -> Result<Self, serde_json::Error> {
        self.config = EngineConfig::from_json_str(json)?;
        Ok(self)
    }

    pub fn with_validator(mut self, validator: &'a dyn SchemaValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_initial_mode(mut self, mode: QualifiedName) -> Self {
        self.initial_mode = Some(mode);
        self
    }

    /// Builds an engine over `forest` and `evaluator` with this configuration.
    pub fn engine(&self, forest: &'a Forest, evaluator: &'a dyn Evaluator) -> Engine<'a> {
        let engine = Engine::new(self.rules, forest, evaluator).with_config(self.config.clone());
        match self.validator {
            Some(validator) => engine.with_validator(validator),
            None => engine,
        }
    }

    /// Applies templates to `source` in the initial mode, with `source` as the initial
    /// focus.
    pub fn run(
        &self,
        forest: &'a Forest,
        evaluator: &'a dyn Evaluator,
        source: Item,
        exec: &mut dyn BodyExecutor,
    ) -> Result<(), EngineError> {
        let engine = self.engine(forest, evaluator);
        let mut ctx = engine
            .new_context()
            .with_context_item(source.clone())
            .with_initial_mode(self.initial_mode.clone());
        log::debug!(
            "Starting transformation of {} item(s) in {}",
            source.len(),
            self.initial_mode
                .as_ref()
                .map_or_else(|| "the unnamed mode".to_string(), |m| format!("mode {}", m))
        );
        let result = engine.dispatch(source, self.initial_mode.as_ref(), &mut ctx, exec);
        if let Err(e) = &result {
            log::error!("Transformation failed: {}", e);
        }
        result
    }
}
