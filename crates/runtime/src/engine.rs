//! The engine handle: borrows the rule table, the node forest and the collaborators, and
//! carries the run-time configuration. Dispatch, sorting and grouping are implemented on
//! it in their own modules.

use crate::cast::CastService;
use crate::config::EngineConfig;
use crate::context::EvaluationContext;
use crate::error::{DeclarationError, DeclarationSite, EngineError};
use crate::grouping::{Grouping, GroupingDeclaration};
use crate::rules::{RuleTable, TemplateRule};
use crate::seqtype::SequenceTypeSpec;
use crate::traits::{Evaluator, ExprHandle, SchemaValidator};
use quire_xdm::{Forest, Item, NodeKind, QualifiedName};

pub struct Engine<'a> {
    rules: &'a RuleTable,
    forest: &'a Forest,
    evaluator: &'a dyn Evaluator,
    validator: Option<&'a dyn SchemaValidator>,
    config: EngineConfig,
}

impl<'a> Engine<'a> {
    pub fn new(rules: &'a RuleTable, forest: &'a Forest, evaluator: &'a dyn Evaluator) -> Self {
        Self {
            rules,
            forest,
            evaluator,
            validator: None,
            config: EngineConfig::default(),
        }
    }

    pub fn with_validator(mut self, validator: &'a dyn SchemaValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        log::debug!(
            "Engine configured: max_depth={}, strict={}, collation={}",
            config.max_depth,
            config.strict,
            config.default_collation
        );
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rules(&self) -> &'a RuleTable {
        self.rules
    }

    pub fn forest(&self) -> &'a Forest {
        self.forest
    }

    pub fn evaluator(&self) -> &'a dyn Evaluator {
        self.evaluator
    }

    /// A fresh context with this engine's depth limit and no focus.
    pub fn new_context(&self) -> EvaluationContext {
        EvaluationContext::new(self.config.max_depth)
    }

    pub fn cast_service(&self) -> CastService<'a> {
        CastService::new(self.forest, self.validator)
    }

    pub fn evaluate(&self, expr: ExprHandle, ctx: &EvaluationContext) -> Result<Item, EngineError> {
        self.evaluator.evaluate(expr, ctx, self.forest)
    }

    /// Resolves a grouping declaration against the configured default collation.
    pub fn grouping(&self, declaration: GroupingDeclaration) -> Result<Grouping, DeclarationError> {
        declaration.into_grouping(&self.config.default_collation)
    }

    pub fn validate_and_cast(
        &self,
        value: Item,
        spec: &SequenceTypeSpec,
        site: &DeclarationSite,
    ) -> Result<Item, EngineError> {
        self.cast_service().validate_and_cast(value, spec, site)
    }

    /// Binds `name` in the innermost frame, after checking `value` against the declared
    /// type when there is one.
    pub fn bind_variable(
        &self,
        ctx: &mut EvaluationContext,
        name: QualifiedName,
        value: Item,
        as_type: Option<&SequenceTypeSpec>,
    ) -> Result<(), EngineError> {
        let value = match as_type {
            Some(spec) => {
                self.validate_and_cast(value, spec, &DeclarationSite::Variable(name.clone()))?
            }
            None => value,
        };
        ctx.set_variable(name, value);
        Ok(())
    }

    /// Checks a function, template or evaluation result against its declared type.
    pub fn check_result(
        &self,
        value: Item,
        spec: &SequenceTypeSpec,
        site: &DeclarationSite,
    ) -> Result<Item, EngineError> {
        self.validate_and_cast(value, spec, site)
    }

    /// Checks the value a rule body produced against the rule's `as` type, if it has one.
    pub fn check_rule_result(&self, rule_id: usize, value: Item) -> Result<Item, EngineError> {
        let rule = self.rule(rule_id)?;
        match &rule.as_type {
            Some(spec) => {
                self.check_result(value, spec, &DeclarationSite::TemplateResult(rule.describe()))
            }
            None => Ok(value),
        }
    }

    pub(crate) fn rule(&self, rule_id: usize) -> Result<&'a TemplateRule, EngineError> {
        self.rules
            .rule(rule_id)
            .ok_or_else(|| EngineError::evaluation(format!("Unknown rule id {}", rule_id)))
    }

    /// Short description of an item for diagnostics, e.g. `element(para)`.
    pub(crate) fn describe_item(&self, item: &Item) -> String {
        match item {
            Item::Fragment(_) => "document-node()".to_string(),
            Item::Node(node) if self.forest.contains(*node) => {
                let kind = self.forest.kind(*node);
                match (kind, self.forest.name(*node)) {
                    (NodeKind::Element | NodeKind::Attribute, Some(name)) => {
                        format!("{}({})", kind.test_name().trim_end_matches("()"), name)
                    }
                    _ => kind.test_name().to_string(),
                }
            }
            other => other.kind_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TypeError;
    use crate::seqtype::parse_sequence_type;
    use crate::test_support::FnEvaluator;
    use crate::traits::BodyRef;
    use quire_xdm::{AtomicValue, Namespaces};

    #[test]
    fn test_bind_variable_casts_to_declared_type() {
        let forest = Forest::new();
        let evaluator = FnEvaluator::new();
        let rules = RuleTable::default();
        let engine = Engine::new(&rules, &forest, &evaluator);
        let mut ctx = engine.new_context();
        let spec = parse_sequence_type("xs:integer", &Namespaces::new()).unwrap();
        let x = QualifiedName::local("x");
        engine
            .bind_variable(&mut ctx, x.clone(), Item::from("42"), Some(&spec))
            .unwrap();
        assert_eq!(ctx.variable(&x), Some(&Item::Atomic(AtomicValue::Integer(42))));

        let err = engine
            .bind_variable(&mut ctx, x.clone(), Item::from("forty"), Some(&spec))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Type(TypeError::Cast { site: DeclarationSite::Variable(_), .. })
        ));
    }

    #[test]
    fn test_check_rule_result_uses_template_site() {
        let forest = Forest::new();
        let evaluator = FnEvaluator::new();
        let spec = parse_sequence_type("xs:string", &Namespaces::new()).unwrap();
        let rules = RuleTable::builder()
            .rule(TemplateRule::named(QualifiedName::local("t"), BodyRef(0)).with_result_type(spec.into()))
            .build()
            .unwrap();
        let engine = Engine::new(&rules, &forest, &evaluator);
        let err = engine
            .check_rule_result(0, Item::from_items(vec!["a".into(), "b".into()]))
            .unwrap_err();
        match err {
            EngineError::Type(e) => {
                assert_eq!(e.site(), &DeclarationSite::TemplateResult("template named t".into()))
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(engine.check_rule_result(0, "a".into()).unwrap(), Item::from("a"));
    }

    #[test]
    fn test_describe_item() {
        let mut forest = Forest::new();
        let doc = forest.load_xml("<para n='1'>x</para>").unwrap();
        let para = forest.children(doc).next().unwrap();
        let evaluator = FnEvaluator::new();
        let rules = RuleTable::default();
        let engine = Engine::new(&rules, &forest, &evaluator);
        assert_eq!(engine.describe_item(&Item::Node(para)), "element(para)");
        assert_eq!(engine.describe_item(&Item::Node(doc)), "document-node()");
    }
}
