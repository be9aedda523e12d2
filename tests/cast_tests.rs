mod common;

use common::{child_at, init_logging, load, name, rule};
use quire::runtime::test_support::{FnEvaluator, RecordingExecutor};
use quire::runtime::{
    DeclarationSite, ParamDecl, SchemaTarget, TypeCache, TypeError, ValidationError,
};
use quire::{BodyRef, Engine, EngineError, Item, Params, RuleTable, SchemaValidator, Transformation};
use std::cell::RefCell;
use std::sync::Arc;

fn result_site() -> DeclarationSite {
    DeclarationSite::FunctionResult(name("f"))
}

#[test]
fn test_type_cache_parses_each_declaration_once() {
    let mut types = TypeCache::default();
    let first = types.parse("xs:integer+").unwrap();
    let again = types.parse(" xs:integer+ ").unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    types.parse("element(para)?").unwrap();
    assert_eq!(types.len(), 2);
    assert!(types.parse("xs:integer++").is_err());
    assert_eq!(types.len(), 2);
}

#[test]
fn test_cardinality_rejections() {
    init_logging();
    let forest = quire::Forest::new();
    let evaluator = FnEvaluator::new();
    let rules = RuleTable::default();
    let engine = Engine::new(&rules, &forest, &evaluator);
    let mut types = TypeCache::default();
    let two = Item::from_items(vec![Item::from(1), Item::from(2)]);

    for text in ["xs:integer", "item()", "xs:anyAtomicType"] {
        let err = engine
            .check_result(two.clone(), &types.parse(text).unwrap(), &result_site())
            .unwrap_err();
        assert!(
            matches!(err, EngineError::Type(TypeError::Cardinality { actual: 2, .. })),
            "{}",
            text
        );
    }
    for text in ["item()+", "xs:string+", "node()+"] {
        let err = engine
            .check_result(Item::empty(), &types.parse(text).unwrap(), &result_site())
            .unwrap_err();
        assert!(
            matches!(err, EngineError::Type(TypeError::Cardinality { actual: 0, .. })),
            "{}",
            text
        );
    }
    for value in [Item::from(1), Item::from("one"), Item::from(true)] {
        let cast = engine
            .check_result(value.clone(), &types.parse("item()*").unwrap(), &result_site())
            .unwrap();
        assert_eq!(cast, value);
    }
}

#[test]
fn test_cast_twice_equals_cast_once() {
    let (forest, doc) = load("<order id='A-7'><qty>12</qty><price>2.50</price></order>");
    let order = child_at(&forest, doc, &[0]);
    let qty = child_at(&forest, doc, &[0, 0]);
    let evaluator = FnEvaluator::new();
    let rules = RuleTable::default();
    let engine = Engine::new(&rules, &forest, &evaluator);
    let mut types = TypeCache::default();
    let id = Item::Node(forest.attribute(order, &name("id")).unwrap());

    for (value, text) in [
        (Item::Node(qty), "xs:integer"),
        (Item::Node(qty), "element(qty)"),
        (Item::Node(doc), "document-node(element(order))"),
        (id, "xs:string"),
        (Item::from("2.50"), "xs:string?"),
        (Item::from(3), "xs:double"),
        (Item::from_items(vec![Item::from(1), Item::from(2)]), "xs:decimal*"),
    ] {
        let spec = types.parse(text).unwrap();
        let once = engine.check_result(value, &spec, &result_site()).unwrap();
        let twice = engine.check_result(once.clone(), &spec, &result_site()).unwrap();
        assert_eq!(once, twice, "{}", text);
    }
}

#[test]
fn test_bound_variables_carry_the_cast_value() {
    let (forest, doc) = load("<order><qty>12</qty></order>");
    let qty = child_at(&forest, doc, &[0, 0]);
    let evaluator = FnEvaluator::new();
    let rules = RuleTable::default();
    let engine = Engine::new(&rules, &forest, &evaluator);
    let mut ctx = engine.new_context();
    let mut types = TypeCache::default();
    let total = name("total");

    engine
        .bind_variable(&mut ctx, total.clone(), Item::Node(qty), Some(types.parse("xs:double").unwrap().as_ref()))
        .unwrap();
    assert_eq!(ctx.variable(&total), Some(&Item::from(12.0)));

    engine
        .bind_variable(&mut ctx, total.clone(), Item::Node(qty), None)
        .unwrap();
    assert_eq!(ctx.variable(&total), Some(&Item::Node(qty)));

    let err = engine
        .bind_variable(&mut ctx, total.clone(), Item::Node(qty), Some(types.parse("attribute()").unwrap().as_ref()))
        .unwrap_err();
    match err {
        EngineError::Type(TypeError::Mismatch { site, .. }) => {
            assert_eq!(site, DeclarationSite::Variable(total))
        }
        other => panic!("unexpected error {other:?}"),
    }
}

struct AllowList {
    types: Vec<String>,
    requests: RefCell<Vec<(String, String)>>,
}

impl SchemaValidator for AllowList {
    fn validate(&self, markup: &str, target: &SchemaTarget) -> bool {
        self.requests
            .borrow_mut()
            .push((markup.to_string(), target.to_string()));
        matches!(target, SchemaTarget::Type(t) if self.types.contains(&t.local))
    }
}

#[test]
fn test_schema_typed_parameters_use_the_bound_validator() {
    let (forest, doc) = load("<order><qty>12</qty></order>");
    let order = child_at(&forest, doc, &[0]);
    let mut evaluator = FnEvaluator::new();
    let mut types = TypeCache::new(quire::xdm::Namespaces::new().bind("s", "urn:shop"));
    let item = name("item");
    let rules = RuleTable::builder()
        .rule(rule(&mut evaluator, "/", 0).with_param(ParamDecl::new(item.clone()).required().with_type(
            types.parse("element(order, s:OrderType)").unwrap(),
        )))
        .build()
        .unwrap();
    let params = Params::new().with(item.clone(), Item::Node(order));

    let unbound = Transformation::new(&rules).engine(&forest, &evaluator);
    let err = unbound
        .apply_templates(Item::Node(doc), None, &params, &[], &mut unbound.new_context(), &mut RecordingExecutor::new())
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::NoSchemaBound { .. })
    ));

    let validator = AllowList {
        types: vec!["OrderType".to_string()],
        requests: RefCell::new(Vec::new()),
    };
    let engine: Engine<'_> = Transformation::new(&rules)
        .with_validator(&validator)
        .engine(&forest, &evaluator);
    let mut exec = RecordingExecutor::new().watch(item.clone());
    engine
        .apply_templates(Item::Node(doc), None, &params, &[], &mut engine.new_context(), &mut exec)
        .unwrap();
    assert_eq!(exec.bodies(), vec![BodyRef(0)]);
    assert_eq!(exec.invocations()[0].variable(&item), Some(&Item::Node(order)));
    assert_eq!(
        validator.requests.borrow()[0].0,
        "<order><qty>12</qty></order>"
    );
}
