//! Validation of values against declared sequence types, converting atomic values where
//! the declared type requires it.

use crate::error::{DeclarationSite, EngineError, TypeError, ValidationError};
use crate::seqtype::{FunctionTest, ItemTest, NodeKindTest, SequenceTypeSpec};
use crate::traits::{SchemaTarget, SchemaValidator};
use quire_xdm::{AtomicType, AtomicValue, Forest, Item, NodeKind, NodeRef};

/// Everything a cast needs besides the value: the trees nodes live in and the optional
/// schema validator.
#[derive(Clone, Copy)]
pub struct CastService<'a> {
    forest: &'a Forest,
    validator: Option<&'a dyn SchemaValidator>,
}

impl<'a> CastService<'a> {
    pub fn new(forest: &'a Forest, validator: Option<&'a dyn SchemaValidator>) -> Self {
        Self { forest, validator }
    }

    /// Checks `value` against `spec`, returning it with atomic items converted to the
    /// declared type. The cardinality is checked before any item is looked at.
    pub fn validate_and_cast(
        &self,
        value: Item,
        spec: &SequenceTypeSpec,
        site: &DeclarationSite,
    ) -> Result<Item, EngineError> {
        let items = value.flatten();
        if !spec.allows_count(items.len()) {
            return Err(TypeError::Cardinality {
                site: site.clone(),
                expected: spec.occurrence,
                actual: items.len(),
            }
            .into());
        }
        if items.is_empty() {
            return Ok(Item::empty());
        }
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(self.cast_item(item, &spec.item_test, site)?);
        }
        Ok(Item::from_items(out))
    }

    fn cast_item(
        &self,
        item: Item,
        test: &ItemTest,
        site: &DeclarationSite,
    ) -> Result<Item, EngineError> {
        let mismatch = |item: &Item| -> EngineError {
            TypeError::mismatch(site, test.to_string(), item.kind_name()).into()
        };
        match (test, &item) {
            (ItemTest::Item, _) => Ok(item),
            (ItemTest::EmptySequence, _) => Err(mismatch(&item)),

            (ItemTest::Atomic(target), Item::Atomic(value)) => {
                self.cast_atomic(value, *target, site).map(Item::Atomic)
            }
            (ItemTest::Atomic(target), Item::Node(node) | Item::Fragment(node)) => {
                let typed = self.typed_value(*node);
                self.cast_atomic(&typed, *target, site).map(Item::Atomic)
            }
            (ItemTest::Atomic(_), _) => Err(mismatch(&item)),

            (ItemTest::Node(node_test), Item::Node(node) | Item::Fragment(node)) => {
                if !self.node_matches(*node, node_test) {
                    return Err(mismatch(&item));
                }
                self.check_schema(*node, node_test, site)?;
                Ok(item)
            }
            (ItemTest::Node(_), _) => Err(mismatch(&item)),

            (ItemTest::Function(function_test), _) => {
                let arity = match &item {
                    Item::Function(f) => f.arity,
                    Item::Map(_) | Item::Array(_) => 1,
                    _ => return Err(mismatch(&item)),
                };
                match function_test {
                    FunctionTest::AnyFunction => Ok(item),
                    FunctionTest::Typed { params, .. } if params.len() == arity => Ok(item),
                    FunctionTest::Typed { .. } => Err(mismatch(&item)),
                }
            }

            (ItemTest::Map { .. }, Item::Map(_)) => Ok(item),
            (ItemTest::Map { .. }, _) => Err(mismatch(&item)),
            (ItemTest::Array { .. }, Item::Array(_)) => Ok(item),
            (ItemTest::Array { .. }, _) => Err(mismatch(&item)),
        }
    }

    fn cast_atomic(
        &self,
        value: &AtomicValue,
        target: AtomicType,
        site: &DeclarationSite,
    ) -> Result<AtomicValue, EngineError> {
        if value.is_instance_of(target) {
            return Ok(value.clone());
        }
        value.cast_to(target).map_err(|_| {
            TypeError::Cast {
                site: site.clone(),
                from: format!("{} '{}'", value.type_name(), value.to_string_value()),
                to: target.to_string(),
            }
            .into()
        })
    }

    /// The atomized value of a node: its string value, typed by its annotation when that
    /// names a built-in atomic type.
    fn typed_value(&self, node: NodeRef) -> AtomicValue {
        let text = self.forest.string_value(node);
        self.forest
            .type_annotation(node)
            .and_then(AtomicType::from_name)
            .and_then(|t| AtomicValue::parse_as(t, &text).ok())
            .unwrap_or(AtomicValue::UntypedAtomic(text))
    }

    fn node_matches(&self, node: NodeRef, test: &NodeKindTest) -> bool {
        let Some(kind) = test.kind else {
            return true;
        };
        if self.forest.kind(node) != kind {
            return false;
        }
        if let Some(name) = &test.name {
            if self.forest.name(node) != Some(name) {
                return false;
            }
        }
        match &test.content {
            Some(content) => {
                let mut elements = self
                    .forest
                    .children(node)
                    .filter(|&c| self.forest.kind(c) == NodeKind::Element);
                match (elements.next(), elements.next()) {
                    (Some(root), None) => self.node_matches(root, content),
                    _ => false,
                }
            }
            None => true,
        }
    }

    fn check_schema(
        &self,
        node: NodeRef,
        test: &NodeKindTest,
        site: &DeclarationSite,
    ) -> Result<(), EngineError> {
        if let Some(content) = &test.content {
            if let Some(root) = self
                .forest
                .children(node)
                .find(|&c| self.forest.kind(c) == NodeKind::Element)
            {
                return self.check_schema(root, content, site);
            }
        }
        let target = match (&test.schema_type, test.declaration, &test.name) {
            (Some(ty), _, _) => SchemaTarget::Type(ty.clone()),
            (None, true, Some(name)) if test.kind == Some(NodeKind::Attribute) => {
                SchemaTarget::Attribute(name.clone())
            }
            (None, true, Some(name)) => SchemaTarget::Element(name.clone()),
            _ => return Ok(()),
        };
        if let Some(annotation) = self.forest.type_annotation(node) {
            return match &target {
                SchemaTarget::Type(expected) if annotation != expected => Err(TypeError::mismatch(
                    site,
                    test.to_string(),
                    format!("node annotated {}", annotation),
                )
                .into()),
                _ => Ok(()),
            };
        }
        let validator = self.validator.ok_or_else(|| ValidationError::NoSchemaBound {
            site: site.clone(),
        })?;
        let markup = self.forest.serialize(node)?;
        log::debug!("Validating unannotated node {} against {}", node, target);
        if validator.validate(&markup, &target) {
            Ok(())
        } else {
            Err(ValidationError::Invalid {
                site: site.clone(),
                target: target.to_string(),
            }
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seqtype::parse_sequence_type;
    use quire_xdm::{FunctionItem, Namespaces, QualifiedName, XdmArray, XdmMap};
    use std::cell::RefCell;

    fn spec(text: &str) -> SequenceTypeSpec {
        parse_sequence_type(text, &Namespaces::new()).unwrap()
    }

    fn site() -> DeclarationSite {
        DeclarationSite::Variable(QualifiedName::local("v"))
    }

    fn sample() -> (Forest, NodeRef) {
        let mut forest = Forest::new();
        let root = forest.load_xml("<order><qty>12</qty></order>").unwrap();
        (forest, root)
    }

    #[test]
    fn test_cardinality_checked_first() {
        let forest = Forest::new();
        let service = CastService::new(&forest, None);
        let two = Item::Sequence(vec![Item::from(1), Item::from(2)]);
        let err = service.validate_and_cast(two, &spec("xs:string"), &site()).unwrap_err();
        assert!(matches!(err, EngineError::Type(TypeError::Cardinality { actual: 2, .. })));
        let err = service
            .validate_and_cast(Item::empty(), &spec("item()+"), &site())
            .unwrap_err();
        assert!(matches!(err, EngineError::Type(TypeError::Cardinality { actual: 0, .. })));
        assert_eq!(
            service.validate_and_cast(Item::from(1), &spec("xs:integer*"), &site()).unwrap(),
            Item::from(1)
        );
    }

    #[test]
    fn test_atomic_conversion() {
        let forest = Forest::new();
        let service = CastService::new(&forest, None);
        let cast = service
            .validate_and_cast(Item::from("2024-05-01"), &spec("xs:date"), &site())
            .unwrap();
        assert_eq!(cast.as_atomic().unwrap().atomic_type(), AtomicType::Date);
        let err = service
            .validate_and_cast(Item::from("soon"), &spec("xs:date"), &site())
            .unwrap_err();
        let EngineError::Type(TypeError::Cast { from, to, .. }) = err else {
            panic!("expected a cast error");
        };
        assert!(from.contains("xs:string"));
        assert_eq!(to, "xs:date");
    }

    #[test]
    fn test_nodes_atomize_for_atomic_tests() {
        let (forest, root) = sample();
        let service = CastService::new(&forest, None);
        let order = forest.children(root).next().unwrap();
        let value = service
            .validate_and_cast(Item::Node(order), &spec("xs:integer"), &site())
            .unwrap();
        assert_eq!(value, Item::from(12));
    }

    #[test]
    fn test_node_kind_and_name() {
        let (forest, root) = sample();
        let service = CastService::new(&forest, None);
        let order = Item::Node(forest.children(root).next().unwrap());
        assert!(service.validate_and_cast(order.clone(), &spec("element(order)"), &site()).is_ok());
        assert!(service.validate_and_cast(order.clone(), &spec("element(qty)"), &site()).is_err());
        assert!(service.validate_and_cast(order, &spec("attribute()"), &site()).is_err());
        assert!(service
            .validate_and_cast(Item::Node(root), &spec("document-node(element(order))"), &site())
            .is_ok());
        assert!(service.validate_and_cast(Item::from(1), &spec("node()"), &site()).is_err());
    }

    #[test]
    fn test_function_map_array_tests() {
        let forest = Forest::new();
        let service = CastService::new(&forest, None);
        let f = Item::Function(FunctionItem::anonymous(2, 0));
        assert!(service.validate_and_cast(f.clone(), &spec("function(*)"), &site()).is_ok());
        assert!(service
            .validate_and_cast(f.clone(), &spec("function(item(), item()) as item()"), &site())
            .is_ok());
        assert!(service
            .validate_and_cast(f, &spec("function(item()) as item()"), &site())
            .is_err());
        let map = Item::Map(XdmMap::new());
        assert!(service.validate_and_cast(map.clone(), &spec("map(*)"), &site()).is_ok());
        assert!(service
            .validate_and_cast(map.clone(), &spec("function(xs:anyAtomicType) as item()*"), &site())
            .is_ok());
        assert!(service.validate_and_cast(map.clone(), &spec("array(*)"), &site()).is_err());
        assert!(service.validate_and_cast(map, &spec("xs:string"), &site()).is_err());
        let array = Item::Array(XdmArray::new(vec![Item::from(1)]));
        assert!(service.validate_and_cast(array, &spec("array(xs:string)"), &site()).is_ok());
    }

    struct ScriptedValidator {
        accept: bool,
        seen: RefCell<Vec<String>>,
    }

    impl SchemaValidator for ScriptedValidator {
        fn validate(&self, markup: &str, _target: &SchemaTarget) -> bool {
            self.seen.borrow_mut().push(markup.to_string());
            self.accept
        }
    }

    #[test]
    fn test_schema_type_uses_annotation_then_validator() {
        let (mut forest, root) = sample();
        let order = forest.children(root).next().unwrap();
        let typed = spec("element(order, xs:string)");

        let unbound = CastService::new(&forest, None)
            .validate_and_cast(Item::Node(order), &typed, &site())
            .unwrap_err();
        assert!(matches!(unbound, EngineError::Validation(ValidationError::NoSchemaBound { .. })));

        let validator = ScriptedValidator {
            accept: true,
            seen: RefCell::new(Vec::new()),
        };
        assert!(CastService::new(&forest, Some(&validator))
            .validate_and_cast(Item::Node(order), &typed, &site())
            .is_ok());
        assert_eq!(validator.seen.borrow().as_slice(), ["<order><qty>12</qty></order>"]);

        let rejecting = ScriptedValidator {
            accept: false,
            seen: RefCell::new(Vec::new()),
        };
        assert!(matches!(
            CastService::new(&forest, Some(&rejecting)).validate_and_cast(Item::Node(order), &typed, &site()),
            Err(EngineError::Validation(ValidationError::Invalid { .. }))
        ));

        forest.annotate(order, QualifiedName::xs("integer")).unwrap();
        let service = CastService::new(&forest, None);
        assert!(matches!(
            service.validate_and_cast(Item::Node(order), &typed, &site()),
            Err(EngineError::Type(TypeError::Mismatch { .. }))
        ));
        assert!(service
            .validate_and_cast(Item::Node(order), &spec("element(order, xs:integer)"), &site())
            .is_ok());
    }

    #[test]
    fn test_cast_is_idempotent() {
        let (forest, root) = sample();
        let service = CastService::new(&forest, None);
        let qty = Item::Node(forest.children(root).next().unwrap());
        for (value, text) in [
            (Item::from("3.5"), "xs:double"),
            (Item::from(7), "xs:decimal+"),
            (qty.clone(), "element()?"),
            (qty, "xs:string"),
            (Item::Sequence(vec![Item::from(1), Item::from("2")]), "xs:integer*"),
        ] {
            let once = service.validate_and_cast(value, &spec(text), &site()).unwrap();
            let twice = service.validate_and_cast(once.clone(), &spec(text), &site()).unwrap();
            assert_eq!(once, twice, "{}", text);
        }
    }
}
