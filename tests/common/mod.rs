#![allow(dead_code)]

use quire::runtime::test_support::FnEvaluator;
use quire::xdm::Namespaces;
use quire::{BodyRef, Forest, NodeRef, Pattern, QualifiedName, TemplateRule};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn name(local: &str) -> QualifiedName {
    QualifiedName::local(local)
}

/// Loads `xml` into a fresh forest, returning it with the document node.
pub fn load(xml: &str) -> (Forest, NodeRef) {
    let mut forest = Forest::new();
    let doc = forest.load_xml(xml).expect("test document should parse");
    (forest, doc)
}

/// Follows child indexes down from `from`.
pub fn child_at(forest: &Forest, from: NodeRef, path: &[usize]) -> NodeRef {
    path.iter().fold(from, |node, &i| {
        forest
            .children(node)
            .nth(i)
            .unwrap_or_else(|| panic!("no child {} under {}", i, node))
    })
}

pub fn element_children(forest: &Forest, parent: NodeRef) -> Vec<NodeRef> {
    forest
        .children(parent)
        .filter(|&c| forest.name(c).is_some())
        .collect()
}

pub fn pattern(evaluator: &mut FnEvaluator, text: &str) -> Pattern {
    Pattern::parse(text, &Namespaces::new(), evaluator).expect("test pattern should compile")
}

pub fn rule(evaluator: &mut FnEvaluator, text: &str, body: usize) -> TemplateRule {
    TemplateRule::matching(pattern(evaluator, text), BodyRef(body))
}
