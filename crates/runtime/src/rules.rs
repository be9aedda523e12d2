//! The rule table: every declared template rule, indexed per mode in rank order.

use crate::error::DeclarationError;
use crate::pattern::{IndexKey, Pattern};
use crate::seqtype::SequenceTypeSpec;
use crate::traits::{BodyRef, ExprHandle};
use quire_xdm::{Forest, Item, NodeKind, QualifiedName};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: QualifiedName,
    pub as_type: Option<Arc<SequenceTypeSpec>>,
    pub required: bool,
    pub default: Option<ExprHandle>,
    pub tunnel: bool,
}

impl ParamDecl {
    pub fn new(name: QualifiedName) -> Self {
        Self {
            name,
            as_type: None,
            required: false,
            default: None,
            tunnel: false,
        }
    }

    pub fn with_type(mut self, spec: Arc<SequenceTypeSpec>) -> Self {
        self.as_type = Some(spec);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, expr: ExprHandle) -> Self {
        self.default = Some(expr);
        self
    }

    pub fn tunnel(mut self) -> Self {
        self.tunnel = true;
        self
    }
}

/// What the built-in rules of a mode do with nodes no declared rule matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnNoMatch {
    /// Recurse into documents and elements, copy the text of text and attribute nodes.
    #[default]
    TextOnlyCopy,
    /// Recurse into documents and elements, drop everything else.
    ShallowSkip,
    /// Drop the node and its subtree.
    DeepSkip,
    /// Raise a dispatch error.
    Fail,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModeDeclaration {
    pub name: Option<QualifiedName>,
    pub on_no_match: OnNoMatch,
}

impl ModeDeclaration {
    pub fn new(name: Option<QualifiedName>, on_no_match: OnNoMatch) -> Self {
        Self { name, on_no_match }
    }
}

#[derive(Debug, Clone)]
pub struct TemplateRule {
    pub pattern: Option<Pattern>,
    pub name: Option<QualifiedName>,
    pub mode: Option<QualifiedName>,
    /// Declared priority. Alternatives of a rule without one use their default priority.
    pub priority: Option<f64>,
    pub precedence_rank: i64,
    pub body: BodyRef,
    pub params: Vec<ParamDecl>,
    pub as_type: Option<Arc<SequenceTypeSpec>>,
}

impl TemplateRule {
    pub fn matching(pattern: Pattern, body: BodyRef) -> Self {
        Self {
            pattern: Some(pattern),
            name: None,
            mode: None,
            priority: None,
            precedence_rank: 0,
            body,
            params: Vec::new(),
            as_type: None,
        }
    }

    pub fn named(name: QualifiedName, body: BodyRef) -> Self {
        Self {
            pattern: None,
            name: Some(name),
            mode: None,
            priority: None,
            precedence_rank: 0,
            body,
            params: Vec::new(),
            as_type: None,
        }
    }

    pub fn in_mode(mut self, mode: QualifiedName) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_precedence(mut self, rank: i64) -> Self {
        self.precedence_rank = rank;
        self
    }

    pub fn with_name(mut self, name: QualifiedName) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_param(mut self, param: ParamDecl) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_result_type(mut self, spec: Arc<SequenceTypeSpec>) -> Self {
        self.as_type = Some(spec);
        self
    }

    pub fn describe(&self) -> String {
        match (&self.pattern, &self.name) {
            (Some(pattern), _) => format!("template matching '{}'", pattern),
            (None, Some(name)) => format!("template named {}", name),
            (None, None) => "anonymous template".to_string(),
        }
    }
}

/// One alternative of one rule, as ranked within its mode.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEntry {
    pub rule_id: usize,
    pub alternative: usize,
    pub priority: f64,
    pub explicit: bool,
    pub precedence_rank: i64,
}

impl RuleEntry {
    /// Ranking order: explicit priorities before implicit ones, then higher priority, then
    /// higher precedence, then later declaration. `Less` means `self` ranks first.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .explicit
            .cmp(&self.explicit)
            .then_with(|| other.priority.total_cmp(&self.priority))
            .then_with(|| other.precedence_rank.cmp(&self.precedence_rank))
            .then_with(|| other.rule_id.cmp(&self.rule_id))
            .then_with(|| self.alternative.cmp(&other.alternative))
    }

    /// True when neither entry outranks the other except by declaration order.
    pub fn ties_with(&self, other: &Self) -> bool {
        self.explicit == other.explicit
            && self.priority == other.priority
            && self.precedence_rank == other.precedence_rank
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModeRules {
    entries: Vec<RuleEntry>,
    by_element: HashMap<QualifiedName, Vec<usize>>,
    by_attribute: HashMap<QualifiedName, Vec<usize>>,
    by_kind: HashMap<NodeKind, Vec<usize>>,
    any_node: Vec<usize>,
    any_item: Vec<usize>,
}

impl ModeRules {
    fn build(mut entries: Vec<(RuleEntry, IndexKey)>) -> Self {
        entries.sort_by(|(a, _), (b, _)| a.rank_cmp(b));
        let mut rules = ModeRules::default();
        for (rank, (entry, key)) in entries.into_iter().enumerate() {
            match key {
                IndexKey::Element(name) => rules.by_element.entry(name).or_default().push(rank),
                IndexKey::Attribute(name) => rules.by_attribute.entry(name).or_default().push(rank),
                IndexKey::Kind(kind) => rules.by_kind.entry(kind).or_default().push(rank),
                IndexKey::AnyNode => rules.any_node.push(rank),
                IndexKey::AnyItem => rules.any_item.push(rank),
            }
            rules.entries.push(entry);
        }
        rules
    }

    pub fn entries(&self) -> &[RuleEntry] {
        &self.entries
    }

    pub fn entry(&self, rank: usize) -> Option<&RuleEntry> {
        self.entries.get(rank)
    }

    /// Ranks of the entries that could match `item`, best first.
    pub fn candidates(&self, item: &Item, forest: &Forest) -> Vec<usize> {
        let mut ranks: Vec<usize> = self.any_item.clone();
        if let Some(node) = item.as_node() {
            let kind = match item {
                Item::Fragment(_) => NodeKind::Document,
                _ => forest.kind(node),
            };
            if let Some(name) = forest.name(node) {
                let by_name = match kind {
                    NodeKind::Element => self.by_element.get(name),
                    NodeKind::Attribute => self.by_attribute.get(name),
                    _ => None,
                };
                ranks.extend(by_name.into_iter().flatten());
            }
            ranks.extend(self.by_kind.get(&kind).into_iter().flatten());
            ranks.extend(&self.any_node);
        }
        ranks.sort_unstable();
        ranks
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<TemplateRule>,
    modes: HashMap<Option<QualifiedName>, ModeRules>,
    declarations: HashMap<Option<QualifiedName>, ModeDeclaration>,
    named: HashMap<QualifiedName, usize>,
}

impl RuleTable {
    pub fn builder() -> RuleTableBuilder {
        RuleTableBuilder::default()
    }

    pub fn rule(&self, rule_id: usize) -> Option<&TemplateRule> {
        self.rules.get(rule_id)
    }

    pub fn rules(&self) -> &[TemplateRule] {
        &self.rules
    }

    pub fn mode(&self, mode: Option<&QualifiedName>) -> Option<&ModeRules> {
        self.modes.get(&mode.cloned())
    }

    pub fn mode_declaration(&self, mode: Option<&QualifiedName>) -> ModeDeclaration {
        self.declarations
            .get(&mode.cloned())
            .cloned()
            .unwrap_or_else(|| ModeDeclaration::new(mode.cloned(), OnNoMatch::default()))
    }

    pub fn named_template(&self, name: &QualifiedName) -> Option<usize> {
        self.named.get(name).copied()
    }
}

#[derive(Debug, Default)]
pub struct RuleTableBuilder {
    rules: Vec<TemplateRule>,
    declarations: Vec<ModeDeclaration>,
}

impl RuleTableBuilder {
    /// Adds a rule and returns its id. Later rules win ties against earlier ones.
    pub fn add_rule(&mut self, rule: TemplateRule) -> usize {
        self.rules.push(rule);
        self.rules.len() - 1
    }

    pub fn rule(mut self, rule: TemplateRule) -> Self {
        self.add_rule(rule);
        self
    }

    pub fn declare_mode(mut self, declaration: ModeDeclaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    pub fn build(self) -> Result<RuleTable, DeclarationError> {
        let mut per_mode: HashMap<Option<QualifiedName>, Vec<(RuleEntry, IndexKey)>> =
            HashMap::new();
        let mut named: HashMap<QualifiedName, usize> = HashMap::new();

        for (rule_id, rule) in self.rules.iter().enumerate() {
            let mut seen = HashSet::new();
            for param in &rule.params {
                if !seen.insert(&param.name) {
                    return Err(DeclarationError::DuplicateParameter {
                        owner: rule.describe(),
                        name: param.name.clone(),
                    });
                }
            }
            if let Some(priority) = rule.priority {
                if !priority.is_finite() {
                    return Err(DeclarationError::InvalidPriority {
                        rule: rule.describe(),
                        value: priority,
                    });
                }
            }
            if let Some(name) = &rule.name {
                match named.get(name).map(|&id| self.rules[id].precedence_rank) {
                    Some(rank) if rank == rule.precedence_rank => {
                        return Err(DeclarationError::DuplicateNamedTemplate(name.clone()));
                    }
                    Some(rank) if rank > rule.precedence_rank => {}
                    _ => {
                        named.insert(name.clone(), rule_id);
                    }
                }
            }
            let Some(pattern) = &rule.pattern else {
                if rule.name.is_none() {
                    return Err(DeclarationError::EmptyRule);
                }
                continue;
            };
            let entries = per_mode.entry(rule.mode.clone()).or_default();
            for (alternative, path) in pattern.alternatives().iter().enumerate() {
                let entry = RuleEntry {
                    rule_id,
                    alternative,
                    priority: rule.priority.unwrap_or_else(|| path.default_priority()),
                    explicit: rule.priority.is_some(),
                    precedence_rank: rule.precedence_rank,
                };
                entries.push((entry, path.index_key()));
            }
        }

        let modes: HashMap<_, _> = per_mode
            .into_iter()
            .map(|(mode, entries)| (mode, ModeRules::build(entries)))
            .collect();
        let declarations = self
            .declarations
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        log::debug!(
            "Built rule table: {} rules across {} modes, {} named templates",
            self.rules.len(),
            modes.len(),
            named.len()
        );
        Ok(RuleTable {
            rules: self.rules,
            modes,
            declarations,
            named,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FnEvaluator;
    use quire_xdm::Namespaces;

    fn pattern(text: &str) -> Pattern {
        Pattern::parse(text, &Namespaces::new(), &mut FnEvaluator::new()).unwrap()
    }

    fn name(s: &str) -> QualifiedName {
        QualifiedName::local(s)
    }

    #[test]
    fn test_entries_are_ranked() {
        let table = RuleTable::builder()
            .rule(TemplateRule::matching(pattern("*"), BodyRef(0)))
            .rule(TemplateRule::matching(pattern("para"), BodyRef(1)))
            .rule(TemplateRule::matching(pattern("node()"), BodyRef(2)).with_priority(-3.0))
            .rule(TemplateRule::matching(pattern("chapter/para"), BodyRef(3)))
            .build()
            .unwrap();
        let ids: Vec<usize> = table
            .mode(None)
            .unwrap()
            .entries()
            .iter()
            .map(|e| e.rule_id)
            .collect();
        assert_eq!(ids, vec![2, 3, 1, 0]);
    }

    #[test]
    fn test_union_alternatives_split() {
        let table = RuleTable::builder()
            .rule(TemplateRule::matching(pattern("para | chapter/title"), BodyRef(0)))
            .build()
            .unwrap();
        let entries = table.mode(None).unwrap().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].priority, 0.5);
        assert_eq!(entries[0].alternative, 1);
        assert_eq!(entries[1].priority, 0.0);
    }

    #[test]
    fn test_candidates_use_indexes() {
        let mut forest = Forest::new();
        let root = forest.load_xml("<para>x</para>").unwrap();
        let para = forest.children(root).next().unwrap();
        let table = RuleTable::builder()
            .rule(TemplateRule::matching(pattern("title"), BodyRef(0)))
            .rule(TemplateRule::matching(pattern("para"), BodyRef(1)))
            .rule(TemplateRule::matching(pattern("text()"), BodyRef(2)))
            .rule(TemplateRule::matching(pattern("."), BodyRef(3)))
            .build()
            .unwrap();
        let mode = table.mode(None).unwrap();
        let ids = |item: &Item| -> Vec<usize> {
            mode.candidates(item, &forest)
                .into_iter()
                .map(|r| mode.entry(r).unwrap().rule_id)
                .collect()
        };
        assert_eq!(ids(&Item::Node(para)), vec![1, 3]);
        assert_eq!(ids(&Item::from(1)), vec![3]);
    }

    #[test]
    fn test_declaration_errors() {
        let duplicate_param = RuleTable::builder()
            .rule(
                TemplateRule::matching(pattern("a"), BodyRef(0))
                    .with_param(ParamDecl::new(name("p")))
                    .with_param(ParamDecl::new(name("p")).tunnel()),
            )
            .build();
        assert!(matches!(duplicate_param, Err(DeclarationError::DuplicateParameter { .. })));

        let duplicate_name = RuleTable::builder()
            .rule(TemplateRule::named(name("t"), BodyRef(0)))
            .rule(TemplateRule::named(name("t"), BodyRef(1)))
            .build();
        assert_eq!(
            duplicate_name.unwrap_err(),
            DeclarationError::DuplicateNamedTemplate(name("t"))
        );

        let nan = RuleTable::builder()
            .rule(TemplateRule::matching(pattern("a"), BodyRef(0)).with_priority(f64::NAN))
            .build();
        assert!(matches!(nan, Err(DeclarationError::InvalidPriority { .. })));
    }

    #[test]
    fn test_named_templates_resolve_by_precedence() {
        let table = RuleTable::builder()
            .rule(TemplateRule::named(name("t"), BodyRef(0)).with_precedence(2))
            .rule(TemplateRule::named(name("t"), BodyRef(1)).with_precedence(1))
            .build()
            .unwrap();
        assert_eq!(table.named_template(&name("t")), Some(0));
        assert!(table.named_template(&name("missing")).is_none());
    }

    #[test]
    fn test_mode_declarations_default_to_text_only_copy() {
        let table = RuleTable::builder()
            .declare_mode(ModeDeclaration::new(Some(name("m")), OnNoMatch::Fail))
            .build()
            .unwrap();
        assert_eq!(table.mode_declaration(Some(&name("m"))).on_no_match, OnNoMatch::Fail);
        assert_eq!(table.mode_declaration(None).on_no_match, OnNoMatch::TextOnlyCopy);
    }
}
