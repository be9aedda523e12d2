//! Match patterns.
//!
//! A pattern is parsed in two passes. The first is purely syntactic and keeps predicate
//! bodies as source text. The second resolves names against the in-scope namespaces and
//! hands predicate text to the [`ExpressionCompiler`], so the pattern only ever holds
//! [`ExprHandle`]s for the expression layer to evaluate.
//!
//! Path patterns are matched right to left: the last step is tested against the candidate
//! node, then each earlier step against its parent (`/`) or some ancestor (`//`).

use crate::context::{EvaluationContext, Frame};
use crate::error::{DeclarationError, EngineError};
use crate::traits::{Evaluator, ExprHandle, ExpressionCompiler};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, multispace0, satisfy},
    combinator::{map, opt, recognize, value},
    multi::{many0, separated_list1},
    sequence::{delimited, preceded, terminated},
};
use quire_xdm::{Forest, Item, Namespaces, NodeKind, NodeRef, QualifiedName};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Attribute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    /// `/`: the previous step must match the parent.
    Child,
    /// `//`: the previous step must match some ancestor.
    Descendant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Relative,
    /// `/a`: the first step's parent is a document node.
    Root,
    /// `//a`: the first step has a document node as ancestor.
    Descendant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepTest {
    Name(QualifiedName),
    AnyName,
    /// `prefix:*`
    AnyLocal(Option<String>),
    /// `*:local`
    AnyNamespace(String),
    Node,
    Text,
    Comment,
    ProcessingInstruction(Option<String>),
    Element(Option<QualifiedName>),
    Attribute(Option<QualifiedName>),
    Document,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternStep {
    pub axis: Axis,
    pub test: StepTest,
    pub predicates: Vec<ExprHandle>,
    /// How this step relates to the one before it. Ignored on the first step.
    pub separator: Separator,
}

/// One alternative of a (possibly union) pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum PathPattern {
    /// `.` or `.[predicate]`, which can match any item, not only nodes.
    Context { predicates: Vec<ExprHandle> },
    /// `/`
    Root,
    Path { anchor: Anchor, steps: Vec<PatternStep> },
}

/// The coarse key the rule table indexes an alternative under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Element(QualifiedName),
    Attribute(QualifiedName),
    Kind(NodeKind),
    AnyNode,
    AnyItem,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    alternatives: Vec<PathPattern>,
    text: String,
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Pattern {
    pub fn parse(
        text: &str,
        namespaces: &Namespaces,
        compiler: &mut dyn ExpressionCompiler,
    ) -> Result<Pattern, EngineError> {
        let raw = match pattern_parser(text.trim()) {
            Ok(("", raw)) => raw,
            Ok((rem, _)) => {
                return Err(DeclarationError::pattern(
                    text,
                    format!("Unconsumed input in pattern: {}", rem),
                )
                .into());
            }
            Err(e) => return Err(DeclarationError::pattern(text, e.to_string()).into()),
        };
        let mut alternatives = Vec::with_capacity(raw.len());
        for alternative in raw {
            alternatives.push(resolve_alternative(text, alternative, namespaces, compiler)?);
        }
        Ok(Pattern {
            alternatives,
            text: text.trim().to_string(),
        })
    }

    pub fn alternatives(&self) -> &[PathPattern] {
        &self.alternatives
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn matches(
        &self,
        item: &Item,
        ctx: &mut EvaluationContext,
        forest: &Forest,
        evaluator: &dyn Evaluator,
    ) -> Result<bool, EngineError> {
        for alternative in &self.alternatives {
            if alternative.matches(item, ctx, forest, evaluator)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl PathPattern {
    pub fn default_priority(&self) -> f64 {
        match self {
            PathPattern::Context { predicates } if predicates.is_empty() => -1.0,
            PathPattern::Context { .. } => 1.0,
            PathPattern::Root => -0.5,
            PathPattern::Path {
                anchor: Anchor::Relative,
                steps,
            } if steps.len() == 1 && steps[0].predicates.is_empty() => match &steps[0].test {
                StepTest::Name(_)
                | StepTest::Element(Some(_))
                | StepTest::Attribute(Some(_))
                | StepTest::ProcessingInstruction(Some(_)) => 0.0,
                StepTest::AnyLocal(_) | StepTest::AnyNamespace(_) => -0.25,
                _ => -0.5,
            },
            PathPattern::Path { .. } => 0.5,
        }
    }

    pub fn index_key(&self) -> IndexKey {
        let step = match self {
            PathPattern::Context { .. } => return IndexKey::AnyItem,
            PathPattern::Root => return IndexKey::Kind(NodeKind::Document),
            PathPattern::Path { steps, .. } => match steps.last() {
                Some(step) => step,
                None => return IndexKey::AnyNode,
            },
        };
        match (&step.test, step.axis) {
            (StepTest::Name(name), Axis::Child) | (StepTest::Element(Some(name)), _) => {
                IndexKey::Element(name.clone())
            }
            (StepTest::Name(name), Axis::Attribute) | (StepTest::Attribute(Some(name)), _) => {
                IndexKey::Attribute(name.clone())
            }
            (StepTest::AnyName | StepTest::AnyLocal(_) | StepTest::AnyNamespace(_), Axis::Child)
            | (StepTest::Element(None), _) => IndexKey::Kind(NodeKind::Element),
            (_, Axis::Attribute) | (StepTest::Attribute(None), _) => {
                IndexKey::Kind(NodeKind::Attribute)
            }
            (StepTest::Text, _) => IndexKey::Kind(NodeKind::Text),
            (StepTest::Comment, _) => IndexKey::Kind(NodeKind::Comment),
            (StepTest::ProcessingInstruction(_), _) => {
                IndexKey::Kind(NodeKind::ProcessingInstruction)
            }
            (StepTest::Document, _) => IndexKey::Kind(NodeKind::Document),
            (StepTest::Node, Axis::Child) => IndexKey::AnyNode,
        }
    }

    pub fn matches(
        &self,
        item: &Item,
        ctx: &mut EvaluationContext,
        forest: &Forest,
        evaluator: &dyn Evaluator,
    ) -> Result<bool, EngineError> {
        match self {
            PathPattern::Context { predicates } => {
                let (position, size) = match item.as_node() {
                    Some(node) => sibling_focus(forest, node, |_| true),
                    None => (1, 1),
                };
                predicates_hold(predicates, item, position, size, ctx, forest, evaluator)
            }
            PathPattern::Root => Ok(item
                .as_node()
                .is_some_and(|n| forest.kind(n) == NodeKind::Document)),
            PathPattern::Path { anchor, steps } => match item.as_node() {
                Some(node) => match_steps(*anchor, steps, node, ctx, forest, evaluator),
                None => Ok(false),
            },
        }
    }
}

impl PatternStep {
    fn test_matches(&self, forest: &Forest, node: NodeRef) -> bool {
        let kind = forest.kind(node);
        let on_axis = match self.axis {
            Axis::Attribute => kind == NodeKind::Attribute,
            Axis::Child => !matches!(kind, NodeKind::Attribute | NodeKind::Namespace),
        };
        if !on_axis {
            return false;
        }
        let principal = match self.axis {
            Axis::Child => NodeKind::Element,
            Axis::Attribute => NodeKind::Attribute,
        };
        let name = forest.name(node);
        match &self.test {
            StepTest::Name(expected) => kind == principal && name == Some(expected),
            StepTest::AnyName => kind == principal,
            StepTest::AnyLocal(ns) => {
                kind == principal && name.is_some_and(|n| n.namespace == *ns)
            }
            StepTest::AnyNamespace(local) => {
                kind == principal && name.is_some_and(|n| n.local == *local)
            }
            StepTest::Node => kind != NodeKind::Document,
            StepTest::Text => kind == NodeKind::Text,
            StepTest::Comment => kind == NodeKind::Comment,
            StepTest::ProcessingInstruction(target) => {
                kind == NodeKind::ProcessingInstruction
                    && target
                        .as_ref()
                        .is_none_or(|t| name.is_some_and(|n| n.local == *t))
            }
            StepTest::Element(expected) => {
                kind == NodeKind::Element && expected.as_ref().is_none_or(|e| name == Some(e))
            }
            StepTest::Attribute(expected) => {
                kind == NodeKind::Attribute && expected.as_ref().is_none_or(|e| name == Some(e))
            }
            StepTest::Document => kind == NodeKind::Document,
        }
    }

    fn matches(
        &self,
        node: NodeRef,
        ctx: &mut EvaluationContext,
        forest: &Forest,
        evaluator: &dyn Evaluator,
    ) -> Result<bool, EngineError> {
        if !self.test_matches(forest, node) {
            return Ok(false);
        }
        if self.predicates.is_empty() {
            return Ok(true);
        }
        let (position, size) = sibling_focus(forest, node, |n| self.test_matches(forest, n));
        predicates_hold(
            &self.predicates,
            &Item::Node(node),
            position,
            size,
            ctx,
            forest,
            evaluator,
        )
    }
}

/// Position and size of `node` among the siblings accepted by `filter`.
fn sibling_focus(forest: &Forest, node: NodeRef, filter: impl Fn(NodeRef) -> bool) -> (usize, usize) {
    match forest.parent(node) {
        Some(parent) if forest.kind(node) != NodeKind::Attribute => {
            let position = forest.sibling_position(node, &filter);
            let size = forest.children(parent).filter(|&c| filter(c)).count();
            (position, size)
        }
        _ => (1, 1),
    }
}

fn predicates_hold(
    predicates: &[ExprHandle],
    item: &Item,
    position: usize,
    size: usize,
    ctx: &mut EvaluationContext,
    forest: &Forest,
    evaluator: &dyn Evaluator,
) -> Result<bool, EngineError> {
    if predicates.is_empty() {
        return Ok(true);
    }
    ctx.scoped(Frame::focus(item.clone(), position, size), |ctx| {
        for &predicate in predicates {
            let result = evaluator.evaluate(predicate, ctx, forest)?;
            let holds = match &result {
                Item::Atomic(value) if value.is_numeric() => value.to_double() == position as f64,
                other => other.effective_boolean_value()?,
            };
            if !holds {
                return Ok(false);
            }
        }
        Ok(true)
    })
}

fn match_steps(
    anchor: Anchor,
    steps: &[PatternStep],
    node: NodeRef,
    ctx: &mut EvaluationContext,
    forest: &Forest,
    evaluator: &dyn Evaluator,
) -> Result<bool, EngineError> {
    let Some((last, rest)) = steps.split_last() else {
        return Ok(false);
    };
    if !last.matches(node, ctx, forest, evaluator)? {
        return Ok(false);
    }
    if rest.is_empty() {
        return Ok(match anchor {
            Anchor::Relative => true,
            Anchor::Root => forest
                .parent(node)
                .is_some_and(|p| forest.kind(p) == NodeKind::Document),
            Anchor::Descendant => {
                forest.kind(forest.root(node)) == NodeKind::Document && forest.root(node) != node
            }
        });
    }
    let mut ancestor = forest.parent(node);
    while let Some(candidate) = ancestor {
        if match_steps(anchor, rest, candidate, ctx, forest, evaluator)? {
            return Ok(true);
        }
        if last.separator == Separator::Child {
            break;
        }
        ancestor = forest.parent(candidate);
    }
    Ok(false)
}

// --- Syntax ---

#[derive(Debug, Clone, PartialEq)]
enum RawTest<'a> {
    Name(&'a str),
    AnyName,
    AnyLocal(&'a str),
    AnyNamespace(&'a str),
    Node,
    Text,
    Comment,
    ProcessingInstruction(Option<&'a str>),
    Element(Option<&'a str>),
    Attribute(Option<&'a str>),
    Document,
}

#[derive(Debug, Clone, PartialEq)]
struct RawStep<'a> {
    axis: Axis,
    test: RawTest<'a>,
    predicates: Vec<&'a str>,
    separator: Separator,
}

#[derive(Debug, Clone, PartialEq)]
enum RawAlternative<'a> {
    Context(Vec<&'a str>),
    Root,
    Path(Anchor, Vec<RawStep<'a>>),
}

fn ws<'a, F, O, E>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
    E: nom::error::ParseError<&'a str>,
{
    delimited(multispace0, inner, multispace0)
}

fn ncname(input: &str) -> IResult<&str, &str> {
    recognize((
        satisfy(|c| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || matches!(c, '_' | '-' | '.')),
    ))
    .parse(input)
}

fn eqname(input: &str) -> IResult<&str, &str> {
    alt((
        recognize((tag("Q{"), take_while(|c| c != '}'), char('}'), ncname)),
        recognize((ncname, opt((char(':'), ncname)))),
    ))
    .parse(input)
}

/// The text between a `[` and its matching `]`, skipping brackets inside string literals.
fn predicate(input: &str) -> IResult<&str, &str> {
    let (body, _) = ws(char('[')).parse(input)?;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') if depth == 0 => {
                let (_, rest) = multispace0(&body[i + 1..])?;
                return Ok((rest, body[..i].trim()));
            }
            (None, ']') => depth -= 1,
            _ => {}
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

fn kind_call<'a>(keyword: &'static str) -> impl Parser<&'a str, Output = (), Error = nom::error::Error<&'a str>> {
    value((), (tag(keyword), ws(char('('))))
}

fn close(input: &str) -> IResult<&str, ()> {
    value((), ws(char(')'))).parse(input)
}

fn optional_name(input: &str) -> IResult<&str, Option<&str>> {
    map(
        opt(alt((value(None, ws(char('*'))), map(ws(eqname), Some)))),
        Option::flatten,
    )
    .parse(input)
}

fn kind_test(input: &str) -> IResult<&str, RawTest<'_>> {
    alt((
        value(RawTest::Node, terminated(kind_call("node"), close)),
        value(RawTest::Text, terminated(kind_call("text"), close)),
        value(RawTest::Comment, terminated(kind_call("comment"), close)),
        value(RawTest::Document, terminated(kind_call("document-node"), close)),
        map(
            delimited(
                kind_call("processing-instruction"),
                opt(ws(alt((
                    ncname,
                    delimited(char('\''), take_while(|c| c != '\''), char('\'')),
                    delimited(char('"'), take_while(|c| c != '"'), char('"')),
                )))),
                close,
            ),
            RawTest::ProcessingInstruction,
        ),
        map(
            delimited(kind_call("element"), optional_name, close),
            RawTest::Element,
        ),
        map(
            delimited(kind_call("attribute"), optional_name, close),
            RawTest::Attribute,
        ),
    ))
    .parse(input)
}

fn node_test(input: &str) -> IResult<&str, RawTest<'_>> {
    alt((
        kind_test,
        map(preceded(tag("*:"), ncname), RawTest::AnyNamespace),
        map(terminated(ncname, tag(":*")), RawTest::AnyLocal),
        value(RawTest::AnyName, char('*')),
        map(eqname, RawTest::Name),
    ))
    .parse(input)
}

fn step(input: &str) -> IResult<&str, RawStep<'_>> {
    let (input, axis) = map(
        opt(alt((
            value(Axis::Attribute, alt((tag("@"), tag("attribute::")))),
            value(Axis::Child, tag("child::")),
        ))),
        |a| a.unwrap_or(Axis::Child),
    )
    .parse(input)?;
    let (input, test) = ws(node_test).parse(input)?;
    let (input, predicates) = many0(predicate).parse(input)?;
    Ok((
        input,
        RawStep {
            axis,
            test,
            predicates,
            separator: Separator::Child,
        },
    ))
}

fn separator(input: &str) -> IResult<&str, Separator> {
    ws(alt((
        value(Separator::Descendant, tag("//")),
        value(Separator::Child, tag("/")),
    )))
    .parse(input)
}

fn relative_path(input: &str) -> IResult<&str, Vec<RawStep<'_>>> {
    let (mut input, first) = step(input)?;
    let mut steps = vec![first];
    loop {
        let Ok((rest, sep)) = separator(input) else {
            break;
        };
        let (rest, mut next) = step(rest)?;
        next.separator = sep;
        steps.push(next);
        input = rest;
    }
    Ok((input, steps))
}

fn alternative(input: &str) -> IResult<&str, RawAlternative<'_>> {
    let (input, _) = multispace0(input)?;
    if let Ok((rest, _)) = char::<&str, nom::error::Error<&str>>('.').parse(input) {
        if !rest.starts_with('.') {
            let (rest, predicates) = many0(predicate).parse(rest)?;
            return Ok((rest, RawAlternative::Context(predicates)));
        }
    }
    if let Ok((rest, _)) = tag::<&str, &str, nom::error::Error<&str>>("//").parse(input) {
        let (rest, steps) = relative_path(rest)?;
        return Ok((rest, RawAlternative::Path(Anchor::Descendant, steps)));
    }
    if let Ok((rest, _)) = char::<&str, nom::error::Error<&str>>('/').parse(input) {
        return match relative_path(rest) {
            Ok((rest, steps)) => Ok((rest, RawAlternative::Path(Anchor::Root, steps))),
            Err(_) => Ok((rest, RawAlternative::Root)),
        };
    }
    map(relative_path, |steps| RawAlternative::Path(Anchor::Relative, steps)).parse(input)
}

fn pattern_parser(input: &str) -> IResult<&str, Vec<RawAlternative<'_>>> {
    terminated(separated_list1(ws(char('|')), alternative), multispace0).parse(input)
}

fn resolve_alternative(
    text: &str,
    raw: RawAlternative<'_>,
    namespaces: &Namespaces,
    compiler: &mut dyn ExpressionCompiler,
) -> Result<PathPattern, EngineError> {
    let mut compile = |predicates: Vec<&str>| -> Result<Vec<ExprHandle>, EngineError> {
        predicates.into_iter().map(|p| compiler.compile(p)).collect()
    };
    Ok(match raw {
        RawAlternative::Context(predicates) => PathPattern::Context {
            predicates: compile(predicates)?,
        },
        RawAlternative::Root => PathPattern::Root,
        RawAlternative::Path(anchor, raw_steps) => {
            let mut steps = Vec::with_capacity(raw_steps.len());
            for raw_step in raw_steps {
                let test = resolve_test(text, raw_step.test, raw_step.axis, namespaces)?;
                steps.push(PatternStep {
                    axis: raw_step.axis,
                    test,
                    predicates: compile(raw_step.predicates)?,
                    separator: raw_step.separator,
                });
            }
            PathPattern::Path { anchor, steps }
        }
    })
}

fn resolve_test(
    text: &str,
    raw: RawTest<'_>,
    axis: Axis,
    namespaces: &Namespaces,
) -> Result<StepTest, DeclarationError> {
    let resolve = |lexical: &str, use_default: bool| {
        namespaces
            .resolve(lexical, use_default)
            .map_err(|e| DeclarationError::pattern(text, e.to_string()))
    };
    Ok(match raw {
        RawTest::Name(lexical) => StepTest::Name(resolve(lexical, axis == Axis::Child)?),
        RawTest::AnyName => StepTest::AnyName,
        RawTest::AnyLocal(prefix) => {
            let uri = namespaces.lookup(prefix).ok_or_else(|| {
                DeclarationError::pattern(text, format!("Unbound namespace prefix '{}'", prefix))
            })?;
            StepTest::AnyLocal(Some(uri.to_string()))
        }
        RawTest::AnyNamespace(local) => StepTest::AnyNamespace(local.to_string()),
        RawTest::Node => StepTest::Node,
        RawTest::Text => StepTest::Text,
        RawTest::Comment => StepTest::Comment,
        RawTest::ProcessingInstruction(target) => {
            StepTest::ProcessingInstruction(target.map(|t| t.trim().to_string()))
        }
        RawTest::Element(name) => {
            StepTest::Element(name.map(|n| resolve(n, true)).transpose()?)
        }
        RawTest::Attribute(name) => {
            StepTest::Attribute(name.map(|n| resolve(n, false)).transpose()?)
        }
        RawTest::Document => StepTest::Document,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FnEvaluator;
    use quire_xdm::AtomicValue;

    fn compile(text: &str, evaluator: &mut FnEvaluator) -> Pattern {
        Pattern::parse(text, &Namespaces::new().bind("p", "urn:p"), evaluator).unwrap()
    }

    fn doc() -> (Forest, NodeRef) {
        let mut forest = Forest::new();
        let root = forest
            .load_xml(r#"<book><chapter id="c1"><para>a</para><para>b</para></chapter><appendix><para>c</para></appendix></book>"#)
            .unwrap();
        (forest, root)
    }

    fn find(forest: &Forest, from: NodeRef, path: &[usize]) -> NodeRef {
        path.iter().fold(from, |node, &i| forest.children(node).nth(i).unwrap())
    }

    #[test]
    fn test_syntax_forms() {
        let mut evaluator = FnEvaluator::new();
        for text in [
            "para",
            "chapter/para",
            "book//para",
            "/",
            "/book",
            "//para",
            "@id",
            "chapter/@id",
            "text()",
            "node()",
            "comment() | processing-instruction('x')",
            "p:*",
            "*:para",
            "element(para)",
            "attribute(*)",
            "document-node()",
            ".",
            ".[1]",
            "para[2]",
            "para[@x = ']']",
            "child::para | attribute::id",
        ] {
            assert!(
                Pattern::parse(text, &Namespaces::new().bind("p", "urn:p"), &mut evaluator).is_ok(),
                "{}",
                text
            );
        }
        assert!(Pattern::parse("para[", &Namespaces::new(), &mut evaluator).is_err());
        assert!(Pattern::parse("q:para", &Namespaces::new(), &mut evaluator).is_err());
        assert!(Pattern::parse("a b", &Namespaces::new(), &mut evaluator).is_err());
    }

    #[test]
    fn test_default_priorities() {
        let mut evaluator = FnEvaluator::new();
        let cases = [
            (".", -1.0),
            ("node()", -0.5),
            ("*", -0.5),
            ("@*", -0.5),
            ("p:*", -0.25),
            ("*:para", -0.25),
            ("para", 0.0),
            ("@id", 0.0),
            ("element(para)", 0.0),
            ("chapter/para", 0.5),
            ("para[1]", 0.5),
            ("/", -0.5),
            (".[1]", 1.0),
        ];
        for (text, expected) in cases {
            let pattern = compile(text, &mut evaluator);
            assert_eq!(pattern.alternatives()[0].default_priority(), expected, "{}", text);
        }
        let union = compile("para | chapter/para", &mut evaluator);
        let priorities: Vec<f64> = union.alternatives().iter().map(|a| a.default_priority()).collect();
        assert_eq!(priorities, vec![0.0, 0.5]);
    }

    #[test]
    fn test_path_matching() {
        let (forest, root) = doc();
        let mut evaluator = FnEvaluator::new();
        let mut ctx = EvaluationContext::new(32);
        let chapter_para = Item::Node(find(&forest, root, &[0, 0, 0]));
        let appendix_para = Item::Node(find(&forest, root, &[0, 1, 0]));

        let pattern = compile("chapter/para", &mut evaluator);
        assert!(pattern.matches(&chapter_para, &mut ctx, &forest, &evaluator).unwrap());
        assert!(!pattern.matches(&appendix_para, &mut ctx, &forest, &evaluator).unwrap());

        let anywhere = compile("book//para", &mut evaluator);
        assert!(anywhere.matches(&appendix_para, &mut ctx, &forest, &evaluator).unwrap());

        let absolute = compile("/book/chapter", &mut evaluator);
        let chapter = Item::Node(find(&forest, root, &[0, 0]));
        assert!(absolute.matches(&chapter, &mut ctx, &forest, &evaluator).unwrap());
        assert!(!absolute.matches(&chapter_para, &mut ctx, &forest, &evaluator).unwrap());

        let root_pattern = compile("/", &mut evaluator);
        assert!(root_pattern.matches(&Item::Node(root), &mut ctx, &forest, &evaluator).unwrap());
        assert!(!compile("para", &mut evaluator)
            .matches(&Item::from("para"), &mut ctx, &forest, &evaluator)
            .unwrap());

        let chapter_node = find(&forest, root, &[0, 0]);
        let id = Item::Node(forest.attributes(chapter_node).next().unwrap());
        assert!(compile("chapter/@id", &mut evaluator).matches(&id, &mut ctx, &forest, &evaluator).unwrap());
        assert!(!compile("id", &mut evaluator).matches(&id, &mut ctx, &forest, &evaluator).unwrap());
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn test_positional_predicates() {
        let (forest, root) = doc();
        let mut evaluator = FnEvaluator::new();
        evaluator.define("2", |_, _| Ok(Item::Atomic(AtomicValue::Integer(2))));
        let pattern = compile("para[2]", &mut evaluator);
        let mut ctx = EvaluationContext::new(32);
        let first = Item::Node(find(&forest, root, &[0, 0, 0]));
        let second = Item::Node(find(&forest, root, &[0, 0, 1]));
        assert!(!pattern.matches(&first, &mut ctx, &forest, &evaluator).unwrap());
        assert!(pattern.matches(&second, &mut ctx, &forest, &evaluator).unwrap());
    }

    #[test]
    fn test_context_pattern_matches_atomic_items() {
        let forest = Forest::new();
        let mut evaluator = FnEvaluator::new();
        evaluator.define(". instance of xs:integer", |ctx, _| {
            Ok(Item::from(matches!(ctx.context_item(), Some(Item::Atomic(AtomicValue::Integer(_))))))
        });
        let pattern = compile(".[. instance of xs:integer]", &mut evaluator);
        let mut ctx = EvaluationContext::new(32);
        assert!(pattern.matches(&Item::from(5), &mut ctx, &forest, &evaluator).unwrap());
        assert!(!pattern.matches(&Item::from("5"), &mut ctx, &forest, &evaluator).unwrap());
        assert!(compile(".", &mut evaluator).matches(&Item::from("x"), &mut ctx, &forest, &evaluator).unwrap());
    }

    #[test]
    fn test_index_keys() {
        let mut evaluator = FnEvaluator::new();
        let key = |text: &str, evaluator: &mut FnEvaluator| compile(text, evaluator).alternatives()[0].index_key();
        assert_eq!(key("para", &mut evaluator), IndexKey::Element(QualifiedName::local("para")));
        assert_eq!(key("a/@id", &mut evaluator), IndexKey::Attribute(QualifiedName::local("id")));
        assert_eq!(key("*", &mut evaluator), IndexKey::Kind(NodeKind::Element));
        assert_eq!(key("text()", &mut evaluator), IndexKey::Kind(NodeKind::Text));
        assert_eq!(key("node()", &mut evaluator), IndexKey::AnyNode);
        assert_eq!(key(".", &mut evaluator), IndexKey::AnyItem);
    }
}
