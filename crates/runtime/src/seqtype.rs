//! Sequence types: the structural descriptors written in `as` attributes, their parser,
//! and a cache so each distinct text is parsed once.

use crate::error::DeclarationError;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, multispace0, satisfy},
    combinator::{map, opt, recognize, value},
    multi::separated_list0,
    sequence::{delimited, preceded},
};
use quire_xdm::{AtomicType, Namespaces, NodeKind, QualifiedName, qname::XS_NAMESPACE};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occurrence {
    ExactlyOne,
    ZeroOrOne,
    ZeroOrMany,
    OneOrMany,
}

impl Occurrence {
    pub fn allows(self, count: usize) -> bool {
        match self {
            Occurrence::ExactlyOne => count == 1,
            Occurrence::ZeroOrOne => count <= 1,
            Occurrence::ZeroOrMany => true,
            Occurrence::OneOrMany => count >= 1,
        }
    }

    pub fn indicator(self) -> &'static str {
        match self {
            Occurrence::ExactlyOne => "",
            Occurrence::ZeroOrOne => "?",
            Occurrence::ZeroOrMany => "*",
            Occurrence::OneOrMany => "+",
        }
    }
}

impl fmt::Display for Occurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Occurrence::ExactlyOne => "exactly one",
            Occurrence::ZeroOrOne => "zero or one",
            Occurrence::ZeroOrMany => "zero or more",
            Occurrence::OneOrMany => "one or more",
        })
    }
}

/// A node test such as `element(para)`, `attribute(*, xs:ID)` or `schema-element(chapter)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeKindTest {
    /// `None` for `node()`.
    pub kind: Option<NodeKind>,
    pub name: Option<QualifiedName>,
    pub schema_type: Option<QualifiedName>,
    /// Set for `schema-element` and `schema-attribute`, whose name refers to a declaration.
    pub declaration: bool,
    /// The element test inside `document-node(...)`.
    pub content: Option<Box<NodeKindTest>>,
}

impl NodeKindTest {
    pub fn kind(kind: Option<NodeKind>) -> Self {
        Self {
            kind,
            name: None,
            schema_type: None,
            declaration: false,
            content: None,
        }
    }

    pub fn named(kind: NodeKind, name: QualifiedName) -> Self {
        Self {
            name: Some(name),
            ..Self::kind(Some(kind))
        }
    }
}

impl fmt::Display for NodeKindTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = match (self.kind, self.declaration) {
            (None, _) => return f.write_str("node()"),
            (Some(NodeKind::Element), true) => "schema-element",
            (Some(NodeKind::Attribute), true) => "schema-attribute",
            (Some(NodeKind::Document), _) => {
                return match &self.content {
                    Some(inner) => write!(f, "document-node({})", inner),
                    None => f.write_str("document-node()"),
                };
            }
            (Some(NodeKind::Element), false) => "element",
            (Some(NodeKind::Attribute), false) => "attribute",
            (Some(NodeKind::Text), _) => "text",
            (Some(NodeKind::Comment), _) => "comment",
            (Some(NodeKind::ProcessingInstruction), _) => "processing-instruction",
            (Some(NodeKind::Namespace), _) => "namespace-node",
        };
        write!(f, "{}(", keyword)?;
        match (&self.name, &self.schema_type) {
            (Some(name), Some(ty)) => write!(f, "{}, {}", name, ty)?,
            (Some(name), None) => write!(f, "{}", name)?,
            (None, Some(ty)) => write!(f, "*, {}", ty)?,
            (None, None) => {}
        }
        f.write_str(")")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionTest {
    AnyFunction,
    Typed {
        params: Vec<SequenceTypeSpec>,
        return_type: Box<SequenceTypeSpec>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemTest {
    Item,
    EmptySequence,
    Atomic(AtomicType),
    Node(NodeKindTest),
    Function(FunctionTest),
    Map {
        key: Option<AtomicType>,
        value: Option<Box<SequenceTypeSpec>>,
    },
    Array {
        member: Option<Box<SequenceTypeSpec>>,
    },
}

impl fmt::Display for ItemTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemTest::Item => f.write_str("item()"),
            ItemTest::EmptySequence => f.write_str("empty-sequence()"),
            ItemTest::Atomic(t) => write!(f, "{}", t),
            ItemTest::Node(test) => write!(f, "{}", test),
            ItemTest::Function(FunctionTest::AnyFunction) => f.write_str("function(*)"),
            ItemTest::Function(FunctionTest::Typed {
                params,
                return_type,
            }) => {
                let params: Vec<String> = params.iter().map(ToString::to_string).collect();
                write!(f, "function({}) as {}", params.join(", "), return_type)
            }
            ItemTest::Map {
                key: Some(key),
                value: Some(value),
            } => write!(f, "map({}, {})", key, value),
            ItemTest::Map { .. } => f.write_str("map(*)"),
            ItemTest::Array {
                member: Some(member),
            } => write!(f, "array({})", member),
            ItemTest::Array { member: None } => f.write_str("array(*)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceTypeSpec {
    pub item_test: ItemTest,
    pub occurrence: Occurrence,
}

impl SequenceTypeSpec {
    pub fn new(item_test: ItemTest, occurrence: Occurrence) -> Self {
        Self {
            item_test,
            occurrence,
        }
    }

    pub fn one(item_test: ItemTest) -> Self {
        Self::new(item_test, Occurrence::ExactlyOne)
    }

    pub fn empty() -> Self {
        Self::new(ItemTest::EmptySequence, Occurrence::ZeroOrOne)
    }

    /// `item()*`, which every value satisfies.
    pub fn any() -> Self {
        Self::new(ItemTest::Item, Occurrence::ZeroOrMany)
    }

    pub fn allows_count(&self, count: usize) -> bool {
        match self.item_test {
            ItemTest::EmptySequence => count == 0,
            _ => self.occurrence.allows(count),
        }
    }
}

impl fmt::Display for SequenceTypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.item_test, self.occurrence) {
            (ItemTest::EmptySequence, _) => f.write_str("empty-sequence()"),
            (ItemTest::Function(FunctionTest::Typed { .. }), occ)
                if occ != Occurrence::ExactlyOne =>
            {
                write!(f, "({}){}", self.item_test, occ.indicator())
            }
            (test, occ) => write!(f, "{}{}", test, occ.indicator()),
        }
    }
}

/// Parses sequence-type text once per distinct string.
#[derive(Debug, Default)]
pub struct TypeCache {
    namespaces: Namespaces,
    entries: HashMap<String, Arc<SequenceTypeSpec>>,
}

impl TypeCache {
    pub fn new(namespaces: Namespaces) -> Self {
        Self {
            namespaces,
            entries: HashMap::new(),
        }
    }

    pub fn parse(&mut self, text: &str) -> Result<Arc<SequenceTypeSpec>, DeclarationError> {
        let key = text.trim();
        if let Some(spec) = self.entries.get(key) {
            return Ok(Arc::clone(spec));
        }
        let spec = Arc::new(parse_sequence_type(key, &self.namespaces)?);
        self.entries.insert(key.to_string(), Arc::clone(&spec));
        Ok(spec)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// --- Parser ---

pub fn parse_sequence_type(
    text: &str,
    namespaces: &Namespaces,
) -> Result<SequenceTypeSpec, DeclarationError> {
    let parser = TypeParser {
        namespaces,
        failure: RefCell::new(None),
    };
    match parser.sequence_type(text.trim()) {
        Ok(("", spec)) => Ok(spec),
        Ok((rem, _)) => Err(DeclarationError::sequence_type(
            text,
            format!("Unparsed input remaining: '{}'", rem),
        )),
        Err(e) => {
            let message = parser.failure.take().unwrap_or_else(|| e.to_string());
            Err(DeclarationError::sequence_type(text, message))
        }
    }
}

type ParseError<'a> = nom::Err<nom::error::Error<&'a str>>;

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

fn lexical_qname(input: &str) -> IResult<&str, &str> {
    alt((
        recognize((tag("Q{"), take_while(|c| c != '}'), char('}'), ncname)),
        recognize((ncname, opt((char(':'), ncname)))),
    ))
    .parse(input)
}

fn occurrence(input: &str) -> IResult<&str, Occurrence> {
    map(
        opt(alt((
            value(Occurrence::ZeroOrOne, char('?')),
            value(Occurrence::ZeroOrMany, char('*')),
            value(Occurrence::OneOrMany, char('+')),
        ))),
        |o| o.unwrap_or(Occurrence::ExactlyOne),
    )
    .parse(input)
}

/// `keyword(`, allowing whitespace before the parenthesis.
fn open<'a>(input: &'a str, keyword: &str) -> IResult<&'a str, ()> {
    let (input, _) = tag(keyword).parse(input)?;
    let (input, _) = ws(char('(')).parse(input)?;
    Ok((input, ()))
}

fn close(input: &str) -> IResult<&str, ()> {
    value((), ws(char(')'))).parse(input)
}

fn wildcard_call<'a>(input: &'a str, keyword: &str) -> IResult<&'a str, ()> {
    let (input, _) = open(input, keyword)?;
    let (input, _) = ws(char('*')).parse(input)?;
    close(input)
}

/// Turns a recoverable error into `None` so the caller can try the next alternative.
fn attempt<'a, T>(result: IResult<&'a str, T>) -> Result<Option<(&'a str, T)>, ParseError<'a>> {
    match result {
        Ok(ok) => Ok(Some(ok)),
        Err(nom::Err::Error(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Types whose presence in a node test places no constraint on the annotation.
fn is_unconstraining_type(name: &QualifiedName) -> bool {
    name.is_in(XS_NAMESPACE)
        && matches!(
            name.local.as_str(),
            "anyType" | "anySimpleType" | "untyped" | "untypedAtomic"
        )
}

struct TypeParser<'n> {
    namespaces: &'n Namespaces,
    failure: RefCell<Option<String>>,
}

impl TypeParser<'_> {
    fn fail<'a>(&self, input: &'a str, message: String) -> ParseError<'a> {
        self.failure.replace(Some(message));
        nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Verify))
    }

    fn resolve<'a>(
        &self,
        input: &'a str,
        lexical: &str,
        use_default: bool,
    ) -> Result<QualifiedName, ParseError<'a>> {
        self.namespaces
            .resolve(lexical, use_default)
            .map_err(|e| self.fail(input, e.to_string()))
    }

    fn sequence_type<'a>(&self, input: &'a str) -> IResult<&'a str, SequenceTypeSpec> {
        let (input, _) = multispace0(input)?;
        if let Some((input, _)) = attempt(open(input, "empty-sequence"))? {
            let (input, _) = close(input)?;
            return Ok((input, SequenceTypeSpec::empty()));
        }
        let (input, item_test) = self.item_type(input)?;
        let (input, occurrence) = ws(occurrence).parse(input)?;
        Ok((input, SequenceTypeSpec::new(item_test, occurrence)))
    }

    fn item_type<'a>(&self, input: &'a str) -> IResult<&'a str, ItemTest> {
        if let Some((input, _)) = attempt(open(input, "item"))? {
            let (input, _) = close(input)?;
            return Ok((input, ItemTest::Item));
        }
        if let Some((input, test)) = attempt(self.kind_test(input))? {
            return Ok((input, ItemTest::Node(test)));
        }
        if let Some((input, test)) = attempt(self.function_test(input))? {
            return Ok((input, ItemTest::Function(test)));
        }
        if let Some(found) = attempt(self.map_test(input))? {
            return Ok(found);
        }
        if let Some(found) = attempt(self.array_test(input))? {
            return Ok(found);
        }
        if let Some((input, _)) = attempt(ws(char('(')).parse(input))? {
            let (input, inner) = self.item_type(input)?;
            let (input, _) = close(input)?;
            return Ok((input, inner));
        }
        let (rest, lexical) = lexical_qname(input)?;
        Ok((rest, ItemTest::Atomic(self.atomic_type(input, lexical)?)))
    }

    fn atomic_type<'a>(&self, input: &'a str, lexical: &str) -> Result<AtomicType, ParseError<'a>> {
        let name = self.resolve(input, lexical, false)?;
        AtomicType::from_name(&name)
            .ok_or_else(|| self.fail(input, format!("Unknown atomic type '{}'", lexical)))
    }

    fn kind_test<'a>(&self, input: &'a str) -> IResult<&'a str, NodeKindTest> {
        if let Some((input, _)) = attempt(open(input, "document-node"))? {
            let (input, inner) = match attempt(open(input, "element"))? {
                Some((input, _)) => {
                    let (input, test) = self.element_like(input, NodeKind::Element)?;
                    (input, Some(test))
                }
                None => match attempt(open(input, "schema-element"))? {
                    Some((input, _)) => {
                        let (input, test) = self.schema_declaration(input, NodeKind::Element)?;
                        (input, Some(test))
                    }
                    None => (input, None),
                },
            };
            let (input, _) = close(input)?;
            let mut test = NodeKindTest::kind(Some(NodeKind::Document));
            test.content = inner.map(Box::new);
            return Ok((input, test));
        }
        if let Some((input, _)) = attempt(open(input, "element"))? {
            return self.element_like(input, NodeKind::Element);
        }
        if let Some((input, _)) = attempt(open(input, "attribute"))? {
            return self.element_like(input, NodeKind::Attribute);
        }
        if let Some((input, _)) = attempt(open(input, "schema-element"))? {
            return self.schema_declaration(input, NodeKind::Element);
        }
        if let Some((input, _)) = attempt(open(input, "schema-attribute"))? {
            return self.schema_declaration(input, NodeKind::Attribute);
        }
        if let Some((input, _)) = attempt(open(input, "processing-instruction"))? {
            let quoted = alt((
                delimited(char('"'), take_while(|c| c != '"'), char('"')),
                delimited(char('\''), take_while(|c| c != '\''), char('\'')),
            ));
            let (input, target) = opt(ws(alt((ncname, quoted)))).parse(input)?;
            let (input, _) = close(input)?;
            let mut test = NodeKindTest::kind(Some(NodeKind::ProcessingInstruction));
            test.name = target.map(|t| QualifiedName::local(t.trim()));
            return Ok((input, test));
        }
        for (keyword, kind) in [
            ("comment", Some(NodeKind::Comment)),
            ("text", Some(NodeKind::Text)),
            ("namespace-node", Some(NodeKind::Namespace)),
            ("node", None),
        ] {
            if let Some((input, _)) = attempt(open(input, keyword))? {
                let (input, _) = close(input)?;
                return Ok((input, NodeKindTest::kind(kind)));
            }
        }
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        )))
    }

    /// The argument list of `element(...)` or `attribute(...)`, after the opening parenthesis.
    fn element_like<'a>(&self, input: &'a str, kind: NodeKind) -> IResult<&'a str, NodeKindTest> {
        let mut test = NodeKindTest::kind(Some(kind));
        let (input, name) = opt(alt((
            value(None, ws(char('*'))),
            map(ws(lexical_qname), Some),
        )))
        .parse(input)?;
        let mut input = input;
        if let Some(name) = name {
            if let Some(lexical) = name {
                test.name = Some(self.resolve(input, lexical, kind == NodeKind::Element)?);
            }
            let (rest, type_name) = opt(preceded(ws(char(',')), ws(lexical_qname))).parse(input)?;
            if let Some(lexical) = type_name {
                let type_name = self.resolve(rest, lexical, false)?;
                if !is_unconstraining_type(&type_name) {
                    test.schema_type = Some(type_name);
                }
            }
            let (rest, _) = opt(ws(char('?'))).parse(rest)?;
            input = rest;
        }
        let (input, _) = close(input)?;
        Ok((input, test))
    }

    fn schema_declaration<'a>(
        &self,
        input: &'a str,
        kind: NodeKind,
    ) -> IResult<&'a str, NodeKindTest> {
        let (rest, lexical) = ws(lexical_qname).parse(input)?;
        let name = self.resolve(input, lexical, kind == NodeKind::Element)?;
        let (rest, _) = close(rest)?;
        let mut test = NodeKindTest::named(kind, name);
        test.declaration = true;
        Ok((rest, test))
    }

    fn function_test<'a>(&self, input: &'a str) -> IResult<&'a str, FunctionTest> {
        if let Some((input, _)) = attempt(wildcard_call(input, "function"))? {
            return Ok((input, FunctionTest::AnyFunction));
        }
        let (input, _) = open(input, "function")?;
        let (input, params) =
            separated_list0(ws(char(',')), |i| self.sequence_type(i)).parse(input)?;
        let (input, _) = close(input)?;
        let (input, _) = ws(tag("as")).parse(input)?;
        let (input, return_type) = self.sequence_type(input)?;
        Ok((
            input,
            FunctionTest::Typed {
                params,
                return_type: Box::new(return_type),
            },
        ))
    }

    fn map_test<'a>(&self, input: &'a str) -> IResult<&'a str, ItemTest> {
        if let Some((input, _)) = attempt(wildcard_call(input, "map"))? {
            return Ok((input, ItemTest::Map {
                key: None,
                value: None,
            }));
        }
        let (input, _) = open(input, "map")?;
        let (rest, lexical) = ws(lexical_qname).parse(input)?;
        let key = self.atomic_type(input, lexical)?;
        let (rest, _) = ws(char(',')).parse(rest)?;
        let (rest, value) = self.sequence_type(rest)?;
        let (rest, _) = close(rest)?;
        Ok((rest, ItemTest::Map {
            key: Some(key),
            value: Some(Box::new(value)),
        }))
    }

    fn array_test<'a>(&self, input: &'a str) -> IResult<&'a str, ItemTest> {
        if let Some((input, _)) = attempt(wildcard_call(input, "array"))? {
            return Ok((input, ItemTest::Array { member: None }));
        }
        let (input, _) = open(input, "array")?;
        let (input, member) = self.sequence_type(input)?;
        let (input, _) = close(input)?;
        Ok((input, ItemTest::Array {
            member: Some(Box::new(member)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> SequenceTypeSpec {
        parse_sequence_type(text, &Namespaces::new().bind("p", "urn:p")).unwrap()
    }

    #[test]
    fn test_atomic_and_occurrence() {
        let spec = parse("xs:integer+");
        assert_eq!(spec.item_test, ItemTest::Atomic(AtomicType::Integer));
        assert_eq!(spec.occurrence, Occurrence::OneOrMany);
        assert_eq!(parse(" xs:string ? ").occurrence, Occurrence::ZeroOrOne);
        assert_eq!(parse("item()*"), SequenceTypeSpec::any());
        assert_eq!(parse("empty-sequence()"), SequenceTypeSpec::empty());
    }

    #[test]
    fn test_node_tests() {
        let spec = parse("element(p:para, xs:string)?");
        let ItemTest::Node(test) = spec.item_test else {
            panic!("expected a node test");
        };
        assert_eq!(test.kind, Some(NodeKind::Element));
        assert_eq!(test.name, Some(QualifiedName::new(Some("urn:p"), "para")));
        assert_eq!(test.schema_type, Some(QualifiedName::xs("string")));

        let doc = parse("document-node(element(book))");
        let ItemTest::Node(test) = doc.item_test else {
            panic!("expected a node test");
        };
        assert_eq!(test.kind, Some(NodeKind::Document));
        assert_eq!(test.content.unwrap().name, Some(QualifiedName::local("book")));

        let any = parse("element(*, xs:anyType)");
        assert_eq!(any.item_test, ItemTest::Node(NodeKindTest::kind(Some(NodeKind::Element))));
        assert_eq!(parse("node()*").item_test, ItemTest::Node(NodeKindTest::kind(None)));
        assert!(matches!(
            parse("schema-element(p:chapter)").item_test,
            ItemTest::Node(NodeKindTest { declaration: true, .. })
        ));
        let pi = parse("processing-instruction('xml-stylesheet')");
        assert!(matches!(pi.item_test, ItemTest::Node(NodeKindTest { name: Some(_), .. })));
    }

    #[test]
    fn test_function_map_array() {
        assert_eq!(
            parse("function(*)").item_test,
            ItemTest::Function(FunctionTest::AnyFunction)
        );
        let typed = parse("function(xs:string, item()*) as xs:boolean");
        let ItemTest::Function(FunctionTest::Typed { params, return_type }) = typed.item_test
        else {
            panic!("expected a typed function test");
        };
        assert_eq!(params.len(), 2);
        assert_eq!(return_type.item_test, ItemTest::Atomic(AtomicType::Boolean));

        let map = parse("map(xs:string, xs:integer*)");
        assert!(matches!(map.item_test, ItemTest::Map { key: Some(AtomicType::String), .. }));
        assert!(matches!(parse("array(*)").item_test, ItemTest::Array { member: None }));
        assert!(matches!(parse("(array(xs:double))+").item_test, ItemTest::Array { member: Some(_) }));
    }

    #[test]
    fn test_parse_errors() {
        let ns = Namespaces::new();
        let unknown = parse_sequence_type("xs:integr", &ns).unwrap_err();
        assert!(unknown.to_string().contains("Unknown atomic type"), "{}", unknown);
        let unbound = parse_sequence_type("element(q:x)", &ns).unwrap_err();
        assert!(unbound.to_string().contains("q"), "{}", unbound);
        assert!(parse_sequence_type("xs:string xs:integer", &ns).is_err());
        assert!(parse_sequence_type("element(a", &ns).is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for text in ["xs:integer*", "element(para)?", "map(*)", "function(xs:string) as item()"] {
            assert_eq!(parse(text).to_string(), text);
        }
    }

    #[test]
    fn test_cache_parses_each_text_once() {
        let mut cache = TypeCache::default();
        let a = cache.parse("xs:date?").unwrap();
        let b = cache.parse("  xs:date? ").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        assert!(cache.parse("xs:nope").is_err());
        assert_eq!(cache.len(), 1);
    }
}
