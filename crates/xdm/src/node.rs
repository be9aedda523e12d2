//! Arena-backed source trees.
//!
//! Every tree lives in a [`Forest`] and every node is addressed by a [`NodeRef`], a pair
//! of integer indices. Parent, child and attribute links are indices into the owning
//! tree's arena. Trees are built in document order (an element is followed by its
//! attributes, then its descendants), so comparing two handles compares document order.

use crate::error::XdmError;
use crate::qname::QualifiedName;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesPI, BytesStart, BytesText, Event};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    tree: u32,
    index: u32,
}

impl NodeRef {
    fn new(tree: usize, index: usize) -> Self {
        Self {
            tree: tree as u32,
            index: index as u32,
        }
    }

    fn at(self, index: u32) -> Self {
        Self {
            tree: self.tree,
            index,
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.tree, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Namespace,
}

impl NodeKind {
    pub fn test_name(self) -> &'static str {
        match self {
            NodeKind::Document => "document-node()",
            NodeKind::Element => "element()",
            NodeKind::Attribute => "attribute()",
            NodeKind::Text => "text()",
            NodeKind::Comment => "comment()",
            NodeKind::ProcessingInstruction => "processing-instruction()",
            NodeKind::Namespace => "namespace-node()",
        }
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    name: Option<QualifiedName>,
    value: String,
    parent: Option<u32>,
    children: Vec<u32>,
    attributes: Vec<u32>,
    type_annotation: Option<QualifiedName>,
}

impl NodeData {
    fn new(kind: NodeKind, name: Option<QualifiedName>, value: String, parent: Option<u32>) -> Self {
        Self {
            kind,
            name,
            value,
            parent,
            children: Vec::new(),
            attributes: Vec::new(),
            type_annotation: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<NodeData>,
    temporary: bool,
}

impl Tree {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Builds a [`Tree`] in document order.
#[derive(Debug)]
pub struct TreeBuilder {
    nodes: Vec<NodeData>,
    open: Vec<u32>,
    temporary: bool,
}

impl TreeBuilder {
    /// A source document rooted at a document node.
    pub fn document() -> Self {
        Self::rooted(false)
    }

    /// A temporary tree, as produced by a variable with a content body.
    pub fn fragment() -> Self {
        Self::rooted(true)
    }

    fn rooted(temporary: bool) -> Self {
        Self {
            nodes: vec![NodeData::new(NodeKind::Document, None, String::new(), None)],
            open: vec![0],
            temporary,
        }
    }

    fn current(&self) -> u32 {
        self.open.last().copied().unwrap_or(0)
    }

    fn push_child(&mut self, kind: NodeKind, name: Option<QualifiedName>, value: String) -> u32 {
        let parent = self.current();
        let index = self.nodes.len() as u32;
        self.nodes.push(NodeData::new(kind, name, value, Some(parent)));
        self.nodes[parent as usize].children.push(index);
        index
    }

    pub fn start_element<S: Into<String>>(
        &mut self,
        name: QualifiedName,
        attributes: impl IntoIterator<Item = (QualifiedName, S)>,
    ) -> &mut Self {
        let element = self.push_child(NodeKind::Element, Some(name), String::new());
        for (attr_name, value) in attributes {
            let index = self.nodes.len() as u32;
            self.nodes.push(NodeData::new(
                NodeKind::Attribute,
                Some(attr_name),
                value.into(),
                Some(element),
            ));
            self.nodes[element as usize].attributes.push(index);
        }
        self.open.push(element);
        self
    }

    pub fn end_element(&mut self) -> &mut Self {
        if self.open.len() > 1 {
            self.open.pop();
        }
        self
    }

    /// Shorthand for an element holding a single text node.
    pub fn text_element(&mut self, name: QualifiedName, text: impl Into<String>) -> &mut Self {
        self.start_element(name, Vec::<(QualifiedName, String)>::new())
            .text(text)
            .end_element()
    }

    pub fn empty_element(&mut self, name: QualifiedName) -> &mut Self {
        self.start_element(name, Vec::<(QualifiedName, String)>::new())
            .end_element()
    }

    pub fn text(&mut self, text: impl Into<String>) -> &mut Self {
        self.push_child(NodeKind::Text, None, text.into());
        self
    }

    pub fn comment(&mut self, text: impl Into<String>) -> &mut Self {
        self.push_child(NodeKind::Comment, None, text.into());
        self
    }

    pub fn processing_instruction(
        &mut self,
        target: impl Into<String>,
        data: impl Into<String>,
    ) -> &mut Self {
        self.push_child(
            NodeKind::ProcessingInstruction,
            Some(QualifiedName::local(target)),
            data.into(),
        );
        self
    }

    pub fn finish(self) -> Tree {
        Tree {
            nodes: self.nodes,
            temporary: self.temporary,
        }
    }
}

/// The set of trees visible to one transformation.
#[derive(Debug, Clone, Default)]
pub struct Forest {
    trees: Vec<Tree>,
}

impl Forest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tree and returns the handle of its document node.
    pub fn add_tree(&mut self, tree: Tree) -> NodeRef {
        self.trees.push(tree);
        NodeRef::new(self.trees.len() - 1, 0)
    }

    /// Parses `xml` into a new tree and returns its document node.
    pub fn load_xml(&mut self, xml: &str) -> Result<NodeRef, XdmError> {
        let doc = roxmltree::Document::parse(xml)?;
        let mut builder = TreeBuilder::document();
        for child in doc.root().children() {
            append_xml_node(&mut builder, child);
        }
        Ok(self.add_tree(builder.finish()))
    }

    fn data(&self, node: NodeRef) -> &NodeData {
        &self.trees[node.tree as usize].nodes[node.index as usize]
    }

    pub fn contains(&self, node: NodeRef) -> bool {
        self.trees
            .get(node.tree as usize)
            .is_some_and(|t| (node.index as usize) < t.nodes.len())
    }

    pub fn kind(&self, node: NodeRef) -> NodeKind {
        self.data(node).kind
    }

    pub fn name(&self, node: NodeRef) -> Option<&QualifiedName> {
        self.data(node).name.as_ref()
    }

    pub fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.data(node).parent.map(|p| node.at(p))
    }

    pub fn children(&self, node: NodeRef) -> impl Iterator<Item = NodeRef> + '_ {
        self.data(node).children.iter().map(move |&c| node.at(c))
    }

    pub fn attributes(&self, node: NodeRef) -> impl Iterator<Item = NodeRef> + '_ {
        self.data(node).attributes.iter().map(move |&a| node.at(a))
    }

    pub fn attribute(&self, node: NodeRef, name: &QualifiedName) -> Option<NodeRef> {
        self.attributes(node).find(|&a| self.name(a) == Some(name))
    }

    pub fn root(&self, node: NodeRef) -> NodeRef {
        node.at(0)
    }

    pub fn is_temporary(&self, node: NodeRef) -> bool {
        self.trees[node.tree as usize].temporary
    }

    pub fn type_annotation(&self, node: NodeRef) -> Option<&QualifiedName> {
        self.data(node).type_annotation.as_ref()
    }

    /// Records the type assigned to `node` by schema validation.
    pub fn annotate(&mut self, node: NodeRef, type_name: QualifiedName) -> Result<(), XdmError> {
        let tree = self
            .trees
            .get_mut(node.tree as usize)
            .ok_or_else(|| XdmError::UnknownNode(node.to_string()))?;
        let data = tree
            .nodes
            .get_mut(node.index as usize)
            .ok_or_else(|| XdmError::UnknownNode(node.to_string()))?;
        data.type_annotation = Some(type_name);
        Ok(())
    }

    /// Document order. Nodes of different trees order by the order the trees were added.
    pub fn compare_order(&self, a: NodeRef, b: NodeRef) -> Ordering {
        a.cmp(&b)
    }

    pub fn string_value(&self, node: NodeRef) -> String {
        let data = self.data(node);
        match data.kind {
            NodeKind::Document | NodeKind::Element => {
                let mut out = String::new();
                let mut stack: Vec<u32> = data.children.iter().rev().copied().collect();
                let tree = &self.trees[node.tree as usize];
                while let Some(index) = stack.pop() {
                    let child = &tree.nodes[index as usize];
                    match child.kind {
                        NodeKind::Text => out.push_str(&child.value),
                        NodeKind::Element => stack.extend(child.children.iter().rev().copied()),
                        _ => {}
                    }
                }
                out
            }
            _ => data.value.clone(),
        }
    }

    /// Position of `node` among the children of its parent that satisfy `filter`, 1-based.
    pub fn sibling_position(&self, node: NodeRef, filter: impl Fn(NodeRef) -> bool) -> usize {
        match self.parent(node) {
            Some(parent) if self.kind(node) != NodeKind::Attribute => self
                .children(parent)
                .filter(|&c| filter(c))
                .position(|c| c == node)
                .map_or(1, |p| p + 1),
            _ => 1,
        }
    }

    /// Serializes the subtree rooted at `node` as XML markup.
    pub fn serialize(&self, node: NodeRef) -> Result<String, XdmError> {
        let data = self.data(node);
        match data.kind {
            NodeKind::Attribute | NodeKind::Namespace => return Ok(data.value.clone()),
            NodeKind::Text => {
                let mut writer = Writer::new(Vec::new());
                writer
                    .write_event(Event::Text(BytesText::new(&data.value)))
                    .map_err(|e| XdmError::serialize(e.to_string()))?;
                return String::from_utf8(writer.into_inner())
                    .map_err(|e| XdmError::serialize(e.to_string()));
            }
            _ => {}
        }
        let mut writer = Writer::new(Vec::new());
        let mut scopes: Vec<(Option<String>, String)> = Vec::new();
        self.write_node(&mut writer, node, &mut scopes)?;
        String::from_utf8(writer.into_inner()).map_err(|e| XdmError::serialize(e.to_string()))
    }

    fn write_node(
        &self,
        writer: &mut Writer<Vec<u8>>,
        node: NodeRef,
        scopes: &mut Vec<(Option<String>, String)>,
    ) -> Result<(), XdmError> {
        let data = self.data(node);
        let write = |writer: &mut Writer<Vec<u8>>, event: Event<'_>| {
            writer
                .write_event(event)
                .map_err(|e| XdmError::serialize(e.to_string()))
        };
        match data.kind {
            NodeKind::Document => {
                for child in self.children(node) {
                    self.write_node(writer, child, scopes)?;
                }
            }
            NodeKind::Element => {
                let Some(name) = data.name.as_ref() else {
                    return Ok(());
                };
                let tag = lexical_name(name);
                let mut start = BytesStart::new(tag.clone());
                let scope_mark = scopes.len();
                let ns = name.namespace.clone().unwrap_or_default();
                let in_scope = scopes
                    .iter()
                    .rev()
                    .find(|(p, _)| *p == name.prefix)
                    .map(|(_, uri)| uri.as_str());
                if in_scope.unwrap_or("") != ns {
                    let attr = match &name.prefix {
                        Some(p) => format!("xmlns:{}", p),
                        None => "xmlns".to_string(),
                    };
                    start.push_attribute((attr.as_str(), ns.as_str()));
                    scopes.push((name.prefix.clone(), ns));
                }
                for attr in self.attributes(node) {
                    let attr_data = self.data(attr);
                    if let Some(attr_name) = attr_data.name.as_ref() {
                        let attr_tag = lexical_name(attr_name);
                        start.push_attribute((attr_tag.as_str(), attr_data.value.as_str()));
                    }
                }
                if data.children.is_empty() {
                    write(writer, Event::Empty(start))?;
                } else {
                    write(writer, Event::Start(start))?;
                    for child in self.children(node) {
                        self.write_node(writer, child, scopes)?;
                    }
                    write(writer, Event::End(BytesEnd::new(tag)))?;
                }
                scopes.truncate(scope_mark);
            }
            NodeKind::Text => write(writer, Event::Text(BytesText::new(&data.value)))?,
            NodeKind::Comment => write(writer, Event::Comment(BytesText::from_escaped(data.value.as_str())))?,
            NodeKind::ProcessingInstruction => {
                let target = data.name.as_ref().map(|n| n.local.as_str()).unwrap_or("");
                let content = if data.value.is_empty() {
                    target.to_string()
                } else {
                    format!("{} {}", target, data.value)
                };
                write(writer, Event::PI(BytesPI::new(content)))?;
            }
            NodeKind::Attribute | NodeKind::Namespace => {}
        }
        Ok(())
    }
}

fn lexical_name(name: &QualifiedName) -> String {
    match &name.prefix {
        Some(p) => format!("{}:{}", p, name.local),
        None => name.local.clone(),
    }
}

fn xml_name(node: &roxmltree::Node<'_, '_>, namespace: Option<&str>, local: &str) -> QualifiedName {
    let name = QualifiedName::new(namespace, local);
    match namespace.and_then(|ns| node.lookup_prefix(ns)) {
        Some(prefix) if !prefix.is_empty() => name.with_prefix(prefix),
        _ => name,
    }
}

fn append_xml_node(builder: &mut TreeBuilder, node: roxmltree::Node<'_, '_>) {
    match node.node_type() {
        roxmltree::NodeType::Element => {
            let tag = node.tag_name();
            let name = xml_name(&node, tag.namespace(), tag.name());
            let attributes: Vec<(QualifiedName, String)> = node
                .attributes()
                .map(|a| (xml_name(&node, a.namespace(), a.name()), a.value().to_string()))
                .collect();
            builder.start_element(name, attributes);
            for child in node.children() {
                append_xml_node(builder, child);
            }
            builder.end_element();
        }
        roxmltree::NodeType::Text => {
            builder.text(node.text().unwrap_or_default());
        }
        roxmltree::NodeType::Comment => {
            builder.comment(node.text().unwrap_or_default());
        }
        roxmltree::NodeType::PI => {
            if let Some(pi) = node.pi() {
                builder.processing_instruction(pi.target, pi.value.unwrap_or_default());
            }
        }
        roxmltree::NodeType::Root => {}
    }
}
