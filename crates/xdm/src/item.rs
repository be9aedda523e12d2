//! The value universe: a tagged union over every kind of item the engine handles.

use crate::array::XdmArray;
use crate::atomic::AtomicValue;
use crate::error::XdmError;
use crate::function::FunctionItem;
use crate::map::XdmMap;
use crate::node::{Forest, NodeRef};

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Node(NodeRef),
    Atomic(AtomicValue),
    Sequence(Vec<Item>),
    Map(XdmMap),
    Array(XdmArray),
    Function(FunctionItem),
    /// The document node of a temporary tree built by a variable or parameter body.
    Fragment(NodeRef),
}

impl Item {
    pub fn empty() -> Self {
        Item::Sequence(Vec::new())
    }

    /// Builds a value from a list of items, flattening nested sequences. A single item is
    /// returned as itself rather than as a one-item sequence.
    pub fn from_items(items: Vec<Item>) -> Self {
        let mut flat = Vec::with_capacity(items.len());
        for item in items {
            item.flatten_into(&mut flat);
        }
        if flat.len() == 1 {
            flat.pop().unwrap_or_else(Item::empty)
        } else {
            Item::Sequence(flat)
        }
    }

    fn flatten_into(self, out: &mut Vec<Item>) {
        match self {
            Item::Sequence(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
            other => out.push(other),
        }
    }

    /// The individual items of this value, with nested sequences flattened.
    pub fn flatten(self) -> Vec<Item> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    pub fn len(&self) -> usize {
        match self {
            Item::Sequence(items) => items.iter().map(Item::len).sum(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_node(&self) -> Option<NodeRef> {
        match self {
            Item::Node(n) | Item::Fragment(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_atomic(&self) -> Option<&AtomicValue> {
        match self {
            Item::Atomic(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_node(&self) -> bool {
        self.as_node().is_some()
    }

    /// Short description of the value's kind, used in diagnostics.
    pub fn kind_name(&self) -> String {
        match self {
            Item::Node(_) => "node()".to_string(),
            Item::Fragment(_) => "document-node()".to_string(),
            Item::Atomic(a) => a.type_name(),
            Item::Sequence(items) if items.is_empty() => "empty-sequence()".to_string(),
            Item::Sequence(_) => "item()*".to_string(),
            Item::Map(_) => "map(*)".to_string(),
            Item::Array(_) => "array(*)".to_string(),
            Item::Function(f) => format!("function({})", f.arity),
        }
    }

    pub fn string_value(&self, forest: &Forest) -> String {
        match self {
            Item::Node(n) | Item::Fragment(n) => forest.string_value(*n),
            Item::Atomic(a) => a.to_string_value(),
            Item::Sequence(items) => items
                .iter()
                .map(|i| i.string_value(forest))
                .collect::<Vec<_>>()
                .join(" "),
            Item::Array(array) => array
                .members()
                .iter()
                .map(|i| i.string_value(forest))
                .collect::<Vec<_>>()
                .join(" "),
            Item::Map(_) | Item::Function(_) => String::new(),
        }
    }

    /// Atomization: nodes yield their string value as `xs:untypedAtomic`, arrays yield
    /// their atomized members. Maps and functions cannot be atomized.
    pub fn atomize(&self, forest: &Forest) -> Result<Vec<AtomicValue>, XdmError> {
        let mut out = Vec::new();
        self.atomize_into(forest, &mut out)?;
        Ok(out)
    }

    fn atomize_into(&self, forest: &Forest, out: &mut Vec<AtomicValue>) -> Result<(), XdmError> {
        match self {
            Item::Node(n) | Item::Fragment(n) => {
                out.push(AtomicValue::UntypedAtomic(forest.string_value(*n)))
            }
            Item::Atomic(a) => out.push(a.clone()),
            Item::Sequence(items) => {
                for item in items {
                    item.atomize_into(forest, out)?;
                }
            }
            Item::Array(array) => {
                for member in array.members() {
                    member.atomize_into(forest, out)?;
                }
            }
            Item::Map(_) | Item::Function(_) => {
                return Err(XdmError::invalid_cast(self.kind_name(), "xs:anyAtomicType"));
            }
        }
        Ok(())
    }

    pub fn effective_boolean_value(&self) -> Result<bool, XdmError> {
        match self {
            Item::Node(_) | Item::Fragment(_) => Ok(true),
            Item::Atomic(a) => a.to_boolean(),
            Item::Sequence(items) => match items.as_slice() {
                [] => Ok(false),
                [single] => single.effective_boolean_value(),
                [first, ..] if first.is_node() => Ok(true),
                _ => Err(XdmError::NoEffectiveBooleanValue(
                    "sequence of two or more atomic values".to_string(),
                )),
            },
            Item::Map(_) | Item::Array(_) | Item::Function(_) => {
                Err(XdmError::NoEffectiveBooleanValue(self.kind_name()))
            }
        }
    }
}

impl From<AtomicValue> for Item {
    fn from(value: AtomicValue) -> Self {
        Item::Atomic(value)
    }
}

impl From<NodeRef> for Item {
    fn from(node: NodeRef) -> Self {
        Item::Node(node)
    }
}

impl From<&str> for Item {
    fn from(value: &str) -> Self {
        Item::Atomic(AtomicValue::from(value))
    }
}

impl From<String> for Item {
    fn from(value: String) -> Self {
        Item::Atomic(AtomicValue::from(value))
    }
}

impl From<i64> for Item {
    fn from(value: i64) -> Self {
        Item::Atomic(AtomicValue::Integer(value))
    }
}

impl From<i32> for Item {
    fn from(value: i32) -> Self {
        Item::Atomic(AtomicValue::Integer(i64::from(value)))
    }
}

impl From<f64> for Item {
    fn from(value: f64) -> Self {
        Item::Atomic(AtomicValue::Double(value))
    }
}

impl From<bool> for Item {
    fn from(value: bool) -> Self {
        Item::Atomic(AtomicValue::Boolean(value))
    }
}

impl From<Vec<Item>> for Item {
    fn from(items: Vec<Item>) -> Self {
        Item::from_items(items)
    }
}
