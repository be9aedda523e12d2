//! Data model for the quire rule engine.
//!
//! Items, atomic values with their lexical casting rules, qualified names and the
//! arena-backed source tree that rules are matched against.

pub mod array;
pub mod atomic;
pub mod error;
pub mod function;
pub mod item;
pub mod map;
pub mod node;
pub mod qname;
pub mod temporal;
pub mod types;

pub use array::XdmArray;
pub use atomic::AtomicValue;
pub use error::XdmError;
pub use function::FunctionItem;
pub use item::Item;
pub use map::XdmMap;
pub use node::{Forest, NodeKind, NodeRef, Tree, TreeBuilder};
pub use qname::{Namespaces, QualifiedName};
pub use types::AtomicType;
