//! Interfaces to the collaborators the engine delegates to: the expression layer, the
//! body executor of the surrounding processor and an optional schema validator.

use crate::context::EvaluationContext;
use crate::engine::Engine;
use crate::error::EngineError;
use quire_xdm::{Forest, Item, QualifiedName};

/// A compiled expression owned by the expression layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprHandle(pub usize);

/// The body of a rule or construct, owned by the body executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyRef(pub usize);

pub trait Evaluator {
    /// Evaluates `expr` against the focus and variables of `ctx`.
    fn evaluate(
        &self,
        expr: ExprHandle,
        ctx: &EvaluationContext,
        forest: &Forest,
    ) -> Result<Item, EngineError>;
}

/// Turns expression text found in patterns into handles the [`Evaluator`] understands.
pub trait ExpressionCompiler {
    fn compile(&mut self, source: &str) -> Result<ExprHandle, EngineError>;
}

pub trait BodyExecutor {
    /// Runs `body` against `ctx`. The executor may call back into `engine`.
    fn execute(
        &mut self,
        body: BodyRef,
        engine: &Engine<'_>,
        ctx: &mut EvaluationContext,
    ) -> Result<(), EngineError>;

    /// Appends text to the current output, as the built-in rules for text and attribute
    /// nodes do.
    fn add_text(&mut self, text: &str) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaTarget {
    Type(QualifiedName),
    Element(QualifiedName),
    Attribute(QualifiedName),
}

impl std::fmt::Display for SchemaTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaTarget::Type(name) => write!(f, "type {}", name),
            SchemaTarget::Element(name) => write!(f, "element declaration {}", name),
            SchemaTarget::Attribute(name) => write!(f, "attribute declaration {}", name),
        }
    }
}

pub trait SchemaValidator {
    fn validate(&self, markup: &str, target: &SchemaTarget) -> bool;
}
