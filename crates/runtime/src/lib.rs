//! # quire-runtime
//!
//! Run-time core of a template-rule processor: everything that happens between "here is an
//! item and a mode" and "this rule body runs with these bindings".
//!
//! ## Features
//!
//! - **Rule dispatch**: ranked rule selection per mode with default priorities, union
//!   patterns split into alternatives, built-in rules and on-no-match modes
//! - **Invocation**: `next_match`, named templates, regular and tunnel parameters
//! - **Grouping**: `group-by`, `group-adjacent`, `group-starting-with` and
//!   `group-ending-with`, with collation-aware and composite keys
//! - **Sorting**: stable multi-key sorts for template application, iteration and groups
//! - **Sequence types**: a cached parser for declared types and a cast service that
//!   validates and converts values against them
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use quire_runtime::{BodyRef, Engine, Pattern, RuleTable, TemplateRule};
//! use quire_xdm::{Forest, Item, Namespaces};
//!
//! let mut forest = Forest::new();
//! let doc = forest.load_xml("<chapter><para>Hello</para></chapter>")?;
//!
//! let pattern = Pattern::parse("chapter/para", &Namespaces::new(), &mut compiler)?;
//! let rules = RuleTable::builder()
//!     .rule(TemplateRule::matching(pattern, BodyRef(0)))
//!     .build()?;
//!
//! let engine = Engine::new(&rules, &forest, &evaluator);
//! let mut ctx = engine.new_context();
//! engine.dispatch(Item::Node(doc), None, &mut ctx, &mut executor)?;
//! ```
//!
//! The expression layer (`Evaluator`, `ExpressionCompiler`) and the body executor
//! (`BodyExecutor`) are supplied by the caller; `test_support` has closure-backed
//! versions of both.

pub mod cast;
pub mod collation;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod grouping;
pub mod pattern;
pub mod rules;
pub mod seqtype;
pub mod sort;
pub mod traits;

#[cfg(any(test, feature = "testing"))]
pub mod test_support;

pub use cast::CastService;
pub use collation::{
    CODEPOINT_COLLATION, Collation, HTML_ASCII_CASE_INSENSITIVE_COLLATION, Strength,
    UCA_COLLATION,
};
pub use config::EngineConfig;
pub use context::{ActiveRule, EvaluationContext, Frame, FrameKind};
pub use dispatch::{Params, RuleMatch};
pub use engine::Engine;
pub use error::{
    DeclarationError, DeclarationSite, DispatchError, EngineError, ResourceGuardError,
    TypeError, ValidationError,
};
pub use grouping::{GroupState, Grouping, GroupingDeclaration, GroupingStrategy, NormalizedKey};
pub use pattern::{IndexKey, PathPattern, Pattern};
pub use rules::{
    ModeDeclaration, OnNoMatch, ParamDecl, RuleEntry, RuleTable, RuleTableBuilder, TemplateRule,
};
pub use seqtype::{
    FunctionTest, ItemTest, NodeKindTest, Occurrence, SequenceTypeSpec, TypeCache,
    parse_sequence_type,
};
pub use sort::{CaseOrder, SortDataType, SortKey, SortOrder};
pub use traits::{
    BodyExecutor, BodyRef, Evaluator, ExprHandle, ExpressionCompiler, SchemaTarget,
    SchemaValidator,
};
