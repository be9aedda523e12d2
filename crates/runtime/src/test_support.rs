//! Stand-ins for the expression layer and the body executor, for tests of code built on
//! the engine. Enabled by the `testing` feature.

use crate::context::EvaluationContext;
use crate::dispatch::Params;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::grouping::NormalizedKey;
use crate::traits::{BodyExecutor, BodyRef, Evaluator, ExprHandle, ExpressionCompiler};
use quire_xdm::{Forest, Item, QualifiedName};
use std::collections::HashMap;

type ExprFn = Box<dyn Fn(&EvaluationContext, &Forest) -> Result<Item, EngineError>>;

/// An evaluator whose expressions are Rust closures registered under their source text.
/// Compiling unknown text succeeds; evaluating it fails.
#[derive(Default)]
pub struct FnEvaluator {
    sources: Vec<String>,
    functions: Vec<Option<ExprFn>>,
}

impl FnEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `f` as the meaning of `source`, replacing any earlier definition.
    pub fn define(
        &mut self,
        source: &str,
        f: impl Fn(&EvaluationContext, &Forest) -> Result<Item, EngineError> + 'static,
    ) -> ExprHandle {
        let handle = self.intern(source);
        self.functions[handle.0] = Some(Box::new(f));
        handle
    }

    pub fn handle(&self, source: &str) -> Option<ExprHandle> {
        self.sources
            .iter()
            .position(|s| s == source)
            .map(ExprHandle)
    }

    fn intern(&mut self, source: &str) -> ExprHandle {
        if let Some(handle) = self.handle(source) {
            return handle;
        }
        self.sources.push(source.to_string());
        self.functions.push(None);
        ExprHandle(self.sources.len() - 1)
    }
}

impl ExpressionCompiler for FnEvaluator {
    fn compile(&mut self, source: &str) -> Result<ExprHandle, EngineError> {
        Ok(self.intern(source.trim()))
    }
}

impl Evaluator for FnEvaluator {
    fn evaluate(
        &self,
        expr: ExprHandle,
        ctx: &EvaluationContext,
        forest: &Forest,
    ) -> Result<Item, EngineError> {
        match self.functions.get(expr.0) {
            Some(Some(f)) => f(ctx, forest),
            _ => Err(EngineError::evaluation(format!(
                "Undefined expression '{}'",
                self.sources.get(expr.0).map_or("?", String::as_str)
            ))),
        }
    }
}

/// What a scripted body does when executed, in order.
#[derive(Debug, Clone)]
pub enum Action {
    Text(String),
    /// Append the string value of the context item.
    ValueOf,
    /// Apply templates to the children of the context node in the current mode.
    ApplyChildren,
    ApplyChildrenWith(Params),
    /// Apply templates to the context item again.
    ApplySelf,
    NextMatch,
    NextMatchWith(Params),
    CallTemplate(QualifiedName, Params),
    Fail(String),
}

/// The state a body saw when it was executed.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub body: BodyRef,
    pub item: Option<Item>,
    pub position: usize,
    pub size: usize,
    pub mode: Option<QualifiedName>,
    pub group: Option<Vec<Item>>,
    pub grouping_key: Option<NormalizedKey>,
    pub variables: Vec<(QualifiedName, Option<Item>)>,
}

impl Invocation {
    pub fn variable(&self, name: &QualifiedName) -> Option<&Item> {
        self.variables
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_ref())
    }
}

/// A body executor that records every invocation and runs per-body scripts of
/// [`Action`]s. Bodies without a script do nothing.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    scripts: HashMap<BodyRef, Vec<Action>>,
    watched: Vec<QualifiedName>,
    invocations: Vec<Invocation>,
    output: String,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, body: BodyRef, actions: Vec<Action>) -> Self {
        self.scripts.insert(body, actions);
        self
    }

    /// Records the value of `name` on every invocation.
    pub fn watch(mut self, name: QualifiedName) -> Self {
        self.watched.push(name);
        self
    }

    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    pub fn bodies(&self) -> Vec<BodyRef> {
        self.invocations.iter().map(|i| i.body).collect()
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    fn record(&mut self, body: BodyRef, ctx: &EvaluationContext) {
        let group = ctx.current_group().ok();
        let invocation = Invocation {
            body,
            item: ctx.context_item().cloned(),
            position: ctx.position(),
            size: ctx.size(),
            mode: ctx.mode().cloned(),
            group: group.map(|g| g.members.clone()),
            grouping_key: group.and_then(|g| g.grouping_key.clone()),
            variables: self
                .watched
                .iter()
                .map(|name| (name.clone(), ctx.variable(name).cloned()))
                .collect(),
        };
        self.invocations.push(invocation);
    }

    fn apply_children(
        &mut self,
        engine: &Engine<'_>,
        ctx: &mut EvaluationContext,
        params: &Params,
    ) -> Result<(), EngineError> {
        let children: Vec<Item> = match ctx.context_item().and_then(Item::as_node) {
            Some(node) => engine.forest().children(node).map(Item::Node).collect(),
            None => Vec::new(),
        };
        let mode = ctx.mode().cloned();
        engine.apply_templates(Item::from_items(children), mode.as_ref(), params, &[], ctx, self)
    }
}

impl BodyExecutor for RecordingExecutor {
    fn execute(
        &mut self,
        body: BodyRef,
        engine: &Engine<'_>,
        ctx: &mut EvaluationContext,
    ) -> Result<(), EngineError> {
        self.record(body, ctx);
        let actions = self.scripts.get(&body).cloned().unwrap_or_default();
        for action in actions {
            match action {
                Action::Text(text) => self.output.push_str(&text),
                Action::ValueOf => {
                    if let Some(item) = ctx.context_item() {
                        let text = item.string_value(engine.forest());
                        self.output.push_str(&text);
                    }
                }
                Action::ApplyChildren => self.apply_children(engine, ctx, &Params::new())?,
                Action::ApplyChildrenWith(params) => self.apply_children(engine, ctx, &params)?,
                Action::ApplySelf => {
                    let item = ctx.context_item().cloned().unwrap_or_else(Item::empty);
                    let mode = ctx.mode().cloned();
                    engine.apply_templates(item, mode.as_ref(), &Params::new(), &[], ctx, self)?;
                }
                Action::NextMatch => engine.next_match(&Params::new(), ctx, self)?,
                Action::NextMatchWith(params) => engine.next_match(&params, ctx, self)?,
                Action::CallTemplate(name, params) => {
                    engine.call_template(&name, &params, ctx, self)?
                }
                Action::Fail(message) => return Err(EngineError::evaluation(message)),
            }
        }
        Ok(())
    }

    fn add_text(&mut self, text: &str) -> Result<(), EngineError> {
        self.output.push_str(text);
        Ok(())
    }
}

/// Shorthand for an expression returning the context item.
pub fn context_item(ctx: &EvaluationContext, _: &Forest) -> Result<Item, EngineError> {
    Ok(ctx.context_item().cloned().unwrap_or_else(Item::empty))
}

/// Shorthand for an expression returning the string value of the context item.
pub fn string_value(ctx: &EvaluationContext, forest: &Forest) -> Result<Item, EngineError> {
    Ok(Item::from(
        ctx.context_item()
            .map(|item| item.string_value(forest))
            .unwrap_or_default(),
    ))
}

/// An expression returning the named attribute of the context node, or the empty sequence.
pub fn attribute(
    name: &str,
) -> impl Fn(&EvaluationContext, &Forest) -> Result<Item, EngineError> + 'static {
    let name = QualifiedName::local(name);
    move |ctx, forest| {
        Ok(ctx
            .context_item()
            .and_then(Item::as_node)
            .and_then(|node| forest.attribute(node, &name))
            .map_or_else(Item::empty, Item::Node))
    }
}
