//! Template rule dispatch: selecting the best rule for an item in a mode, invoking it with
//! its parameters bound, falling back to the built-in rules, plus `next_match`,
//! `call_template` and `for_each` on top of the same machinery.

use crate::context::{ActiveRule, EvaluationContext, Frame};
use crate::engine::Engine;
use crate::error::{DeclarationError, DeclarationSite, DispatchError, EngineError};
use crate::rules::{OnNoMatch, RuleEntry, TemplateRule};
use crate::sort::SortKey;
use crate::traits::{BodyExecutor, BodyRef};
use indexmap::IndexMap;
use quire_xdm::{Item, NodeKind, QualifiedName};

/// Parameters passed to an invocation. Tunnel parameters reach every rule further down the
/// call chain, regular ones only the rule invoked directly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    regular: IndexMap<QualifiedName, Item>,
    tunnel: IndexMap<QualifiedName, Item>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: QualifiedName, value: impl Into<Item>) -> Self {
        self.regular.insert(name, value.into());
        self
    }

    pub fn with_tunnel(mut self, name: QualifiedName, value: impl Into<Item>) -> Self {
        self.tunnel.insert(name, value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.regular.is_empty() && self.tunnel.is_empty()
    }
}

/// The rule chosen for an item: its id and the rank of the matching entry in its mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMatch {
    pub rule_id: usize,
    pub rank: usize,
}

/// Where the next invocation happens: the focus it gets and what it receives.
struct Invocation<'p> {
    position: usize,
    size: usize,
    mode: Option<&'p QualifiedName>,
    params: &'p IndexMap<QualifiedName, Item>,
    tunnel: &'p IndexMap<QualifiedName, Item>,
}

impl Engine<'_> {
    /// Applies templates in `mode` to every item of `select`, sorted by `sort` if given.
    pub fn apply_templates(
        &self,
        select: Item,
        mode: Option<&QualifiedName>,
        params: &Params,
        sort: &[SortKey],
        ctx: &mut EvaluationContext,
        exec: &mut dyn BodyExecutor,
    ) -> Result<(), EngineError> {
        let items = self.sort_items(select.flatten(), sort, ctx)?;
        let tunnel = merged_tunnel(ctx, params);
        let size = items.len();
        for (i, item) in items.into_iter().enumerate() {
            let invocation = Invocation {
                position: i + 1,
                size,
                mode,
                params: &params.regular,
                tunnel: &tunnel,
            };
            self.apply_one(item, &invocation, ctx, exec)?;
        }
        Ok(())
    }

    /// Finds and runs the best rule for `item` in `mode`. A sequence is processed item by
    /// item.
    pub fn dispatch(
        &self,
        item: Item,
        mode: Option<&QualifiedName>,
        ctx: &mut EvaluationContext,
        exec: &mut dyn BodyExecutor,
    ) -> Result<(), EngineError> {
        self.apply_templates(item, mode, &Params::default(), &[], ctx, exec)
    }

    /// The best-ranked rule whose pattern matches `item` in `mode`, if any.
    pub fn find_rule(
        &self,
        item: &Item,
        mode: Option<&QualifiedName>,
        ctx: &mut EvaluationContext,
    ) -> Result<Option<RuleMatch>, EngineError> {
        self.best_match(item, mode, None, ctx)
    }

    /// Invokes the next rule below the current one in rank order that matches the current
    /// item, or the built-in rule when none is left.
    pub fn next_match(
        &self,
        params: &Params,
        ctx: &mut EvaluationContext,
        exec: &mut dyn BodyExecutor,
    ) -> Result<(), EngineError> {
        let active = ctx.current_rule().cloned().ok_or(DispatchError::NoCurrentRule)?;
        let rank = active.rank.ok_or(DispatchError::NoCurrentRule)?;
        let item = ctx.context_item().cloned().ok_or(DispatchError::NoCurrentRule)?;
        let tunnel = merged_tunnel(ctx, params);
        let invocation = Invocation {
            position: ctx.position(),
            size: ctx.size(),
            mode: active.mode.as_ref(),
            params: &params.regular,
            tunnel: &tunnel,
        };
        log::trace!(
            "next-match from {} for {}",
            self.rule(active.rule_id)?.describe(),
            self.describe_item(&item)
        );
        match self.best_match(&item, invocation.mode, Some((rank, active.rule_id)), ctx)? {
            Some(found) => self.invoke_rule(found, item, &invocation, ctx, exec),
            None => self.apply_builtin(item, &invocation, ctx, exec),
        }
    }

    /// Invokes a named template. The caller's focus and mode stay in effect.
    pub fn call_template(
        &self,
        name: &QualifiedName,
        params: &Params,
        ctx: &mut EvaluationContext,
        exec: &mut dyn BodyExecutor,
    ) -> Result<(), EngineError> {
        let rule_id = self
            .rules()
            .named_template(name)
            .ok_or_else(|| DeclarationError::UnknownTemplate(name.clone()))?;
        let rule = self.rule(rule_id)?;
        let tunnel = merged_tunnel(ctx, params);
        log::trace!("Calling {}", rule.describe());
        let frame = Frame::named_template(rule_id).with_tunnel_params(tunnel.clone());
        ctx.scoped(frame, |ctx| {
            self.bind_params(rule, &params.regular, &tunnel, ctx)?;
            exec.execute(rule.body, self, ctx)
        })
    }

    /// Runs `body` once per item of `select`, with the item as focus.
    pub fn for_each(
        &self,
        select: Item,
        sort: &[SortKey],
        body: BodyRef,
        ctx: &mut EvaluationContext,
        exec: &mut dyn BodyExecutor,
    ) -> Result<(), EngineError> {
        let items = self.sort_items(select.flatten(), sort, ctx)?;
        let size = items.len();
        for (i, item) in items.into_iter().enumerate() {
            ctx.scoped(Frame::iteration(item, i + 1, size), |ctx| {
                exec.execute(body, self, ctx)
            })?;
        }
        Ok(())
    }

    fn apply_one(
        &self,
        item: Item,
        invocation: &Invocation<'_>,
        ctx: &mut EvaluationContext,
        exec: &mut dyn BodyExecutor,
    ) -> Result<(), EngineError> {
        match self.best_match(&item, invocation.mode, None, ctx)? {
            Some(found) => self.invoke_rule(found, item, invocation, ctx, exec),
            None => self.apply_builtin(item, invocation, ctx, exec),
        }
    }

    /// Scans the mode's candidates in rank order. `after` skips everything ranked at or
    /// above a given entry as well as every entry of the rule it belongs to.
    fn best_match(
        &self,
        item: &Item,
        mode: Option<&QualifiedName>,
        after: Option<(usize, usize)>,
        ctx: &mut EvaluationContext,
    ) -> Result<Option<RuleMatch>, EngineError> {
        let Some(mode_rules) = self.rules().mode(mode) else {
            return Ok(None);
        };
        let mut winner: Option<(RuleMatch, &RuleEntry)> = None;
        for rank in mode_rules.candidates(item, self.forest()) {
            let Some(entry) = mode_rules.entry(rank) else {
                continue;
            };
            if let Some((after_rank, current)) = after {
                if rank <= after_rank || entry.rule_id == current {
                    continue;
                }
            }
            if let Some((found, best)) = &winner {
                if !best.ties_with(entry) {
                    break;
                }
                if entry.rule_id == found.rule_id || !self.entry_matches(entry, item, ctx)? {
                    continue;
                }
                let first = self.rule(found.rule_id)?.describe();
                let second = self.rule(entry.rule_id)?.describe();
                if self.config().strict {
                    return Err(DispatchError::Ambiguous {
                        item: self.describe_item(item),
                        first,
                        second,
                    }
                    .into());
                }
                log::warn!(
                    "Ambiguous rule match for {}: {} and {} share the same rank, using {}",
                    self.describe_item(item),
                    first,
                    second,
                    first
                );
                break;
            }
            if self.entry_matches(entry, item, ctx)? {
                winner = Some((RuleMatch { rule_id: entry.rule_id, rank }, entry));
            }
        }
        Ok(winner.map(|(found, _)| found))
    }

    fn entry_matches(
        &self,
        entry: &RuleEntry,
        item: &Item,
        ctx: &mut EvaluationContext,
    ) -> Result<bool, EngineError> {
        let rule = self.rule(entry.rule_id)?;
        match rule
            .pattern
            .as_ref()
            .and_then(|p| p.alternatives().get(entry.alternative))
        {
            Some(path) => path.matches(item, ctx, self.forest(), self.evaluator()),
            None => Ok(false),
        }
    }

    fn invoke_rule(
        &self,
        found: RuleMatch,
        item: Item,
        invocation: &Invocation<'_>,
        ctx: &mut EvaluationContext,
        exec: &mut dyn BodyExecutor,
    ) -> Result<(), EngineError> {
        let rule = self.rule(found.rule_id)?;
        log::trace!("Applying {} to {}", rule.describe(), self.describe_item(&item));
        let active = ActiveRule {
            rule_id: found.rule_id,
            mode: invocation.mode.cloned(),
            rank: Some(found.rank),
        };
        let frame = Frame::rule(item, invocation.position, invocation.size, active)
            .with_tunnel_params(invocation.tunnel.clone());
        ctx.scoped(frame, |ctx| {
            self.bind_params(rule, invocation.params, invocation.tunnel, ctx)?;
            exec.execute(rule.body, self, ctx)
        })
    }

    /// Binds every declared parameter in the rule's frame. Undeclared parameters are
    /// ignored; absent optional ones take their default.
    fn bind_params(
        &self,
        rule: &TemplateRule,
        params: &IndexMap<QualifiedName, Item>,
        tunnel: &IndexMap<QualifiedName, Item>,
        ctx: &mut EvaluationContext,
    ) -> Result<(), EngineError> {
        for (index, decl) in rule.params.iter().enumerate() {
            let supplied = if decl.tunnel {
                tunnel.get(&decl.name)
            } else {
                params.get(&decl.name)
            };
            let value = match (supplied, decl.default) {
                (Some(value), _) => value.clone(),
                (None, _) if decl.required => {
                    return Err(DispatchError::MissingParameter {
                        rule: rule.describe(),
                        name: decl.name.clone(),
                    }
                    .into());
                }
                (None, Some(expr)) => self.evaluate(expr, ctx)?,
                (None, None) if decl.as_type.is_some() => Item::empty(),
                (None, None) => Item::from(""),
            };
            let value = match &decl.as_type {
                Some(spec) => self.validate_and_cast(
                    value,
                    spec,
                    &DeclarationSite::Parameter {
                        index: index + 1,
                        name: decl.name.clone(),
                    },
                )?,
                None => value,
            };
            ctx.set_variable(decl.name.clone(), value);
        }
        Ok(())
    }

    /// The built-in rules: documents and elements recurse into their children in the same
    /// mode, text and attribute nodes contribute their string value, other nodes nothing.
    /// The mode's on-no-match declaration can narrow this further.
    fn apply_builtin(
        &self,
        item: Item,
        invocation: &Invocation<'_>,
        ctx: &mut EvaluationContext,
        exec: &mut dyn BodyExecutor,
    ) -> Result<(), EngineError> {
        let no_match = || -> EngineError {
            DispatchError::NoMatchingRule {
                item: self.describe_item(&item),
                mode: invocation.mode.cloned(),
            }
            .into()
        };
        let Some(node) = item.as_node() else {
            return Err(no_match());
        };
        let on_no_match = self.rules().mode_declaration(invocation.mode).on_no_match;
        if on_no_match == OnNoMatch::Fail {
            return Err(no_match());
        }
        let kind = match item {
            Item::Fragment(_) => NodeKind::Document,
            _ => self.forest().kind(node),
        };
        match kind {
            NodeKind::Document | NodeKind::Element => {
                if on_no_match == OnNoMatch::DeepSkip {
                    return Ok(());
                }
                let children: Vec<Item> = self.forest().children(node).map(Item::Node).collect();
                let size = children.len();
                let frame = Frame::focus(item.clone(), invocation.position, invocation.size);
                ctx.scoped(frame, |ctx| {
                    for (i, child) in children.into_iter().enumerate() {
                        let nested = Invocation {
                            position: i + 1,
                            size,
                            ..*invocation
                        };
                        self.apply_one(child, &nested, ctx, exec)?;
                    }
                    Ok(())
                })
            }
            NodeKind::Text | NodeKind::Attribute if on_no_match == OnNoMatch::TextOnlyCopy => {
                exec.add_text(&self.forest().string_value(node))
            }
            _ => Ok(()),
        }
    }
}

fn merged_tunnel(ctx: &EvaluationContext, params: &Params) -> IndexMap<QualifiedName, Item> {
    let mut tunnel = ctx.tunnel_params();
    for (name, value) in &params.tunnel {
        tunnel.insert(name.clone(), value.clone());
    }
    tunnel
}
