//! The evaluation context: a stack of frames recording the focus, variable bindings and
//! group state active at each level of nested execution.
//!
//! Frames are only ever entered through [`EvaluationContext::scoped`], which pops the frame
//! again on every exit path, so a failing body can never leave the stack unbalanced.

use crate::error::{DeclarationError, EngineError, ResourceGuardError};
use crate::grouping::{GroupState, NormalizedKey};
use indexmap::IndexMap;
use quire_xdm::{Item, QualifiedName};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// The bottom frame, holding global variables and the initial focus.
    Root,
    /// Body of a template rule or named template.
    Rule,
    /// One group of a grouping construct.
    Group,
    /// One item of a for-each style iteration.
    Iteration,
    /// A nested variable scope that keeps the focus of its parent.
    Local,
}

/// The template rule whose body is executing.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveRule {
    pub rule_id: usize,
    pub mode: Option<QualifiedName>,
    /// Position of the matched entry in the mode's ranked entry list, or `None` for a
    /// named-template invocation.
    pub rank: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Frame {
    kind: FrameKind,
    item: Option<Item>,
    position: usize,
    size: usize,
    mode: Option<QualifiedName>,
    group: Option<GroupState>,
    variables: IndexMap<QualifiedName, Item>,
    tunnel: IndexMap<QualifiedName, Item>,
    rule: Option<ActiveRule>,
}

impl Frame {
    fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            item: None,
            position: 0,
            size: 0,
            mode: None,
            group: None,
            variables: IndexMap::new(),
            tunnel: IndexMap::new(),
            rule: None,
        }
    }

    /// Frame for a rule body. `item` becomes the context item at `position` of `size`.
    pub fn rule(item: Item, position: usize, size: usize, rule: ActiveRule) -> Self {
        Self {
            item: Some(item),
            position,
            size,
            mode: rule.mode.clone(),
            rule: Some(rule),
            ..Self::new(FrameKind::Rule)
        }
    }

    /// Frame for a named template, which keeps the caller's focus and mode.
    pub fn named_template(rule_id: usize) -> Self {
        Self {
            rule: Some(ActiveRule {
                rule_id,
                mode: None,
                rank: None,
            }),
            ..Self::new(FrameKind::Rule)
        }
    }

    pub fn group(state: GroupState) -> Self {
        Self {
            item: state.members.first().cloned(),
            position: state.group_position,
            size: state.group_count,
            group: Some(state),
            ..Self::new(FrameKind::Group)
        }
    }

    pub fn iteration(item: Item, position: usize, size: usize) -> Self {
        Self {
            item: Some(item),
            position,
            size,
            ..Self::new(FrameKind::Iteration)
        }
    }

    pub fn local() -> Self {
        Self::new(FrameKind::Local)
    }

    /// A focus-only frame for evaluating a key or predicate against `item`.
    pub fn focus(item: Item, position: usize, size: usize) -> Self {
        Self {
            item: Some(item),
            position,
            size,
            ..Self::new(FrameKind::Local)
        }
    }

    pub fn with_variable(mut self, name: QualifiedName, value: Item) -> Self {
        self.variables.insert(name, value);
        self
    }

    pub fn with_tunnel_params(mut self, tunnel: IndexMap<QualifiedName, Item>) -> Self {
        self.tunnel = tunnel;
        self
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }
}

#[derive(Debug, Clone)]
pub struct EvaluationContext {
    frames: Vec<Frame>,
    max_depth: usize,
}

impl EvaluationContext {
    pub fn new(max_depth: usize) -> Self {
        Self {
            frames: vec![Frame::new(FrameKind::Root)],
            max_depth,
        }
    }

    /// Sets the initial focus on the root frame.
    pub fn with_context_item(mut self, item: Item) -> Self {
        if let Some(root) = self.frames.first_mut() {
            root.item = Some(item);
            root.position = 1;
            root.size = 1;
        }
        self
    }

    pub fn with_initial_mode(mut self, mode: Option<QualifiedName>) -> Self {
        if let Some(root) = self.frames.first_mut() {
            root.mode = mode;
        }
        self
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Runs `f` with `frame` pushed, popping it afterwards whether `f` succeeds or fails.
    pub fn scoped<T>(
        &mut self,
        frame: Frame,
        f: impl FnOnce(&mut Self) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        if self.frames.len() >= self.max_depth {
            return Err(ResourceGuardError::TooDeep {
                limit: self.max_depth,
            }
            .into());
        }
        let mark = self.frames.len();
        self.frames.push(frame);
        let result = f(self);
        self.frames.truncate(mark);
        result
    }

    fn top_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn focus_frame(&self) -> Option<&Frame> {
        self.frames.iter().rev().find(|f| f.item.is_some())
    }

    pub fn context_item(&self) -> Option<&Item> {
        self.focus_frame().and_then(|f| f.item.as_ref())
    }

    pub fn position(&self) -> usize {
        self.focus_frame().map_or(0, |f| f.position)
    }

    pub fn size(&self) -> usize {
        self.focus_frame().map_or(0, |f| f.size)
    }

    /// The active mode: that of the innermost rule body, or the initial mode.
    pub fn mode(&self) -> Option<&QualifiedName> {
        self.frames
            .iter()
            .rev()
            .find(|f| matches!(f.kind, FrameKind::Root) || f.rule.as_ref().is_some_and(|r| r.rank.is_some()))
            .and_then(|f| f.mode.as_ref())
    }

    /// Binds a variable in the innermost frame, shadowing any outer binding.
    pub fn set_variable(&mut self, name: QualifiedName, value: Item) {
        self.top_mut().variables.insert(name, value);
    }

    pub fn set_global(&mut self, name: QualifiedName, value: Item) {
        self.frames[0].variables.insert(name, value);
    }

    /// Looks a variable up through the frames of the current rule body, then the globals.
    /// Bindings of a calling rule are not visible.
    pub fn variable(&self, name: &QualifiedName) -> Option<&Item> {
        for frame in self.frames.iter().rev() {
            if let Some(value) = frame.variables.get(name) {
                return Some(value);
            }
            if frame.kind == FrameKind::Rule {
                break;
            }
        }
        self.frames[0].variables.get(name)
    }

    /// Tunnel parameters received by the innermost rule body.
    pub fn tunnel_params(&self) -> IndexMap<QualifiedName, Item> {
        self.frames
            .iter()
            .rev()
            .find(|f| f.kind == FrameKind::Rule)
            .map(|f| f.tunnel.clone())
            .unwrap_or_default()
    }

    fn group_frame(&self) -> Result<&GroupState, DeclarationError> {
        for frame in self.frames.iter().rev() {
            match frame.kind {
                FrameKind::Group => {
                    return frame.group.as_ref().ok_or(DeclarationError::NoCurrentGroup);
                }
                FrameKind::Rule | FrameKind::Root => break,
                _ => {}
            }
        }
        Err(DeclarationError::NoCurrentGroup)
    }

    pub fn current_group(&self) -> Result<&GroupState, DeclarationError> {
        self.group_frame()
    }

    pub fn current_grouping_key(&self) -> Result<Option<&NormalizedKey>, DeclarationError> {
        self.group_frame().map(|g| g.grouping_key.as_ref())
    }

    /// The template rule whose body is executing, if the focus is still the one the rule
    /// was invoked with. Iterations and groups inside a body clear it.
    pub fn current_rule(&self) -> Option<&ActiveRule> {
        for frame in self.frames.iter().rev() {
            match frame.kind {
                FrameKind::Rule => return frame.rule.as_ref(),
                FrameKind::Iteration | FrameKind::Group | FrameKind::Root => return None,
                FrameKind::Local => {}
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TypeError;

    fn name(s: &str) -> QualifiedName {
        QualifiedName::local(s)
    }

    fn rule(id: usize) -> ActiveRule {
        ActiveRule {
            rule_id: id,
            mode: None,
            rank: Some(0),
        }
    }

    #[test]
    fn test_scoped_restores_on_error() {
        let mut ctx = EvaluationContext::new(16);
        let result: Result<(), EngineError> = ctx.scoped(Frame::local(), |ctx| {
            ctx.set_variable(name("x"), Item::from(1));
            ctx.scoped(Frame::iteration(Item::from(2), 1, 1), |_| {
                Err(TypeError::mismatch(&crate::error::DeclarationSite::GroupingKey, "a", "b").into())
            })
        });
        assert!(result.is_err());
        assert_eq!(ctx.depth(), 1);
        assert!(ctx.variable(&name("x")).is_none());
    }

    #[test]
    fn test_depth_guard() {
        fn nest(ctx: &mut EvaluationContext) -> Result<(), EngineError> {
            ctx.scoped(Frame::local(), nest)
        }
        let mut ctx = EvaluationContext::new(8);
        let err = nest(&mut ctx).unwrap_err();
        assert_eq!(err, EngineError::ResourceGuard(ResourceGuardError::TooDeep { limit: 8 }));
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn test_variables_do_not_leak_into_called_rules() {
        let mut ctx = EvaluationContext::new(16);
        ctx.set_global(name("g"), Item::from("global"));
        ctx.scoped(Frame::rule(Item::from(1), 1, 1, rule(0)), |ctx| {
            ctx.set_variable(name("local"), Item::from(1));
            ctx.scoped(Frame::local(), |ctx| {
                assert!(ctx.variable(&name("local")).is_some());
                Ok(())
            })?;
            ctx.scoped(Frame::rule(Item::from(2), 1, 1, rule(1)), |ctx| {
                assert!(ctx.variable(&name("local")).is_none());
                assert_eq!(ctx.variable(&name("g")), Some(&Item::from("global")));
                assert_eq!(ctx.context_item(), Some(&Item::from(2)));
                Ok(())
            })
        })
        .unwrap();
    }

    #[test]
    fn test_local_frames_keep_focus() {
        let mut ctx = EvaluationContext::new(16).with_context_item(Item::from("root"));
        ctx.scoped(Frame::iteration(Item::from("a"), 2, 5), |ctx| {
            ctx.scoped(Frame::local(), |ctx| {
                assert_eq!(ctx.context_item(), Some(&Item::from("a")));
                assert_eq!((ctx.position(), ctx.size()), (2, 5));
                Ok(())
            })
        })
        .unwrap();
        assert_eq!(ctx.position(), 1);
    }

    #[test]
    fn test_current_group_is_hidden_by_rule_frames() {
        let state = GroupState {
            grouping_key: Some(NormalizedKey::Boolean(true)),
            key_value: None,
            members: vec![Item::from(1)],
            group_position: 1,
            group_count: 1,
        };
        let mut ctx = EvaluationContext::new(16);
        assert!(ctx.current_group().is_err());
        ctx.scoped(Frame::group(state), |ctx| {
            assert_eq!(ctx.current_group()?.members.len(), 1);
            ctx.scoped(Frame::iteration(Item::from(1), 1, 1), |ctx| {
                assert!(ctx.current_grouping_key()?.is_some());
                Ok(())
            })?;
            ctx.scoped(Frame::rule(Item::from(1), 1, 1, rule(0)), |ctx| {
                assert_eq!(ctx.current_group().unwrap_err(), DeclarationError::NoCurrentGroup);
                Ok(())
            })
        })
        .unwrap();
    }

    #[test]
    fn test_current_rule_cleared_by_iteration() {
        let mut ctx = EvaluationContext::new(16);
        ctx.scoped(Frame::rule(Item::from(1), 1, 1, rule(3)), |ctx| {
            assert_eq!(ctx.current_rule().map(|r| r.rule_id), Some(3));
            ctx.scoped(Frame::iteration(Item::from(1), 1, 1), |ctx| {
                assert!(ctx.current_rule().is_none());
                Ok(())
            })
        })
        .unwrap();
    }
}
