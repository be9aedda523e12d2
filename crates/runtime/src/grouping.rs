//! Partitioning of a sequence into groups by key or by pattern, and the group state the
//! evaluation context exposes to group bodies.

use crate::collation::Collation;
use crate::context::{EvaluationContext, Frame};
use crate::engine::Engine;
use crate::error::{DeclarationError, DeclarationSite, EngineError, TypeError};
use crate::pattern::Pattern;
use crate::seqtype::Occurrence;
use crate::sort::SortKey;
use crate::traits::{BodyExecutor, BodyRef, ExprHandle};
use indexmap::IndexMap;
use quire_xdm::{AtomicValue, Item};

/// A grouping key reduced to a form with the equality grouping needs: strings by their
/// collation key, numbers by value, everything else by its own equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NormalizedKey {
    String(String),
    /// Bit pattern of the value with `-0` folded into `0` and every NaN made canonical, so
    /// that all NaN keys fall into one group.
    Double(u64),
    Boolean(bool),
    Opaque(AtomicValue),
    Composite(Vec<NormalizedKey>),
}

impl NormalizedKey {
    pub fn double(value: f64) -> Self {
        let value = if value.is_nan() {
            f64::NAN
        } else if value == 0.0 {
            0.0
        } else {
            value
        };
        NormalizedKey::Double(value.to_bits())
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            NormalizedKey::Double(bits) => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }

    pub fn normalize(value: &AtomicValue, collation: &Collation) -> Self {
        match value {
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => {
                NormalizedKey::String(collation.key(s))
            }
            AtomicValue::Boolean(b) => NormalizedKey::Boolean(*b),
            v if v.is_numeric() => NormalizedKey::double(v.to_double()),
            other => NormalizedKey::Opaque(other.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupState {
    /// `None` for pattern-based grouping.
    pub grouping_key: Option<NormalizedKey>,
    /// The key as evaluated for the group's first member.
    pub key_value: Option<Item>,
    pub members: Vec<Item>,
    pub group_position: usize,
    pub group_count: usize,
}

impl GroupState {
    fn new(grouping_key: Option<NormalizedKey>, key_value: Option<Item>, first: Item) -> Self {
        Self {
            grouping_key,
            key_value,
            members: vec![first],
            group_position: 0,
            group_count: 0,
        }
    }

    /// The group as a single item, for binding to a variable.
    pub fn members_item(&self) -> Item {
        Item::from_items(self.members.clone())
    }
}

#[derive(Debug, Clone)]
pub enum GroupingStrategy {
    By { key: ExprHandle, composite: bool },
    Adjacent { key: ExprHandle, composite: bool },
    StartingWith(Pattern),
    EndingWith(Pattern),
}

impl GroupingStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            GroupingStrategy::By { .. } => "group-by",
            GroupingStrategy::Adjacent { .. } => "group-adjacent",
            GroupingStrategy::StartingWith(_) => "group-starting-with",
            GroupingStrategy::EndingWith(_) => "group-ending-with",
        }
    }
}

/// The grouping attributes of a construct as declared, before a strategy is chosen.
#[derive(Debug, Clone, Default)]
pub struct GroupingDeclaration {
    pub group_by: Option<ExprHandle>,
    pub group_adjacent: Option<ExprHandle>,
    pub group_starting_with: Option<Pattern>,
    pub group_ending_with: Option<Pattern>,
    pub composite: bool,
    pub collation: Option<String>,
}

/// A validated grouping: exactly one strategy plus the collation its string keys use.
#[derive(Debug, Clone)]
pub struct Grouping {
    pub strategy: GroupingStrategy,
    pub collation: Collation,
}

impl Grouping {
    pub fn new(strategy: GroupingStrategy) -> Self {
        Self {
            strategy,
            collation: Collation::Codepoint,
        }
    }

    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = collation;
        self
    }
}

impl GroupingDeclaration {
    pub fn into_grouping(self, default_collation: &str) -> Result<Grouping, DeclarationError> {
        let mut strategies = Vec::new();
        if let Some(key) = self.group_by {
            strategies.push(GroupingStrategy::By {
                key,
                composite: self.composite,
            });
        }
        if let Some(key) = self.group_adjacent {
            strategies.push(GroupingStrategy::Adjacent {
                key,
                composite: self.composite,
            });
        }
        if let Some(pattern) = self.group_starting_with {
            strategies.push(GroupingStrategy::StartingWith(pattern));
        }
        if let Some(pattern) = self.group_ending_with {
            strategies.push(GroupingStrategy::EndingWith(pattern));
        }
        if strategies.len() != 1 {
            return Err(DeclarationError::GroupingStrategy(
                strategies.iter().map(|s| s.label().to_string()).collect(),
            ));
        }
        let collation = Collation::from_uri(self.collation.as_deref().unwrap_or(default_collation))?;
        let strategy = strategies.remove(0);
        Ok(Grouping {
            strategy,
            collation,
        })
    }
}

impl Engine<'_> {
    /// Partitions `source` into groups. Positions and counts are assigned in the order
    /// returned.
    pub fn group(
        &self,
        source: Item,
        grouping: &Grouping,
        ctx: &mut EvaluationContext,
    ) -> Result<Vec<GroupState>, EngineError> {
        let items = source.flatten();
        let total = items.len();
        let mut groups = match &grouping.strategy {
            GroupingStrategy::By { key, composite } => {
                self.group_by(items, *key, *composite, &grouping.collation, ctx)?
            }
            GroupingStrategy::Adjacent { key, composite } => {
                self.group_adjacent(items, *key, *composite, &grouping.collation, ctx)?
            }
            GroupingStrategy::StartingWith(pattern) => self.group_starting_with(items, pattern, ctx)?,
            GroupingStrategy::EndingWith(pattern) => self.group_ending_with(items, pattern, ctx)?,
        };
        let count = groups.len();
        for (i, group) in groups.iter_mut().enumerate() {
            group.group_position = i + 1;
            group.group_count = count;
        }
        log::debug!(
            "{} formed {} groups from {} items",
            grouping.strategy.label(),
            count,
            total
        );
        Ok(groups)
    }

    /// Runs `body` once per group, after sorting the groups when `sort` is non-empty.
    pub fn run_groups(
        &self,
        groups: Vec<GroupState>,
        sort: &[SortKey],
        body: BodyRef,
        ctx: &mut EvaluationContext,
        exec: &mut dyn BodyExecutor,
    ) -> Result<(), EngineError> {
        let groups = if sort.is_empty() {
            groups
        } else {
            self.sort_by_keys(groups, sort, ctx, |group, _, _| Frame::group(group.clone()))?
        };
        let count = groups.len();
        for (i, mut group) in groups.into_iter().enumerate() {
            group.group_position = i + 1;
            group.group_count = count;
            ctx.scoped(Frame::group(group), |ctx| exec.execute(body, self, ctx))?;
        }
        Ok(())
    }

    pub fn for_each_group(
        &self,
        source: Item,
        grouping: &Grouping,
        sort: &[SortKey],
        body: BodyRef,
        ctx: &mut EvaluationContext,
        exec: &mut dyn BodyExecutor,
    ) -> Result<(), EngineError> {
        let groups = self.group(source, grouping, ctx)?;
        self.run_groups(groups, sort, body, ctx, exec)
    }

    fn grouping_key_values(
        &self,
        key: ExprHandle,
        item: &Item,
        position: usize,
        size: usize,
        ctx: &mut EvaluationContext,
    ) -> Result<(Item, Vec<AtomicValue>), EngineError> {
        let value = ctx.scoped(Frame::focus(item.clone(), position, size), |ctx| {
            self.evaluate(key, ctx)
        })?;
        let atoms = value.atomize(self.forest())?;
        Ok((value, atoms))
    }

    fn group_by(
        &self,
        items: Vec<Item>,
        key: ExprHandle,
        composite: bool,
        collation: &Collation,
        ctx: &mut EvaluationContext,
    ) -> Result<Vec<GroupState>, EngineError> {
        let size = items.len();
        let mut groups: IndexMap<NormalizedKey, GroupState> = IndexMap::new();
        for (i, item) in items.into_iter().enumerate() {
            let (value, atoms) = self.grouping_key_values(key, &item, i + 1, size, ctx)?;
            if composite {
                let normalized = NormalizedKey::Composite(
                    atoms.iter().map(|a| NormalizedKey::normalize(a, collation)).collect(),
                );
                add_to_group(&mut groups, normalized, value, item);
                continue;
            }
            if atoms.is_empty() {
                log::trace!("Item {} has an empty grouping key and joins no group", i + 1);
                continue;
            }
            let mut joined: Vec<NormalizedKey> = Vec::with_capacity(atoms.len());
            for atom in atoms {
                let normalized = NormalizedKey::normalize(&atom, collation);
                if joined.contains(&normalized) {
                    continue;
                }
                joined.push(normalized.clone());
                add_to_group(&mut groups, normalized, Item::Atomic(atom), item.clone());
            }
        }
        let mut groups: Vec<GroupState> = groups.into_values().collect();
        let firsts: Option<Vec<_>> = groups.iter().map(|g| g.members[0].as_node()).collect();
        if firsts.is_some() {
            let forest = self.forest();
            groups.sort_by(|a, b| match (a.members[0].as_node(), b.members[0].as_node()) {
                (Some(x), Some(y)) => forest.compare_order(x, y),
                _ => std::cmp::Ordering::Equal,
            });
        }
        Ok(groups)
    }

    fn group_adjacent(
        &self,
        items: Vec<Item>,
        key: ExprHandle,
        composite: bool,
        collation: &Collation,
        ctx: &mut EvaluationContext,
    ) -> Result<Vec<GroupState>, EngineError> {
        let size = items.len();
        let mut groups: Vec<GroupState> = Vec::new();
        for (i, item) in items.into_iter().enumerate() {
            let (value, atoms) = self.grouping_key_values(key, &item, i + 1, size, ctx)?;
            let normalized = if composite {
                NormalizedKey::Composite(
                    atoms.iter().map(|a| NormalizedKey::normalize(a, collation)).collect(),
                )
            } else {
                if atoms.len() != 1 {
                    return Err(TypeError::Cardinality {
                        site: DeclarationSite::GroupingKey,
                        expected: Occurrence::ExactlyOne,
                        actual: atoms.len(),
                    }
                    .into());
                }
                NormalizedKey::normalize(&atoms[0], collation)
            };
            match groups.last_mut() {
                Some(last) if last.grouping_key.as_ref() == Some(&normalized) => {
                    last.members.push(item);
                }
                _ => groups.push(GroupState::new(Some(normalized), Some(value), item)),
            }
        }
        Ok(groups)
    }

    fn group_starting_with(
        &self,
        items: Vec<Item>,
        pattern: &Pattern,
        ctx: &mut EvaluationContext,
    ) -> Result<Vec<GroupState>, EngineError> {
        let mut groups: Vec<GroupState> = Vec::new();
        for item in items {
            if pattern.matches(&item, ctx, self.forest(), self.evaluator())? {
                groups.push(GroupState::new(None, None, item));
            } else if let Some(last) = groups.last_mut() {
                last.members.push(item);
            } else {
                log::trace!("Dropping {} before the first group start", item.kind_name());
            }
        }
        Ok(groups)
    }

    /// Mirror of [`Self::group_starting_with`]: scans from the end so that items after
    /// the last matching item are the ones dropped.
    fn group_ending_with(
        &self,
        items: Vec<Item>,
        pattern: &Pattern,
        ctx: &mut EvaluationContext,
    ) -> Result<Vec<GroupState>, EngineError> {
        let mut groups: Vec<GroupState> = Vec::new();
        for item in items.into_iter().rev() {
            if pattern.matches(&item, ctx, self.forest(), self.evaluator())? {
                groups.push(GroupState::new(None, None, item));
            } else if let Some(last) = groups.last_mut() {
                last.members.push(item);
            } else {
                log::trace!("Dropping {} after the last group end", item.kind_name());
            }
        }
        groups.reverse();
        for group in &mut groups {
            group.members.reverse();
        }
        Ok(groups)
    }
}

fn add_to_group(
    groups: &mut IndexMap<NormalizedKey, GroupState>,
    key: NormalizedKey,
    value: Item,
    item: Item,
) {
    match groups.get_mut(&key) {
        Some(group) => group.members.push(item),
        None => {
            let state = GroupState::new(Some(key.clone()), Some(value), item);
            groups.insert(key, state);
        }
    }
}
