mod common;

use common::{child_at, element_children, init_logging, load, pattern, rule};
use quire::runtime::test_support::{Action, FnEvaluator, RecordingExecutor, attribute};
use quire::runtime::{
    DeclarationError, GroupState, Grouping, GroupingDeclaration, GroupingStrategy, SortKey,
};
use quire::{BodyRef, Engine, EngineError, Forest, Item, NodeRef, RuleTable};

fn nodes(items: &[Item]) -> Vec<NodeRef> {
    items.iter().filter_map(Item::as_node).collect()
}

fn key_strings(forest: &Forest, groups: &[GroupState]) -> Vec<String> {
    groups
        .iter()
        .map(|g| g.key_value.as_ref().map(|k| k.string_value(forest)).unwrap_or_default())
        .collect()
}

fn all_items(forest: &Forest, doc: NodeRef) -> Item {
    let root = child_at(forest, doc, &[0]);
    Item::from_items(element_children(forest, root).into_iter().map(Item::Node).collect())
}

#[test]
fn test_group_by_numeric_keys_in_first_member_order() {
    init_logging();
    let (forest, doc) = load("<r><i k='1'/><i k='2'/><i k='1'/><i k='3'/></r>");
    let items = element_children(&forest, child_at(&forest, doc, &[0]));
    let mut evaluator = FnEvaluator::new();
    let key = evaluator.define("@k", attribute("k"));
    let rules = RuleTable::default();
    let engine = Engine::new(&rules, &forest, &evaluator);
    let mut ctx = engine.new_context();

    let groups = engine
        .group(all_items(&forest, doc), &Grouping::new(GroupingStrategy::By { key, composite: false }), &mut ctx)
        .unwrap();
    assert_eq!(key_strings(&forest, &groups), vec!["1", "2", "3"]);
    assert_eq!(nodes(&groups[0].members), vec![items[0], items[2]]);
    assert_eq!(nodes(&groups[1].members), vec![items[1]]);
    assert_eq!(nodes(&groups[2].members), vec![items[3]]);
    let positions: Vec<(usize, usize)> =
        groups.iter().map(|g| (g.group_position, g.group_count)).collect();
    assert_eq!(positions, vec![(1, 3), (2, 3), (3, 3)]);
}

#[test]
fn test_group_by_orders_groups_by_document_position() {
    let (forest, doc) = load("<r><i k='a'/><i k='b'/><i k='a'/><i k='c'/></r>");
    let items = element_children(&forest, child_at(&forest, doc, &[0]));
    let mut evaluator = FnEvaluator::new();
    let key = evaluator.define("@k", attribute("k"));
    let rules = RuleTable::default();
    let engine = Engine::new(&rules, &forest, &evaluator);
    let mut ctx = engine.new_context();

    let reversed = Item::from_items(items.iter().rev().copied().map(Item::Node).collect());
    let groups = engine
        .group(reversed, &Grouping::new(GroupingStrategy::By { key, composite: false }), &mut ctx)
        .unwrap();
    // first members are the 2nd, 3rd and 4th items, in population order c, a, b
    assert_eq!(key_strings(&forest, &groups), vec!["b", "a", "c"]);
    assert_eq!(nodes(&groups[1].members), vec![items[2], items[0]]);
}

#[test]
fn test_partitions_cover_every_item_once() {
    let (forest, doc) =
        load("<r><i k='x'/><i k='x'/><i k='y'/><i k='x'/><i k='z'/><i k='z'/></r>");
    let items = element_children(&forest, child_at(&forest, doc, &[0]));
    let mut evaluator = FnEvaluator::new();
    let key = evaluator.define("@k", attribute("k"));
    let rules = RuleTable::default();
    let engine = Engine::new(&rules, &forest, &evaluator);
    let mut ctx = engine.new_context();

    for strategy in [
        GroupingStrategy::By { key, composite: false },
        GroupingStrategy::Adjacent { key, composite: false },
    ] {
        let label = strategy.label();
        let groups = engine
            .group(all_items(&forest, doc), &Grouping::new(strategy), &mut ctx)
            .unwrap();
        let mut seen: Vec<NodeRef> = groups.iter().flat_map(|g| nodes(&g.members)).collect();
        seen.sort_by(|a, b| forest.compare_order(*a, *b));
        assert_eq!(seen, items, "{}", label);
    }

    let adjacent = engine
        .group(
            all_items(&forest, doc),
            &Grouping::new(GroupingStrategy::Adjacent { key, composite: false }),
            &mut ctx,
        )
        .unwrap();
    let sizes: Vec<usize> = adjacent.iter().map(|g| g.members.len()).collect();
    assert_eq!(sizes, vec![2, 1, 1, 2]);
    assert_eq!(key_strings(&forest, &adjacent), vec!["x", "y", "x", "z"]);
}

#[test]
fn test_starting_with_drops_items_before_first_match() {
    let (forest, doc) = load("<r><a/><b/><c/></r>");
    let items = element_children(&forest, child_at(&forest, doc, &[0]));
    let mut evaluator = FnEvaluator::new();
    let starts = pattern(&mut evaluator, "c");
    let rules = RuleTable::default();
    let engine = Engine::new(&rules, &forest, &evaluator);
    let mut ctx = engine.new_context();

    let groups = engine
        .group(all_items(&forest, doc), &Grouping::new(GroupingStrategy::StartingWith(starts)), &mut ctx)
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(nodes(&groups[0].members), vec![items[2]]);
    assert_eq!(groups[0].grouping_key, None);
}

#[test]
fn test_ending_with_drops_items_after_last_match() {
    let (forest, doc) = load("<r><a/><b/><c/></r>");
    let items = element_children(&forest, child_at(&forest, doc, &[0]));
    let mut evaluator = FnEvaluator::new();
    let ends = pattern(&mut evaluator, "b");
    let rules = RuleTable::default();
    let engine = Engine::new(&rules, &forest, &evaluator);
    let mut ctx = engine.new_context();

    let groups = engine
        .group(all_items(&forest, doc), &Grouping::new(GroupingStrategy::EndingWith(ends)), &mut ctx)
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(nodes(&groups[0].members), vec![items[0], items[1]]);
}

#[test]
fn test_declaration_with_two_strategies_is_rejected() {
    let forest = Forest::new();
    let mut evaluator = FnEvaluator::new();
    let key = evaluator.define("@k", attribute("k"));
    let rules = RuleTable::default();
    let engine = Engine::new(&rules, &forest, &evaluator);
    let declaration = GroupingDeclaration {
        group_by: Some(key),
        group_starting_with: Some(pattern(&mut FnEvaluator::new(), "h")),
        ..Default::default()
    };
    assert_eq!(
        engine.grouping(declaration).unwrap_err(),
        DeclarationError::GroupingStrategy(vec![
            "group-by".to_string(),
            "group-starting-with".to_string()
        ])
    );
}

#[test]
fn test_group_bodies_sorted_by_group_size() {
    let (forest, doc) = load("<r><i k='a'/><i k='b'/><i k='b'/><i k='c'/><i k='b'/><i k='c'/></r>");
    let mut evaluator = FnEvaluator::new();
    let key = evaluator.define("@k", attribute("k"));
    let size = evaluator.define("count(current-group())", |ctx, _| {
        let group = ctx.current_group()?;
        Ok(Item::from(group.members.len() as i64))
    });
    let rules = RuleTable::default();
    let engine = Engine::new(&rules, &forest, &evaluator);
    let mut ctx = engine.new_context();
    let mut exec = RecordingExecutor::new();

    let grouping = engine
        .grouping(GroupingDeclaration {
            group_by: Some(key),
            ..Default::default()
        })
        .unwrap();
    engine
        .for_each_group(
            all_items(&forest, doc),
            &grouping,
            &[SortKey::new(size).descending()],
            BodyRef(7),
            &mut ctx,
            &mut exec,
        )
        .unwrap();

    let seen: Vec<(usize, usize, usize)> = exec
        .invocations()
        .iter()
        .map(|i| (i.group.as_ref().map_or(0, Vec::len), i.position, i.size))
        .collect();
    assert_eq!(seen, vec![(3, 1, 3), (2, 2, 3), (1, 3, 3)]);
    assert!(exec.invocations().iter().all(|i| i.body == BodyRef(7)));
    assert_eq!(ctx.depth(), 1);
}

#[test]
fn test_rule_bodies_inside_a_group_see_no_current_group() {
    let (forest, doc) = load("<r><sec><t>one</t></sec><sec><t>two</t></sec></r>");
    let mut evaluator = FnEvaluator::new();
    let starts = pattern(&mut evaluator, "sec");
    let probe = evaluator.define("current-group()", |ctx, _| {
        Ok(Item::from_items(ctx.current_group()?.members.clone()))
    });
    let rules = RuleTable::builder()
        .rule(rule(&mut evaluator, "t", 1))
        .build()
        .unwrap();
    let engine = Engine::new(&rules, &forest, &evaluator);
    let mut ctx = engine.new_context();
    let mut exec = RecordingExecutor::new()
        .script(BodyRef(0), vec![Action::ApplyChildren])
        .script(BodyRef(1), vec![Action::ValueOf]);

    engine
        .for_each_group(
            all_items(&forest, doc),
            &Grouping::new(GroupingStrategy::StartingWith(starts)),
            &[],
            BodyRef(0),
            &mut ctx,
            &mut exec,
        )
        .unwrap();
    assert_eq!(exec.output(), "onetwo");
    let groups: Vec<bool> = exec.invocations().iter().map(|i| i.group.is_some()).collect();
    assert_eq!(groups, vec![true, false, true, false]);

    let err = engine.evaluate(probe, &ctx).unwrap_err();
    assert_eq!(err, EngineError::Declaration(DeclarationError::NoCurrentGroup));
}
