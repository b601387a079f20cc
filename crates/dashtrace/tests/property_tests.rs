#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Property-based tests for DashTrace
//!
//! These tests verify structural invariants that should hold for every
//! constructible trace graph, using the proptest framework.
//!
//! ## Test Categories
//!
//! 1. **Construction Properties**: level ordering, level-bucket coverage,
//!    name uniqueness and lookup
//! 2. **Feedback Properties**: combine algebra for the summing and
//!    node-collecting payloads
//! 3. **Propagation Properties**: backward delivery to every contributing
//!    leaf

use std::collections::HashSet;

use dashtrace::{
    CollectRule, Feedback, FeedbackValue, Graph, NodeId, Propagator, SumRule, Summed,
    VisitedFeedback, VisitedNode,
};
use proptest::prelude::*;

/// Strategy for generating arbitrary node base names
fn arb_base_name() -> impl Strategy<Value = String> {
    "[a-z_]{1,12}"
}

/// One step of a random construction sequence: how many leaves to add first,
/// then an operation over up to three existing nodes picked by index.
fn arb_build_plan() -> impl Strategy<Value = Vec<Vec<prop::sample::Index>>> {
    prop::collection::vec(
        prop::collection::vec(any::<prop::sample::Index>(), 1..=3),
        1..20,
    )
}

/// Replay a build plan against a fresh graph: two seed leaves, then one
/// operation node per plan entry, drawing arguments from everything built so
/// far. Duplicate argument picks are dropped before the call.
fn build_graph(plan: &[Vec<prop::sample::Index>]) -> (Graph<Summed>, Vec<NodeId>) {
    let mut g: Graph<Summed> = Graph::new();
    let mut ids = vec![g.leaf(1.0).unwrap(), g.leaf(2.0).unwrap()];
    for picks in plan {
        let mut args: Vec<NodeId> = picks.iter().map(|ix| *ix.get(&ids)).collect();
        args.sort();
        args.dedup();
        let id = g
            .operation(
                "[add] This is an add operator of x and y.",
                0.0,
                &args,
                &[],
            )
            .unwrap();
        ids.push(id);
    }
    (g, ids)
}

proptest! {
    /// Property: every operation node sits strictly above all of its
    /// arguments, for any construction order.
    #[test]
    fn prop_levels_stay_strictly_above_arguments(plan in arb_build_plan()) {
        let (g, ids) = build_graph(&plan);
        for &id in &ids {
            for &child in g.node(id).children() {
                prop_assert!(g.node(id).level() > g.node(child).level());
            }
        }
    }

    /// Property: the level index has no gaps: every level in `[0, max]`
    /// holds at least one node, and each node appears in exactly the bucket
    /// matching its level.
    #[test]
    fn prop_level_buckets_cover_every_level(plan in arb_build_plan()) {
        let (g, ids) = build_graph(&plan);
        for level in 0..=g.max_level() {
            prop_assert!(!g.nodes_at_level(level).is_empty());
        }
        for &id in &ids {
            prop_assert!(g.nodes_at_level(g.node(id).level()).contains(&id));
        }
    }

    /// Property: registered names are unique and resolvable back to the id
    /// that owns them.
    #[test]
    fn prop_names_are_unique_and_resolvable(
        bases in prop::collection::vec(arb_base_name(), 1..30),
    ) {
        let mut g: Graph<Summed> = Graph::new();
        let mut seen = HashSet::new();
        for base in &bases {
            let id = g.leaf_named(base, 0.0).unwrap();
            let name = g.node(id).name().to_owned();
            let prefix = format!("{base}:");
            prop_assert!(seen.insert(name.clone()));
            prop_assert!(name.starts_with(&prefix));
            prop_assert_eq!(g.get(&name).unwrap(), id);
        }
    }

    /// Property: registering the same base n times yields suffixes 0..n.
    #[test]
    fn prop_suffixes_increment_from_zero(base in arb_base_name(), n in 1usize..20) {
        let mut g: Graph<Summed> = Graph::new();
        for expected in 0..n {
            let id = g.leaf_named(&base, 0.0).unwrap();
            prop_assert_eq!(g.node(id).name(), format!("{base}:{expected}"));
        }
    }

    /// Property: combining numeric feedback is commutative in the running
    /// sum.
    #[test]
    fn prop_summed_combination_is_commutative(a in -1e6f64..1e6, b in -1e6f64..1e6) {
        let left = Summed::user(a).combine(Summed::partial(b)).unwrap();
        let right = Summed::partial(b).combine(Summed::user(a)).unwrap();
        prop_assert_eq!(left.value, right.value);
        prop_assert_eq!(left.user, right.user);
    }

    /// Property: a visited-set merge is idempotent and keeps the result
    /// sorted by level with unique names.
    #[test]
    fn prop_visited_merge_is_idempotent_and_sorted(
        entries in prop::collection::vec(("[a-z]{1,6}:0", 0usize..8), 0..10),
    ) {
        let mut visited: Vec<VisitedNode> = Vec::new();
        let mut names = HashSet::new();
        for (name, level) in entries {
            if names.insert(name.clone()) {
                visited.push(VisitedNode { level, name });
            }
        }
        visited.sort_by_key(|v| v.level);
        let f = VisitedFeedback {
            visited,
            user: Some(FeedbackValue::from("u")),
        };
        let merged = f.clone().combine(f.clone()).unwrap();
        prop_assert_eq!(&merged, &f);
        prop_assert!(merged.visited.windows(2).all(|w| w[0].level <= w[1].level));
        let unique: HashSet<&str> = merged.names().collect();
        prop_assert_eq!(unique.len(), merged.visited.len());
    }

    /// Property: after a backward pass with the summing rule, every leaf
    /// below the output receives the seeded user critique.
    #[test]
    fn prop_backward_reaches_every_contributing_leaf(plan in arb_build_plan()) {
        let (mut g, ids) = build_graph(&plan);
        let output = *ids.last().unwrap();
        prop_assume!(g.node(output).is_operation());

        let p = Propagator::new(SumRule);
        g.backward(output, Summed::user("fix"), &p).unwrap();

        // Walk the argument closure of the output.
        let mut reached = HashSet::new();
        let mut stack = vec![output];
        while let Some(id) = stack.pop() {
            if reached.insert(id) {
                stack.extend(g.node(id).children().iter().copied());
            }
        }
        for &id in &reached {
            if id == output {
                continue;
            }
            let fed = g.accumulated_feedback(id).unwrap();
            prop_assert_eq!(fed.user, Some(FeedbackValue::from("fix")));
        }
    }

    /// Property: the collecting rule delivers a level-sorted, name-unique
    /// visited set to every contributing leaf, always containing the output.
    #[test]
    fn prop_collected_paths_are_sorted_and_unique(plan in arb_build_plan()) {
        let mut g: Graph<VisitedFeedback> = Graph::new();
        let mut ids = vec![g.leaf(1.0).unwrap(), g.leaf(2.0).unwrap()];
        for picks in &plan {
            let mut args: Vec<NodeId> = picks.iter().map(|ix| *ix.get(&ids)).collect();
            args.sort();
            args.dedup();
            let id = g
                .operation("[add] This is an add operator of x and y.", 0.0, &args, &[])
                .unwrap();
            ids.push(id);
        }
        let output = *ids.last().unwrap();
        prop_assume!(g.node(output).is_operation());
        let output_name = g.node(output).name().to_owned();

        let p = Propagator::new(CollectRule);
        g.backward(output, VisitedFeedback::seed("critique"), &p).unwrap();

        for &id in &ids {
            if id == output || !g.node(id).has_feedback() {
                continue;
            }
            let fed = g.accumulated_feedback(id).unwrap();
            prop_assert!(fed.visited.windows(2).all(|w| w[0].level <= w[1].level));
            let unique: HashSet<&str> = fed.names().collect();
            prop_assert_eq!(unique.len(), fed.visited.len());
            prop_assert!(fed.names().any(|n| n == output_name));
        }
    }
}
