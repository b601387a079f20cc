// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Trace graph: registry, construction, and the backward driver
//!
//! [`Graph`] is the single source of truth for one optimization episode: it
//! owns every node, assigns disambiguated names, and maintains the
//! level-to-nodes index that orders backward traversal. It is an explicit
//! context object owned by the driver rather than ambient global state, and
//! it is strictly single-threaded: one trace/propagate episode at a time.
//! Callers that need concurrent construction must serialize access
//! themselves.
//!
//! Edges are added only while an operation node is being constructed, from
//! nodes that already exist. That construction order is what guarantees
//! acyclicity; there is no separate cycle check.
//!
//! # Example
//!
//! ```rust
//! use dashtrace::{Graph, Propagator, SumRule, Summed};
//!
//! let mut graph: Graph<Summed> = Graph::new();
//! let a = graph.leaf(2.0)?;
//! let b = graph.leaf(3.0)?;
//! let c = graph.operation(
//!     "[add] This is an add operator of x and y.",
//!     5.0,
//!     &[a, b],
//!     &[],
//! )?;
//!
//! let propagator = Propagator::new(SumRule);
//! graph.backward(c, Summed::user(5.0), &propagator)?;
//!
//! let fed_back = graph.accumulated_feedback(a)?;
//! assert_eq!(fed_back, Summed::user(5.0));
//! # Ok::<(), dashtrace::Error>(())
//! ```

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::{Error, Result};
use crate::feedback::Feedback;
use crate::node::{FeedbackFrom, Node, NodeId, Operation};
use crate::propagate::Propagator;
use crate::value::Value;

/// A leveled trace DAG plus its per-name registry.
///
/// Generic over the feedback type `F` carried during backward passes; one
/// propagator drives one pass, so one feedback type per graph episode.
#[derive(Debug)]
pub struct Graph<F: Feedback> {
    nodes: Vec<Node<F>>,
    names: HashMap<String, NodeId>,
    levels: Vec<Vec<NodeId>>,
}

impl<F: Feedback> Default for Graph<F> {
    fn default() -> Self {
        Graph::new()
    }
}

impl<F: Feedback> Graph<F> {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Graph {
            nodes: Vec::new(),
            names: HashMap::new(),
            levels: Vec::new(),
        }
    }

    // ---- construction -----------------------------------------------------

    /// Wrap a raw value as a leaf node, named after the value's kind.
    pub fn leaf(&mut self, value: impl Into<Value>) -> Result<NodeId> {
        let value = value.into();
        self.insert(value.kind().to_owned(), value, false, None)
    }

    /// Wrap a raw value as a leaf node under an explicit base name.
    pub fn leaf_named(&mut self, base: &str, value: impl Into<Value>) -> Result<NodeId> {
        self.insert(base.to_owned(), value.into(), false, None)
    }

    /// Wrap a raw value as a trainable parameter node.
    ///
    /// Semantically a leaf; optimizers filter on the trainable flag.
    pub fn parameter(&mut self, value: impl Into<Value>) -> Result<NodeId> {
        let value = value.into();
        self.insert(value.kind().to_owned(), value, true, None)
    }

    /// Wrap a raw value as a trainable parameter node under an explicit
    /// base name.
    pub fn parameter_named(&mut self, base: &str, value: impl Into<Value>) -> Result<NodeId> {
        self.insert(base.to_owned(), value.into(), true, None)
    }

    /// Record the result of applying an operator.
    ///
    /// `description` must start with the bracketed operator token, e.g.
    /// `"[add] This is an add operator of x and y."`. Every positional and
    /// named argument is attached as a child, which recomputes this node's
    /// level as arguments are added.
    ///
    /// # Errors
    ///
    /// Fails on a malformed description, a duplicate argument, or an
    /// argument listed as both positional and named.
    pub fn operation(
        &mut self,
        description: &str,
        value: impl Into<Value>,
        args: &[NodeId],
        kwargs: &[(&str, NodeId)],
    ) -> Result<NodeId> {
        let op = Operation::new(
            description.to_owned(),
            args.to_vec(),
            kwargs
                .iter()
                .map(|(k, v)| ((*k).to_owned(), *v))
                .collect(),
        );
        // Reject malformed operator tokens at construction rather than at
        // first propagation.
        let operator = op.operator_name()?.to_owned();
        let id = self.insert(operator.clone(), value.into(), false, Some(op))?;
        for arg in args {
            self.add_child(id, *arg)?;
        }
        for (_, arg) in kwargs {
            self.add_child(id, *arg)?;
        }
        debug!(
            node = %self.nodes[id.0].name,
            operator = %operator,
            level = self.nodes[id.0].level,
            "recorded operation node"
        );
        Ok(id)
    }

    fn insert(
        &mut self,
        base: String,
        data: Value,
        trainable: bool,
        op: Option<Operation>,
    ) -> Result<NodeId> {
        if base.is_empty() || base.contains(':') {
            return Err(Error::MalformedName { name: base });
        }
        let id = NodeId(self.nodes.len());
        let mut node = Node::new(data, trainable, op);
        node.name = self.disambiguate(&base);
        debug!(node = %node.name, trainable, "registered node");
        self.names.insert(node.name.clone(), id);
        self.nodes.push(node);
        self.level_bucket(0).push(id);
        Ok(id)
    }

    /// Pick the first free `base:n` name, incrementing the suffix on each
    /// collision.
    fn disambiguate(&self, base: &str) -> String {
        let mut suffix = 0usize;
        loop {
            let candidate = format!("{base}:{suffix}");
            if !self.names.contains_key(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Attach `child` as an argument of `node`, updating both adjacency
    /// lists and recomputing `node`'s level.
    ///
    /// Only called while `node` is being constructed, so the edge cannot
    /// close a cycle.
    fn add_child(&mut self, node: NodeId, child: NodeId) -> Result<()> {
        if node == child {
            return Err(Error::SelfEdge {
                name: self.nodes[node.0].name.clone(),
            });
        }
        if self.nodes[node.0].children.contains(&child)
            || self.nodes[child.0].parents.contains(&node)
        {
            return Err(Error::DuplicateEdge {
                parent: self.nodes[node.0].name.clone(),
                child: self.nodes[child.0].name.clone(),
            });
        }
        self.nodes[child.0].parents.push(node);
        self.nodes[node.0].children.push(child);
        let old = self.nodes[node.0].level;
        let new = old.max(self.nodes[child.0].level + 1);
        if new != old {
            self.on_level_changed(node, old, new)?;
        }
        Ok(())
    }

    /// Move a node between level buckets after its level was recomputed.
    ///
    /// Every level in `[0, max]` that had members must still have members
    /// afterwards; a drained bucket indicates a construction-order bug in
    /// the caller and is reported, not repaired.
    fn on_level_changed(&mut self, node: NodeId, old: usize, new: usize) -> Result<()> {
        self.levels[old].retain(|id| *id != node);
        self.level_bucket(new).push(node);
        self.nodes[node.0].level = new;
        for (level, bucket) in self.levels.iter().enumerate() {
            if bucket.is_empty() {
                return Err(Error::EmptyLevel { level });
            }
        }
        Ok(())
    }

    fn level_bucket(&mut self, level: usize) -> &mut Vec<NodeId> {
        while self.levels.len() <= level {
            self.levels.push(Vec::new());
        }
        &mut self.levels[level]
    }

    // ---- lookup -----------------------------------------------------------

    /// Exact lookup by registered name.
    pub fn get(&self, name: &str) -> Result<NodeId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownNode {
                name: name.to_owned(),
            })
    }

    /// Borrow a node by id.
    ///
    /// Ids come from this graph's construction methods; a stale id from a
    /// previous episode is a caller bug.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node<F> {
        &self.nodes[id.0]
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Highest occupied level.
    #[must_use]
    pub fn max_level(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    /// Nodes currently at a level, in arrival order.
    #[must_use]
    pub fn nodes_at_level(&self, level: usize) -> &[NodeId] {
        self.levels.get(level).map_or(&[], Vec::as_slice)
    }

    /// Ids of all trainable parameter nodes.
    pub fn parameters(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.trainable)
            .map(|(i, _)| NodeId(i))
    }

    // ---- feedback ---------------------------------------------------------

    /// Deposit one feedback delivery on a node.
    ///
    /// If the source already delivered during this pass, the two deliveries
    /// are merged through [`Feedback::combine`] so each key keeps at most
    /// one entry.
    pub fn deposit_feedback(&mut self, node: NodeId, from: FeedbackFrom, feedback: F) -> Result<()> {
        let name = self.nodes[node.0].name.clone();
        let slot = self.nodes[node.0].feedback.entry(from).or_default();
        match slot.len() {
            0 => slot.push(feedback),
            1 => {
                let existing = slot.remove(0);
                slot.push(existing.combine(feedback)?);
            }
            n => {
                return Err(Error::FeedbackNotAggregated { name, count: n });
            }
        }
        Ok(())
    }

    /// Fold all feedback received by a node into a single value.
    ///
    /// This is how an optimizer reads the critique accumulated on a
    /// parameter after a backward pass.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::EmptyAggregate`] when no feedback was received,
    /// and propagates combination errors (conflicting user feedback,
    /// heterogeneous kinds).
    pub fn accumulated_feedback(&self, node: NodeId) -> Result<F> {
        let n = &self.nodes[node.0];
        let mut acc: Option<F> = None;
        for entries in n.feedback.values() {
            if entries.len() > 1 {
                return Err(Error::FeedbackNotAggregated {
                    name: n.name.clone(),
                    count: entries.len(),
                });
            }
            for entry in entries {
                acc = Some(match acc {
                    None => entry.clone(),
                    Some(previous) => previous.combine(entry.clone())?,
                });
            }
        }
        acc.ok_or(Error::EmptyAggregate)
    }

    /// Clear every node's feedback slots ahead of a new backward pass.
    pub fn zero_feedback(&mut self) {
        for node in &mut self.nodes {
            node.feedback.clear();
        }
    }

    /// Drop all nodes and level buckets.
    ///
    /// Must run between optimization episodes: visited-set deduplication is
    /// by node name, so reusing names across episodes without a reset would
    /// conflate distinct values.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.names.clear();
        self.levels.clear();
    }

    // ---- backward propagation --------------------------------------------

    /// Propagate feedback from `output` to every contributing node.
    ///
    /// Seeds `output` with the user critique, then visits operation nodes in
    /// strictly non-increasing level order. Only nodes fed during this pass
    /// are propagated, so each consumer delivers to its arguments exactly
    /// once per pass and feedback surviving from an earlier seeded pass is
    /// never re-propagated. A node is visited only after every consumer
    /// above it has been processed, so all of its feedback is in place when
    /// the propagator runs. Each visit deposits the propagator's
    /// per-argument feedback, merging with any entry already delivered by
    /// another consumer.
    ///
    /// Callers are expected to [`zero_feedback`](Graph::zero_feedback)
    /// between optimization episodes.
    pub fn backward(&mut self, output: NodeId, user: F, propagator: &Propagator<F>) -> Result<()> {
        debug!(node = %self.nodes[output.0].name, "seeding backward pass");
        self.deposit_feedback(output, FeedbackFrom::User, user)?;
        let mut fed_this_pass = HashSet::from([output]);
        let top = self.nodes[output.0].level;
        for level in (1..=top).rev() {
            let visiting = self.levels[level].clone();
            for id in visiting {
                let node = &self.nodes[id.0];
                if node.op.is_none() || !fed_this_pass.contains(&id) {
                    continue;
                }
                debug!(node = %node.name, level, "propagating feedback");
                let delivered = propagator.call(self, id)?;
                for (argument, feedback) in delivered {
                    self.deposit_feedback(argument, FeedbackFrom::Node(id), feedback)?;
                    fed_this_pass.insert(argument);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{FeedbackValue, Summed};
    use crate::propagate::SumRule;

    const ADD: &str = "[add] This is an add operator of x and y.";

    #[test]
    fn names_disambiguate_with_incrementing_suffixes() {
        let mut g: Graph<Summed> = Graph::new();
        let a = g.leaf_named("x", 1.0).unwrap();
        let b = g.leaf_named("x", 2.0).unwrap();
        assert_eq!(g.node(a).name(), "x:0");
        assert_eq!(g.node(b).name(), "x:1");
        assert_eq!(g.get("x:1").unwrap(), b);
    }

    #[test]
    fn default_base_name_is_the_value_kind() {
        let mut g: Graph<Summed> = Graph::new();
        let a = g.leaf("hello").unwrap();
        assert_eq!(g.node(a).name(), "text:0");
    }

    #[test]
    fn malformed_base_names_are_rejected() {
        let mut g: Graph<Summed> = Graph::new();
        assert!(matches!(
            g.leaf_named("a:b", 1.0),
            Err(Error::MalformedName { .. })
        ));
        assert!(matches!(
            g.leaf_named("", 1.0),
            Err(Error::MalformedName { .. })
        ));
    }

    #[test]
    fn unknown_lookup_fails() {
        let g: Graph<Summed> = Graph::new();
        assert!(matches!(g.get("x:0"), Err(Error::UnknownNode { .. })));
    }

    #[test]
    fn operation_links_arguments_in_both_directions() {
        let mut g: Graph<Summed> = Graph::new();
        let a = g.leaf(2.0).unwrap();
        let b = g.leaf(3.0).unwrap();
        let c = g.operation(ADD, 5.0, &[a, b], &[]).unwrap();
        assert_eq!(g.node(c).children(), &[a, b]);
        assert_eq!(g.node(a).parents(), &[c]);
        assert_eq!(g.node(b).parents(), &[c]);
        assert_eq!(g.node(c).level(), 1);
    }

    #[test]
    fn named_arguments_are_recorded_and_linked() {
        let mut g: Graph<Summed> = Graph::new();
        let x = g.leaf("a").unwrap();
        let y = g.leaf("b").unwrap();
        let c = g
            .operation("[concat] Concatenation of x and y.", "ab", &[x], &[("suffix", y)])
            .unwrap();
        let op = g.node(c).operation().unwrap();
        assert_eq!(op.args(), &[x]);
        assert_eq!(op.kwargs(), &[("suffix".to_owned(), y)]);
        assert_eq!(g.node(c).children(), &[x, y]);
    }

    #[test]
    fn duplicate_arguments_are_rejected() {
        let mut g: Graph<Summed> = Graph::new();
        let a = g.leaf(2.0).unwrap();
        let err = g.operation(ADD, 4.0, &[a, a], &[]).unwrap_err();
        assert!(matches!(err, Error::DuplicateEdge { .. }));
        // First edge was added before the duplicate was caught.
        assert_eq!(g.node(a).parents().len(), 1);
    }

    #[test]
    fn levels_stay_strictly_above_arguments() {
        let mut g: Graph<Summed> = Graph::new();
        let a = g.leaf(1.0).unwrap();
        let b = g.operation(ADD, 2.0, &[a], &[]).unwrap();
        let c = g.operation(ADD, 3.0, &[a, b], &[]).unwrap();
        let d = g.operation(ADD, 4.0, &[c, a], &[]).unwrap();
        for id in [b, c, d] {
            for &child in g.node(id).children() {
                assert!(g.node(id).level() > g.node(child).level());
            }
        }
        assert_eq!(g.node(d).level(), 3);
        assert_eq!(g.max_level(), 3);
    }

    #[test]
    fn level_buckets_track_moves() {
        let mut g: Graph<Summed> = Graph::new();
        let a = g.leaf(1.0).unwrap();
        let b = g.operation(ADD, 2.0, &[a], &[]).unwrap();
        assert_eq!(g.nodes_at_level(0), &[a]);
        assert_eq!(g.nodes_at_level(1), &[b]);
    }

    #[test]
    fn reset_drops_everything() {
        let mut g: Graph<Summed> = Graph::new();
        let a = g.leaf(1.0).unwrap();
        g.operation(ADD, 2.0, &[a], &[]).unwrap();
        g.reset();
        assert!(g.is_empty());
        assert!(g.get("number:0").is_err());
        // Names restart from suffix zero in the new episode.
        let fresh = g.leaf(9.0).unwrap();
        assert_eq!(g.node(fresh).name(), "number:0");
    }

    #[test]
    fn deposit_merges_repeat_deliveries_from_one_source() {
        let mut g: Graph<Summed> = Graph::new();
        let a = g.leaf(1.0).unwrap();
        g.deposit_feedback(a, FeedbackFrom::User, Summed::user("A"))
            .unwrap();
        g.deposit_feedback(a, FeedbackFrom::User, Summed::user("A"))
            .unwrap();
        let fb = g.node(a).feedback().get(&FeedbackFrom::User).unwrap();
        assert_eq!(fb.len(), 1);
        assert_eq!(fb[0].value, crate::FeedbackValue::from("AA"));
    }

    #[test]
    fn accumulated_feedback_requires_entries() {
        let mut g: Graph<Summed> = Graph::new();
        let a = g.leaf(1.0).unwrap();
        assert!(matches!(
            g.accumulated_feedback(a),
            Err(Error::EmptyAggregate)
        ));
    }

    #[test]
    fn sequential_passes_deliver_once_per_consumer() {
        let mut g: Graph<Summed> = Graph::new();
        let d = g.leaf_named("d", "shared").unwrap();
        let e = g.operation("[f1] First consumer of x.", "e", &[d], &[]).unwrap();
        let h = g.operation("[f2] Second consumer of x.", "h", &[d], &[]).unwrap();

        let p = Propagator::new(SumRule);
        g.backward(e, Summed::user("A"), &p).unwrap();
        g.backward(h, Summed::user("A"), &p).unwrap();

        // The second pass must not re-propagate the first seed through `e`.
        let entries = g.node(d).feedback();
        assert_eq!(entries.len(), 2);
        assert!(entries.values().all(|v| v.len() == 1));
        assert_eq!(
            g.accumulated_feedback(d).unwrap().value,
            FeedbackValue::from("AA")
        );
    }

    #[test]
    fn parameters_are_filterable() {
        let mut g: Graph<Summed> = Graph::new();
        let _x = g.leaf(1.0).unwrap();
        let p = g.parameter_named("prompt", "Be terse.").unwrap();
        let params: Vec<_> = g.parameters().collect();
        assert_eq!(params, vec![p]);
        assert!(g.node(p).trainable());
    }
}
