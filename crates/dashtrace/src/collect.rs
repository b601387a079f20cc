// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Node-collecting propagation
//!
//! [`VisitedFeedback`] carries two things down the graph: the ordered
//! sub-DAG visited so far, as `(level, name)` pairs sorted by ascending
//! level, and the single user critique seeded at the traversal terminal.
//! [`CollectRule`] is the propagation policy that grows the visited set at
//! every step, so that by the time feedback reaches a parameter it describes
//! the full downstream path that consumed it.
//!
//! Deduplication is by node *name*, not graph identity, so two in-memory
//! objects representing the same re-registered value collapse into one
//! entry. That is also why a per-episode [`Graph::reset`](crate::Graph::reset)
//! is a hard precondition: names may repeat across episodes.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::feedback::{merge_user, Feedback, FeedbackValue};
use crate::graph::Graph;
use crate::node::{FeedbackFrom, NodeId};
use crate::propagate::{FeedbackMap, PropagationRule};

/// One visited node, recorded by level and registered name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitedNode {
    /// Level of the node at the time it was recorded
    pub level: usize,
    /// Registered `base:suffix` name
    pub name: String,
}

/// Feedback payload that accumulates the visited sub-DAG.
///
/// `visited` is kept sorted by ascending level, ties broken by arrival
/// order, with at most one entry per node name. `user` is the critique
/// carried through the whole traversal; all paths that supply one must
/// agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitedFeedback {
    /// Visited `(level, name)` pairs in ascending level order
    pub visited: Vec<VisitedNode>,
    /// The user critique, if this feedback has met the seed
    pub user: Option<FeedbackValue>,
}

impl VisitedFeedback {
    /// The seed payload injected at the traversal terminal.
    #[must_use]
    pub fn seed(user: impl Into<FeedbackValue>) -> Self {
        VisitedFeedback {
            visited: Vec::new(),
            user: Some(user.into()),
        }
    }

    fn slice(visited: Vec<VisitedNode>) -> Self {
        VisitedFeedback {
            visited,
            user: None,
        }
    }

    /// Names of the visited nodes, in ascending level order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.visited.iter().map(|v| v.name.as_str())
    }
}

impl Feedback for VisitedFeedback {
    /// Merge two visited sets and their user critiques.
    ///
    /// Nodes already present on the right (by name) are dropped from the
    /// left, then the two level-sorted sequences are merged stably, so the
    /// union is computed once per unique node without rescanning.
    fn combine(self, other: Self) -> Result<Self> {
        let user = merge_user(self.user, other.user)?;
        let right_names: HashSet<&str> = other.visited.iter().map(|v| v.name.as_str()).collect();
        let complement: Vec<VisitedNode> = self
            .visited
            .into_iter()
            .filter(|v| !right_names.contains(v.name.as_str()))
            .collect();
        Ok(VisitedFeedback {
            visited: merge_by_level(complement, other.visited),
            user,
        })
    }
}

/// Stable two-way merge of level-sorted sequences, preferring the left
/// operand on ties.
fn merge_by_level(left: Vec<VisitedNode>, right: Vec<VisitedNode>) -> Vec<VisitedNode> {
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => {
                if l.level <= r.level {
                    merged.extend(left.next());
                } else {
                    merged.extend(right.next());
                }
            }
            (Some(_), None) => merged.extend(left.next()),
            (None, Some(_)) => merged.extend(right.next()),
            (None, None) => break,
        }
    }
    merged
}

/// Propagation policy that collects every node seen on the path.
///
/// At the seed, the outgoing feedback holds the seed node and its consumers
/// plus the raw user critique. At intermediate nodes, the feedback received
/// from all consumers is aggregated and the node's own local graph slice is
/// added. Either way the same object is forwarded to every argument.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectRule;

impl CollectRule {
    /// Fold a feedback map into one [`VisitedFeedback`].
    ///
    /// Every entry must be a singleton; folding happens left-to-right in
    /// key order.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::EmptyAggregate`] on an empty map and propagates
    /// combination errors.
    pub fn aggregate(
        feedback: &BTreeMap<FeedbackFrom, Vec<VisitedFeedback>>,
    ) -> Result<VisitedFeedback> {
        let mut acc: Option<VisitedFeedback> = None;
        for entries in feedback.values() {
            let entry = match entries.as_slice() {
                [one] => one,
                _ => {
                    return Err(Error::FeedbackNotAggregated {
                        name: "feedback map".to_owned(),
                        count: entries.len(),
                    })
                }
            };
            acc = Some(match acc {
                None => entry.clone(),
                Some(previous) => previous.combine(entry.clone())?,
            });
        }
        acc.ok_or(Error::EmptyAggregate)
    }

    /// The node plus the consumers that fed it, sorted by ascending level.
    fn local_slice(graph: &Graph<VisitedFeedback>, node: NodeId) -> Vec<VisitedNode> {
        let n = graph.node(node);
        let mut slice: Vec<VisitedNode> = Vec::with_capacity(n.parents().len() + 1);
        slice.push(VisitedNode {
            level: n.level(),
            name: n.name().to_owned(),
        });
        for &consumer in n.parents() {
            let c = graph.node(consumer);
            slice.push(VisitedNode {
                level: c.level(),
                name: c.name().to_owned(),
            });
        }
        slice.sort_by_key(|v| v.level);
        slice
    }
}

impl PropagationRule<VisitedFeedback> for CollectRule {
    fn propagate(
        &self,
        graph: &Graph<VisitedFeedback>,
        node: NodeId,
    ) -> Result<FeedbackMap<VisitedFeedback>> {
        let n = graph.node(node);
        let feedback = n.feedback();
        let slice = VisitedFeedback::slice(Self::local_slice(graph, node));
        let outgoing = if feedback.contains_key(&FeedbackFrom::User) {
            // The traversal seed: the critique starts here.
            if feedback.len() != 1 {
                return Err(Error::UserFeedbackNotSole {
                    name: n.name().to_owned(),
                });
            }
            let seeded = feedback[&FeedbackFrom::User]
                .first()
                .cloned()
                .ok_or(Error::EmptyAggregate)?;
            if seeded.user.is_none() {
                return Err(Error::MissingUserFeedback);
            }
            seeded.combine(slice)?
        } else {
            CollectRule::aggregate(feedback)?.combine(slice)?
        };
        Ok(n.children()
            .iter()
            .map(|argument| (*argument, outgoing.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagate::Propagator;

    fn visited(entries: &[(usize, &str)]) -> Vec<VisitedNode> {
        entries
            .iter()
            .map(|(level, name)| VisitedNode {
                level: *level,
                name: (*name).to_owned(),
            })
            .collect()
    }

    #[test]
    fn merging_with_itself_keeps_names_unique_and_sorted() {
        let f = VisitedFeedback {
            visited: visited(&[(0, "x:0"), (1, "add:0"), (2, "add:1")]),
            user: Some(FeedbackValue::from("fix the prompt")),
        };
        let merged = f.clone().combine(f.clone()).unwrap();
        assert_eq!(merged, f);
        let names: Vec<_> = merged.names().collect();
        let unique: HashSet<_> = names.iter().copied().collect();
        assert_eq!(names.len(), unique.len());
        assert!(merged.visited.windows(2).all(|w| w[0].level <= w[1].level));
    }

    #[test]
    fn merge_takes_the_union_once_per_name() {
        let left = VisitedFeedback {
            visited: visited(&[(0, "a:0"), (2, "c:0")]),
            user: Some(FeedbackValue::from("u")),
        };
        let right = VisitedFeedback {
            visited: visited(&[(1, "b:0"), (2, "c:0")]),
            user: None,
        };
        let merged = left.combine(right).unwrap();
        assert_eq!(
            merged.visited,
            visited(&[(0, "a:0"), (1, "b:0"), (2, "c:0")])
        );
        assert_eq!(merged.user, Some(FeedbackValue::from("u")));
    }

    #[test]
    fn conflicting_user_critiques_fail() {
        let left = VisitedFeedback::seed("do more");
        let right = VisitedFeedback::seed("do less");
        assert!(matches!(
            left.combine(right),
            Err(Error::ConflictingUserFeedback { .. })
        ));
    }

    #[test]
    fn combining_two_userless_feedbacks_fails() {
        let left = VisitedFeedback::slice(visited(&[(0, "a:0")]));
        let right = VisitedFeedback::slice(visited(&[(1, "b:0")]));
        assert!(matches!(
            left.combine(right),
            Err(Error::MissingUserFeedback)
        ));
    }

    #[test]
    fn aggregate_of_an_empty_map_fails() {
        let empty = BTreeMap::new();
        assert!(matches!(
            CollectRule::aggregate(&empty),
            Err(Error::EmptyAggregate)
        ));
    }

    #[test]
    fn seed_propagation_records_the_seed_node() {
        let mut g: Graph<VisitedFeedback> = Graph::new();
        let a = g.parameter_named("prompt", "Answer briefly.").unwrap();
        let b = g
            .operation("[render] This renders the prompt template.", "...", &[a], &[])
            .unwrap();

        let p = Propagator::new(CollectRule);
        g.backward(b, VisitedFeedback::seed("too verbose"), &p).unwrap();

        let fed = g.accumulated_feedback(a).unwrap();
        assert_eq!(fed.visited, visited(&[(1, "render:0")]));
        assert_eq!(fed.user, Some(FeedbackValue::from("too verbose")));
    }

    #[test]
    fn diamond_paths_collect_the_whole_downstream_graph() {
        let mut g: Graph<VisitedFeedback> = Graph::new();
        let a = g.parameter_named("prompt", "p").unwrap();
        let b = g.operation("[f1] First branch of x.", "b", &[a], &[]).unwrap();
        let c = g.operation("[f2] Second branch of x.", "c", &[a], &[]).unwrap();
        let d = g
            .operation("[join] This joins x and y.", "d", &[b, c], &[])
            .unwrap();

        let p = Propagator::new(CollectRule);
        g.backward(d, VisitedFeedback::seed("critique"), &p).unwrap();

        let fed = g.accumulated_feedback(a).unwrap();
        let names: Vec<_> = fed.names().collect();
        assert_eq!(names, vec!["f1:0", "f2:0", "join:0"]);
        assert!(fed.visited.windows(2).all(|w| w[0].level <= w[1].level));
        assert_eq!(fed.user, Some(FeedbackValue::from("critique")));
    }

    #[test]
    fn intermediate_nodes_add_their_consumers_to_the_slice() {
        let mut g: Graph<VisitedFeedback> = Graph::new();
        let a = g.leaf_named("x", "x").unwrap();
        let b = g.operation("[f1] Inner operation of x.", "b", &[a], &[]).unwrap();
        let c = g.operation("[f2] Outer operation of x.", "c", &[b], &[]).unwrap();

        let p = Propagator::new(CollectRule);
        g.backward(c, VisitedFeedback::seed("s"), &p).unwrap();

        // b's slice contributes both itself and its consumer c.
        let fed = g.accumulated_feedback(a).unwrap();
        assert_eq!(fed.visited, visited(&[(1, "f1:0"), (2, "f2:0")]));
    }
}
