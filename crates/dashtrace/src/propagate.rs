// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Backward propagation policies
//!
//! A [`Propagator`] computes, for one operation node, the feedback to
//! deliver to each of its arguments, given the feedback the node has already
//! received from its consumers. Operators with special needs register an
//! override keyed by operator name; everything else goes through the
//! propagator's default [`PropagationRule`].
//!
//! [`SumRule`] is the default policy analogous to reverse-mode broadcast and
//! reduce: direct user feedback is forwarded unchanged to every argument,
//! while fan-in feedback from multiple consumers is summed (numbers) or
//! concatenated (text) before being broadcast.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::feedback::{Feedback, Summed};
use crate::graph::Graph;
use crate::node::{FeedbackFrom, NodeId};

/// Per-argument feedback produced by one propagation step.
pub type FeedbackMap<F> = HashMap<NodeId, F>;

/// An override propagation function for one operator.
pub type PropagateFn<F> = Box<dyn Fn(&Graph<F>, NodeId) -> Result<FeedbackMap<F>> + Send + Sync>;

/// Default propagation policy applied when no override matches.
pub trait PropagationRule<F: Feedback>: Send + Sync {
    /// Compute the feedback to deliver to each argument of `node`.
    ///
    /// `node` is guaranteed to be an operation node whose feedback entries
    /// are all singletons; implementations must return one entry per
    /// argument, even if it is a no-op for arguments the operator has
    /// nothing to say about.
    fn propagate(&self, graph: &Graph<F>, node: NodeId) -> Result<FeedbackMap<F>>;
}

/// Dispatch harness around a default rule and per-operator overrides.
///
/// # Example
///
/// ```rust
/// use dashtrace::{Graph, PropagationRule, Propagator, SumRule, Summed};
///
/// let mut propagator = Propagator::new(SumRule);
/// propagator.register("subtract", |graph: &Graph<Summed>, node| {
///     // Custom handling for subtract nodes.
///     SumRule.propagate(graph, node)
/// });
/// ```
pub struct Propagator<F: Feedback> {
    overrides: HashMap<String, PropagateFn<F>>,
    rule: Option<Box<dyn PropagationRule<F>>>,
}

impl<F: Feedback> Propagator<F> {
    /// Build a propagator around a default rule.
    #[must_use]
    pub fn new(rule: impl PropagationRule<F> + 'static) -> Self {
        Propagator {
            overrides: HashMap::new(),
            rule: Some(Box::new(rule)),
        }
    }

    /// Build a propagator with no default rule.
    ///
    /// Operators without a registered override fail with
    /// [`Error::NoPropagationRule`] instead of guessing a behavior.
    #[must_use]
    pub fn overrides_only() -> Self {
        Propagator {
            overrides: HashMap::new(),
            rule: None,
        }
    }

    /// Install or replace the propagation rule for a named operator.
    ///
    /// The key must match the bracketed token of the operator description,
    /// e.g. `"subtract"` for nodes described as `"[subtract] ..."`. The last
    /// registration wins.
    pub fn register(
        &mut self,
        operator: impl Into<String>,
        propagate: impl Fn(&Graph<F>, NodeId) -> Result<FeedbackMap<F>> + Send + Sync + 'static,
    ) {
        self.overrides.insert(operator.into(), Box::new(propagate));
    }

    /// Propagate feedback from one operation node to its arguments.
    ///
    /// Checks the propagation contract on both sides: the node must be an
    /// operation node whose feedback entries have already been merged down
    /// to singletons, and the computed feedback must cover exactly the
    /// node's argument set.
    pub fn call(&self, graph: &Graph<F>, node: NodeId) -> Result<FeedbackMap<F>> {
        let n = graph.node(node);
        let op = n.operation().ok_or_else(|| Error::NotAnOperation {
            name: n.name().to_owned(),
        })?;
        for entries in n.feedback().values() {
            if entries.len() > 1 {
                return Err(Error::FeedbackNotAggregated {
                    name: n.name().to_owned(),
                    count: entries.len(),
                });
            }
        }
        let operator = op.operator_name()?;
        let delivered = match self.overrides.get(operator) {
            Some(f) => f(graph, node)?,
            None => match &self.rule {
                Some(rule) => rule.propagate(graph, node)?,
                None => {
                    return Err(Error::NoPropagationRule {
                        operator: operator.to_owned(),
                    })
                }
            },
        };
        let arguments = n.children();
        if delivered.len() != arguments.len()
            || !arguments.iter().all(|a| delivered.contains_key(a))
        {
            return Err(Error::PropagatedSetMismatch {
                name: n.name().to_owned(),
            });
        }
        Ok(delivered)
    }
}

/// Broadcast/sum propagation: the non-numeric analogue of reverse-mode
/// accumulation.
///
/// If the node holds direct user feedback it must be the sole entry, and it
/// is forwarded unchanged to every argument. Otherwise the singleton values
/// from all consumers are reduced with [`Feedback::combine`] (numbers sum,
/// text concatenates, mixed kinds fail) and the result is broadcast
/// identically to every argument.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumRule;

impl PropagationRule<Summed> for SumRule {
    fn propagate(&self, graph: &Graph<Summed>, node: NodeId) -> Result<FeedbackMap<Summed>> {
        let n = graph.node(node);
        let feedback = n.feedback();
        let outgoing = if feedback.contains_key(&FeedbackFrom::User) {
            if feedback.len() != 1 {
                return Err(Error::UserFeedbackNotSole {
                    name: n.name().to_owned(),
                });
            }
            let entries = &feedback[&FeedbackFrom::User];
            entries.first().cloned().ok_or(Error::EmptyAggregate)?
        } else {
            let mut acc: Option<Summed> = None;
            for entries in feedback.values() {
                for entry in entries {
                    acc = Some(match acc {
                        None => entry.clone(),
                        Some(previous) => previous.combine(entry.clone())?,
                    });
                }
            }
            acc.ok_or(Error::EmptyAggregate)?
        };
        Ok(n.children()
            .iter()
            .map(|argument| (*argument, outgoing.clone()))
            .collect())
    }
}
