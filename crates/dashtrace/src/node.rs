// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Trace-graph vertices
//!
//! Three variants share one representation: leaf value nodes, trainable
//! parameter nodes (a leaf with the `trainable` flag set), and operation
//! nodes, which additionally record the operator description and the ordered
//! argument nodes that produced them.
//!
//! Naming is inherited from the trace convention and is inverted relative to
//! conventional DAG vocabulary: a node's `parents` are the nodes that
//! *consume* it as an argument, and its `children` are the argument nodes it
//! consumes. Feedback therefore arrives from `parents` and is delivered to
//! `children`.

use std::collections::BTreeMap;

use crate::feedback::Feedback;
use crate::value::{Value, ValueView};

/// Handle to a node inside one [`Graph`](crate::Graph).
///
/// Ids are only meaningful for the graph that issued them and are invalidated
/// wholesale by [`Graph::reset`](crate::Graph::reset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Source of one feedback delivery: either the user seeding the traversal,
/// or a consuming node pushing propagated feedback down to its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeedbackFrom {
    /// Directly-injected feedback at the traversal seed
    User,
    /// Feedback delivered by a consuming operation node
    Node(NodeId),
}

/// Operator provenance carried by an operation node.
#[derive(Debug, Clone)]
pub struct Operation {
    description: String,
    args: Vec<NodeId>,
    kwargs: Vec<(String, NodeId)>,
}

impl Operation {
    pub(crate) fn new(description: String, args: Vec<NodeId>, kwargs: Vec<(String, NodeId)>) -> Self {
        Operation {
            description,
            args,
            kwargs,
        }
    }

    /// Human-readable operator identity, starting with the bracketed
    /// operator token, e.g. `"[add] This is an add operator of x and y."`.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Operator name parsed from the leading bracketed token of the
    /// description.
    ///
    /// This textual convention is the contract with the tracing wrapper and
    /// must match the override-registration key bit-for-bit: a node described
    /// as `"[subtract] ..."` dispatches to the override registered under
    /// `"subtract"`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedDescription`] if the description does not
    /// start with a non-empty bracketed token.
    pub fn operator_name(&self) -> crate::error::Result<&str> {
        let inner = self
            .description
            .strip_prefix('[')
            .and_then(|rest| rest.split_once(']'))
            .map(|(name, _)| name);
        match inner {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(crate::error::Error::MalformedDescription {
                description: self.description.clone(),
            }),
        }
    }

    /// Positional argument nodes, in call order.
    #[must_use]
    pub fn args(&self) -> &[NodeId] {
        &self.args
    }

    /// Named argument nodes, in declaration order.
    #[must_use]
    pub fn kwargs(&self) -> &[(String, NodeId)] {
        &self.kwargs
    }
}

/// One vertex of the trace graph.
///
/// Nodes are created once and never mutated afterwards, apart from the
/// feedback slots populated during a backward pass.
#[derive(Debug, Clone)]
pub struct Node<F: Feedback> {
    pub(crate) name: String,
    pub(crate) level: usize,
    pub(crate) trainable: bool,
    pub(crate) data: Value,
    pub(crate) parents: Vec<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) feedback: BTreeMap<FeedbackFrom, Vec<F>>,
    pub(crate) op: Option<Operation>,
}

impl<F: Feedback> Node<F> {
    pub(crate) fn new(data: Value, trainable: bool, op: Option<Operation>) -> Self {
        Node {
            name: String::new(),
            level: 0,
            trainable,
            data,
            parents: Vec::new(),
            children: Vec::new(),
            feedback: BTreeMap::new(),
            op,
        }
    }

    /// Registered name, in `"<base>:<disambiguator>"` form.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Longest-path distance from any leaf; leaves sit at level 0.
    #[must_use]
    pub fn level(&self) -> usize {
        self.level
    }

    /// Whether an optimizer may rewrite this node's value.
    #[must_use]
    pub fn trainable(&self) -> bool {
        self.trainable
    }

    /// The wrapped value.
    #[must_use]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Shape-specific read access to the wrapped value.
    ///
    /// This is plain data access and never creates graph edges.
    #[must_use]
    pub fn view(&self) -> ValueView<'_> {
        self.data.view()
    }

    /// Nodes that consume this node as an argument.
    #[must_use]
    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    /// Argument nodes this node consumes.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Operator provenance, present only on operation nodes.
    #[must_use]
    pub fn operation(&self) -> Option<&Operation> {
        self.op.as_ref()
    }

    /// Whether this node was produced by applying an operator.
    #[must_use]
    pub fn is_operation(&self) -> bool {
        self.op.is_some()
    }

    /// Feedback received so far, keyed by the delivering consumer (or the
    /// reserved user source at the traversal seed).
    #[must_use]
    pub fn feedback(&self) -> &BTreeMap<FeedbackFrom, Vec<F>> {
        &self.feedback
    }

    /// Whether any feedback has been deposited on this node.
    #[must_use]
    pub fn has_feedback(&self) -> bool {
        !self.feedback.is_empty()
    }
}
