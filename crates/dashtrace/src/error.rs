// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Error types for DashTrace
//!
//! Every variant here is a caller-contract violation, not an expected runtime
//! condition. Construction and propagation fail fast and leave retry or
//! checkpoint-restore policy to the optimizer driving the trace.

use thiserror::Error;

/// Errors raised during trace-graph construction and backward propagation.
///
/// # Example
///
/// ```rust
/// use dashtrace::{Error, Graph, Summed};
///
/// let mut graph: Graph<Summed> = Graph::new();
/// let a = graph.leaf(2.0).unwrap();
/// let c = graph.operation("[add] This is an add operator of x and y.", 4.0, &[a, a], &[]);
/// assert!(matches!(c, Err(Error::DuplicateEdge { .. })));
/// ```
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    /// The same consumer/argument pair was linked twice.
    #[error("duplicate edge: '{child}' is already an argument of '{parent}'")]
    DuplicateEdge {
        /// Name of the consuming node
        parent: String,
        /// Name of the argument node
        child: String,
    },

    /// A node was attached as its own argument.
    #[error("node '{name}' cannot be its own argument")]
    SelfEdge {
        /// Name of the offending node
        name: String,
    },

    /// A level reassignment left an intermediate level bucket empty.
    ///
    /// This indicates a construction-order bug in the caller; it is asserted,
    /// never silently repaired.
    #[error("level {level} was left without members after a level reassignment")]
    EmptyLevel {
        /// The level bucket that was drained
        level: usize,
    },

    /// A node was registered under a base name that cannot form the
    /// `base:suffix` convention.
    #[error("malformed node name '{name}': expected a non-empty base without ':'")]
    MalformedName {
        /// The rejected name
        name: String,
    },

    /// Exact-name lookup failed.
    #[error("no node registered under '{name}'")]
    UnknownNode {
        /// The name that was looked up
        name: String,
    },

    /// A propagator was invoked on a leaf or parameter node.
    #[error("'{name}' is not an operation node and cannot propagate feedback")]
    NotAnOperation {
        /// Name of the node
        name: String,
    },

    /// An operation description did not start with a bracketed operator
    /// token such as `"[add] ..."`.
    #[error("operation description '{description}' does not start with a bracketed operator name")]
    MalformedDescription {
        /// The rejected description
        description: String,
    },

    /// More than one feedback entry was queued for a single source before
    /// aggregation.
    #[error("unaggregated feedback on '{name}': {count} entries queued from one source")]
    FeedbackNotAggregated {
        /// Name of the node (or map) holding the entries
        name: String,
        /// Number of entries queued under one key
        count: usize,
    },

    /// Direct user feedback coexisted with feedback from consumers.
    #[error("user feedback on '{name}' must be the only feedback entry")]
    UserFeedbackNotSole {
        /// Name of the seeded node
        name: String,
    },

    /// Two distinct non-empty user feedback values reached the same node.
    ///
    /// A single synthetic feedback drives one traversal; siblings sharing a
    /// terminal must agree.
    #[error("conflicting user feedback: '{left}' vs '{right}'")]
    ConflictingUserFeedback {
        /// One of the disagreeing values
        left: String,
        /// The other disagreeing value
        right: String,
    },

    /// Both operands of a feedback combination were missing their user
    /// component.
    #[error("cannot combine two feedback objects that both lack user feedback")]
    MissingUserFeedback,

    /// Feedback values of different runtime kinds reached the summing rule.
    #[error("cannot combine {left} feedback with {right} feedback")]
    HeterogeneousFeedback {
        /// Kind of the left operand
        left: &'static str,
        /// Kind of the right operand
        right: &'static str,
    },

    /// Aggregation was requested over zero feedback entries.
    #[error("cannot aggregate an empty feedback map")]
    EmptyAggregate,

    /// No override matched and the propagator carries no default rule.
    #[error("no propagation rule implemented for operator '{operator}'")]
    NoPropagationRule {
        /// Operator name extracted from the node description
        operator: String,
    },

    /// A propagation rule returned feedback for a key set other than the
    /// node's arguments.
    #[error("propagation for '{name}' did not cover exactly its argument set")]
    PropagatedSetMismatch {
        /// Name of the propagated node
        name: String,
    },

    /// An operator was applied to value kinds it does not support.
    #[error("operator '{operator}' does not support {kind} operands")]
    UnsupportedOperands {
        /// The bracketed operator name
        operator: &'static str,
        /// Description of the offending value kind(s)
        kind: String,
    },

    /// A division-family operator received a zero divisor.
    #[error("operator '{operator}' received a zero divisor")]
    DivisionByZero {
        /// The bracketed operator name
        operator: &'static str,
    },

    /// A mapping access named a key that is not present.
    #[error("key '{key}' not found")]
    KeyNotFound {
        /// The missing key
        key: String,
    },

    /// A positional access fell outside the value's bounds.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds {
        /// The requested index
        index: usize,
        /// The actual length
        len: usize,
    },

    /// An access was attempted through a view that the underlying value
    /// shape does not support.
    #[error("{access} is not supported on {kind} values")]
    UnsupportedAccess {
        /// The attempted access
        access: &'static str,
        /// Kind of the underlying value
        kind: &'static str,
    },
}

/// Result type for trace operations.
pub type Result<T> = std::result::Result<T, Error>;
