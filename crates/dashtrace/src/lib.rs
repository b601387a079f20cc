// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! DashTrace: runtime trace DAGs with backward feedback propagation
//!
//! DashTrace records a computation as a leveled DAG of value, parameter, and
//! operation nodes, then propagates non-numeric feedback backward from an
//! output toward the trainable parameters that produced it. It is the
//! plumbing for text-based optimizers: instead of a numeric gradient, the
//! backward pass carries an arbitrary [`Feedback`] payload, combined
//! wherever paths meet.
//!
//! The moving parts:
//!
//! - [`Graph`] owns every node of one optimization episode, assigns
//!   `base:suffix` names, and keeps the level index that orders backward
//!   traversal.
//! - [`ops`] holds the primitive operators that both compute a value and
//!   record the operation node tying it to its arguments.
//! - [`Propagator`] dispatches each visited node to a per-operator override
//!   or a default [`PropagationRule`]. [`SumRule`] broadcasts and sums;
//!   [`CollectRule`] accumulates the visited sub-DAG so a parameter learns
//!   the full downstream path that consumed it.
//!
//! # Example
//!
//! ```rust
//! use dashtrace::{ops, CollectRule, Graph, Propagator, VisitedFeedback};
//!
//! let mut graph: Graph<VisitedFeedback> = Graph::new();
//! let prompt = graph.parameter_named("prompt", "Answer briefly.")?;
//! let suffix = graph.leaf(" Be polite.")?;
//! let rendered = ops::add(&mut graph, prompt, suffix)?;
//!
//! let propagator = Propagator::new(CollectRule);
//! graph.backward(rendered, VisitedFeedback::seed("too verbose"), &propagator)?;
//!
//! let critique = graph.accumulated_feedback(prompt)?;
//! let path: Vec<_> = critique.names().collect();
//! assert_eq!(path, vec!["add:0"]);
//! # Ok::<(), dashtrace::Error>(())
//! ```

pub mod collect;
pub mod error;
pub mod feedback;
pub mod graph;
pub mod node;
pub mod ops;
pub mod propagate;
pub mod value;

pub use collect::{CollectRule, VisitedFeedback, VisitedNode};
pub use error::{Error, Result};
pub use feedback::{Feedback, FeedbackValue, Summed};
pub use graph::Graph;
pub use node::{FeedbackFrom, Node, NodeId, Operation};
pub use propagate::{FeedbackMap, PropagateFn, PropagationRule, Propagator, SumRule};
pub use value::{MappingView, MappingViewMut, TextView, Value, ValueView, ValueViewMut};
