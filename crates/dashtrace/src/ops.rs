// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Primitive operators over traced values
//!
//! Every function here evaluates one primitive operator and records the
//! result as an operation node whose children are the argument nodes. The
//! bracketed operator tokens in the descriptions are load-bearing: they are
//! the keys under which propagation overrides are registered, and must not
//! be reworded.
//!
//! This is the sanctioned computation path. Reading a traced value through
//! its [`ValueView`](crate::ValueView) and computing outside the graph loses
//! provenance; these operators keep it.

use crate::error::{Error, Result};
use crate::feedback::Feedback;
use crate::graph::Graph;
use crate::node::NodeId;
use crate::value::Value;

fn numeric<F: Feedback>(graph: &Graph<F>, operator: &'static str, x: NodeId) -> Result<f64> {
    let a = graph.node(x).data();
    a.as_number().ok_or_else(|| Error::UnsupportedOperands {
        operator,
        kind: a.kind().to_owned(),
    })
}

fn numeric_pair<F: Feedback>(
    graph: &Graph<F>,
    operator: &'static str,
    x: NodeId,
    y: NodeId,
) -> Result<(f64, f64)> {
    let (a, b) = (graph.node(x).data(), graph.node(y).data());
    match (a.as_number(), b.as_number()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(Error::UnsupportedOperands {
            operator,
            kind: format!("{} and {}", a.kind(), b.kind()),
        }),
    }
}

/// Deep-copy a traced value into a new operation node.
pub fn clone<F: Feedback>(graph: &mut Graph<F>, x: NodeId) -> Result<NodeId> {
    let value = graph.node(x).data().clone();
    graph.operation("[clone] This is a clone operator of x.", value, &[x], &[])
}

/// Identity over a traced value; behaves the same as [`clone`].
pub fn identity<F: Feedback>(graph: &mut Graph<F>, x: NodeId) -> Result<NodeId> {
    clone(graph, x)
}

/// Add two traced values: numbers sum, text concatenates.
pub fn add<F: Feedback>(graph: &mut Graph<F>, x: NodeId, y: NodeId) -> Result<NodeId> {
    let value = {
        let (a, b) = (graph.node(x).data(), graph.node(y).data());
        match (a, b) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (Value::Text(a), Value::Text(b)) => {
                let mut joined = a.clone();
                joined.push_str(b);
                Value::Text(joined)
            }
            _ => {
                return Err(Error::UnsupportedOperands {
                    operator: "add",
                    kind: format!("{} and {}", a.kind(), b.kind()),
                })
            }
        }
    };
    graph.operation(
        "[add] This is an add operator of x and y.",
        value,
        &[x, y],
        &[],
    )
}

/// Subtract two traced numbers.
pub fn subtract<F: Feedback>(graph: &mut Graph<F>, x: NodeId, y: NodeId) -> Result<NodeId> {
    let (a, b) = numeric_pair(graph, "subtract", x, y)?;
    graph.operation(
        "[subtract] This is a subtract operator of x and y.",
        a - b,
        &[x, y],
        &[],
    )
}

/// Multiply two traced numbers.
pub fn multiply<F: Feedback>(graph: &mut Graph<F>, x: NodeId, y: NodeId) -> Result<NodeId> {
    let (a, b) = numeric_pair(graph, "multiply", x, y)?;
    graph.operation(
        "[multiply] This is a multiply operator of x and y.",
        a * b,
        &[x, y],
        &[],
    )
}

/// Divide two traced numbers. A zero divisor is rejected.
pub fn divide<F: Feedback>(graph: &mut Graph<F>, x: NodeId, y: NodeId) -> Result<NodeId> {
    let (a, b) = numeric_pair(graph, "divide", x, y)?;
    if b == 0.0 {
        return Err(Error::DivisionByZero { operator: "divide" });
    }
    graph.operation(
        "[divide] This is a divide operator of x and y.",
        a / b,
        &[x, y],
        &[],
    )
}

/// Floored modulo of two traced numbers; the result follows the divisor's
/// sign. A zero divisor is rejected.
pub fn modulo<F: Feedback>(graph: &mut Graph<F>, x: NodeId, y: NodeId) -> Result<NodeId> {
    let (a, b) = numeric_pair(graph, "mod", x, y)?;
    if b == 0.0 {
        return Err(Error::DivisionByZero { operator: "mod" });
    }
    graph.operation(
        "[mod] This is a mod operator of x and y.",
        a - b * (a / b).floor(),
        &[x, y],
        &[],
    )
}

/// Raise a traced number to a traced power.
pub fn power<F: Feedback>(graph: &mut Graph<F>, x: NodeId, y: NodeId) -> Result<NodeId> {
    let (a, b) = numeric_pair(graph, "power", x, y)?;
    graph.operation(
        "[power] This is a power operator of x and y.",
        a.powf(b),
        &[x, y],
        &[],
    )
}

/// Negate a traced number.
pub fn neg<F: Feedback>(graph: &mut Graph<F>, x: NodeId) -> Result<NodeId> {
    let a = numeric(graph, "neg", x)?;
    graph.operation("[neg] This is a neg operator of x.", -a, &[x], &[])
}

/// Absolute value of a traced number.
pub fn abs<F: Feedback>(graph: &mut Graph<F>, x: NodeId) -> Result<NodeId> {
    let a = numeric(graph, "abs", x)?;
    graph.operation("[abs] This is an abs operator of x.", a.abs(), &[x], &[])
}

/// Equality over any two traced values.
pub fn eq<F: Feedback>(graph: &mut Graph<F>, x: NodeId, y: NodeId) -> Result<NodeId> {
    let value = graph.node(x).data() == graph.node(y).data();
    graph.operation(
        "[eq] This is an eq operator of x and y.",
        value,
        &[x, y],
        &[],
    )
}

/// Inequality over any two traced values.
pub fn ne<F: Feedback>(graph: &mut Graph<F>, x: NodeId, y: NodeId) -> Result<NodeId> {
    let value = graph.node(x).data() != graph.node(y).data();
    graph.operation(
        "[ne] This is a ne operator of x and y.",
        value,
        &[x, y],
        &[],
    )
}

fn ordering<F: Feedback>(
    graph: &Graph<F>,
    operator: &'static str,
    x: NodeId,
    y: NodeId,
) -> Result<std::cmp::Ordering> {
    let (a, b) = (graph.node(x).data(), graph.node(y).data());
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a
            .partial_cmp(b)
            .ok_or_else(|| Error::UnsupportedOperands {
                operator,
                kind: "non-comparable number".to_owned(),
            }),
        (Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
        _ => Err(Error::UnsupportedOperands {
            operator,
            kind: format!("{} and {}", a.kind(), b.kind()),
        }),
    }
}

/// Less-than over traced numbers or text.
pub fn lt<F: Feedback>(graph: &mut Graph<F>, x: NodeId, y: NodeId) -> Result<NodeId> {
    let value = ordering(graph, "lt", x, y)?.is_lt();
    graph.operation(
        "[lt] This is a lt operator of x and y.",
        value,
        &[x, y],
        &[],
    )
}

/// Greater-than over traced numbers or text.
pub fn gt<F: Feedback>(graph: &mut Graph<F>, x: NodeId, y: NodeId) -> Result<NodeId> {
    let value = ordering(graph, "gt", x, y)?.is_gt();
    graph.operation(
        "[gt] This is a gt operator of x and y.",
        value,
        &[x, y],
        &[],
    )
}

/// Less-than-or-equal over traced numbers or text.
pub fn le<F: Feedback>(graph: &mut Graph<F>, x: NodeId, y: NodeId) -> Result<NodeId> {
    let value = ordering(graph, "le", x, y)?.is_le();
    graph.operation(
        "[le] This is a le operator of x and y.",
        value,
        &[x, y],
        &[],
    )
}

/// Greater-than-or-equal over traced numbers or text.
pub fn ge<F: Feedback>(graph: &mut Graph<F>, x: NodeId, y: NodeId) -> Result<NodeId> {
    let value = ordering(graph, "ge", x, y)?.is_ge();
    graph.operation(
        "[ge] This is a ge operator of x and y.",
        value,
        &[x, y],
        &[],
    )
}

/// Logical negation of a traced value's truthiness.
pub fn not<F: Feedback>(graph: &mut Graph<F>, x: NodeId) -> Result<NodeId> {
    let value = !graph.node(x).data().is_truthy();
    graph.operation("[not] This is a not operator of x.", value, &[x], &[])
}

/// Select `x` if `condition` is truthy, otherwise `y`.
pub fn cond<F: Feedback>(
    graph: &mut Graph<F>,
    condition: NodeId,
    x: NodeId,
    y: NodeId,
) -> Result<NodeId> {
    let value = if graph.node(condition).data().is_truthy() {
        graph.node(x).data().clone()
    } else {
        graph.node(y).data().clone()
    };
    graph.operation(
        "[cond] This selects x if condition is True, otherwise y.",
        value,
        &[condition, x, y],
        &[],
    )
}

fn membership<F: Feedback>(
    graph: &Graph<F>,
    operator: &'static str,
    x: NodeId,
    y: NodeId,
) -> Result<bool> {
    let (needle, haystack) = (graph.node(x).data(), graph.node(y).data());
    match (needle, haystack) {
        (Value::Text(n), Value::Text(h)) => Ok(h.contains(n.as_str())),
        (Value::Text(n), Value::Mapping(m)) => Ok(m.contains_key(n)),
        _ => Err(Error::UnsupportedOperands {
            operator,
            kind: format!("{} and {}", needle.kind(), haystack.kind()),
        }),
    }
}

/// Containment: substring for text in text, key presence for text in a
/// mapping.
pub fn contains<F: Feedback>(graph: &mut Graph<F>, x: NodeId, y: NodeId) -> Result<NodeId> {
    let value = membership(graph, "in", x, y)?;
    graph.operation("[in] Whether x is in y.", value, &[x, y], &[])
}

/// Negated containment over the same shapes as [`contains`].
pub fn not_in<F: Feedback>(graph: &mut Graph<F>, x: NodeId, y: NodeId) -> Result<NodeId> {
    let value = !membership(graph, "not_in", x, y)?;
    graph.operation("[not_in] Whether x is not in y.", value, &[x, y], &[])
}

/// Index a traced value: key lookup on a mapping, character position on
/// text.
pub fn getitem<F: Feedback>(graph: &mut Graph<F>, x: NodeId, index: NodeId) -> Result<NodeId> {
    let value = {
        let (target, key) = (graph.node(x).data(), graph.node(index).data());
        match (target, key) {
            (Value::Mapping(m), Value::Text(k)) => Value::from(
                m.get(k)
                    .cloned()
                    .ok_or_else(|| Error::KeyNotFound { key: k.clone() })?,
            ),
            (Value::Text(s), Value::Number(n)) => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let i = *n as usize;
                let c = s.chars().nth(i).ok_or(Error::IndexOutOfBounds {
                    index: i,
                    len: s.chars().count(),
                })?;
                Value::Text(c.to_string())
            }
            _ => {
                return Err(Error::UnsupportedOperands {
                    operator: "getitem",
                    kind: format!("{} and {}", target.kind(), key.kind()),
                })
            }
        }
    };
    graph.operation(
        "[getitem] This is a getitem operator of x based on index.",
        value,
        &[x, index],
        &[],
    )
}

/// Length of a traced value: characters for text, entries for a mapping.
pub fn len<F: Feedback>(graph: &mut Graph<F>, x: NodeId) -> Result<NodeId> {
    let data = graph.node(x).data();
    let value = match data {
        Value::Text(s) => s.chars().count(),
        Value::Mapping(m) => m.len(),
        _ => {
            return Err(Error::UnsupportedOperands {
                operator: "len",
                kind: data.kind().to_owned(),
            })
        }
    };
    #[allow(clippy::cast_precision_loss)]
    graph.operation(
        "[len] This is a len operator of x.",
        value as f64,
        &[x],
        &[],
    )
}
